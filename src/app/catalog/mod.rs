mod extract;
mod ordering;

use serde_json::Value;
use tracing::{debug, info, warn};

pub use extract::LinkSource;
pub use ordering::NamingConvention;

use self::extract::resolve_link;
use crate::config::Config;
use crate::error::{CatalogError, ConfigError};
use crate::http::HttpClient;

const ACCEPT_HEADER: &str = "application/vnd.vimeo.*+json;version=3.4";
const ITEM_FIELDS: &str = "uri,name,files,download,embed.html,duration";
const MAX_PAGES: usize = 1_000;

/// One playable unit, rebuilt from scratch on every fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub identifier: String,
    pub display_name: String,
    pub download_url: String,
    pub link_source: LinkSource,
    pub quality: Option<String>,
    pub size_bytes: Option<u64>,
    pub duration_secs: Option<u64>,
}

pub trait CatalogSource {
    /// Ordered playable assets. An empty list means "nothing to show right now".
    fn fetch_ordered_assets(&self) -> Result<Vec<Asset>, CatalogError>;
}

/// Lists the videos of one Vimeo project (folder).
pub struct VimeoCatalog {
    client: HttpClient,
    base_url: String,
    access_token: String,
    project_id: String,
    per_page: u32,
    naming: NamingConvention,
}

impl VimeoCatalog {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            client: HttpClient::new(
                config.http.connect_timeout(),
                config.http.read_timeout(),
                config.http.retry_policy(),
            ),
            base_url: config.api.base_url.trim_end_matches('/').to_string(),
            access_token: config.api.access_token.clone(),
            project_id: config.api.project_id.clone(),
            per_page: config.api.per_page,
            naming: config.naming_convention()?,
        })
    }

    fn first_page_url(&self) -> String {
        format!("{}/me/projects/{}/videos", self.base_url, self.project_id)
    }

    fn absolute_url(&self, next: &str) -> String {
        if next.starts_with("http://") || next.starts_with("https://") {
            next.to_string()
        } else if next.starts_with('/') {
            format!("{}{next}", self.base_url)
        } else {
            format!("{}/{next}", self.base_url)
        }
    }

    fn fetch_items(&self) -> Result<Vec<Value>, CatalogError> {
        let authorization = format!("Bearer {}", self.access_token);
        let headers = [
            ("Authorization", authorization.as_str()),
            ("Accept", ACCEPT_HEADER),
        ];
        let per_page = self.per_page.to_string();

        let mut items = Vec::new();
        let mut next_url = Some(self.first_page_url());
        let mut pages = 0usize;

        while let Some(url) = next_url.take() {
            pages += 1;
            if pages > MAX_PAGES {
                return Err(CatalogError::Malformed {
                    url,
                    message: format!("pagination did not terminate after {MAX_PAGES} pages"),
                });
            }

            // `paging.next` already carries the query of the first request.
            let query: Vec<(&str, &str)> = if pages == 1 {
                vec![("per_page", per_page.as_str()), ("fields", ITEM_FIELDS)]
            } else {
                Vec::new()
            };

            debug!(%url, page = pages, "requesting catalog page");
            let body = self.client.get_text(&url, &headers, &query)?;
            let page = parse_page(&url, &body)?;
            items.extend(page.items);
            next_url = page.next.map(|next| self.absolute_url(&next));
        }

        Ok(items)
    }
}

impl CatalogSource for VimeoCatalog {
    fn fetch_ordered_assets(&self) -> Result<Vec<Asset>, CatalogError> {
        let items = self.fetch_items()?;
        if items.is_empty() {
            warn!(
                project = %self.project_id,
                "no videos found in project; check the project id and token scopes"
            );
        }
        let assets = build_catalog(&items, &self.naming);
        info!(
            fetched = items.len(),
            playable = assets.len(),
            "catalog resolved"
        );
        Ok(assets)
    }
}

#[derive(Debug)]
pub(crate) struct CatalogPage {
    pub(crate) items: Vec<Value>,
    pub(crate) next: Option<String>,
}

pub(crate) fn parse_page(url: &str, body: &str) -> Result<CatalogPage, CatalogError> {
    let parsed: Value = serde_json::from_str(body).map_err(|err| CatalogError::Malformed {
        url: url.to_string(),
        message: format!("invalid JSON: {err}"),
    })?;

    let Some(items) = parsed.get("data").and_then(Value::as_array) else {
        return Err(CatalogError::Malformed {
            url: url.to_string(),
            message: "missing `data` array".to_string(),
        });
    };

    let next = parsed
        .pointer("/paging/next")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|next| !next.is_empty())
        .map(str::to_string);

    Ok(CatalogPage {
        items: items.clone(),
        next,
    })
}

fn item_identifier(item: &Value) -> Option<String> {
    let from_uri = item
        .get("uri")
        .and_then(Value::as_str)
        .and_then(|uri| uri.trim_end_matches('/').rsplit('/').next())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string);

    from_uri.or_else(|| match item.get("id")? {
        Value::String(id) if !id.trim().is_empty() => Some(id.trim().to_string()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    })
}

/// Resolves a download link for every item, drops the unusable ones and
/// orders the rest.
pub(crate) fn build_catalog(items: &[Value], naming: &NamingConvention) -> Vec<Asset> {
    let mut assets = Vec::with_capacity(items.len());

    for item in items {
        let name = item
            .get("name")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or("");
        let Some(identifier) = item_identifier(item) else {
            warn!(name, "skipping catalog item without an identifier");
            continue;
        };
        let Some(link) = resolve_link(item) else {
            warn!(
                id = %identifier,
                name,
                has_files = item.get("files").is_some(),
                has_download = item.get("download").is_some(),
                has_embed = item.pointer("/embed/html").is_some(),
                "no usable progressive link; item excluded"
            );
            continue;
        };

        debug!(
            id = %identifier,
            name,
            source = %link.source,
            quality = link.quality.as_deref().unwrap_or("n/a"),
            url = %link.url,
            "resolved download link"
        );
        assets.push(Asset {
            display_name: if name.is_empty() {
                identifier.clone()
            } else {
                name.to_string()
            },
            identifier,
            download_url: link.url,
            link_source: link.source,
            quality: link.quality,
            size_bytes: link.size_bytes,
            duration_secs: item.get("duration").and_then(Value::as_u64),
        });
    }

    naming.sort(&mut assets);
    assets
}
