use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkSource {
    Files,
    Download,
    Embed,
}

impl LinkSource {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkSource::Files => "files",
            LinkSource::Download => "download",
            LinkSource::Embed => "embed",
        }
    }
}

impl fmt::Display for LinkSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResolvedLink {
    pub(crate) url: String,
    pub(crate) source: LinkSource,
    pub(crate) quality: Option<String>,
    pub(crate) size_bytes: Option<u64>,
}

type Extractor = fn(&Value) -> Option<ResolvedLink>;

/// Tried in order; the first extractor to produce a link wins.
const EXTRACTORS: &[Extractor] = &[from_files, from_download, from_embed];

pub(crate) fn resolve_link(item: &Value) -> Option<ResolvedLink> {
    EXTRACTORS.iter().find_map(|extract| extract(item))
}

fn from_files(item: &Value) -> Option<ResolvedLink> {
    let entries = item.get("files")?.as_array()?;
    best_progressive(entries, LinkSource::Files)
}

fn from_download(item: &Value) -> Option<ResolvedLink> {
    let entries = item.get("download")?.as_array()?;
    best_progressive(entries, LinkSource::Download)
}

fn from_embed(item: &Value) -> Option<ResolvedLink> {
    let html = item.pointer("/embed/html")?.as_str()?;
    let url = find_mp4_reference(html)?;
    Some(ResolvedLink {
        url,
        source: LinkSource::Embed,
        quality: None,
        size_bytes: None,
    })
}

fn entry_link(entry: &Value) -> Option<&str> {
    entry
        .get("link")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|link| !link.is_empty())
}

fn is_progressive(entry: &Value) -> bool {
    let Some(link) = entry_link(entry) else {
        return false;
    };
    let quality = entry.get("quality").and_then(Value::as_str).unwrap_or("");
    if quality.eq_ignore_ascii_case("hls") || quality.eq_ignore_ascii_case("dash") {
        return false;
    }
    match entry.get("type").and_then(Value::as_str) {
        Some(kind) => kind.eq_ignore_ascii_case("video/mp4"),
        None => url_path_is_mp4(link),
    }
}

fn pixel_area(entry: &Value) -> u64 {
    let width = entry.get("width").and_then(Value::as_u64).unwrap_or(0);
    let height = entry.get("height").and_then(Value::as_u64).unwrap_or(0);
    width.saturating_mul(height)
}

/// Largest rendition among progressive MP4 entries; earlier entries win ties.
fn best_progressive(entries: &[Value], source: LinkSource) -> Option<ResolvedLink> {
    let mut best: Option<(&Value, u64)> = None;
    for entry in entries.iter().filter(|entry| is_progressive(entry)) {
        let area = pixel_area(entry);
        if best.is_none_or(|(_, best_area)| area > best_area) {
            best = Some((entry, area));
        }
    }

    let (entry, _) = best?;
    Some(ResolvedLink {
        url: entry_link(entry)?.to_string(),
        source,
        quality: entry
            .get("rendition")
            .or_else(|| entry.get("quality"))
            .and_then(Value::as_str)
            .map(str::to_string),
        size_bytes: entry.get("size").and_then(Value::as_u64),
    })
}

static URL_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://").expect("static url start pattern"));
static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s"'<>\\]+"#).expect("static url pattern"));

/// First `.mp4` URL in the markup. Every `http(s)://` is tried as a start,
/// so a URL carried in another URL's query string is still found.
pub(crate) fn find_mp4_reference(markup: &str) -> Option<String> {
    let unescaped = markup.replace("\\/", "/").replace("&amp;", "&");
    URL_START
        .find_iter(&unescaped)
        .filter_map(|start| URL_PATTERN.find_at(&unescaped, start.start()))
        .map(|found| trim_embedded_params(found.as_str()))
        .find(|url| url_path_is_mp4(url))
        .map(str::to_string)
}

/// A nested URL ends where the outer query continues: `x.mp4&autoplay=1`
/// has no `?` of its own before the `&`.
fn trim_embedded_params(url: &str) -> &str {
    match url.find(['?', '&']) {
        Some(at) if url[at..].starts_with('&') => &url[..at],
        _ => url,
    }
}

fn url_path_is_mp4(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.to_ascii_lowercase().ends_with(".mp4")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn files_entry_wins_over_download_and_picks_largest_rendition() {
        let item = json!({
            "files": [
                {"type": "video/mp4", "quality": "sd", "width": 640, "height": 360, "link": "https://cdn.test/sd.mp4"},
                {"type": "video/mp4", "quality": "hd", "width": 1920, "height": 1080, "link": "https://cdn.test/hd.mp4", "size": 1234},
                {"quality": "hls", "link": "https://cdn.test/master.m3u8"}
            ],
            "download": [
                {"type": "video/mp4", "width": 3840, "height": 2160, "link": "https://cdn.test/dl.mp4"}
            ]
        });

        let link = resolve_link(&item).expect("files link");
        assert_eq!(link.url, "https://cdn.test/hd.mp4");
        assert_eq!(link.source, LinkSource::Files);
        assert_eq!(link.quality.as_deref(), Some("hd"));
        assert_eq!(link.size_bytes, Some(1234));
    }

    #[test]
    fn download_only_item_resolves_to_download_entry() {
        let item = json!({
            "download": [
                {"type": "video/mp4", "rendition": "720p", "width": 1280, "height": 720, "link": "https://cdn.test/dl-720.mp4"}
            ]
        });

        let link = resolve_link(&item).expect("download link");
        assert_eq!(link.url, "https://cdn.test/dl-720.mp4");
        assert_eq!(link.source, LinkSource::Download);
        assert_eq!(link.quality.as_deref(), Some("720p"));
    }

    #[test]
    fn adaptive_only_files_fall_through_to_download() {
        let item = json!({
            "files": [{"type": "application/x-mpegURL", "quality": "hls", "link": "https://cdn.test/a.m3u8"}],
            "download": [{"type": "video/mp4", "link": "https://cdn.test/fallback.mp4"}]
        });

        let link = resolve_link(&item).expect("download link");
        assert_eq!(link.source, LinkSource::Download);
        assert_eq!(link.url, "https://cdn.test/fallback.mp4");
    }

    #[test]
    fn embed_markup_with_mp4_reference_is_last_resort() {
        let item = json!({
            "files": "not-an-array",
            "embed": {
                "html": "<iframe src=\"https://player.vimeo.com/video/42?h=abc\"></iframe><source src=\"https://vod.test/progressive/42.mp4?token=x&amp;exp=9\">"
            }
        });

        let link = resolve_link(&item).expect("embed link");
        assert_eq!(link.source, LinkSource::Embed);
        assert_eq!(link.url, "https://vod.test/progressive/42.mp4?token=x&exp=9");
    }

    #[test]
    fn embed_player_iframe_without_mp4_is_not_usable() {
        let item = json!({
            "embed": {"html": "<iframe src=\"https://player.vimeo.com/video/42\"></iframe>"}
        });
        assert_eq!(resolve_link(&item), None);
    }

    #[test]
    fn item_without_any_source_resolves_to_none() {
        assert_eq!(resolve_link(&json!({"name": "BL_009"})), None);
        assert_eq!(
            resolve_link(&json!({"files": [], "download": [{"type": "video/mp4", "link": ""}]})),
            None
        );
    }

    #[test]
    fn mp4_nested_in_player_query_string_is_found() {
        let markup = r#"<iframe src="https://player.vimeo.com/video/1?file=https://x.test/y.mp4&autoplay=1"></iframe>"#;
        assert_eq!(
            find_mp4_reference(markup).as_deref(),
            Some("https://x.test/y.mp4")
        );
    }

    #[test]
    fn outer_mp4_url_wins_over_nested_one() {
        let markup = "https://cdn.test/outer.mp4?src=https://cdn.test/inner.mp4";
        assert_eq!(
            find_mp4_reference(markup).as_deref(),
            Some("https://cdn.test/outer.mp4?src=https://cdn.test/inner.mp4")
        );
    }

    #[test]
    fn json_escaped_slashes_in_markup_are_understood() {
        let found = find_mp4_reference(r#"{"url":"https:\/\/vod.test\/a\/b.MP4"}"#);
        assert_eq!(found.as_deref(), Some("https://vod.test/a/b.MP4"));
    }
}
