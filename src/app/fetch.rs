use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::catalog::Asset;
use crate::config::Config;
use crate::error::{DownloadError, StorageError};
use crate::http::HttpClient;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux aarch64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const REFERER: &str = "https://player.vimeo.com/";
const PART_SUFFIX: &str = ".part";

pub trait AssetStore {
    /// Removes previously downloaded media; returns how many files went away.
    fn clear(&self) -> Result<usize, StorageError>;

    /// Fully downloads `asset` and returns the final local path.
    fn download(&self, asset: &Asset) -> Result<PathBuf, DownloadError>;
}

/// The local media directory. Holds at most one finished media file.
pub struct MediaDir {
    dir: PathBuf,
    client: HttpClient,
}

impl MediaDir {
    pub fn new(dir: impl Into<PathBuf>, client: HttpClient) -> Self {
        Self {
            dir: dir.into(),
            client,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let client = HttpClient::new(
            config.http.connect_timeout(),
            config.http.download_timeout(),
            config.http.retry_policy(),
        );
        Self::new(&config.storage.media_dir, client)
    }
}

impl AssetStore for MediaDir {
    fn clear(&self) -> Result<usize, StorageError> {
        clear_storage(&self.dir)
    }

    fn download(&self, asset: &Asset) -> Result<PathBuf, DownloadError> {
        download(&self.client, asset, &self.dir)
    }
}

fn is_media_file(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy())
        .unwrap_or_default();
    if name.ends_with(PART_SUFFIX) {
        return true;
    }
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("mp4"))
}

pub fn clear_storage(dir: &Path) -> Result<usize, StorageError> {
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|source| StorageError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;
        info!(dir = %dir.display(), "created missing media directory");
        return Ok(0);
    }

    let entries = fs::read_dir(dir).map_err(|source| StorageError::ReadDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut removed = 0;
    let mut first_failure = None;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() || !is_media_file(&path) {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                removed += 1;
                debug!(file = %path.display(), "removed stale media");
            }
            Err(source) => {
                warn!(file = %path.display(), error = %source, "failed to remove stale media");
                if first_failure.is_none() {
                    first_failure = Some(StorageError::Remove { path, source });
                }
            }
        }
    }

    match first_failure {
        Some(err) => Err(err),
        None => {
            info!(dir = %dir.display(), removed, "media directory cleared");
            Ok(removed)
        }
    }
}

pub(crate) fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .filter(|ch| ch.is_alphanumeric() || matches!(ch, ' ' | '_' | '-'))
        .collect::<String>()
        .trim()
        .replace(' ', "_")
}

pub(crate) fn media_file_name(asset: &Asset) -> String {
    let id = sanitize_title(&asset.identifier);
    let title = sanitize_title(&asset.display_name);
    if title.is_empty() {
        format!("{id}.mp4")
    } else {
        format!("{id}_{title}.mp4")
    }
}

pub fn download(client: &HttpClient, asset: &Asset, dir: &Path) -> Result<PathBuf, DownloadError> {
    let url = asset.download_url.as_str();
    let final_path = dir.join(media_file_name(asset));
    let part_path = dir.join(format!(".{}{PART_SUFFIX}", media_file_name(asset)));

    fs::create_dir_all(dir).map_err(|source| DownloadError::Write {
        path: dir.to_path_buf(),
        source,
    })?;

    info!(
        id = %asset.identifier,
        name = %asset.display_name,
        catalog_size = ?asset.size_bytes,
        url,
        "downloading asset"
    );
    let response = client
        .get(url, &[("User-Agent", USER_AGENT), ("Referer", REFERER)], &[])
        .map_err(|source| DownloadError::Http {
            url: url.to_string(),
            source,
        })?;
    let expected = response
        .header("Content-Length")
        .and_then(|value| value.trim().parse::<u64>().ok());

    let result = write_body(response.into_reader(), url, &part_path, expected)
        .and_then(|received| {
            fs::rename(&part_path, &final_path)
                .map(|()| received)
                .map_err(|source| DownloadError::Write {
                    path: final_path.clone(),
                    source,
                })
        });

    match result {
        Ok(received) => {
            info!(file = %final_path.display(), bytes = received, "download complete");
            Ok(final_path)
        }
        Err(err) => {
            let _ = fs::remove_file(&part_path);
            Err(err)
        }
    }
}

fn write_body(
    mut reader: impl Read,
    url: &str,
    part_path: &Path,
    expected: Option<u64>,
) -> Result<u64, DownloadError> {
    let write_error = |source| DownloadError::Write {
        path: part_path.to_path_buf(),
        source,
    };
    let mut file = fs::File::create(part_path).map_err(write_error)?;
    let mut buf = vec![0_u8; 64 * 1024];
    let mut received = 0_u64;

    loop {
        let read = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                return Err(DownloadError::Http {
                    url: url.to_string(),
                    source: crate::http::HttpError::Body(err),
                });
            }
        };
        file.write_all(&buf[..read]).map_err(write_error)?;
        received += read as u64;
    }

    if received == 0 {
        return Err(DownloadError::Empty {
            url: url.to_string(),
        });
    }
    if let Some(expected) = expected.filter(|expected| received < *expected) {
        return Err(DownloadError::Truncated {
            url: url.to_string(),
            received,
            expected,
        });
    }

    file.sync_all().map_err(write_error)?;
    Ok(received)
}
