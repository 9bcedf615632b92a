use std::path::PathBuf;

use thiserror::Error;

use crate::http::HttpError;

/// Fatal at startup; everything else in this module is recoverable per cycle.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("missing required setting `{0}`")]
    Missing(&'static str),

    #[error("invalid setting `{key}`: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog unavailable: {0}")]
    Unavailable(#[from] HttpError),

    #[error("catalog unavailable: malformed response from {url}: {message}")]
    Malformed { url: String, message: String },
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("download of {url} failed: {source}")]
    Http { url: String, source: HttpError },

    #[error("download of {url} was truncated: got {received} of {expected} bytes")]
    Truncated {
        url: String,
        received: u64,
        expected: u64,
    },

    #[error("download of {url} returned an empty body")]
    Empty { url: String },

    #[error("failed writing {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to prepare storage directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to list storage directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write state file {path}: {source}")]
    StateWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to encode cycle state: {0}")]
    StateEncode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("failed to spawn player `{program}` for {path}: {source}")]
    Spawn {
        program: String,
        path: PathBuf,
        source: std::io::Error,
    },
}
