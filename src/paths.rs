use std::path::{Path, PathBuf};

pub const SYSTEM_CONFIG_FILE: &str = "/etc/signloop/config.toml";
pub const LOCAL_CONFIG_FILE: &str = "signloop.toml";

pub fn user_config_file() -> Option<PathBuf> {
    let base = dirs::config_dir()?;
    Some(base.join("signloop").join("config.toml"))
}

pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("signloop")
}

pub fn default_media_dir() -> PathBuf {
    default_data_dir().join("media")
}

pub fn default_state_file() -> PathBuf {
    default_data_dir().join("state.json")
}

/// Expands a leading `~/` against the home directory; other paths pass through.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}
