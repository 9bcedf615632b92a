//! Startup configuration.
//!
//! Files are merged in order (later wins):
//! 1. `/etc/signloop/config.toml`
//! 2. `<user config dir>/signloop/config.toml`
//! 3. `--config <path>` when given, otherwise `./signloop.toml`
//!
//! `SIGNLOOP_*` environment variables are applied last. The result is
//! validated once and never changes for the lifetime of the process.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::app::catalog::NamingConvention;
use crate::error::ConfigError;
use crate::http::RetryPolicy;
use crate::paths;

const MAX_CYCLE_SECONDS: u64 = 7 * 24 * 60 * 60;
const MAX_STOP_GRACE_MS: u64 = 10 * 60 * 1_000;
const MAX_HTTP_TIMEOUT_SECS: u64 = 24 * 60 * 60;
const MAX_RETRY_DELAY_MS: u64 = 60 * 60 * 1_000;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub cycle: CycleConfig,
    pub storage: StorageConfig,
    pub player: PlayerConfig,
    pub http: HttpConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub access_token: String,
    pub project_id: String,
    pub per_page: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.vimeo.com".to_string(),
            access_token: String::new(),
            project_id: String::new(),
            per_page: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CycleConfig {
    pub target_seconds: u64,
    /// First capture group is the sequence token used for ordering.
    pub naming_pattern: String,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            target_seconds: 120,
            naming_pattern: r"BL_(\d+)".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub media_dir: PathBuf,
    pub state_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            media_dir: paths::default_media_dir(),
            state_file: paths::default_state_file(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub program: String,
    pub args: Vec<String>,
    pub stop_grace_ms: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            program: "mpv".to_string(),
            args: [
                "--fs",
                "--hwdec=auto",
                "--loop-file=inf",
                "--no-terminal",
                "--really-quiet",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            stop_grace_ms: 5_000,
        }
    }
}

impl PlayerConfig {
    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub download_timeout_secs: u64,
    pub attempts: usize,
    pub retry_delay_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            read_timeout_secs: 30,
            download_timeout_secs: 300,
            attempts: 3,
            retry_delay_ms: 1_000,
        }
    }
}

impl HttpConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub(crate) fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.attempts,
            delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    /// Appended to in addition to stderr when set.
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Where the loaded values came from, for the startup log line.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub files: Vec<PathBuf>,
    pub env_overrides: Vec<String>,
}

impl Config {
    pub fn load(cli_path: Option<&Path>) -> Result<(Self, ConfigSources), ConfigError> {
        if let Some(path) = cli_path.filter(|path| !path.exists()) {
            return Err(ConfigError::FileRead {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            });
        }

        let mut sources = ConfigSources::default();
        let mut merged = toml::Table::new();
        for path in discover_config_files(cli_path) {
            let table = read_table(&path)?;
            merge_tables(&mut merged, table);
            sources.files.push(path);
        }

        let mut config = Self::from_table(merged, Path::new("<merged>"))?;
        config.apply_env_overrides(|key| std::env::var(key).ok(), &mut sources)?;
        config.expand_paths();
        config.validate()?;
        Ok((config, sources))
    }

    #[cfg(test)]
    pub fn from_toml_str(raw: &str, origin: &Path) -> Result<Self, ConfigError> {
        let table = parse_table(raw, origin)?;
        Self::from_table(table, origin)
    }

    fn from_table(table: toml::Table, origin: &Path) -> Result<Self, ConfigError> {
        toml::Value::Table(table)
            .try_into()
            .map_err(|err: toml::de::Error| ConfigError::Parse {
                path: origin.to_path_buf(),
                message: err.to_string(),
            })
    }

    pub fn apply_env_overrides<F>(
        &mut self,
        lookup: F,
        sources: &mut ConfigSources,
    ) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut take = |key: &str| {
            let value = lookup(key).filter(|value| !value.trim().is_empty())?;
            sources.env_overrides.push(key.to_string());
            Some(value)
        };

        if let Some(v) = take("SIGNLOOP_ACCESS_TOKEN") {
            self.api.access_token = v;
        }
        if let Some(v) = take("SIGNLOOP_PROJECT_ID") {
            self.api.project_id = v;
        }
        if let Some(v) = take("SIGNLOOP_API_BASE_URL") {
            self.api.base_url = v;
        }
        if let Some(v) = take("SIGNLOOP_CYCLE_SECONDS") {
            self.cycle.target_seconds =
                v.trim().parse().map_err(|_| ConfigError::Invalid {
                    key: "SIGNLOOP_CYCLE_SECONDS",
                    message: format!("`{v}` is not a whole number of seconds"),
                })?;
        }
        if let Some(v) = take("SIGNLOOP_MEDIA_DIR") {
            self.storage.media_dir = PathBuf::from(v);
        }
        if let Some(v) = take("SIGNLOOP_PLAYER") {
            self.player.program = v;
        }
        Ok(())
    }

    fn expand_paths(&mut self) {
        self.storage.media_dir = paths::expand_home(&self.storage.media_dir);
        self.storage.state_file = paths::expand_home(&self.storage.state_file);
        if let Some(file) = self.log.file.as_mut() {
            *file = paths::expand_home(file);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.access_token.trim().is_empty() {
            return Err(ConfigError::Missing("api.access_token"));
        }
        if self.api.project_id.trim().is_empty() {
            return Err(ConfigError::Missing("api.project_id"));
        }
        if self.api.per_page == 0 {
            return Err(ConfigError::Invalid {
                key: "api.per_page",
                message: "must be at least 1".to_string(),
            });
        }
        check_range(
            "cycle.target_seconds",
            self.cycle.target_seconds,
            1,
            MAX_CYCLE_SECONDS,
        )?;
        self.naming_convention()?;
        if self.player.program.trim().is_empty() {
            return Err(ConfigError::Missing("player.program"));
        }
        check_range(
            "player.stop_grace_ms",
            self.player.stop_grace_ms,
            0,
            MAX_STOP_GRACE_MS,
        )?;
        if self.http.attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "http.attempts",
                message: "must be at least 1".to_string(),
            });
        }
        for (key, value) in [
            ("http.connect_timeout_secs", self.http.connect_timeout_secs),
            ("http.read_timeout_secs", self.http.read_timeout_secs),
            ("http.download_timeout_secs", self.http.download_timeout_secs),
        ] {
            check_range(key, value, 1, MAX_HTTP_TIMEOUT_SECS)?;
        }
        check_range(
            "http.retry_delay_ms",
            self.http.retry_delay_ms,
            0,
            MAX_RETRY_DELAY_MS,
        )?;
        Ok(())
    }

    pub fn naming_convention(&self) -> Result<NamingConvention, ConfigError> {
        NamingConvention::new(&self.cycle.naming_pattern).map_err(|message| {
            ConfigError::Invalid {
                key: "cycle.naming_pattern",
                message,
            }
        })
    }

    pub fn target_cycle_duration(&self) -> Duration {
        Duration::from_secs(self.cycle.target_seconds)
    }
}

fn check_range(key: &'static str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::Invalid {
            key,
            message: format!("{value} is outside the allowed range {min}..={max}"),
        });
    }
    Ok(())
}

pub fn discover_config_files(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from(paths::SYSTEM_CONFIG_FILE);
    if system.exists() {
        files.push(system);
    }

    if let Some(user) = paths::user_config_file().filter(|user| user.exists()) {
        files.push(user);
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
        }
        return files;
    }

    let local = PathBuf::from(paths::LOCAL_CONFIG_FILE);
    if local.exists() {
        files.push(local);
    }

    files
}

fn read_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    parse_table(&contents, path)
}

fn parse_table(contents: &str, path: &Path) -> Result<toml::Table, ConfigError> {
    contents
        .parse::<toml::Table>()
        .map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
}

/// Deep merge: nested tables merge key by key, everything else is replaced.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
