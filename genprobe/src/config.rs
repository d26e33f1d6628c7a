use std::{
    fmt, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use color_eyre::{
    Result,
    eyre::{WrapErr as _, eyre},
};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

pub const DASHSCOPE_KEY_VAR: &str = "DASHSCOPE_API_KEY";
pub const MINIMAX_KEY_VAR: &str = "MINIMAX_API_KEY";
pub const MODELSCOPE_KEY_VAR: &str = "MODELSCOPE_API_KEY";

const CONFIG_FILE_NAME: &str = "genprobe.ron";

const SHOWN_KEY_PREFIX: usize = 6;
// shorter keys would be mostly or entirely revealed by the prefix
const MIN_KEY_LEN_FOR_PREFIX: usize = 16;

/// A bearer token. Only the first few characters are ever printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn redacted(&self) -> String {
        if self.0.chars().count() < MIN_KEY_LEN_FOR_PREFIX {
            return "…".into();
        }
        let prefix: String = self.0.chars().take(SHOWN_KEY_PREFIX).collect();
        format!("{prefix}…")
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ApiKey").field(&self.redacted()).finish()
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: 10,
        }
    }
}

/// Contents of the optional `genprobe.ron` file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub dashscope_api_key: Option<String>,
    pub minimax_api_key: Option<String>,
    pub modelscope_api_key: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub poll_max_attempts: Option<u32>,
}

impl Config {
    pub fn key_for(&self, var: &str) -> Option<&str> {
        match var {
            DASHSCOPE_KEY_VAR => self.dashscope_api_key.as_deref(),
            MINIMAX_KEY_VAR => self.minimax_api_key.as_deref(),
            MODELSCOPE_KEY_VAR => self.modelscope_api_key.as_deref(),
            _ => None,
        }
    }

    pub fn poll_settings(&self) -> PollSettings {
        let default = PollSettings::default();
        PollSettings {
            interval: self
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(default.interval),
            max_attempts: self.poll_max_attempts.unwrap_or(default.max_attempts),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    Ok(dirs::config_local_dir()
        .ok_or(eyre!("Couldn't get config dir"))?
        .join(CONFIG_FILE_NAME))
}

/// Loads the config file, falling back to defaults when it doesn't exist
pub fn load_config() -> Result<Config> {
    load_config_from(&config_path()?)
}

pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        debug!("No config file at {}", path.display());
        return Ok(Config::default());
    }
    let src = fs::read_to_string(path)?;
    ron::from_str(&src).wrap_err_with(|| format!("parsing {}", path.display()))
}

/// Picks the credential for `var`: an explicit value first, then the
/// environment, then the config file.
pub fn resolve_api_key(
    explicit: Option<String>,
    var: &str,
    config: &Config,
) -> Result<ApiKey, ApiError> {
    pick_api_key(explicit, std::env::var(var).ok(), config.key_for(var), var)
}

fn pick_api_key(
    explicit: Option<String>,
    from_env: Option<String>,
    from_config: Option<&str>,
    var: &str,
) -> Result<ApiKey, ApiError> {
    explicit
        .into_iter()
        .chain(from_env)
        .chain(from_config.map(str::to_owned))
        .map(|k| k.trim().to_owned())
        .find(|k| !k.is_empty())
        .map(ApiKey)
        .ok_or_else(|| ApiError::Configuration { var: var.into() })
}
