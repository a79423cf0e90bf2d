use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::domain::abi::ArgTemplate;
use crate::infrastructure::DEFAULT_EXPLORER_URL;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointConfig {
    pub rpc: Option<String>,
    pub ws: Option<String>,
    pub ipc: Option<String>,
    /// Name of the environment variable holding the signer's private key
    #[serde(default = "default_key_env")]
    pub key_env: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetupConfig {
    pub address: Option<String>,
    #[serde(default = "default_target_getter")]
    pub target_getter: String,
    #[serde(default = "default_solved")]
    pub solved: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    #[serde(default)]
    pub owner_slot: u64,
    #[serde(default = "default_claim")]
    pub claim: String,
    #[serde(default)]
    pub claim_args: Vec<ArgTemplate>,
    #[serde(default = "default_withdraw")]
    pub withdraw: String,
    #[serde(default = "default_withdraw_args")]
    pub withdraw_args: Vec<ArgTemplate>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FinalizationConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// Etherscan-compatible API used by `inspect` for history and verified source
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExplorerConfig {
    #[serde(default = "default_explorer_url")]
    pub url: String,
    /// Name of the environment variable holding the API key
    #[serde(default = "default_explorer_key_env")]
    pub key_env: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub endpoint: EndpointConfig,

    #[serde(default)]
    pub setup: SetupConfig,

    #[serde(default)]
    pub target: TargetConfig,

    #[serde(default)]
    pub finalization: FinalizationConfig,

    #[serde(default)]
    pub explorer: ExplorerConfig,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            rpc: None,
            ws: None,
            ipc: None,
            key_env: default_key_env(),
        }
    }
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self {
            address: None,
            target_getter: default_target_getter(),
            solved: default_solved(),
        }
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            owner_slot: 0,
            claim: default_claim(),
            claim_args: Vec::new(),
            withdraw: default_withdraw(),
            withdraw_args: default_withdraw_args(),
        }
    }
}

impl Default for FinalizationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            url: default_explorer_url(),
            key_env: default_explorer_key_env(),
        }
    }
}

impl ExplorerConfig {
    /// API key from the configured environment variable, if set
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.key_env)
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
    }
}

impl FinalizationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_key_env() -> String {
    "PRY_PRIVATE_KEY".to_string()
}

fn default_target_getter() -> String {
    "wallet() returns (address)".to_string()
}

fn default_solved() -> String {
    "isSolved() returns (bool)".to_string()
}

fn default_claim() -> String {
    "setOwner()".to_string()
}

fn default_withdraw() -> String {
    "withdraw(address)".to_string()
}

fn default_withdraw_args() -> Vec<ArgTemplate> {
    vec![ArgTemplate::Caller]
}

fn default_explorer_url() -> String {
    DEFAULT_EXPLORER_URL.to_string()
}

fn default_explorer_key_env() -> String {
    "ETHERSCAN_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_poll_interval_ms() -> u64 {
    500
}

/// Load the config file
///
/// `--config` and `$PRY_CONFIG` name a file that must exist; the default
/// location is optional and a missing file yields defaults.
pub fn load(explicit: Option<&Path>) -> Result<Config> {
    let explicit = explicit.map(Path::to_path_buf).or_else(env_config_path);
    load_resolved(explicit.as_deref(), default_config_path().as_deref())
}

fn load_resolved(explicit: Option<&Path>, fallback: Option<&Path>) -> Result<Config> {
    match (explicit, fallback) {
        (Some(path), _) => load_from(path),
        (None, Some(path)) if path.exists() => load_from(path),
        _ => Ok(Config::default()),
    }
}

pub fn load_from(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    parse(&content).with_context(|| format!("invalid config {}", path.display()))
}

pub fn parse(content: &str) -> Result<Config> {
    Ok(toml::from_str::<Config>(content)?)
}

fn env_config_path() -> Option<PathBuf> {
    std::env::var_os("PRY_CONFIG")
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// Default config location: XDG, then ~/.config, then the platform config dir
fn default_config_path() -> Option<PathBuf> {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME").map(PathBuf::from) {
        return Some(xdg.join("pry").join("config.toml"));
    }
    if let Some(home) = std::env::var_os("HOME").map(PathBuf::from) {
        return Some(home.join(".config").join("pry").join("config.toml"));
    }

    directories::ProjectDirs::from("io", "pry", "pry")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}
