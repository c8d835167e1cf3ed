//! Configuration for the devlink agent.
//!
//! A TOML file in the platform config dir, overlaid with `DEVLINK_*`
//! environment variables, translated into `devlink_core::LinkConfig`.
//! The durable device identity lives next to it (see [`identity`]).

pub mod identity;

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use devlink_api::ServerEndpoint;
use devlink_core::{BackoffStrategy, DEFAULT_TRIGGER_PHRASE, LinkConfig};

pub use identity::FileIdentityStore;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: Server,

    #[serde(default)]
    pub link: Link,

    #[serde(default)]
    pub effector: EffectorSettings,

    #[serde(default)]
    pub identity: IdentitySettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Server {
    /// Command server base URL (`ws://` or `wss://`).
    #[serde(default = "default_server_url")]
    pub url: String,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            url: default_server_url(),
        }
    }
}

fn default_server_url() -> String {
    "ws://127.0.0.1:9000".into()
}

/// Link tunables. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Link {
    #[serde(default = "default_trigger_phrase")]
    pub trigger_phrase: String,

    #[serde(default)]
    pub backoff: BackoffStrategy,

    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_interval_secs: u64,

    #[serde(default = "default_pong_timeout_secs")]
    pub pong_timeout_secs: u64,

    #[serde(default = "default_required_failed_checks")]
    pub required_failed_checks: u32,

    #[serde(default = "default_status_refresh_secs")]
    pub status_refresh_secs: u64,

    #[serde(default = "default_state_cooldown_secs")]
    pub state_cooldown_secs: u64,

    /// How long a closing socket may take to finish its handshake.
    #[serde(default = "default_close_grace_ms")]
    pub close_grace_ms: u64,
}

impl Default for Link {
    fn default() -> Self {
        Self {
            trigger_phrase: default_trigger_phrase(),
            backoff: BackoffStrategy::default(),
            heartbeat_interval_secs: default_heartbeat_secs(),
            pong_timeout_secs: default_pong_timeout_secs(),
            required_failed_checks: default_required_failed_checks(),
            status_refresh_secs: default_status_refresh_secs(),
            state_cooldown_secs: default_state_cooldown_secs(),
            close_grace_ms: default_close_grace_ms(),
        }
    }
}

fn default_trigger_phrase() -> String {
    DEFAULT_TRIGGER_PHRASE.into()
}
fn default_heartbeat_secs() -> u64 {
    20
}
fn default_pong_timeout_secs() -> u64 {
    15
}
fn default_required_failed_checks() -> u32 {
    2
}
fn default_status_refresh_secs() -> u64 {
    300
}
fn default_state_cooldown_secs() -> u64 {
    5
}
fn default_close_grace_ms() -> u64 {
    1_000
}

/// How the agent performs a network toggle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct EffectorSettings {
    /// Shell command run for each toggle. Unset means the capability is
    /// unavailable.
    pub command: Option<String>,

    /// Kill the command after this many seconds.
    #[serde(default = "default_effector_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_effector_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct IdentitySettings {
    /// Directory holding the identity files. Defaults to the platform data dir.
    pub dir: Option<PathBuf>,
}

impl Config {
    /// Build the runtime link configuration.
    pub fn to_link_config(&self) -> Result<LinkConfig, ConfigError> {
        let endpoint: ServerEndpoint =
            self.server
                .url
                .parse()
                .map_err(|e: devlink_api::Error| ConfigError::Validation {
                    field: "server.url".into(),
                    reason: e.to_string(),
                })?;

        if self.link.pong_timeout_secs == 0 || self.link.heartbeat_interval_secs == 0 {
            return Err(ConfigError::Validation {
                field: "link".into(),
                reason: "heartbeat interval and pong timeout must be non-zero".into(),
            });
        }

        let mut config = LinkConfig::new(endpoint);
        config.trigger_phrase.clone_from(&self.link.trigger_phrase);
        config.backoff = self.link.backoff;
        config.heartbeat.interval = Duration::from_secs(self.link.heartbeat_interval_secs);
        config.heartbeat.pong_timeout = Duration::from_secs(self.link.pong_timeout_secs);
        config.heartbeat.required_failed_checks = self.link.required_failed_checks.max(1);
        config.status_refresh_interval = Duration::from_secs(self.link.status_refresh_secs.max(1));
        config.state_cooldown = Duration::from_secs(self.link.state_cooldown_secs);
        config.close_grace = Duration::from_millis(self.link.close_grace_ms);
        Ok(config)
    }

    /// Where the identity files live.
    pub fn identity_dir(&self) -> PathBuf {
        self.identity.dir.clone().unwrap_or_else(data_dir)
    }
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "devlink", "devlink")
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback(".config").join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Default directory for durable state (the device identity).
pub fn data_dir() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback(".local/share"),
        |dirs| dirs.data_dir().to_path_buf(),
    )
}

fn dirs_fallback(sub: &str) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(sub);
    p.push("devlink");
    p
}

// ── Loading ─────────────────────────────────────────────────────────

/// Load the config from the canonical path + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the config from `path` + environment. A missing file yields defaults.
///
/// Environment keys use a double underscore for nesting:
/// `DEVLINK_SERVER__URL`, `DEVLINK_LINK__TRIGGER_PHRASE`. `DEVLINK_CONFIG`
/// names the file itself and is not a config key.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("DEVLINK_").split("__").ignore(&["config"]));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if anything goes wrong.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Saving ──────────────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(cfg.server.url, "ws://127.0.0.1:9000");
        assert_eq!(cfg.link.trigger_phrase, DEFAULT_TRIGGER_PHRASE);
        assert_eq!(cfg.link.backoff, BackoffStrategy::CappedExponential);
        assert!(cfg.effector.command.is_none());
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[server]
url = "wss://relay.example.com/link"

[link]
trigger_phrase = "switch now"
backoff = "attempt-bounded"
heartbeat_interval_secs = 10
close_grace_ms = 250

[effector]
command = "nmcli radio wifi off && nmcli radio wifi on"
"#,
        )
        .unwrap();

        let cfg = load_config_from(&path).unwrap();
        assert_eq!(cfg.link.trigger_phrase, "switch now");
        assert_eq!(cfg.link.pong_timeout_secs, 15);

        let link = cfg.to_link_config().unwrap();
        assert_eq!(link.backoff, BackoffStrategy::AttemptBounded);
        assert_eq!(link.heartbeat.interval, Duration::from_secs(10));
        assert_eq!(link.channel_config().close_grace, Duration::from_millis(250));
        assert_eq!(
            link.endpoint.device_url("042").unwrap().as_str(),
            "wss://relay.example.com/link/device/042"
        );
        assert_eq!(cfg.effector.timeout_secs, 30);
    }

    #[test]
    fn bad_server_url_is_a_validation_error() {
        let mut cfg = Config::default();
        cfg.server.url = "http://10.0.0.5".into();
        assert!(matches!(
            cfg.to_link_config(),
            Err(ConfigError::Validation { ref field, .. }) if field == "server.url"
        ));
    }

    #[test]
    fn zero_heartbeat_is_rejected() {
        let mut cfg = Config::default();
        cfg.link.heartbeat_interval_secs = 0;
        assert!(cfg.to_link_config().is_err());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");
        let mut cfg = Config::default();
        cfg.effector.command = Some("true".into());
        cfg.identity.dir = Some(dir.path().join("state"));

        save_config_to(&cfg, &path).unwrap();
        assert_eq!(load_config_from(&path).unwrap(), cfg);
    }
}
