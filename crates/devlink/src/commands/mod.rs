//! Command handlers.

pub mod config_cmd;
pub mod identity;
pub mod run;

use std::path::PathBuf;

use devlink_config::{Config, FileIdentityStore};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// The config file in effect: `--config` or the platform default.
pub fn config_file(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(devlink_config::config_path)
}

/// Load config from file + environment, then apply CLI flag overrides.
pub fn load_settings(global: &GlobalOpts) -> Result<Config, CliError> {
    let mut cfg = devlink_config::load_config_from(&config_file(global))?;
    if let Some(ref url) = global.server {
        cfg.server.url.clone_from(url);
    }
    Ok(cfg)
}

pub fn identity_store(cfg: &Config) -> FileIdentityStore {
    FileIdentityStore::new(cfg.identity_dir())
}
