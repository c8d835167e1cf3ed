//! Config subcommand handlers.

use dialoguer::{Input, Select};

use devlink_config::{Config, ConfigError};
use devlink_core::{BackoffStrategy, DeviceCode, IdentityStore};

use super::{config_file, identity_store, load_settings};
use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::{CliError, prompt_err};

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init => init(global),

        ConfigCommand::Show => {
            let cfg = load_settings(global)?;
            let rendered = toml::to_string_pretty(&cfg).map_err(ConfigError::from)?;
            print!("{rendered}");
            Ok(())
        }

        ConfigCommand::Path => {
            println!("{}", config_file(global).display());
            Ok(())
        }
    }
}

// ── Init: interactive wizard ────────────────────────────────────────

fn init(global: &GlobalOpts) -> Result<(), CliError> {
    let path = config_file(global);
    let mut cfg = load_settings(global).unwrap_or_default();
    eprintln!("devlink configuration wizard");
    eprintln!("   Config path: {}\n", path.display());

    cfg.server.url = Input::new()
        .with_prompt("Command server URL")
        .default(cfg.server.url.clone())
        .validate_with(|url: &String| -> Result<(), String> {
            let mut probe = Config::default();
            probe.server.url.clone_from(url);
            probe.to_link_config().map(drop).map_err(|e| e.to_string())
        })
        .interact_text()
        .map_err(prompt_err)?;

    cfg.link.trigger_phrase = Input::new()
        .with_prompt("Trigger phrase")
        .default(cfg.link.trigger_phrase.clone())
        .interact_text()
        .map_err(prompt_err)?;

    let strategies = [
        BackoffStrategy::CappedExponential,
        BackoffStrategy::AttemptBounded,
    ];
    let labels = [
        "Capped exponential (5s doubling, max 2 min)",
        "Attempt bounded (5s x1.5, pause 30s after 5 tries)",
    ];
    let current = strategies
        .iter()
        .position(|s| *s == cfg.link.backoff)
        .unwrap_or(0);
    let picked = Select::new()
        .with_prompt("Reconnect back-off")
        .items(&labels)
        .default(current)
        .interact()
        .map_err(prompt_err)?;
    cfg.link.backoff = strategies.get(picked).copied().unwrap_or_default();

    let command: String = Input::new()
        .with_prompt("Network toggle command (blank for none)")
        .default(cfg.effector.command.clone().unwrap_or_default())
        .allow_empty(true)
        .interact_text()
        .map_err(prompt_err)?;
    cfg.effector.command = Some(command.trim().to_owned()).filter(|c| !c.is_empty());

    let store = identity_store(&cfg);
    let current_code = store.get().map(String::from).unwrap_or_default();
    let code: String = Input::new()
        .with_prompt("Device code (three digits, blank to skip)")
        .default(current_code)
        .allow_empty(true)
        .validate_with(|c: &String| -> Result<(), String> {
            if c.is_empty() {
                return Ok(());
            }
            DeviceCode::parse(c).map(drop).map_err(|e| e.to_string())
        })
        .interact_text()
        .map_err(prompt_err)?;

    devlink_config::save_config_to(&cfg, &path)?;
    eprintln!("\n✓ Configuration written to {}", path.display());

    if !code.is_empty() {
        let code = DeviceCode::parse(&code)?;
        store.set(&code)?;
        eprintln!("✓ Device code set to {code}");
    }

    eprintln!("\n  Start the link: devlink run");
    Ok(())
}
