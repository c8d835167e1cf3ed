//! Clap derive structures for the `devlink` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// devlink -- keep this device linked to its command server
#[derive(Debug, Parser)]
#[command(
    name = "devlink",
    version,
    about = "Keep a device linked to its command server",
    long_about = "Holds a persistent WebSocket session to a command server under a\n\
        three-digit device code, answers heartbeats, reconnects with back-off,\n\
        and runs the configured network toggle when the server asks for one.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file to use instead of the platform default
    #[arg(long, env = "DEVLINK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Command server URL (overrides the config file)
    #[arg(long, short = 's', global = true)]
    pub server: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Connect and stay connected until interrupted
    Run(RunArgs),

    /// Show or change this device's code
    #[command(alias = "id")]
    Identity(IdentityArgs),

    /// Manage the configuration file
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Switch to this device code before connecting
    #[arg(long, short = 'd')]
    pub device: Option<String>,

    /// How to print link events
    #[arg(long, short = 'o', default_value = "text")]
    pub output: EventFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum EventFormat {
    /// Human-readable, colored when stdout is a terminal
    Text,
    /// One JSON object per line
    Json,
}

#[derive(Debug, Args)]
pub struct IdentityArgs {
    #[command(subcommand)]
    pub command: IdentityCommand,
}

#[derive(Debug, Subcommand)]
pub enum IdentityCommand {
    /// Print the stored device code
    Show,

    /// Store a new device code (exactly three digits)
    Set {
        /// The device code, e.g. 042
        code: String,
    },
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Interactive setup wizard
    Init,

    /// Print the effective configuration as TOML
    Show,

    /// Print the config file path
    Path,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Target shell
    pub shell: clap_complete::Shell,
}
