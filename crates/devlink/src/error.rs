//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use devlink_config::ConfigError;
use devlink_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to {url}")]
    #[diagnostic(
        code(devlink::connection_failed),
        help(
            "Check that the command server is running and reachable.\n\
             Reason: {reason}"
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Network is unreachable")]
    #[diagnostic(
        code(devlink::unreachable),
        help("Bring a network interface up and run the command again.")
    )]
    Unreachable,

    // ── Identity ─────────────────────────────────────────────────────
    #[error("'{value}' is not a valid device code")]
    #[diagnostic(
        code(devlink::invalid_identity),
        help("A device code is exactly three digits, e.g. 042.")
    )]
    InvalidIdentity { value: String },

    #[error("No device code is set")]
    #[diagnostic(
        code(devlink::no_identity),
        help("Set one with: devlink identity set <code>")
    )]
    NoIdentity,

    #[error("Identity store failed: {message}")]
    #[diagnostic(code(devlink::identity_store))]
    IdentityStore { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(devlink::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(
        code(devlink::config),
        help("Inspect the file with: devlink config show\nRecreate it with: devlink config init")
    )]
    Config(#[from] ConfigError),

    // ── Link ─────────────────────────────────────────────────────────
    #[error("Link error: {message}")]
    #[diagnostic(code(devlink::link))]
    Link { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Unreachable => exit_code::CONNECTION,
            Self::InvalidIdentity { .. } | Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed { url, reason },
            CoreError::TransportUnreachable => CliError::Unreachable,
            CoreError::InvalidIdentity { value } => CliError::InvalidIdentity { value },
            CoreError::Identity { message } => CliError::IdentityStore { message },
            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
            other => CliError::Link {
                message: other.to_string(),
            },
        }
    }
}

/// Map a dialoguer / interactive I/O failure into CliError.
pub fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_stable() {
        assert_eq!(CliError::from(CoreError::TransportUnreachable).exit_code(), 7);
        assert_eq!(
            CliError::from(CoreError::InvalidIdentity { value: "12".into() }).exit_code(),
            2
        );
        let cfg = ConfigError::Validation {
            field: "server.url".into(),
            reason: "bad".into(),
        };
        assert_eq!(CliError::from(cfg).exit_code(), 1);
        assert_eq!(CliError::from(CoreError::ControllerStopped).exit_code(), 1);
    }
}
