//! Host integrations for `devlink run`: the shell-command effector and the
//! log-backed notification sink.

use std::process::Stdio;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::process::Command;
use tracing::{debug, info};

use devlink_core::{CoreError, Effector, Notification, NotificationSink};

/// Runs a shell command to toggle the network.
#[derive(Debug, Clone)]
pub struct CommandEffector {
    command: String,
    timeout: Duration,
}

impl CommandEffector {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }

    async fn run(&self) -> Result<(), CoreError> {
        debug!(command = %self.command, "running network toggle");
        let child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CoreError::EffectorFailed {
                message: format!("cannot start `{}`: {e}", self.command),
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| CoreError::EffectorFailed {
                message: format!("timed out after {}s", self.timeout.as_secs()),
            })?
            .map_err(|e| CoreError::EffectorFailed {
                message: e.to_string(),
            })?;

        if output.status.success() {
            info!("network toggle finished");
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(CoreError::EffectorFailed {
                message: format!("{}: {}", output.status, stderr.trim()),
            })
        }
    }
}

impl Effector for CommandEffector {
    fn is_available(&self) -> bool {
        !self.command.trim().is_empty()
    }

    fn execute(&self) -> BoxFuture<'_, Result<(), CoreError>> {
        Box::pin(self.run())
    }
}

/// Writes notification decisions to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify(&self, notification: &Notification) {
        info!(
            channel = notification.channel_id,
            title = %notification.title,
            "{}",
            notification.body
        );
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn successful_command() {
        let effector = CommandEffector::new("true", Duration::from_secs(5));
        assert!(effector.is_available());
        effector.execute().await.unwrap();
    }

    #[tokio::test]
    async fn failing_command_reports_stderr() {
        let effector = CommandEffector::new("echo boom >&2; exit 3", Duration::from_secs(5));
        let err = effector.execute().await.unwrap_err();
        assert!(matches!(err, CoreError::EffectorFailed { ref message } if message.contains("boom")));
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let effector = CommandEffector::new("sleep 5", Duration::from_millis(100));
        let err = effector.execute().await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn blank_command_is_unavailable() {
        assert!(!CommandEffector::new("  ", Duration::from_secs(1)).is_available());
    }
}
