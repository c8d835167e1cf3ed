//! Session announcement: `register` then `status: ready` on every new
//! session, and a periodic `status: ready` refresh while connected.

use std::time::Duration;

use devlink_api::{ChannelHandle, OutboundFrame};
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::identity::DeviceCode;

#[derive(Debug, Clone)]
pub struct RegistrationProtocol {
    refresh_interval: Duration,
}

impl RegistrationProtocol {
    pub fn new(refresh_interval: Duration) -> Self {
        Self { refresh_interval }
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// Queue the register frame followed by the ready status.
    ///
    /// Only a rejected register frame is an error; the status frame is
    /// resent by the refresh timer anyway.
    pub fn announce(
        &self,
        handle: &ChannelHandle,
        device: &DeviceCode,
        now_ms: i64,
    ) -> Result<(), CoreError> {
        let register = OutboundFrame::register(device.as_str(), now_ms);
        if !handle.send_frame(&register) {
            return Err(CoreError::TransientSendFailure {
                frame: register.kind(),
            });
        }
        debug!(device = %device, "register sent");

        if !handle.send_frame(&OutboundFrame::ready()) {
            warn!(device = %device, "ready status not sent after register");
        }
        Ok(())
    }

    /// Resend `status: ready`. Returns `false` if the socket refused it.
    pub fn refresh(&self, handle: &ChannelHandle) -> bool {
        handle.send_frame(&OutboundFrame::ready())
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use devlink_api::Outbound;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn handle() -> (ChannelHandle, mpsc::UnboundedReceiver<Outbound>, CancellationToken) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        (
            ChannelHandle::new(tx, cancel.clone(), Duration::from_secs(1)),
            rx,
            cancel,
        )
    }

    fn text(out: Outbound) -> serde_json::Value {
        match out {
            Outbound::Text(t) => serde_json::from_str(&t).unwrap(),
            other @ Outbound::Close { .. } => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn register_precedes_ready() {
        let (handle, mut rx, _cancel) = handle();
        let proto = RegistrationProtocol::new(Duration::from_secs(300));
        proto
            .announce(&handle, &DeviceCode::parse("042").unwrap(), 123)
            .unwrap();

        let first = text(rx.try_recv().unwrap());
        assert_eq!(first["type"], "register");
        assert_eq!(first["deviceNumber"], "042");
        assert_eq!(first["timestamp"], 123);

        let second = text(rx.try_recv().unwrap());
        assert_eq!(second, serde_json::json!({"type": "status", "status": "ready"}));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn rejected_register_is_a_send_failure() {
        let (handle, _rx, cancel) = handle();
        cancel.cancel();
        let err = RegistrationProtocol::new(Duration::from_secs(300))
            .announce(&handle, &DeviceCode::parse("042").unwrap(), 1)
            .unwrap_err();
        assert!(matches!(err, CoreError::TransientSendFailure { frame: "register" }));
    }

    #[test]
    fn refresh_sends_ready() {
        let (handle, mut rx, _cancel) = handle();
        assert!(RegistrationProtocol::new(Duration::from_secs(300)).refresh(&handle));
        assert_eq!(text(rx.try_recv().unwrap())["status"], "ready");
    }
}
