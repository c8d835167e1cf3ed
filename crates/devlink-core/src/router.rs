//! Inbound frame classification.
//!
//! [`MessageRouter::route`] is pure: it decides what a frame means and
//! leaves acting on it to the controller. Order matters:
//!
//! 1. `type == "pong"`: heartbeat, nothing else.
//! 2. `targetDevice` set and not ours: dropped.
//! 3. `action == "toggleAirplane"` or the trigger phrase in `content` or the
//!    raw text: network toggle.
//! 4. Anything else: unrecognized.
//!
//! Frames that are not JSON objects are scanned for the trigger phrase as
//! plain text before being reported as malformed.

use devlink_api::InboundMessage;
use serde::Serialize;

use crate::identity::DeviceCode;

/// Action value that requests a network toggle.
pub const TOGGLE_ACTION: &str = "toggleAirplane";

/// Notification channel for inbound commands.
pub const MESSAGE_CHANNEL: &str = "message_channel";
/// Notification channel for connectivity changes.
pub const CONNECTION_CHANNEL: &str = "connection_channel";

/// `system` frame actions that never warrant a notification.
const SILENT_SYSTEM_ACTIONS: &[&str] = &["welcome", "register_success", "status_updated"];

/// How a toggle request was recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    Action,
    Phrase,
    /// Phrase found in a frame that failed to parse.
    RawText,
}

/// What an inbound frame means to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Heartbeat reply. `timestamp` is the effective pong time: `echo`, then
    /// `timestamp`; `None` means "use the receipt time".
    Pong { timestamp: Option<i64> },
    /// Addressed to another device.
    ForOtherDevice { target: String },
    Toggle(TriggerSource),
    Unrecognized { kind: String, action: String },
    Malformed { reason: String },
}

#[derive(Debug, Clone)]
pub struct MessageRouter {
    trigger_phrase: String,
}

impl MessageRouter {
    pub fn new(trigger_phrase: impl Into<String>) -> Self {
        Self {
            trigger_phrase: trigger_phrase.into(),
        }
    }

    pub fn route(&self, raw: &str, local: Option<&DeviceCode>) -> Route {
        let msg = match InboundMessage::parse(raw) {
            Ok(msg) => msg,
            Err(e) => {
                if self.mentions_trigger(raw) {
                    return Route::Toggle(TriggerSource::RawText);
                }
                return Route::Malformed {
                    reason: e.to_string(),
                };
            }
        };

        if msg.is_pong() {
            return Route::Pong {
                timestamp: msg.echo.or(msg.timestamp),
            };
        }

        if let Some(target) = msg.target_device() {
            if local.is_none_or(|code| code.as_str() != target) {
                return Route::ForOtherDevice {
                    target: target.to_owned(),
                };
            }
        }

        if msg.action() == TOGGLE_ACTION {
            return Route::Toggle(TriggerSource::Action);
        }
        if self.mentions_trigger(msg.content()) || self.mentions_trigger(raw) {
            return Route::Toggle(TriggerSource::Phrase);
        }

        Route::Unrecognized {
            kind: msg.kind().to_owned(),
            action: msg.action().to_owned(),
        }
    }

    fn mentions_trigger(&self, text: &str) -> bool {
        !self.trigger_phrase.is_empty() && text.contains(&self.trigger_phrase)
    }
}

// ── Notifications ────────────────────────────────────────────────────

/// A user-visible notification handed to the notification sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub channel_id: &'static str,
}

impl Notification {
    pub(crate) fn connected(device: &DeviceCode) -> Self {
        Self {
            title: "Connected".into(),
            body: format!("Device {device} is online"),
            channel_id: CONNECTION_CHANNEL,
        }
    }
}

/// Decide whether an inbound frame deserves a notification.
///
/// Non-JSON frames and routine `system` frames are suppressed. The body is
/// the frame's `message`, else its `content`, else the raw text.
pub fn should_notify(raw: &str) -> Option<Notification> {
    let msg = InboundMessage::parse(raw).ok()?;

    if msg.kind() == "system" && SILENT_SYSTEM_ACTIONS.contains(&msg.action()) {
        return None;
    }

    let body = msg
        .message
        .as_deref()
        .filter(|m| !m.is_empty())
        .or_else(|| msg.content.as_deref().filter(|c| !c.is_empty()))
        .unwrap_or(raw)
        .to_owned();

    Some(Notification {
        title: "New message".into(),
        body,
        channel_id: MESSAGE_CHANNEL,
    })
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_TRIGGER_PHRASE;

    fn router() -> MessageRouter {
        MessageRouter::new(DEFAULT_TRIGGER_PHRASE)
    }

    fn code(s: &str) -> DeviceCode {
        DeviceCode::parse(s).unwrap()
    }

    #[test]
    fn pong_prefers_echo() {
        let local = code("042");
        assert_eq!(
            router().route(r#"{"type":"pong","timestamp":900,"echo":500}"#, Some(&local)),
            Route::Pong { timestamp: Some(500) }
        );
        assert_eq!(
            router().route(r#"{"type":"pong","timestamp":900}"#, Some(&local)),
            Route::Pong { timestamp: Some(900) }
        );
        assert_eq!(
            router().route(r#"{"type":"pong"}"#, Some(&local)),
            Route::Pong { timestamp: None }
        );
    }

    #[test]
    fn pong_wins_over_target_filter() {
        let local = code("042");
        let route = router().route(r#"{"type":"pong","targetDevice":"999"}"#, Some(&local));
        assert!(matches!(route, Route::Pong { .. }));
    }

    #[test]
    fn other_device_never_toggles() {
        let local = code("042");
        for action in [TOGGLE_ACTION, "anything", ""] {
            let raw = format!(
                r#"{{"type":"command","action":"{action}","targetDevice":"999","content":"{DEFAULT_TRIGGER_PHRASE}"}}"#
            );
            assert_eq!(
                router().route(&raw, Some(&local)),
                Route::ForOtherDevice { target: "999".into() },
                "action {action:?}"
            );
        }
    }

    #[test]
    fn other_device_filter_survives_loose_field_types() {
        let local = code("042");
        let frames = [
            format!(r#"{{"targetDevice":"999","action":5,"content":"{DEFAULT_TRIGGER_PHRASE}"}}"#),
            format!(
                r#"{{"targetDevice":"999","content":"{DEFAULT_TRIGGER_PHRASE}","timestamp":"now"}}"#
            ),
            format!(r#"{{"targetDevice":999,"content":"{DEFAULT_TRIGGER_PHRASE}"}}"#),
        ];
        for raw in &frames {
            assert_eq!(
                router().route(raw, Some(&local)),
                Route::ForOtherDevice { target: "999".into() },
                "{raw}"
            );
        }
    }

    #[test]
    fn loose_field_types_for_us_still_toggle() {
        let local = code("042");
        let raw = format!(r#"{{"targetDevice":42,"content":"{DEFAULT_TRIGGER_PHRASE}"}}"#);
        assert!(matches!(
            router().route(&raw, Some(&local)),
            Route::ForOtherDevice { .. }
        ));

        let raw = format!(r#"{{"action":7,"content":"{DEFAULT_TRIGGER_PHRASE}","timestamp":"x"}}"#);
        assert_eq!(
            router().route(&raw, Some(&local)),
            Route::Toggle(TriggerSource::Phrase)
        );
    }

    #[test]
    fn targeted_frame_without_local_identity_is_dropped() {
        let route = router().route(r#"{"action":"toggleAirplane","targetDevice":"042"}"#, None);
        assert!(matches!(route, Route::ForOtherDevice { .. }));
    }

    #[test]
    fn toggle_by_action_for_us() {
        let local = code("042");
        assert_eq!(
            router().route(r#"{"action":"toggleAirplane","targetDevice":"042"}"#, Some(&local)),
            Route::Toggle(TriggerSource::Action)
        );
    }

    #[test]
    fn toggle_by_phrase_in_content() {
        let local = code("042");
        let raw = format!(r#"{{"type":"message","content":"{DEFAULT_TRIGGER_PHRASE}"}}"#);
        assert_eq!(
            router().route(&raw, Some(&local)),
            Route::Toggle(TriggerSource::Phrase)
        );
    }

    #[test]
    fn malformed_frame_falls_back_to_phrase_scan() {
        let local = code("042");
        let raw = format!("{{broken json {DEFAULT_TRIGGER_PHRASE}");
        assert_eq!(
            router().route(&raw, Some(&local)),
            Route::Toggle(TriggerSource::RawText)
        );
        assert!(matches!(
            router().route("{broken", Some(&local)),
            Route::Malformed { .. }
        ));
    }

    #[test]
    fn unknown_action_is_unrecognized() {
        let local = code("042");
        assert_eq!(
            router().route(r#"{"type":"system","action":"welcome"}"#, Some(&local)),
            Route::Unrecognized {
                kind: "system".into(),
                action: "welcome".into()
            }
        );
    }

    #[test]
    fn empty_phrase_never_matches() {
        let local = code("042");
        let route = MessageRouter::new("").route(r#"{"content":"x"}"#, Some(&local));
        assert!(matches!(route, Route::Unrecognized { .. }));
    }

    #[test]
    fn routine_system_frames_are_silent() {
        for action in SILENT_SYSTEM_ACTIONS {
            let raw = format!(r#"{{"type":"system","action":"{action}","message":"hi"}}"#);
            assert!(should_notify(&raw).is_none(), "{action}");
        }
        assert!(should_notify("not json").is_none());
    }

    #[test]
    fn notification_body_precedence() {
        let n = should_notify(r#"{"type":"system","action":"other","message":"m","content":"c"}"#)
            .unwrap();
        assert_eq!(n.body, "m");
        assert_eq!(n.channel_id, MESSAGE_CHANNEL);

        let n = should_notify(r#"{"type":"command","content":"c"}"#).unwrap();
        assert_eq!(n.body, "c");

        let raw = r#"{"type":"command"}"#;
        assert_eq!(should_notify(raw).unwrap().body, raw);
    }
}
