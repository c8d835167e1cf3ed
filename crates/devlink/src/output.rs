//! Rendering of link events for `devlink run`.

use std::io::{self, IsTerminal, Write};

use chrono::{DateTime, Local, SecondsFormat};
use owo_colors::OwoColorize;
use serde::Serialize;

use devlink_core::ControllerEvent;

use crate::cli::EventFormat;

/// Color only when stdout is a terminal and `NO_COLOR` is unset.
pub fn should_color() -> bool {
    io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}

#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum EventLine<'a> {
    Message { at: String, text: &'a str },
    Connection { at: String, connected: bool },
    CapabilityRequired { at: String },
}

impl<'a> EventLine<'a> {
    fn from_event(event: &'a ControllerEvent, at: DateTime<Local>) -> Self {
        let at = at.to_rfc3339_opts(SecondsFormat::Millis, false);
        match event {
            ControllerEvent::MessageReceived(text) => Self::Message { at, text },
            ControllerEvent::ConnectionStateChanged(connected) => Self::Connection {
                at,
                connected: *connected,
            },
            ControllerEvent::CapabilityRequired => Self::CapabilityRequired { at },
        }
    }
}

pub fn render_event(
    format: EventFormat,
    event: &ControllerEvent,
    at: DateTime<Local>,
    color: bool,
) -> Result<String, serde_json::Error> {
    match format {
        EventFormat::Json => serde_json::to_string(&EventLine::from_event(event, at)),
        EventFormat::Text => Ok(render_text(event, at, color)),
    }
}

fn render_text(event: &ControllerEvent, at: DateTime<Local>, color: bool) -> String {
    let stamp = at.format("%H:%M:%S").to_string();
    let (tag, body) = match event {
        ControllerEvent::MessageReceived(text) => ("msg", text.clone()),
        ControllerEvent::ConnectionStateChanged(true) => ("link", "connected".to_owned()),
        ControllerEvent::ConnectionStateChanged(false) => ("link", "disconnected".to_owned()),
        ControllerEvent::CapabilityRequired => (
            "need",
            "network toggle capability is not configured (set effector.command)".to_owned(),
        ),
    };
    if !color {
        return format!("{stamp} [{tag}] {body}");
    }
    let tag = match event {
        ControllerEvent::ConnectionStateChanged(true) => tag.green().bold().to_string(),
        ControllerEvent::ConnectionStateChanged(false) => tag.red().bold().to_string(),
        ControllerEvent::CapabilityRequired => tag.yellow().bold().to_string(),
        ControllerEvent::MessageReceived(_) => tag.cyan().to_string(),
    };
    format!("{} [{tag}] {body}", stamp.dimmed())
}

pub fn print_line(line: &str) {
    let mut out = io::stdout().lock();
    let _ = writeln!(out, "{line}");
}
