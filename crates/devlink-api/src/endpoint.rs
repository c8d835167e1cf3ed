//! Server endpoint addressing.
//!
//! The server exposes one WebSocket path per device:
//! `scheme://host:port/device/{code}`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Error;

/// Base URL of the command server (`ws://` or `wss://`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServerEndpoint {
    base: Url,
}

impl ServerEndpoint {
    pub fn new(base: Url) -> Result<Self, Error> {
        match base.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(Error::InvalidEndpoint {
                    url: base.to_string(),
                    reason: format!("expected ws:// or wss://, got {other}://"),
                });
            }
        }
        if base.host_str().is_none() || base.cannot_be_a_base() {
            return Err(Error::InvalidEndpoint {
                url: base.to_string(),
                reason: "missing host".into(),
            });
        }
        Ok(Self { base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// URL of the per-device socket.
    pub fn device_url(&self, code: &str) -> Result<Url, Error> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| Error::InvalidEndpoint {
                url: self.base.to_string(),
                reason: "URL cannot carry a path".into(),
            })?
            .pop_if_empty()
            .push("device")
            .push(code);
        Ok(url)
    }
}

impl FromStr for ServerEndpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(Url::parse(s)?)
    }
}

impl TryFrom<String> for ServerEndpoint {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ServerEndpoint> for String {
    fn from(value: ServerEndpoint) -> Self {
        value.base.into()
    }
}

impl fmt::Display for ServerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.base.fmt(f)
    }
}
