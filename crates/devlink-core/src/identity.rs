//! Device identity: the 3-digit code a device registers under.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Number of digits in a device code.
pub const DEVICE_CODE_LEN: usize = 3;

/// A validated device code: exactly three ASCII digits, leading zeros kept.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceCode(String);

impl DeviceCode {
    pub fn parse(value: &str) -> Result<Self, CoreError> {
        if value.len() == DEVICE_CODE_LEN && value.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(value.to_owned()))
        } else {
            Err(CoreError::InvalidIdentity {
                value: value.to_owned(),
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for DeviceCode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DeviceCode {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DeviceCode> for String {
    fn from(value: DeviceCode) -> Self {
        value.0
    }
}

impl fmt::Display for DeviceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Store ────────────────────────────────────────────────────────────

/// Durable home of the device code.
///
/// Implementations backed by more than one store must reconcile them
/// themselves; the controller only ever sees a single answer.
pub trait IdentityStore: Send + Sync {
    /// The current code, if one has been set.
    fn get(&self) -> Option<DeviceCode>;

    /// Persist a new code.
    fn set(&self, code: &DeviceCode) -> Result<(), CoreError>;
}

/// Process-local identity store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    code: ArcSwapOption<DeviceCode>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_code(code: DeviceCode) -> Self {
        Self {
            code: ArcSwapOption::from_pointee(code),
        }
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn get(&self) -> Option<DeviceCode> {
        self.code.load_full().map(|code| (*code).clone())
    }

    fn set(&self, code: &DeviceCode) -> Result<(), CoreError> {
        self.code.store(Some(Arc::new(code.clone())));
        Ok(())
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_three_digits() {
        assert_eq!(DeviceCode::parse("042").unwrap().as_str(), "042");
        assert_eq!(DeviceCode::parse("999").unwrap().to_string(), "999");
    }

    #[test]
    fn rejects_everything_else() {
        for bad in ["7", "42", "0420", "", "04a", " 042", "042\n", "٠٤٢"] {
            assert!(
                matches!(DeviceCode::parse(bad), Err(CoreError::InvalidIdentity { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn serde_goes_through_validation() {
        let code: DeviceCode = serde_json::from_str("\"007\"").unwrap();
        assert_eq!(code.as_str(), "007");
        assert!(serde_json::from_str::<DeviceCode>("\"7\"").is_err());
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryIdentityStore::new();
        assert!(store.get().is_none());
        let code = DeviceCode::parse("123").unwrap();
        store.set(&code).unwrap();
        assert_eq!(store.get(), Some(code));
    }
}
