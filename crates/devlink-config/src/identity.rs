//! File-backed device identity.
//!
//! The code is written to two stores in the same directory: a plain
//! `device_number.txt` and a structured `identity.toml`. Reads reconcile
//! them: when they disagree, or one is missing or corrupt, the most recently
//! written valid store wins and the other is rewritten to match.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use devlink_core::{CoreError, DeviceCode, IdentityStore};

const TEXT_FILE: &str = "device_number.txt";
const RECORD_FILE: &str = "identity.toml";

#[derive(Debug, Serialize, Deserialize)]
struct IdentityRecord {
    device_number: DeviceCode,
}

/// One store's view: the code it holds and when it was last written.
#[derive(Debug)]
struct Stored {
    code: DeviceCode,
    modified: SystemTime,
}

#[derive(Debug, Clone)]
pub struct FileIdentityStore {
    dir: PathBuf,
}

impl FileIdentityStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn text_path(&self) -> PathBuf {
        self.dir.join(TEXT_FILE)
    }

    fn record_path(&self) -> PathBuf {
        self.dir.join(RECORD_FILE)
    }

    fn read_text(&self) -> Option<Stored> {
        let path = self.text_path();
        let raw = read_if_present(&path)?;
        match DeviceCode::parse(raw.trim()) {
            Ok(code) => Some(Stored {
                code,
                modified: modified(&path),
            }),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring corrupt identity file");
                None
            }
        }
    }

    fn read_record(&self) -> Option<Stored> {
        let path = self.record_path();
        let raw = read_if_present(&path)?;
        match toml::from_str::<IdentityRecord>(&raw) {
            Ok(record) => Some(Stored {
                code: record.device_number,
                modified: modified(&path),
            }),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring corrupt identity record");
                None
            }
        }
    }

    fn write_text(&self, code: &DeviceCode) -> io::Result<()> {
        write_atomic(&self.text_path(), code.as_str())
    }

    fn write_record(&self, code: &DeviceCode) -> io::Result<()> {
        let record = IdentityRecord {
            device_number: code.clone(),
        };
        let body = toml::to_string(&record).map_err(io::Error::other)?;
        write_atomic(&self.record_path(), &body)
    }

    /// Bring the lagging store in line with `winner`.
    fn heal(&self, winner: &DeviceCode, text_is_stale: bool) {
        let result = if text_is_stale {
            self.write_text(winner)
        } else {
            self.write_record(winner)
        };
        match result {
            Ok(()) => debug!(device = %winner, "identity stores reconciled"),
            Err(e) => warn!(device = %winner, error = %e, "failed to reconcile identity stores"),
        }
    }
}

impl IdentityStore for FileIdentityStore {
    fn get(&self) -> Option<DeviceCode> {
        match (self.read_text(), self.read_record()) {
            (None, None) => None,
            (Some(text), None) => {
                self.heal(&text.code, false);
                Some(text.code)
            }
            (None, Some(record)) => {
                self.heal(&record.code, true);
                Some(record.code)
            }
            (Some(text), Some(record)) if text.code == record.code => Some(text.code),
            (Some(text), Some(record)) => {
                if text.modified > record.modified {
                    self.heal(&text.code, false);
                    Some(text.code)
                } else {
                    self.heal(&record.code, true);
                    Some(record.code)
                }
            }
        }
    }

    fn set(&self, code: &DeviceCode) -> Result<(), CoreError> {
        fs::create_dir_all(&self.dir).map_err(identity_error)?;
        self.write_record(code).map_err(identity_error)?;
        self.write_text(code).map_err(identity_error)?;
        debug!(device = %code, dir = %self.dir.display(), "identity saved");
        Ok(())
    }
}

fn identity_error(err: io::Error) -> CoreError {
    CoreError::Identity {
        message: err.to_string(),
    }
}

fn read_if_present(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(raw) => Some(raw),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read identity store");
            None
        }
    }
}

fn modified(path: &Path) -> SystemTime {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

fn write_atomic(path: &Path, body: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, body)?;
    fs::rename(&tmp, path)
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn code(s: &str) -> DeviceCode {
        DeviceCode::parse(s).unwrap()
    }

    fn set_mtime(path: &Path, secs_ago: u64) {
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(secs_ago))
            .unwrap();
    }

    #[test]
    fn empty_dir_has_no_identity() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FileIdentityStore::new(dir.path()).get().is_none());
    }

    #[test]
    fn set_writes_both_stores() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileIdentityStore::new(dir.path().join("state"));
        store.set(&code("042")).unwrap();

        assert_eq!(store.get(), Some(code("042")));
        assert_eq!(
            fs::read_to_string(dir.path().join("state").join(TEXT_FILE)).unwrap(),
            "042"
        );
        assert!(
            fs::read_to_string(dir.path().join("state").join(RECORD_FILE))
                .unwrap()
                .contains("device_number = \"042\"")
        );
    }

    #[test]
    fn missing_store_is_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(TEXT_FILE), "007\n").unwrap();

        let store = FileIdentityStore::new(dir.path());
        assert_eq!(store.get(), Some(code("007")));
        assert!(dir.path().join(RECORD_FILE).exists());
    }

    #[test]
    fn newer_store_wins_disagreement() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileIdentityStore::new(dir.path());
        store.set(&code("111")).unwrap();

        fs::write(dir.path().join(TEXT_FILE), "222").unwrap();
        set_mtime(&dir.path().join(RECORD_FILE), 3600);

        assert_eq!(store.get(), Some(code("222")));
        let record = fs::read_to_string(dir.path().join(RECORD_FILE)).unwrap();
        assert!(record.contains("222"));
    }

    #[test]
    fn older_text_is_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileIdentityStore::new(dir.path());
        store.set(&code("333")).unwrap();

        fs::write(dir.path().join(TEXT_FILE), "444").unwrap();
        set_mtime(&dir.path().join(TEXT_FILE), 3600);

        assert_eq!(store.get(), Some(code("333")));
        assert_eq!(fs::read_to_string(dir.path().join(TEXT_FILE)).unwrap(), "333");
    }

    #[test]
    fn corrupt_store_defers_to_valid_one() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileIdentityStore::new(dir.path());
        store.set(&code("555")).unwrap();
        fs::write(dir.path().join(TEXT_FILE), "not a code").unwrap();

        assert_eq!(store.get(), Some(code("555")));
        assert_eq!(fs::read_to_string(dir.path().join(TEXT_FILE)).unwrap(), "555");
    }
}
