//! The version store: durable record of each service's deployed version,
//! plus the append-only deployment audit log.
//!
//! Layout under the store root:
//!
//! ```text
//! <root>/
//!   <service>.json           # VersionRecord, written via tmp-file + rename
//!   <service>.events.jsonl   # Append-only DeploymentEvent entries
//! ```
//!
//! Writes to a service's record are serialized by a per-service mutex and
//! made visible atomically by writing to a temp file and renaming it over
//! the record, so a concurrent reader never sees a torn record and two
//! racing writers (an operator deploy and an in-flight auto-rollback)
//! never blend their writes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::{fs, io};

// Traits must be in scope for `.lines()` on BufReader and `.write_all()` on File.
use io::{BufRead, Write};

use jiff::Timestamp;

use crate::model::{DeploymentEvent, VersionRecord};

/// Errors that can occur during version store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = core::result::Result<T, StoreError>;

/// File-backed version store with atomic per-service writes.
pub struct VersionStore {
    root: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl VersionStore {
    /// Creates a store rooted at the given directory.
    ///
    /// The directory is created if it doesn't exist.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// Returns the default store root: `~/.rollout/state/`.
    pub fn default_root() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".rollout").join("state"))
    }

    // ── Version records ──

    /// Reads a service's current version record, if one exists.
    pub fn get(&self, service: &str) -> Result<Option<VersionRecord>> {
        let path = self.record_path(service);
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&json)?))
    }

    /// Writes a service's version record.
    ///
    /// Serialized against other `set` calls on the same service; on error
    /// the caller must not assume the transition occurred.
    pub fn set(&self, service: &str, version: &str) -> Result<VersionRecord> {
        let lock = self.lock_for(service);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let record = VersionRecord {
            service: service.to_string(),
            version: version.to_string(),
            updated_at: Timestamp::now(),
        };
        let json = serde_json::to_string_pretty(&record)?;

        let path = self.record_path(service);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        Ok(record)
    }

    // ── Audit log ──

    /// Appends a deployment event to the service's audit log.
    pub fn append_event(&self, event: &DeploymentEvent) -> Result<()> {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.events_path(&event.service))?;
        let mut line = serde_json::to_string(event)?;
        line.push('\n');
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Loads all deployment events for a service, oldest first.
    pub fn load_events(&self, service: &str) -> Result<Vec<DeploymentEvent>> {
        let path = self.events_path(service);
        let file = match fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let reader = io::BufReader::new(file);
        let mut events = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if !line.is_empty() {
                events.push(serde_json::from_str(&line)?);
            }
        }
        Ok(events)
    }

    // ── Paths and locks ──

    fn record_path(&self, service: &str) -> PathBuf {
        self.root.join(format!("{service}.json"))
    }

    fn events_path(&self, service: &str) -> PathBuf {
        self.root.join(format!("{service}.events.jsonl"))
    }

    fn lock_for(&self, service: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(service.to_string()).or_default().clone()
    }
}
