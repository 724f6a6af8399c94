//! Disk-backed counters.
//!
//! A [`PersistentCounter`] is a named 64-bit integer mirrored to one file per
//! counter under the daemon's state directory. Every mutating operation
//! rewrites the mirror before returning, so a crash immediately after a call
//! cannot lose the update. Durability is best-effort: a write failure is
//! logged and the in-memory value still changes.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

/// A named integer whose value survives process restarts.
pub struct PersistentCounter {
    name: String,
    path: PathBuf,
    value: i64,
    loaded: bool,
}

impl PersistentCounter {
    /// Creates a counter backed by `<state_dir>/<name>`. The mirror is not
    /// read until the first operation, so construction never touches disk.
    pub fn new(state_dir: &Path, name: &str) -> Self {
        Self {
            name: name.to_string(),
            path: state_dir.join(name),
            value: 0,
            loaded: false,
        }
    }

    /// The stable identifier, also used as the emitted sample's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds `delta` and persists the new value.
    pub fn add(&mut self, delta: i64) {
        self.ensure_loaded();
        self.value = self.value.wrapping_add(delta);
        self.persist();
    }

    /// Overwrites the value and persists it.
    pub fn set(&mut self, value: i64) {
        self.ensure_loaded();
        self.value = value;
        self.persist();
    }

    /// Returns the current value.
    pub fn get(&mut self) -> i64 {
        self.ensure_loaded();
        self.value
    }

    /// Atomically reads the value and resets it to 0, persisting the reset.
    pub fn get_and_clear(&mut self) -> i64 {
        self.ensure_loaded();
        let value = self.value;
        self.value = 0;
        self.persist();
        value
    }

    fn ensure_loaded(&mut self) {
        if self.loaded {
            return;
        }
        self.loaded = true;
        self.value = match fs::read_to_string(&self.path) {
            Ok(content) => content.trim().parse().unwrap_or_else(|_| {
                warn!(
                    counter = %self.name,
                    content = %content.trim(),
                    "corrupt counter mirror, resetting to 0"
                );
                0
            }),
            // Missing record means a fresh counter.
            Err(_) => 0,
        };
    }

    /// Writes the mirror through a temp file and a rename so a crash
    /// mid-write never leaves a truncated record.
    fn persist(&self) {
        let mut tmp_name = OsString::from(self.path.as_os_str());
        tmp_name.push(".new");
        let tmp = PathBuf::from(tmp_name);
        let result = fs::write(&tmp, format!("{}\n", self.value))
            .and_then(|()| fs::rename(&tmp, &self.path));
        if let Err(e) = result {
            warn!(counter = %self.name, error = %e, "failed to persist counter");
        }
    }
}
