use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use twenty48_core::engine::Score;

/// One finished game in the local history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub value: Score,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

/// Personal best scores, highest first, capped at `capacity` entries.
///
/// When file-backed, the whole list is rewritten as a JSON array after every
/// accepted score.
#[derive(Debug)]
pub struct ScoreHistory {
    entries: Vec<HistoryEntry>,
    capacity: usize,
    path: Option<PathBuf>,
}

impl ScoreHistory {
    pub const DEFAULT_CAPACITY: usize = 10;

    pub fn in_memory(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity: capacity.max(1),
            path: None,
        }
    }

    /// Load from `path`. A missing file starts empty; an unreadable one is
    /// logged and also starts empty so play is never blocked on it.
    pub fn load<P: AsRef<Path>>(path: P, capacity: usize) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            match read_entries(&path) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!("ignoring unreadable score history: {err:#}");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };
        let mut history = Self {
            entries,
            capacity: capacity.max(1),
            path: Some(path),
        };
        history.normalize();
        history
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn best(&self) -> Option<Score> {
        self.entries.first().map(|e| e.value)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Record a finished game now. See [`ScoreHistory::record_at`].
    pub fn record(&mut self, value: Score) -> Result<bool> {
        self.record_at(value, now_millis())
    }

    /// Insert `value`, re-sort, truncate, and persist. Zero scores are
    /// ignored; returns whether the list was touched.
    pub fn record_at(&mut self, value: Score, timestamp: u64) -> Result<bool> {
        if value == 0 {
            return Ok(false);
        }
        self.entries.push(HistoryEntry { value, timestamp });
        self.normalize();
        self.persist()?;
        Ok(true)
    }

    // Stable sort: equal scores keep insertion order.
    fn normalize(&mut self) {
        self.entries.sort_by(|a, b| b.value.cmp(&a.value));
        self.entries.truncate(self.capacity);
    }

    fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let tmp = path.with_extension("json.tmp");
        let file = File::create(&tmp)
            .with_context(|| format!("failed to create {}", tmp.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &self.entries)?;
        writer.flush()?;
        drop(writer);
        std::fs::rename(&tmp, path)
            .with_context(|| format!("failed to replace {}", path.display()))?;
        debug!("wrote {} history entries to {}", self.entries.len(), path.display());
        Ok(())
    }
}

fn read_entries(path: &Path) -> Result<Vec<HistoryEntry>> {
    let file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("failed to parse {}", path.display()))
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
