//! State persistence
//!
//! One flat JSON snapshot keyed by instrument symbol. Gate state survives a
//! restart so a restart never re-emits a regime or forgets a cooldown.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

use crate::strategy::{GateState, StatusSnapshot};

/// Snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Durable per-instrument state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstrumentRecord {
    pub gate: GateState,
    /// Last informational status sent
    #[serde(default)]
    pub last_status: Option<StatusSnapshot>,
    /// When `last_status` was sent (ms)
    #[serde(default)]
    pub last_status_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub version: u32,
    /// Save time (ms)
    pub saved_at: i64,
    #[serde(default)]
    pub instruments: BTreeMap<String, InstrumentRecord>,
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: 0,
            instruments: BTreeMap::new(),
        }
    }
}

impl StateSnapshot {
    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}

/// Load/save of the whole snapshot
pub trait StateStore: Send + Sync {
    fn load(&self) -> Result<StateSnapshot>;
    fn save(&self, snapshot: &StateSnapshot) -> Result<()>;
}

/// Pretty JSON file, replaced atomically through a temp file
#[derive(Debug, Clone)]
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    pub fn new(data_dir: impl AsRef<Path>, file_name: &str) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data dir {}", data_dir.display()))?;
        Ok(Self {
            path: data_dir.join(file_name),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl StateStore for JsonStateStore {
    fn load(&self) -> Result<StateSnapshot> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "📂 No previous state found, starting fresh");
            return Ok(StateSnapshot::default());
        }

        let json = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let snapshot: StateSnapshot = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;
        info!(
            path = %self.path.display(),
            version = snapshot.version,
            instruments = snapshot.instruments.len(),
            "📂 State loaded"
        );
        Ok(snapshot)
    }

    fn save(&self, snapshot: &StateSnapshot) -> Result<()> {
        let json = serde_json::to_string_pretty(snapshot)?;
        let tmp = self.tmp_path();
        fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        debug!(path = %self.path.display(), "💾 State saved");
        Ok(())
    }
}

/// Keeps the snapshot in memory only (persistence disabled, tests)
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    snapshot: Mutex<Option<StateSnapshot>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last saved snapshot, if any
    pub fn saved(&self) -> Option<StateSnapshot> {
        self.snapshot.lock().ok().and_then(|s| s.clone())
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> Result<StateSnapshot> {
        Ok(self.saved().unwrap_or_default())
    }

    fn save(&self, snapshot: &StateSnapshot) -> Result<()> {
        let mut slot = self
            .snapshot
            .lock()
            .map_err(|_| anyhow::anyhow!("state lock poisoned"))?;
        *slot = Some(snapshot.clone());
        Ok(())
    }
}

/// Stamp a snapshot with the current save time
pub fn stamp(instruments: BTreeMap<String, InstrumentRecord>) -> StateSnapshot {
    StateSnapshot {
        version: SNAPSHOT_VERSION,
        saved_at: Utc::now().timestamp_millis(),
        instruments,
    }
}
