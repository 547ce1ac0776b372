//! StateStore: JSON-file persistence for the scaling record.
//!
//! Two records live in the state directory:
//! - `auto_scale_state.json`: the [`ScalingState`]
//! - `cloud_instance.json`: the last provisioned [`InstanceInfo`], for operators
//!
//! Both are written with [`write_atomic`]. The store supports an on-disk and
//! an in-memory backend (the latter for testing).

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::error::{StateError, StateResult};
use crate::types::*;

/// File name of the scaling record.
pub const STATE_FILE: &str = "auto_scale_state.json";

/// File name of the instance descriptor.
pub const INSTANCE_FILE: &str = "cloud_instance.json";

enum Backend {
    Disk { dir: PathBuf },
    Memory(Mutex<MemoryRecords>),
}

#[derive(Default)]
struct MemoryRecords {
    state: Option<Vec<u8>>,
    instance: Option<Vec<u8>>,
}

/// Cloneable handle on the state directory.
#[derive(Clone)]
pub struct StateStore {
    backend: Arc<Backend>,
}

impl StateStore {
    /// Open (creating if needed) a state directory.
    pub fn open(dir: &Path) -> StateResult<Self> {
        fs::create_dir_all(dir).map_err(|source| StateError::Write {
            path: dir.to_path_buf(),
            source,
        })?;
        debug!(?dir, "state store opened");
        Ok(Self {
            backend: Arc::new(Backend::Disk {
                dir: dir.to_path_buf(),
            }),
        })
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> Self {
        Self {
            backend: Arc::new(Backend::Memory(Mutex::new(MemoryRecords::default()))),
        }
    }

    /// Path of the scaling record, or a placeholder for the in-memory backend.
    pub fn state_path(&self) -> PathBuf {
        match self.backend.as_ref() {
            Backend::Disk { dir } => dir.join(STATE_FILE),
            Backend::Memory(_) => PathBuf::from(format!("memory://{STATE_FILE}")),
        }
    }

    /// Path of the instance descriptor, or a placeholder for the in-memory backend.
    pub fn instance_path(&self) -> PathBuf {
        match self.backend.as_ref() {
            Backend::Disk { dir } => dir.join(INSTANCE_FILE),
            Backend::Memory(_) => PathBuf::from(format!("memory://{INSTANCE_FILE}")),
        }
    }

    // ── Scaling record ─────────────────────────────────────────────

    /// Load the scaling record.
    ///
    /// Returns `StateError::NotFound` if no record exists; callers treat that
    /// as fresh state. A record that fails to parse or violates the state
    /// invariants is an error.
    pub fn load(&self) -> StateResult<ScalingState> {
        let path = self.state_path();
        let bytes = self.read(Record::State)?.ok_or(StateError::NotFound(path))?;
        let state: ScalingState = serde_json::from_slice(&bytes)
            .map_err(|e| StateError::Deserialize(e.to_string()))?;
        state.validate()?;
        Ok(state)
    }

    /// Persist the scaling record atomically.
    pub fn save(&self, state: &ScalingState) -> StateResult<()> {
        state.validate()?;
        let bytes = serde_json::to_vec_pretty(state)
            .map_err(|e| StateError::Serialize(e.to_string()))?;
        self.write(Record::State, &bytes)?;
        debug!(
            scaled_to_cloud = state.scaled_to_cloud,
            failed_attempts = state.failed_attempts,
            "state saved"
        );
        Ok(())
    }

    /// Establish the startup record.
    ///
    /// With `reset`, any existing record is replaced by a fresh one. Otherwise
    /// an existing valid record is kept so a restart does not forget a scale-out;
    /// an absent or unreadable record is replaced by a fresh one.
    pub fn initialize(&self, start_time: f64, reset: bool) -> StateResult<ScalingState> {
        if !reset {
            match self.load() {
                Ok(state) => {
                    info!(
                        scaled_to_cloud = state.scaled_to_cloud,
                        failed_attempts = state.failed_attempts,
                        "resuming from existing state record"
                    );
                    return Ok(state);
                }
                Err(e) if e.is_not_found() => {
                    debug!("no existing state record");
                }
                Err(e) => {
                    warn!(error = %e, "existing state record unusable, starting fresh");
                }
            }
        }

        let state = ScalingState::fresh(start_time);
        self.save(&state)?;
        info!(path = %self.state_path().display(), "fresh state record written");
        Ok(state)
    }

    // ── Instance descriptor ────────────────────────────────────────

    /// Write the instance descriptor for external inspection.
    pub fn write_instance_descriptor(&self, instance: &InstanceInfo) -> StateResult<()> {
        let bytes = serde_json::to_vec_pretty(instance)
            .map_err(|e| StateError::Serialize(e.to_string()))?;
        self.write(Record::Instance, &bytes)?;
        debug!(instance = %instance.id, "instance descriptor written");
        Ok(())
    }

    /// Read the instance descriptor, if one was written.
    pub fn load_instance_descriptor(&self) -> StateResult<Option<InstanceInfo>> {
        match self.read(Record::Instance)? {
            Some(bytes) => {
                let info = serde_json::from_slice(&bytes)
                    .map_err(|e| StateError::Deserialize(e.to_string()))?;
                Ok(Some(info))
            }
            None => Ok(None),
        }
    }

    // ── Backend plumbing ───────────────────────────────────────────

    fn read(&self, record: Record) -> StateResult<Option<Vec<u8>>> {
        match self.backend.as_ref() {
            Backend::Disk { dir } => {
                let path = dir.join(record.file_name());
                match fs::read(&path) {
                    Ok(bytes) => Ok(Some(bytes)),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
                    Err(source) => Err(StateError::Read { path, source }),
                }
            }
            Backend::Memory(records) => {
                let records = records.lock().unwrap_or_else(|e| e.into_inner());
                Ok(records.slot(record).clone())
            }
        }
    }

    fn write(&self, record: Record, bytes: &[u8]) -> StateResult<()> {
        match self.backend.as_ref() {
            Backend::Disk { dir } => {
                let path = dir.join(record.file_name());
                write_atomic(&path, bytes).map_err(|source| StateError::Write { path, source })
            }
            Backend::Memory(records) => {
                let mut records = records.lock().unwrap_or_else(|e| e.into_inner());
                *records.slot_mut(record) = Some(bytes.to_vec());
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Record {
    State,
    Instance,
}

impl Record {
    fn file_name(self) -> &'static str {
        match self {
            Record::State => STATE_FILE,
            Record::Instance => INSTANCE_FILE,
        }
    }
}

impl MemoryRecords {
    fn slot(&self, record: Record) -> &Option<Vec<u8>> {
        match record {
            Record::State => &self.state,
            Record::Instance => &self.instance,
        }
    }

    fn slot_mut(&mut self, record: Record) -> &mut Option<Vec<u8>> {
        match record {
            Record::State => &mut self.state,
            Record::Instance => &mut self.instance,
        }
    }
}

/// Replace `path` with `bytes` so that readers never see a partial file.
///
/// Writes `<path>.tmp`, fsyncs it, renames it over `path`, then fsyncs the
/// parent directory so the rename itself is durable.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    let result = (|| {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, path)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }

    sync_parent_dir(path);
    Ok(())
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) {
    if let Some(parent) = path.parent()
        && let Ok(dir) = File::open(parent)
    {
        let _ = dir.sync_all();
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) {}
