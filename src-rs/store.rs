//! Persistent record store.
//!
//! Everything lives in one JSON object under the data directory:
//! `recordingActive`, `croppingEnabled` and `records`. Each write replaces the file through a
//! temp file + rename, and every read-modify-write holds the store mutex, so appends that race
//! each other are applied one after another.

use crate::error::StorageError;
use crate::record::CaptureRecord;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

pub const STORAGE_FILE: &str = "storage.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    RecordingActive,
    CroppingEnabled,
}

impl Flag {
    pub fn key(self) -> &'static str {
        match self {
            Flag::RecordingActive => "recordingActive",
            Flag::CroppingEnabled => "croppingEnabled",
        }
    }

    fn default_value(self) -> bool {
        match self {
            Flag::RecordingActive => false,
            Flag::CroppingEnabled => true,
        }
    }
}

/// Both flags, read together once per operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub recording_active: bool,
    pub cropping_enabled: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StorageState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    recording_active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cropping_enabled: Option<bool>,
    #[serde(default)]
    records: Vec<CaptureRecord>,
}

impl StorageState {
    fn flag(&self, flag: Flag) -> bool {
        let value = match flag {
            Flag::RecordingActive => self.recording_active,
            Flag::CroppingEnabled => self.cropping_enabled,
        };
        value.unwrap_or_else(|| flag.default_value())
    }

    fn set_flag(&mut self, flag: Flag, value: bool) {
        match flag {
            Flag::RecordingActive => self.recording_active = Some(value),
            Flag::CroppingEnabled => self.cropping_enabled = Some(value),
        }
    }
}

#[derive(Debug)]
pub struct RecordStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl RecordStore {
    pub fn open(dir: &Path) -> Result<Self, StorageError> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            path: dir.join(STORAGE_FILE),
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record and returns the new record count.
    pub fn append(&self, record: CaptureRecord) -> Result<usize, StorageError> {
        self.update(|state| {
            if state.records.iter().any(|r| r.id == record.id) {
                return Err(StorageError::DuplicateId(record.id.clone()));
            }
            state.records.push(record);
            Ok(state.records.len())
        })
    }

    pub fn list_all(&self) -> Result<Vec<CaptureRecord>, StorageError> {
        let _guard = self.guard()?;
        Ok(self.read_state()?.records)
    }

    pub fn count(&self) -> Result<usize, StorageError> {
        let _guard = self.guard()?;
        Ok(self.read_state()?.records.len())
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        self.update(|state| {
            state.records.clear();
            Ok(())
        })
    }

    pub fn get_flag(&self, flag: Flag) -> Result<bool, StorageError> {
        let _guard = self.guard()?;
        Ok(self.read_state()?.flag(flag))
    }

    pub fn set_flag(&self, flag: Flag, value: bool) -> Result<(), StorageError> {
        self.update(|state| {
            state.set_flag(flag, value);
            Ok(())
        })
    }

    pub fn session(&self) -> Result<Session, StorageError> {
        let _guard = self.guard()?;
        let state = self.read_state()?;
        Ok(Session {
            recording_active: state.flag(Flag::RecordingActive),
            cropping_enabled: state.flag(Flag::CroppingEnabled),
        })
    }

    fn guard(&self) -> Result<MutexGuard<'_, ()>, StorageError> {
        self.lock.lock().map_err(|_| StorageError::Poisoned)
    }

    fn update<T>(
        &self,
        apply: impl FnOnce(&mut StorageState) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let _guard = self.guard()?;
        let mut state = self.read_state()?;
        let out = apply(&mut state)?;
        self.write_state(&state)?;
        Ok(out)
    }

    fn read_state(&self) -> Result<StorageState, StorageError> {
        if !self.path.exists() {
            return Ok(StorageState::default());
        }
        let raw = fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(StorageState::default());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    fn write_state(&self, state: &StorageState) -> Result<(), StorageError> {
        let tmp = self.path.with_extension("json.tmp");
        let mut file = File::create(&tmp)?;
        file.write_all(&serde_json::to_vec(state)?)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
