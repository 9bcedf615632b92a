use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Durable cycle progress. `last_played_index == -1` means nothing has been
/// played yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleState {
    pub last_played_index: i64,
    #[serde(default)]
    pub last_cycle_started_at: Option<DateTime<Utc>>,
}

impl Default for CycleState {
    fn default() -> Self {
        Self {
            last_played_index: -1,
            last_cycle_started_at: None,
        }
    }
}

impl CycleState {
    pub fn next_index(&self, catalog_len: usize) -> Option<usize> {
        next_index(self.last_played_index, catalog_len)
    }

    pub fn advanced(self, played_index: usize, started_at: DateTime<Utc>) -> Self {
        Self {
            last_played_index: played_index as i64,
            last_cycle_started_at: Some(started_at),
        }
    }
}

/// `(last + 1) mod len`, or `None` for an empty catalog. Stale indices from
/// a longer catalog wrap instead of failing.
pub fn next_index(last_played_index: i64, catalog_len: usize) -> Option<usize> {
    if catalog_len == 0 {
        return None;
    }
    let next = (i128::from(last_played_index) + 1).rem_euclid(catalog_len as i128);
    Some(next as usize)
}

#[derive(Debug, Default)]
pub struct StateRead {
    pub state: CycleState,
    pub warnings: Vec<String>,
}

pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file means a fresh install; an unreadable or corrupt file
    /// resets progress and reports why.
    pub fn load(&self) -> StateRead {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return StateRead::default();
            }
            Err(err) => {
                return StateRead {
                    state: CycleState::default(),
                    warnings: vec![format!(
                        "failed to read cycle state at {}: {err}; starting from the first asset",
                        self.path.display()
                    )],
                };
            }
        };

        match serde_json::from_str::<CycleState>(&raw) {
            Ok(state) => StateRead {
                state,
                warnings: Vec::new(),
            },
            Err(err) => StateRead {
                state: CycleState::default(),
                warnings: vec![format!(
                    "cycle state at {} is corrupt ({err}); starting from the first asset",
                    self.path.display()
                )],
            },
        }
    }

    /// Writes through a sibling temp file and renames it into place.
    pub fn save(&self, state: &CycleState) -> Result<(), StorageError> {
        let encoded = serde_json::to_string_pretty(state)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StorageError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let tmp_path = self.tmp_path();
        let write_result = (|| {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(encoded.as_bytes())?;
            file.write_all(b"\n")?;
            file.sync_all()?;
            fs::rename(&tmp_path, &self.path)
        })();

        write_result.map_err(|source| {
            let _ = fs::remove_file(&tmp_path);
            StorageError::StateWrite {
                path: self.path.clone(),
                source,
            }
        })
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "state.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn next_index_starts_at_zero_and_wraps() {
        assert_eq!(next_index(-1, 3), Some(0));
        assert_eq!(next_index(0, 3), Some(1));
        assert_eq!(next_index(2, 3), Some(0));
        assert_eq!(next_index(-1, 0), None);
    }

    #[test]
    fn next_index_always_lands_inside_catalog() {
        for len in 1..=7usize {
            for last in -3..20i64 {
                let next = next_index(last, len).expect("non-empty catalog");
                assert!(next < len, "next {next} out of range for len {len}");
            }
        }
        assert!(next_index(i64::MAX, 5).expect("non-empty") < 5);
    }

    #[test]
    fn consecutive_advances_cover_every_index_once() {
        let len = 5;
        let started = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut state = CycleState::default();
        let mut seen = Vec::new();
        for _ in 0..len {
            let next = state.next_index(len).expect("non-empty");
            seen.push(next);
            state = state.advanced(next, started);
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..len).collect::<Vec<_>>());
        assert_eq!(state.next_index(len), Some(0));
    }

    #[test]
    fn missing_state_file_reads_as_fresh() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = StateStore::new(dir.path().join("state.json"));
        let read = store.load();
        assert_eq!(read.state, CycleState::default());
        assert!(read.warnings.is_empty());
    }

    #[test]
    fn corrupt_state_file_resets_with_warning() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state.json");
        fs::write(&path, "{not json").expect("write");
        let read = StateStore::new(&path).load();
        assert_eq!(read.state.last_played_index, -1);
        assert_eq!(read.warnings.len(), 1);
        assert!(read.warnings[0].contains("corrupt"));
    }

    #[test]
    fn save_then_load_preserves_state_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("state.json");
        let store = StateStore::new(&path);
        let started = Utc.with_ymd_and_hms(2026, 10, 17, 8, 30, 0).unwrap();
        let state = CycleState::default().advanced(4, started);

        store.save(&state).expect("save");

        assert_eq!(store.load().state, state);
        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
        let raw = fs::read_to_string(&path).expect("read");
        assert!(raw.contains("\"last_played_index\": 4"));
    }

    #[test]
    fn state_without_timestamp_is_accepted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state.json");
        fs::write(&path, r#"{"last_played_index": 2}"#).expect("write");
        let read = StateStore::new(&path).load();
        assert_eq!(read.state.last_played_index, 2);
        assert_eq!(read.state.last_cycle_started_at, None);
    }
}
