//! Checkpoints: where a stopped run resumes.
//!
//! A checkpoint exists only while a run is interrupted. It is written on stop
//! (overwriting any earlier one), read by resume and deleted when a run
//! completes. The file lives next to the recipient list as
//! `.<name>.mailmerge.json`; if that directory is not writable it goes to the
//! cache directory under a hash of the list's path.
//!
//! A stop also records the run's settings, so a resume sends the remaining
//! rows with the same sender, CC/BCC and attachment policy.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::dispatch::RunSettings;
use crate::error::{MergeError, Result};

/// The persisted resume point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Row index to restart at. This row was not sent when the stop was
    /// recorded.
    #[serde(rename = "last_row")]
    pub last_row_index: usize,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
    /// Settings of the run that stopped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<RunSettings>,
}

/// Location of the checkpoint for one recipient list.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    primary: PathBuf,
    fallback: Option<PathBuf>,
}

impl CheckpointStore {
    /// A checkpoint at exactly `path`, with no fallback.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            primary: path.into(),
            fallback: None,
        }
    }

    /// The checkpoint belonging to `rows_path`, falling back to `cache_dir`.
    pub fn for_rows(rows_path: &Path, cache_dir: &Path) -> Self {
        Self {
            primary: sidecar_path_for(rows_path),
            fallback: Some(cache_path_for(rows_path, cache_dir)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.primary
    }

    /// Read the checkpoint, if one exists.
    pub fn load(&self) -> Result<Option<Checkpoint>> {
        for path in self.candidates() {
            if !path.exists() {
                continue;
            }
            let data = std::fs::read(path).map_err(|e| MergeError::io(path, e))?;
            let checkpoint: Checkpoint =
                serde_json::from_slice(&data).map_err(|e| MergeError::InvalidCheckpoint {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?;
            debug!(path = %path.display(), row = checkpoint.last_row_index, "Loaded checkpoint");
            return Ok(Some(checkpoint));
        }
        Ok(None)
    }

    /// Record `row` as the resume point, replacing any previous checkpoint.
    pub fn save(&self, row: usize) -> Result<Checkpoint> {
        self.write(Checkpoint {
            last_row_index: row,
            saved_at: Some(Utc::now()),
            settings: None,
        })
    }

    /// Record `row` together with the settings the stopped run used.
    pub fn save_stopped(&self, row: usize, settings: &RunSettings) -> Result<Checkpoint> {
        self.write(Checkpoint {
            last_row_index: row,
            saved_at: Some(Utc::now()),
            settings: Some(settings.clone()),
        })
    }

    fn write(&self, checkpoint: Checkpoint) -> Result<Checkpoint> {
        let row = checkpoint.last_row_index;
        let json = serde_json::to_vec_pretty(&checkpoint).map_err(|e| {
            MergeError::InvalidCheckpoint {
                path: self.primary.clone(),
                reason: e.to_string(),
            }
        })?;

        match write_atomic(&self.primary, &json) {
            Ok(()) => {
                info!(path = %self.primary.display(), row, "Saved checkpoint");
                Ok(checkpoint)
            }
            Err(e) => {
                let Some(fallback) = &self.fallback else {
                    return Err(e);
                };
                warn!(error = %e, "Could not write checkpoint next to the list; using cache directory");
                if let Some(parent) = fallback.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| MergeError::io(parent, e))?;
                }
                write_atomic(fallback, &json)?;
                info!(path = %fallback.display(), row, "Saved checkpoint");
                Ok(checkpoint)
            }
        }
    }

    /// Delete the checkpoint. Returns `true` if one existed.
    pub fn clear(&self) -> Result<bool> {
        let mut removed = false;
        for path in self.candidates() {
            match std::fs::remove_file(path) {
                Ok(()) => {
                    debug!(path = %path.display(), "Removed checkpoint");
                    removed = true;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(MergeError::io(path, e)),
            }
        }
        Ok(removed)
    }

    fn candidates(&self) -> impl Iterator<Item = &PathBuf> {
        std::iter::once(&self.primary).chain(self.fallback.iter())
    }
}

/// `.<name>.mailmerge.json` next to the recipient list.
pub fn sidecar_path_for(rows_path: &Path) -> PathBuf {
    let filename = rows_path.file_name().unwrap_or_default().to_string_lossy();
    rows_path.with_file_name(format!(".{filename}.mailmerge.json"))
}

/// `<cache_dir>/checkpoints/<sha256 of path>.json`.
pub fn cache_path_for(rows_path: &Path, cache_dir: &Path) -> PathBuf {
    let absolute = std::fs::canonicalize(rows_path).unwrap_or_else(|_| rows_path.to_path_buf());
    let mut hasher = Sha256::new();
    hasher.update(absolute.to_string_lossy().as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    cache_dir.join("checkpoints").join(format!("{hash}.json"))
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, data).map_err(|e| MergeError::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| MergeError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sidecar_path() {
        assert_eq!(
            sidecar_path_for(Path::new("/data/list.csv")),
            PathBuf::from("/data/.list.csv.mailmerge.json")
        );
    }

    #[test]
    fn test_cache_path_is_stable() {
        let a = cache_path_for(Path::new("/nowhere/a.csv"), Path::new("/cache"));
        let b = cache_path_for(Path::new("/nowhere/a.csv"), Path::new("/cache"));
        let c = cache_path_for(Path::new("/nowhere/b.csv"), Path::new("/cache"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("/cache/checkpoints"));
    }

    #[test]
    fn test_save_load_clear() {
        let dir = tempfile::tempdir().unwrap();
        let rows = dir.path().join("list.csv");
        let store = CheckpointStore::for_rows(&rows, &dir.path().join("cache"));

        assert_eq!(store.load().unwrap(), None);
        store.save(7).unwrap();
        store.save(12).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.last_row_index, 12);
        assert!(loaded.saved_at.is_some());

        assert!(store.clear().unwrap());
        assert_eq!(store.load().unwrap(), None);
        assert!(!store.clear().unwrap());
    }

    #[test]
    fn test_reads_bare_last_row_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        std::fs::write(&path, r#"{"last_row": 42}"#).unwrap();
        let loaded = CheckpointStore::at(&path).load().unwrap().unwrap();
        assert_eq!(loaded.last_row_index, 42);
        assert_eq!(loaded.saved_at, None);
        assert_eq!(loaded.settings, None);
    }

    #[test]
    fn test_stopped_checkpoint_keeps_settings() {
        use crate::policy::{RecipientMode, RecipientSettings};

        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::at(dir.path().join("progress.json"));
        let settings = RunSettings {
            recipients: RecipientSettings {
                cc_mode: RecipientMode::Global,
                global_cc: "boss@x.com".into(),
                ..RecipientSettings::default()
            },
            ..RunSettings::default()
        };

        store.save_stopped(4, &settings).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.last_row_index, 4);
        assert_eq!(loaded.settings, Some(settings));
    }

    #[test]
    fn test_corrupt_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            CheckpointStore::at(&path).load(),
            Err(MergeError::InvalidCheckpoint { .. })
        ));
    }

    #[test]
    fn test_falls_back_to_cache_dir() {
        let dir = tempfile::tempdir().unwrap();
        let rows = dir.path().join("missing-dir").join("list.csv");
        let cache = dir.path().join("cache");
        let store = CheckpointStore::for_rows(&rows, &cache);
        store.save(3).unwrap();
        assert!(!store.path().exists());
        assert_eq!(store.load().unwrap().unwrap().last_row_index, 3);
    }
}
