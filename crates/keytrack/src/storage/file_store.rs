//! Statement persistence: one JSON file per tracking statement.
//!
//! Layout under the configured root:
//!
//! ```text
//! {root}/
//! └── {tracker_uid}/
//!     └── {trackee_uid}/
//!         ├── 0000000001.json
//!         ├── 0000000002.json
//!         └── tracked
//! ```
//!
//! File format:
//! ```json
//! {
//!     "version": 1,
//!     "statement": { ... TrackingStatement ... }
//! }
//! ```
//!
//! `tracked` is an empty marker file present while the pair is tracked.
//! Statements are written to a dot-prefixed `.tmp` sibling first and
//! linked into place, so a numbered file is never seen half written.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrustError};
use crate::identity::Uid;
use crate::tracking::TrackingStatement;

use super::statement_store::{check_append, StatementStore};

// ── File format constants ─────────────────────────────────────────────────────

const STATEMENT_FILE_VERSION: u32 = 1;
const TRACKED_MARKER: &str = "tracked";

// ── On-disk structure ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct StatementFile {
    version: u32,
    statement: TrackingStatement,
}

// ── FileStatementStore ────────────────────────────────────────────────────────

/// Filesystem-backed statement store.
///
/// Appends within one process are serialized by a mutex. Statement files
/// are hard-linked into place from a fully written temp file; linking
/// fails if the name exists, so a writer in another process that claims
/// the same sequence number first makes this append conflict.
pub struct FileStatementStore {
    base_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStatementStore {
    /// Create a store rooted at `base_dir`, creating the directory if needed.
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self {
            base_dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Every (tracker, trackee) pair with at least one statement directory.
    pub fn pairs(&self) -> Result<Vec<(Uid, Uid)>> {
        let mut pairs = Vec::new();
        for tracker in std::fs::read_dir(&self.base_dir)? {
            let tracker = tracker?;
            if !tracker.file_type()?.is_dir() {
                continue;
            }
            let tracker_uid = Uid::new(tracker.file_name().to_string_lossy());
            for trackee in std::fs::read_dir(tracker.path())? {
                let trackee = trackee?;
                if trackee.file_type()?.is_dir() {
                    pairs.push((
                        tracker_uid.clone(),
                        Uid::new(trackee.file_name().to_string_lossy()),
                    ));
                }
            }
        }
        pairs.sort();
        Ok(pairs)
    }

    // ── Internal helpers ──────────────────────────────────────────────────────

    fn pair_dir(&self, tracker: &Uid, trackee: &Uid) -> Result<PathBuf> {
        Ok(self
            .base_dir
            .join(path_component(tracker)?)
            .join(path_component(trackee)?))
    }

    fn statement_path(dir: &Path, sequence: u64) -> PathBuf {
        dir.join(format!("{sequence:010}.json"))
    }

    fn temp_path(dir: &Path, sequence: u64) -> PathBuf {
        dir.join(format!(".{sequence:010}.{}.tmp", std::process::id()))
    }

    /// Publish `data` as `path` only once it is complete on disk.
    fn link_into_place(tmp: &Path, path: &Path, data: &[u8]) -> std::io::Result<()> {
        {
            let mut out = std::fs::File::create(tmp)?;
            out.write_all(data)?;
            out.sync_all()?;
        }
        let linked = std::fs::hard_link(tmp, path);
        let cleaned = std::fs::remove_file(tmp);
        linked?;
        if let Err(e) = cleaned {
            log::warn!("could not remove {}: {e}", tmp.display());
        }
        Ok(())
    }

    /// Highest sequence number on disk for a pair.
    fn latest_sequence(dir: &Path) -> Result<Option<u64>> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(TrustError::Io(e)),
        };
        let mut latest = None;
        for entry in entries {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            if let Some(seq) = name
                .strip_suffix(".json")
                .and_then(|stem| stem.parse::<u64>().ok())
            {
                latest = latest.max(Some(seq));
            }
        }
        Ok(latest)
    }

    fn load(path: &Path) -> Result<Option<TrackingStatement>> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(TrustError::Io(e)),
        };
        let file: StatementFile = serde_json::from_slice(&bytes).map_err(|e| {
            TrustError::InvalidFileFormat(format!(
                "failed to parse statement file {}: {e}",
                path.display()
            ))
        })?;
        if file.version != STATEMENT_FILE_VERSION {
            return Err(TrustError::InvalidFileFormat(format!(
                "unsupported statement file version {} in {}",
                file.version,
                path.display()
            )));
        }
        Ok(Some(file.statement))
    }
}

/// A uid used as a directory name must not escape the root.
fn path_component(uid: &Uid) -> Result<&str> {
    let s = uid.as_str();
    let safe = !s.is_empty()
        && s != "."
        && s != ".."
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if safe {
        Ok(s)
    } else {
        Err(TrustError::StorageError(format!(
            "uid {s:?} cannot be used as a path component"
        )))
    }
}

impl StatementStore for FileStatementStore {
    fn latest(&self, tracker: &Uid, trackee: &Uid) -> Result<Option<TrackingStatement>> {
        let dir = self.pair_dir(tracker, trackee)?;
        match Self::latest_sequence(&dir)? {
            Some(seq) => Self::load(&Self::statement_path(&dir, seq)),
            None => Ok(None),
        }
    }

    fn get(
        &self,
        tracker: &Uid,
        trackee: &Uid,
        sequence: u64,
    ) -> Result<Option<TrackingStatement>> {
        let dir = self.pair_dir(tracker, trackee)?;
        Self::load(&Self::statement_path(&dir, sequence))
    }

    fn append(&self, statement: &TrackingStatement) -> Result<()> {
        let dir = self.pair_dir(&statement.tracker_uid, &statement.trackee_uid)?;
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let latest = Self::latest_sequence(&dir)?;
        if let Some(seq) = latest {
            // Never stack a statement on one that cannot be read back.
            Self::load(&Self::statement_path(&dir, seq))?;
        }
        check_append(statement, latest)?;

        let file = StatementFile {
            version: STATEMENT_FILE_VERSION,
            statement: statement.clone(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| TrustError::SerializationError(e.to_string()))?;

        std::fs::create_dir_all(&dir)?;
        let path = Self::statement_path(&dir, statement.sequence_number);
        let tmp = Self::temp_path(&dir, statement.sequence_number);
        match Self::link_into_place(&tmp, &path, json.as_bytes()) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(TrustError::Conflict {
                    tracker: statement.tracker_uid.to_string(),
                    trackee: statement.trackee_uid.to_string(),
                    attempted: statement.sequence_number,
                    latest: Some(statement.sequence_number),
                });
            }
            Err(e) => return Err(TrustError::Io(e)),
        }

        std::fs::write(dir.join(TRACKED_MARKER), b"")?;
        log::debug!("wrote {}", path.display());
        Ok(())
    }

    fn is_tracking(&self, tracker: &Uid, trackee: &Uid) -> Result<bool> {
        Ok(self
            .pair_dir(tracker, trackee)?
            .join(TRACKED_MARKER)
            .exists())
    }

    fn untrack(&self, tracker: &Uid, trackee: &Uid) -> Result<()> {
        let marker = self.pair_dir(tracker, trackee)?.join(TRACKED_MARKER);
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        match std::fs::remove_file(&marker) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(TrustError::NotTracking {
                tracker: tracker.to_string(),
                trackee: trackee.to_string(),
            }),
            Err(e) => Err(TrustError::Io(e)),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
