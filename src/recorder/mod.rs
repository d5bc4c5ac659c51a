//! Frame-indexed acquisition recorder.
//!
//! [`FrameRecorder`] owns the single open acquisition file per link and the
//! policies around it: path validation, a time-suffixed alternate name when
//! the target already exists, idempotent open, fail-closed behavior when a
//! different file is open, and a no-op close. The file format itself lives
//! in [`store`].

mod store;

pub use store::{COLUMN_COUNT, COLUMN_NAMES, FrameRow, FrameStore, StoreReader};

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{LinkError, Result};
use crate::protocol::FrameRecord;

/// Recorder for the per-frame event stream.
#[derive(Default)]
pub struct FrameRecorder {
    target_path: Option<PathBuf>,
    store: Option<FrameStore>,
}

impl FrameRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorder with an initial target path already applied.
    pub fn with_target_path(path: &str) -> Self {
        let mut recorder = Self::new();
        recorder.set_target_path(path);
        recorder
    }

    /// Set the path the next `open` will create.
    ///
    /// Rejects empty paths and paths whose parent directory does not exist.
    /// If the resolved path already names a file, an alternate name with a
    /// time suffix is derived instead so prior data is never clobbered.
    pub fn set_target_path(&mut self, path: &str) -> bool {
        if path.is_empty() {
            warn!("empty dataset path rejected");
            return false;
        }
        let candidate = PathBuf::from(path);
        let Some(parent) = candidate.parent().filter(|p| !p.as_os_str().is_empty()) else {
            warn!(path = %candidate.display(), "dataset path has no parent directory");
            return false;
        };
        if !parent.is_dir() {
            warn!(path = %candidate.display(), "dataset parent directory does not exist");
            return false;
        }

        let resolved = if candidate.exists() {
            let alternate = Self::time_suffixed(&candidate);
            info!(
                requested = %candidate.display(),
                using = %alternate.display(),
                "dataset path already exists, using suffixed name"
            );
            alternate
        } else {
            candidate
        };

        debug!(path = %resolved.display(), "dataset target path set");
        self.target_path = Some(resolved);
        true
    }

    /// Open the acquisition file at the current target path.
    ///
    /// Idempotent while the target is unchanged. If a different file is
    /// already open this fails closed: the open file is left untouched and
    /// `false` is returned. Path or I/O problems also return `false`; no
    /// file is created in that case.
    pub fn open(&mut self) -> bool {
        match self.try_open() {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "failed to open dataset");
                false
            }
        }
    }

    fn try_open(&mut self) -> Result<()> {
        if let Some(store) = &self.store {
            if Some(store.path()) == self.target_path.as_deref() {
                debug!(path = %store.path().display(), "dataset already open");
                return Ok(());
            }
            return Err(LinkError::FileConflict {
                open: store.path().to_path_buf(),
                requested: self
                    .target_path
                    .clone()
                    .unwrap_or_else(|| PathBuf::from("<unset>")),
            });
        }

        let Some(path) = self.target_path.clone() else {
            return Err(LinkError::path("<unset>", "no dataset path configured"));
        };
        let store = FrameStore::create(&path)?;
        info!(path = %path.display(), "dataset opened");
        self.store = Some(store);
        Ok(())
    }

    /// Close the acquisition file. A no-op if nothing is open.
    pub fn close(&mut self) {
        match self.store.take() {
            Some(mut store) => {
                if let Err(e) = store.flush() {
                    warn!(error = %e, "flush on close failed");
                }
                info!(path = %store.path().display(), frames = store.len(), "dataset closed");
            }
            None => debug!("close requested with no open dataset"),
        }
    }

    pub fn is_open(&self) -> bool {
        self.store.is_some()
    }

    /// Path of the open file, if any.
    pub fn open_path(&self) -> Option<&Path> {
        self.store.as_ref().map(FrameStore::path)
    }

    /// Path the next `open` will create, if one has been set.
    pub fn target_path(&self) -> Option<&Path> {
        self.target_path.as_deref()
    }

    /// Record one frame. Requires an open file.
    pub fn write(&mut self, frame: &FrameRecord) -> Result<()> {
        match self.store.as_mut() {
            Some(store) => store.write(frame),
            None => Err(LinkError::path(
                self.target_path.clone().unwrap_or_else(|| PathBuf::from("<unset>")),
                "no dataset is open",
            )),
        }
    }

    fn time_suffixed(path: &Path) -> PathBuf {
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("dataset");
        let name = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{stem}-{stamp}.{ext}"),
            None => format!("{stem}-{stamp}"),
        };
        path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame0() -> FrameRecord {
        FrameRecord {
            frame_number: 0,
            adjustment: 0,
            attenuation: 15,
            uid: 1,
            filters_moving: false,
        }
    }

    #[test]
    fn empty_path_is_rejected() {
        let mut recorder = FrameRecorder::new();
        assert!(!recorder.set_target_path(""));
        assert!(recorder.target_path().is_none());
    }

    #[test]
    fn missing_parent_is_rejected_without_side_effects() {
        let mut recorder = FrameRecorder::new();
        assert!(!recorder.set_target_path("/nonexistent/dir/f.dat"));
        assert!(!recorder.open());
        assert!(!recorder.is_open());
        assert!(!std::path::Path::new("/nonexistent/dir/f.dat").exists());
    }

    #[test]
    fn existing_file_gets_a_time_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.dat");
        std::fs::write(&path, b"previous acquisition").unwrap();

        let mut recorder = FrameRecorder::new();
        assert!(recorder.set_target_path(path.to_str().unwrap()));
        let resolved = recorder.target_path().unwrap();
        assert_ne!(resolved, path.as_path());
        let name = resolved.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("run-"));
        assert!(name.ends_with(".dat"));

        // the original file is untouched
        assert_eq!(std::fs::read(&path).unwrap(), b"previous acquisition");
    }

    #[test]
    fn open_is_idempotent_for_an_unchanged_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.dat");

        let mut recorder = FrameRecorder::new();
        assert!(recorder.set_target_path(path.to_str().unwrap()));
        assert!(recorder.open());
        let open_path = recorder.open_path().unwrap().to_path_buf();

        assert!(recorder.open(), "second open with the same path must succeed");
        assert_eq!(recorder.open_path().unwrap(), open_path.as_path());
        // exactly one file was created
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn open_fails_closed_when_a_different_file_is_open() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.dat");
        let second = dir.path().join("second.dat");

        let mut recorder = FrameRecorder::new();
        assert!(recorder.set_target_path(first.to_str().unwrap()));
        assert!(recorder.open());
        recorder.write(&frame0()).unwrap();

        assert!(recorder.set_target_path(second.to_str().unwrap()));
        assert!(!recorder.open(), "conflicting open must fail");
        assert!(recorder.is_open());
        assert_eq!(recorder.open_path().unwrap(), first.as_path());
        assert!(!second.exists(), "the conflicting open must not create a file");

        // the original file still reads back
        recorder.close();
        let mut reader = StoreReader::open(&first).unwrap();
        assert_eq!(reader.row(0).unwrap().attenuation, 15);
    }

    #[test]
    fn close_is_a_no_op_when_already_closed() {
        let mut recorder = FrameRecorder::new();
        recorder.close();
        recorder.close();
        assert!(!recorder.is_open());
    }

    #[test]
    fn frame_zero_lands_in_a_fresh_store_without_resize() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.dat");

        let mut recorder = FrameRecorder::new();
        assert!(recorder.set_target_path(path.to_str().unwrap()));
        assert!(recorder.open());
        recorder.write(&frame0()).unwrap();
        recorder.close();

        let mut reader = StoreReader::open(&path).unwrap();
        assert_eq!(reader.len(), 1);
        let row = reader.row(0).unwrap();
        assert_eq!(row.adjustment, 0);
        assert_eq!(row.attenuation, 15);
        assert_eq!(row.uid, 1);
        assert!(!row.filters_moving);
    }

    #[test]
    fn write_without_an_open_file_is_an_error() {
        let mut recorder = FrameRecorder::new();
        let err = recorder.write(&frame0()).unwrap_err();
        assert!(matches!(err, LinkError::Path { .. }));
    }
}
