//! On-disk persistence for the control loop's continuation.
//!
//! A checkpoint file holds one serialized
//! [`ControlLoopState`](crate::runner::ControlLoopState) as
//! human-readable JSON. Saves are atomic — the state is written to a
//! temporary file in the same directory and renamed over the target, so
//! a crash mid-write can never leave a corrupt checkpoint behind. File
//! locks (exclusive for writes, shared for reads) keep concurrent
//! processes from interleaving.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{Error, Result};
use crate::runner::ControlLoopState;

/// A checkpoint file for suspending and resuming an optimization run.
///
/// # Examples
///
/// ```no_run
/// use optiloop::checkpoint::CheckpointFile;
/// use optiloop::engine::{Bisection, OptimizationEngine};
/// use optiloop::executor::FnExecutor;
/// use optiloop::runner::ControlLoop;
/// # use optiloop::ValueMap;
///
/// # let executor = FnExecutor::new(|_: &ValueMap| Ok(ValueMap::new()));
/// let engine = Bisection::builder(-1.0, 1.0).tol(0.1).build().unwrap();
/// let control = ControlLoop::new(&executor, engine.snapshot());
///
/// let checkpoint = CheckpointFile::new("optimization.json");
/// checkpoint.save(&control.state()).unwrap();
///
/// // Possibly in another process, much later:
/// let resumed = ControlLoop::resume(&executor, checkpoint.load().unwrap());
/// ```
#[derive(Clone, Debug)]
pub struct CheckpointFile {
    path: PathBuf,
}

impl CheckpointFile {
    /// Creates a checkpoint handle for the given path. The file itself is
    /// only touched by [`save`](Self::save) and [`load`](Self::load).
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Returns the checkpoint's path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `true` if a checkpoint has been saved at this path.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Atomically writes the state to the checkpoint file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on I/O or serialization failure.
    pub fn save(&self, state: &ControlLoopState) -> Result<()> {
        let storage_err = |e: &dyn core::fmt::Display| Error::Storage(e.to_string());

        let parent = self.path.parent().unwrap_or(Path::new("."));
        let tmp_path = parent.join(format!(
            ".{}.tmp",
            self.path
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
        ));

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)
            .map_err(|e| storage_err(&e))?;
        file.lock_exclusive().map_err(|e| storage_err(&e))?;

        let json = serde_json::to_string_pretty(state).map_err(|e| storage_err(&e))?;
        file.write_all(json.as_bytes())
            .map_err(|e| storage_err(&e))?;
        file.flush().map_err(|e| storage_err(&e))?;
        file.unlock().map_err(|e| storage_err(&e))?;
        drop(file);

        std::fs::rename(&tmp_path, &self.path).map_err(|e| storage_err(&e))
    }

    /// Reads the state back from the checkpoint file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the file is missing, unreadable, or
    /// does not parse.
    pub fn load(&self) -> Result<ControlLoopState> {
        let storage_err = |e: &dyn core::fmt::Display| Error::Storage(e.to_string());

        let file = File::open(&self.path).map_err(|e| storage_err(&e))?;
        file.lock_shared().map_err(|e| storage_err(&e))?;
        let state = serde_json::from_reader(&file).map_err(|e| storage_err(&e));
        file.unlock().map_err(|e| storage_err(&e))?;
        state
    }
}
