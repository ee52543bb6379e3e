//! On-disk checkpoints
//!
//! Layout: `<root>/<run_id>/<timestamp>.ckpt`. Each file holds the bincode
//! schema tag followed by the bincode checkpoint.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use contracts::{Checkpoint, SimError, Timestamp, CHECKPOINT_SCHEMA_VERSION};
use tracing::debug;

const EXTENSION: &str = "ckpt";

#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    root: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, SimError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn run_dir(&self, run_id: &str) -> PathBuf {
        self.root.join(run_id)
    }

    fn path_for(&self, run_id: &str, at: Timestamp) -> PathBuf {
        self.run_dir(run_id).join(format!("{at}.{EXTENSION}"))
    }

    pub fn save(&self, checkpoint: &Checkpoint) -> Result<(), SimError> {
        let dir = self.run_dir(&checkpoint.run_id);
        fs::create_dir_all(&dir)?;
        let path = self.path_for(&checkpoint.run_id, checkpoint.timestamp_us);

        let mut writer = BufWriter::new(File::create(&path)?);
        bincode::serialize_into(&mut writer, &CHECKPOINT_SCHEMA_VERSION)
            .map_err(|e| SimError::persistence(format!("encode schema tag: {e}")))?;
        bincode::serialize_into(&mut writer, checkpoint)
            .map_err(|e| SimError::persistence(format!("encode checkpoint: {e}")))?;
        writer.flush()?;

        debug!(path = %path.display(), "checkpoint persisted");
        Ok(())
    }

    /// # Errors
    /// `Persistence` when the file's schema tag differs from this build's.
    pub fn load(&self, run_id: &str, at: Timestamp) -> Result<Checkpoint, SimError> {
        let path = self.path_for(run_id, at);
        let mut reader = BufReader::new(File::open(&path)?);

        let version: u32 = bincode::deserialize_from(&mut reader)
            .map_err(|e| SimError::persistence(format!("decode schema tag: {e}")))?;
        if version != CHECKPOINT_SCHEMA_VERSION {
            return Err(SimError::persistence(format!(
                "{}: schema version {version}, expected {CHECKPOINT_SCHEMA_VERSION}",
                path.display()
            )));
        }

        bincode::deserialize_from(&mut reader)
            .map_err(|e| SimError::persistence(format!("decode checkpoint: {e}")))
    }

    /// Stored timestamps for a run, ascending.
    pub fn list(&self, run_id: &str) -> Result<Vec<Timestamp>, SimError> {
        let dir = self.run_dir(run_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(ts) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<Timestamp>().ok())
            {
                out.push(ts);
            }
        }
        out.sort_unstable();
        Ok(out)
    }
}
