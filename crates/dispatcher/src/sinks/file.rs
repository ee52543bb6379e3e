//! FileSink - one JSON frame per line

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use contracts::{FrameSink, SimError, SimulationFrame};
use tracing::{debug, instrument};

#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    pub path: PathBuf,
    /// Append to an existing file instead of truncating it
    pub append: bool,
}

impl FileSinkConfig {
    /// Params: `path` (default `./output/frames.jsonl`), `append` (`true`/`false`).
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let path = params
            .get("path")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./output/frames.jsonl"));
        let append = params.get("append").is_some_and(|v| v == "true");
        Self { path, append }
    }
}

pub struct FileSink {
    name: String,
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    lines: u64,
}

impl FileSink {
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> std::io::Result<Self> {
        if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(config.append)
            .truncate(!config.append)
            .open(&config.path)?;

        Ok(Self {
            name: name.into(),
            path: config.path,
            writer: Some(BufWriter::new(file)),
            lines: 0,
        })
    }

    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> std::io::Result<Self> {
        Self::new(name, FileSinkConfig::from_params(params))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn writer(&mut self) -> Result<&mut BufWriter<File>, SimError> {
        let name = &self.name;
        self.writer
            .as_mut()
            .ok_or_else(|| SimError::sink_write(name.as_str(), "sink is closed"))
    }
}

impl FrameSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_sink_write",
        skip(self, frame),
        fields(sink = %self.name, at = frame.timestamp_us)
    )]
    async fn write(&mut self, frame: &SimulationFrame) -> Result<(), SimError> {
        let name = self.name.clone();
        let writer = self.writer()?;
        serde_json::to_writer(&mut *writer, frame)
            .map_err(|e| SimError::sink_write(name.as_str(), e.to_string()))?;
        writer.write_all(b"\n")?;
        self.lines += 1;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SimError> {
        self.writer()?.flush()?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SimError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            debug!(sink = %self.name, lines = self.lines, path = %self.path.display(), "file sink closed");
        }
        Ok(())
    }
}
