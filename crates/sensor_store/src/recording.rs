//! JSON Lines recordings
//!
//! One `SensorReading` per line; blank lines are skipped.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use contracts::{SensorReading, SimError};
use tracing::info;

use crate::InMemorySensorStore;

/// Load a recording file into a store.
pub fn load_recording(path: &Path) -> Result<InMemorySensorStore, SimError> {
    let file = File::open(path)?;
    let store = parse_recording(BufReader::new(file))?;
    info!(
        path = %path.display(),
        readings = store.len(),
        channels = store.channels().len(),
        "recording loaded"
    );
    Ok(store)
}

/// Parse recording lines from any reader.
pub fn parse_recording(reader: impl BufRead) -> Result<InMemorySensorStore, SimError> {
    let mut store = InMemorySensorStore::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let reading: SensorReading = serde_json::from_str(trimmed)
            .map_err(|e| SimError::store(format!("line {}: {e}", idx + 1)))?;
        store.insert(reading);
    }
    Ok(store)
}

/// Write readings as a recording file.
pub fn write_recording<'a>(
    path: &Path,
    readings: impl IntoIterator<Item = &'a SensorReading>,
) -> Result<(), SimError> {
    let mut writer = BufWriter::new(File::create(path)?);
    for reading in readings {
        let line = serde_json::to_string(reading)
            .map_err(|e| SimError::store(format!("encode reading: {e}")))?;
        writeln!(writer, "{line}")?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{SensorPayload, SensorStore};
    use std::io::Cursor;

    #[test]
    fn test_parse_skips_blank_lines() {
        let input = "\n{\"channel_id\":\"speed\",\"timestamp_us\":10,\"payload\":{\"scalar\":1.0}}\n\n";
        let store = parse_recording(Cursor::new(input)).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_parse_error_reports_line() {
        let input = "{\"channel_id\":\"speed\",\"timestamp_us\":10,\"payload\":{\"scalar\":1.0}}\nnot json\n";
        let err = parse_recording(Cursor::new(input)).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[tokio::test]
    async fn test_write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drive.jsonl");
        let readings = vec![
            SensorReading::new("speed", 200, SensorPayload::Scalar(2.0)),
            SensorReading::new("speed", 100, SensorPayload::Scalar(1.0)).with_quality(0.9),
        ];
        write_recording(&path, &readings).unwrap();

        let store = load_recording(&path).unwrap();
        assert_eq!(store.bounds().await.unwrap(), Some((100, 200)));
        let out = store.range(&["speed".into()], 0, 300).await.unwrap();
        assert_eq!(out[0].quality, 0.9);
    }
}
