//! Samples the snapshot every `interval_secs` simulated seconds and
//! appends one JSON object per line. Grounded on
//! `original_source/src/simulator/exporters.py::JSONLineExporter`.

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value as Json;
use tracing::info;

use millwright_engine::clock::Clock;

use crate::error::{ExportError, Result};

pub struct JsonlExporter {
    path: PathBuf,
    interval: Duration,
    file: Mutex<Option<File>>,
}

impl JsonlExporter {
    pub fn new(path: impl AsRef<Path>, interval_secs: u64) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            interval: Duration::from_secs(interval_secs.max(1)),
            file: Mutex::new(None),
        }
    }

    pub fn write_row(&self, row: &HashMap<String, Json>) -> Result<()> {
        let mut guard = self.file.lock().unwrap();
        if guard.is_none() {
            info!(path = %self.path.display(), "opening jsonl exporter");
            let file = File::create(&self.path).map_err(|source| ExportError::Open {
                path: self.path.display().to_string(),
                source,
            })?;
            *guard = Some(file);
        }

        let file = guard.as_mut().unwrap();
        let line = serde_json::to_string(row).unwrap_or_default();
        writeln!(file, "{line}")?;
        file.flush()?;
        Ok(())
    }

    pub async fn run(self: Arc<Self>, clock: Arc<Clock>, snapshot: impl Fn() -> HashMap<String, Json>) -> Result<()> {
        loop {
            clock.timeout(self.interval).await;
            self.write_row(&snapshot())?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_one_json_object_per_line() {
        let dir = std::env::temp_dir().join(format!("millwright-jsonl-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("state.jsonl");

        let exporter = JsonlExporter::new(&path, 60);

        let mut row = HashMap::new();
        row.insert("press-1.temperature".to_string(), Json::from(42.5));
        exporter.write_row(&row).unwrap();
        exporter.write_row(&row).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        let parsed: Json = serde_json::from_str(content.lines().next().unwrap()).unwrap();
        assert_eq!(parsed["press-1.temperature"], Json::from(42.5));

        std::fs::remove_dir_all(&dir).ok();
    }
}
