//! Samples the snapshot every `interval_secs` simulated seconds and
//! writes one CSV row per sample. Grounded on
//! `original_source/src/simulator/exporters.py::CSVExporter`: fieldnames
//! are either given explicitly or inferred from the first sampled row's
//! keys, and the header is written exactly once, lazily.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value as Json;
use tracing::info;

use millwright_engine::clock::Clock;

use crate::error::{ExportError, Result};

struct WriterState {
    writer: csv::Writer<File>,
    fieldnames: Vec<String>,
}

pub struct CsvExporter {
    path: PathBuf,
    names: Option<Vec<String>>,
    interval: Duration,
    state: Mutex<Option<WriterState>>,
}

impl CsvExporter {
    pub fn new(path: impl AsRef<Path>, names: Option<Vec<String>>, interval_secs: u64) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            names,
            interval: Duration::from_secs(interval_secs.max(1)),
            state: Mutex::new(None),
        }
    }

    /// Writes one row, opening the file and header on the first call.
    pub fn write_row(&self, row: &HashMap<String, Json>) -> Result<()> {
        let mut guard = self.state.lock().unwrap();
        if guard.is_none() {
            let fieldnames = self.names.clone().unwrap_or_else(|| {
                let mut keys: Vec<String> = row.keys().cloned().collect();
                keys.sort();
                keys
            });
            info!(path = %self.path.display(), ?fieldnames, "opening csv exporter");
            let file = File::create(&self.path).map_err(|source| ExportError::Open {
                path: self.path.display().to_string(),
                source,
            })?;
            let mut writer = csv::Writer::from_writer(file);
            writer.write_record(&fieldnames)?;
            *guard = Some(WriterState { writer, fieldnames });
        }

        let state = guard.as_mut().unwrap();
        let record: Vec<String> = state
            .fieldnames
            .iter()
            .map(|field| row.get(field).map(json_to_cell).unwrap_or_default())
            .collect();
        state.writer.write_record(&record)?;
        state.writer.flush()?;
        Ok(())
    }

    /// Runs forever, sampling `snapshot` every `interval_secs`. Meant to be
    /// spawned as its own task alongside the simulation.
    pub async fn run(self: Arc<Self>, clock: Arc<Clock>, snapshot: impl Fn() -> HashMap<String, Json>) -> Result<()> {
        loop {
            clock.timeout(self.interval).await;
            self.write_row(&snapshot())?;
        }
    }
}

fn json_to_cell(value: &Json) -> String {
    match value {
        Json::String(s) => s.clone(),
        Json::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_row_establishes_header_order_and_subsequent_rows_follow_it() {
        let dir = std::env::temp_dir().join(format!("millwright-csv-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("state.csv");

        let exporter = CsvExporter::new(&path, None, 60);

        let mut row1 = HashMap::new();
        row1.insert("b".to_string(), Json::from(2));
        row1.insert("a".to_string(), Json::from(1));
        exporter.write_row(&row1).unwrap();

        let mut row2 = HashMap::new();
        row2.insert("a".to_string(), Json::from(10));
        exporter.write_row(&row2).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("a,b"));
        assert_eq!(lines.next(), Some("1,2"));
        assert_eq!(lines.next(), Some("10,"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
