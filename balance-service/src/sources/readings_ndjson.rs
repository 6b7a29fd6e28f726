use std::{path::PathBuf, pin::Pin};

use async_stream::try_stream;
use futures::Stream;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, BufReader},
};

use super::FixtureRecord;
use crate::store::StoreError;

/// Newline-delimited JSON file of reading records.
///
/// Each non-blank line is one object with a `kind` tag (`well`, `tank`,
/// `plant`, `wastewater`, `customer_reading`, `customer`) and the fields of
/// the matching record, e.g.
/// `{"kind":"well","well_id":1,"date":"2024-03-01","production":1520.5}`.
pub struct ReadingsNdjsonSource {
    path: PathBuf,
}

impl ReadingsNdjsonSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn records(&self) -> Pin<Box<dyn Stream<Item = Result<FixtureRecord, StoreError>> + Send>> {
        let path = self.path.clone();
        let s = try_stream! {
            let file = File::open(&path).await.map_err(|e| {
                StoreError::Source(format!("failed to open readings file {}: {e}", path.display()))
            })?;
            let reader = BufReader::new(file);
            let mut lines = reader.lines();
            let mut line_no: usize = 0;

            while let Some(line) = lines.next_line().await.map_err(|e| {
                StoreError::Source(format!("failed to read readings line: {e}"))
            })? {
                line_no += 1;
                if line.trim().is_empty() {
                    continue;
                }

                let record: FixtureRecord = match serde_json::from_str(&line) {
                    Ok(v) => v,
                    Err(e) => {
                        metrics::counter!("fixture_parse_errors_total").increment(1);
                        Err(StoreError::Source(format!(
                            "failed to parse readings line {line_no}: {e}"
                        )))?
                    }
                };
                yield record;
            }
        };

        Box::pin(s)
    }
}
