//! JSON-lines file adapters.
//!
//! One JSON object per line. The source maps the configured shape fields
//! onto the typed stream attributes and carries everything else as payload;
//! the master adapter treats every field except the join key as enrichment.
//! Records missing a required field, or carrying it with a non-integer
//! type, are reported as `SchemaMismatch`.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::meshstream::config::RecordShape;
use crate::meshstream::error::{AdapterError, MeshError, MeshResult};
use crate::meshstream::types::{EnrichedTuple, FieldValue, MasterTuple, StreamTuple};

use super::traits::{MasterAdapter, SinkAdapter, SourceAdapter};

fn parse_object(line: &str, path: &Path, line_number: usize) -> MeshResult<Map<String, Value>> {
    let value: Value = serde_json::from_str(line).map_err(|e| {
        MeshError::schema_mismatch(
            "record",
            format!("{}:{}: invalid JSON: {}", path.display(), line_number, e),
        )
    })?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(MeshError::schema_mismatch(
            "record",
            format!(
                "{}:{}: expected a JSON object, found {}",
                path.display(),
                line_number,
                other
            ),
        )),
    }
}

fn require_i64(record: &Map<String, Value>, field: &str) -> MeshResult<i64> {
    let value = record
        .get(field)
        .ok_or_else(|| MeshError::schema_mismatch(field, "missing required field"))?;
    value
        .as_i64()
        .ok_or_else(|| MeshError::schema_mismatch(field, format!("expected an integer, found {}", value)))
}

/// Stream source reading one JSON object per line.
pub struct JsonlSource {
    path: PathBuf,
    lines: std::io::Lines<BufReader<File>>,
    shape: RecordShape,
    line_number: usize,
    finished: bool,
}

impl JsonlSource {
    pub fn open(path: impl AsRef<Path>, shape: RecordShape) -> MeshResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| {
            MeshError::source_unavailable(format!("cannot open {}", path.display()), Box::new(e))
        })?;
        Ok(Self {
            path,
            lines: BufReader::new(file).lines(),
            shape,
            line_number: 0,
            finished: false,
        })
    }

    fn parse_tuple(&self, line: &str) -> MeshResult<StreamTuple> {
        let mut record = parse_object(line, &self.path, self.line_number)?;
        let order_id = require_i64(&record, &self.shape.order_id_field)?;
        let join_key = require_i64(&record, &self.shape.join_key_field)?;
        let measure = require_i64(&record, &self.shape.measure_field)?;
        record.remove(&self.shape.order_id_field);
        record.remove(&self.shape.join_key_field);
        record.remove(&self.shape.measure_field);
        let carry = record
            .iter()
            .map(|(name, value)| (name.clone(), FieldValue::from_json(value)))
            .collect();
        Ok(StreamTuple {
            order_id,
            join_key,
            measure,
            carry,
        })
    }
}

#[async_trait]
impl SourceAdapter for JsonlSource {
    async fn next(&mut self) -> Result<Option<StreamTuple>, AdapterError> {
        if self.finished {
            return Ok(None);
        }
        loop {
            match self.lines.next() {
                Some(Ok(line)) => {
                    self.line_number += 1;
                    if line.trim().is_empty() {
                        continue;
                    }
                    return Ok(Some(self.parse_tuple(&line)?));
                }
                Some(Err(e)) => return Err(Box::new(e)),
                None => {
                    self.finished = true;
                    return Ok(None);
                }
            }
        }
    }
}

/// Master relation reading one JSON object per line, paged on demand.
///
/// Each `fetch_page` call re-reads the file from the start and skips to the
/// requested page. That keeps exactly one partition's worth of tuples in
/// memory and makes paging trivially stable across cycles.
#[derive(Debug)]
pub struct JsonlMaster {
    path: PathBuf,
    join_key_field: String,
}

impl JsonlMaster {
    pub fn open(path: impl AsRef<Path>, join_key_field: impl Into<String>) -> MeshResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(MeshError::MasterUnavailable {
                partition: 0,
                message: format!("{} is not a readable file", path.display()),
                source: None,
            });
        }
        Ok(Self {
            path,
            join_key_field: join_key_field.into(),
        })
    }

    fn parse_tuple(&self, line: &str, line_number: usize) -> MeshResult<MasterTuple> {
        let mut record = parse_object(line, &self.path, line_number)?;
        let join_key = require_i64(&record, &self.join_key_field)?;
        record.remove(&self.join_key_field);
        let enrichment = record
            .iter()
            .map(|(name, value)| (name.clone(), FieldValue::from_json(value)))
            .collect();
        Ok(MasterTuple {
            join_key,
            enrichment,
        })
    }
}

#[async_trait]
impl MasterAdapter for JsonlMaster {
    async fn fetch_page(
        &mut self,
        index: usize,
        partition_size: usize,
    ) -> Result<Option<Vec<MasterTuple>>, AdapterError> {
        let file = File::open(&self.path)?;
        let skip = index.saturating_mul(partition_size);
        let mut seen = 0usize;
        let mut page = Vec::new();
        let mut line_number = 0usize;
        for line in BufReader::new(file).lines() {
            let line = line?;
            line_number += 1;
            if line.trim().is_empty() {
                continue;
            }
            if seen >= skip {
                page.push(self.parse_tuple(&line, line_number)?);
                if page.len() == partition_size {
                    break;
                }
            }
            seen += 1;
        }
        if page.is_empty() {
            Ok(None)
        } else {
            Ok(Some(page))
        }
    }
}

/// Sink writing one JSON object per enriched tuple per line.
pub struct JsonlSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonlSink {
    pub fn create(path: impl AsRef<Path>) -> MeshResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| MeshError::SinkWriteFailed {
            batch_size: 0,
            message: format!("cannot create {}", path.display()),
            source: Some(Box::new(e)),
        })?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    /// Path the sink writes to
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SinkAdapter for JsonlSink {
    async fn write(&mut self, batch: &[EnrichedTuple]) -> Result<(), AdapterError> {
        for tuple in batch {
            let record: Map<String, Value> = tuple
                .fields
                .iter()
                .map(|(name, value)| (name.clone(), value.to_json()))
                .collect();
            serde_json::to_writer(&mut self.writer, &Value::Object(record))?;
            self.writer.write_all(b"\n")?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), AdapterError> {
        self.writer.flush()?;
        Ok(())
    }
}
