//! Batching emitter in front of the sink adapter.
//!
//! Emissions are appended in retirement order and written in batches of up
//! to B tuples; the per-tuple sink call of a naive implementation is
//! explicitly not a contract here.

use crate::meshstream::datasource::traits::SinkAdapter;
use crate::meshstream::error::{MeshError, MeshResult};
use crate::meshstream::types::EnrichedTuple;

pub struct Emitter<K: SinkAdapter> {
    sink: K,
    batch: Vec<EnrichedTuple>,
    batch_size: usize,
}

impl<K: SinkAdapter> Emitter<K> {
    pub fn new(sink: K, batch_size: usize) -> Self {
        Self {
            sink,
            batch: Vec::with_capacity(batch_size),
            batch_size,
        }
    }

    /// Queue one enriched tuple, writing the batch through when it reaches
    /// B. Returns the number of tuples durably written by this call.
    pub async fn emit(&mut self, tuple: EnrichedTuple) -> MeshResult<u64> {
        self.batch.push(tuple);
        if self.batch.len() >= self.batch_size {
            self.write_batch().await
        } else {
            Ok(0)
        }
    }

    /// Write any partial batch through and flush the sink. Returns the
    /// number of tuples written by this call.
    pub async fn flush(&mut self) -> MeshResult<u64> {
        let written = if self.batch.is_empty() {
            0
        } else {
            self.write_batch().await?
        };
        self.sink
            .flush()
            .await
            .map_err(|e| MeshError::wrap_adapter(e, |e| MeshError::sink_write_failed(0, e)))?;
        Ok(written)
    }

    /// Tuples queued but not yet written
    pub fn pending(&self) -> usize {
        self.batch.len()
    }

    async fn write_batch(&mut self) -> MeshResult<u64> {
        let size = self.batch.len();
        self.sink
            .write(&self.batch)
            .await
            .map_err(|e| MeshError::wrap_adapter(e, |e| MeshError::sink_write_failed(size, e)))?;
        self.batch.clear();
        Ok(size as u64)
    }
}
