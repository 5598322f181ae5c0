//! In-memory adapters, used by tests and demos.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::meshstream::error::AdapterError;
use crate::meshstream::types::{EnrichedTuple, MasterTuple, StreamTuple};

use super::traits::{MasterAdapter, SinkAdapter, SourceAdapter};

/// Stream source backed by a vector of tuples.
pub struct VecSource {
    tuples: VecDeque<StreamTuple>,
}

impl VecSource {
    pub fn new(tuples: Vec<StreamTuple>) -> Self {
        Self {
            tuples: tuples.into(),
        }
    }
}

#[async_trait]
impl SourceAdapter for VecSource {
    async fn next(&mut self) -> Result<Option<StreamTuple>, AdapterError> {
        Ok(self.tuples.pop_front())
    }
}

/// Master relation backed by a vector of tuples, paged on demand.
pub struct VecMaster {
    tuples: Vec<MasterTuple>,
}

impl VecMaster {
    pub fn new(tuples: Vec<MasterTuple>) -> Self {
        Self { tuples }
    }
}

#[async_trait]
impl MasterAdapter for VecMaster {
    async fn fetch_page(
        &mut self,
        index: usize,
        partition_size: usize,
    ) -> Result<Option<Vec<MasterTuple>>, AdapterError> {
        let start = index.saturating_mul(partition_size);
        if start >= self.tuples.len() {
            return Ok(None);
        }
        let end = (start + partition_size).min(self.tuples.len());
        Ok(Some(self.tuples[start..end].to_vec()))
    }
}

/// Sink that collects written batches in memory.
///
/// Batch boundaries are preserved so tests can assert both emission order
/// and batching behavior. Clone [`CollectingSink::contents`] before handing
/// the sink to the driver.
pub struct CollectingSink {
    batches: Arc<Mutex<Vec<Vec<EnrichedTuple>>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self {
            batches: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shared handle onto the written batches
    pub fn contents(&self) -> Arc<Mutex<Vec<Vec<EnrichedTuple>>>> {
        Arc::clone(&self.batches)
    }
}

impl Default for CollectingSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SinkAdapter for CollectingSink {
    async fn write(&mut self, batch: &[EnrichedTuple]) -> Result<(), AdapterError> {
        let mut batches = self
            .batches
            .lock()
            .map_err(|_| "collecting sink lock poisoned")?;
        batches.push(batch.to_vec());
        Ok(())
    }
}

/// Flatten collected batches into one emission-ordered vector.
pub fn collected_tuples(batches: &Arc<Mutex<Vec<Vec<EnrichedTuple>>>>) -> Vec<EnrichedTuple> {
    batches
        .lock()
        .map(|guard| guard.iter().flatten().cloned().collect())
        .unwrap_or_default()
}
