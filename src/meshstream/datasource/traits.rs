//! Adapter abstraction traits.
//!
//! The engine depends only on these three traits; any concrete backend —
//! relational database, file, message bus — can satisfy them. Failures are
//! reported as boxed errors at this boundary and wrapped into typed engine
//! errors by the driver.

use async_trait::async_trait;

use crate::meshstream::error::AdapterError;
use crate::meshstream::types::{EnrichedTuple, MasterTuple, StreamTuple};

/// Source of stream (fact) tuples.
#[async_trait]
pub trait SourceAdapter: Send {
    /// Yield the next stream tuple, or `None` exactly once at end-of-stream.
    ///
    /// Transient retries belong inside the adapter; an error returned here
    /// is treated as a persistent failure by the engine.
    async fn next(&mut self) -> Result<Option<StreamTuple>, AdapterError>;
}

/// Source of master (dimension) pages.
///
/// Rewind contract: for a given `partition_size`, `fetch_page(i, ..)` must
/// return identical content in identical order every time it is called with
/// the same `i` — the driver revisits every page once per cycle.
#[async_trait]
pub trait MasterAdapter: Send {
    /// Fetch page `index` of the relation, at most `partition_size` tuples.
    /// Returns `None` for any index past the end of the relation.
    async fn fetch_page(
        &mut self,
        index: usize,
        partition_size: usize,
    ) -> Result<Option<Vec<MasterTuple>>, AdapterError>;
}

/// Destination for enriched tuples.
#[async_trait]
pub trait SinkAdapter: Send {
    /// Persist a batch of enriched tuples. A failure fails the whole batch;
    /// idempotence on `order_id` is recommended but not required.
    async fn write(&mut self, batch: &[EnrichedTuple]) -> Result<(), AdapterError>;

    /// Flush any buffering the sink does internally.
    async fn flush(&mut self) -> Result<(), AdapterError> {
        Ok(())
    }
}
