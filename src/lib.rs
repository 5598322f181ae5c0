//! # meshstream
//!
//! A bounded-memory stream-to-relation equi-join engine. The algorithm of
//! record is MESHJOIN: master (dimension) partitions rotate cyclically
//! against a bounded window of buffered stream tuples, so neither the
//! stream nor the master relation ever has to fit in memory, yet every
//! stream tuple is guaranteed to meet every master partition before it is
//! retired. Matched tuples are enriched with the master attributes and
//! batched to a sink; unmatched tuples expire after exactly one full cycle.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use meshstream::{
//!     FieldValue, JoinDriver, MasterTuple, MeshJoinConfig, StreamTuple,
//! };
//! use meshstream::meshstream::datasource::{CollectingSink, VecMaster, VecSource};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), meshstream::MeshError> {
//!     let source = VecSource::new(vec![StreamTuple::new(100, 1, 3)]);
//!     let master = VecMaster::new(vec![
//!         MasterTuple::new(1).with_field("product_price", FieldValue::Integer(10)),
//!     ]);
//!     let sink = CollectingSink::new();
//!
//!     let config = MeshJoinConfig::new(4, 4, 1).with_derived("product_price", "total_sale");
//!     let driver = JoinDriver::open(config, source, master, sink).await?;
//!     let metrics = driver.run().await?;
//!     assert_eq!(metrics.emitted, 1);
//!     Ok(())
//! }
//! ```

pub mod meshstream;

// Re-export the main API at the crate root for easy access
pub use meshstream::config::{DerivedMeasureConfig, MeshJoinConfig, RecordShape};
pub use meshstream::datasource::traits::{MasterAdapter, SinkAdapter, SourceAdapter};
pub use meshstream::engine::driver::JoinDriver;
pub use meshstream::engine::metrics::{JoinMetrics, StopController};
pub use meshstream::error::{AdapterError, MeshError, MeshResult};
pub use meshstream::types::{EnrichedTuple, FieldValue, MasterTuple, StreamTuple};
