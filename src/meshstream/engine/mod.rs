//! The MESHJOIN execution engine: stream buffer, master partitioner,
//! batching emitter, metrics and the driver tying them together.

pub mod buffer;
pub mod driver;
pub mod emitter;
pub mod metrics;
pub mod partitioner;

pub use buffer::StreamBuffer;
pub use driver::JoinDriver;
pub use emitter::Emitter;
pub use metrics::{JoinMetrics, StopController};
pub use partitioner::MasterPartitioner;
