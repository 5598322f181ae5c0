//! Adapter traits and the bundled reference adapters.
//!
//! The engine depends only on the traits; the JSON-lines and in-memory
//! implementations here back the CLI and the test suite. Any other backend
//! (relational database, message bus) plugs in by implementing the traits.

pub mod file;
pub mod memory;
pub mod traits;

pub use file::{JsonlMaster, JsonlSink, JsonlSource};
pub use memory::{CollectingSink, VecMaster, VecSource};
pub use traits::{MasterAdapter, SinkAdapter, SourceAdapter};
