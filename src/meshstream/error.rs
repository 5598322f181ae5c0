//! Engine error types with proper context preservation.
//!
//! Adapter implementations report failures as boxed errors at the trait
//! boundary; the engine wraps them into the typed [`MeshError`] variants
//! below. An adapter may also return a `MeshError` directly (e.g. a file
//! source reporting `SchemaMismatch`), in which case the engine passes it
//! through unchanged instead of re-wrapping it.

use std::error::Error;

/// Boxed error type used at the adapter trait boundary.
pub type AdapterError = Box<dyn Error + Send + Sync>;

/// Main error type for the MESHJOIN engine.
#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    /// The stream source failed and could not recover
    #[error("stream source unavailable: {message}")]
    SourceUnavailable {
        message: String,
        #[source]
        source: Option<AdapterError>,
    },

    /// The master relation could not be read; fairness can no longer be
    /// guaranteed, so this is always fatal
    #[error("master relation unavailable while loading partition {partition}: {message}")]
    MasterUnavailable {
        partition: usize,
        message: String,
        #[source]
        source: Option<AdapterError>,
    },

    /// A sink batch write failed; retrying blindly could duplicate
    /// emissions, so this is fatal
    #[error("sink write failed for a batch of {batch_size} tuples: {message}")]
    SinkWriteFailed {
        batch_size: usize,
        message: String,
        #[source]
        source: Option<AdapterError>,
    },

    /// The stream buffer is at capacity. Internal: the driver checks
    /// capacity before admitting, so this escaping the engine is a bug
    #[error("stream buffer full at capacity {capacity}")]
    BufferFull { capacity: usize },

    /// A configuration parameter is invalid; detected before the run starts
    #[error("invalid configuration for '{parameter}': {reason}")]
    ConfigInvalid { parameter: String, reason: String },

    /// A record does not carry a required field, or carries it with the
    /// wrong type
    #[error("schema mismatch in field '{field}': {detail}")]
    SchemaMismatch { field: String, detail: String },
}

impl MeshError {
    /// Create a source unavailable error wrapping an adapter failure
    pub fn source_unavailable(message: impl Into<String>, source: AdapterError) -> Self {
        Self::SourceUnavailable {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a master unavailable error for the given partition index
    pub fn master_unavailable(partition: usize, source: AdapterError) -> Self {
        Self::MasterUnavailable {
            partition,
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create a sink write failed error for a batch of the given size
    pub fn sink_write_failed(batch_size: usize, source: AdapterError) -> Self {
        Self::SinkWriteFailed {
            batch_size,
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create a config invalid error
    pub fn config_invalid(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    /// Create a schema mismatch error
    pub fn schema_mismatch(field: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            field: field.into(),
            detail: detail.into(),
        }
    }

    /// Wrap an adapter error, passing a typed `MeshError` through unchanged
    /// and applying `fallback` to anything else.
    pub(crate) fn wrap_adapter(
        err: AdapterError,
        fallback: impl FnOnce(AdapterError) -> MeshError,
    ) -> MeshError {
        match err.downcast::<MeshError>() {
            Ok(inner) => *inner,
            Err(err) => fallback(err),
        }
    }
}

/// Result type alias for engine operations
pub type MeshResult<T> = Result<T, MeshError>;
