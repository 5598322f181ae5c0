//! Engine configuration.
//!
//! All sizing parameters are required and validated before a run starts;
//! there are no silent defaults for them. The record shape names the three
//! required attributes of stream records and the sink output; adapters use
//! it to map payloads, the driver uses it to lay out enriched tuples.

use serde::Deserialize;

use super::error::{MeshError, MeshResult};

/// Field names of the three required stream attributes.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordShape {
    /// Identity attribute of each stream tuple
    #[serde(default = "default_order_id_field")]
    pub order_id_field: String,
    /// Equi-join attribute present on both sides
    #[serde(default = "default_join_key_field")]
    pub join_key_field: String,
    /// Quantity attribute the derived measure is computed from
    #[serde(default = "default_measure_field")]
    pub measure_field: String,
}

fn default_order_id_field() -> String {
    "order_id".to_string()
}

fn default_join_key_field() -> String {
    "product_id".to_string()
}

fn default_measure_field() -> String {
    "quantity".to_string()
}

impl Default for RecordShape {
    fn default() -> Self {
        Self {
            order_id_field: default_order_id_field(),
            join_key_field: default_join_key_field(),
            measure_field: default_measure_field(),
        }
    }
}

/// Derived measure: `measure × master.<master_field>`, emitted under
/// `output_field`.
#[derive(Debug, Clone, Deserialize)]
pub struct DerivedMeasureConfig {
    /// Numeric master attribute multiplied with the measure (e.g. product_price)
    pub master_field: String,
    /// Output field name for the product (e.g. total_sale)
    pub output_field: String,
}

/// Configuration for one MESHJOIN run.
#[derive(Debug, Clone, Deserialize)]
pub struct MeshJoinConfig {
    /// W: maximum number of unretired stream tuples held in memory
    pub stream_buffer_capacity: usize,
    /// P: number of master tuples per resident partition
    pub partition_size: usize,
    /// B: maximum enriched tuples per sink write
    pub emit_batch_size: usize,
    /// Field names of the required stream attributes
    #[serde(default)]
    pub shape: RecordShape,
    /// Optional derived measure
    #[serde(default)]
    pub derived: Option<DerivedMeasureConfig>,
}

impl MeshJoinConfig {
    /// Create a configuration with the default record shape and no derived
    /// measure.
    pub fn new(
        stream_buffer_capacity: usize,
        partition_size: usize,
        emit_batch_size: usize,
    ) -> Self {
        Self {
            stream_buffer_capacity,
            partition_size,
            emit_batch_size,
            shape: RecordShape::default(),
            derived: None,
        }
    }

    /// Configure the derived measure
    pub fn with_derived(
        mut self,
        master_field: impl Into<String>,
        output_field: impl Into<String>,
    ) -> Self {
        self.derived = Some(DerivedMeasureConfig {
            master_field: master_field.into(),
            output_field: output_field.into(),
        });
        self
    }

    /// Override the record shape
    pub fn with_shape(mut self, shape: RecordShape) -> Self {
        self.shape = shape;
        self
    }

    /// Validate the configuration. The engine refuses to start on any
    /// violation.
    pub fn validate(&self) -> MeshResult<()> {
        if self.stream_buffer_capacity == 0 {
            return Err(MeshError::config_invalid(
                "stream_buffer_capacity",
                "must be a positive integer",
            ));
        }
        if self.partition_size == 0 {
            return Err(MeshError::config_invalid(
                "partition_size",
                "must be a positive integer",
            ));
        }
        if self.emit_batch_size == 0 {
            return Err(MeshError::config_invalid(
                "emit_batch_size",
                "must be a positive integer",
            ));
        }
        if self.emit_batch_size > self.stream_buffer_capacity {
            return Err(MeshError::config_invalid(
                "emit_batch_size",
                "must not exceed stream_buffer_capacity",
            ));
        }
        for (name, value) in [
            ("shape.order_id_field", &self.shape.order_id_field),
            ("shape.join_key_field", &self.shape.join_key_field),
            ("shape.measure_field", &self.shape.measure_field),
        ] {
            if value.is_empty() {
                return Err(MeshError::config_invalid(name, "must not be empty"));
            }
        }
        if let Some(derived) = &self.derived {
            if derived.master_field.is_empty() {
                return Err(MeshError::config_invalid(
                    "derived.master_field",
                    "must not be empty",
                ));
            }
            if derived.output_field.is_empty() {
                return Err(MeshError::config_invalid(
                    "derived.output_field",
                    "must not be empty",
                ));
            }
        }
        Ok(())
    }
}
