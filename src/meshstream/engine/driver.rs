//! The MESHJOIN driver: the cyclic schedule orchestrating refill, probe,
//! rotation and expiry.
//!
//! One driver step executes, in order:
//!
//! 1. **Refill** — admit stream tuples until the buffer holds W or the
//!    source is exhausted.
//! 2. **Probe** — iterate the resident master partition and look each join
//!    key up in the stream buffer's hash index. Probing on the master side
//!    bounds the work per step by P instead of W·P. Matches are emitted in
//!    queue order and retired immediately (the master key is unique, so a
//!    stream tuple has at most one match).
//! 3. **Advance** — rotate to the next partition; expire head tuples that
//!    have now been probed against every partition.
//! 4. **Terminate** — when the source is exhausted and the buffer is empty.
//!
//! A stop request (or a persistent source failure) halts refill and drains
//! the buffer through at most one further full cycle before the survivors
//! are expired.

use log::{debug, error, info};

use crate::meshstream::config::MeshJoinConfig;
use crate::meshstream::datasource::traits::{MasterAdapter, SinkAdapter, SourceAdapter};
use crate::meshstream::error::{MeshError, MeshResult};
use crate::meshstream::types::{EnrichedTuple, FieldValue, MasterTuple, StreamTuple};

use super::buffer::StreamBuffer;
use super::emitter::Emitter;
use super::metrics::{JoinMetrics, StopController};
use super::partitioner::MasterPartitioner;

pub struct JoinDriver<S, M, K>
where
    S: SourceAdapter,
    M: MasterAdapter,
    K: SinkAdapter,
{
    source: S,
    partitioner: MasterPartitioner<M>,
    emitter: Emitter<K>,
    buffer: StreamBuffer,
    config: MeshJoinConfig,
    stop: StopController,
    metrics: JoinMetrics,
    /// Total advances since open; one probe of every resident tuple per step
    steps_completed: u64,
    source_exhausted: bool,
    /// Step by which a draining run force-expires all survivors
    drain_deadline: Option<u64>,
    /// Pending fatal source error, surfaced after the drain completes
    source_failure: Option<MeshError>,
}

impl<S, M, K> std::fmt::Debug for JoinDriver<S, M, K>
where
    S: SourceAdapter,
    M: MasterAdapter,
    K: SinkAdapter,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoinDriver")
            .field("config", &self.config)
            .field("steps_completed", &self.steps_completed)
            .field("source_exhausted", &self.source_exhausted)
            .finish_non_exhaustive()
    }
}

impl<S, M, K> JoinDriver<S, M, K>
where
    S: SourceAdapter,
    M: MasterAdapter,
    K: SinkAdapter,
{
    /// Validate the configuration and open the master partitioner. Refuses
    /// to start on `ConfigInvalid` or `MasterUnavailable`.
    pub async fn open(config: MeshJoinConfig, source: S, master: M, sink: K) -> MeshResult<Self> {
        config.validate()?;
        let partitioner = MasterPartitioner::open(master, config.partition_size).await?;
        let buffer = StreamBuffer::new(config.stream_buffer_capacity);
        let emitter = Emitter::new(sink, config.emit_batch_size);
        Ok(Self {
            source,
            partitioner,
            emitter,
            buffer,
            config,
            stop: StopController::new(),
            metrics: JoinMetrics::default(),
            steps_completed: 0,
            source_exhausted: false,
            drain_deadline: None,
            source_failure: None,
        })
    }

    /// Handle for requesting a graceful stop from another task.
    pub fn stop_controller(&self) -> StopController {
        self.stop.clone()
    }

    /// Share an externally created stop controller (e.g. one the source
    /// also observes).
    pub fn with_stop_controller(mut self, stop: StopController) -> Self {
        self.stop = stop;
        self
    }

    /// Run the join to completion. The final counters are logged and
    /// returned; on a fatal error the counters are still logged and the
    /// last successfully written batch is durable.
    pub async fn run(mut self) -> MeshResult<JoinMetrics> {
        info!(
            "starting MESHJOIN: W={} P={} B={}",
            self.config.stream_buffer_capacity,
            self.config.partition_size,
            self.config.emit_batch_size
        );
        let result = self.run_steps().await;
        self.metrics.log_summary();
        match result {
            Ok(()) => Ok(self.metrics),
            Err(err) => {
                error!("MESHJOIN run failed: {}", err);
                Err(err)
            }
        }
    }

    async fn run_steps(&mut self) -> MeshResult<()> {
        loop {
            let draining = self.begin_step();

            if !draining && !self.source_exhausted {
                self.refill().await;
            }
            if self.source_exhausted && self.buffer.is_empty() {
                let flushed = self.emitter.flush().await?;
                self.metrics.emitted += flushed;
                return Ok(());
            }

            self.probe_resident().await?;

            match self.partitioner.advance().await {
                Ok(wrapped) => {
                    self.steps_completed += 1;
                    if wrapped {
                        self.metrics.cycles_completed += 1;
                        debug!("cycle {} completed", self.metrics.cycles_completed);
                    }
                }
                Err(err) => {
                    // flush already-queued emissions before surfacing the
                    // master failure; a sink failure here loses to it
                    match self.emitter.flush().await {
                        Ok(flushed) => self.metrics.emitted += flushed,
                        Err(sink_err) => error!("flush during shutdown failed: {}", sink_err),
                    }
                    return Err(err);
                }
            }

            let rotation = self.partitioner.partition_count() as u64;
            for tuple in self.buffer.expired_head(self.steps_completed, rotation) {
                self.metrics.expired_unmatched += 1;
                debug!(
                    "order {} expired without a match (key {})",
                    tuple.order_id, tuple.join_key
                );
            }

            if let Some(deadline) = self.drain_deadline {
                if self.buffer.is_empty() || self.steps_completed >= deadline {
                    for tuple in self.buffer.drain_all() {
                        self.metrics.expired_unmatched += 1;
                        debug!("order {} expired during drain", tuple.order_id);
                    }
                    match self.emitter.flush().await {
                        Ok(flushed) => self.metrics.emitted += flushed,
                        Err(sink_err) => {
                            return Err(self.source_failure.take().unwrap_or(sink_err))
                        }
                    }
                    return match self.source_failure.take() {
                        Some(err) => Err(err),
                        None => Ok(()),
                    };
                }
            }

            if self.source_exhausted && self.buffer.is_empty() {
                let flushed = self.emitter.flush().await?;
                self.metrics.emitted += flushed;
                return Ok(());
            }
        }
    }

    /// Observe the stop signal; returns whether this step runs in drain
    /// mode.
    fn begin_step(&mut self) -> bool {
        if self.drain_deadline.is_some() {
            return true;
        }
        if self.stop.stop_requested() {
            let rotation = self.partitioner.partition_count() as u64;
            self.drain_deadline = Some(self.steps_completed + rotation);
            info!(
                "draining {} buffered tuple(s) through at most one further cycle",
                self.buffer.len()
            );
            return true;
        }
        false
    }

    async fn refill(&mut self) {
        while self.buffer.has_capacity() {
            if self.stop.stop_requested() {
                break;
            }
            match self.source.next().await {
                Ok(Some(tuple)) => {
                    if let Err(err) = self.buffer.admit(tuple, self.steps_completed) {
                        debug_assert!(false, "admit failed with capacity available: {}", err);
                        break;
                    }
                    self.metrics.ingested += 1;
                }
                Ok(None) => {
                    self.source_exhausted = true;
                    info!("source exhausted after {} tuple(s)", self.metrics.ingested);
                    break;
                }
                Err(err) => {
                    let err = MeshError::wrap_adapter(err, |e| {
                        MeshError::source_unavailable("stream read failed", e)
                    });
                    error!("{}; draining buffered tuples before shutdown", err);
                    let rotation = self.partitioner.partition_count() as u64;
                    self.source_failure = Some(err);
                    self.drain_deadline = Some(self.steps_completed + rotation);
                    break;
                }
            }
        }
    }

    /// Probe every master tuple of the resident partition against the
    /// stream hash; emit and retire hits in queue order.
    async fn probe_resident(&mut self) -> MeshResult<()> {
        let Self {
            partitioner,
            buffer,
            emitter,
            config,
            metrics,
            ..
        } = self;
        for master in partitioner.resident() {
            for seq in buffer.probe(master.join_key) {
                let Some(tuple) = buffer.retire(seq) else {
                    debug_assert!(false, "probe returned a non-resident sequence number");
                    continue;
                };
                let enriched = enrich(config, tuple, master)?;
                metrics.emitted += emitter.emit(enriched).await?;
            }
        }
        Ok(())
    }
}

/// Combine a matched stream tuple with its master tuple: carry payload,
/// then the typed attributes, then the enrichment payload (master side is
/// authoritative on name collisions), then the derived measure.
fn enrich(
    config: &MeshJoinConfig,
    tuple: StreamTuple,
    master: &MasterTuple,
) -> MeshResult<EnrichedTuple> {
    let StreamTuple {
        order_id,
        join_key,
        measure,
        carry,
    } = tuple;
    let mut fields = carry;
    fields.insert(
        config.shape.order_id_field.clone(),
        FieldValue::Integer(order_id),
    );
    fields.insert(
        config.shape.join_key_field.clone(),
        FieldValue::Integer(join_key),
    );
    fields.insert(
        config.shape.measure_field.clone(),
        FieldValue::Integer(measure),
    );
    for (name, value) in &master.enrichment {
        fields.insert(name.clone(), value.clone());
    }
    if let Some(derived) = &config.derived {
        let unit = master.enrichment.get(&derived.master_field).ok_or_else(|| {
            MeshError::schema_mismatch(&derived.master_field, "master tuple has no such attribute")
        })?;
        let total = match unit {
            FieldValue::Integer(price) => FieldValue::Integer(price * measure),
            FieldValue::Float(price) => FieldValue::Float(price * measure as f64),
            other => {
                return Err(MeshError::schema_mismatch(
                    &derived.master_field,
                    format!("expected a numeric attribute, found {}", other.type_name()),
                ))
            }
        };
        fields.insert(derived.output_field.clone(), total);
    }
    Ok(EnrichedTuple { order_id, fields })
}
