//! End-to-end MESHJOIN scenarios over the in-memory adapters.

use async_trait::async_trait;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use meshstream::meshstream::datasource::memory::{
    collected_tuples, CollectingSink, VecMaster, VecSource,
};
use meshstream::{
    AdapterError, EnrichedTuple, FieldValue, JoinDriver, MasterTuple, MeshJoinConfig, SinkAdapter,
    SourceAdapter, StopController, StreamTuple,
};

fn product(id: i64, name: &str, price: i64) -> MasterTuple {
    MasterTuple::new(id)
        .with_field("product_name", FieldValue::String(name.to_string()))
        .with_field("product_price", FieldValue::Integer(price))
}

fn order(order_id: i64, key: i64, qty: i64) -> StreamTuple {
    StreamTuple::new(order_id, key, qty)
}

fn config(w: usize, p: usize, b: usize) -> MeshJoinConfig {
    MeshJoinConfig::new(w, p, b).with_derived("product_price", "total_sale")
}

async fn run_join(
    config: MeshJoinConfig,
    stream: Vec<StreamTuple>,
    master: Vec<MasterTuple>,
) -> (meshstream::JoinMetrics, Vec<EnrichedTuple>) {
    let sink = CollectingSink::new();
    let contents = sink.contents();
    let driver = JoinDriver::open(config, VecSource::new(stream), VecMaster::new(master), sink)
        .await
        .expect("driver open");
    let metrics = driver.run().await.expect("run");
    (metrics, collected_tuples(&contents))
}

#[tokio::test]
async fn test_single_match() {
    let (metrics, emitted) = run_join(
        config(4, 4, 1),
        vec![order(100, 1, 3)],
        vec![product(1, "A", 10)],
    )
    .await;

    assert_eq!(metrics.ingested, 1);
    assert_eq!(metrics.emitted, 1);
    assert_eq!(metrics.expired_unmatched, 0);

    assert_eq!(emitted.len(), 1);
    let sale = &emitted[0];
    assert_eq!(sale.order_id, 100);
    assert_eq!(sale.field("product_id"), Some(&FieldValue::Integer(1)));
    assert_eq!(
        sale.field("product_name"),
        Some(&FieldValue::String("A".to_string()))
    );
    assert_eq!(sale.field("quantity"), Some(&FieldValue::Integer(3)));
    assert_eq!(sale.field("total_sale"), Some(&FieldValue::Integer(30)));
}

#[tokio::test]
async fn test_no_match_expires() {
    let (metrics, emitted) = run_join(
        config(4, 4, 1),
        vec![order(200, 9, 2)],
        vec![product(1, "A", 10)],
    )
    .await;

    assert!(emitted.is_empty());
    assert_eq!(metrics.expired_unmatched, 1);
    assert_eq!(metrics.emitted, 0);
    assert_eq!(metrics.emitted + metrics.expired_unmatched, metrics.ingested);
}

#[tokio::test]
async fn test_multi_partition_fairness() {
    let master = vec![
        product(1, "A", 10),
        product(2, "B", 20),
        product(3, "C", 30),
        product(4, "D", 40),
    ];
    let (metrics, emitted) = run_join(
        config(2, 2, 1),
        vec![order(301, 3, 1), order(302, 1, 2)],
        master,
    )
    .await;

    assert_eq!(metrics.emitted, 2);
    assert_eq!(metrics.expired_unmatched, 0);

    let mut orders: Vec<i64> = emitted.iter().map(|t| t.order_id).collect();
    orders.sort_unstable();
    assert_eq!(orders, vec![301, 302]);
    for sale in &emitted {
        let expected = match sale.order_id {
            301 => 30,
            302 => 20,
            other => panic!("unexpected order {other}"),
        };
        assert_eq!(
            sale.field("total_sale"),
            Some(&FieldValue::Integer(expected))
        );
    }
}

#[tokio::test]
async fn test_duplicate_stream_keys_emit_in_admission_order() {
    let (metrics, emitted) = run_join(
        config(4, 4, 2),
        vec![order(401, 5, 1), order(402, 5, 4)],
        vec![product(5, "E", 7)],
    )
    .await;

    assert_eq!(metrics.emitted, 2);
    let orders: Vec<i64> = emitted.iter().map(|t| t.order_id).collect();
    assert_eq!(orders, vec![401, 402]);
    assert_eq!(emitted[0].field("total_sale"), Some(&FieldValue::Integer(7)));
    assert_eq!(
        emitted[1].field("total_sale"),
        Some(&FieldValue::Integer(28))
    );
}

/// Source wrapper that counts tuples in flight (admitted, not yet durable).
struct CountingSource {
    inner: VecSource,
    in_flight: Arc<AtomicI64>,
    max_in_flight: Arc<AtomicI64>,
}

#[async_trait]
impl SourceAdapter for CountingSource {
    async fn next(&mut self) -> Result<Option<StreamTuple>, AdapterError> {
        let tuple = self.inner.next().await?;
        if tuple.is_some() {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        }
        Ok(tuple)
    }
}

/// Sink wrapper that decrements the in-flight count as tuples become durable.
struct CountingSink {
    inner: CollectingSink,
    in_flight: Arc<AtomicI64>,
}

#[async_trait]
impl SinkAdapter for CountingSink {
    async fn write(&mut self, batch: &[EnrichedTuple]) -> Result<(), AdapterError> {
        self.inner.write(batch).await?;
        self.in_flight.fetch_sub(batch.len() as i64, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_memory_bound_honored() {
    let w = 100usize;
    let master: Vec<MasterTuple> = (1..=1000).map(|k| product(k, "P", k)).collect();

    // deterministic pseudo-random keys in 1..=1000
    let mut state = 0x2545_f491_4f6c_dd1du64;
    let stream: Vec<StreamTuple> = (0..10_000)
        .map(|i| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let key = (state >> 33) % 1000 + 1;
            order(i, key as i64, 1)
        })
        .collect();

    let in_flight = Arc::new(AtomicI64::new(0));
    let max_in_flight = Arc::new(AtomicI64::new(0));
    let source = CountingSource {
        inner: VecSource::new(stream),
        in_flight: Arc::clone(&in_flight),
        max_in_flight: Arc::clone(&max_in_flight),
    };
    let collecting = CollectingSink::new();
    let contents = collecting.contents();
    let sink = CountingSink {
        inner: collecting,
        in_flight: Arc::clone(&in_flight),
    };

    let driver = JoinDriver::open(
        config(w, 50, 1),
        source,
        VecMaster::new(master),
        sink,
    )
    .await
    .unwrap();
    let metrics = driver.run().await.unwrap();

    assert_eq!(metrics.ingested, 10_000);
    assert_eq!(metrics.emitted, 10_000);
    assert_eq!(metrics.expired_unmatched, 0);
    assert_eq!(collected_tuples(&contents).len(), 10_000);

    // W buffered tuples plus at most one queued in the emitter (B = 1)
    assert!(
        max_in_flight.load(Ordering::SeqCst) <= (w + 1) as i64,
        "in-flight peak {} exceeded the memory bound",
        max_in_flight.load(Ordering::SeqCst)
    );
}

/// Unbounded source that trips the stop signal after 500 tuples.
struct EndlessSource {
    produced: u64,
    stop: StopController,
}

#[async_trait]
impl SourceAdapter for EndlessSource {
    async fn next(&mut self) -> Result<Option<StreamTuple>, AdapterError> {
        self.produced += 1;
        let key = (self.produced % 10 + 1) as i64;
        if self.produced == 500 {
            self.stop.request_stop();
        }
        Ok(Some(order(self.produced as i64, key, 1)))
    }
}

#[tokio::test]
async fn test_early_termination_via_request_stop() {
    let master: Vec<MasterTuple> = (1..=10).map(|k| product(k, "P", k)).collect();
    let stop = StopController::new();
    let source = EndlessSource {
        produced: 0,
        stop: stop.clone(),
    };
    let sink = CollectingSink::new();
    let contents = sink.contents();

    let driver = JoinDriver::open(config(50, 4, 8), source, VecMaster::new(master), sink)
        .await
        .unwrap()
        .with_stop_controller(stop);
    let metrics = driver.run().await.unwrap();

    assert_eq!(metrics.ingested, 500);
    assert_eq!(metrics.emitted + metrics.expired_unmatched, 500);
    // every key 1..=10 exists in the master, so nothing should expire
    assert_eq!(metrics.emitted, 500);
    assert_eq!(collected_tuples(&contents).len(), 500);
}

#[tokio::test]
async fn test_empty_stream_exits_clean() {
    let (metrics, emitted) = run_join(config(4, 2, 1), vec![], vec![product(1, "A", 10)]).await;
    assert!(emitted.is_empty());
    assert_eq!(metrics.ingested, 0);
    assert_eq!(metrics.emitted, 0);
    assert_eq!(metrics.expired_unmatched, 0);
}

#[tokio::test]
async fn test_empty_master_expires_everything() {
    let (metrics, emitted) = run_join(
        config(4, 4, 1),
        vec![order(1, 1, 1), order(2, 2, 1)],
        vec![],
    )
    .await;
    assert!(emitted.is_empty());
    assert_eq!(metrics.expired_unmatched, 2);
}

#[tokio::test]
async fn test_buffer_of_one_terminates() {
    let master: Vec<MasterTuple> = (1..=4).map(|k| product(k, "P", 10)).collect();
    let stream: Vec<StreamTuple> = vec![order(1, 2, 1), order(2, 99, 1), order(3, 4, 1)];
    let (metrics, _) = run_join(config(1, 2, 1), stream, master).await;
    assert_eq!(metrics.ingested, 3);
    assert_eq!(metrics.emitted, 2);
    assert_eq!(metrics.expired_unmatched, 1);
}

#[tokio::test]
async fn test_single_partition_degenerates_to_hash_join() {
    let master: Vec<MasterTuple> = (1..=4).map(|k| product(k, "P", k * 10)).collect();
    let stream: Vec<StreamTuple> = (1..=4).map(|k| order(k, k, 1)).collect();
    // P = |master|, so every probe sees the whole relation
    let (metrics, emitted) = run_join(config(8, 4, 4), stream, master).await;
    assert_eq!(metrics.emitted, 4);
    assert_eq!(metrics.cycles_completed, 1);
    assert_eq!(emitted.len(), 4);
}

#[tokio::test]
async fn test_unmatched_key_expires_after_exactly_one_cycle() {
    let master: Vec<MasterTuple> = (1..=4).map(|k| product(k, "P", 10)).collect();
    let (metrics, _) = run_join(config(4, 2, 1), vec![order(1, 99, 1)], master).await;
    assert_eq!(metrics.expired_unmatched, 1);
    assert_eq!(metrics.cycles_completed, 1);
}

#[tokio::test]
async fn test_key_in_last_partition_is_not_expired_early() {
    // three partitions; the only stream keys live in the last one
    let master: Vec<MasterTuple> = (1..=6).map(|k| product(k, "P", k)).collect();
    let (metrics, emitted) = run_join(
        config(2, 2, 1),
        vec![order(1, 5, 1), order(2, 6, 1)],
        master,
    )
    .await;
    assert_eq!(metrics.expired_unmatched, 0);
    assert_eq!(metrics.emitted, 2);
    assert_eq!(emitted.len(), 2);
}

#[tokio::test]
async fn test_rerun_is_deterministic() {
    let master: Vec<MasterTuple> = (1..=20).map(|k| product(k, "P", k)).collect();
    let stream: Vec<StreamTuple> = (0..100).map(|i| order(i, i % 25 + 1, 2)).collect();

    let (metrics_a, emitted_a) = run_join(config(10, 4, 3), stream.clone(), master.clone()).await;
    let (metrics_b, emitted_b) = run_join(config(10, 4, 3), stream, master).await;

    assert_eq!(metrics_a, metrics_b);
    assert_eq!(emitted_a, emitted_b);
}

#[tokio::test]
async fn test_emissions_are_batched() {
    let master = vec![product(1, "A", 1)];
    let stream: Vec<StreamTuple> = (0..5).map(|i| order(i, 1, 1)).collect();

    let sink = CollectingSink::new();
    let contents = sink.contents();
    let driver = JoinDriver::open(
        config(8, 4, 2),
        VecSource::new(stream),
        VecMaster::new(master),
        sink,
    )
    .await
    .unwrap();
    driver.run().await.unwrap();

    let batches = contents.lock().unwrap();
    let sizes: Vec<usize> = batches.iter().map(|b| b.len()).collect();
    assert_eq!(sizes, vec![2, 2, 1]);
    let orders: Vec<i64> = batches.iter().flatten().map(|t| t.order_id).collect();
    assert_eq!(orders, vec![0, 1, 2, 3, 4]);
}
