//! Cyclic master partition rotation.
//!
//! Presents the master relation as partitions `P0..P{N-1}` visited in a
//! stable cyclic order, with exactly one partition resident at a time. The
//! resident partition carries a hash index on the join key so probes are
//! O(1) expected.

use log::{debug, info, warn};
use std::collections::HashMap;

use crate::meshstream::datasource::traits::MasterAdapter;
use crate::meshstream::error::{MeshError, MeshResult};
use crate::meshstream::types::MasterTuple;

pub struct MasterPartitioner<M: MasterAdapter> {
    adapter: M,
    partition_size: usize,
    partition_count: usize,
    current_index: usize,
    resident: Vec<MasterTuple>,
    resident_index: HashMap<i64, usize>,
}

impl<M: MasterAdapter> MasterPartitioner<M> {
    /// Scan the master relation once to learn the partition count, then
    /// load partition 0.
    ///
    /// An empty relation is modeled as a single empty partition so the
    /// cycle (and with it tuple expiry) still runs.
    pub async fn open(mut adapter: M, partition_size: usize) -> MeshResult<Self> {
        let mut count = 0usize;
        let mut total = 0usize;
        loop {
            match adapter
                .fetch_page(count, partition_size)
                .await
                .map_err(|e| MeshError::wrap_adapter(e, |e| MeshError::master_unavailable(count, e)))?
            {
                Some(page) if !page.is_empty() => {
                    total += page.len();
                    count += 1;
                }
                _ => break,
            }
        }
        info!(
            "master relation: {} tuples across {} partition(s) of up to {} tuples",
            total,
            count.max(1),
            partition_size
        );
        let mut partitioner = Self {
            adapter,
            partition_size,
            partition_count: count.max(1),
            current_index: 0,
            resident: Vec::new(),
            resident_index: HashMap::new(),
        };
        partitioner.load(0).await?;
        Ok(partitioner)
    }

    async fn load(&mut self, index: usize) -> MeshResult<()> {
        let page = self
            .adapter
            .fetch_page(index, self.partition_size)
            .await
            .map_err(|e| MeshError::wrap_adapter(e, |e| MeshError::master_unavailable(index, e)))?
            .unwrap_or_default();
        self.resident_index.clear();
        for (pos, tuple) in page.iter().enumerate() {
            if let Some(prev) = self.resident_index.insert(tuple.join_key, pos) {
                // the master key is unique by contract; keep the first
                warn!(
                    "duplicate join key {} in master partition {}, keeping the earlier tuple",
                    tuple.join_key, index
                );
                self.resident_index.insert(tuple.join_key, prev);
            }
        }
        debug!("partition {} resident ({} tuples)", index, page.len());
        self.resident = page;
        self.current_index = index;
        Ok(())
    }

    /// Evict the resident partition and load the next one in the cycle.
    /// Returns true when this step wrapped back to partition 0.
    pub async fn advance(&mut self) -> MeshResult<bool> {
        let next = (self.current_index + 1) % self.partition_count;
        self.load(next).await?;
        Ok(next == 0)
    }

    /// O(1) expected lookup against the resident partition only.
    pub fn lookup(&self, join_key: i64) -> Option<&MasterTuple> {
        self.resident_index
            .get(&join_key)
            .map(|&pos| &self.resident[pos])
    }

    /// The resident partition's tuples, in page order.
    pub fn resident(&self) -> &[MasterTuple] {
        &self.resident
    }

    pub fn partition_count(&self) -> usize {
        self.partition_count
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meshstream::datasource::memory::VecMaster;
    use crate::meshstream::types::FieldValue;

    fn master_of(n: i64) -> VecMaster {
        VecMaster::new(
            (1..=n)
                .map(|k| MasterTuple::new(k).with_field("price", FieldValue::Integer(k * 10)))
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_partition_count() {
        let p = MasterPartitioner::open(master_of(5), 2).await.unwrap();
        assert_eq!(p.partition_count(), 3);
        let p = MasterPartitioner::open(master_of(4), 2).await.unwrap();
        assert_eq!(p.partition_count(), 2);
        let p = MasterPartitioner::open(master_of(4), 100).await.unwrap();
        assert_eq!(p.partition_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_master_is_single_empty_partition() {
        let mut p = MasterPartitioner::open(VecMaster::new(Vec::new()), 10)
            .await
            .unwrap();
        assert_eq!(p.partition_count(), 1);
        assert!(p.resident().is_empty());
        assert!(p.lookup(1).is_none());
        // every advance wraps
        assert!(p.advance().await.unwrap());
    }

    #[tokio::test]
    async fn test_cycle_wraps_in_order() {
        let mut p = MasterPartitioner::open(master_of(4), 2).await.unwrap();
        assert_eq!(p.current_index(), 0);
        assert!(p.lookup(1).is_some());
        assert!(p.lookup(3).is_none());

        assert!(!p.advance().await.unwrap());
        assert_eq!(p.current_index(), 1);
        assert!(p.lookup(3).is_some());
        assert!(p.lookup(1).is_none());

        // wrap back to partition 0
        assert!(p.advance().await.unwrap());
        assert_eq!(p.current_index(), 0);
        assert!(p.lookup(1).is_some());
    }

    #[tokio::test]
    async fn test_lookup_returns_enrichment() {
        let p = MasterPartitioner::open(master_of(2), 4).await.unwrap();
        let m = p.lookup(2).unwrap();
        assert_eq!(m.enrichment.get("price"), Some(&FieldValue::Integer(20)));
    }
}
