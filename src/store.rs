//! Aggregation store: a bucketed table of process groups.
//!
//! Groups are placed by [`name_hash`](crate::name::name_hash) modulo the bucket
//! count and chained within their bucket. Names are unique across the whole
//! store under padded equality. Iteration order is bucket order, then chain
//! order; it is not sorted.

use thiserror::Error;

use crate::name::ProcessName;

/// Default number of buckets.
pub const DEFAULT_BUCKET_COUNT: usize = 8;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("bucket count must be a non-zero power of two, got {0}")]
    InvalidBucketCount(usize),

    #[error("a group named {0} already exists")]
    DuplicateName(ProcessName),

    #[error("no such process: {0}")]
    NoSuchProcess(ProcessName),

    #[error("memory allocation failed")]
    AllocationFailed,
}

/// Resident/non-resident page counts for one process or region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageCounts {
    pub valid: u64,
    pub invalid: u64,
}

impl PageCounts {
    pub fn total(&self) -> u64 {
        self.valid + self.invalid
    }

    pub fn add(&mut self, other: PageCounts) {
        self.valid += other.valid;
        self.invalid += other.invalid;
    }
}

/// All currently known processes sharing one executable name.
#[derive(Debug, Clone)]
pub struct ProcessGroup {
    name: ProcessName,
    pids: Vec<u32>,
    pub total_pages: u64,
    pub valid_pages: u64,
    pub invalid_pages: u64,
    /// Reserved, never computed.
    pub shareable_pages: u64,
    /// Reserved, never computed.
    pub group_count: u64,
}

impl ProcessGroup {
    pub fn new(name: ProcessName) -> Self {
        Self {
            name,
            pids: Vec::new(),
            total_pages: 0,
            valid_pages: 0,
            invalid_pages: 0,
            shareable_pages: 0,
            group_count: 0,
        }
    }

    pub fn name(&self) -> &ProcessName {
        &self.name
    }

    /// Pids in discovery order.
    pub fn pids(&self) -> &[u32] {
        &self.pids
    }

    /// Always equal to `pids().len()`.
    pub fn pid_count(&self) -> usize {
        self.pids.len()
    }

    /// Adds one process and its page statistics to the group.
    pub fn absorb(&mut self, pid: u32, total_pages: u64, pages: PageCounts) -> Result<(), StoreError> {
        self.pids
            .try_reserve(1)
            .map_err(|_| StoreError::AllocationFailed)?;
        self.pids.push(pid);
        self.total_pages += total_pages;
        self.valid_pages += pages.valid;
        self.invalid_pages += pages.invalid;
        Ok(())
    }
}

/// Hash-indexed store of process groups.
#[derive(Debug, Clone)]
pub struct AggregationStore {
    buckets: Vec<Vec<ProcessGroup>>,
    len: usize,
}

impl Default for AggregationStore {
    fn default() -> Self {
        Self {
            buckets: vec![Vec::new(); DEFAULT_BUCKET_COUNT],
            len: 0,
        }
    }
}

impl AggregationStore {
    pub fn new(bucket_count: usize) -> Result<Self, StoreError> {
        if bucket_count == 0 || !bucket_count.is_power_of_two() {
            return Err(StoreError::InvalidBucketCount(bucket_count));
        }
        Ok(Self {
            buckets: vec![Vec::new(); bucket_count],
            len: 0,
        })
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Number of groups in the store.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn chain(&self, name: &ProcessName) -> &Vec<ProcessGroup> {
        &self.buckets[name.bucket(self.buckets.len())]
    }

    fn chain_mut(&mut self, name: &ProcessName) -> &mut Vec<ProcessGroup> {
        let idx = name.bucket(self.buckets.len());
        &mut self.buckets[idx]
    }

    pub fn find(&self, name: &ProcessName) -> Option<&ProcessGroup> {
        self.chain(name).iter().find(|g| g.name.matches(name))
    }

    pub fn find_mut(&mut self, name: &ProcessName) -> Option<&mut ProcessGroup> {
        self.chain_mut(name).iter_mut().find(|g| g.name.matches(name))
    }

    /// Appends a group to its bucket chain.
    pub fn insert(&mut self, group: ProcessGroup) -> Result<(), StoreError> {
        if self.find(&group.name).is_some() {
            return Err(StoreError::DuplicateName(group.name));
        }
        let chain = self.chain_mut(&group.name);
        chain
            .try_reserve(1)
            .map_err(|_| StoreError::AllocationFailed)?;
        chain.push(group);
        self.len += 1;
        Ok(())
    }

    /// Adds a process to the group with its name, creating the group first
    /// if this is the first time the name is seen.
    pub fn merge_process(
        &mut self,
        pid: u32,
        name: ProcessName,
        total_pages: u64,
        pages: PageCounts,
    ) -> Result<(), StoreError> {
        if let Some(group) = self.find_mut(&name) {
            return group.absorb(pid, total_pages, pages);
        }

        let mut group = ProcessGroup::new(name);
        group.absorb(pid, total_pages, pages)?;
        self.insert(group)
    }

    /// Removes the group with the given name and returns it.
    pub fn delete(&mut self, name: &ProcessName) -> Result<ProcessGroup, StoreError> {
        let chain = self.chain_mut(name);
        let pos = chain
            .iter()
            .position(|g| g.name.matches(name))
            .ok_or(StoreError::NoSuchProcess(*name))?;
        let group = chain.remove(pos);
        self.len -= 1;
        Ok(group)
    }

    /// Drops every group together with its pid list.
    pub fn clear(&mut self) {
        for chain in &mut self.buckets {
            chain.clear();
        }
        self.len = 0;
    }

    /// Groups in bucket order, then chain order.
    pub fn iter(&self) -> impl Iterator<Item = &ProcessGroup> {
        self.buckets.iter().flat_map(|chain| chain.iter())
    }

    /// Total number of pids across all groups.
    pub fn process_count(&self) -> usize {
        self.iter().map(ProcessGroup::pid_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(valid: u64, invalid: u64) -> PageCounts {
        PageCounts { valid, invalid }
    }

    fn assert_invariants(store: &AggregationStore) {
        let groups: Vec<&ProcessGroup> = store.iter().collect();
        assert_eq!(groups.len(), store.len());
        for (i, a) in groups.iter().enumerate() {
            assert_eq!(a.pid_count(), a.pids().len());
            for b in &groups[i + 1..] {
                assert!(!a.name().matches(b.name()), "duplicate {}", a.name());
            }
        }
    }

    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    #[test]
    fn test_new_rejects_bad_bucket_counts() {
        assert!(matches!(
            AggregationStore::new(0),
            Err(StoreError::InvalidBucketCount(0))
        ));
        assert!(matches!(
            AggregationStore::new(6),
            Err(StoreError::InvalidBucketCount(6))
        ));
        assert_eq!(AggregationStore::new(8).unwrap().bucket_count(), 8);
        assert_eq!(AggregationStore::default().bucket_count(), DEFAULT_BUCKET_COUNT);
    }

    // -------------------------------------------------------------------------
    // Merging
    // -------------------------------------------------------------------------

    #[test]
    fn test_merge_creates_then_accumulates() {
        let mut store = AggregationStore::default();
        store
            .merge_process(10, "bash".into(), 300, pages(200, 100))
            .unwrap();
        store
            .merge_process(11, "bash".into(), 200, pages(100, 100))
            .unwrap();
        store
            .merge_process(5, "sshd".into(), 50, pages(40, 10))
            .unwrap();

        assert_eq!(store.len(), 2);
        let bash = store.find(&"bash".into()).unwrap();
        assert_eq!(bash.pids(), &[10, 11]);
        assert_eq!(bash.pid_count(), 2);
        assert_eq!(bash.total_pages, 500);
        assert_eq!(bash.valid_pages, 300);
        assert_eq!(bash.invalid_pages, 200);
        assert_eq!(bash.shareable_pages, 0);
        assert_eq!(bash.group_count, 0);
        assert_eq!(store.process_count(), 3);
        assert_invariants(&store);
    }

    #[test]
    fn test_merge_uses_padded_equality() {
        let mut store = AggregationStore::default();
        store
            .merge_process(1, "worker".into(), 1, pages(1, 0))
            .unwrap();
        store
            .merge_process(2, ProcessName::new(b"worker\n"), 1, pages(0, 1))
            .unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.find(&"worker".into()).unwrap().pid_count(), 2);
    }

    #[test]
    fn test_insert_rejects_duplicate() {
        let mut store = AggregationStore::default();
        store.insert(ProcessGroup::new("nginx".into())).unwrap();
        let err = store.insert(ProcessGroup::new("nginx".into())).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateName(_)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_colliding_names_share_a_chain() {
        // With a single bucket every name collides.
        let mut store = AggregationStore::new(1).unwrap();
        for (pid, name) in ["a", "b", "c", "d"].iter().enumerate() {
            store
                .merge_process(pid as u32, (*name).into(), 1, pages(1, 0))
                .unwrap();
        }
        let order: Vec<String> = store.iter().map(|g| g.name().to_string()).collect();
        assert_eq!(order, vec!["a", "b", "c", "d"]);
        assert!(store.find(&"c".into()).is_some());
        assert_invariants(&store);
    }

    // -------------------------------------------------------------------------
    // Delete / clear
    // -------------------------------------------------------------------------

    #[test]
    fn test_delete_found_and_missing() {
        let mut store = AggregationStore::new(1).unwrap();
        store.merge_process(1, "a".into(), 1, pages(1, 0)).unwrap();
        store.merge_process(2, "b".into(), 1, pages(1, 0)).unwrap();
        store.merge_process(3, "c".into(), 1, pages(1, 0)).unwrap();

        let removed = store.delete(&"b".into()).unwrap();
        assert_eq!(removed.pids(), &[2]);
        assert_eq!(store.len(), 2);
        assert!(store.find(&"b".into()).is_none());
        assert!(store.find(&"c".into()).is_some());

        assert!(matches!(
            store.delete(&"b".into()),
            Err(StoreError::NoSuchProcess(_))
        ));
        assert_invariants(&store);
    }

    #[test]
    fn test_clear_empties_every_bucket() {
        let mut store = AggregationStore::default();
        for pid in 0..32u32 {
            let name = format!("proc{}", pid % 5);
            store
                .merge_process(pid, name.as_str().into(), 2, pages(1, 1))
                .unwrap();
        }
        assert_eq!(store.len(), 5);
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.iter().count(), 0);
        assert_eq!(store.bucket_count(), DEFAULT_BUCKET_COUNT);
    }

    #[test]
    fn test_page_counts_total() {
        let mut counts = pages(3, 4);
        counts.add(pages(1, 1));
        assert_eq!(counts.total(), 9);
    }
}
