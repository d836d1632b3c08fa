//! Census builder: enumerate processes, classify their pages and merge the
//! results into a fresh staging store.
//!
//! The builder never touches a live store. It returns a fully populated
//! [`AggregationStore`] on success and nothing on failure, which lets the
//! caller swap the result in atomically.
//!
//! Process enumeration and page residency are supplied by the caller through
//! the [`ProcessEnumerator`] and [`PageResidency`] traits.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::name::ProcessName;
use crate::store::{AggregationStore, PageCounts, StoreError};

/// Page size used when none is configured.
pub const DEFAULT_PAGE_SIZE: u64 = 4096;

#[derive(Debug, Error)]
pub enum CensusError {
    #[error("process enumeration failed: {0}")]
    Enumeration(#[source] std::io::Error),

    #[error("page residency lookup failed for pid {pid}: {source}")]
    Residency {
        pid: u32,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("census exceeded the process limit of {0}")]
    ProcessLimit(usize),

    #[error("census exceeded the page limit of {0}")]
    PageLimit(u64),

    #[error("census exceeded its time limit of {0:?}")]
    Timeout(Duration),

    #[error("snapshot error: {0}")]
    Snapshot(String),
}

/// A virtual memory region `[start, end)` of one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRegion {
    pub start: u64,
    pub end: u64,
}

impl MemoryRegion {
    /// Page-aligned addresses covering the region. Stops at the top of the
    /// address space.
    pub fn page_addresses(&self, page_size: u64) -> impl Iterator<Item = u64> {
        let end = self.end;
        let first = self.start - self.start % page_size;
        std::iter::successors(Some(first), move |&addr| addr.checked_add(page_size))
            .take_while(move |&addr| addr < end)
    }

    pub fn page_count(&self, page_size: u64) -> u64 {
        if self.end <= self.start {
            return 0;
        }
        let first = self.start - self.start % page_size;
        (self.end - first).div_ceil(page_size)
    }
}

/// One enumerated process.
///
/// `regions` is `None` for processes without an attached memory space
/// (kernel threads); those are skipped by the census.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    pub pid: u32,
    pub name: String,
    pub total_pages: u64,
    pub regions: Option<Vec<MemoryRegion>>,
}

/// Lists the processes currently running.
pub trait ProcessEnumerator: Send + Sync {
    fn enumerate_processes(&self) -> Result<Vec<ProcessSnapshot>, CensusError>;
}

/// Wall-clock bound on one census, checked during classification.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    timeout: Duration,
}

impl Deadline {
    /// `None` when `start + timeout` is not representable.
    pub fn starting_at(start: Instant, timeout: Duration) -> Option<Self> {
        start.checked_add(timeout).map(|at| Self { at, timeout })
    }

    pub fn check(&self) -> Result<(), CensusError> {
        if Instant::now() > self.at {
            return Err(CensusError::Timeout(self.timeout));
        }
        Ok(())
    }
}

/// Reports whether the page backing an address is resident.
pub trait PageResidency: Send + Sync {
    fn is_resident(&self, pid: u32, region: &MemoryRegion, address: u64) -> Result<bool, CensusError>;

    /// Classifies every page of a region, checking `deadline` before each
    /// page. Adapters with a cheaper bulk path override this.
    fn classify_region(
        &self,
        pid: u32,
        region: &MemoryRegion,
        page_size: u64,
        deadline: Option<&Deadline>,
    ) -> Result<PageCounts, CensusError> {
        let mut counts = PageCounts::default();
        for address in region.page_addresses(page_size) {
            if let Some(deadline) = deadline {
                deadline.check()?;
            }
            if self.is_resident(pid, region, address)? {
                counts.valid += 1;
            } else {
                counts.invalid += 1;
            }
        }
        Ok(counts)
    }
}

/// Bounds on a single census.
#[derive(Debug, Clone, Copy, Default)]
pub struct CensusLimits {
    pub max_processes: Option<usize>,
    pub max_pages: Option<u64>,
    pub timeout: Option<Duration>,
}

impl CensusLimits {
    pub fn deadline(&self, start: Instant) -> Option<Deadline> {
        self.timeout.and_then(|t| Deadline::starting_at(start, t))
    }
}

/// Name-based include/exclude filter. Exclusion wins.
#[derive(Debug, Clone, Default)]
pub struct ProcessFilter {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl ProcessFilter {
    pub fn accepts(&self, name: &str) -> bool {
        if self.exclude.iter().any(|s| name.contains(s.as_str())) {
            return false;
        }
        if !self.include.is_empty() {
            return self.include.iter().any(|s| name.contains(s.as_str()));
        }
        true
    }
}

/// Outcome of a successful census.
#[derive(Debug, Clone, Copy, Default)]
pub struct CensusSummary {
    pub processes: usize,
    pub skipped: usize,
    pub groups: usize,
    pub pages: u64,
    pub duration: Duration,
}

/// Per-process classification result, merged sequentially afterwards.
struct Classified {
    pid: u32,
    name: ProcessName,
    total_pages: u64,
    pages: PageCounts,
}

/// Builds staging stores from the collaborators.
pub struct CensusBuilder {
    enumerator: Arc<dyn ProcessEnumerator>,
    residency: Arc<dyn PageResidency>,
    bucket_count: usize,
    page_size: u64,
    limits: CensusLimits,
    filter: ProcessFilter,
}

impl CensusBuilder {
    pub fn new(enumerator: Arc<dyn ProcessEnumerator>, residency: Arc<dyn PageResidency>) -> Self {
        Self {
            enumerator,
            residency,
            bucket_count: crate::store::DEFAULT_BUCKET_COUNT,
            page_size: DEFAULT_PAGE_SIZE,
            limits: CensusLimits::default(),
            filter: ProcessFilter::default(),
        }
    }

    pub fn with_bucket_count(mut self, bucket_count: usize) -> Self {
        self.bucket_count = bucket_count;
        self
    }

    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_limits(mut self, limits: CensusLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_filter(mut self, filter: ProcessFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Runs one census into a new staging store.
    #[instrument(skip(self))]
    pub fn build(&self) -> Result<(AggregationStore, CensusSummary), CensusError> {
        let start = Instant::now();
        let mut staging = AggregationStore::new(self.bucket_count)?;

        let snapshots = self.enumerator.enumerate_processes()?;
        if let Some(max) = self.limits.max_processes {
            if snapshots.len() > max {
                return Err(CensusError::ProcessLimit(max));
            }
        }
        debug!("Enumerated {} processes", snapshots.len());

        let mut skipped = 0usize;
        let candidates: Vec<&ProcessSnapshot> = snapshots
            .iter()
            .filter(|p| {
                let keep = p.regions.is_some() && self.filter.accepts(&p.name);
                if !keep {
                    skipped += 1;
                }
                keep
            })
            .collect();

        let deadline = self.limits.deadline(start);
        let pages_seen = AtomicU64::new(0);
        let classified: Vec<Classified> = candidates
            .par_iter()
            .map(|p| self.classify_process(p, deadline.as_ref(), &pages_seen))
            .collect::<Result<_, _>>()?;

        for c in classified {
            staging.merge_process(c.pid, c.name, c.total_pages, c.pages)?;
        }

        let summary = CensusSummary {
            processes: staging.process_count(),
            skipped,
            groups: staging.len(),
            pages: pages_seen.load(Ordering::Relaxed),
            duration: start.elapsed(),
        };
        info!(
            "Census complete: {} processes in {} groups, {} pages classified, {} skipped, {:.3}s",
            summary.processes,
            summary.groups,
            summary.pages,
            summary.skipped,
            summary.duration.as_secs_f64()
        );
        Ok((staging, summary))
    }

    fn classify_process(
        &self,
        process: &ProcessSnapshot,
        deadline: Option<&Deadline>,
        pages_seen: &AtomicU64,
    ) -> Result<Classified, CensusError> {
        let mut pages = PageCounts::default();

        for region in process.regions.iter().flatten() {
            if let Some(deadline) = deadline {
                deadline.check()?;
            }

            let region_pages = region.page_count(self.page_size);
            let seen = pages_seen
                .fetch_add(region_pages, Ordering::Relaxed)
                .saturating_add(region_pages);
            if let Some(max) = self.limits.max_pages {
                if seen > max {
                    return Err(CensusError::PageLimit(max));
                }
            }

            let counts = self
                .residency
                .classify_region(process.pid, region, self.page_size, deadline)?;
            pages.add(counts);
        }

        Ok(Classified {
            pid: process.pid,
            name: ProcessName::from(process.name.as_str()),
            total_pages: process.total_pages,
            pages,
        })
    }
}
