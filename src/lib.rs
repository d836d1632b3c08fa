//! Herakles Process Census Library
//!
//! Maintains a live census of processes grouped by executable name, with
//! per-group page residency counts, and answers a small command protocol
//! through a single write-then-read channel.
//!
//! # Features
//!
//! - **Aggregation Store**: bucketed table of process groups keyed by a
//!   bounded, padding-tolerant name
//! - **Census Builder**: enumerates processes, classifies their pages in
//!   parallel and swaps a staging store in only on success
//! - **Command Channel**: `RESET`, `ALL`, `FILTER|<name>`, `DEL|<name>`
//! - **Linux Adapters**: `/proc` enumeration and `/proc/<pid>/pagemap`
//!   residency, or JSON snapshots for unprivileged use
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use herakles_proc_census::{
//!     CensusBuilder, CensusService, Snapshot, SnapshotProcess, SnapshotRegion, SnapshotSource,
//! };
//!
//! let source = Arc::new(SnapshotSource::new(Snapshot::new(vec![SnapshotProcess {
//!     pid: 10,
//!     name: "bash".to_string(),
//!     total_pages: None,
//!     regions: Some(vec![SnapshotRegion { start: 0, end: 0x2000, resident: 1 }]),
//! }])));
//!
//! let service = CensusService::new(CensusBuilder::new(source.clone(), source)).unwrap();
//!
//! assert_eq!(service.exchange(b"RESET"), "[SUCCESS]\n");
//! assert_eq!(
//!     service.exchange(b"FILTER|bash"),
//!     "bash, total: 2, valid: 1, invalid: 1, may_be_shared: 0, nb_group: 0, pid(1): 10\n"
//! );
//! ```

pub mod census;
pub mod command;
pub mod executor;
pub mod name;
pub mod process;
pub mod report;
pub mod service;
pub mod snapshot;
pub mod stats;
pub mod store;

// Re-export main types for convenience
pub use census::{
    CensusBuilder, CensusError, CensusLimits, CensusSummary, Deadline, MemoryRegion, PageResidency,
    ProcessEnumerator, ProcessFilter, ProcessSnapshot,
};
pub use command::{parse_command, Command};
pub use name::{compare_padded, name_hash, PaddedOrdering, ProcessName};
pub use process::{PagemapResidency, ProcEnumerator};
pub use report::{ChannelError, SUCCESS};
pub use service::CensusService;
pub use snapshot::{load_snapshot, Snapshot, SnapshotProcess, SnapshotRegion, SnapshotSource};
pub use stats::CensusStats;
pub use store::{AggregationStore, PageCounts, ProcessGroup, StoreError};
