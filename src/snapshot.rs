//! JSON process snapshots.
//!
//! A snapshot file describes processes, their regions and how many leading
//! pages of each region are resident. [`SnapshotSource`] serves a snapshot as
//! both census collaborators, so a census can run without access to /proc.
//! When backed by a file, the file is re-read on every enumeration and a
//! `RESET` picks up edits.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info};

use crate::census::{
    CensusError, MemoryRegion, PageResidency, ProcessEnumerator, ProcessSnapshot, DEFAULT_PAGE_SIZE,
};

pub const SNAPSHOT_VERSION: &str = "1.0";

fn default_page_size() -> u64 {
    DEFAULT_PAGE_SIZE
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRegion {
    pub start: u64,
    pub end: u64,
    /// Number of leading pages of the region that are resident.
    #[serde(default)]
    pub resident: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotProcess {
    pub pid: u32,
    pub name: String,
    /// Virtual size in pages. Defaults to the pages covered by `regions`.
    #[serde(default)]
    pub total_pages: Option<u64>,
    /// Absent for processes without a memory space.
    #[serde(default)]
    pub regions: Option<Vec<SnapshotRegion>>,
}

/// Root structure for snapshot JSON files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: String,
    pub generated_at: String,
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    pub processes: Vec<SnapshotProcess>,
}

impl Snapshot {
    pub fn new(processes: Vec<SnapshotProcess>) -> Self {
        Self {
            version: SNAPSHOT_VERSION.to_string(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            page_size: DEFAULT_PAGE_SIZE,
            processes,
        }
    }
}

/// Load a snapshot from a JSON file.
pub fn load_snapshot(path: &Path) -> Result<Snapshot, CensusError> {
    debug!("Loading snapshot from: {}", path.display());

    let content = fs::read_to_string(path).map_err(|e| {
        CensusError::Snapshot(format!("failed to read {}: {}", path.display(), e))
    })?;
    let snapshot: Snapshot = serde_json::from_str(&content).map_err(|e| {
        CensusError::Snapshot(format!("failed to parse {}: {}", path.display(), e))
    })?;
    if snapshot.page_size == 0 {
        return Err(CensusError::Snapshot(format!(
            "{}: page_size must be non-zero",
            path.display()
        )));
    }
    check_regions(&snapshot)
        .map_err(|e| CensusError::Snapshot(format!("{}: {}", path.display(), e)))?;

    info!(
        "Loaded snapshot version {} from {} ({} processes)",
        snapshot.version,
        snapshot.generated_at,
        snapshot.processes.len()
    );
    Ok(snapshot)
}

/// Rejects regions that are reversed or whose resident span does not fit
/// in the address space.
fn check_regions(snapshot: &Snapshot) -> Result<(), String> {
    let page_size = snapshot.page_size;
    for p in &snapshot.processes {
        for r in p.regions.iter().flatten() {
            if r.end < r.start {
                return Err(format!(
                    "pid {}: region end {:#x} before start {:#x}",
                    p.pid, r.end, r.start
                ));
            }
            let first = r.start - r.start % page_size;
            let fits = r
                .resident
                .checked_mul(page_size)
                .and_then(|bytes| first.checked_add(bytes))
                .is_some();
            if !fits {
                return Err(format!(
                    "pid {}: {} resident pages at {:#x} overflow the address space",
                    p.pid, r.resident, r.start
                ));
            }
        }
    }
    Ok(())
}

/// Resident page counts keyed by (pid, region start).
type ResidentTable = HashMap<(u32, u64), u64>;

fn resident_table(snapshot: &Snapshot) -> ResidentTable {
    let mut table = HashMap::new();
    for p in &snapshot.processes {
        for r in p.regions.iter().flatten() {
            table.insert((p.pid, r.start), r.resident);
        }
    }
    table
}

pub struct SnapshotSource {
    path: Option<PathBuf>,
    page_size: u64,
    current: RwLock<(Snapshot, ResidentTable)>,
}

impl SnapshotSource {
    /// Serves a fixed in-memory snapshot.
    pub fn new(snapshot: Snapshot) -> Self {
        let table = resident_table(&snapshot);
        Self {
            path: None,
            page_size: snapshot.page_size.max(1),
            current: RwLock::new((snapshot, table)),
        }
    }

    /// Serves a snapshot file, re-read on each enumeration.
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, CensusError> {
        let path = path.into();
        let snapshot = load_snapshot(&path)?;
        let mut source = Self::new(snapshot);
        source.path = Some(path);
        Ok(source)
    }

    /// Page size the snapshot was recorded with.
    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    fn reload(&self) -> Result<(), CensusError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let snapshot = load_snapshot(path)?;
        let table = resident_table(&snapshot);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = (snapshot, table);
        Ok(())
    }
}

impl ProcessEnumerator for SnapshotSource {
    fn enumerate_processes(&self) -> Result<Vec<ProcessSnapshot>, CensusError> {
        self.reload()?;
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);

        let processes = current
            .0
            .processes
            .iter()
            .map(|p| {
                let regions: Option<Vec<MemoryRegion>> = p.regions.as_ref().map(|rs| {
                    rs.iter()
                        .map(|r| MemoryRegion {
                            start: r.start,
                            end: r.end,
                        })
                        .collect()
                });
                let total_pages = p.total_pages.unwrap_or_else(|| {
                    regions
                        .iter()
                        .flatten()
                        .map(|r| r.page_count(self.page_size))
                        .fold(0u64, u64::saturating_add)
                });
                ProcessSnapshot {
                    pid: p.pid,
                    name: p.name.clone(),
                    total_pages,
                    regions,
                }
            })
            .collect();
        Ok(processes)
    }
}

impl PageResidency for SnapshotSource {
    fn is_resident(&self, pid: u32, region: &MemoryRegion, address: u64) -> Result<bool, CensusError> {
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        let resident = current.1.get(&(pid, region.start)).copied().unwrap_or(0);
        let first = region.start - region.start % self.page_size;
        let resident_end = first.saturating_add(resident.saturating_mul(self.page_size));
        Ok(address < resident_end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Snapshot {
        Snapshot::new(vec![
            SnapshotProcess {
                pid: 10,
                name: "bash".to_string(),
                total_pages: Some(500),
                regions: Some(vec![SnapshotRegion {
                    start: 0x1000,
                    end: 0x5000,
                    resident: 3,
                }]),
            },
            SnapshotProcess {
                pid: 2,
                name: "kworker/0:1".to_string(),
                total_pages: None,
                regions: None,
            },
        ])
    }

    #[test]
    fn test_enumerate_in_memory_snapshot() {
        let source = SnapshotSource::new(sample());
        let procs = source.enumerate_processes().unwrap();
        assert_eq!(procs.len(), 2);
        assert_eq!(procs[0].total_pages, 500);
        assert_eq!(procs[0].regions.as_ref().map(|r| r.len()), Some(1));
        assert!(procs[1].regions.is_none());
        assert_eq!(procs[1].total_pages, 0);
    }

    #[test]
    fn test_leading_pages_are_resident() {
        let source = SnapshotSource::new(sample());
        let region = MemoryRegion {
            start: 0x1000,
            end: 0x5000,
        };
        let counts = source.classify_region(10, &region, 4096, None).unwrap();
        assert_eq!(counts.valid, 3);
        assert_eq!(counts.invalid, 1);
    }

    #[test]
    fn test_unknown_region_is_not_resident() {
        let source = SnapshotSource::new(sample());
        let region = MemoryRegion {
            start: 0x9000,
            end: 0xa000,
        };
        assert!(!source.is_resident(10, &region, 0x9000).unwrap());
    }

    #[test]
    fn test_file_is_reloaded() {
        let file = tempfile::NamedTempFile::new().unwrap();
        fs::write(file.path(), serde_json::to_string(&sample()).unwrap()).unwrap();
        let source = SnapshotSource::from_file(file.path()).unwrap();
        assert_eq!(source.enumerate_processes().unwrap().len(), 2);

        let mut smaller = sample();
        smaller.processes.truncate(1);
        fs::write(file.path(), serde_json::to_string(&smaller).unwrap()).unwrap();
        assert_eq!(source.enumerate_processes().unwrap().len(), 1);
    }

    #[test]
    fn test_total_pages_defaults_to_region_pages() {
        let json = r#"{
            "version": "1.0",
            "generated_at": "2024-01-01T00:00:00Z",
            "processes": [
                {"pid": 1, "name": "init", "regions": [{"start": 0, "end": 8192}]}
            ]
        }"#;
        let snapshot: Snapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.page_size, 4096);
        let procs = SnapshotSource::new(snapshot).enumerate_processes().unwrap();
        assert_eq!(procs[0].total_pages, 2);
    }

    #[test]
    fn test_load_snapshot_errors() {
        assert!(matches!(
            load_snapshot(Path::new("/nonexistent/snapshot.json")),
            Err(CensusError::Snapshot(_))
        ));

        let file = tempfile::NamedTempFile::new().unwrap();
        fs::write(file.path(), "{ not json").unwrap();
        assert!(matches!(
            load_snapshot(file.path()),
            Err(CensusError::Snapshot(_))
        ));
    }

    #[test]
    fn test_load_snapshot_rejects_overflowing_regions() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut huge = sample();
        huge.processes[0].regions = Some(vec![SnapshotRegion {
            start: 0,
            end: 0x2000,
            resident: u64::MAX / 2,
        }]);
        fs::write(file.path(), serde_json::to_string(&huge).unwrap()).unwrap();
        assert!(matches!(
            load_snapshot(file.path()),
            Err(CensusError::Snapshot(_))
        ));

        let mut reversed = sample();
        reversed.processes[0].regions = Some(vec![SnapshotRegion {
            start: 0x5000,
            end: 0x1000,
            resident: 0,
        }]);
        fs::write(file.path(), serde_json::to_string(&reversed).unwrap()).unwrap();
        assert!(matches!(
            load_snapshot(file.path()),
            Err(CensusError::Snapshot(_))
        ));
    }

    #[test]
    fn test_huge_resident_count_saturates() {
        let mut snapshot = sample();
        snapshot.processes[0].regions = Some(vec![SnapshotRegion {
            start: 0,
            end: 0x2000,
            resident: u64::MAX / 2,
        }]);
        let source = SnapshotSource::new(snapshot);
        let region = MemoryRegion { start: 0, end: 0x2000 };
        let counts = source.classify_region(10, &region, 4096, None).unwrap();
        assert_eq!(counts.valid, 2);
        assert_eq!(counts.invalid, 0);
    }
}
