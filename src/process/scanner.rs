//! Process scanning for discovering and reading process entries from /proc.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

use crate::census::{CensusError, ProcessEnumerator, ProcessSnapshot};
use crate::process::memory::{read_memory_regions, read_vm_size, PAGE_SIZE};

/// Process entry representing a directory in /proc filesystem.
#[derive(Debug, Clone)]
pub struct ProcEntry {
    pub pid: u32,
    pub proc_path: PathBuf,
}

/// Scans /proc directory for process entries with numeric PIDs, sorted by pid.
pub fn collect_proc_entries(root: &Path) -> Result<Vec<ProcEntry>, std::io::Error> {
    let mut out = Vec::new();
    for entry in fs::read_dir(root)?.flatten() {
        let p = entry.path();
        let name = match p.file_name().and_then(|s| s.to_str()) {
            Some(v) => v,
            None => continue,
        };
        if !name.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        let pid: u32 = match name.parse() {
            Ok(v) => v,
            Err(_) => continue,
        };
        out.push(ProcEntry { pid, proc_path: p });
    }
    out.sort_by_key(|e| e.pid);
    Ok(out)
}

/// Reads process name from comm file or extracts from cmdline.
pub fn read_process_name(proc_path: &Path) -> Option<String> {
    if let Ok(s) = fs::read_to_string(proc_path.join("comm")) {
        // Only the kernel's trailing newline; spaces are part of comm
        let t = s.trim_end_matches('\n');
        if !t.is_empty() {
            return Some(t.into());
        }
    }

    let content = fs::read(proc_path.join("cmdline")).ok()?;
    let first = content.split(|&b| b == 0u8).next()?;
    let first = std::str::from_utf8(first).ok()?;
    Path::new(first)
        .file_name()
        .and_then(|n| n.to_str())
        .map(|s| s.to_string())
}

/// Lists processes from a procfs mount.
pub struct ProcEnumerator {
    root: PathBuf,
    page_size: u64,
}

impl ProcEnumerator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            page_size: *PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Reads one process. `None` when it exited while being read.
    fn snapshot(&self, entry: &ProcEntry) -> Option<ProcessSnapshot> {
        let name = read_process_name(&entry.proc_path)?;
        let vm_size = match read_vm_size(&entry.proc_path) {
            Ok(v) => v,
            Err(e) => {
                debug!("Skipping pid {}: {}", entry.pid, e);
                return None;
            }
        };

        let regions = match vm_size {
            None => None,
            Some(_) => match read_memory_regions(&entry.proc_path) {
                Ok(r) if !r.is_empty() => Some(r),
                Ok(_) => None,
                Err(e) => {
                    debug!("maps of pid {} ({}) unreadable: {}", entry.pid, name, e);
                    None
                }
            },
        };

        Some(ProcessSnapshot {
            pid: entry.pid,
            name,
            total_pages: vm_size.unwrap_or(0) / self.page_size,
            regions,
        })
    }
}

impl Default for ProcEnumerator {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl ProcessEnumerator for ProcEnumerator {
    #[instrument(skip(self), fields(root = %self.root.display()))]
    fn enumerate_processes(&self) -> Result<Vec<ProcessSnapshot>, CensusError> {
        let entries = collect_proc_entries(&self.root).map_err(CensusError::Enumeration)?;
        let snapshots: Vec<ProcessSnapshot> =
            entries.iter().filter_map(|e| self.snapshot(e)).collect();
        debug!(
            "Read {} of {} /proc entries",
            snapshots.len(),
            entries.len()
        );
        Ok(snapshots)
    }
}
