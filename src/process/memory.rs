//! Memory layout and page residency read from /proc.
//!
//! Regions come from `/proc/<pid>/maps`, the virtual size from `VmSize` in
//! `/proc/<pid>/status`, and residency from `/proc/<pid>/pagemap`. Each
//! pagemap entry is a native-endian `u64` per virtual page; bit 63 marks a
//! page present in RAM.

use once_cell::sync::Lazy;
use std::fs;
use std::io::{BufRead, BufReader};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::census::{CensusError, Deadline, MemoryRegion, PageResidency, DEFAULT_PAGE_SIZE};
use crate::store::PageCounts;

/// Get the system page size in bytes.
fn get_page_size() -> u64 {
    // SAFETY: sysconf is safe to call with _SC_PAGESIZE
    // Returns -1 on error, handled by the > 0 check
    unsafe {
        let size = libc::sysconf(libc::_SC_PAGESIZE);
        if size > 0 {
            return size as u64;
        }
    }
    DEFAULT_PAGE_SIZE
}

/// System page size (for region and pagemap arithmetic).
pub static PAGE_SIZE: Lazy<u64> = Lazy::new(get_page_size);

const PAGEMAP_ENTRY_BYTES: u64 = 8;
const PRESENT_PAGE_BIT: u64 = 63;

/// Pagemap entries read per syscall in bulk classification.
const PAGEMAP_CHUNK_PAGES: u64 = 512;

/// Parses kilobyte values from status file lines.
pub fn parse_kb_value(v: &str) -> Option<u64> {
    v.split_whitespace().next()?.parse().ok()
}

/// Reads VmSize from /proc/[pid]/status.
/// Returns the virtual size in bytes, or `None` when the process has no
/// memory space (kernel threads omit the field).
pub fn read_vm_size(proc_path: &Path) -> Result<Option<u64>, std::io::Error> {
    let content = fs::read_to_string(proc_path.join("status"))?;

    for line in content.lines() {
        if let Some(v) = line.strip_prefix("VmSize:") {
            return Ok(parse_kb_value(v).map(|kb| kb * 1024));
        }
    }
    Ok(None)
}

/// Parses the address range of one maps line (`start-end perms ...`).
pub fn parse_maps_line(line: &str) -> Option<MemoryRegion> {
    let range = line.split_whitespace().next()?;
    let (start, end) = range.split_once('-')?;
    let start = u64::from_str_radix(start, 16).ok()?;
    let end = u64::from_str_radix(end, 16).ok()?;
    if end <= start {
        return None;
    }
    Some(MemoryRegion { start, end })
}

/// Reads every mapped region of a process from /proc/[pid]/maps.
pub fn read_memory_regions(proc_path: &Path) -> Result<Vec<MemoryRegion>, std::io::Error> {
    let file = fs::File::open(proc_path.join("maps"))?;
    let reader = BufReader::new(file);

    let mut regions = Vec::new();
    for line in reader.lines() {
        if let Some(region) = parse_maps_line(&line?) {
            regions.push(region);
        }
    }
    Ok(regions)
}

/// Whether a pagemap entry marks its page as present.
pub fn is_present(entry: u64) -> bool {
    (entry >> PRESENT_PAGE_BIT) & 1 == 1
}

/// Page residency from `/proc/<pid>/pagemap`.
///
/// Reading another process's pagemap needs `CAP_SYS_ADMIN` for the frame
/// numbers but only ptrace access for the present bit. A pagemap that cannot
/// be opened during a census counts all of the region's pages as invalid.
pub struct PagemapResidency {
    root: PathBuf,
}

impl PagemapResidency {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn open(&self, pid: u32) -> Result<fs::File, std::io::Error> {
        fs::File::open(self.root.join(pid.to_string()).join("pagemap"))
    }
}

impl Default for PagemapResidency {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl PageResidency for PagemapResidency {
    fn is_resident(&self, pid: u32, _region: &MemoryRegion, address: u64) -> Result<bool, CensusError> {
        let residency_err = |source| CensusError::Residency { pid, source };
        let file = self.open(pid).map_err(residency_err)?;

        let mut buf = [0u8; PAGEMAP_ENTRY_BYTES as usize];
        let offset = (address / *PAGE_SIZE) * PAGEMAP_ENTRY_BYTES;
        file.read_exact_at(&mut buf, offset).map_err(residency_err)?;
        Ok(is_present(u64::from_ne_bytes(buf)))
    }

    fn classify_region(
        &self,
        pid: u32,
        region: &MemoryRegion,
        page_size: u64,
        deadline: Option<&Deadline>,
    ) -> Result<PageCounts, CensusError> {
        let pages = region.page_count(page_size);
        let file = match self.open(pid) {
            Ok(f) => f,
            Err(e) => {
                debug!("pagemap of pid {} unreadable ({}), counting {} pages invalid", pid, e, pages);
                return Ok(PageCounts { valid: 0, invalid: pages });
            }
        };

        let mut counts = PageCounts::default();
        let first_page = region.start / page_size;
        let mut buf = vec![0u8; (PAGEMAP_CHUNK_PAGES * PAGEMAP_ENTRY_BYTES) as usize];
        let mut done = 0u64;

        while done < pages {
            if let Some(deadline) = deadline {
                deadline.check()?;
            }
            let n = (pages - done).min(PAGEMAP_CHUNK_PAGES);
            let chunk = &mut buf[..(n * PAGEMAP_ENTRY_BYTES) as usize];
            let offset = (first_page + done) * PAGEMAP_ENTRY_BYTES;

            match file.read_exact_at(chunk, offset) {
                Ok(()) => {
                    for entry in chunk.chunks_exact(PAGEMAP_ENTRY_BYTES as usize) {
                        let mut raw = [0u8; PAGEMAP_ENTRY_BYTES as usize];
                        raw.copy_from_slice(entry);
                        if is_present(u64::from_ne_bytes(raw)) {
                            counts.valid += 1;
                        } else {
                            counts.invalid += 1;
                        }
                    }
                }
                Err(e) => {
                    debug!("pagemap read failed for pid {} at page {}: {}", pid, first_page + done, e);
                    counts.invalid += n;
                }
            }
            done += n;
        }
        Ok(counts)
    }
}
