//! Linux adapters for the census collaborators.
//!
//! - `scanner`: process discovery from /proc (`ProcEnumerator`)
//! - `memory`: maps/status parsing and pagemap residency (`PagemapResidency`)

pub mod memory;
pub mod scanner;

pub use memory::{
    is_present, parse_kb_value, parse_maps_line, read_memory_regions, read_vm_size,
    PagemapResidency, PAGE_SIZE,
};
pub use scanner::{collect_proc_entries, read_process_name, ProcEntry, ProcEnumerator};
