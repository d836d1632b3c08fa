//! Generate snapshot command implementation.
//!
//! Writes a synthetic snapshot JSON file usable with `--snapshot-file`.

use rand::Rng;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

use herakles_proc_census::census::DEFAULT_PAGE_SIZE;
use herakles_proc_census::{Snapshot, SnapshotProcess, SnapshotRegion};

use crate::config::Config;

/// Names a generated snapshot draws from before falling back to `proc-N`.
const SAMPLE_NAMES: &[&str] = &[
    "systemd", "sshd", "bash", "nginx", "postgres", "redis-server", "containerd", "chronyd",
    "rsyslogd", "cron", "dbus-daemon", "python3",
];

/// Regions per generated process.
const MAX_REGIONS: usize = 6;

/// Largest generated region in pages.
const MAX_REGION_PAGES: u64 = 2048;

/// Base of the first generated region.
const REGION_BASE: u64 = 0x5555_0000_0000;

/// Generates a synthetic snapshot file.
pub fn command_generate_snapshot(
    output: PathBuf,
    names: usize,
    max_per_name: usize,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    debug!(
        "Generating snapshot: names={}, max_per_name={}, output={}",
        names,
        max_per_name,
        output.display()
    );

    let mut rng = rand::thread_rng();
    let filter = config.process_filter();
    let mut processes = Vec::new();
    let mut current_pid: u32 = 1000;

    // A kernel thread, skipped by every census
    processes.push(SnapshotProcess {
        pid: 2,
        name: "kthreadd".to_string(),
        total_pages: None,
        regions: None,
    });

    for i in 0..names {
        let name = match SAMPLE_NAMES.get(i) {
            Some(n) => n.to_string(),
            None => format!("proc-{}", i + 1),
        };
        if !filter.accepts(&name) {
            debug!("Skipping {} due to config filters", name);
            continue;
        }

        let count = rng.gen_range(1..=max_per_name.max(1));
        for _ in 0..count {
            processes.push(generate_random_process(&mut rng, current_pid, name.clone()));
            current_pid += 1;
        }
    }

    let snapshot = Snapshot::new(processes);
    let json_content = serde_json::to_string_pretty(&snapshot)?;
    fs::write(&output, &json_content)?;

    println!(
        "✅ Generated snapshot: {} processes in {}",
        snapshot.processes.len(),
        output.display()
    );

    Ok(())
}

/// Generates a process with non-overlapping regions and random residency.
fn generate_random_process(rng: &mut impl Rng, pid: u32, name: String) -> SnapshotProcess {
    let region_count = rng.gen_range(1..=MAX_REGIONS);
    let mut regions = Vec::with_capacity(region_count);
    let mut next = REGION_BASE;

    for _ in 0..region_count {
        let pages = rng.gen_range(1..=MAX_REGION_PAGES);
        let resident = rng.gen_range(0..=pages);
        let start = next;
        let end = start + pages * DEFAULT_PAGE_SIZE;
        regions.push(SnapshotRegion { start, end, resident });

        // Leave an unmapped gap between regions
        next = end + rng.gen_range(1..=16u64) * DEFAULT_PAGE_SIZE;
    }

    SnapshotProcess {
        pid,
        name,
        total_pages: None,
        regions: Some(regions),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_regions_are_ordered_and_resident_bounded() {
        let mut rng = rand::thread_rng();
        let p = generate_random_process(&mut rng, 1000, "bash".to_string());
        let regions = p.regions.unwrap();
        assert!(!regions.is_empty());
        for r in &regions {
            assert!(r.end > r.start);
            assert!(r.resident <= (r.end - r.start) / DEFAULT_PAGE_SIZE);
        }
        for pair in regions.windows(2) {
            assert!(pair[0].end < pair[1].start);
        }
    }

    #[test]
    fn test_generate_snapshot_file_loads() {
        let file = tempfile::NamedTempFile::new().unwrap();
        command_generate_snapshot(file.path().to_path_buf(), 3, 2, &Config::default()).unwrap();

        let snapshot = herakles_proc_census::load_snapshot(file.path()).unwrap();
        assert!(snapshot.processes.len() >= 4);
        assert!(snapshot.processes.iter().any(|p| p.regions.is_none()));
    }
}
