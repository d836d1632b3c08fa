//! Integration tests for the census service command channel.
//!
//! These tests drive the public service API end to end with in-memory
//! collaborators: write a command, read its report, inspect the store.

use herakles_proc_census::{
    AggregationStore, CensusBuilder, CensusError, CensusLimits, CensusService, MemoryRegion,
    PageResidency, ProcessEnumerator, ProcessName, ProcessSnapshot, Snapshot, SnapshotProcess,
    SnapshotRegion, SnapshotSource,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const PAGE: u64 = 4096;

/// Processes with one region each; the first `resident` pages are resident.
#[derive(Default)]
struct Machine {
    processes: Mutex<Vec<(ProcessSnapshot, u64)>>,
    fail: AtomicBool,
}

impl Machine {
    fn spawn(&self, pid: u32, name: &str, pages: u64, resident: u64) {
        self.processes.lock().unwrap().push((
            ProcessSnapshot {
                pid,
                name: name.to_string(),
                total_pages: pages,
                regions: Some(vec![MemoryRegion {
                    start: 0,
                    end: pages * PAGE,
                }]),
            },
            resident,
        ));
    }

    fn kernel_thread(&self, pid: u32, name: &str) {
        self.processes.lock().unwrap().push((
            ProcessSnapshot {
                pid,
                name: name.to_string(),
                total_pages: 0,
                regions: None,
            },
            0,
        ));
    }

    fn kill(&self, pid: u32) {
        self.processes.lock().unwrap().retain(|(p, _)| p.pid != pid);
    }

    fn resident_pages(&self) -> HashMap<u32, u64> {
        self.processes
            .lock()
            .unwrap()
            .iter()
            .map(|(p, r)| (p.pid, *r))
            .collect()
    }
}

impl ProcessEnumerator for Machine {
    fn enumerate_processes(&self) -> Result<Vec<ProcessSnapshot>, CensusError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CensusError::Enumeration(std::io::Error::other("injected failure")));
        }
        Ok(self.processes.lock().unwrap().iter().map(|(p, _)| p.clone()).collect())
    }
}

impl PageResidency for Machine {
    fn is_resident(&self, pid: u32, region: &MemoryRegion, address: u64) -> Result<bool, CensusError> {
        let resident = self.resident_pages().get(&pid).copied().unwrap_or(0);
        Ok(address < region.start + resident * PAGE)
    }
}

/// bash: pids 10 and 11, 500 pages, 300 resident. sshd: pid 5, 50 pages, 40 resident.
fn reference_machine() -> Arc<Machine> {
    let machine = Arc::new(Machine::default());
    machine.spawn(10, "bash", 300, 200);
    machine.spawn(11, "bash", 200, 100);
    machine.spawn(5, "sshd", 50, 40);
    machine
}

fn service_for(machine: &Arc<Machine>) -> CensusService {
    let service =
        CensusService::new(CensusBuilder::new(machine.clone(), machine.clone())).unwrap();
    service.rebuild().unwrap();
    service
}

const BASH_LINE: &str =
    "bash, total: 500, valid: 300, invalid: 200, may_be_shared: 0, nb_group: 0, pid(2): 10; 11\n";
const SSHD_LINE: &str =
    "sshd, total: 50, valid: 40, invalid: 10, may_be_shared: 0, nb_group: 0, pid(1): 5\n";

fn store_lines(service: &CensusService) -> Vec<String> {
    service.with_store(|s| {
        s.iter()
            .map(herakles_proc_census::report::format_group)
            .collect()
    })
}

fn assert_invariants(store: &AggregationStore) {
    let groups: Vec<_> = store.iter().collect();
    for (i, a) in groups.iter().enumerate() {
        assert_eq!(a.pid_count(), a.pids().len());
        for b in &groups[i + 1..] {
            assert!(
                !a.name().matches(b.name()),
                "duplicate group {:?}",
                a.name()
            );
        }
    }
}

// -------------------------------------------------------------------------
// Reference scenarios
// -------------------------------------------------------------------------

#[test]
fn test_list_all_reports_every_group_in_store_order() {
    let service = service_for(&reference_machine());

    let report = service.exchange(b"ALL");

    assert_eq!(report, store_lines(&service).concat());
    assert_eq!(report.lines().count(), 2);
    assert!(report.contains(BASH_LINE));
    assert!(report.contains(SSHD_LINE));
}

#[test]
fn test_filter_reports_only_the_named_group() {
    let service = service_for(&reference_machine());
    assert_eq!(service.exchange(b"FILTER|bash"), BASH_LINE);
}

#[test]
fn test_delete_then_filter_reports_no_such_process() {
    let service = service_for(&reference_machine());

    assert_eq!(service.exchange(b"DEL|bash"), "[SUCCESS]\n");
    assert_eq!(service.exchange(b"FILTER|bash"), "[ERROR]: No such process\n");
    assert_eq!(service.exchange(b"ALL"), SSHD_LINE);
}

#[test]
fn test_reset_rebuilds_from_current_processes() {
    let machine = reference_machine();
    let service = service_for(&machine);

    machine.kill(11);
    machine.spawn(42, "nginx", 8, 8);

    assert_eq!(service.exchange(b"RESET"), "[SUCCESS]\n");
    assert_eq!(
        service.exchange(b"FILTER|bash"),
        "bash, total: 300, valid: 200, invalid: 100, may_be_shared: 0, nb_group: 0, pid(1): 10\n"
    );
    assert_eq!(
        service.exchange(b"FILTER|nginx"),
        "nginx, total: 8, valid: 8, invalid: 0, may_be_shared: 0, nb_group: 0, pid(1): 42\n"
    );
}

#[test]
fn test_failed_reset_keeps_previous_store() {
    let machine = reference_machine();
    let service = service_for(&machine);
    let before = store_lines(&service);

    machine.fail.store(true, Ordering::SeqCst);
    machine.spawn(99, "intruder", 1, 1);

    assert_eq!(
        service.exchange(b"RESET"),
        "[ERROR]: Memory allocation error\n"
    );
    assert_eq!(store_lines(&service), before);
    assert_eq!(service.exchange(b"FILTER|intruder"), "[ERROR]: No such process\n");
}

#[test]
fn test_unknown_command_leaves_store_unchanged() {
    let service = service_for(&reference_machine());
    let before = store_lines(&service);

    assert_eq!(service.exchange(b"XYZZY"), "[ERROR]: Invalid argument\n");
    assert_eq!(service.exchange(b"RESETX"), "[ERROR]: Invalid argument\n");
    assert_eq!(service.exchange(b"FILTERX|bash"), "[ERROR]: Invalid argument\n");
    assert_eq!(store_lines(&service), before);
}

// -------------------------------------------------------------------------
// Channel behaviour
// -------------------------------------------------------------------------

#[test]
fn test_read_is_idempotent_without_new_write() {
    let service = service_for(&reference_machine());

    service.write_command(b"ALL").unwrap();
    let first = service.read_report();
    let second = service.read_report();
    assert_eq!(first, second);
}

#[test]
fn test_trailing_newline_from_echo_is_accepted() {
    let service = service_for(&reference_machine());

    assert_eq!(service.exchange(b"FILTER|sshd\n"), SSHD_LINE);
    assert_eq!(service.exchange(b"RESET\n"), "[SUCCESS]\n");
    assert_eq!(service.exchange(b"ALL\r\n").lines().count(), 2);
}

#[test]
fn test_kernel_threads_are_not_counted() {
    let machine = reference_machine();
    machine.kernel_thread(2, "kthreadd");
    let service = service_for(&machine);

    assert_eq!(service.exchange(b"FILTER|kthreadd"), "[ERROR]: No such process\n");
    assert_eq!(service.with_store(|s| s.process_count()), 3);
}

#[test]
fn test_long_names_group_by_first_fifteen_bytes() {
    let machine = Arc::new(Machine::default());
    machine.spawn(1, "very-long-process-name-a", 4, 4);
    machine.spawn(2, "very-long-process-name-b", 4, 0);
    let service = service_for(&machine);

    let report = service.exchange(b"ALL");
    assert_eq!(
        report,
        "very-long-proce, total: 8, valid: 4, invalid: 4, may_be_shared: 0, nb_group: 0, pid(2): 1; 2\n"
    );
    assert_eq!(
        service.exchange(b"FILTER|very-long-process-name-zzz"),
        report
    );
}

// -------------------------------------------------------------------------
// Extreme regions and time bounds
// -------------------------------------------------------------------------

#[test]
fn test_reset_with_extreme_snapshot_regions() {
    let source = Arc::new(SnapshotSource::new(Snapshot::new(vec![
        SnapshotProcess {
            pid: 1,
            name: "top".to_string(),
            total_pages: None,
            regions: Some(vec![SnapshotRegion {
                start: 0xFFFF_FFFF_FFFF_E000,
                end: u64::MAX,
                resident: 0,
            }]),
        },
        SnapshotProcess {
            pid: 2,
            name: "greedy".to_string(),
            total_pages: None,
            regions: Some(vec![SnapshotRegion {
                start: 0,
                end: 0x2000,
                resident: u64::MAX / 2,
            }]),
        },
    ])));
    let service = CensusService::new(CensusBuilder::new(source.clone(), source)).unwrap();

    assert_eq!(service.exchange(b"RESET"), "[SUCCESS]\n");
    assert_eq!(
        service.exchange(b"FILTER|top"),
        "top, total: 2, valid: 0, invalid: 2, may_be_shared: 0, nb_group: 0, pid(1): 1\n"
    );
    assert_eq!(
        service.exchange(b"FILTER|greedy"),
        "greedy, total: 2, valid: 2, invalid: 0, may_be_shared: 0, nb_group: 0, pid(1): 2\n"
    );
}

/// Every page lookup takes a millisecond.
struct SlowMachine(Arc<Machine>);

impl ProcessEnumerator for SlowMachine {
    fn enumerate_processes(&self) -> Result<Vec<ProcessSnapshot>, CensusError> {
        self.0.enumerate_processes()
    }
}

impl PageResidency for SlowMachine {
    fn is_resident(&self, _pid: u32, _region: &MemoryRegion, _address: u64) -> Result<bool, CensusError> {
        thread::sleep(Duration::from_millis(1));
        Ok(false)
    }
}

#[test]
fn test_timed_out_reset_releases_the_channel() {
    let machine = Arc::new(Machine::default());
    machine.spawn(7, "giant", 20_000, 0);
    let slow = Arc::new(SlowMachine(machine));
    let service = CensusService::new(
        CensusBuilder::new(slow.clone(), slow).with_limits(CensusLimits {
            timeout: Some(Duration::from_millis(50)),
            ..Default::default()
        }),
    )
    .unwrap();

    let start = Instant::now();
    assert_eq!(service.exchange(b"RESET"), "[ERROR]: Unknown error\n");
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(service.exchange(b"DEL|giant"), "[ERROR]: No such process\n");
}

// -------------------------------------------------------------------------
// Invariants
// -------------------------------------------------------------------------

#[test]
fn test_invariants_hold_across_operation_sequence() {
    let machine = Arc::new(Machine::default());
    for pid in 0..64u32 {
        let name = format!("worker{}", pid % 7);
        machine.spawn(100 + pid, &name, 3 + u64::from(pid % 5), u64::from(pid % 3));
    }
    let service = service_for(&machine);
    service.with_store(assert_invariants);

    for script in [
        &b"DEL|worker3"[..],
        b"RESET",
        b"DEL|worker0",
        b"DEL|worker0",
        b"ALL",
        b"FILTER|worker5",
        b"RESET",
    ] {
        service.exchange(script);
        service.with_store(assert_invariants);
    }

    assert_eq!(service.with_store(|s| s.len()), 7);
    assert_eq!(service.with_store(|s| s.process_count()), 64);
}

#[test]
fn test_totals_are_sum_of_valid_and_invalid() {
    let service = service_for(&reference_machine());
    service.with_store(|store| {
        for group in store.iter() {
            assert_eq!(group.total_pages, group.valid_pages + group.invalid_pages);
        }
        let bash = store.find(&ProcessName::from("bash")).unwrap();
        assert_eq!(bash.pids(), &[10, 11]);
    });
}

// -------------------------------------------------------------------------
// Concurrency
// -------------------------------------------------------------------------

#[test]
fn test_concurrent_readers_and_resets_never_see_partial_store() {
    let machine = Arc::new(Machine::default());
    for pid in 0..32u32 {
        machine.spawn(pid + 1, &format!("svc{}", pid % 4), 16, 8);
    }
    let service = Arc::new(service_for(&machine));
    let expected = service.exchange(b"ALL");

    let mut handles = Vec::new();
    for i in 0..4 {
        let service = service.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..50 {
                if i == 0 {
                    service.exchange(b"RESET");
                } else {
                    let report = service.with_store(|s| {
                        s.iter()
                            .map(herakles_proc_census::report::format_group)
                            .collect::<String>()
                    });
                    assert_eq!(report.lines().count(), 4);
                    service.with_store(assert_invariants);
                }
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(service.exchange(b"ALL"), expected);
}

#[test]
fn test_concurrent_writers_always_get_a_well_formed_report() {
    let service = Arc::new(service_for(&reference_machine()));

    let mut handles = Vec::new();
    for i in 0..8 {
        let service = service.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..100 {
                let command: &[u8] = if i % 2 == 0 { b"FILTER|sshd" } else { b"XYZZY" };
                service.write_command(command).unwrap();
                let report = service.read_report();
                assert!(
                    report == SSHD_LINE || report == "[ERROR]: Invalid argument\n",
                    "unexpected report {:?}",
                    report
                );
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
}
