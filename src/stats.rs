//! Census and channel statistics.
//!
//! Tracks census performance (duration, processes, groups, pages), census
//! outcomes and channel traffic. Rendered as a plain-text table for the
//! `/health` endpoint.

use std::fmt::Write as FmtWrite;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock as StdRwLock};
use std::time::Instant;

use crate::census::CensusSummary;

/// Running statistics for a single metric.
#[derive(Clone, Copy, Default)]
pub struct RunningStat {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    last: f64,
}

impl RunningStat {
    pub fn add(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
            self.last = value;
            self.sum = value;
            self.count = 1;
            return;
        }
        self.count += 1;
        self.sum += value;
        self.last = value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / (self.count as f64)
        }
    }
}

/// Thread-safe wrapper for running statistics.
#[derive(Default)]
pub struct Stat {
    inner: Mutex<RunningStat>,
}

impl Stat {
    pub fn add_sample(&self, value: f64) {
        if let Ok(mut s) = self.inner.lock() {
            s.add(value);
        }
    }

    /// (last, avg, max, min, count)
    pub fn snapshot(&self) -> (f64, f64, f64, f64, u64) {
        if let Ok(s) = self.inner.lock() {
            (s.last, s.avg(), s.max, s.min, s.count)
        } else {
            (0.0, 0.0, 0.0, 0.0, 0)
        }
    }
}

pub struct CensusStats {
    pub census_duration_seconds: Stat,
    pub processes_scanned: Stat,
    pub groups: Stat,
    pub pages_classified: Stat,

    pub census_success_count: AtomicU64,
    pub census_failure_count: AtomicU64,

    pub commands_written: AtomicU64,
    pub reports_served: AtomicU64,
    pub invalid_commands: AtomicU64,
    pub lookup_misses: AtomicU64,
    pub groups_deleted: AtomicU64,

    pub start_time: Instant,
    pub last_census_time: StdRwLock<Option<Instant>>,
}

impl Default for CensusStats {
    fn default() -> Self {
        Self {
            census_duration_seconds: Stat::default(),
            processes_scanned: Stat::default(),
            groups: Stat::default(),
            pages_classified: Stat::default(),
            census_success_count: AtomicU64::new(0),
            census_failure_count: AtomicU64::new(0),
            commands_written: AtomicU64::new(0),
            reports_served: AtomicU64::new(0),
            invalid_commands: AtomicU64::new(0),
            lookup_misses: AtomicU64::new(0),
            groups_deleted: AtomicU64::new(0),
            start_time: Instant::now(),
            last_census_time: StdRwLock::new(None),
        }
    }
}

impl CensusStats {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn record_census(&self, summary: &CensusSummary) {
        self.census_duration_seconds
            .add_sample(summary.duration.as_secs_f64());
        self.processes_scanned.add_sample(summary.processes as f64);
        self.groups.add_sample(summary.groups as f64);
        self.pages_classified.add_sample(summary.pages as f64);
        self.census_success_count.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut guard) = self.last_census_time.write() {
            *guard = Some(Instant::now());
        }
    }

    pub fn record_census_failure(&self) {
        self.census_failure_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_command_written(&self) {
        self.commands_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_report_served(&self) {
        self.reports_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalid_command(&self) {
        self.invalid_commands.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lookup_miss(&self) {
        self.lookup_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_group_deleted(&self) {
        self.groups_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_census_success_rate(&self) -> f64 {
        let success = self.census_success_count.load(Ordering::Relaxed);
        let failure = self.census_failure_count.load(Ordering::Relaxed);
        let total = success + failure;
        if total == 0 {
            100.0
        } else {
            (success as f64 / total as f64) * 100.0
        }
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Seconds since the last successful census, if any.
    pub fn seconds_since_last_census(&self) -> Option<f64> {
        self.last_census_time
            .read()
            .ok()
            .and_then(|guard| guard.map(|t| t.elapsed().as_secs_f64()))
    }

    pub fn render_table(&self) -> String {
        let rows = [
            ("census_duration (s)", self.census_duration_seconds.snapshot()),
            ("processes_scanned", self.processes_scanned.snapshot()),
            ("groups", self.groups.snapshot()),
            ("pages_classified", self.pages_classified.snapshot()),
        ];

        let left_col = 22usize;
        let col_w = 12usize;
        let mut out = String::new();

        writeln!(out, "CENSUS STATISTICS").ok();
        writeln!(out, "=================").ok();
        writeln!(out).ok();
        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "",
            "current",
            "average",
            "max",
            "min",
            left = left_col,
            col = col_w
        )
        .ok();
        writeln!(out, "{}", "-".repeat(left_col + 4 * (col_w + 3))).ok();

        for (label, (cur, avg, max, min, _count)) in rows {
            writeln!(
                out,
                "{:left$} | {:>col$.3} | {:>col$.3} | {:>col$.3} | {:>col$.3}",
                label,
                cur,
                avg,
                max,
                min,
                left = left_col,
                col = col_w
            )
            .ok();
        }

        writeln!(out).ok();
        writeln!(
            out,
            "censuses: {} ok / {} failed ({:.1}% success)",
            self.census_success_count.load(Ordering::Relaxed),
            self.census_failure_count.load(Ordering::Relaxed),
            self.get_census_success_rate()
        )
        .ok();
        writeln!(
            out,
            "commands written: {} | reports served: {} | invalid: {} | lookup misses: {} | deleted: {}",
            self.commands_written.load(Ordering::Relaxed),
            self.reports_served.load(Ordering::Relaxed),
            self.invalid_commands.load(Ordering::Relaxed),
            self.lookup_misses.load(Ordering::Relaxed),
            self.groups_deleted.load(Ordering::Relaxed)
        )
        .ok();
        match self.seconds_since_last_census() {
            Some(secs) => writeln!(out, "last census: {:.1}s ago", secs).ok(),
            None => writeln!(out, "last census: N/A").ok(),
        };
        out
    }
}
