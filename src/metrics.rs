//! Prometheus metrics definitions for herakles-proc-census.
//!
//! Per-group page gauges are labelled by process name and rebuilt from the
//! live store on every scrape. Census gauges mirror [`CensusStats`].

use herakles_proc_census::{AggregationStore, CensusService, CensusStats};
use prometheus::proto::MetricFamily;
use prometheus::{Gauge, GaugeVec, Opts, Registry};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Clone)]
pub struct CensusMetrics {
    // ========== Group Metrics ==========
    pub group_total_pages: GaugeVec,   // labels: name
    pub group_valid_pages: GaugeVec,   // labels: name
    pub group_invalid_pages: GaugeVec, // labels: name
    pub group_processes: GaugeVec,     // labels: name

    // ========== Store Metrics ==========
    pub groups: Gauge,
    pub processes: Gauge,

    // ========== Census Metrics ==========
    pub census_duration_seconds: Gauge,
    pub census_pages_classified: Gauge,
    pub census_success_total: Gauge,
    pub census_failure_total: Gauge,
    pub census_last_age_seconds: Gauge,
    pub commands_written_total: Gauge,

    // Serialises reset, refill and gather across concurrent scrapes
    scrape: Arc<Mutex<()>>,
}

fn group_gauge(name: &str, help: &str) -> Result<GaugeVec, prometheus::Error> {
    GaugeVec::new(Opts::new(name, help), &["name"])
}

impl CensusMetrics {
    /// Creates and registers all Prometheus metrics with the registry.
    pub fn new(registry: &Registry) -> Result<Self, Box<dyn std::error::Error>> {
        let group_total_pages = group_gauge(
            "herakles_census_group_total_pages",
            "Virtual pages of all processes in the group",
        )?;
        let group_valid_pages = group_gauge(
            "herakles_census_group_valid_pages",
            "Resident pages of all processes in the group",
        )?;
        let group_invalid_pages = group_gauge(
            "herakles_census_group_invalid_pages",
            "Non-resident pages of all processes in the group",
        )?;
        let group_processes = group_gauge(
            "herakles_census_group_processes",
            "Number of processes in the group",
        )?;

        let groups = Gauge::new("herakles_census_groups", "Groups in the live store")?;
        let processes = Gauge::new("herakles_census_processes", "Processes in the live store")?;

        let census_duration_seconds = Gauge::new(
            "herakles_census_duration_seconds",
            "Duration of the last successful census",
        )?;
        let census_pages_classified = Gauge::new(
            "herakles_census_pages_classified",
            "Pages classified by the last successful census",
        )?;
        let census_success_total = Gauge::new(
            "herakles_census_success_total",
            "Successful censuses since start",
        )?;
        let census_failure_total = Gauge::new(
            "herakles_census_failure_total",
            "Failed censuses since start",
        )?;
        let census_last_age_seconds = Gauge::new(
            "herakles_census_last_age_seconds",
            "Seconds since the last successful census (-1 if none)",
        )?;
        let commands_written_total = Gauge::new(
            "herakles_census_commands_written_total",
            "Commands written to the channel since start",
        )?;

        registry.register(Box::new(group_total_pages.clone()))?;
        registry.register(Box::new(group_valid_pages.clone()))?;
        registry.register(Box::new(group_invalid_pages.clone()))?;
        registry.register(Box::new(group_processes.clone()))?;
        registry.register(Box::new(groups.clone()))?;
        registry.register(Box::new(processes.clone()))?;
        registry.register(Box::new(census_duration_seconds.clone()))?;
        registry.register(Box::new(census_pages_classified.clone()))?;
        registry.register(Box::new(census_success_total.clone()))?;
        registry.register(Box::new(census_failure_total.clone()))?;
        registry.register(Box::new(census_last_age_seconds.clone()))?;
        registry.register(Box::new(commands_written_total.clone()))?;

        Ok(Self {
            group_total_pages,
            group_valid_pages,
            group_invalid_pages,
            group_processes,
            groups,
            processes,
            census_duration_seconds,
            census_pages_classified,
            census_success_total,
            census_failure_total,
            census_last_age_seconds,
            commands_written_total,
            scrape: Arc::new(Mutex::new(())),
        })
    }

    /// Resets only group-level metrics, so deleted groups disappear.
    pub fn reset_group_metrics(&self) {
        self.group_total_pages.reset();
        self.group_valid_pages.reset();
        self.group_invalid_pages.reset();
        self.group_processes.reset();
    }

    /// Sets the group gauges from the live store.
    pub fn update_from_store(&self, store: &AggregationStore) {
        self.reset_group_metrics();
        for group in store.iter() {
            let name = group.name().to_string();
            let labels = [name.as_str()];
            self.group_total_pages
                .with_label_values(&labels)
                .set(group.total_pages as f64);
            self.group_valid_pages
                .with_label_values(&labels)
                .set(group.valid_pages as f64);
            self.group_invalid_pages
                .with_label_values(&labels)
                .set(group.invalid_pages as f64);
            self.group_processes
                .with_label_values(&labels)
                .set(group.pid_count() as f64);
        }
        self.groups.set(store.len() as f64);
        self.processes.set(store.process_count() as f64);
    }

    /// Refreshes every gauge from the service and gathers the registry.
    pub fn gather(&self, registry: &Registry, service: &CensusService) -> Vec<MetricFamily> {
        let _scrape = self.scrape.lock().unwrap_or_else(PoisonError::into_inner);
        service.with_store(|store| self.update_from_store(store));
        self.update_from_stats(service.stats());
        registry.gather()
    }

    /// Sets the census gauges from the running statistics.
    pub fn update_from_stats(&self, stats: &CensusStats) {
        let (last_duration, ..) = stats.census_duration_seconds.snapshot();
        let (last_pages, ..) = stats.pages_classified.snapshot();
        self.census_duration_seconds.set(last_duration);
        self.census_pages_classified.set(last_pages);
        self.census_success_total
            .set(stats.census_success_count.load(Ordering::Relaxed) as f64);
        self.census_failure_total
            .set(stats.census_failure_count.load(Ordering::Relaxed) as f64);
        self.census_last_age_seconds
            .set(stats.seconds_since_last_census().unwrap_or(-1.0));
        self.commands_written_total
            .set(stats.commands_written.load(Ordering::Relaxed) as f64);
    }
}
