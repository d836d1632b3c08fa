//! Census service: the single object clients exchange commands with.
//!
//! A write stores the raw command as the pending command, replacing any
//! previous one. A read parses the pending command, executes it and returns
//! the report. The report is cached with the pending command, so reading again
//! without an intervening write returns the same text and never runs a
//! `RESET` or `DEL` twice.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, instrument};

use crate::census::{CensusBuilder, CensusError, CensusSummary};
use crate::command::parse_command;
use crate::executor::QueryExecutor;
use crate::report::ChannelError;
use crate::stats::CensusStats;
use crate::store::{AggregationStore, StoreError};

/// Default upper bound on a written command.
pub const DEFAULT_MAX_COMMAND_BYTES: usize = 4096;

/// State of the pending slot as seen by a reader holding the gate.
enum Slot {
    /// Still waiting for its first read.
    Pending,
    /// Already executed by another reader.
    Answered(Arc<str>),
    /// Overwritten by a newer write.
    Replaced,
}

struct PendingCommand {
    generation: u64,
    raw: Vec<u8>,
    report: Option<Arc<str>>,
}

pub struct CensusService {
    executor: QueryExecutor,
    pending: RwLock<Option<PendingCommand>>,
    generation: AtomicU64,
    max_command_bytes: usize,
    stats: Arc<CensusStats>,
}

impl CensusService {
    pub fn new(builder: CensusBuilder) -> Result<Self, StoreError> {
        Self::with_stats(builder, Arc::new(CensusStats::new()))
    }

    pub fn with_stats(builder: CensusBuilder, stats: Arc<CensusStats>) -> Result<Self, StoreError> {
        Ok(Self {
            executor: QueryExecutor::new(builder, stats.clone())?,
            pending: RwLock::new(None),
            generation: AtomicU64::new(0),
            max_command_bytes: DEFAULT_MAX_COMMAND_BYTES,
            stats,
        })
    }

    pub fn with_max_command_bytes(mut self, max: usize) -> Self {
        self.max_command_bytes = max;
        self
    }

    pub fn stats(&self) -> &Arc<CensusStats> {
        &self.stats
    }

    /// Runs a census and installs it as the live store.
    pub fn rebuild(&self) -> Result<CensusSummary, CensusError> {
        let exclusive = self.executor.exclusive();
        self.executor.rebuild(&exclusive)
    }

    /// Runs `f` against the live store under the read lock.
    pub fn with_store<R>(&self, f: impl FnOnce(&AggregationStore) -> R) -> R {
        self.executor.with_store(f)
    }

    /// Replaces the pending command. Returns the number of bytes accepted.
    pub fn write_command(&self, raw: &[u8]) -> Result<usize, ChannelError> {
        if raw.len() > self.max_command_bytes {
            debug!(
                "Rejecting {} byte command (limit {})",
                raw.len(),
                self.max_command_bytes
            );
            return Err(ChannelError::BadAddress);
        }

        let mut buf = Vec::new();
        buf.try_reserve_exact(raw.len())
            .map_err(|_| ChannelError::OutOfMemory)?;
        buf.extend_from_slice(raw);

        let _exclusive = self.executor.exclusive();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        *self.pending.write().unwrap_or_else(PoisonError::into_inner) = Some(PendingCommand {
            generation,
            raw: buf,
            report: None,
        });
        self.stats.record_command_written();
        Ok(raw.len())
    }

    /// Produces the report for the pending command.
    #[instrument(skip(self))]
    pub fn read_report(&self) -> String {
        self.stats.record_report_served();

        loop {
            let (generation, raw) = {
                let pending = self.pending.read().unwrap_or_else(PoisonError::into_inner);
                match pending.as_ref() {
                    None => return ChannelError::NoSuchFile.line(),
                    Some(p) => match &p.report {
                        Some(report) => return report.to_string(),
                        None => (p.generation, p.raw.clone()),
                    },
                }
            };

            let command = parse_command(&raw);
            debug!("Executing {} command", command.keyword());

            if !command.is_mutating() {
                let report: Arc<str> = self.executor.execute(&command).into();
                self.memoize(generation, &report);
                return report.to_string();
            }

            let exclusive = self.executor.exclusive();
            match self.slot_state(generation) {
                Slot::Answered(report) => return report.to_string(),
                Slot::Replaced => continue,
                Slot::Pending => {}
            }
            let report: Arc<str> = self.executor.execute_exclusive(&exclusive, &command).into();
            self.memoize(generation, &report);
            return report.to_string();
        }
    }

    /// Writes a command and reads its report.
    pub fn exchange(&self, raw: &[u8]) -> String {
        match self.write_command(raw) {
            Ok(_) => self.read_report(),
            Err(e) => e.line(),
        }
    }

    fn slot_state(&self, generation: u64) -> Slot {
        let pending = self.pending.read().unwrap_or_else(PoisonError::into_inner);
        match pending.as_ref() {
            Some(p) if p.generation == generation => match &p.report {
                Some(report) => Slot::Answered(report.clone()),
                None => Slot::Pending,
            },
            _ => Slot::Replaced,
        }
    }

    fn memoize(&self, generation: u64, report: &Arc<str>) {
        let mut pending = self.pending.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(p) = pending.as_mut() {
            if p.generation == generation && p.report.is_none() {
                p.report = Some(report.clone());
            }
        }
    }

    /// Releases the store and the pending command.
    pub fn shutdown(&self) {
        let exclusive = self.executor.exclusive();
        self.executor.clear(&exclusive);
        *self.pending.write().unwrap_or_else(PoisonError::into_inner) = None;
        info!("Census service shut down, store released");
    }
}
