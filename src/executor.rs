//! Query executor: single-shot dispatch of a parsed command against the store.
//!
//! Locking:
//! - `ListAll` and `Filter` take the store's read lock and may run together.
//! - `Reset` and `Delete` run under the exclusive gate. A reset builds its
//!   staging store without holding the store lock, then swaps it in under the
//!   write lock, so readers see the old store or the new one, never a mix.
//! - A failed census leaves the live store untouched.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard};
use tracing::{debug, error, info, instrument, warn};

use crate::census::{CensusBuilder, CensusError, CensusSummary};
use crate::command::Command;
use crate::name::ProcessName;
use crate::report::{write_group, ChannelError, SUCCESS};
use crate::stats::CensusStats;
use crate::store::{AggregationStore, StoreError};

/// Held while a mutation is in progress.
pub struct Exclusive<'a> {
    _guard: MutexGuard<'a, ()>,
}

pub struct QueryExecutor {
    gate: Mutex<()>,
    store: RwLock<AggregationStore>,
    builder: CensusBuilder,
    stats: Arc<CensusStats>,
}

impl QueryExecutor {
    pub fn new(builder: CensusBuilder, stats: Arc<CensusStats>) -> Result<Self, StoreError> {
        let store = AggregationStore::new(builder.bucket_count())?;
        Ok(Self {
            gate: Mutex::new(()),
            store: RwLock::new(store),
            builder,
            stats,
        })
    }

    /// Takes the exclusive gate.
    pub fn exclusive(&self) -> Exclusive<'_> {
        Exclusive {
            _guard: self.gate.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }

    fn read_store(&self) -> RwLockReadGuard<'_, AggregationStore> {
        self.store.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` against the live store under the read lock.
    pub fn with_store<R>(&self, f: impl FnOnce(&AggregationStore) -> R) -> R {
        f(&self.read_store())
    }

    /// Executes a command, taking the gate itself when the command mutates.
    pub fn execute(&self, command: &Command) -> String {
        if command.is_mutating() {
            let exclusive = self.exclusive();
            self.execute_exclusive(&exclusive, command)
        } else {
            self.execute_shared(command)
        }
    }

    /// Executes a command while the caller holds the gate.
    pub fn execute_exclusive(&self, exclusive: &Exclusive<'_>, command: &Command) -> String {
        match command {
            Command::Reset => match self.rebuild(exclusive) {
                Ok(_) => SUCCESS.to_string(),
                Err(e) => ChannelError::from(&e).line(),
            },
            Command::Delete(name) => match self.delete(exclusive, name) {
                Ok(()) => SUCCESS.to_string(),
                Err(e) => ChannelError::from(&e).line(),
            },
            _ => self.execute_shared(command),
        }
    }

    fn execute_shared(&self, command: &Command) -> String {
        match command {
            Command::ListAll => self.list_all(),
            Command::Filter(name) => match self.filter(name) {
                Ok(line) => line,
                Err(e) => e.line(),
            },
            Command::Unknown => {
                warn!("[ERROR]: Invalid argument");
                self.stats.record_invalid_command();
                ChannelError::InvalidArgument.line()
            }
            Command::Reset | Command::Delete(_) => self.execute(command),
        }
    }

    /// Rebuilds the store from a fresh census.
    #[instrument(skip(self, _exclusive))]
    pub fn rebuild(&self, _exclusive: &Exclusive<'_>) -> Result<CensusSummary, CensusError> {
        debug!("Building staging store");
        let (staging, summary) = match self.builder.build() {
            Ok(result) => result,
            Err(e) => {
                error!("Census failed, keeping the previous store: {}", e);
                self.stats.record_census_failure();
                return Err(e);
            }
        };

        let previous = {
            let mut live = self.store.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *live, staging)
        };
        debug!("Replaced store, releasing {} previous groups", previous.len());
        drop(previous);

        self.stats.record_census(&summary);
        Ok(summary)
    }

    fn delete(&self, _exclusive: &Exclusive<'_>, name: &ProcessName) -> Result<(), StoreError> {
        let removed = {
            let mut live = self.store.write().unwrap_or_else(PoisonError::into_inner);
            live.delete(name)
        };
        match removed {
            Ok(group) => {
                info!("Deleted group {} ({} pids)", group.name(), group.pid_count());
                self.stats.record_group_deleted();
                Ok(())
            }
            Err(e) => {
                warn!("[ERROR]: No such process ({})", name);
                self.stats.record_lookup_miss();
                Err(e)
            }
        }
    }

    fn list_all(&self) -> String {
        let store = self.read_store();
        let mut out = String::new();
        for group in store.iter() {
            write_group(&mut out, group);
        }
        out
    }

    fn filter(&self, name: &ProcessName) -> Result<String, ChannelError> {
        let store = self.read_store();
        match store.find(name) {
            Some(group) => {
                let mut out = String::new();
                write_group(&mut out, group);
                Ok(out)
            }
            None => {
                warn!("[ERROR]: No such process ({})", name);
                self.stats.record_lookup_miss();
                Err(ChannelError::NoSuchProcess)
            }
        }
    }

    /// Drops every group.
    pub fn clear(&self, _exclusive: &Exclusive<'_>) {
        self.store
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
