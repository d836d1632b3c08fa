//! Report formatting for the census channel.
//!
//! One line per group:
//!
//! ```text
//! bash, total: 500, valid: 300, invalid: 200, may_be_shared: 0, nb_group: 0, pid(2): 10; 11
//! ```
//!
//! Status lines are `[SUCCESS]` or one of the [`ChannelError`] literals.

use std::fmt::Write as FmtWrite;
use thiserror::Error;

use crate::census::CensusError;
use crate::store::{ProcessGroup, StoreError};

pub const SUCCESS: &str = "[SUCCESS]\n";

/// Errors surfaced to channel clients. `Display` is the literal status text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("[ERROR]: Invalid argument")]
    InvalidArgument,

    #[error("[ERROR]: No such file or directory")]
    NoSuchFile,

    #[error("[ERROR]: Bad address")]
    BadAddress,

    #[error("[ERROR]: No such process")]
    NoSuchProcess,

    #[error("[ERROR]: Memory allocation error")]
    OutOfMemory,

    #[error("[ERROR]: Unknown error")]
    Unknown,
}

impl ChannelError {
    /// Status line, newline terminated.
    pub fn line(&self) -> String {
        format!("{}\n", self)
    }
}

impl From<&StoreError> for ChannelError {
    fn from(err: &StoreError) -> Self {
        match err {
            StoreError::NoSuchProcess(_) => ChannelError::NoSuchProcess,
            StoreError::AllocationFailed => ChannelError::OutOfMemory,
            StoreError::InvalidBucketCount(_) => ChannelError::InvalidArgument,
            StoreError::DuplicateName(_) => ChannelError::Unknown,
        }
    }
}

impl From<&CensusError> for ChannelError {
    fn from(err: &CensusError) -> Self {
        match err {
            CensusError::Timeout(_) => ChannelError::Unknown,
            _ => ChannelError::OutOfMemory,
        }
    }
}

/// Appends the report line for one group.
pub fn write_group(out: &mut String, group: &ProcessGroup) {
    write!(
        out,
        "{}, total: {}, valid: {}, invalid: {}, may_be_shared: {}, nb_group: {}, pid({}): ",
        group.name(),
        group.total_pages,
        group.valid_pages,
        group.invalid_pages,
        group.shareable_pages,
        group.group_count,
        group.pid_count()
    )
    .ok();

    for (i, pid) in group.pids().iter().enumerate() {
        if i > 0 {
            out.push_str("; ");
        }
        write!(out, "{}", pid).ok();
    }
    out.push('\n');
}

pub fn format_group(group: &ProcessGroup) -> String {
    let mut out = String::new();
    write_group(&mut out, group);
    out
}
