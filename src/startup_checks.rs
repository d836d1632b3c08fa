//! Startup requirement validation for herakles-proc-census.
//!
//! A census reads `/proc/<pid>/maps` and `/proc/<pid>/pagemap` of every
//! process, which needs root or `CAP_SYS_PTRACE`. Missing privileges are not
//! fatal: unreadable processes count as non-resident or are skipped.

use nix::unistd::geteuid;
use std::fs;
use std::path::Path;
use tracing::{error, info, warn};

/// Validate all runtime requirements
pub fn validate_requirements(proc_root: &Path) -> Result<(), ValidationError> {
    info!("🔍 Validating runtime requirements...");

    check_user_privileges();
    check_proc_access(proc_root)?;
    check_pagemap_access(proc_root)?;

    info!("✅ All runtime requirements validated");
    Ok(())
}

/// Check if running with sufficient privileges
fn check_user_privileges() {
    if !geteuid().is_root() {
        warn!("⚠️  Not running as root - pages of other users' processes will count as invalid");
        warn!("   Recommendation: Run as root for a complete census");
    } else {
        info!("✅ Running as root (uid=0)");
    }
}

/// Check that the proc root can be listed
fn check_proc_access(proc_root: &Path) -> Result<(), ValidationError> {
    match fs::read_dir(proc_root) {
        Ok(_) => {
            info!("✅ {} is readable", proc_root.display());
            Ok(())
        }
        Err(e) => {
            error!("❌ Cannot list {}: {}", proc_root.display(), e);
            Err(ValidationError::ProcUnavailable(e.to_string()))
        }
    }
}

/// Check pagemap access for init, the process least likely to be ours
fn check_pagemap_access(proc_root: &Path) -> Result<(), ValidationError> {
    let test_file = proc_root.join("1").join("pagemap");

    match fs::File::open(&test_file) {
        Ok(_) => {
            info!("✅ pagemap access: Can read all processes");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            error!("❌ Cannot read {} - insufficient permissions", test_file.display());
            error!("   Only pages of user-owned processes will be classified!");
            error!("");
            error!("   Solutions:");
            error!("   1. Run as root");
            error!("   2. Grant capabilities:");
            error!("      setcap cap_sys_ptrace,cap_dac_read_search+ep /path/to/binary");
            Err(ValidationError::InsufficientPermissions(e.to_string()))
        }
        Err(e) => {
            warn!("⚠️  Could not test pagemap access: {}", e);
            Ok(())
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Insufficient permissions: {0}")]
    InsufficientPermissions(String),

    #[error("proc filesystem unavailable: {0}")]
    ProcUnavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_proc_root_fails() {
        let result = validate_requirements(Path::new("/nonexistent/proc/root"));
        assert!(matches!(result, Err(ValidationError::ProcUnavailable(_))));
    }

    #[test]
    fn test_fake_proc_without_init_passes() {
        let root = tempfile::tempdir().unwrap();
        assert!(validate_requirements(root.path()).is_ok());
    }
}
