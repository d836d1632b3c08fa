//! Check command implementation.
//!
//! Validates system requirements and configuration.

use std::path::Path;

use herakles_proc_census::process::{collect_proc_entries, read_memory_regions};
use herakles_proc_census::{PageResidency, PagemapResidency};

use crate::config::{validate_effective_config, Config};

/// Validates system requirements and configuration.
pub fn command_check(
    memory: bool,
    proc: bool,
    all: bool,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Herakles Process Census - System Check");
    println!("==========================================");

    let mut all_ok = true;

    // Check /proc filesystem
    if proc || all {
        println!("\n📁 Checking /proc filesystem...");
        match collect_proc_entries(Path::new("/proc")) {
            Ok(entries) if !entries.is_empty() => {
                println!("   ✅ Can read {} process entries", entries.len());
            }
            Ok(_) => {
                println!("   ❌ No process entries found in /proc");
                all_ok = false;
            }
            Err(e) => {
                println!("   ❌ /proc filesystem not readable: {}", e);
                all_ok = false;
            }
        }
    }

    // Check pagemap accessibility on our own process
    if memory || all {
        println!("\n💾 Checking page residency accessibility...");
        let test_pid = std::process::id();
        let test_path = Path::new("/proc").join(test_pid.to_string());

        match read_memory_regions(&test_path) {
            Ok(regions) if !regions.is_empty() => {
                println!("   ✅ maps readable: {} regions", regions.len());
                let residency = PagemapResidency::default();
                let page_size = *herakles_proc_census::process::PAGE_SIZE;
                match residency.is_resident(test_pid, &regions[0], regions[0].start) {
                    Ok(_) => {
                        let counts = residency.classify_region(test_pid, &regions[0], page_size, None)?;
                        println!(
                            "   ✅ pagemap readable: first region {} valid / {} invalid pages",
                            counts.valid, counts.invalid
                        );
                    }
                    Err(e) => {
                        println!("   ❌ pagemap not readable: {}", e);
                        all_ok = false;
                    }
                }
            }
            Ok(_) => {
                println!("   ❌ No memory regions found");
                all_ok = false;
            }
            Err(e) => {
                println!("   ❌ maps not readable: {}", e);
                all_ok = false;
            }
        }
    }

    // Check configuration
    println!("\n⚙️  Checking configuration...");
    match validate_effective_config(config) {
        Ok(_) => {
            println!("   ✅ Configuration is valid");
        }
        Err(e) => {
            println!("   ❌ Configuration invalid: {}", e);
            all_ok = false;
        }
    }

    println!("\n📋 Summary:");
    if all_ok {
        println!("   ✅ All checks passed - system is ready");
        Ok(())
    } else {
        println!("   ❌ Some checks failed - please review warnings");
        std::process::exit(1);
    }
}
