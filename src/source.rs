//! Collaborator wiring: picks /proc or a snapshot file and builds the service.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use herakles_proc_census::{
    CensusBuilder, CensusService, PagemapResidency, ProcEnumerator, SnapshotSource,
};

use crate::config::Config;

const PROC_ROOT: &str = "/proc";

/// Builds the census builder for the configured source.
pub fn census_builder(config: &Config) -> Result<CensusBuilder> {
    let builder = match &config.snapshot_file {
        Some(path) => {
            let source = Arc::new(
                SnapshotSource::from_file(path)
                    .with_context(|| format!("loading snapshot {}", path.display()))?,
            );
            info!("Using snapshot source: {}", path.display());
            let page_size = source.page_size();
            CensusBuilder::new(source.clone(), source).with_page_size(page_size)
        }
        None => {
            info!("Using live source: {}", PROC_ROOT);
            let enumerator = ProcEnumerator::new(PROC_ROOT);
            CensusBuilder::new(
                Arc::new(enumerator),
                Arc::new(PagemapResidency::new(PROC_ROOT)),
            )
            .with_page_size(*herakles_proc_census::process::PAGE_SIZE)
        }
    };

    Ok(builder
        .with_bucket_count(config.bucket_count())
        .with_limits(config.census_limits())
        .with_filter(config.process_filter()))
}

/// Builds the service for the configured source. The store starts empty.
pub fn build_service(config: &Config) -> Result<CensusService> {
    let service = CensusService::new(census_builder(config)?)
        .context("creating census service")?
        .with_max_command_bytes(config.max_command_bytes());
    Ok(service)
}

/// Sizes the global rayon pool used for per-process classification.
pub fn configure_parallelism(config: &Config) -> Result<()> {
    if let Some(threads) = config.parallelism.filter(|&n| n > 0) {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("configuring classification thread pool")?;
        info!("Census classification uses {} threads", threads);
    }
    Ok(())
}
