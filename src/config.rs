use anyhow::Result;
use serde::Deserialize;
use std::path::Path;

/// Engine tunables. Everything has a default so hosts can run with
/// `EngineConfig::default()` and only override what they care about.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Journals fetched per page during matcher and retroactive scans.
    #[serde(default = "default_scan_page_size")]
    pub scan_page_size: usize,
    /// Bounded capacity of the retroactive job queue; enqueueing past it
    /// applies backpressure.
    #[serde(default = "default_max_pending_jobs")]
    pub max_pending_jobs: usize,
    /// Retries for a failed retroactive job. Actions are idempotent, so
    /// at-least-once is safe.
    #[serde(default = "default_job_max_retries")]
    pub job_max_retries: u32,
}

fn default_scan_page_size() -> usize {
    100
}

fn default_max_pending_jobs() -> usize {
    64
}

fn default_job_max_retries() -> u32 {
    3
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scan_page_size: default_scan_page_size(),
            max_pending_jobs: default_max_pending_jobs(),
            job_max_retries: default_job_max_retries(),
        }
    }
}

impl EngineConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .build()?;

        let config: EngineConfig = settings.try_deserialize()?;
        Ok(config)
    }
}
