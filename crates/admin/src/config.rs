// crates/admin/src/config.rs
use datasets_pipeline_common::config::env_var;

/// Default port for the admin service.
const DEFAULT_PORT: u16 = 8081;
const DEFAULT_NUM_RESULTS: usize = 100;

#[derive(Debug, Clone)]
pub struct AdminConfig {
    /// `ADMIN_PORT`, then `PORT`.
    pub port: u16,
    /// Page size of `/cache-reports`. `ADMIN_CACHE_REPORTS_NUM_RESULTS`.
    pub cache_reports_num_results: usize,
    /// Page size of `/cache-reports-with-content`.
    /// `ADMIN_CACHE_REPORTS_WITH_CONTENT_NUM_RESULTS`.
    pub cache_reports_with_content_num_results: usize,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            cache_reports_num_results: DEFAULT_NUM_RESULTS,
            cache_reports_with_content_num_results: DEFAULT_NUM_RESULTS,
        }
    }
}

impl AdminConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: env_var("ADMIN_PORT")
                .or_else(|| env_var("PORT"))
                .unwrap_or(defaults.port),
            cache_reports_num_results: env_var("ADMIN_CACHE_REPORTS_NUM_RESULTS")
                .unwrap_or(defaults.cache_reports_num_results),
            cache_reports_with_content_num_results: env_var(
                "ADMIN_CACHE_REPORTS_WITH_CONTENT_NUM_RESULTS",
            )
            .unwrap_or(defaults.cache_reports_with_content_num_results),
        }
    }
}
