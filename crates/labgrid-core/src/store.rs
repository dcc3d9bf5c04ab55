//! The result-manager seam: the subset of result-persistence behavior the
//! framework façade depends on.
//!
//! The façade is generic over this trait so it never has to know whether
//! results land in a flat file, a database, or an in-memory stub during
//! tests. `labgrid-store` provides the on-disk implementation described
//! in the data model; `labgrid-test-utils` provides an in-memory one.

use std::collections::HashMap;

use labgrid_types::{ExperimentResult, ExperimentStatus, ParamMap};

#[derive(Debug, Clone, Default)]
pub struct ResultStatistics {
    pub total: usize,
    pub status_counts: HashMap<ExperimentStatus, usize>,
    pub average_duration_secs: f64,
    pub success_rate_pct: f64,
    pub successful_count: usize,
    pub failed_count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ComparisonReport {
    pub execution_times: Vec<(String, Option<f64>)>,
    pub statuses: Vec<(String, ExperimentStatus)>,
    pub metrics_comparison: HashMap<String, Vec<serde_json::Value>>,
    pub file_counts: Vec<(String, usize)>,
    pub min_execution_secs: Option<f64>,
    pub max_execution_secs: Option<f64>,
    pub avg_execution_secs: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

pub trait ResultStore: Send + Sync {
    fn store_result(&self, result: ExperimentResult) -> bool;
    fn get_result(&self, experiment_id: &str) -> Option<ExperimentResult>;
    fn get_all_results(&self) -> Vec<ExperimentResult>;
    fn get_results_by_status(&self, status: ExperimentStatus) -> Vec<ExperimentResult>;
    fn search_results(&self, query: &str) -> Vec<ExperimentResult>;
    fn get_result_statistics(&self) -> ResultStatistics;
    fn compare_results(&self, experiment_ids: &[String]) -> ComparisonReport;
    fn cleanup_old_results(&self, retention_days: u32) -> usize;
    fn export_results(
        &self,
        path: &std::path::Path,
        experiment_ids: Option<&[String]>,
        format: ExportFormat,
    ) -> std::io::Result<()>;
}

/// Helper shared by every [`ResultStore`] implementation: summarize the
/// metrics maps of a result set for [`ComparisonReport::metrics_comparison`].
pub fn collect_metric_values(results: &[ExperimentResult]) -> HashMap<String, Vec<serde_json::Value>> {
    let mut out: HashMap<String, Vec<serde_json::Value>> = HashMap::new();
    for r in results {
        for (k, v) in &r.metrics {
            out.entry(k.clone()).or_default().push(v.clone());
        }
    }
    out
}

pub type Metrics = ParamMap;
