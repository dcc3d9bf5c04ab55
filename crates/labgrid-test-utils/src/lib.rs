//! Shared test fixtures for labgrid integration tests.
//!
//! No external services are involved: a [`MockRemoteCapability`] stands in
//! for real hosts, and [`InMemoryResultStore`] stands in for
//! `labgrid-store`'s file-backed one.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use labgrid_core::lifecycle::Experiment;
use labgrid_core::store::{ComparisonReport, ExportFormat, ResultStatistics, ResultStore};
pub use labgrid_core::remote::mock::MockRemoteCapability;
use labgrid_types::{ExperimentConfig, ExperimentResult, ExperimentStatus, ParamMap, ServerConfig};

/// A minimal, always-succeeding [`ServerConfig`] for a host named `name`.
pub fn sample_server_config(name: &str) -> ServerConfig {
    ServerConfig {
        host: name.to_string(),
        user: "labgrid".to_string(),
        port: 22,
        password: Some("test".to_string()),
        key_filename: None,
        max_concurrent_tasks: 2,
        description: None,
    }
}

/// A servers file with `count` hosts named `host-0`, `host-1`, ...
pub fn sample_servers_file(count: usize) -> HashMap<String, ServerConfig> {
    (0..count).map(|i| { let name = format!("host-{i}"); (name.clone(), sample_server_config(&name)) }).collect()
}

/// A valid [`ExperimentConfig`] writing into a fresh temp directory, paired
/// with the [`tempfile::TempDir`] guard that must outlive it.
pub fn sample_experiment_config(experiment_type: &str) -> (tempfile::TempDir, ExperimentConfig) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let config = ExperimentConfig::new(experiment_type, dir.path().display().to_string());
    (dir, config)
}

/// An [`Experiment`] whose every phase succeeds (or fails, if `should_fail`
/// is set) without touching the filesystem or network.
pub struct NoopExperiment {
    config: ExperimentConfig,
    result: ExperimentResult,
    assigned_host: Option<String>,
    should_fail: bool,
}

impl NoopExperiment {
    pub fn new(experiment_id: impl Into<String>, config: ExperimentConfig, should_fail: bool) -> Self {
        let result = ExperimentResult::new(experiment_id, config.output_dir.clone());
        Self { config, result, assigned_host: None, should_fail }
    }
}

#[async_trait]
impl Experiment for NoopExperiment {
    fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    fn result(&self) -> &ExperimentResult {
        &self.result
    }

    fn result_mut(&mut self) -> &mut ExperimentResult {
        &mut self.result
    }

    fn assigned_host(&self) -> Option<&str> {
        self.assigned_host.as_deref()
    }

    fn set_assigned_host(&mut self, host: Option<String>) {
        self.assigned_host = host;
    }

    async fn initialize(&mut self) -> bool {
        !self.should_fail
    }

    async fn execute(&mut self) -> bool {
        !self.should_fail
    }

    async fn collect_data(&mut self) -> bool {
        !self.should_fail
    }

    async fn analyze_data(&mut self) -> ParamMap {
        ParamMap::new()
    }

    async fn save_data(&mut self) -> bool {
        true
    }
}

/// A [`ResultStore`] backed by a plain `Mutex<HashMap>`, for tests that
/// exercise the framework façade without pulling in `labgrid-store`.
#[derive(Default)]
pub struct InMemoryResultStore {
    results: Mutex<HashMap<String, ExperimentResult>>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultStore for InMemoryResultStore {
    fn store_result(&self, result: ExperimentResult) -> bool {
        self.results.lock().unwrap().insert(result.experiment_id.clone(), result);
        true
    }

    fn get_result(&self, experiment_id: &str) -> Option<ExperimentResult> {
        self.results.lock().unwrap().get(experiment_id).cloned()
    }

    fn get_all_results(&self) -> Vec<ExperimentResult> {
        self.results.lock().unwrap().values().cloned().collect()
    }

    fn get_results_by_status(&self, status: ExperimentStatus) -> Vec<ExperimentResult> {
        self.results.lock().unwrap().values().filter(|r| r.status == status).cloned().collect()
    }

    fn search_results(&self, query: &str) -> Vec<ExperimentResult> {
        self.results
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.experiment_id.contains(query))
            .cloned()
            .collect()
    }

    fn get_result_statistics(&self) -> ResultStatistics {
        ResultStatistics::default()
    }

    fn compare_results(&self, _experiment_ids: &[String]) -> ComparisonReport {
        ComparisonReport::default()
    }

    fn cleanup_old_results(&self, _retention_days: u32) -> usize {
        0
    }

    fn export_results(
        &self,
        _path: &std::path::Path,
        _experiment_ids: Option<&[String]>,
        _format: ExportFormat,
    ) -> std::io::Result<()> {
        Ok(())
    }
}
