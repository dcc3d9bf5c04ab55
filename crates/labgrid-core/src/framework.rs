//! The framework façade: the engine's single public entry point.
//!
//! Owns the task manager, resource manager, experiment registry, result
//! store, and remote capability, and drives a fixed-size pool of worker
//! tasks that pull from the task manager's queue.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use labgrid_types::{
    ExperimentConfig, ExperimentResult, ExperimentStatus, FrameworkConfig, ServerInfo, ServersFile,
    Task, TaskId, TaskStatus,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::FrameworkError;
use crate::registry::{ExperimentInfo, ExperimentRegistry};
use crate::remote::RemoteCapability;
use crate::resource::{ClusterSummary, ResourceManager};
use crate::store::{ComparisonReport, ExportFormat, ResultStatistics, ResultStore};
use crate::task::{TaskManager, TaskStatsSnapshot};

/// Diagnostic snapshot returned by [`Framework::get_framework_info`],
/// the structured equivalent of the source's status dump.
#[derive(Debug, Clone)]
pub struct FrameworkInfo {
    pub name: String,
    pub version: String,
    pub running: bool,
    pub uptime_secs: Option<i64>,
    pub server_count: usize,
    pub registered_experiment_count: usize,
    pub worker_count: u32,
}

struct WorkerHandles {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

/// The orchestration engine's entry point.
pub struct Framework {
    task_manager: Arc<TaskManager>,
    resource_manager: Arc<ResourceManager>,
    registry: Mutex<ExperimentRegistry>,
    result_store: Arc<dyn ResultStore>,
    remote: Arc<dyn RemoteCapability>,
    config: FrameworkConfig,
    servers: ServersFile,
    running: AtomicBool,
    start_time: Mutex<Option<DateTime<Utc>>>,
    workers: Mutex<Option<WorkerHandles>>,
    monitor_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Framework {
    pub fn new(
        servers: ServersFile,
        config: FrameworkConfig,
        remote: Arc<dyn RemoteCapability>,
        result_store: Arc<dyn ResultStore>,
    ) -> Self {
        let resource_manager = Arc::new(ResourceManager::new(&servers, Arc::clone(&remote)));
        let task_manager = Arc::new(TaskManager::new(config.task_queue_size));
        Self {
            task_manager,
            resource_manager,
            registry: Mutex::new(ExperimentRegistry::new()),
            result_store,
            remote,
            config,
            servers,
            running: AtomicBool::new(false),
            start_time: Mutex::new(None),
            workers: Mutex::new(None),
            monitor_handle: Mutex::new(None),
        }
    }

    pub fn register_experiment(
        &self,
        experiment_type: impl Into<String>,
        constructor: crate::registry::ExperimentConstructor,
        description: impl Into<String>,
        tags: Vec<String>,
    ) {
        self.registry.lock().unwrap().register(experiment_type, constructor, description, tags);
    }

    /// Starts the worker pool. Idempotent: a second call while running
    /// logs a warning and returns without relaunching workers.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("framework already running, ignoring start()");
            return;
        }
        *self.start_time.lock().unwrap() = Some(Utc::now());

        if self.config.enable_monitoring {
            let handle = self.resource_manager.start_monitoring();
            *self.monitor_handle.lock().unwrap() = Some(handle);
        }

        let worker_count = self.config.worker_count(self.servers.len());
        let cancel = CancellationToken::new();
        let mut handles = Vec::with_capacity(worker_count as usize);
        for worker_id in 0..worker_count {
            let framework = Arc::clone(self);
            let worker_cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                framework.worker_loop(worker_id, worker_cancel).await;
            }));
        }
        *self.workers.lock().unwrap() = Some(WorkerHandles { cancel, handles });
        info!(worker_count, "framework started");
    }

    /// Signals workers to drain and exit, then shuts down monitoring.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let worker_handles = self.workers.lock().unwrap().take();
        if let Some(WorkerHandles { cancel, handles }) = worker_handles {
            cancel.cancel();
            for handle in handles {
                let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
            }
        }
        self.resource_manager.stop_monitoring();
        if let Some(handle) = self.monitor_handle.lock().unwrap().take() {
            let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        }
        self.remote.close().await;
        info!("framework stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn run_experiment(&self, config: ExperimentConfig) -> Result<TaskId, FrameworkError> {
        if !self.is_running() {
            return Err(FrameworkError::NotStarted);
        }
        if !self.registry.lock().unwrap().validate_experiment_type(&config.experiment_type) {
            return Err(FrameworkError::TypeUnknown(config.experiment_type));
        }
        config.validate().map_err(FrameworkError::ConfigInvalid)?;

        let dependencies = config.dependencies.clone();
        let task_id = self.task_manager.create_task(config, None);
        if !dependencies.is_empty() {
            // Dependencies may not be completed yet; submission is retried
            // by the caller (or a future worker tick) until it succeeds.
            self.task_manager.submit_task(&task_id);
            return Ok(task_id);
        }
        if !self.task_manager.submit_task(&task_id) {
            return Err(FrameworkError::QueueFull);
        }
        Ok(task_id)
    }

    /// Submits many experiments in one call. A single invalid submission
    /// does not abort the batch; its slot carries the error instead.
    pub fn run_batch_experiments(
        &self,
        configs: Vec<ExperimentConfig>,
    ) -> Vec<Result<TaskId, FrameworkError>> {
        configs.into_iter().map(|c| self.run_experiment(c)).collect()
    }

    pub async fn wait_for_experiment(&self, task_id: &str, timeout: Duration) -> bool {
        self.task_manager.wait_for_task_completion(task_id, timeout).await
    }

    pub fn get_experiment_status(&self, task_id: &str) -> Option<TaskStatus> {
        self.task_manager.get_task_status(task_id)
    }

    pub fn get_experiment_result(&self, task_id: &str) -> Option<ExperimentResult> {
        self.task_manager.get_task(task_id).and_then(|t| t.result)
    }

    pub fn list_experiments(&self) -> Vec<String> {
        self.registry.lock().unwrap().list_experiments().into_iter().map(String::from).collect()
    }

    pub fn get_experiment_info(&self, experiment_type: &str) -> Option<ExperimentInfo> {
        self.registry.lock().unwrap().get_experiment_info(experiment_type)
    }

    pub fn get_all_tasks(&self) -> HashMap<TaskStatus, Vec<Task>> {
        self.task_manager.get_all_tasks()
    }

    pub fn get_task_stats(&self) -> TaskStatsSnapshot {
        self.task_manager.get_stats()
    }

    pub fn get_server_info(&self, name: &str) -> Option<ServerInfo> {
        self.resource_manager.get_server_info(name)
    }

    pub fn get_all_server_info(&self) -> Vec<ServerInfo> {
        self.resource_manager.get_all_server_info()
    }

    pub fn get_cluster_summary(&self) -> ClusterSummary {
        self.resource_manager.get_cluster_summary()
    }

    pub fn get_all_results(&self) -> Vec<ExperimentResult> {
        self.result_store.get_all_results()
    }

    pub fn get_result(&self, experiment_id: &str) -> Option<ExperimentResult> {
        self.result_store.get_result(experiment_id)
    }

    pub fn get_result_statistics(&self) -> ResultStatistics {
        self.result_store.get_result_statistics()
    }

    pub fn search_results(&self, query: &str) -> Vec<ExperimentResult> {
        self.result_store.search_results(query)
    }

    pub fn compare_results(&self, experiment_ids: &[String]) -> ComparisonReport {
        self.result_store.compare_results(experiment_ids)
    }

    pub fn cleanup_old_results(&self) -> usize {
        self.result_store.cleanup_old_results(self.config.result_retention_days)
    }

    pub fn export_results(
        &self,
        path: &std::path::Path,
        experiment_ids: Option<&[String]>,
        format: ExportFormat,
    ) -> std::io::Result<()> {
        self.result_store.export_results(path, experiment_ids, format)
    }

    pub async fn health_check(&self) -> HashMap<String, bool> {
        self.resource_manager.health_check().await
    }

    pub fn set_allocation_strategy(&self, name: &str) {
        self.resource_manager.set_allocation_strategy(name);
    }

    pub fn get_framework_config(&self) -> &FrameworkConfig {
        &self.config
    }

    pub fn get_framework_info(&self) -> FrameworkInfo {
        let uptime_secs = self.start_time.lock().unwrap().map(|t| (Utc::now() - t).num_seconds());
        FrameworkInfo {
            name: "labgrid".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            running: self.is_running(),
            uptime_secs,
            server_count: self.servers.len(),
            registered_experiment_count: self.registry.lock().unwrap().get_registered_count(),
            worker_count: self.config.worker_count(self.servers.len()),
        }
    }

    async fn worker_loop(self: Arc<Self>, worker_id: u32, cancel: CancellationToken) {
        info!(worker_id, "worker started");
        loop {
            // Picks up any pending task whose dependencies just completed
            // (or that lost the allocation race last tick) before trying
            // to dequeue, so it becomes eligible within this tick.
            self.task_manager.resubmit_ready_tasks();
            match self.task_manager.get_next_task() {
                Some(task) => self.execute_task(task).await,
                None => {
                    if cancel.is_cancelled() {
                        break;
                    }
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                    }
                }
            }
        }
        info!(worker_id, "worker stopped");
    }

    async fn execute_task(&self, task: Task) {
        let Some(host) = self.resource_manager.allocate_server(task.priority).await else {
            // No host available right now -- not an error. The task is
            // still `pending` (start_task hasn't run yet), so put it back
            // on the queue intact, with no retry consumed, rather than
            // failing it for losing the allocation race. The short sleep
            // keeps a saturated cluster from spinning workers hot against
            // an always-empty allocation pool.
            self.task_manager.submit_task(&task.task_id);
            tokio::time::sleep(Duration::from_millis(200)).await;
            return;
        };

        if !self.task_manager.start_task(&task.task_id, &host) {
            self.resource_manager.release_server(&host);
            return;
        }

        let instance = {
            let registry = self.registry.lock().unwrap();
            registry.create_experiment(&task.experiment_type, task.config.clone(), Arc::clone(&self.remote))
        };

        let Some(mut experiment) = instance else {
            self.task_manager.fail_task(&task.task_id, "cannot create experiment instance");
            self.resource_manager.release_server(&host);
            return;
        };
        experiment.assign_host(&host);

        let timeout = Duration::from_secs(task.config.timeout_secs);
        let result = match tokio::time::timeout(
            timeout,
            crate::lifecycle::run(experiment.as_mut(), self.remote.as_ref()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                let mut result = experiment.result().clone();
                result.status = ExperimentStatus::Failed;
                result.error_message = Some("experiment timed out".to_string());
                result.end_time = Some(Utc::now());
                result
            }
        };

        self.result_store.store_result(result.clone());

        if result.status == ExperimentStatus::Completed {
            self.task_manager.complete_task(&task.task_id, result);
        } else {
            let message = result.error_message.clone().unwrap_or_else(|| "experiment execution failed".to_string());
            self.task_manager.fail_task(&task.task_id, message);
        }

        experiment.release_host();
        self.resource_manager.release_server(&host);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Experiment;
    use crate::remote::mock::MockRemoteCapability;
    use async_trait::async_trait;
    use labgrid_types::ParamMap;
    use std::sync::atomic::AtomicU32;

    struct InMemoryResultStore {
        results: Mutex<HashMap<String, ExperimentResult>>,
    }

    impl InMemoryResultStore {
        fn new() -> Self {
            Self { results: Mutex::new(HashMap::new()) }
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
        fn search_results(&self, _query: &str) -> Vec<ExperimentResult> {
            Vec::new()
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

    struct NoopExperiment {
        config: ExperimentConfig,
        result: ExperimentResult,
        assigned_host: Option<String>,
        should_fail: bool,
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
            true
        }
        async fn execute(&mut self) -> bool {
            !self.should_fail
        }
        async fn collect_data(&mut self) -> bool {
            true
        }
        async fn analyze_data(&mut self) -> ParamMap {
            let mut m = ParamMap::new();
            m.insert("ok".to_string(), serde_json::json!(1));
            m
        }
        async fn save_data(&mut self) -> bool {
            true
        }
    }

    fn noop_ctor(should_fail: bool) -> crate::registry::ExperimentConstructor {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        Box::new(move |config, _remote| {
            let id = COUNTER.fetch_add(1, Ordering::SeqCst);
            let result = ExperimentResult::new(format!("exp_test_{id}"), config.output_dir.clone());
            Box::new(NoopExperiment { config, result, assigned_host: None, should_fail })
        })
    }

    fn servers_one_host() -> ServersFile {
        servers_one_host_with_capacity(2)
    }

    fn servers_one_host_with_capacity(max_concurrent_tasks: u32) -> ServersFile {
        let mut servers = ServersFile::new();
        servers.insert(
            "h1".to_string(),
            labgrid_types::ServerConfig {
                host: "10.0.0.1".to_string(),
                user: "root".to_string(),
                port: 22,
                password: Some("x".to_string()),
                key_filename: None,
                max_concurrent_tasks,
                description: None,
            },
        );
        servers
    }

    fn make_framework(should_fail: bool) -> Arc<Framework> {
        make_framework_with(servers_one_host(), should_fail, 1)
    }

    fn make_framework_with(servers: ServersFile, should_fail: bool, max_worker_threads: u32) -> Arc<Framework> {
        let mut config = FrameworkConfig::default();
        config.enable_monitoring = false;
        config.max_worker_threads = max_worker_threads;
        config.max_workers_per_server = max_worker_threads;
        let remote = Arc::new(MockRemoteCapability::new());
        let store = Arc::new(InMemoryResultStore::new());
        let framework = Arc::new(Framework::new(servers, config, remote, store));
        framework.register_experiment("noop", noop_ctor(should_fail), "test", vec![]);
        framework
    }

    /// The resource manager starts every configured host offline until a
    /// heartbeat lands; tests that don't run the monitoring loop seed one
    /// directly so allocation succeeds.
    async fn seed_heartbeat(framework: &Framework) {
        framework.resource_manager.collect_resource_metrics().await;
    }

    #[tokio::test]
    async fn run_experiment_before_start_is_rejected() {
        let framework = make_framework(false);
        let config = ExperimentConfig::new("noop", "out");
        assert!(matches!(framework.run_experiment(config), Err(FrameworkError::NotStarted)));
    }

    #[tokio::test]
    async fn unregistered_type_is_rejected() {
        let framework = make_framework(false);
        framework.start();
        let config = ExperimentConfig::new("missing", "out");
        assert!(matches!(framework.run_experiment(config), Err(FrameworkError::TypeUnknown(_))));
        framework.stop().await;
    }

    #[tokio::test]
    async fn single_task_happy_path() {
        let framework = make_framework(false);
        seed_heartbeat(&framework).await;
        framework.start();
        let config = ExperimentConfig::new("noop", "out");
        let task_id = framework.run_experiment(config).unwrap();
        assert!(framework.wait_for_experiment(&task_id, Duration::from_secs(2)).await);
        let result = framework.get_experiment_result(&task_id).unwrap();
        assert_eq!(result.status, ExperimentStatus::Completed);
        framework.stop().await;
    }

    #[tokio::test]
    async fn losing_the_allocation_race_does_not_fail_the_task() {
        // Two workers, one host with room for a single concurrent task:
        // whichever worker loses the race for the slot must put its task
        // back on the queue instead of failing it outright.
        let framework = make_framework_with(servers_one_host_with_capacity(1), false, 2);
        seed_heartbeat(&framework).await;
        framework.start();

        let first = framework.run_experiment(ExperimentConfig::new("noop", "out")).unwrap();
        let second = framework.run_experiment(ExperimentConfig::new("noop", "out")).unwrap();

        assert!(framework.wait_for_experiment(&first, Duration::from_secs(2)).await);
        assert!(framework.wait_for_experiment(&second, Duration::from_secs(2)).await);
        assert_eq!(framework.get_experiment_status(&first), Some(TaskStatus::Completed));
        assert_eq!(framework.get_experiment_status(&second), Some(TaskStatus::Completed));
        framework.stop().await;
    }

    #[tokio::test]
    async fn dependent_task_runs_once_its_dependency_completes() {
        let framework = make_framework(false);
        seed_heartbeat(&framework).await;
        framework.start();

        let parent = framework.run_experiment(ExperimentConfig::new("noop", "out")).unwrap();
        let mut child_config = ExperimentConfig::new("noop", "out");
        child_config.dependencies = vec![parent.clone()];
        let child = framework.run_experiment(child_config).unwrap();

        assert!(framework.wait_for_experiment(&child, Duration::from_secs(2)).await);
        assert_eq!(framework.get_experiment_status(&parent), Some(TaskStatus::Completed));
        assert_eq!(framework.get_experiment_status(&child), Some(TaskStatus::Completed));
        framework.stop().await;
    }

    #[tokio::test]
    async fn failing_experiment_without_retries_fails_the_task() {
        let framework = make_framework(true);
        seed_heartbeat(&framework).await;
        framework.start();
        let config = ExperimentConfig::new("noop", "out");
        let task_id = framework.run_experiment(config).unwrap();
        assert!(framework.wait_for_experiment(&task_id, Duration::from_secs(2)).await);
        assert_eq!(framework.get_experiment_status(&task_id), Some(TaskStatus::Failed));
        framework.stop().await;
    }
}
