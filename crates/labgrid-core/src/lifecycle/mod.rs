//! The `Experiment` trait and the six-phase lifecycle driver.
//!
//! Concrete experiments implement [`Experiment`]; [`run`] drives an
//! instance through the phase sequence and produces the terminal
//! [`ExperimentResult`]. The trait is intentionally object-safe so
//! instances can be stored as `Box<dyn Experiment>` by the registry.

use async_trait::async_trait;
use chrono::Utc;
use labgrid_types::{ExperimentConfig, ExperimentResult, ExperimentStatus, ParamMap};
use tracing::warn;

use crate::remote::RemoteCapability;

/// Adapter interface for one kind of network experiment.
///
/// # Object Safety
///
/// Every abstract method returns a concrete, owned type (`bool` or a
/// [`ParamMap`]), so the trait can be stored as `Box<dyn Experiment>` in
/// the [`crate::registry::ExperimentRegistry`].
#[async_trait]
pub trait Experiment: Send + Sync {
    fn config(&self) -> &ExperimentConfig;
    fn result(&self) -> &ExperimentResult;
    fn result_mut(&mut self) -> &mut ExperimentResult;

    fn assigned_host(&self) -> Option<&str>;
    fn set_assigned_host(&mut self, host: Option<String>);

    /// Prepare output directory and any required local inputs.
    async fn initialize(&mut self) -> bool;
    /// Interact with the assigned host to run the experiment.
    async fn execute(&mut self) -> bool;
    /// Pull back artifacts produced on the host.
    async fn collect_data(&mut self) -> bool;
    /// Compute metrics. Never fails -- an empty map is a valid answer.
    async fn analyze_data(&mut self) -> ParamMap;
    /// Persist summary/result files locally. Failure here is non-fatal.
    async fn save_data(&mut self) -> bool;
    /// Best-effort teardown. Default is a no-op.
    async fn cleanup(&mut self) {}

    fn assign_host(&mut self, host: &str) {
        self.set_assigned_host(Some(host.to_string()));
    }

    fn release_host(&mut self) {
        self.set_assigned_host(None);
    }

    fn ensure_output_dir(&self) -> bool {
        std::fs::create_dir_all(&self.config().output_dir).is_ok()
    }

    /// Appends a timestamped, phase-tagged line to the result's log and
    /// emits a matching `tracing` event.
    fn log(&mut self, level: &str, message: &str) {
        let line = format!("[{}] {}", level, message);
        tracing::event!(
            target: "labgrid_core::lifecycle",
            tracing::Level::INFO,
            experiment_id = %self.result().experiment_id,
            "{message}"
        );
        self.result_mut().logs.push(line);
    }
}

const _: () = {
    fn _assert_object_safe(_: &dyn Experiment) {}
};

/// Drives `experiment` through initialize -> execute -> collect-data ->
/// analyze-data -> save-data -> cleanup, mutating its result in place and
/// returning the terminal value.
///
/// A phase returning `false` (or panicking -- caught by the caller via
/// `AssertUnwindSafe`, see [`crate::framework`]) moves the experiment
/// directly to `failed` with an error message naming the phase; `cleanup`
/// still runs on every path that reaches it. `save_data` returning `false`
/// is logged but does not fail the experiment.
pub async fn run(experiment: &mut dyn Experiment, remote: &dyn RemoteCapability) -> ExperimentResult {
    let start = Utc::now();
    experiment.result_mut().start_time = Some(start);
    experiment.result_mut().status = ExperimentStatus::Initializing;

    if !experiment.initialize().await {
        return fail(experiment, start, "initialization failed").await;
    }

    experiment.result_mut().status = ExperimentStatus::Running;
    if !experiment.execute().await {
        return fail(experiment, start, "execution failed").await;
    }

    experiment.result_mut().status = ExperimentStatus::Collecting;
    if !experiment.collect_data().await {
        return fail(experiment, start, "data collection failed").await;
    }

    experiment.result_mut().status = ExperimentStatus::Analyzing;
    let metrics = experiment.analyze_data().await;
    experiment.result_mut().metrics = metrics;

    experiment.result_mut().status = ExperimentStatus::Saving;
    if !experiment.save_data().await {
        warn!(
            experiment_id = %experiment.result().experiment_id,
            "data saving failed, but the experiment continues"
        );
        experiment.log("WARN", "data saving failed, but the experiment continues");
    }

    experiment.result_mut().status = ExperimentStatus::Cleaning;
    experiment.cleanup().await;

    let _ = remote; // kept in the signature for symmetry with phases that need it via experiment state

    let end = Utc::now();
    let result = experiment.result_mut();
    result.status = ExperimentStatus::Completed;
    result.end_time = Some(end);
    result.duration_secs = Some((end - start).num_milliseconds() as f64 / 1000.0);
    result.clone()
}

async fn fail(experiment: &mut dyn Experiment, start: chrono::DateTime<Utc>, message: &str) -> ExperimentResult {
    experiment.result_mut().status = ExperimentStatus::Cleaning;
    experiment.cleanup().await;

    let end = Utc::now();
    let result = experiment.result_mut();
    result.status = ExperimentStatus::Failed;
    result.error_message.get_or_insert_with(|| message.to_string());
    result.end_time = Some(end);
    result.duration_secs = Some((end - start).num_milliseconds() as f64 / 1000.0);
    result.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::mock::MockRemoteCapability;
    use std::collections::HashMap;

    struct ScriptedExperiment {
        config: ExperimentConfig,
        result: ExperimentResult,
        assigned_host: Option<String>,
        fail_at: Option<&'static str>,
        save_ok: bool,
    }

    impl ScriptedExperiment {
        fn new(fail_at: Option<&'static str>, save_ok: bool) -> Self {
            let config = ExperimentConfig::new("scripted", "/tmp/out");
            let result = ExperimentResult::new("exp_test", config.output_dir.clone());
            Self { config, result, assigned_host: None, fail_at, save_ok }
        }
    }

    #[async_trait]
    impl Experiment for ScriptedExperiment {
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
            self.fail_at != Some("initialize")
        }

        async fn execute(&mut self) -> bool {
            self.fail_at != Some("execute")
        }

        async fn collect_data(&mut self) -> bool {
            self.fail_at != Some("collect_data")
        }

        async fn analyze_data(&mut self) -> ParamMap {
            let mut m = HashMap::new();
            m.insert("ok".to_string(), serde_json::json!(1));
            m
        }

        async fn save_data(&mut self) -> bool {
            self.save_ok
        }
    }

    #[tokio::test]
    async fn happy_path_completes_with_metrics() {
        let mut exp = ScriptedExperiment::new(None, true);
        let remote = MockRemoteCapability::new();
        let result = run(&mut exp, &remote).await;
        assert_eq!(result.status, ExperimentStatus::Completed);
        assert_eq!(result.metrics.get("ok"), Some(&serde_json::json!(1)));
        assert!(result.error_message.is_none());
    }

    #[tokio::test]
    async fn execute_failure_short_circuits_before_analyze() {
        let mut exp = ScriptedExperiment::new(Some("execute"), true);
        let remote = MockRemoteCapability::new();
        let result = run(&mut exp, &remote).await;
        assert_eq!(result.status, ExperimentStatus::Failed);
        assert_eq!(result.error_message.as_deref(), Some("execution failed"));
        assert!(result.metrics.is_empty());
    }

    #[tokio::test]
    async fn save_data_failure_is_non_fatal() {
        let mut exp = ScriptedExperiment::new(None, false);
        let remote = MockRemoteCapability::new();
        let result = run(&mut exp, &remote).await;
        assert_eq!(result.status, ExperimentStatus::Completed);
        assert!(result.logs.iter().any(|l| l.contains("data saving failed")));
    }

    #[tokio::test]
    async fn cleanup_runs_on_failure_path() {
        // collect_data fails; cleanup still sets status through `Cleaning`
        // on its way to `Failed` -- observable indirectly via end_time being set.
        let mut exp = ScriptedExperiment::new(Some("collect_data"), true);
        let remote = MockRemoteCapability::new();
        let result = run(&mut exp, &remote).await;
        assert_eq!(result.status, ExperimentStatus::Failed);
        assert!(result.end_time.is_some());
    }
}
