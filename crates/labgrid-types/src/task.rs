use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::result::ExperimentResult;
use crate::status::TaskStatus;
use crate::value::ParamMap;

/// Engine-generated task identifier, `task_<created_ms>_<counter>`.
pub type TaskId = String;

/// Caller-supplied descriptor for one experiment submission.
///
/// Immutable after submission. `experiment_type` must name a registered
/// experiment; `output_dir` must be non-empty; `timeout_secs` must be > 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub experiment_type: String,
    pub output_dir: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub priority: u32,
    #[serde(default)]
    pub parameters: ParamMap,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub description: String,
}

fn default_timeout_secs() -> u64 {
    3600
}

impl ExperimentConfig {
    pub fn new(experiment_type: impl Into<String>, output_dir: impl Into<String>) -> Self {
        Self {
            experiment_type: experiment_type.into(),
            output_dir: output_dir.into(),
            timeout_secs: default_timeout_secs(),
            retry_count: 0,
            priority: 0,
            parameters: ParamMap::new(),
            dependencies: Vec::new(),
            tags: Vec::new(),
            description: String::new(),
        }
    }

    /// Checks the structural constraints named in the data model: a
    /// non-empty output directory and a positive timeout. Registration of
    /// `experiment_type` is checked by the registry, not here.
    pub fn validate(&self) -> Result<(), String> {
        if self.output_dir.trim().is_empty() {
            return Err("output_dir must not be empty".to_string());
        }
        if self.timeout_secs == 0 {
            return Err("timeout_secs must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// The engine's internal scheduling unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub experiment_type: String,
    pub config: ExperimentConfig,
    pub created_at: DateTime<Utc>,
    pub status: TaskStatus,
    pub assigned_host: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub progress: f64,
    pub retry_count: u32,
    pub max_retries: u32,
    pub priority: u32,
    pub dependencies: Vec<TaskId>,
    pub error_message: Option<String>,
    pub result: Option<ExperimentResult>,
}

impl Task {
    pub fn new(task_id: TaskId, config: ExperimentConfig, created_at: DateTime<Utc>) -> Self {
        let max_retries = config.retry_count;
        let priority = config.priority;
        let dependencies = config.dependencies.clone();
        let experiment_type = config.experiment_type.clone();
        Self {
            task_id,
            experiment_type,
            config,
            created_at,
            status: TaskStatus::Pending,
            assigned_host: None,
            start_time: None,
            end_time: None,
            progress: 0.0,
            retry_count: 0,
            max_retries,
            priority,
            dependencies,
            error_message: None,
            result: None,
        }
    }

    /// Resets execution-scoped fields so the task can be re-queued after a retry.
    pub fn reset_for_retry(&mut self) {
        self.status = TaskStatus::Pending;
        self.assigned_host = None;
        self.start_time = None;
        self.end_time = None;
        self.error_message = None;
        self.progress = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_rejects_empty_output_dir() {
        let cfg = ExperimentConfig::new("noop", "   ");
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn config_rejects_zero_timeout() {
        let mut cfg = ExperimentConfig::new("noop", "out");
        cfg.timeout_secs = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn config_accepts_defaults() {
        let cfg = ExperimentConfig::new("noop", "out");
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.timeout_secs, 3600);
    }

    #[test]
    fn new_task_starts_pending_with_zero_progress() {
        let cfg = ExperimentConfig::new("noop", "out");
        let task = Task::new("task_1_1".to_string(), cfg, Utc::now());
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.progress, 0.0);
        assert!(task.assigned_host.is_none());
    }

    #[test]
    fn reset_for_retry_clears_execution_fields() {
        let cfg = ExperimentConfig::new("noop", "out");
        let mut task = Task::new("task_1_1".to_string(), cfg, Utc::now());
        task.status = TaskStatus::Running;
        task.assigned_host = Some("h1".to_string());
        task.start_time = Some(Utc::now());
        task.progress = 0.5;
        task.reset_for_retry();
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.assigned_host.is_none());
        assert!(task.start_time.is_none());
        assert_eq!(task.progress, 0.0);
    }
}
