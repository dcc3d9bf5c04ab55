use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::ExperimentStatus;
use crate::value::ParamMap;

/// The outcome record produced by one run of the lifecycle.
///
/// Created when the lifecycle begins (`experiment_id` is generated then,
/// distinct from the owning task's id), mutated only by the lifecycle
/// runner, and handed to the result manager once terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentResult {
    pub experiment_id: String,
    pub status: ExperimentStatus,
    pub output_dir: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_secs: Option<f64>,
    #[serde(default)]
    pub result_files: Vec<String>,
    #[serde(default)]
    pub metrics: ParamMap,
    pub error_message: Option<String>,
    #[serde(default)]
    pub logs: Vec<String>,
}

impl ExperimentResult {
    pub fn new(experiment_id: impl Into<String>, output_dir: impl Into<String>) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            status: ExperimentStatus::Pending,
            output_dir: output_dir.into(),
            start_time: None,
            end_time: None,
            duration_secs: None,
            result_files: Vec::new(),
            metrics: ParamMap::new(),
            error_message: None,
            logs: Vec::new(),
        }
    }
}
