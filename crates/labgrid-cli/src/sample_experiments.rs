//! A runnable example experiment type, registered by `main` so the binary
//! has something to submit out of the box.
//!
//! `network_probe` writes a small config file locally, runs a handful of
//! diagnostic commands on its assigned host, pulls any output back, and
//! reports a few illustrative metrics. It exercises every lifecycle phase
//! without depending on a real network target.

use std::sync::Arc;

use async_trait::async_trait;
use labgrid_core::lifecycle::Experiment;
use labgrid_core::remote::RemoteCapability;
use labgrid_types::{ExperimentConfig, ExperimentResult, ParamMap};

pub struct NetworkProbeExperiment {
    config: ExperimentConfig,
    result: ExperimentResult,
    assigned_host: Option<String>,
    remote: Arc<dyn RemoteCapability>,
}

impl NetworkProbeExperiment {
    pub fn new(config: ExperimentConfig, remote: Arc<dyn RemoteCapability>) -> Self {
        let result = ExperimentResult::new(format!("exp_{}", uuid_like()), config.output_dir.clone());
        Self { config, result, assigned_host: None, remote }
    }
}

/// A short, process-unique-enough id without pulling in a UUID crate for
/// one call site. Not suitable outside this sample experiment.
fn uuid_like() -> String {
    format!("{:x}", std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_nanos())
}

#[async_trait]
impl Experiment for NetworkProbeExperiment {
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
        if !self.ensure_output_dir() {
            self.log("ERROR", "failed to create output directory");
            return false;
        }
        let path = format!("{}/probe_config.txt", self.config.output_dir);
        let contents = format!("experiment_type={}\nparameters={:?}\n", self.config.experiment_type, self.config.parameters);
        match std::fs::write(&path, contents) {
            Ok(()) => {
                self.log("INFO", "wrote probe config");
                true
            }
            Err(e) => {
                self.log("ERROR", &format!("failed to write probe config: {e}"));
                false
            }
        }
    }

    async fn execute(&mut self) -> bool {
        let Some(host) = self.assigned_host.clone() else {
            self.log("ERROR", "no assigned host");
            return false;
        };
        let remote_dir = format!("/tmp/{}", self.result.experiment_id);
        if !self.remote.create_remote_directory(&host, &remote_dir).await {
            self.log("WARN", "failed to create remote directory");
        }
        for cmd in ["echo probe start", "uname -a", "whoami", "echo probe end"] {
            let output = self.remote.execute_command(&host, cmd, None).await;
            if output.success {
                self.log("INFO", &format!("command ok: {cmd}"));
            } else {
                self.log("WARN", &format!("command failed: {cmd}"));
            }
        }
        true
    }

    async fn collect_data(&mut self) -> bool {
        let Some(host) = self.assigned_host.clone() else {
            return false;
        };
        let remote_dir = format!("/tmp/{}", self.result.experiment_id);
        let local_dir = format!("{}/remote_data", self.config.output_dir);
        let downloaded = self.remote.download_directory(&host, &remote_dir, &local_dir).await;
        if downloaded {
            self.result.result_files.push(local_dir);
        }
        self.remote.remove_remote_directory(&host, &remote_dir).await;
        true
    }

    async fn analyze_data(&mut self) -> ParamMap {
        let mut metrics = ParamMap::new();
        metrics.insert("result_file_count".to_string(), serde_json::json!(self.result.result_files.len()));
        metrics.insert("assigned_host".to_string(), serde_json::json!(self.assigned_host.clone().unwrap_or_default()));
        metrics
    }

    async fn save_data(&mut self) -> bool {
        let path = format!("{}/summary.txt", self.config.output_dir);
        std::fs::write(path, format!("status={:?}\n", self.result.status)).is_ok()
    }
}

pub fn network_probe_constructor() -> labgrid_core::registry::ExperimentConstructor {
    Box::new(|config, remote| Box::new(NetworkProbeExperiment::new(config, remote)))
}
