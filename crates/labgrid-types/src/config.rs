use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One entry of the servers configuration file (`§6.2`): a host name mapped
/// to its transport coordinates and capacity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub user: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub key_filename: Option<String>,
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: u32,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_port() -> u16 {
    22
}

fn default_max_concurrent_tasks() -> u32 {
    1
}

impl ServerConfig {
    pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if self.password.is_none() && self.key_filename.is_none() {
            return Err(ConfigError::MissingCredential(name.to_string()));
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort(name.to_string(), self.port));
        }
        if self.max_concurrent_tasks == 0 {
            return Err(ConfigError::InvalidMaxConcurrentTasks(name.to_string()));
        }
        Ok(())
    }
}

/// The servers configuration file: a mapping of host name to [`ServerConfig`].
pub type ServersFile = HashMap<String, ServerConfig>;

/// Parses and validates a servers configuration document, rejecting any
/// entry that violates `§6.2`'s constraints.
pub fn parse_servers_file(contents: &str) -> Result<ServersFile, ConfigError> {
    let servers: ServersFile = serde_json::from_str(contents)?;
    for (name, cfg) in &servers {
        cfg.validate(name)?;
    }
    Ok(servers)
}

/// Tunables for the framework façade's worker pool, queue, and result retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameworkConfig {
    pub max_worker_threads: u32,
    pub max_workers_per_server: u32,
    pub max_total_workers: u32,
    pub experiment_timeout_secs: u64,
    pub task_queue_size: usize,
    pub log_level: String,
    pub log_dir: String,
    pub result_retention_days: u32,
    pub enable_monitoring: bool,
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self {
            max_worker_threads: 4,
            max_workers_per_server: 2,
            max_total_workers: 16,
            experiment_timeout_secs: 86_400 * 7,
            task_queue_size: 1000,
            log_level: "INFO".to_string(),
            log_dir: "logs".to_string(),
            result_retention_days: 30,
            enable_monitoring: true,
        }
    }
}

impl FrameworkConfig {
    /// Parses a framework configuration document. Unknown keys are ignored
    /// by `serde`'s default struct handling; missing keys fall back to
    /// [`FrameworkConfig::default`].
    pub fn from_json(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(contents)?)
    }

    /// The worker count the façade should launch: bounded by the
    /// configured maximum, by host capacity, and by the absolute cap.
    pub fn worker_count(&self, server_count: usize) -> u32 {
        let by_servers = (server_count as u32).saturating_mul(self.max_workers_per_server);
        self.max_worker_threads.min(by_servers).min(self.max_total_workers).max(1)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("server '{0}' needs a password or a key_filename")]
    MissingCredential(String),
    #[error("server '{0}' has invalid port {1}")]
    InvalidPort(String, u16),
    #[error("server '{0}' must allow at least one concurrent task")]
    InvalidMaxConcurrentTasks(String),
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_requires_a_credential() {
        let cfg = ServerConfig {
            host: "10.0.0.1".to_string(),
            user: "root".to_string(),
            port: 22,
            password: None,
            key_filename: None,
            max_concurrent_tasks: 1,
            description: None,
        };
        assert!(matches!(cfg.validate("h1"), Err(ConfigError::MissingCredential(_))));
    }

    #[test]
    fn parses_servers_file() {
        let json = r#"{
            "worker-1": {"host": "10.0.0.1", "user": "root", "key_filename": "/id_rsa"}
        }"#;
        let servers = parse_servers_file(json).unwrap();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers["worker-1"].port, 22);
        assert_eq!(servers["worker-1"].max_concurrent_tasks, 1);
    }

    #[test]
    fn parse_servers_file_rejects_missing_credential() {
        let json = r#"{"worker-1": {"host": "10.0.0.1", "user": "root"}}"#;
        assert!(parse_servers_file(json).is_err());
    }

    #[test]
    fn framework_config_defaults() {
        let cfg = FrameworkConfig::from_json("{}").unwrap();
        assert_eq!(cfg.max_worker_threads, 4);
        assert_eq!(cfg.result_retention_days, 30);
    }

    #[test]
    fn worker_count_is_bounded_by_all_three_caps() {
        let mut cfg = FrameworkConfig::default();
        cfg.max_worker_threads = 10;
        cfg.max_workers_per_server = 1;
        cfg.max_total_workers = 3;
        assert_eq!(cfg.worker_count(2), 2); // bounded by servers*per_server
        assert_eq!(cfg.worker_count(100), 3); // bounded by absolute cap
    }
}
