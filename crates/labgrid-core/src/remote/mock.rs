//! A deterministic, in-process [`RemoteCapability`] used by tests in this
//! crate and re-exported (via `labgrid-test-utils`) to `labgrid-store` and
//! `labgrid-cli` tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::{CommandOutput, RemoteCapability};

/// Every host known to a [`MockRemoteCapability`] always reports success
/// unless explicitly put on its `unreachable` list.
pub struct MockRemoteCapability {
    unreachable: Mutex<Vec<String>>,
    task_counts: Mutex<HashMap<String, u32>>,
}

impl MockRemoteCapability {
    pub fn new() -> Self {
        Self {
            unreachable: Mutex::new(Vec::new()),
            task_counts: Mutex::new(HashMap::new()),
        }
    }

    /// Mark `host` as unreachable: probes return `None`/`false` as if the
    /// transport timed out.
    pub fn mark_unreachable(&self, host: &str) {
        self.unreachable.lock().unwrap().push(host.to_string());
    }

    fn is_reachable(&self, host: &str) -> bool {
        !self.unreachable.lock().unwrap().iter().any(|h| h == host)
    }
}

impl Default for MockRemoteCapability {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteCapability for MockRemoteCapability {
    async fn connect_server(&self, host: &str) -> bool {
        self.is_reachable(host)
    }

    async fn disconnect_server(&self, _host: &str) {}

    async fn execute_command(
        &self,
        host: &str,
        _command: &str,
        _timeout_secs: Option<u64>,
    ) -> CommandOutput {
        if self.is_reachable(host) {
            CommandOutput {
                success: true,
                stdout: String::new(),
                stderr: String::new(),
                exit_code: 0,
            }
        } else {
            CommandOutput {
                success: false,
                stdout: String::new(),
                stderr: "host unreachable".to_string(),
                exit_code: -1,
            }
        }
    }

    async fn upload_file(&self, host: &str, _local_path: &str, _remote_path: &str) -> bool {
        self.is_reachable(host)
    }

    async fn upload_directory(&self, host: &str, _local_dir: &str, _remote_dir: &str) -> bool {
        self.is_reachable(host)
    }

    async fn download_file(&self, host: &str, _remote_path: &str, _local_path: &str) -> bool {
        self.is_reachable(host)
    }

    async fn download_directory(&self, host: &str, _remote_dir: &str, _local_dir: &str) -> bool {
        self.is_reachable(host)
    }

    async fn sync_directory(&self, host: &str, _remote_dir: &str, _local_dir: &str) -> bool {
        self.is_reachable(host)
    }

    async fn get_system_info(&self, host: &str) -> Option<HashMap<String, Value>> {
        if !self.is_reachable(host) {
            return None;
        }
        let mut info = HashMap::new();
        info.insert("cpu_usage".to_string(), Value::from(0.1));
        info.insert("memory_usage".to_string(), Value::from(0.2));
        info.insert("disk_usage".to_string(), Value::from(0.3));
        Some(info)
    }

    async fn create_remote_directory(&self, host: &str, _path: &str) -> bool {
        self.is_reachable(host)
    }

    async fn remove_remote_file(&self, host: &str, _path: &str) -> bool {
        self.is_reachable(host)
    }

    async fn remove_remote_directory(&self, host: &str, _path: &str) -> bool {
        self.is_reachable(host)
    }

    async fn check_file_exists(&self, host: &str, _path: &str) -> bool {
        self.is_reachable(host)
    }

    async fn check_directory_exists(&self, host: &str, _path: &str) -> bool {
        self.is_reachable(host)
    }

    async fn get_remote_file_size(&self, host: &str, _path: &str) -> Option<u64> {
        self.is_reachable(host).then_some(0)
    }

    async fn list_remote_directory(&self, host: &str, _path: &str) -> Option<Vec<String>> {
        self.is_reachable(host).then(Vec::new)
    }

    async fn get_server_status(&self, host: &str) -> Option<bool> {
        Some(self.is_reachable(host))
    }

    async fn get_all_server_status(&self) -> HashMap<String, bool> {
        self.task_counts
            .lock()
            .unwrap()
            .keys()
            .map(|h| (h.clone(), self.is_reachable(h)))
            .collect()
    }

    async fn update_server_task_count(&self, host: &str, count: u32) {
        self.task_counts.lock().unwrap().insert(host.to_string(), count);
    }

    async fn close(&self) {}
}
