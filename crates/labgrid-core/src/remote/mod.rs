//! The remote capability surface -- the abstract interface through which
//! the lifecycle runner and resource manager touch a remote host.
//!
//! Implementations back this with SSH/SFTP or any equivalent transport;
//! this crate only specifies the trait and, for tests, a deterministic
//! in-process double (see [`mock`]).

pub mod mock;

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

/// Outcome of [`RemoteCapability::execute_command`].
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Abstract access to a remote worker host.
///
/// # Object Safety
///
/// Every method returns a concrete, owned type, so the trait can be stored
/// as `Arc<dyn RemoteCapability>` and shared across the worker pool.
///
/// All operations are expected to be blocking from the caller's
/// perspective and to never panic on an ordinary remote failure -- they
/// report failure through their return value (a `bool`, an `Option`, or
/// `CommandOutput::success`), not through an `Err` that aborts the phase.
#[async_trait]
pub trait RemoteCapability: Send + Sync {
    /// Establish a session with `host`, if the implementation pools connections.
    async fn connect_server(&self, host: &str) -> bool;

    /// Tear down any session held for `host`.
    async fn disconnect_server(&self, host: &str);

    async fn execute_command(
        &self,
        host: &str,
        command: &str,
        timeout_secs: Option<u64>,
    ) -> CommandOutput;

    async fn upload_file(&self, host: &str, local_path: &str, remote_path: &str) -> bool;
    async fn upload_directory(&self, host: &str, local_dir: &str, remote_dir: &str) -> bool;
    async fn download_file(&self, host: &str, remote_path: &str, local_path: &str) -> bool;
    async fn download_directory(&self, host: &str, remote_dir: &str, local_dir: &str) -> bool;
    async fn sync_directory(&self, host: &str, remote_dir: &str, local_dir: &str) -> bool;

    /// Probe CPU/memory/disk/load. Returns `None` if the host did not
    /// respond (e.g. unreachable); the resource manager treats that as a
    /// missed heartbeat rather than an error.
    async fn get_system_info(&self, host: &str) -> Option<HashMap<String, Value>>;

    async fn create_remote_directory(&self, host: &str, path: &str) -> bool;
    async fn remove_remote_file(&self, host: &str, path: &str) -> bool;
    async fn remove_remote_directory(&self, host: &str, path: &str) -> bool;
    async fn check_file_exists(&self, host: &str, path: &str) -> bool;
    async fn check_directory_exists(&self, host: &str, path: &str) -> bool;
    async fn get_remote_file_size(&self, host: &str, path: &str) -> Option<u64>;
    async fn list_remote_directory(&self, host: &str, path: &str) -> Option<Vec<String>>;

    /// The capability's own view of reachability, independent of the
    /// resource manager's `Host.status` (the two converge through the
    /// monitoring loop but may diverge transiently while a probe is in flight).
    async fn get_server_status(&self, host: &str) -> Option<bool>;
    async fn get_all_server_status(&self) -> HashMap<String, bool>;

    /// Hint used by the resource manager to keep the capability's own
    /// bookkeeping (e.g. connection pool sizing) aligned with allocations.
    async fn update_server_task_count(&self, host: &str, count: u32);

    /// Release all sessions. Called once, at framework shutdown.
    async fn close(&self);
}

const _: () = {
    fn _assert_object_safe(_: &dyn RemoteCapability) {}
};
