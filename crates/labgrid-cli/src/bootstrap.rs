//! Wires a servers file and framework config into a running [`Framework`].

use std::sync::Arc;

use anyhow::Result;
use labgrid_core::remote::mock::MockRemoteCapability;
use labgrid_core::Framework;
use labgrid_store::FileResultManager;

use crate::config::{results_dir, ResolvedConfig};
use crate::sample_experiments::network_probe_constructor;

/// Builds and starts a [`Framework`] backed by the on-disk result store and
/// a deterministic remote capability.
///
/// Real SSH/SFTP transport is out of scope for this engine; the CLI uses
/// the same in-process mock the core crate tests against, so `labgrid run`
/// is runnable without provisioning real hosts.
pub fn build_framework(servers_path: &str, config_path: Option<&str>) -> Result<Arc<Framework>> {
    let resolved = ResolvedConfig::load(servers_path, config_path)?;
    let remote = Arc::new(MockRemoteCapability::new());
    let result_store = Arc::new(FileResultManager::new(results_dir(), resolved.framework.result_retention_days)?);
    let framework = Arc::new(Framework::new(resolved.servers, resolved.framework, remote, result_store));
    framework.register_experiment("network_probe", network_probe_constructor(), "example network diagnostic probe", vec!["network".to_string(), "example".to_string()]);
    framework.start();
    Ok(framework)
}
