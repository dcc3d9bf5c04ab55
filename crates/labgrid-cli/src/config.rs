//! Servers file and framework config loading, plus the result-store directory.

use std::path::PathBuf;

use anyhow::{Context, Result};
use labgrid_core::ConfigManager;
use labgrid_types::{FrameworkConfig, ServersFile};

/// Data directory for persisted results: `$XDG_DATA_HOME/labgrid` or
/// `~/.local/share/labgrid`. We ignore `dirs::data_dir()` (which points at
/// `~/Library/Application Support` on macOS) to keep one layout everywhere.
pub fn data_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg).join("labgrid");
    }
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".local/share/labgrid")
}

pub fn results_dir() -> PathBuf {
    data_dir().join("results")
}

pub struct ResolvedConfig {
    pub servers: ServersFile,
    pub framework: FrameworkConfig,
}

impl ResolvedConfig {
    pub fn load(servers_path: &str, config_path: Option<&str>) -> Result<Self> {
        let servers = ConfigManager::load_servers(std::path::Path::new(servers_path))
            .with_context(|| format!("failed to load servers file at {servers_path}"))?;
        let framework = ConfigManager::load_framework_config(config_path.map(std::path::Path::new))
            .context("failed to load framework config")?;
        Ok(Self { servers, framework })
    }
}
