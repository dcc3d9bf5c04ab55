//! Loads and validates the two configuration documents the façade needs:
//! the servers file and the optional framework configuration file.

use std::path::Path;

use labgrid_types::{parse_servers_file, ConfigError, FrameworkConfig, ServersFile};

/// Loads configuration from disk. `framework_config_path` is optional --
/// when absent, [`FrameworkConfig::default`] is used.
pub struct ConfigManager;

impl ConfigManager {
    pub fn load_servers(path: &Path) -> Result<ServersFile, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        parse_servers_file(&contents)
    }

    pub fn load_framework_config(path: Option<&Path>) -> Result<FrameworkConfig, ConfigError> {
        match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path)?;
                FrameworkConfig::from_json(&contents)
            }
            None => Ok(FrameworkConfig::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_servers_from_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            f,
            r#"{{"w1": {{"host": "10.0.0.1", "user": "root", "key_filename": "/id_rsa"}}}}"#
        )
        .unwrap();
        let servers = ConfigManager::load_servers(f.path()).unwrap();
        assert_eq!(servers.len(), 1);
    }

    #[test]
    fn missing_framework_config_uses_defaults() {
        let cfg = ConfigManager::load_framework_config(None).unwrap();
        assert_eq!(cfg.max_worker_threads, 4);
    }
}
