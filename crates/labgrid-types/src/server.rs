use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Observed availability of a remote host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostStatus {
    Idle,
    Busy,
    Offline,
    Error,
}

impl fmt::Display for HostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HostStatus::Idle => "idle",
            HostStatus::Busy => "busy",
            HostStatus::Offline => "offline",
            HostStatus::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostStatusParseError(pub String);

impl fmt::Display for HostStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid host status: {}", self.0)
    }
}

impl std::error::Error for HostStatusParseError {}

impl FromStr for HostStatus {
    type Err = HostStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(HostStatus::Idle),
            "busy" => Ok(HostStatus::Busy),
            "offline" => Ok(HostStatus::Offline),
            "error" => Ok(HostStatus::Error),
            other => Err(HostStatusParseError(other.to_string())),
        }
    }
}

/// The resource manager's live view of one configured host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub status: HostStatus,
    pub current_tasks: u32,
    pub max_tasks: u32,
    pub cpu_usage: Option<f64>,
    pub memory_usage: Option<f64>,
    pub disk_usage: Option<f64>,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl ServerInfo {
    pub fn new(name: impl Into<String>, max_tasks: u32) -> Self {
        Self {
            name: name.into(),
            status: HostStatus::Offline,
            current_tasks: 0,
            max_tasks,
            cpu_usage: None,
            memory_usage: None,
            disk_usage: None,
            last_heartbeat: None,
        }
    }

    /// `0.7 * task_load + 0.3 * max(cpu, memory)`, both terms normalized to `[0, 1]`.
    pub fn load(&self) -> f64 {
        let task_load = if self.max_tasks == 0 {
            0.0
        } else {
            self.current_tasks as f64 / self.max_tasks as f64
        };
        let resource_load = self
            .cpu_usage
            .unwrap_or(0.0)
            .max(self.memory_usage.unwrap_or(0.0));
        0.7 * task_load + 0.3 * resource_load
    }
}

/// One point in a host's rolling resource-usage history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceMetricsSample {
    pub timestamp: DateTime<Utc>,
    pub cpu_usage: Option<f64>,
    pub memory_usage: Option<f64>,
    pub disk_usage: Option<f64>,
    pub network_in: Option<f64>,
    pub network_out: Option<f64>,
    pub load_average: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_status_display_roundtrip() {
        for s in [HostStatus::Idle, HostStatus::Busy, HostStatus::Offline, HostStatus::Error] {
            assert_eq!(s.to_string().parse::<HostStatus>().unwrap(), s);
        }
    }

    #[test]
    fn host_status_invalid() {
        assert!("bogus".parse::<HostStatus>().is_err());
    }

    #[test]
    fn load_weights_task_and_resource_usage() {
        let mut s = ServerInfo::new("h1", 4);
        s.current_tasks = 2;
        s.cpu_usage = Some(0.5);
        s.memory_usage = Some(0.2);
        // task_load = 0.5, resource = max(0.5, 0.2) = 0.5
        assert!((s.load() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn load_is_zero_for_idle_empty_host() {
        let s = ServerInfo::new("h1", 4);
        assert_eq!(s.load(), 0.0);
    }
}
