//! Resource manager: host inventory, allocation policy, and health monitoring.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use labgrid_types::{HostStatus, ResourceMetricsSample, ServerInfo, ServersFile};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::remote::RemoteCapability;

const HEARTBEAT_STALE_AFTER: chrono::Duration = chrono::Duration::minutes(5);
const HISTORY_WINDOW: chrono::Duration = chrono::Duration::hours(24);
const DEFAULT_MONITORING_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationStrategy {
    RoundRobin,
    LeastLoaded,
    PriorityBased,
}

impl AllocationStrategy {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "round_robin" => Some(Self::RoundRobin),
            "least_loaded" => Some(Self::LeastLoaded),
            "priority_based" => Some(Self::PriorityBased),
            _ => None,
        }
    }
}

/// Aggregate cluster view returned by [`ResourceManager::get_cluster_summary`].
#[derive(Debug, Clone)]
pub struct ClusterSummary {
    pub total_servers: usize,
    pub idle_servers: usize,
    pub busy_servers: usize,
    pub offline_servers: usize,
    pub error_servers: usize,
    pub cluster_load: f64,
}

struct Inner {
    servers: HashMap<String, ServerInfo>,
    history: HashMap<String, VecDeque<ResourceMetricsSample>>,
    strategy: AllocationStrategy,
    round_robin_cursor: usize,
}

pub struct ResourceManager {
    inner: Mutex<Inner>,
    remote: Arc<dyn RemoteCapability>,
    monitoring_interval: Duration,
    cancel: CancellationToken,
}

impl ResourceManager {
    pub fn new(servers: &ServersFile, remote: Arc<dyn RemoteCapability>) -> Self {
        let mut table = HashMap::new();
        for (name, cfg) in servers {
            table.insert(name.clone(), ServerInfo::new(name.clone(), cfg.max_concurrent_tasks));
        }
        Self {
            inner: Mutex::new(Inner {
                servers: table,
                history: HashMap::new(),
                strategy: AllocationStrategy::RoundRobin,
                round_robin_cursor: 0,
            }),
            remote,
            monitoring_interval: DEFAULT_MONITORING_INTERVAL,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_monitoring_interval(mut self, interval: Duration) -> Self {
        self.monitoring_interval = interval;
        self
    }

    /// Selects and reserves a host for a task of the given priority.
    /// Returns `None` if no host is currently available.
    pub async fn allocate_server(&self, task_priority: u32) -> Option<String> {
        let chosen = {
            let mut inner = self.inner.lock().unwrap();
            let available = Self::available_servers(&mut inner);
            if available.is_empty() {
                return None;
            }
            let name = match inner.strategy {
                AllocationStrategy::RoundRobin => Self::round_robin_pick(&mut inner, &available),
                AllocationStrategy::LeastLoaded => Self::least_loaded_pick(&inner, &available),
                AllocationStrategy::PriorityBased => {
                    if task_priority > 5 {
                        Self::least_loaded_pick(&inner, &available)
                    } else {
                        Self::round_robin_pick(&mut inner, &available)
                    }
                }
            };
            if let Some(name) = &name {
                if let Some(server) = inner.servers.get_mut(name) {
                    server.current_tasks += 1;
                    if server.current_tasks >= server.max_tasks {
                        server.status = HostStatus::Busy;
                    }
                }
            }
            name
        };
        if let Some(name) = &chosen {
            let count = self.inner.lock().unwrap().servers.get(name).map(|s| s.current_tasks).unwrap_or(0);
            self.remote.update_server_task_count(name, count).await;
        }
        chosen
    }

    pub fn release_server(&self, name: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(server) = inner.servers.get_mut(name) {
            let was_busy = server.status == HostStatus::Busy;
            server.current_tasks = server.current_tasks.saturating_sub(1);
            if server.current_tasks == 0 || was_busy {
                server.status = HostStatus::Idle;
            }
        }
    }

    /// Excludes offline/error hosts, full-capacity hosts, and hosts whose
    /// heartbeat is stale (marking the latter offline as a side effect).
    fn available_servers(inner: &mut Inner) -> Vec<String> {
        let now = Utc::now();
        let mut stale = Vec::new();
        for (name, server) in inner.servers.iter() {
            if let Some(hb) = server.last_heartbeat {
                if now - hb > HEARTBEAT_STALE_AFTER
                    && !matches!(server.status, HostStatus::Offline | HostStatus::Error)
                {
                    stale.push(name.clone());
                }
            }
        }
        for name in &stale {
            if let Some(server) = inner.servers.get_mut(name) {
                server.status = HostStatus::Offline;
            }
        }
        inner
            .servers
            .values()
            .filter(|s| {
                !matches!(s.status, HostStatus::Offline | HostStatus::Error) && s.current_tasks < s.max_tasks
            })
            .map(|s| s.name.clone())
            .collect()
    }

    fn round_robin_pick(inner: &mut Inner, available: &[String]) -> Option<String> {
        if available.is_empty() {
            return None;
        }
        let mut sorted = available.to_vec();
        sorted.sort();
        let idx = inner.round_robin_cursor % sorted.len();
        inner.round_robin_cursor = inner.round_robin_cursor.wrapping_add(1);
        Some(sorted[idx].clone())
    }

    fn least_loaded_pick(inner: &Inner, available: &[String]) -> Option<String> {
        available
            .iter()
            .filter_map(|name| inner.servers.get(name).map(|s| (name, s.load())))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(name, _)| name.clone())
    }

    /// Sets the allocation policy; unrecognized names fall back to
    /// round-robin and log a warning.
    pub fn set_allocation_strategy(&self, name: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.strategy = AllocationStrategy::parse(name).unwrap_or_else(|| {
            warn!(strategy = name, "unknown allocation strategy, falling back to round_robin");
            AllocationStrategy::RoundRobin
        });
    }

    pub fn get_server_info(&self, name: &str) -> Option<ServerInfo> {
        self.inner.lock().unwrap().servers.get(name).cloned()
    }

    pub fn get_all_server_info(&self) -> Vec<ServerInfo> {
        self.inner.lock().unwrap().servers.values().cloned().collect()
    }

    pub fn is_server_available(&self, name: &str) -> bool {
        let inner = self.inner.lock().unwrap();
        inner
            .servers
            .get(name)
            .map(|s| !matches!(s.status, HostStatus::Offline | HostStatus::Error) && s.current_tasks < s.max_tasks)
            .unwrap_or(false)
    }

    pub fn get_server_load(&self, name: &str) -> Option<f64> {
        self.inner.lock().unwrap().servers.get(name).map(|s| s.load())
    }

    pub fn get_cluster_load(&self) -> f64 {
        let inner = self.inner.lock().unwrap();
        let available: Vec<_> = inner
            .servers
            .values()
            .filter(|s| !matches!(s.status, HostStatus::Offline | HostStatus::Error))
            .collect();
        if available.is_empty() {
            return 0.0;
        }
        available.iter().map(|s| s.load()).sum::<f64>() / available.len() as f64
    }

    pub fn get_cluster_summary(&self) -> ClusterSummary {
        let inner = self.inner.lock().unwrap();
        let mut summary = ClusterSummary {
            total_servers: inner.servers.len(),
            idle_servers: 0,
            busy_servers: 0,
            offline_servers: 0,
            error_servers: 0,
            cluster_load: 0.0,
        };
        for s in inner.servers.values() {
            match s.status {
                HostStatus::Idle => summary.idle_servers += 1,
                HostStatus::Busy => summary.busy_servers += 1,
                HostStatus::Offline => summary.offline_servers += 1,
                HostStatus::Error => summary.error_servers += 1,
            }
        }
        drop(inner);
        summary.cluster_load = self.get_cluster_load();
        summary
    }

    pub fn get_resource_history(&self, name: &str, hours: i64) -> Vec<ResourceMetricsSample> {
        let inner = self.inner.lock().unwrap();
        let cutoff = Utc::now() - chrono::Duration::hours(hours);
        inner
            .history
            .get(name)
            .map(|h| h.iter().filter(|s| s.timestamp >= cutoff).cloned().collect())
            .unwrap_or_default()
    }

    /// Probes connectivity by attempting to connect and run a trivial command.
    pub async fn health_check(&self) -> HashMap<String, bool> {
        let names: Vec<String> = self.inner.lock().unwrap().servers.keys().cloned().collect();
        let mut results = HashMap::new();
        for name in names {
            let ok = self.remote.connect_server(&name).await
                && self.remote.execute_command(&name, "echo ok", Some(5)).await.success;
            results.insert(name, ok);
        }
        results
    }

    /// One probe-and-commit cycle, exposed for the periodic monitor and for tests.
    pub async fn collect_resource_metrics(&self) {
        let names: Vec<String> = self.inner.lock().unwrap().servers.keys().cloned().collect();
        for name in names {
            let info = self.remote.get_system_info(&name).await;
            let mut inner = self.inner.lock().unwrap();
            match info {
                Some(metrics) => {
                    let cpu = metrics.get("cpu_usage").and_then(|v| v.as_f64());
                    let memory = metrics.get("memory_usage").and_then(|v| v.as_f64());
                    let disk = metrics.get("disk_usage").and_then(|v| v.as_f64());
                    let now = Utc::now();
                    if let Some(server) = inner.servers.get_mut(&name) {
                        server.cpu_usage = cpu;
                        server.memory_usage = memory;
                        server.disk_usage = disk;
                        server.last_heartbeat = Some(now);
                        if matches!(server.status, HostStatus::Offline) {
                            server.status = HostStatus::Idle;
                        }
                    }
                    let sample = ResourceMetricsSample {
                        timestamp: now,
                        cpu_usage: cpu,
                        memory_usage: memory,
                        disk_usage: disk,
                        network_in: None,
                        network_out: None,
                        load_average: None,
                    };
                    let history = inner.history.entry(name.clone()).or_default();
                    history.push_back(sample);
                    let cutoff = now - HISTORY_WINDOW;
                    while history.front().map(|s| s.timestamp < cutoff).unwrap_or(false) {
                        history.pop_front();
                    }
                }
                None => {
                    warn!(server = %name, "resource probe missed a heartbeat");
                }
            }
        }
    }

    /// Spawns the periodic monitoring loop. Returns its join handle; drop
    /// the returned [`CancellationToken`] clone or call
    /// [`ResourceManager::stop_monitoring`] to stop it.
    pub fn start_monitoring(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        let cancel = self.cancel.clone();
        let interval = self.monitoring_interval;
        tokio::spawn(async move {
            info!("resource monitoring started");
            // Probe once before the first sleep so hosts (created offline)
            // become allocatable immediately rather than after one full
            // interval.
            this.collect_resource_metrics().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        this.collect_resource_metrics().await;
                    }
                }
            }
            info!("resource monitoring stopped");
        })
    }

    pub fn stop_monitoring(&self) {
        self.cancel.cancel();
    }
}
