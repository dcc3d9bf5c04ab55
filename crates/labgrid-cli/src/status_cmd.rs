//! `labgrid status` command: cluster/queue summary, or one task's status.

use anyhow::Result;

use crate::bootstrap::build_framework;

pub async fn run_status(servers_path: &str, config_path: Option<&str>, task_id: Option<&str>) -> Result<()> {
    let framework = build_framework(servers_path, config_path)?;

    match task_id {
        Some(task_id) => match framework.get_experiment_status(task_id) {
            Some(status) => println!("{task_id}: {status}"),
            None => println!("{task_id}: unknown (this process has no record of it)"),
        },
        None => {
            let info = framework.get_framework_info();
            println!("labgrid {} -- running={}", info.version, info.running);
            println!("servers: {}  workers: {}  registered experiments: {}", info.server_count, info.worker_count, info.registered_experiment_count);

            let cluster = framework.get_cluster_summary();
            println!(
                "cluster: {} servers (idle={} busy={} offline={} error={}), load {:.2}",
                cluster.total_servers, cluster.idle_servers, cluster.busy_servers, cluster.offline_servers, cluster.error_servers, cluster.cluster_load
            );

            let stats = framework.get_task_stats();
            println!(
                "tasks: created={} completed={} failed={} retried={} queued={} running={}",
                stats.created, stats.completed, stats.failed, stats.retried, stats.queue_size, stats.running_count
            );
        }
    }

    framework.stop().await;
    Ok(())
}
