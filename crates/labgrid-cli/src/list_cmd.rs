//! `labgrid list` command: list registered experiment types.

use anyhow::Result;

use crate::bootstrap::build_framework;

pub async fn run_list(servers_path: &str, config_path: Option<&str>) -> Result<()> {
    let framework = build_framework(servers_path, config_path)?;
    for experiment_type in framework.list_experiments() {
        if let Some(info) = framework.get_experiment_info(&experiment_type) {
            println!("{experiment_type}\t{}\t[{}]", info.description, info.tags.join(", "));
        } else {
            println!("{experiment_type}");
        }
    }
    framework.stop().await;
    Ok(())
}
