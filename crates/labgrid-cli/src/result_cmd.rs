//! `labgrid result` command: print a stored [`ExperimentResult`] as JSON.
//!
//! Looked up by experiment id (persisted on disk), not task id -- the two
//! are distinct identifiers; `labgrid run` prints both.

use anyhow::{Context, Result};

use crate::bootstrap::build_framework;

pub async fn run_result(servers_path: &str, config_path: Option<&str>, experiment_id: &str) -> Result<()> {
    let framework = build_framework(servers_path, config_path)?;
    let result = framework.get_result(experiment_id).with_context(|| format!("no stored result for {experiment_id}"));
    framework.stop().await;

    let result = result?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
