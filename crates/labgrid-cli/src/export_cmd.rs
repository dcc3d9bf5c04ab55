//! `labgrid export` command: dump the result index to JSON or CSV.

use anyhow::{bail, Result};
use labgrid_core::store::ExportFormat;

use crate::bootstrap::build_framework;

pub async fn run_export(servers_path: &str, config_path: Option<&str>, out_path: &str, format: &str) -> Result<()> {
    let format = parse_format(format)?;

    let framework = build_framework(servers_path, config_path)?;
    let result = framework.export_results(std::path::Path::new(out_path), None, format);
    framework.stop().await;

    result?;
    println!("exported to {out_path}");
    Ok(())
}

fn parse_format(format: &str) -> Result<ExportFormat> {
    match format {
        "json" => Ok(ExportFormat::Json),
        "csv" => Ok(ExportFormat::Csv),
        other => bail!("unsupported export format '{other}', expected json or csv"),
    }
}
