//! JSON and CSV export helpers for [`crate::FileResultManager::export_results`].

use std::path::Path;

use chrono::Utc;
use labgrid_types::ExperimentResult;
use serde::Serialize;

#[derive(Serialize)]
struct JsonExport<'a> {
    export_time: chrono::DateTime<Utc>,
    total_results: usize,
    results: &'a [ExperimentResult],
}

pub fn write_json(path: &Path, results: &[ExperimentResult]) -> std::io::Result<()> {
    let document = JsonExport { export_time: Utc::now(), total_results: results.len(), results };
    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(file, &document)?;
    Ok(())
}

pub fn write_csv(path: &Path, results: &[ExperimentResult]) -> std::io::Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "experiment_id",
        "status",
        "start_time",
        "end_time",
        "duration",
        "output_dir",
        "result_files_count",
        "error_message",
    ])?;
    for r in results {
        writer.write_record([
            r.experiment_id.clone(),
            r.status.to_string(),
            r.start_time.map(|t| t.to_rfc3339()).unwrap_or_default(),
            r.end_time.map(|t| t.to_rfc3339()).unwrap_or_default(),
            r.duration_secs.map(|d| d.to_string()).unwrap_or_default(),
            r.output_dir.clone(),
            r.result_files.len().to_string(),
            r.error_message.clone().unwrap_or_default(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_export_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let results = vec![ExperimentResult::new("exp_1", "out")];
        write_json(&path, &results).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("exp_1"));
        assert!(contents.contains("total_results"));
    }

    #[test]
    fn csv_export_has_fixed_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let results = vec![ExperimentResult::new("exp_1", "out")];
        write_csv(&path, &results).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        let header = contents.lines().next().unwrap();
        assert_eq!(header, "experiment_id,status,start_time,end_time,duration,output_dir,result_files_count,error_message");
    }
}
