//! On-disk persistence, retrieval, and analysis of experiment results.
//!
//! Results live in memory behind a single lock and are mirrored to
//! `<base_dir>/metadata.json` on every mutation via an atomic
//! write-then-rename, an improvement on the flat overwrite the source
//! design uses.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use labgrid_core::store::{collect_metric_values, ComparisonReport, ExportFormat, ResultStatistics, ResultStore};
use labgrid_types::{ExperimentResult, ExperimentStatus};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::export;

const SCHEMA_VERSION: &str = "1.0";

#[derive(Serialize, Deserialize)]
struct MetadataFile {
    version: String,
    last_updated: DateTime<Utc>,
    results: Vec<ExperimentResult>,
}

pub struct FileResultManager {
    base_dir: PathBuf,
    max_retention_days: u32,
    index: Mutex<HashMap<String, ExperimentResult>>,
}

impl FileResultManager {
    pub fn new(base_dir: impl Into<PathBuf>, max_retention_days: u32) -> std::io::Result<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;
        let index = Self::load_index(&base_dir);
        let manager = Self { base_dir, max_retention_days, index: Mutex::new(index) };
        manager.cleanup_expired();
        Ok(manager)
    }

    fn metadata_path(base_dir: &Path) -> PathBuf {
        base_dir.join("metadata.json")
    }

    /// Entries that fail to deserialize are logged and skipped; the file
    /// on disk is left untouched until the next successful save.
    fn load_index(base_dir: &Path) -> HashMap<String, ExperimentResult> {
        let path = Self::metadata_path(base_dir);
        let Ok(contents) = std::fs::read_to_string(&path) else {
            return HashMap::new();
        };
        match serde_json::from_str::<MetadataFile>(&contents) {
            Ok(file) => file.results.into_iter().map(|r| (r.experiment_id.clone(), r)).collect(),
            Err(e) => {
                warn!(error = %e, "failed to parse result index, starting with an empty one");
                HashMap::new()
            }
        }
    }

    fn save_index(&self, index: &HashMap<String, ExperimentResult>) -> std::io::Result<()> {
        let file = MetadataFile {
            version: SCHEMA_VERSION.to_string(),
            last_updated: Utc::now(),
            results: index.values().cloned().collect(),
        };
        let final_path = Self::metadata_path(&self.base_dir);
        let tmp_path = self.base_dir.join("metadata.json.tmp");
        let handle = std::fs::File::create(&tmp_path)?;
        serde_json::to_writer_pretty(handle, &file)?;
        std::fs::rename(&tmp_path, &final_path)
    }

    pub fn get_results_by_date_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<ExperimentResult> {
        self.index
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.start_time.map(|t| t >= start && t <= end).unwrap_or(false))
            .cloned()
            .collect()
    }

    /// Removes the index entry and best-effort deletes the output
    /// directory; a deletion failure is logged, not fatal.
    pub fn delete_result(&self, experiment_id: &str) -> bool {
        let mut index = self.index.lock().unwrap();
        let Some(result) = index.remove(experiment_id) else {
            return false;
        };
        if let Err(e) = std::fs::remove_dir_all(&result.output_dir) {
            warn!(experiment_id, error = %e, "failed to remove output directory");
        }
        if let Err(e) = self.save_index(&index) {
            warn!(error = %e, "failed to persist result index after delete");
        }
        true
    }

    /// Copies the output directory into a timestamped sibling of
    /// `archive_dir` and writes a standalone metadata file alongside it.
    pub fn archive_result(&self, experiment_id: &str, archive_dir: &Path) -> std::io::Result<bool> {
        let result = match self.get_result(experiment_id) {
            Some(r) => r,
            None => return Ok(false),
        };
        let dest = archive_dir.join(format!("{}_{}", experiment_id, Utc::now().timestamp()));
        let results_dest = dest.join("results");
        std::fs::create_dir_all(&results_dest)?;
        copy_dir_recursive(Path::new(&result.output_dir), &results_dest)?;
        let handle = std::fs::File::create(dest.join("metadata.json"))?;
        serde_json::to_writer_pretty(handle, &result)?;
        Ok(true)
    }

    pub fn get_storage_info(&self) -> StorageInfo {
        let (total_size_bytes, total_files) = dir_size(&self.base_dir);
        StorageInfo {
            total_size_bytes,
            total_files,
            base_directory: self.base_dir.display().to_string(),
            max_retention_days: self.max_retention_days,
        }
    }

    fn cleanup_expired(&self) {
        self.cleanup_old_results(self.max_retention_days);
    }

    pub fn shutdown(&self) {
        let index = self.index.lock().unwrap();
        if let Err(e) = self.save_index(&index) {
            warn!(error = %e, "failed to persist result index on shutdown");
        }
    }
}

#[derive(Debug, Clone)]
pub struct StorageInfo {
    pub total_size_bytes: u64,
    pub total_files: u64,
    pub base_directory: String,
    pub max_retention_days: u32,
}

impl StorageInfo {
    pub fn total_size_mb(&self) -> f64 {
        self.total_size_bytes as f64 / (1024.0 * 1024.0)
    }

    pub fn total_size_gb(&self) -> f64 {
        self.total_size_mb() / 1024.0
    }
}

impl ResultStore for FileResultManager {
    fn store_result(&self, result: ExperimentResult) -> bool {
        let mut index = self.index.lock().unwrap();
        index.insert(result.experiment_id.clone(), result);
        match self.save_index(&index) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "failed to persist result index");
                false
            }
        }
    }

    fn get_result(&self, experiment_id: &str) -> Option<ExperimentResult> {
        self.index.lock().unwrap().get(experiment_id).cloned()
    }

    fn get_all_results(&self) -> Vec<ExperimentResult> {
        self.index.lock().unwrap().values().cloned().collect()
    }

    fn get_results_by_status(&self, status: ExperimentStatus) -> Vec<ExperimentResult> {
        self.index.lock().unwrap().values().filter(|r| r.status == status).cloned().collect()
    }

    fn search_results(&self, query: &str) -> Vec<ExperimentResult> {
        let query = query.to_lowercase();
        self.index
            .lock()
            .unwrap()
            .values()
            .filter(|r| {
                r.experiment_id.to_lowercase().contains(&query)
                    || r.error_message.as_deref().unwrap_or("").to_lowercase().contains(&query)
                    || r.logs.iter().any(|l| l.to_lowercase().contains(&query))
            })
            .cloned()
            .collect()
    }

    fn get_result_statistics(&self) -> ResultStatistics {
        let index = self.index.lock().unwrap();
        let total = index.len();
        let mut status_counts: HashMap<ExperimentStatus, usize> = HashMap::new();
        let mut duration_sum = 0.0;
        let mut duration_count = 0u32;
        for r in index.values() {
            *status_counts.entry(r.status).or_insert(0) += 1;
            if let Some(d) = r.duration_secs {
                duration_sum += d;
                duration_count += 1;
            }
        }
        let successful_count = *status_counts.get(&ExperimentStatus::Completed).unwrap_or(&0);
        let failed_count = *status_counts.get(&ExperimentStatus::Failed).unwrap_or(&0);
        let success_rate_pct = if total == 0 { 0.0 } else { successful_count as f64 / total as f64 * 100.0 };
        ResultStatistics {
            total,
            status_counts,
            average_duration_secs: if duration_count == 0 { 0.0 } else { duration_sum / duration_count as f64 },
            success_rate_pct,
            successful_count,
            failed_count,
        }
    }

    fn compare_results(&self, experiment_ids: &[String]) -> ComparisonReport {
        let index = self.index.lock().unwrap();
        let results: Vec<ExperimentResult> =
            experiment_ids.iter().filter_map(|id| index.get(id).cloned()).collect();
        let execution_times: Vec<_> = results.iter().map(|r| (r.experiment_id.clone(), r.duration_secs)).collect();
        let statuses: Vec<_> = results.iter().map(|r| (r.experiment_id.clone(), r.status)).collect();
        let file_counts: Vec<_> =
            results.iter().map(|r| (r.experiment_id.clone(), r.result_files.len())).collect();
        let durations: Vec<f64> = results.iter().filter_map(|r| r.duration_secs).collect();
        let (min, max, avg) = if durations.is_empty() {
            (None, None, None)
        } else {
            let sum: f64 = durations.iter().sum();
            (
                durations.iter().cloned().fold(f64::INFINITY, f64::min).into(),
                durations.iter().cloned().fold(f64::NEG_INFINITY, f64::max).into(),
                Some(sum / durations.len() as f64),
            )
        };
        ComparisonReport {
            execution_times,
            statuses,
            metrics_comparison: collect_metric_values(&results),
            file_counts,
            min_execution_secs: min,
            max_execution_secs: max,
            avg_execution_secs: avg,
        }
    }

    fn cleanup_old_results(&self, retention_days: u32) -> usize {
        let cutoff = Utc::now() - chrono::Duration::days(retention_days as i64);
        let mut index = self.index.lock().unwrap();
        let before = index.len();
        index.retain(|_, r| r.end_time.map(|t| t >= cutoff).unwrap_or(true));
        let removed = before - index.len();
        if removed > 0 {
            if let Err(e) = self.save_index(&index) {
                warn!(error = %e, "failed to persist result index after cleanup");
            }
        }
        removed
    }

    fn export_results(
        &self,
        path: &Path,
        experiment_ids: Option<&[String]>,
        format: ExportFormat,
    ) -> std::io::Result<()> {
        let index = self.index.lock().unwrap();
        let results: Vec<ExperimentResult> = match experiment_ids {
            Some(ids) => ids.iter().filter_map(|id| index.get(id).cloned()).collect(),
            None => index.values().cloned().collect(),
        };
        match format {
            ExportFormat::Json => export::write_json(path, &results),
            ExportFormat::Csv => export::write_csv(path, &results),
        }
    }
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    if !src.exists() {
        return Ok(());
    }
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            std::fs::create_dir_all(&target)?;
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}

fn dir_size(path: &Path) -> (u64, u64) {
    let mut total_size = 0;
    let mut total_files = 0;
    if let Ok(entries) = std::fs::read_dir(path) {
        for entry in entries.flatten() {
            if let Ok(metadata) = entry.metadata() {
                if metadata.is_dir() {
                    let (size, files) = dir_size(&entry.path());
                    total_size += size;
                    total_files += files;
                } else {
                    total_size += metadata.len();
                    total_files += 1;
                }
            }
        }
    }
    (total_size, total_files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (tempfile::TempDir, FileResultManager) {
        let dir = tempfile::tempdir().unwrap();
        let manager = FileResultManager::new(dir.path(), 30).unwrap();
        (dir, manager)
    }

    #[test]
    fn store_then_get_round_trips() {
        let (_dir, mgr) = manager();
        let mut result = ExperimentResult::new("exp_1", "out");
        result.status = ExperimentStatus::Completed;
        assert!(mgr.store_result(result.clone()));
        let fetched = mgr.get_result("exp_1").unwrap();
        assert_eq!(fetched.status, ExperimentStatus::Completed);
    }

    #[test]
    fn index_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mgr = FileResultManager::new(dir.path(), 30).unwrap();
            mgr.store_result(ExperimentResult::new("exp_1", "out"));
        }
        let reopened = FileResultManager::new(dir.path(), 30).unwrap();
        assert!(reopened.get_result("exp_1").is_some());
    }

    #[test]
    fn corrupt_metadata_file_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("metadata.json"), "not json").unwrap();
        let mgr = FileResultManager::new(dir.path(), 30).unwrap();
        assert!(mgr.get_all_results().is_empty());
    }

    #[test]
    fn search_matches_error_message() {
        let (_dir, mgr) = manager();
        let mut result = ExperimentResult::new("exp_1", "out");
        result.error_message = Some("timeout exceeded".to_string());
        mgr.store_result(result);
        assert_eq!(mgr.search_results("timeout").len(), 1);
        assert!(mgr.search_results("nope").is_empty());
    }

    #[test]
    fn statistics_compute_success_rate() {
        let (_dir, mgr) = manager();
        let mut ok = ExperimentResult::new("exp_ok", "out");
        ok.status = ExperimentStatus::Completed;
        ok.duration_secs = Some(2.0);
        let mut bad = ExperimentResult::new("exp_bad", "out");
        bad.status = ExperimentStatus::Failed;
        mgr.store_result(ok);
        mgr.store_result(bad);

        let stats = mgr.get_result_statistics();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.successful_count, 1);
        assert_eq!(stats.failed_count, 1);
        assert!((stats.success_rate_pct - 50.0).abs() < 1e-9);
    }

    #[test]
    fn cleanup_old_results_removes_expired_entries() {
        let (_dir, mgr) = manager();
        let mut old = ExperimentResult::new("exp_old", "out");
        old.end_time = Some(Utc::now() - chrono::Duration::days(60));
        mgr.store_result(old);
        let removed = mgr.cleanup_old_results(30);
        assert_eq!(removed, 1);
        assert!(mgr.get_all_results().is_empty());
    }

    #[test]
    fn delete_result_removes_from_index() {
        let (_dir, mgr) = manager();
        mgr.store_result(ExperimentResult::new("exp_1", "/nonexistent/output"));
        assert!(mgr.delete_result("exp_1"));
        assert!(mgr.get_result("exp_1").is_none());
        assert!(!mgr.delete_result("exp_1"));
    }
}
