//! Experiment registry -- a named collection of experiment constructors.
//!
//! The framework façade looks up experiment types by their tag at task
//! dispatch time (e.g. when a task specifies `experiment_type = "ping-sweep"`).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use labgrid_types::ExperimentConfig;
use tracing::warn;

use crate::lifecycle::Experiment;
use crate::remote::RemoteCapability;

/// Builds one [`Experiment`] instance from its config and a handle to the
/// remote capability it will use.
pub type ExperimentConstructor =
    Box<dyn Fn(ExperimentConfig, Arc<dyn RemoteCapability>) -> Box<dyn Experiment> + Send + Sync>;

struct RegistryEntry {
    constructor: ExperimentConstructor,
    description: String,
    tags: Vec<String>,
}

/// Summary of one registered experiment type, as returned by
/// [`ExperimentRegistry::get_experiment_info`].
#[derive(Debug, Clone)]
pub struct ExperimentInfo {
    pub experiment_type: String,
    pub description: String,
    pub tags: Vec<String>,
}

/// Aggregate view of the whole registry, as returned by
/// [`ExperimentRegistry::export_registry_info`].
#[derive(Debug, Clone)]
pub struct RegistryInfo {
    pub total_registered: usize,
    pub experiments: Vec<ExperimentInfo>,
    pub tag_counts: HashMap<String, usize>,
}

/// A collection of registered experiment constructors, keyed by type tag.
#[derive(Default)]
pub struct ExperimentRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl ExperimentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an experiment type. If `experiment_type` is already
    /// registered, it is replaced and a warning is logged.
    pub fn register(
        &mut self,
        experiment_type: impl Into<String>,
        constructor: ExperimentConstructor,
        description: impl Into<String>,
        tags: Vec<String>,
    ) {
        let experiment_type = experiment_type.into();
        if self.entries.contains_key(&experiment_type) {
            warn!(experiment_type = %experiment_type, "overwriting existing experiment registration");
        }
        self.entries.insert(
            experiment_type,
            RegistryEntry { constructor, description: description.into(), tags },
        );
    }

    pub fn unregister(&mut self, experiment_type: &str) -> bool {
        self.entries.remove(experiment_type).is_some()
    }

    pub fn validate_experiment_type(&self, experiment_type: &str) -> bool {
        self.entries.contains_key(experiment_type)
    }

    /// Construct an experiment instance. Returns `None` and logs if the
    /// type is unknown; construction itself is not expected to fail since
    /// constructors are infallible closures.
    pub fn create_experiment(
        &self,
        experiment_type: &str,
        config: ExperimentConfig,
        remote: Arc<dyn RemoteCapability>,
    ) -> Option<Box<dyn Experiment>> {
        match self.entries.get(experiment_type) {
            Some(entry) => Some((entry.constructor)(config, remote)),
            None => {
                warn!(experiment_type, "cannot construct unknown experiment type");
                None
            }
        }
    }

    pub fn list_experiments(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    pub fn get_experiment_info(&self, experiment_type: &str) -> Option<ExperimentInfo> {
        self.entries.get(experiment_type).map(|e| ExperimentInfo {
            experiment_type: experiment_type.to_string(),
            description: e.description.clone(),
            tags: e.tags.clone(),
        })
    }

    pub fn get_all_experiment_info(&self) -> Vec<ExperimentInfo> {
        self.entries
            .keys()
            .filter_map(|t| self.get_experiment_info(t))
            .collect()
    }

    pub fn search_experiments(&self, query: &str) -> Vec<&str> {
        let query = query.to_lowercase();
        self.entries
            .iter()
            .filter(|(ty, e)| {
                ty.to_lowercase().contains(&query)
                    || e.description.to_lowercase().contains(&query)
                    || e.tags.iter().any(|t| t.to_lowercase().contains(&query))
            })
            .map(|(ty, _)| ty.as_str())
            .collect()
    }

    pub fn get_experiments_by_tag(&self, tag: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, e)| e.tags.iter().any(|t| t == tag))
            .map(|(ty, _)| ty.as_str())
            .collect()
    }

    pub fn get_registered_count(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// The structured equivalent of the original's registry summary dump:
    /// total count, per-type info, and a tag -> count histogram.
    pub fn export_registry_info(&self) -> RegistryInfo {
        let mut tag_counts: HashMap<String, usize> = HashMap::new();
        for entry in self.entries.values() {
            for tag in &entry.tags {
                *tag_counts.entry(tag.clone()).or_insert(0) += 1;
            }
        }
        RegistryInfo {
            total_registered: self.entries.len(),
            experiments: self.get_all_experiment_info(),
            tag_counts,
        }
    }
}

impl std::fmt::Debug for ExperimentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExperimentRegistry")
            .field("experiments", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

static GLOBAL_REGISTRY: OnceLock<Mutex<ExperimentRegistry>> = OnceLock::new();

/// Optional global singleton accessor, provided for convenience. The
/// framework façade holds its own instance and does not depend on this.
pub fn global_registry() -> &'static Mutex<ExperimentRegistry> {
    GLOBAL_REGISTRY.get_or_init(|| Mutex::new(ExperimentRegistry::new()))
}
