use std::collections::HashMap;

use serde_json::Value;

/// A free-form, caller-defined key/value payload.
///
/// Used for [`crate::ExperimentConfig::parameters`] and
/// [`crate::ExperimentResult::metrics`] — both untyped maps in the source
/// design. Experiment implementations parse the keys they recognize out of
/// the map and ignore the rest.
pub type ParamMap = HashMap<String, Value>;
