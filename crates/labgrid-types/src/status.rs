use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Status of a scheduled [`crate::Task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStatusParseError(pub String);

impl fmt::Display for TaskStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid task status: {}", self.0)
    }
}

impl std::error::Error for TaskStatusParseError {}

impl FromStr for TaskStatus {
    type Err = TaskStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(TaskStatusParseError(other.to_string())),
        }
    }
}

/// Status of an [`crate::ExperimentResult`] as it moves through the six-phase lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    Pending,
    Initializing,
    Running,
    Collecting,
    Analyzing,
    Saving,
    Cleaning,
    Completed,
    Failed,
    Cancelled,
}

impl ExperimentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExperimentStatus::Completed | ExperimentStatus::Failed | ExperimentStatus::Cancelled
        )
    }
}

impl fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExperimentStatus::Pending => "pending",
            ExperimentStatus::Initializing => "initializing",
            ExperimentStatus::Running => "running",
            ExperimentStatus::Collecting => "collecting",
            ExperimentStatus::Analyzing => "analyzing",
            ExperimentStatus::Saving => "saving",
            ExperimentStatus::Cleaning => "cleaning",
            ExperimentStatus::Completed => "completed",
            ExperimentStatus::Failed => "failed",
            ExperimentStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentStatusParseError(pub String);

impl fmt::Display for ExperimentStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid experiment status: {}", self.0)
    }
}

impl std::error::Error for ExperimentStatusParseError {}

impl FromStr for ExperimentStatus {
    type Err = ExperimentStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ExperimentStatus::Pending),
            "initializing" => Ok(ExperimentStatus::Initializing),
            "running" => Ok(ExperimentStatus::Running),
            "collecting" => Ok(ExperimentStatus::Collecting),
            "analyzing" => Ok(ExperimentStatus::Analyzing),
            "saving" => Ok(ExperimentStatus::Saving),
            "cleaning" => Ok(ExperimentStatus::Cleaning),
            "completed" => Ok(ExperimentStatus::Completed),
            "failed" => Ok(ExperimentStatus::Failed),
            "cancelled" => Ok(ExperimentStatus::Cancelled),
            other => Err(ExperimentStatusParseError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_status_display_roundtrip() {
        for s in [
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Cancelled,
        ] {
            assert_eq!(s.to_string().parse::<TaskStatus>().unwrap(), s);
        }
    }

    #[test]
    fn task_status_invalid() {
        assert!("bogus".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn experiment_status_display_roundtrip() {
        for s in [
            ExperimentStatus::Pending,
            ExperimentStatus::Initializing,
            ExperimentStatus::Running,
            ExperimentStatus::Collecting,
            ExperimentStatus::Analyzing,
            ExperimentStatus::Saving,
            ExperimentStatus::Cleaning,
            ExperimentStatus::Completed,
            ExperimentStatus::Failed,
            ExperimentStatus::Cancelled,
        ] {
            assert_eq!(s.to_string().parse::<ExperimentStatus>().unwrap(), s);
        }
    }

    #[test]
    fn experiment_status_invalid() {
        assert!("bogus".parse::<ExperimentStatus>().is_err());
    }

    #[test]
    fn terminal_classification() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());

        assert!(ExperimentStatus::Completed.is_terminal());
        assert!(!ExperimentStatus::Saving.is_terminal());
    }
}
