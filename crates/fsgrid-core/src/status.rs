//! Task status and master info reported by the cluster manager.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Staging,
    Starting,
    Running,
    Killing,
    Finished,
    Failed,
    Killed,
    Lost,
    Error,
    Dropped,
    Unreachable,
    Gone,
    GoneByOperator,
    Unknown,
}

/// How the scheduler reacts to a task state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Started,
    Stopped,
    Other,
}

impl TaskState {
    pub fn kind(self) -> StatusKind {
        match self {
            TaskState::Running => StatusKind::Started,
            TaskState::Finished
            | TaskState::Failed
            | TaskState::Killed
            | TaskState::Lost
            | TaskState::Error
            | TaskState::Dropped
            | TaskState::Gone
            | TaskState::GoneByOperator => StatusKind::Stopped,
            _ => StatusKind::Other,
        }
    }

    /// Terminal states that end a task the operator asked to stop.
    pub fn is_clean_stop(self) -> bool {
        matches!(self, TaskState::Finished | TaskState::Killed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Staging => "TASK_STAGING",
            TaskState::Starting => "TASK_STARTING",
            TaskState::Running => "TASK_RUNNING",
            TaskState::Killing => "TASK_KILLING",
            TaskState::Finished => "TASK_FINISHED",
            TaskState::Failed => "TASK_FAILED",
            TaskState::Killed => "TASK_KILLED",
            TaskState::Lost => "TASK_LOST",
            TaskState::Error => "TASK_ERROR",
            TaskState::Dropped => "TASK_DROPPED",
            TaskState::Unreachable => "TASK_UNREACHABLE",
            TaskState::Gone => "TASK_GONE",
            TaskState::GoneByOperator => "TASK_GONE_BY_OPERATOR",
            TaskState::Unknown => "TASK_UNKNOWN",
        }
    }

    /// Parse the `TASK_*` wire name.
    pub fn from_wire(s: &str) -> Option<Self> {
        const ALL: [TaskState; 14] = [
            TaskState::Staging,
            TaskState::Starting,
            TaskState::Running,
            TaskState::Killing,
            TaskState::Finished,
            TaskState::Failed,
            TaskState::Killed,
            TaskState::Lost,
            TaskState::Error,
            TaskState::Dropped,
            TaskState::Unreachable,
            TaskState::Gone,
            TaskState::GoneByOperator,
            TaskState::Unknown,
        ];
        ALL.into_iter().find(|state| state.as_str() == s)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: String,
    pub state: TaskState,
    #[serde(default)]
    pub slave_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    /// Acknowledgement token; present when the update must be acked.
    #[serde(default)]
    pub uuid: Option<String>,
}

impl TaskStatus {
    pub fn new(task_id: impl Into<String>, state: TaskState) -> Self {
        Self {
            task_id: task_id.into(),
            state,
            slave_id: None,
            message: None,
            reason: None,
            uuid: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MasterInfo {
    pub id: String,
    pub hostname: String,
    pub port: u16,
    #[serde(default)]
    pub version: Option<String>,
}

impl fmt::Display for MasterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.id, self.hostname, self.port)?;
        if let Some(version) = &self.version {
            write!(f, " (v{version})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_kinds() {
        assert_eq!(TaskState::Running.kind(), StatusKind::Started);
        for state in [
            TaskState::Finished,
            TaskState::Failed,
            TaskState::Killed,
            TaskState::Lost,
            TaskState::Error,
        ] {
            assert_eq!(state.kind(), StatusKind::Stopped, "{state}");
        }
        assert_eq!(TaskState::Staging.kind(), StatusKind::Other);
        assert_eq!(TaskState::Unreachable.kind(), StatusKind::Other);
    }

    #[test]
    fn clean_stop() {
        assert!(TaskState::Finished.is_clean_stop());
        assert!(TaskState::Killed.is_clean_stop());
        assert!(!TaskState::Failed.is_clean_stop());
        assert!(!TaskState::Lost.is_clean_stop());
    }

    #[test]
    fn wire_names() {
        assert_eq!(TaskState::from_wire("TASK_RUNNING"), Some(TaskState::Running));
        assert_eq!(
            TaskState::from_wire("TASK_GONE_BY_OPERATOR"),
            Some(TaskState::GoneByOperator)
        );
        assert_eq!(TaskState::from_wire("RUNNING"), None);
    }

    #[test]
    fn master_display() {
        let master = MasterInfo {
            id: "m1".into(),
            hostname: "master".into(),
            port: 5050,
            version: Some("1.11.0".into()),
        };
        assert_eq!(master.to_string(), "m1@master:5050 (v1.11.0)");
    }
}
