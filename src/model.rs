use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a local task file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    Ready,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Ready => "ready",
            TaskState::InProgress => "in-progress",
            TaskState::Completed => "completed",
            TaskState::Cancelled => "cancelled",
        }
    }

    /// Completed and cancelled tasks are finalized.
    pub fn is_final(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Cancelled)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['_', ' '], "-");
        match normalized.as_str() {
            "ready" => Ok(TaskState::Ready),
            "in-progress" | "inprogress" => Ok(TaskState::InProgress),
            "completed" | "complete" | "done" => Ok(TaskState::Completed),
            "cancelled" | "canceled" => Ok(TaskState::Cancelled),
            _ => Err(format!("unrecognized task state: {s}")),
        }
    }
}

/// Remote issue state as reported by GitHub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
    #[serde(other)]
    Unknown,
}

impl IssueState {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueState::Open => "open",
            IssueState::Closed => "closed",
            IssueState::Unknown => "unknown",
        }
    }
}

impl fmt::Display for IssueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The sync-relevant fields of one local task file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRecord {
    pub path: PathBuf,
    pub title: String,
    pub state: TaskState,
    pub linked_issue_id: Option<u64>,
    /// Raw `Last Synced` text; parsed only when timestamps are compared.
    pub last_synced_at: Option<String>,
    pub completed_date: Option<String>,
}

impl TaskRecord {
    /// File name for reports, falling back to the full path.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// The sync-relevant fields of one remote issue, captured at fetch time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteIssueSnapshot {
    pub issue_id: u64,
    pub state: IssueState,
    pub assignees: Vec<String>,
    pub updated_at: Option<String>,
    pub closed_at: Option<String>,
}

impl RemoteIssueSnapshot {
    /// Build a snapshot, dropping `closed_at` unless the issue is closed.
    pub fn new(
        issue_id: u64,
        state: IssueState,
        assignees: Vec<String>,
        updated_at: Option<String>,
        closed_at: Option<String>,
    ) -> Self {
        let closed_at = if state == IssueState::Closed {
            closed_at.filter(|s| !s.trim().is_empty())
        } else {
            None
        };
        Self {
            issue_id,
            state,
            assignees,
            updated_at: updated_at.filter(|s| !s.trim().is_empty()),
            closed_at,
        }
    }
}
