//! Layered GitHub integration configuration.

mod load;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{IssueState, TaskState};
use crate::sync::resolve::ResolutionPolicy;

pub use load::{
    apply_env_overrides, apply_env_overrides_from, global_config_path, infer_project_dir, load,
    load_layer, merge_values, project_config_path, ConfigSources, CONFIG_FILE_NAME,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub github: GitHubConfig,
}

impl Config {
    /// Look up a value by dot path, e.g. `github.api.timeout`.
    pub fn get(&self, key_path: &str) -> Option<Value> {
        let mut value = serde_json::to_value(self).ok()?;
        for key in key_path.split('.').filter(|k| !k.is_empty()) {
            value = match value {
                Value::Object(mut map) => map.remove(key)?,
                _ => return None,
            };
        }
        Some(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub api: ApiConfig,
    pub authentication: AuthConfig,
    pub default_repository: RepositoryConfig,
    pub issue_defaults: IssueDefaults,
    pub field_mapping: FieldMapping,
    pub sync_behavior: SyncBehavior,
    pub file_handling: FileHandling,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout: u64,
    /// Base backoff delay in seconds.
    pub rate_limit_delay: u64,
    pub max_retries: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.github.com".to_string(),
            timeout: 30,
            rate_limit_delay: 1,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub token_env_var: String,
    pub credentials_file: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_env_var: "GITHUB_TOKEN".to_string(),
            credentials_file: "github-credentials.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    pub owner: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IssueDefaults {
    pub default_assignee: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelSpec {
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldMapping {
    pub state_mapping: TaskToIssue,
    pub priority_labels: BTreeMap<String, LabelSpec>,
    pub effort_label_prefix: String,
    pub additional_labels: Vec<String>,
    pub exclude_labels: Vec<String>,
}

impl Default for FieldMapping {
    fn default() -> Self {
        let label = |name: &str, color: &str| LabelSpec {
            name: name.to_string(),
            color: Some(color.to_string()),
        };
        let mut priority_labels = BTreeMap::new();
        priority_labels.insert("High".to_string(), label("priority:high", "d73027"));
        priority_labels.insert("Medium".to_string(), label("priority:medium", "fee08b"));
        priority_labels.insert("Low".to_string(), label("priority:low", "1a9850"));
        Self {
            state_mapping: TaskToIssue::default(),
            priority_labels,
            effort_label_prefix: "effort:".to_string(),
            additional_labels: Vec::new(),
            exclude_labels: Vec::new(),
        }
    }
}

/// Local task state → remote issue state, used when publishing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskToIssue {
    pub ready: IssueState,
    #[serde(rename = "in-progress")]
    pub in_progress: IssueState,
    pub completed: IssueState,
    pub cancelled: IssueState,
}

impl Default for TaskToIssue {
    fn default() -> Self {
        Self {
            ready: IssueState::Open,
            in_progress: IssueState::Open,
            completed: IssueState::Closed,
            cancelled: IssueState::Closed,
        }
    }
}

impl TaskToIssue {
    pub fn issue_state_for(&self, state: TaskState) -> IssueState {
        match state {
            TaskState::Ready => self.ready,
            TaskState::InProgress => self.in_progress,
            TaskState::Completed => self.completed,
            TaskState::Cancelled => self.cancelled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncBehavior {
    pub conflict_resolution: ResolutionPolicy,
    /// Treat open issues with assignees as in-progress.
    pub preserve_in_progress: bool,
    pub state_mapping: SyncStateMapping,
}

impl Default for SyncBehavior {
    fn default() -> Self {
        Self {
            conflict_resolution: ResolutionPolicy::Manual,
            preserve_in_progress: true,
            state_mapping: SyncStateMapping::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncStateMapping {
    pub issue_to_task: IssueToTask,
}

/// Remote issue state → local task state, used when syncing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IssueToTask {
    pub open: TaskState,
    pub closed: TaskState,
}

impl Default for IssueToTask {
    fn default() -> Self {
        Self {
            open: TaskState::Ready,
            closed: TaskState::Completed,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileHandling {
    pub backup_before_sync: bool,
}
