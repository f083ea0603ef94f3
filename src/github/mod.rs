pub mod client;
pub mod rate_limit;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{IssueState, RemoteIssueSnapshot};

pub use client::GitHubClient;

/// The issue-tracking operations the sync and publish flows rely on.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn get_issue(&self, repo: &RepoRef, number: u64) -> Result<Issue>;

    async fn create_issue(&self, repo: &RepoRef, issue: &NewIssue) -> Result<Issue>;

    async fn update_issue(&self, repo: &RepoRef, number: u64, patch: &IssuePatch)
        -> Result<Issue>;
}

/// An `owner/name` repository reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Parse `owner/repo` or a `https://github.com/owner/repo[/...]` URL.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            return Self::parse_url(trimmed);
        }
        let (owner, name) = trimmed
            .split_once('/')
            .ok_or_else(|| Error::InvalidRepo(format!("expected owner/repo, got '{raw}'")))?;
        Self::from_parts(raw, owner, name)
    }

    fn parse_url(raw: &str) -> Result<Self> {
        let url = url::Url::parse(raw).map_err(|e| Error::InvalidRepo(e.to_string()))?;
        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();
        match segments.as_slice() {
            [owner, name, ..] => Self::from_parts(raw, owner, name.trim_end_matches(".git")),
            _ => Err(Error::InvalidRepo(format!(
                "expected repository URL, got '{raw}'"
            ))),
        }
    }

    fn from_parts(raw: &str, owner: &str, name: &str) -> Result<Self> {
        let owner = owner.trim();
        let name = name.trim();
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return Err(Error::InvalidRepo(format!(
                "expected owner/repo, got '{raw}'"
            )));
        }
        Ok(Self::new(owner, name))
    }

    /// Browser URL for an issue in this repository.
    pub fn issue_url(&self, number: u64) -> String {
        format!("https://github.com/{}/{}/issues/{number}", self.owner, self.name)
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub login: String,
}

/// An issue as returned by the GitHub REST API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub state: IssueState,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub assignees: Vec<Account>,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub closed_at: Option<String>,
}

impl Issue {
    pub fn assignee_logins(&self) -> Vec<String> {
        self.assignees.iter().map(|a| a.login.clone()).collect()
    }

    pub fn snapshot(&self) -> RemoteIssueSnapshot {
        RemoteIssueSnapshot::new(
            self.number,
            self.state,
            self.assignee_logins(),
            self.updated_at.clone(),
            self.closed_at.clone(),
        )
    }
}

/// Request body for creating an issue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NewIssue {
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub assignees: Vec<String>,
}

/// Request body for updating an issue. Only set fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IssuePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<IssueState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignees: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_slug() {
        assert_eq!(RepoRef::parse("acme/widgets").unwrap(), RepoRef::new("acme", "widgets"));
        assert_eq!(
            RepoRef::parse("  acme / widgets ").unwrap(),
            RepoRef::new("acme", "widgets")
        );
    }

    #[test]
    fn test_parse_url() {
        assert_eq!(
            RepoRef::parse("https://github.com/acme/widgets/issues/4").unwrap(),
            RepoRef::new("acme", "widgets")
        );
        assert_eq!(
            RepoRef::parse("https://github.com/acme/widgets.git").unwrap(),
            RepoRef::new("acme", "widgets")
        );
    }

    #[test]
    fn test_parse_invalid() {
        assert!(RepoRef::parse("widgets").is_err());
        assert!(RepoRef::parse("/widgets").is_err());
        assert!(RepoRef::parse("a/b/c").is_err());
        assert!(RepoRef::parse("https://github.com/acme").is_err());
    }

    #[test]
    fn test_issue_url_and_display() {
        let repo = RepoRef::new("acme", "widgets");
        assert_eq!(repo.to_string(), "acme/widgets");
        assert_eq!(repo.issue_url(12), "https://github.com/acme/widgets/issues/12");
    }

    #[test]
    fn test_issue_deserialize_and_snapshot() {
        let json = r#"{
            "number": 42,
            "title": "Add login",
            "body": null,
            "state": "closed",
            "labels": [{"name": "priority:high", "color": "d73027"}],
            "assignees": [{"login": "alice", "id": 1}],
            "html_url": "https://github.com/acme/widgets/issues/42",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-03T00:00:00Z",
            "closed_at": "2024-01-02T00:00:00Z"
        }"#;
        let issue: Issue = serde_json::from_str(json).unwrap();
        assert_eq!(issue.assignee_logins(), vec!["alice".to_string()]);

        let snap = issue.snapshot();
        assert_eq!(snap.issue_id, 42);
        assert_eq!(snap.state, IssueState::Closed);
        assert_eq!(snap.closed_at.as_deref(), Some("2024-01-02T00:00:00Z"));
    }

    #[test]
    fn test_patch_serializes_only_set_fields() {
        let patch = IssuePatch {
            state: Some(IssueState::Closed),
            ..Default::default()
        };
        assert_eq!(serde_json::to_string(&patch).unwrap(), r#"{"state":"closed"}"#);
    }

    #[test]
    fn test_new_issue_skips_empty_lists() {
        let issue = NewIssue {
            title: "t".into(),
            body: "b".into(),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_string(&issue).unwrap(),
            r#"{"title":"t","body":"b"}"#
        );
    }
}
