//! In-memory collaborators for unit tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::github::{Account, Issue, IssuePatch, IssueTracker, Label, NewIssue, RepoRef};
use crate::model::{IssueState, TaskRecord, TaskState};
use crate::sync::conflict::Conflict;
use crate::task_file::{FieldUpdates, TaskDocument, TaskStore};

pub fn issue(number: u64, state: IssueState, assignees: &[&str]) -> Issue {
    Issue {
        number,
        title: format!("Issue {number}"),
        body: None,
        state,
        labels: Vec::new(),
        assignees: assignees
            .iter()
            .map(|login| Account {
                login: login.to_string(),
            })
            .collect(),
        html_url: format!("https://github.com/acme/widgets/issues/{number}"),
        created_at: Some("2024-01-01T00:00:00Z".into()),
        updated_at: None,
        closed_at: None,
    }
}

pub fn record(path: &str, state: TaskState, issue: Option<u64>) -> TaskRecord {
    TaskRecord {
        path: PathBuf::from(path),
        title: path.to_string(),
        state,
        linked_issue_id: issue,
        last_synced_at: None,
        completed_date: None,
    }
}

#[derive(Default)]
pub struct FakeTracker {
    issues: Mutex<BTreeMap<u64, Issue>>,
    reject_token: bool,
    pub fetched: Mutex<Vec<u64>>,
    pub created: Mutex<Vec<NewIssue>>,
    pub patched: Mutex<Vec<(u64, IssuePatch)>>,
}

impl FakeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_issue(self, issue: Issue) -> Self {
        self.issues.lock().unwrap().insert(issue.number, issue);
        self
    }

    pub fn rejecting_token() -> Self {
        Self {
            reject_token: true,
            ..Self::default()
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetched.lock().unwrap().len()
    }

    fn check_token(&self) -> Result<()> {
        if self.reject_token {
            return Err(Error::Auth("GitHub rejected the token (401)".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl IssueTracker for FakeTracker {
    async fn get_issue(&self, _repo: &RepoRef, number: u64) -> Result<Issue> {
        self.fetched.lock().unwrap().push(number);
        self.check_token()?;
        self.issues
            .lock()
            .unwrap()
            .get(&number)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("issue #{number}")))
    }

    async fn create_issue(&self, repo: &RepoRef, new: &NewIssue) -> Result<Issue> {
        self.check_token()?;
        self.created.lock().unwrap().push(new.clone());
        let mut issues = self.issues.lock().unwrap();
        let number = issues.keys().next_back().map_or(100, |n| n + 1);
        let created = Issue {
            number,
            title: new.title.clone(),
            body: Some(new.body.clone()),
            state: IssueState::Open,
            labels: new
                .labels
                .iter()
                .map(|name| Label { name: name.clone() })
                .collect(),
            assignees: new
                .assignees
                .iter()
                .map(|login| Account {
                    login: login.clone(),
                })
                .collect(),
            html_url: repo.issue_url(number),
            created_at: None,
            updated_at: None,
            closed_at: None,
        };
        issues.insert(number, created.clone());
        Ok(created)
    }

    async fn update_issue(&self, _repo: &RepoRef, number: u64, patch: &IssuePatch) -> Result<Issue> {
        self.check_token()?;
        self.patched.lock().unwrap().push((number, patch.clone()));
        let mut issues = self.issues.lock().unwrap();
        let issue = issues
            .get_mut(&number)
            .ok_or_else(|| Error::NotFound(format!("issue #{number}")))?;
        if let Some(state) = patch.state {
            issue.state = state;
        }
        if let Some(title) = &patch.title {
            issue.title = title.clone();
        }
        Ok(issue.clone())
    }
}

#[derive(Default)]
pub struct FakeStore {
    records: Mutex<BTreeMap<PathBuf, TaskRecord>>,
    markers: Mutex<BTreeMap<PathBuf, usize>>,
    fail_writes: bool,
    pub writes: Mutex<Vec<(PathBuf, FieldUpdates, bool)>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_writes() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    pub fn with_record(self, record: TaskRecord) -> Self {
        self.records
            .lock()
            .unwrap()
            .insert(record.path.clone(), record);
        self
    }

    pub fn record(&self, path: &str) -> TaskRecord {
        self.records.lock().unwrap()[Path::new(path)].clone()
    }

    pub fn marker_count(&self, path: &str) -> usize {
        self.markers
            .lock()
            .unwrap()
            .get(Path::new(path))
            .copied()
            .unwrap_or(0)
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }
}

impl TaskStore for FakeStore {
    fn read_document(&self, path: &Path) -> Result<TaskDocument> {
        let record = self
            .records
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| Error::task_file(path, "cannot read: no such file"))?;
        Ok(TaskDocument {
            body: format!("Body of {}", record.title),
            record,
            priority: None,
            effort: None,
            labels: Vec::new(),
            assignees: Vec::new(),
            issue_url: None,
        })
    }

    fn write(&self, path: &Path, updates: &FieldUpdates, backup: bool) -> Result<()> {
        if self.fail_writes {
            return Err(Error::task_file(path, "write failed: disk full"));
        }
        self.writes
            .lock()
            .unwrap()
            .push((path.to_path_buf(), updates.clone(), backup));
        let mut records = self.records.lock().unwrap();
        let record = records
            .get_mut(path)
            .ok_or_else(|| Error::task_file(path, "cannot read: no such file"))?;
        if let Some(state) = updates.state {
            record.state = state;
        }
        if let Some(ts) = &updates.last_synced {
            record.last_synced_at = Some(ts.clone());
        }
        if let Some(date) = &updates.completed_date {
            record.completed_date = Some(date.clone());
        }
        Ok(())
    }

    fn mark_for_review(&self, path: &Path, _conflict: &Conflict) -> Result<bool> {
        let mut markers = self.markers.lock().unwrap();
        let count = markers.entry(path.to_path_buf()).or_insert(0);
        if *count > 0 {
            return Ok(false);
        }
        *count = 1;
        Ok(true)
    }

    fn link_issue(&self, path: &Path, number: u64, _url: &str) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        let record = records
            .get_mut(path)
            .ok_or_else(|| Error::task_file(path, "cannot read: no such file"))?;
        record.linked_issue_id = Some(number);
        Ok(())
    }
}
