use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::Config;
use crate::error::{ErrorCategory, Result};
use crate::github::{IssuePatch, IssueTracker, NewIssue, RepoRef};
use crate::model::IssueState;
use crate::sync::{NoopProgress, SyncOptions, SyncProgress};
use crate::task_file::{discovery, TaskDocument, TaskStore};

/// What publishing one task file did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PublishOutcome {
    /// `issue_number` is `None` on a dry run.
    Created { issue_number: Option<u64> },
    Updated { issue_number: u64 },
    Error {
        category: ErrorCategory,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedTask {
    pub file: String,
    pub path: PathBuf,
    pub title: Option<String>,
    #[serde(flatten)]
    pub outcome: PublishOutcome,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublishCounts {
    pub created: usize,
    pub updated: usize,
    pub error: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishReport {
    pub repository: String,
    pub dry_run: bool,
    pub counts: PublishCounts,
    pub tasks: Vec<PublishedTask>,
}

impl PublishReport {
    pub fn new(repository: impl Into<String>, dry_run: bool) -> Self {
        Self {
            repository: repository.into(),
            dry_run,
            counts: PublishCounts::default(),
            tasks: Vec::new(),
        }
    }

    pub fn push(&mut self, task: PublishedTask) {
        match task.outcome {
            PublishOutcome::Created { .. } => self.counts.created += 1,
            PublishOutcome::Updated { .. } => self.counts.updated += 1,
            PublishOutcome::Error { .. } => self.counts.error += 1,
        }
        self.tasks.push(task);
    }

    pub fn has_errors(&self) -> bool {
        self.counts.error > 0
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn render_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PublishReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Publish: {}", self.repository)?;
        if self.dry_run {
            writeln!(f, "  Mode:    dry run (no issues changed)")?;
        }
        writeln!(f, "  Created: {}", self.counts.created)?;
        writeln!(f, "  Updated: {}", self.counts.updated)?;
        writeln!(f, "  Errors:  {}", self.counts.error)?;
        if !self.tasks.is_empty() {
            writeln!(f)?;
        }
        for task in &self.tasks {
            match &task.outcome {
                PublishOutcome::Created {
                    issue_number: Some(n),
                } => writeln!(f, "  {}: created #{n}", task.file)?,
                PublishOutcome::Created { issue_number: None } => {
                    writeln!(f, "  {}: would create", task.file)?
                }
                PublishOutcome::Updated { issue_number } => {
                    writeln!(f, "  {}: updated #{issue_number}", task.file)?
                }
                PublishOutcome::Error { category, message } => {
                    writeln!(f, "  {}: [{category}] {message}", task.file)?
                }
            }
        }
        Ok(())
    }
}

/// Pushes local task files to GitHub issues.
pub struct Publisher<'a> {
    tracker: &'a dyn IssueTracker,
    store: &'a dyn TaskStore,
    config: &'a Config,
    repo: RepoRef,
    options: SyncOptions,
    progress: &'a dyn SyncProgress,
}

impl<'a> Publisher<'a> {
    pub fn new(
        tracker: &'a dyn IssueTracker,
        store: &'a dyn TaskStore,
        config: &'a Config,
        repo: RepoRef,
        options: SyncOptions,
    ) -> Self {
        Self {
            tracker,
            store,
            config,
            repo,
            options,
            progress: &NoopProgress,
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn SyncProgress) -> Self {
        self.progress = progress;
        self
    }

    /// Configured labels, then priority, effort and the file's own labels,
    /// minus exclusions. Order is kept; duplicates are dropped.
    pub fn issue_labels(&self, doc: &TaskDocument) -> Vec<String> {
        let mapping = &self.config.github.field_mapping;
        let mut candidates = mapping.additional_labels.clone();
        if let Some(priority) = &doc.priority {
            let spec = mapping
                .priority_labels
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(priority.trim()));
            match spec {
                Some((_, spec)) => candidates.push(spec.name.clone()),
                None => log::debug!("No label configured for priority '{priority}'"),
            }
        }
        if let Some(effort) = &doc.effort {
            candidates.push(format!("{}{}", mapping.effort_label_prefix, effort.trim()));
        }
        candidates.extend(doc.labels.iter().cloned());

        let mut labels: Vec<String> = Vec::new();
        for label in candidates {
            if !mapping.exclude_labels.contains(&label) && !labels.contains(&label) {
                labels.push(label);
            }
        }
        labels
    }

    fn issue_state(&self, doc: &TaskDocument) -> IssueState {
        self.config
            .github
            .field_mapping
            .state_mapping
            .issue_state_for(doc.record.state)
    }

    fn assignees(&self, doc: &TaskDocument) -> Vec<String> {
        if !doc.assignees.is_empty() {
            return doc.assignees.clone();
        }
        self.config
            .github
            .issue_defaults
            .default_assignee
            .iter()
            .filter(|a| !a.trim().is_empty())
            .cloned()
            .collect()
    }

    pub fn new_issue(&self, doc: &TaskDocument) -> NewIssue {
        NewIssue {
            title: doc.record.title.clone(),
            body: doc.body.clone(),
            labels: self.issue_labels(doc),
            assignees: self.assignees(doc),
        }
    }

    /// Assignees are left alone on update so remote reassignment survives.
    pub fn issue_patch(&self, doc: &TaskDocument) -> IssuePatch {
        IssuePatch {
            title: Some(doc.record.title.clone()),
            body: Some(doc.body.clone()),
            state: Some(self.issue_state(doc)),
            labels: Some(self.issue_labels(doc)),
            assignees: None,
        }
    }

    async fn publish_document(&self, doc: &TaskDocument) -> Result<PublishOutcome> {
        let path = &doc.record.path;
        if let Some(number) = doc.record.linked_issue_id {
            if !self.options.dry_run {
                let issue = self
                    .tracker
                    .update_issue(&self.repo, number, &self.issue_patch(doc))
                    .await?;
                self.store.link_issue(path, number, &self.issue_url(&issue.html_url, number))?;
            }
            log::info!("Updated issue #{number} from {}", doc.record.file_name());
            return Ok(PublishOutcome::Updated {
                issue_number: number,
            });
        }

        if self.options.dry_run {
            return Ok(PublishOutcome::Created { issue_number: None });
        }

        let created = self
            .tracker
            .create_issue(&self.repo, &self.new_issue(doc))
            .await?;
        let number = created.number;
        // Record the link first so a failed close does not orphan the issue.
        self.store
            .link_issue(path, number, &self.issue_url(&created.html_url, number))?;
        if self.issue_state(doc) == IssueState::Closed {
            let close = IssuePatch {
                state: Some(IssueState::Closed),
                ..Default::default()
            };
            self.tracker.update_issue(&self.repo, number, &close).await?;
        }
        log::info!("Created issue #{number} from {}", doc.record.file_name());
        Ok(PublishOutcome::Created {
            issue_number: Some(number),
        })
    }

    fn issue_url(&self, html_url: &str, number: u64) -> String {
        if html_url.is_empty() {
            self.repo.issue_url(number)
        } else {
            html_url.to_string()
        }
    }

    /// Publish one file. Failures become an `error` entry, except a rejected
    /// token, which is returned as `Err`.
    pub async fn publish_file(&self, path: &Path) -> Result<PublishedTask> {
        let file = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let (title, result) = match self.store.read_document(path) {
            Ok(doc) => (Some(doc.record.title.clone()), self.publish_document(&doc).await),
            Err(e) => (None, Err(e)),
        };
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                log::warn!("Could not publish {}: {e}", path.display());
                PublishOutcome::Error {
                    category: e.category(),
                    message: e.to_string(),
                }
            }
        };
        Ok(PublishedTask {
            file,
            path: path.to_path_buf(),
            title,
            outcome,
            dry_run: self.options.dry_run,
        })
    }

    /// Publish each file in turn. A rejected token stops the batch.
    pub async fn publish_files(&self, paths: &[PathBuf]) -> Result<PublishReport> {
        let mut report = PublishReport::new(self.repo.to_string(), self.options.dry_run);
        let total = paths.len();
        for (index, path) in paths.iter().enumerate() {
            self.progress
                .on_task_start(&path.display().to_string(), index, total);
            match self.publish_file(path).await {
                Ok(task) => report.push(task),
                Err(e) => {
                    log::error!("Aborting publish at {} ({}/{total}): {e}", path.display(), index + 1);
                    return Err(e);
                }
            }
        }
        Ok(report)
    }

    pub async fn publish_directory(&self, dir: &Path) -> Result<PublishReport> {
        let paths = discovery::find_task_files(dir)?;
        self.publish_files(&paths).await
    }

    pub async fn publish_project(&self, project_dir: &Path) -> Result<PublishReport> {
        self.publish_directory(&discovery::project_tasks_dir(project_dir))
            .await
    }
}
