pub mod conflict;
pub mod mapper;
pub mod resolve;
pub mod syncer;

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::error::{Error, ErrorCategory};
use crate::model::TaskState;
use crate::sync::conflict::Conflict;

/// Options controlling a sync operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Plan every action but write nothing.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoRemoteLink,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoRemoteLink => f.write_str("no linked GitHub issue"),
        }
    }
}

/// What happened to one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TaskOutcome {
    Updated {
        from: TaskState,
        to: TaskState,
        resolved_conflict: bool,
    },
    NoChange,
    /// Local state kept against a differing remote; counted as no change.
    KeptLocal,
    Conflict {
        conflict: Conflict,
        marker_added: bool,
    },
    Skipped {
        reason: SkipReason,
    },
    Error {
        category: ErrorCategory,
        message: String,
    },
}

/// The buckets a run report counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeCategory {
    Updated,
    NoChange,
    Conflict,
    Error,
    Skipped,
}

impl TaskOutcome {
    pub fn error(e: &Error) -> Self {
        TaskOutcome::Error {
            category: e.category(),
            message: e.to_string(),
        }
    }

    pub fn category(&self) -> OutcomeCategory {
        match self {
            TaskOutcome::Updated { .. } => OutcomeCategory::Updated,
            TaskOutcome::NoChange | TaskOutcome::KeptLocal => OutcomeCategory::NoChange,
            TaskOutcome::Conflict { .. } => OutcomeCategory::Conflict,
            TaskOutcome::Skipped { .. } => OutcomeCategory::Skipped,
            TaskOutcome::Error { .. } => OutcomeCategory::Error,
        }
    }
}

/// Per-task line of a [`SyncReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskReport {
    pub file: String,
    pub path: PathBuf,
    pub issue_number: Option<u64>,
    #[serde(flatten)]
    pub outcome: TaskOutcome,
    /// The outcome was planned, not written.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncCounts {
    pub updated: usize,
    pub no_change: usize,
    pub conflict: usize,
    pub error: usize,
    pub skipped: usize,
}

impl SyncCounts {
    fn record(&mut self, category: OutcomeCategory) {
        match category {
            OutcomeCategory::Updated => self.updated += 1,
            OutcomeCategory::NoChange => self.no_change += 1,
            OutcomeCategory::Conflict => self.conflict += 1,
            OutcomeCategory::Error => self.error += 1,
            OutcomeCategory::Skipped => self.skipped += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.updated + self.no_change + self.conflict + self.error + self.skipped
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Clean,
    NeedsReview,
    Failed,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncStatus::Clean => "clean",
            SyncStatus::NeedsReview => "needs_review",
            SyncStatus::Failed => "failed",
        })
    }
}

/// Report returned after a sync operation completes.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub repository: String,
    pub dry_run: bool,
    pub counts: SyncCounts,
    pub tasks: Vec<TaskReport>,
    pub warnings: Vec<String>,
}

impl SyncReport {
    pub fn new(repository: impl Into<String>, dry_run: bool) -> Self {
        Self {
            repository: repository.into(),
            dry_run,
            counts: SyncCounts::default(),
            tasks: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn push(&mut self, task: TaskReport) {
        self.counts.record(task.outcome.category());
        self.tasks.push(task);
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        let warning = warning.into();
        log::warn!("{warning}");
        self.warnings.push(warning);
    }

    pub fn status(&self) -> SyncStatus {
        if self.counts.error > 0 {
            SyncStatus::Failed
        } else if self.counts.conflict > 0 {
            SyncStatus::NeedsReview
        } else {
            SyncStatus::Clean
        }
    }

    pub fn has_errors(&self) -> bool {
        self.counts.error > 0
    }

    fn in_category(&self, category: OutcomeCategory) -> impl Iterator<Item = &TaskReport> {
        self.tasks
            .iter()
            .filter(move |t| t.outcome.category() == category)
    }

    pub fn updated(&self) -> impl Iterator<Item = &TaskReport> {
        self.in_category(OutcomeCategory::Updated)
    }

    /// Tasks awaiting manual review.
    pub fn conflicts(&self) -> impl Iterator<Item = &TaskReport> {
        self.in_category(OutcomeCategory::Conflict)
    }

    pub fn failures(&self) -> impl Iterator<Item = &TaskReport> {
        self.in_category(OutcomeCategory::Error)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        #[derive(Serialize)]
        struct Json<'a> {
            status: SyncStatus,
            #[serde(flatten)]
            report: &'a SyncReport,
        }
        serde_json::to_string_pretty(&Json {
            status: self.status(),
            report: self,
        })
    }

    pub fn render_text(&self) -> String {
        self.to_string()
    }
}

fn issue_label(task: &TaskReport) -> String {
    match task.issue_number {
        Some(n) => format!("{} (#{n})", task.file),
        None => task.file.clone(),
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Sync: {}", self.repository)?;
        if self.dry_run {
            writeln!(f, "  Mode:      dry run (no files written)")?;
        }
        writeln!(f, "  Status:    {}", self.status())?;
        writeln!(f, "  Updated:   {}", self.counts.updated)?;
        writeln!(f, "  No change: {}", self.counts.no_change)?;
        writeln!(f, "  Conflicts: {}", self.counts.conflict)?;
        writeln!(f, "  Errors:    {}", self.counts.error)?;
        writeln!(f, "  Skipped:   {}", self.counts.skipped)?;

        let mut updated = self.updated().peekable();
        if updated.peek().is_some() {
            writeln!(f, "\nUpdated:")?;
            for task in updated {
                if let TaskOutcome::Updated { from, to, .. } = &task.outcome {
                    writeln!(f, "  {}: {from} -> {to}", issue_label(task))?;
                }
            }
        }

        let mut conflicts = self.conflicts().peekable();
        if conflicts.peek().is_some() {
            writeln!(f, "\nNeeds manual review:")?;
            for task in conflicts {
                if let TaskOutcome::Conflict { conflict, .. } = &task.outcome {
                    writeln!(f, "  {}: {}", issue_label(task), conflict.description)?;
                }
            }
        }

        let mut failures = self.failures().peekable();
        if failures.peek().is_some() {
            writeln!(f, "\nErrors:")?;
            for task in failures {
                if let TaskOutcome::Error { category, message } = &task.outcome {
                    writeln!(f, "  {}: [{category}] {message}", issue_label(task))?;
                }
            }
        }

        if !self.warnings.is_empty() {
            writeln!(f, "\nWarnings:")?;
            for warning in &self.warnings {
                writeln!(f, "  {warning}")?;
            }
        }
        Ok(())
    }
}

/// Callbacks for reporting progress during a batch.
pub trait SyncProgress: Send + Sync {
    fn on_task_start(&self, _file: &str, _index: usize, _total: usize) {}

    fn on_task_complete(&self, _report: &TaskReport) {}
}

/// Progress reporter that ignores all events.
pub struct NoopProgress;

impl SyncProgress for NoopProgress {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::conflict::ConflictKind;

    fn task(file: &str, issue: u64, outcome: TaskOutcome) -> TaskReport {
        TaskReport {
            file: file.to_string(),
            path: PathBuf::from(file),
            issue_number: Some(issue),
            outcome,
            dry_run: false,
        }
    }

    fn conflict_outcome() -> TaskOutcome {
        TaskOutcome::Conflict {
            conflict: Conflict {
                kind: ConflictKind::ManualReview,
                local_state: TaskState::Ready,
                remote_state: TaskState::InProgress,
                description: "State mismatch: local=ready, github=in-progress".into(),
            },
            marker_added: true,
        }
    }

    #[test]
    fn test_counts_and_status() {
        let mut report = SyncReport::new("acme/widgets", false);
        assert_eq!(report.status(), SyncStatus::Clean);

        report.push(task("a.md", 1, TaskOutcome::NoChange));
        report.push(task("b.md", 2, TaskOutcome::KeptLocal));
        assert_eq!(report.counts.no_change, 2);
        assert_eq!(report.status(), SyncStatus::Clean);

        report.push(task("c.md", 3, conflict_outcome()));
        assert_eq!(report.status(), SyncStatus::NeedsReview);
        assert!(!report.has_errors());

        report.push(task(
            "d.md",
            4,
            TaskOutcome::Error {
                category: ErrorCategory::NotFound,
                message: "gone".into(),
            },
        ));
        assert_eq!(report.status(), SyncStatus::Failed);
        assert!(report.has_errors());
        assert_eq!(report.counts.total(), 4);
    }

    #[test]
    fn test_render_text() {
        let mut report = SyncReport::new("acme/widgets", true);
        report.push(task(
            "a.md",
            1,
            TaskOutcome::Updated {
                from: TaskState::Ready,
                to: TaskState::Completed,
                resolved_conflict: false,
            },
        ));
        report.push(task("b.md", 2, conflict_outcome()));
        report.warn("Issue #2 is linked from 2 files: b.md, c.md");

        let text = report.render_text();
        assert!(text.contains("Mode:      dry run"));
        assert!(text.contains("Status:    needs_review"));
        assert!(text.contains("a.md (#1): ready -> completed"));
        assert!(text.contains("b.md (#2): State mismatch"));
        assert!(text.contains("Issue #2 is linked from 2 files"));
        assert!(!text.contains("Errors:\n"));
    }

    #[test]
    fn test_json_shape() {
        let mut report = SyncReport::new("acme/widgets", false);
        report.push(task(
            "a.md",
            1,
            TaskOutcome::Skipped {
                reason: SkipReason::NoRemoteLink,
            },
        ));
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(value["status"], "clean");
        assert_eq!(value["counts"]["skipped"], 1);
        assert_eq!(value["tasks"][0]["outcome"], "skipped");
        assert_eq!(value["tasks"][0]["reason"], "no_remote_link");
        assert_eq!(value["tasks"][0]["issue_number"], 1);
    }
}
