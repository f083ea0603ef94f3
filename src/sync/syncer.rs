use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::date_util::now_timestamp;
use crate::error::{Error, Result};
use crate::github::{IssueTracker, RepoRef};
use crate::model::{RemoteIssueSnapshot, TaskRecord, TaskState};
use crate::sync::conflict::{self, Conflict, ConflictKind};
use crate::sync::mapper::StateMapper;
use crate::sync::resolve::{self, ResolutionAction, ResolutionPolicy};
use crate::sync::{
    NoopProgress, SkipReason, SyncOptions, SyncProgress, SyncReport, TaskOutcome, TaskReport,
};
use crate::task_file::{discovery, FieldUpdates, TaskStore};

/// Pulls remote issue state into local task files.
pub struct Syncer<'a> {
    tracker: &'a dyn IssueTracker,
    store: &'a dyn TaskStore,
    repo: RepoRef,
    options: SyncOptions,
    mapper: StateMapper,
    policy: ResolutionPolicy,
    backup: bool,
    progress: &'a dyn SyncProgress,
}

impl<'a> Syncer<'a> {
    pub fn new(
        tracker: &'a dyn IssueTracker,
        store: &'a dyn TaskStore,
        config: &Config,
        repo: RepoRef,
        options: SyncOptions,
    ) -> Self {
        let behavior = &config.github.sync_behavior;
        Self {
            tracker,
            store,
            repo,
            options,
            mapper: StateMapper::from_config(behavior),
            policy: behavior.conflict_resolution,
            backup: config.github.file_handling.backup_before_sync,
            progress: &NoopProgress,
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn SyncProgress) -> Self {
        self.progress = progress;
        self
    }

    pub fn repo(&self) -> &RepoRef {
        &self.repo
    }

    /// Run the per-task protocol: fetch, map, detect, resolve, apply.
    ///
    /// Every failure becomes an `error` outcome except a fatal one
    /// (authentication), which is returned as `Err` so the run can stop.
    pub async fn sync_record(&self, record: &TaskRecord) -> Result<TaskOutcome> {
        let Some(issue_id) = record.linked_issue_id else {
            log::debug!("{} has no linked issue, skipping", record.file_name());
            return Ok(TaskOutcome::Skipped {
                reason: SkipReason::NoRemoteLink,
            });
        };

        let snapshot = match self.tracker.get_issue(&self.repo, issue_id).await {
            Ok(issue) => issue.snapshot(),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                log::warn!("Could not fetch issue #{issue_id} for {}: {e}", record.file_name());
                return Ok(TaskOutcome::error(&e));
            }
        };

        let remote_state = self.mapper.map(snapshot.state, &snapshot.assignees);
        let conflict = conflict::detect(record, &snapshot, remote_state);
        let action = resolve::resolve(&conflict, self.policy);
        log::debug!(
            "{}: local={} remote={} conflict={:?} action={action:?}",
            record.file_name(),
            record.state,
            remote_state,
            conflict.kind
        );

        match self.apply(record, &snapshot, conflict, action) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                log::warn!("Could not update {}: {e}", record.file_name());
                Ok(TaskOutcome::error(&e))
            }
        }
    }

    fn apply(
        &self,
        record: &TaskRecord,
        snapshot: &RemoteIssueSnapshot,
        conflict: Conflict,
        action: ResolutionAction,
    ) -> Result<TaskOutcome> {
        let dry_run = self.options.dry_run;
        match action {
            ResolutionAction::NoChange => Ok(TaskOutcome::NoChange),
            ResolutionAction::AdoptRemote(to) => {
                let entering_completed = to == TaskState::Completed && record.state != to;
                let updates = FieldUpdates {
                    state: Some(to),
                    last_synced: Some(now_timestamp()),
                    completed_date: snapshot.closed_at.clone().filter(|_| entering_completed),
                };
                if !dry_run {
                    self.store.write(&record.path, &updates, self.backup)?;
                }
                log::info!("Updated {}: {} -> {to}", record.file_name(), record.state);
                Ok(TaskOutcome::Updated {
                    from: record.state,
                    to,
                    resolved_conflict: conflict.kind != ConflictKind::RemoteNewer,
                })
            }
            ResolutionAction::KeepLocal => {
                // A local-newer conflict already has a fresh `Last Synced`;
                // rewriting it would make every rerun touch the file.
                if !dry_run && conflict.kind != ConflictKind::LocalNewer {
                    let updates = FieldUpdates {
                        last_synced: Some(now_timestamp()),
                        ..Default::default()
                    };
                    self.store.write(&record.path, &updates, self.backup)?;
                }
                log::info!(
                    "Kept local state {} for {} (issue maps to {})",
                    record.state,
                    record.file_name(),
                    conflict.remote_state
                );
                Ok(TaskOutcome::KeptLocal)
            }
            ResolutionAction::MarkForReview => {
                let marker_added = if dry_run {
                    false
                } else {
                    self.store.mark_for_review(&record.path, &conflict)?
                };
                log::warn!(
                    "Conflict in {}: {}",
                    record.file_name(),
                    conflict.description
                );
                Ok(TaskOutcome::Conflict {
                    conflict,
                    marker_added,
                })
            }
        }
    }

    /// Read one file and sync it. Read failures become an `error` outcome.
    pub async fn sync_file(&self, path: &Path) -> Result<TaskReport> {
        let file = file_name(path);
        let (issue_number, outcome) = match self.store.read(path) {
            Ok(record) => (record.linked_issue_id, self.sync_record(&record).await?),
            Err(e) => {
                log::warn!("Could not read {}: {e}", path.display());
                (None, TaskOutcome::error(&e))
            }
        };
        Ok(TaskReport {
            file,
            path: path.to_path_buf(),
            issue_number,
            outcome,
            dry_run: self.options.dry_run,
        })
    }

    /// Sync each file independently. Duplicate issue links are reported as
    /// warnings; both files are still processed. An authentication failure
    /// stops the batch and is returned as the error.
    pub async fn sync_files(&self, paths: &[PathBuf]) -> Result<SyncReport> {
        let mut report = SyncReport::new(self.repo.to_string(), self.options.dry_run);
        let total = paths.len();
        for (index, path) in paths.iter().enumerate() {
            let file = file_name(path);
            self.progress.on_task_start(&file, index, total);
            let task = match self.sync_file(path).await {
                Ok(task) => task,
                Err(e) => {
                    log::error!("Aborting sync at {file} ({}/{total}): {e}", index + 1);
                    return Err(e);
                }
            };
            self.progress.on_task_complete(&task);
            report.push(task);
        }
        for warning in duplicate_link_warnings(&report.tasks) {
            report.warn(warning);
        }
        Ok(report)
    }

    pub async fn sync_directory(&self, dir: &Path) -> Result<SyncReport> {
        let paths = discovery::find_linked_task_files(dir)?;
        if paths.is_empty() {
            log::info!("No linked task files in {}", dir.display());
        }
        self.sync_files(&paths).await
    }

    /// Sync the `tasks/` directory of a project.
    pub async fn sync_project(&self, project_dir: &Path) -> Result<SyncReport> {
        self.sync_directory(&discovery::project_tasks_dir(project_dir))
            .await
    }

    /// Sync the task file linked to issue `number`, searching `dirs` in order.
    pub async fn sync_issue(&self, number: u64, dirs: &[PathBuf]) -> Result<SyncReport> {
        let path = discovery::find_task_file_for_issue(dirs, number)?.ok_or_else(|| {
            Error::NotFound(format!("no task file linked to issue #{number}"))
        })?;
        self.sync_files(&[path]).await
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn duplicate_link_warnings(tasks: &[TaskReport]) -> Vec<String> {
    let mut by_issue: BTreeMap<u64, Vec<&str>> = BTreeMap::new();
    for task in tasks {
        if let Some(n) = task.issue_number {
            by_issue.entry(n).or_default().push(&task.file);
        }
    }
    by_issue
        .into_iter()
        .filter(|(_, files)| files.len() > 1)
        .map(|(n, files)| {
            format!(
                "Issue #{n} is linked from {} files: {}",
                files.len(),
                files.join(", ")
            )
        })
        .collect()
}
