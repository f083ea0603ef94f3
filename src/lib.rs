pub mod config;
pub mod credentials;
pub mod date_util;
pub mod error;
pub mod github;
pub mod model;
pub mod publish;
pub mod sync;
pub mod task_file;

#[cfg(test)]
mod fakes;

use std::path::{Path, PathBuf};

pub use config::Config;
pub use error::{Error, ErrorCategory, Result};
pub use github::{GitHubClient, IssueTracker, RepoRef};
pub use model::{IssueState, RemoteIssueSnapshot, TaskRecord, TaskState};
pub use publish::{PublishOutcome, PublishReport, Publisher};
pub use sync::resolve::ResolutionPolicy;
pub use sync::syncer::Syncer;
pub use sync::{NoopProgress, SyncOptions, SyncProgress, SyncReport, SyncStatus, TaskOutcome};
pub use task_file::{MarkdownTaskStore, TaskStore};

/// Main entry point: markdown task files in the working tree synced with
/// the issues of one GitHub repository.
pub struct TaskSync {
    config: Config,
    client: GitHubClient,
    repo: RepoRef,
    store: MarkdownTaskStore,
}

impl TaskSync {
    pub fn new(config: Config, client: GitHubClient, repo: RepoRef) -> Self {
        Self {
            config,
            client,
            repo,
            store: MarkdownTaskStore::new(),
        }
    }

    /// Resolve credentials and the target repository, then build a client.
    /// `repo` is the `--repo` value, if any.
    pub fn connect(config: Config, repo: Option<&str>) -> Result<Self> {
        let creds = credentials::load(&config.github.authentication)?;
        let repo = credentials::resolve_repository(repo, &config, Some(&creds))?;
        let client = GitHubClient::new(creds.token.clone(), &config.github.api)?;
        log::debug!("Using repository {repo}");
        Ok(Self::new(config, client, repo))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn repo(&self) -> &RepoRef {
        &self.repo
    }

    /// Check the token against GitHub and return the account login.
    pub async fn verify_token(&self) -> Result<String> {
        let login = self.client.authenticated_user().await?;
        log::info!("Authenticated as {login}");
        Ok(login)
    }

    fn syncer<'a>(&'a self, options: SyncOptions, progress: &'a dyn SyncProgress) -> Syncer<'a> {
        Syncer::new(
            &self.client,
            &self.store,
            &self.config,
            self.repo.clone(),
            options,
        )
        .with_progress(progress)
    }

    fn publisher<'a>(
        &'a self,
        options: SyncOptions,
        progress: &'a dyn SyncProgress,
    ) -> Publisher<'a> {
        Publisher::new(
            &self.client,
            &self.store,
            &self.config,
            self.repo.clone(),
            options,
        )
        .with_progress(progress)
    }

    // ── Sync commands ──────────────────────────────────────────────

    pub async fn sync_file(
        &self,
        path: &Path,
        options: SyncOptions,
        progress: &dyn SyncProgress,
    ) -> Result<SyncReport> {
        if !path.is_file() {
            return Err(Error::task_file(path, "file not found"));
        }
        self.syncer(options, progress)
            .sync_files(&[path.to_path_buf()])
            .await
    }

    pub async fn sync_directory(
        &self,
        dir: &Path,
        options: SyncOptions,
        progress: &dyn SyncProgress,
    ) -> Result<SyncReport> {
        self.syncer(options, progress).sync_directory(dir).await
    }

    pub async fn sync_project(
        &self,
        project_dir: &Path,
        options: SyncOptions,
        progress: &dyn SyncProgress,
    ) -> Result<SyncReport> {
        self.syncer(options, progress).sync_project(project_dir).await
    }

    pub async fn sync_issue(
        &self,
        number: u64,
        search_dirs: &[PathBuf],
        options: SyncOptions,
        progress: &dyn SyncProgress,
    ) -> Result<SyncReport> {
        self.syncer(options, progress)
            .sync_issue(number, search_dirs)
            .await
    }

    // ── Publish commands ───────────────────────────────────────────

    pub async fn publish_file(
        &self,
        path: &Path,
        options: SyncOptions,
        progress: &dyn SyncProgress,
    ) -> Result<PublishReport> {
        if !path.is_file() {
            return Err(Error::task_file(path, "file not found"));
        }
        self.publisher(options, progress)
            .publish_files(&[path.to_path_buf()])
            .await
    }

    pub async fn publish_directory(
        &self,
        dir: &Path,
        options: SyncOptions,
        progress: &dyn SyncProgress,
    ) -> Result<PublishReport> {
        self.publisher(options, progress).publish_directory(dir).await
    }

    pub async fn publish_project(
        &self,
        project_dir: &Path,
        options: SyncOptions,
        progress: &dyn SyncProgress,
    ) -> Result<PublishReport> {
        self.publisher(options, progress)
            .publish_project(project_dir)
            .await
    }
}
