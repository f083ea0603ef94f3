use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, ACCEPT, USER_AGENT};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::github::rate_limit::{backoff_sleep, rate_limit_wait, RetryPolicy};
use crate::github::{Issue, IssuePatch, IssueTracker, NewIssue, RepoRef};

const GITHUB_ACCEPT: &str = "application/vnd.github+json";
const CLIENT_USER_AGENT: &str = concat!("tasksync/", env!("CARGO_PKG_VERSION"));

/// GitHub REST client with bounded retries on transient failures.
pub struct GitHubClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
    retry: RetryPolicy,
}

/// What one HTTP attempt produced.
enum Attempt<T> {
    Done(Result<T>),
    Retry { wait: Option<Duration>, error: Error },
}

#[derive(Debug, Deserialize)]
struct AuthenticatedUser {
    login: String,
}

impl GitHubClient {
    pub fn new(token: impl Into<String>, api: &ApiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(api.timeout.max(1)))
            .build()
            .map_err(|e| Error::Config(format!("cannot build HTTP client: {e}")))?;
        // A trailing slash makes `Url::join` append rather than replace the last segment.
        let mut base = api.base_url.trim_end_matches('/').to_string();
        base.push('/');
        let base_url = Url::parse(&base)
            .map_err(|e| Error::Config(format!("invalid API base URL '{}': {e}", api.base_url)))?;
        Ok(Self {
            http,
            base_url,
            token: token.into(),
            retry: RetryPolicy::from_config(api),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| Error::Config(format!("invalid endpoint '{path}': {e}")))
    }

    fn issues_path(repo: &RepoRef) -> String {
        format!("repos/{}/{}/issues", repo.owner, repo.name)
    }

    /// Login of the account the token belongs to. Also validates the token.
    pub async fn authenticated_user(&self) -> Result<String> {
        let url = self.endpoint("user")?;
        let user: AuthenticatedUser = self.send::<_, ()>(Method::GET, url, None).await?;
        Ok(user.login)
    }

    async fn send<T, B>(&self, method: Method, url: Url, body: Option<&B>) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized + Sync,
    {
        let mut attempt: u32 = 0;
        loop {
            log::debug!("{method} {url} (attempt {})", attempt + 1);
            let mut request = self
                .http
                .request(method.clone(), url.clone())
                .bearer_auth(&self.token)
                .header(ACCEPT, GITHUB_ACCEPT)
                .header(USER_AGENT, CLIENT_USER_AGENT);
            if let Some(body) = body {
                request = request.json(body);
            }

            let outcome = match request.send().await {
                Ok(response) => Self::classify(response).await,
                Err(e) => match Error::from(e) {
                    error @ Error::Transient(_) => Attempt::Retry { wait: None, error },
                    error => Attempt::Done(Err(error)),
                },
            };

            match outcome {
                Attempt::Done(result) => return result,
                Attempt::Retry { wait, error } => {
                    if !self.retry.has_attempts_left(attempt) {
                        return Err(exhausted(&self.retry, &error));
                    }
                    let wait = wait.unwrap_or_else(|| self.retry.backoff(attempt));
                    backoff_sleep(wait, attempt, self.retry.max_attempts, &error.to_string())
                        .await;
                    attempt += 1;
                }
            }
        }
    }

    async fn classify<T: DeserializeOwned>(response: reqwest::Response) -> Attempt<T> {
        let status = response.status();
        let url = response.url().to_string();

        if status.is_success() {
            return Attempt::Done(response.json::<T>().await.map_err(|e| Error::Api {
                status: status.as_u16(),
                message: format!("invalid response body from {url}: {e}"),
            }));
        }

        let wait = rate_limit_from_headers(response.headers());
        let text = response.text().await.unwrap_or_default();
        classify_failure(status, wait, &url, &text)
    }
}

/// Map a non-success status to a final error or a retry. `wait` is the
/// delay the rate-limit headers asked for, if any.
fn classify_failure<T>(
    status: StatusCode,
    wait: Option<Duration>,
    url: &str,
    body: &str,
) -> Attempt<T> {
    match status {
        StatusCode::UNAUTHORIZED => Attempt::Done(Err(Error::Auth(
            "GitHub rejected the token (401)".to_string(),
        ))),
        StatusCode::NOT_FOUND => Attempt::Done(Err(Error::NotFound(format!(
            "repository or issue not found: {url}"
        )))),
        StatusCode::TOO_MANY_REQUESTS => Attempt::Retry {
            wait,
            error: Error::Transient("GitHub rate limit reached (429)".to_string()),
        },
        StatusCode::FORBIDDEN if wait.is_some() => Attempt::Retry {
            wait,
            error: Error::Transient("GitHub rate limit reached (403)".to_string()),
        },
        s if s.is_server_error() => Attempt::Retry {
            wait: None,
            error: Error::Transient(format!("GitHub returned {}", s.as_u16())),
        },
        s => Attempt::Done(Err(Error::Api {
            status: s.as_u16(),
            message: summarize_body(body),
        })),
    }
}

/// The error returned once a retryable failure has used up every attempt.
fn exhausted(retry: &RetryPolicy, last: &Error) -> Error {
    Error::Transient(format!(
        "request failed after {} attempts: {last}",
        retry.max_attempts
    ))
}

fn rate_limit_from_headers(headers: &HeaderMap) -> Option<Duration> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    rate_limit_wait(
        header("retry-after"),
        header("x-ratelimit-remaining"),
        header("x-ratelimit-reset"),
        chrono::Utc::now().timestamp(),
    )
}

/// GitHub error bodies are JSON with a `message`; fall back to the raw text.
fn summarize_body(text: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: String,
    }
    match serde_json::from_str::<ErrorBody>(text) {
        Ok(body) => body.message,
        Err(_) => text.chars().take(200).collect(),
    }
}

#[async_trait]
impl IssueTracker for GitHubClient {
    async fn get_issue(&self, repo: &RepoRef, number: u64) -> Result<Issue> {
        let url = self.endpoint(&format!("{}/{number}", Self::issues_path(repo)))?;
        self.send::<_, ()>(Method::GET, url, None).await
    }

    async fn create_issue(&self, repo: &RepoRef, issue: &NewIssue) -> Result<Issue> {
        let url = self.endpoint(&Self::issues_path(repo))?;
        self.send(Method::POST, url, Some(issue)).await
    }

    async fn update_issue(
        &self,
        repo: &RepoRef,
        number: u64,
        patch: &IssuePatch,
    ) -> Result<Issue> {
        let url = self.endpoint(&format!("{}/{number}", Self::issues_path(repo)))?;
        self.send(Method::PATCH, url, Some(patch)).await
    }
}
