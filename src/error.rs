use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("GitHub authentication failed: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Transient GitHub error: {0}")]
    Transient(String),

    #[error("GitHub API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Task file error for {}: {message}", path.display())]
    TaskFile { path: PathBuf, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid repository: {0}")]
    InvalidRepo(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse error classes used in run reports and for abort decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Auth,
    NotFound,
    Transient,
    Storage,
    Config,
    Api,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Auth => "auth",
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::Transient => "transient",
            ErrorCategory::Storage => "storage",
            ErrorCategory::Config => "config",
            ErrorCategory::Api => "api",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    pub fn task_file(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::TaskFile {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Auth(_) => ErrorCategory::Auth,
            Error::NotFound(_) => ErrorCategory::NotFound,
            Error::Transient(_) => ErrorCategory::Transient,
            Error::Api { .. } | Error::Json(_) => ErrorCategory::Api,
            Error::TaskFile { .. } | Error::Io(_) => ErrorCategory::Storage,
            Error::InvalidRepo(_) | Error::Config(_) => ErrorCategory::Config,
        }
    }

    /// Authentication failures end the whole run; nothing after them can succeed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Auth(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() || e.is_request() {
            return Error::Transient(e.to_string());
        }
        match e.status() {
            Some(status) => Error::Api {
                status: status.as_u16(),
                message: e.to_string(),
            },
            None => Error::Transient(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(Error::Auth("x".into()).category(), ErrorCategory::Auth);
        assert_eq!(Error::NotFound("x".into()).category(), ErrorCategory::NotFound);
        assert_eq!(
            Error::task_file("a.md", "bad").category(),
            ErrorCategory::Storage
        );
        assert_eq!(
            Error::Api { status: 422, message: "x".into() }.category(),
            ErrorCategory::Api
        );
    }

    #[test]
    fn test_only_auth_is_fatal() {
        assert!(Error::Auth("bad token".into()).is_fatal());
        assert!(!Error::Transient("timeout".into()).is_fatal());
        assert!(!Error::NotFound("#3".into()).is_fatal());
    }

    #[test]
    fn test_task_file_display() {
        let e = Error::task_file("tasks/T001.md", "missing State field");
        assert_eq!(
            e.to_string(),
            "Task file error for tasks/T001.md: missing State field"
        );
    }
}
