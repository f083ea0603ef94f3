use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::config::{AuthConfig, Config};
use crate::error::{Error, Result};
use crate::github::RepoRef;

/// A GitHub token plus the optional defaults stored alongside it.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: Option<String>,
    pub token: String,
    pub default_owner: Option<String>,
    pub default_repo: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .field("default_owner", &self.default_owner)
            .field("default_repo", &self.default_repo)
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
struct CredentialsFile {
    #[serde(default)]
    github: CredentialsSection,
}

#[derive(Debug, Default, Deserialize)]
struct CredentialsSection {
    username: Option<String>,
    personal_access_token: Option<String>,
    #[serde(default)]
    default_repository: DefaultRepository,
}

#[derive(Debug, Default, Deserialize)]
struct DefaultRepository {
    owner: Option<String>,
    name: Option<String>,
}

/// Credentials file locations, in lookup order.
pub fn credentials_paths(auth: &AuthConfig) -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(&auth.credentials_file)];
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".tasksync").join("github-credentials.json"));
    }
    paths
}

/// Resolve credentials: credentials file first, then the token env var.
pub fn load(auth: &AuthConfig) -> Result<Credentials> {
    load_with(auth, &credentials_paths(auth), |key| std::env::var(key).ok())
}

pub fn load_with(
    auth: &AuthConfig,
    paths: &[PathBuf],
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Credentials> {
    for path in paths {
        if let Some(credentials) = load_file(path)? {
            log::debug!("Using credentials from {}", path.display());
            return Ok(credentials);
        }
    }

    if let Some(token) = lookup(&auth.token_env_var).filter(|t| !t.trim().is_empty()) {
        log::debug!("Using token from ${}", auth.token_env_var);
        return Ok(Credentials {
            username: None,
            token: token.trim().to_string(),
            default_owner: None,
            default_repo: None,
        });
    }

    Err(Error::Auth(format!(
        "no GitHub credentials found: create {} or set ${}",
        auth.credentials_file, auth.token_env_var
    )))
}

/// `Ok(None)` when the file is absent or carries no token.
fn load_file(path: &Path) -> Result<Option<Credentials>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path)?;
    let parsed: CredentialsFile = match serde_json::from_str(&contents) {
        Ok(parsed) => parsed,
        Err(e) => {
            log::warn!("Invalid credentials file {}: {e}", path.display());
            return Ok(None);
        }
    };
    let section = parsed.github;
    let Some(token) = section
        .personal_access_token
        .filter(|t| !t.trim().is_empty())
    else {
        return Ok(None);
    };
    Ok(Some(Credentials {
        username: section.username,
        token,
        default_owner: section.default_repository.owner,
        default_repo: section.default_repository.name,
    }))
}

/// Pick the target repository: explicit flag, then configuration, then the
/// defaults stored with the credentials.
pub fn resolve_repository(
    explicit: Option<&str>,
    config: &Config,
    credentials: Option<&Credentials>,
) -> Result<RepoRef> {
    if let Some(raw) = explicit {
        return RepoRef::parse(raw);
    }
    let configured = &config.github.default_repository;
    if let (Some(owner), Some(name)) = (&configured.owner, &configured.name) {
        return Ok(RepoRef::new(owner, name));
    }
    if let Some(Credentials {
        default_owner: Some(owner),
        default_repo: Some(name),
        ..
    }) = credentials
    {
        return Ok(RepoRef::new(owner, name));
    }
    Err(Error::Config(
        "no repository configured: pass --repo owner/name or set github.default_repository"
            .to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_creds(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("github-credentials.json");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_file_takes_precedence_over_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_creds(
            dir.path(),
            r#"{"github": {"username": "octo", "personal_access_token": "file-token",
                "default_repository": {"owner": "acme", "name": "widgets"}}}"#,
        );
        let creds = load_with(&AuthConfig::default(), &[path], |_| Some("env-token".into()))
            .unwrap();
        assert_eq!(creds.token, "file-token");
        assert_eq!(creds.username.as_deref(), Some("octo"));
        assert_eq!(creds.default_owner.as_deref(), Some("acme"));
    }

    #[test]
    fn test_env_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        let creds = load_with(&AuthConfig::default(), &[missing], |key| {
            (key == "GITHUB_TOKEN").then(|| " env-token \n".to_string())
        })
        .unwrap();
        assert_eq!(creds.token, "env-token");
    }

    #[test]
    fn test_invalid_file_falls_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_creds(dir.path(), "{broken");
        let creds =
            load_with(&AuthConfig::default(), &[path], |_| Some("env-token".into())).unwrap();
        assert_eq!(creds.token, "env-token");
    }

    #[test]
    fn test_nothing_found_is_auth_error() {
        let err = load_with(&AuthConfig::default(), &[], |_| None).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_debug_redacts_token() {
        let creds = Credentials {
            username: None,
            token: "secret".into(),
            default_owner: None,
            default_repo: None,
        };
        assert!(!format!("{creds:?}").contains("secret"));
    }

    #[test]
    fn test_resolve_repository_order() {
        let mut config = Config::default();
        let creds = Credentials {
            username: None,
            token: "t".into(),
            default_owner: Some("cred-owner".into()),
            default_repo: Some("cred-repo".into()),
        };

        assert_eq!(
            resolve_repository(None, &config, Some(&creds)).unwrap(),
            RepoRef::new("cred-owner", "cred-repo")
        );

        config.github.default_repository.owner = Some("cfg-owner".into());
        config.github.default_repository.name = Some("cfg-repo".into());
        assert_eq!(
            resolve_repository(None, &config, Some(&creds)).unwrap(),
            RepoRef::new("cfg-owner", "cfg-repo")
        );

        assert_eq!(
            resolve_repository(Some("flag/repo"), &config, Some(&creds)).unwrap(),
            RepoRef::new("flag", "repo")
        );
    }

    #[test]
    fn test_resolve_repository_missing() {
        assert!(matches!(
            resolve_repository(None, &Config::default(), None),
            Err(Error::Config(_))
        ));
    }
}
