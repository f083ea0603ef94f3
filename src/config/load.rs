use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::{Error, Result};
use crate::sync::resolve::ResolutionPolicy;

use super::Config;

pub const CONFIG_FILE_NAME: &str = "github-config.json";

/// Where configuration layers are read from. Later layers win.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Workspace root holding `projects/github-config.json`.
    pub root: PathBuf,
    /// Project directory holding its own `github-config.json`.
    pub project: Option<PathBuf>,
    /// Explicit override file (`--config`).
    pub override_file: Option<PathBuf>,
}

pub fn global_config_path(root: &Path) -> PathBuf {
    root.join("projects").join(CONFIG_FILE_NAME)
}

pub fn project_config_path(project: &Path) -> PathBuf {
    project.join(CONFIG_FILE_NAME)
}

/// Read one JSON layer. A missing file is not an error.
pub fn load_layer(path: &Path) -> Result<Option<Value>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))
}

/// Recursively merge `overlay` into `base`. Objects merge key by key;
/// any other value replaces what was there.
pub fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        merge_values(existing, value);
                    }
                    Some(existing) => *existing = value,
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Build the effective configuration: defaults, then global, project and
/// override layers, then environment overrides.
pub fn load(sources: &ConfigSources) -> Result<Config> {
    let mut merged = serde_json::to_value(Config::default())?;

    let mut layers = vec![global_config_path(&sources.root)];
    if let Some(project) = &sources.project {
        layers.push(project_config_path(project));
    }

    for path in &layers {
        if let Some(layer) = load_layer(path)? {
            log::debug!("Loaded configuration layer {}", path.display());
            merge_values(&mut merged, layer);
        }
    }

    if let Some(path) = &sources.override_file {
        let layer = load_layer(path)?.ok_or_else(|| {
            Error::Config(format!("config file not found: {}", path.display()))
        })?;
        merge_values(&mut merged, layer);
    }

    let mut config: Config = serde_json::from_value(merged)
        .map_err(|e| Error::Config(format!("invalid configuration: {e}")))?;
    apply_env_overrides(&mut config);
    Ok(config)
}

pub fn apply_env_overrides(config: &mut Config) {
    apply_env_overrides_from(config, |key| std::env::var(key).ok());
}

/// Apply `TASKSYNC_*` overrides using the given variable lookup.
pub fn apply_env_overrides_from(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(raw) = lookup("TASKSYNC_CONFLICT_RESOLUTION") {
        match raw.trim().parse::<ResolutionPolicy>() {
            Ok(policy) => config.github.sync_behavior.conflict_resolution = policy,
            Err(e) => log::warn!("invalid TASKSYNC_CONFLICT_RESOLUTION, ignoring: {e}"),
        }
    }

    if let Some(raw) = lookup("TASKSYNC_API_BASE_URL") {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            config.github.api.base_url = trimmed.to_string();
        }
    }
}

/// Find the project directory for a tasks directory laid out as
/// `.../projects/<name>/...`.
pub fn infer_project_dir(dir: &Path) -> Option<PathBuf> {
    let components: Vec<_> = dir.components().collect();
    let idx = components
        .iter()
        .position(|c| c.as_os_str() == "projects")?;
    if idx + 1 >= components.len() {
        return None;
    }
    Some(components[..idx + 2].iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TaskState;
    use serde_json::json;

    #[test]
    fn test_merge_nested() {
        let mut base = json!({"github": {"api": {"timeout": 30, "max_retries": 3}}});
        merge_values(&mut base, json!({"github": {"api": {"timeout": 10}}}));
        assert_eq!(base, json!({"github": {"api": {"timeout": 10, "max_retries": 3}}}));
    }

    #[test]
    fn test_merge_replaces_non_objects() {
        let mut base = json!({"labels": ["a", "b"], "x": {"y": 1}});
        merge_values(&mut base, json!({"labels": ["c"], "x": 5}));
        assert_eq!(base, json!({"labels": ["c"], "x": 5}));
    }

    #[test]
    fn test_load_defaults_only() {
        let dir = tempfile::tempdir().unwrap();
        let sources = ConfigSources {
            root: dir.path().to_path_buf(),
            ..Default::default()
        };
        let config = load(&sources).unwrap();
        assert_eq!(config.github.api.max_retries, 3);
    }

    #[test]
    fn test_load_layers_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let projects = dir.path().join("projects");
        let project = projects.join("alpha");
        fs::create_dir_all(&project).unwrap();
        fs::write(
            projects.join(CONFIG_FILE_NAME),
            r#"{"github": {"default_repository": {"owner": "acme", "name": "global"},
                           "api": {"timeout": 5}}}"#,
        )
        .unwrap();
        fs::write(
            project.join(CONFIG_FILE_NAME),
            r#"{"github": {"default_repository": {"name": "alpha-repo"},
                           "sync_behavior": {"state_mapping": {"issue_to_task": {"closed": "cancelled"}}}}}"#,
        )
        .unwrap();

        let sources = ConfigSources {
            root: dir.path().to_path_buf(),
            project: Some(project),
            override_file: None,
        };
        let config = load(&sources).unwrap();
        assert_eq!(config.github.default_repository.owner.as_deref(), Some("acme"));
        assert_eq!(config.github.default_repository.name.as_deref(), Some("alpha-repo"));
        assert_eq!(config.github.api.timeout, 5);
        assert_eq!(
            config.github.sync_behavior.state_mapping.issue_to_task.closed,
            TaskState::Cancelled
        );
        assert_eq!(
            config.github.sync_behavior.state_mapping.issue_to_task.open,
            TaskState::Ready
        );
    }

    #[test]
    fn test_override_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let sources = ConfigSources {
            root: dir.path().to_path_buf(),
            project: None,
            override_file: Some(dir.path().join("missing.json")),
        };
        assert!(matches!(load(&sources), Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(load_layer(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        apply_env_overrides_from(&mut config, |key| match key {
            "TASKSYNC_CONFLICT_RESOLUTION" => Some("github_wins".to_string()),
            "TASKSYNC_API_BASE_URL" => Some("http://localhost:9000".to_string()),
            _ => None,
        });
        assert_eq!(
            config.github.sync_behavior.conflict_resolution,
            ResolutionPolicy::RemoteWins
        );
        assert_eq!(config.github.api.base_url, "http://localhost:9000");
    }

    #[test]
    fn test_env_override_invalid_policy_ignored() {
        let mut config = Config::default();
        apply_env_overrides_from(&mut config, |key| {
            (key == "TASKSYNC_CONFLICT_RESOLUTION").then(|| "coin_flip".to_string())
        });
        assert_eq!(
            config.github.sync_behavior.conflict_resolution,
            ResolutionPolicy::Manual
        );
    }

    #[test]
    fn test_infer_project_dir() {
        assert_eq!(
            infer_project_dir(Path::new("docs/projects/alpha/tasks")),
            Some(PathBuf::from("docs/projects/alpha"))
        );
        assert_eq!(infer_project_dir(Path::new("docs/projects")), None);
        assert_eq!(infer_project_dir(Path::new("tasks")), None);
    }
}
