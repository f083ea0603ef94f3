use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::task_file::markdown;

/// Markdown files directly inside `dir`, sorted by path.
fn markdown_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(Error::task_file(dir, "not a directory"));
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "md") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn files_matching(dir: &Path, keep: impl Fn(&str) -> bool) -> Result<Vec<PathBuf>> {
    let mut matched = Vec::new();
    for path in markdown_files(dir)? {
        match fs::read_to_string(&path) {
            Ok(content) if keep(&content) => matched.push(path),
            Ok(_) => {}
            Err(e) => log::warn!("Skipping unreadable {}: {e}", path.display()),
        }
    }
    Ok(matched)
}

/// Task files in `dir` that reference a GitHub issue.
pub fn find_linked_task_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let files = files_matching(dir, markdown::has_linked_issue)?;
    log::debug!("Found {} linked task files in {}", files.len(), dir.display());
    Ok(files)
}

/// Task files in `dir` carrying a `State` field, linked or not.
pub fn find_task_files(dir: &Path) -> Result<Vec<PathBuf>> {
    files_matching(dir, |content| {
        markdown::field_value(content, markdown::FIELD_STATE).is_some()
    })
}

/// First task file in `dirs` linked to issue `number`.
pub fn find_task_file_for_issue(dirs: &[PathBuf], number: u64) -> Result<Option<PathBuf>> {
    for dir in dirs.iter().filter(|d| d.is_dir()) {
        for path in markdown_files(dir)? {
            let Ok(content) = fs::read_to_string(&path) else {
                continue;
            };
            if markdown::linked_issue_number(&content) == Some(number) {
                return Ok(Some(path));
            }
        }
    }
    Ok(None)
}

/// Where task files live under a project directory.
pub fn project_tasks_dir(project_dir: &Path) -> PathBuf {
    project_dir.join("tasks")
}

/// Directories searched when only an issue number is known: `<root>/tasks`
/// and every `<root>/projects/*/tasks`.
pub fn default_search_dirs(root: &Path) -> Vec<PathBuf> {
    let mut dirs = vec![root.join("tasks")];
    if let Ok(entries) = fs::read_dir(root.join("projects")) {
        let mut projects: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_dir())
            .map(|p| project_tasks_dir(&p))
            .collect();
        projects.sort();
        dirs.extend(projects);
    }
    dirs
}
