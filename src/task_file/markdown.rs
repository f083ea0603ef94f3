//! Text-level reading and editing of markdown task files.
//!
//! Metadata lives in `**Key:** value` lines, usually in a block right below
//! the title. Edits touch only the targeted lines; everything else in the
//! file is left byte-for-byte as it was.

use std::path::Path;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::error::{Error, Result};
use crate::model::{TaskRecord, TaskState};
use crate::sync::conflict::Conflict;

pub const FIELD_STATE: &str = "State";
pub const FIELD_GITHUB_ISSUE: &str = "GitHub Issue";
pub const FIELD_ISSUE_URL: &str = "Issue URL";
pub const FIELD_LAST_SYNCED: &str = "Last Synced";
pub const FIELD_COMPLETED_DATE: &str = "Completed Date";
pub const FIELD_PRIORITY: &str = "Priority";
pub const FIELD_EFFORT: &str = "Estimated Effort";
pub const FIELD_LABELS: &str = "Labels";
pub const FIELD_ASSIGNEES: &str = "Assignees";

pub const CONFLICT_MARKER: &str = "<!-- SYNC CONFLICT DETECTED -->";

static RE_TITLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^#[ \t]+(.+?)[ \t]*$").unwrap());
static RE_ISSUE_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\*\*Issue:\*\*[ \t]*(.+?)[ \t]*$").unwrap());
static RE_LINKED_ISSUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*GitHub Issue:\*\*[ \t]*#?(\d+)").unwrap());
/// A `**Label:** value` line: list-item prefix, label, value.
static RE_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^([ \t]*(?:[-*+][ \t]+)?)\*\*([^*\r\n]+?):\*\*[ \t]*(.*?)[ \t]*\r?$").unwrap()
});

/// Everything a task file says that the sync and publish flows care about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDocument {
    pub record: TaskRecord,
    /// Content without the title heading.
    pub body: String,
    pub priority: Option<String>,
    pub effort: Option<String>,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
    pub issue_url: Option<String>,
}

/// Field-level changes for [`apply_updates`]. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldUpdates {
    pub state: Option<TaskState>,
    pub last_synced: Option<String>,
    pub completed_date: Option<String>,
}

impl FieldUpdates {
    pub fn is_empty(&self) -> bool {
        self.state.is_none() && self.last_synced.is_none() && self.completed_date.is_none()
    }
}

/// First metadata line whose label is exactly `label`.
fn find_field<'c>(content: &'c str, label: &str) -> Option<Captures<'c>> {
    RE_FIELD.captures_iter(content).find(|caps| &caps[2] == label)
}

/// Value of the first `**label:**` line, if present and non-empty.
pub fn field_value(content: &str, label: &str) -> Option<String> {
    find_field(content, label)
        .map(|caps| caps[3].to_string())
        .filter(|v| !v.is_empty())
}

fn list_value(content: &str, label: &str) -> Vec<String> {
    field_value(content, label)
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

pub fn linked_issue_number(content: &str) -> Option<u64> {
    RE_LINKED_ISSUE
        .captures(content)
        .and_then(|caps| caps[1].parse().ok())
}

pub fn has_linked_issue(content: &str) -> bool {
    RE_LINKED_ISSUE.is_match(content)
}

pub fn has_conflict_marker(content: &str) -> bool {
    content.contains(CONFLICT_MARKER)
}

pub fn title(content: &str) -> Option<String> {
    RE_TITLE
        .captures(content)
        .or_else(|| RE_ISSUE_TITLE.captures(content))
        .map(|caps| caps[1].to_string())
}

pub fn parse_document(path: &Path, content: &str) -> Result<TaskDocument> {
    let raw_state = field_value(content, FIELD_STATE)
        .ok_or_else(|| Error::task_file(path, "missing **State:** field"))?;
    let state = raw_state
        .parse::<TaskState>()
        .map_err(|e| Error::task_file(path, e))?;

    let title = title(content).unwrap_or_else(|| {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    });

    let body = match RE_TITLE.find(content) {
        Some(m) => format!("{}{}", &content[..m.start()], &content[m.end()..]),
        None => content.to_string(),
    };

    Ok(TaskDocument {
        record: TaskRecord {
            path: path.to_path_buf(),
            title,
            state,
            linked_issue_id: linked_issue_number(content),
            last_synced_at: field_value(content, FIELD_LAST_SYNCED),
            completed_date: field_value(content, FIELD_COMPLETED_DATE),
        },
        body: body.trim().to_string(),
        priority: field_value(content, FIELD_PRIORITY),
        effort: field_value(content, FIELD_EFFORT),
        labels: list_value(content, FIELD_LABELS),
        assignees: list_value(content, FIELD_ASSIGNEES),
        issue_url: field_value(content, FIELD_ISSUE_URL),
    })
}

fn is_metadata_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    let trimmed = trimmed
        .strip_prefix("- ")
        .or_else(|| trimmed.strip_prefix("* "))
        .or_else(|| trimmed.strip_prefix("+ "))
        .unwrap_or(trimmed);
    trimmed.starts_with("**") && trimmed.contains(":**")
}

/// Line index just past the first metadata block. Without one, the line
/// after the title heading; without that, the top of the file.
fn metadata_insert_index(lines: &[&str]) -> usize {
    let mut insert_idx = None;
    for (i, line) in lines.iter().enumerate() {
        if is_metadata_line(line) {
            insert_idx = Some(i + 1);
        } else if insert_idx.is_some() {
            break;
        }
    }
    insert_idx.unwrap_or_else(|| {
        lines
            .iter()
            .position(|l| RE_TITLE.is_match(l))
            .map(|i| i + 1)
            .unwrap_or(0)
    })
}

fn insert_lines(content: &str, index: usize, new_lines: &[String]) -> String {
    let crlf = content.contains("\r\n");
    let mut lines: Vec<&str> = content.split('\n').collect();
    let index = index.min(lines.len());
    let owned: Vec<String> = new_lines
        .iter()
        .map(|l| if crlf { format!("{l}\r") } else { l.clone() })
        .collect();
    for (offset, line) in owned.iter().enumerate() {
        lines.insert(index + offset, line);
    }
    lines.join("\n")
}

/// Replace the first `**label:**` line, or add one at the end of the
/// metadata block.
pub fn set_field(content: &str, label: &str, value: &str) -> String {
    if let Some(caps) = find_field(content, label) {
        let whole = &caps[0];
        let cr = if whole.ends_with('\r') { "\r" } else { "" };
        let (start, end) = caps.get(0).map_or((0, 0), |m| (m.start(), m.end()));
        return format!(
            "{}{}**{label}:** {value}{cr}{}",
            &content[..start],
            &caps[1],
            &content[end..]
        );
    }
    let lines: Vec<&str> = content.split('\n').collect();
    let index = metadata_insert_index(&lines);
    insert_lines(content, index, &[format!("**{label}:** {value}")])
}

/// Replace `label`, or add it right after the `anchor` line (falling back
/// to the metadata block).
pub fn set_field_after(content: &str, label: &str, value: &str, anchor: &str) -> String {
    if find_field(content, label).is_some() {
        return set_field(content, label, value);
    }
    let lines: Vec<&str> = content.split('\n').collect();
    match lines.iter().position(|l| find_field(l, anchor).is_some()) {
        Some(i) => insert_lines(content, i + 1, &[format!("**{label}:** {value}")]),
        None => set_field(content, label, value),
    }
}

pub fn apply_updates(content: &str, updates: &FieldUpdates) -> String {
    let mut updated = content.to_string();
    if let Some(state) = updates.state {
        updated = set_field(&updated, FIELD_STATE, state.as_str());
    }
    if let Some(ts) = &updates.last_synced {
        updated = set_field(&updated, FIELD_LAST_SYNCED, ts);
    }
    if let Some(date) = &updates.completed_date {
        updated = set_field(&updated, FIELD_COMPLETED_DATE, date);
    }
    updated
}

/// Record the issue link below the `State` line.
pub fn set_issue_link(content: &str, number: u64, url: &str) -> String {
    let linked = set_field_after(content, FIELD_GITHUB_ISSUE, &format!("#{number}"), FIELD_STATE);
    set_field_after(&linked, FIELD_ISSUE_URL, url, FIELD_GITHUB_ISSUE)
}

pub fn conflict_marker(conflict: &Conflict) -> Vec<String> {
    vec![
        String::new(),
        CONFLICT_MARKER.to_string(),
        format!("<!-- Local State: {} -->", conflict.local_state),
        format!("<!-- GitHub State: {} -->", conflict.remote_state),
        format!("<!-- Conflict: {} -->", conflict.description),
        "<!-- Please resolve manually and remove this comment -->".to_string(),
    ]
}

/// Insert a conflict marker below the metadata block. `None` when the file
/// already carries one.
pub fn insert_conflict_marker(content: &str, conflict: &Conflict) -> Option<String> {
    if has_conflict_marker(content) {
        return None;
    }
    let lines: Vec<&str> = content.split('\n').collect();
    let index = metadata_insert_index(&lines);
    Some(insert_lines(content, index, &conflict_marker(conflict)))
}
