use std::cmp::Ordering;

use serde::Serialize;

use crate::date_util::parse_timestamp;
use crate::model::{RemoteIssueSnapshot, TaskRecord, TaskState};

/// Finalized local states that must not silently follow a reopened issue.
const INCOMPATIBLE_TRANSITIONS: &[(TaskState, TaskState)] = &[
    (TaskState::Completed, TaskState::Ready),
    (TaskState::Cancelled, TaskState::Ready),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    None,
    LocalNewer,
    RemoteNewer,
    Incompatible,
    ManualReview,
}

impl ConflictKind {
    pub const ALL: [ConflictKind; 5] = [
        ConflictKind::None,
        ConflictKind::LocalNewer,
        ConflictKind::RemoteNewer,
        ConflictKind::Incompatible,
        ConflictKind::ManualReview,
    ];
}

/// A local/remote state comparison. `description` is for humans only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub local_state: TaskState,
    pub remote_state: TaskState,
    pub description: String,
}

impl Conflict {
    pub fn is_none(&self) -> bool {
        self.kind == ConflictKind::None
    }
}

/// Compare a task record with the state its remote issue maps to.
///
/// Checks run in a fixed order: equal states short-circuit, then the
/// incompatible-transition table, then timestamps. Anything left over needs
/// a human.
pub fn detect(
    record: &TaskRecord,
    snapshot: &RemoteIssueSnapshot,
    remote_state: TaskState,
) -> Conflict {
    let local_state = record.state;
    let conflict = |kind, description: String| Conflict {
        kind,
        local_state,
        remote_state,
        description,
    };

    if local_state == remote_state {
        return conflict(
            ConflictKind::None,
            format!("Both sides are {local_state}"),
        );
    }

    if INCOMPATIBLE_TRANSITIONS.contains(&(local_state, remote_state)) {
        return conflict(
            ConflictKind::Incompatible,
            format!(
                "Local task is {local_state} but issue #{} is {}",
                snapshot.issue_id, snapshot.state
            ),
        );
    }

    match compare_timestamps(record, snapshot) {
        Some(Ordering::Greater) => conflict(
            ConflictKind::LocalNewer,
            "Local changes are newer than GitHub updates".to_string(),
        ),
        Some(Ordering::Less) => conflict(
            ConflictKind::RemoteNewer,
            "GitHub changes are newer than local sync".to_string(),
        ),
        Some(Ordering::Equal) | None => conflict(
            ConflictKind::ManualReview,
            format!("State mismatch: local={local_state}, github={remote_state}"),
        ),
    }
}

/// `None` when either side is missing or unparseable.
fn compare_timestamps(record: &TaskRecord, snapshot: &RemoteIssueSnapshot) -> Option<Ordering> {
    let synced = parse_timestamp(record.last_synced_at.as_deref()?)?;
    let updated = parse_timestamp(snapshot.updated_at.as_deref()?)?;
    Some(synced.cmp(&updated))
}
