use crate::config::{IssueToTask, SyncBehavior};
use crate::model::{IssueState, TaskState};

/// Maps a remote issue's state onto the local task state it implies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateMapper {
    mapping: IssueToTask,
    assigned_means_in_progress: bool,
}

impl Default for StateMapper {
    fn default() -> Self {
        Self::new(IssueToTask::default(), true)
    }
}

impl StateMapper {
    pub fn new(mapping: IssueToTask, assigned_means_in_progress: bool) -> Self {
        Self {
            mapping,
            assigned_means_in_progress,
        }
    }

    pub fn from_config(behavior: &SyncBehavior) -> Self {
        Self::new(
            behavior.state_mapping.issue_to_task,
            behavior.preserve_in_progress,
        )
    }

    /// Unknown remote states are treated like `open`.
    pub fn map(&self, state: IssueState, assignees: &[String]) -> TaskState {
        match state {
            IssueState::Closed => self.mapping.closed,
            IssueState::Open if self.assigned_means_in_progress && !assignees.is_empty() => {
                TaskState::InProgress
            }
            IssueState::Open | IssueState::Unknown => self.mapping.open,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Vec<String> {
        vec!["alice".to_string()]
    }

    #[test]
    fn test_closed_maps_to_completed() {
        let mapper = StateMapper::default();
        assert_eq!(mapper.map(IssueState::Closed, &[]), TaskState::Completed);
        assert_eq!(mapper.map(IssueState::Closed, &alice()), TaskState::Completed);
    }

    #[test]
    fn test_open_unassigned_maps_to_ready() {
        let mapper = StateMapper::default();
        assert_eq!(mapper.map(IssueState::Open, &[]), TaskState::Ready);
    }

    #[test]
    fn test_open_assigned_maps_to_in_progress() {
        let mapper = StateMapper::default();
        assert_eq!(mapper.map(IssueState::Open, &alice()), TaskState::InProgress);
    }

    #[test]
    fn test_assignee_rule_disabled() {
        let mapper = StateMapper::new(IssueToTask::default(), false);
        assert_eq!(mapper.map(IssueState::Open, &alice()), TaskState::Ready);
    }

    #[test]
    fn test_unknown_state_uses_open_mapping() {
        let mapper = StateMapper::new(
            IssueToTask {
                open: TaskState::InProgress,
                closed: TaskState::Cancelled,
            },
            true,
        );
        assert_eq!(mapper.map(IssueState::Unknown, &alice()), TaskState::InProgress);
        assert_eq!(mapper.map(IssueState::Unknown, &[]), TaskState::InProgress);
        assert_eq!(mapper.map(IssueState::Closed, &[]), TaskState::Cancelled);
    }
}
