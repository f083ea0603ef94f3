use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::TaskState;
use crate::sync::conflict::{Conflict, ConflictKind};

/// How detected conflicts are settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPolicy {
    /// Every conflict is flagged for a human.
    Manual,
    LocalWins,
    #[serde(alias = "github_wins")]
    RemoteWins,
    /// Follow the remote only when it is provably newer.
    Smart,
}

impl ResolutionPolicy {
    pub const ALL: [ResolutionPolicy; 4] = [
        ResolutionPolicy::Manual,
        ResolutionPolicy::LocalWins,
        ResolutionPolicy::RemoteWins,
        ResolutionPolicy::Smart,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionPolicy::Manual => "manual",
            ResolutionPolicy::LocalWins => "local_wins",
            ResolutionPolicy::RemoteWins => "remote_wins",
            ResolutionPolicy::Smart => "smart",
        }
    }
}

impl fmt::Display for ResolutionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "manual" => Ok(ResolutionPolicy::Manual),
            "local_wins" => Ok(ResolutionPolicy::LocalWins),
            "remote_wins" | "github_wins" => Ok(ResolutionPolicy::RemoteWins),
            "smart" => Ok(ResolutionPolicy::Smart),
            other => Err(format!(
                "unknown conflict resolution policy '{other}' (expected manual, local_wins, remote_wins or smart)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "action", content = "state")]
pub enum ResolutionAction {
    NoChange,
    AdoptRemote(TaskState),
    KeepLocal,
    MarkForReview,
}

/// Decide what to do about a conflict under the given policy.
pub fn resolve(conflict: &Conflict, policy: ResolutionPolicy) -> ResolutionAction {
    use ConflictKind as K;
    use ResolutionPolicy as P;

    let adopt = ResolutionAction::AdoptRemote(conflict.remote_state);
    match (conflict.kind, policy) {
        (K::None, _) => ResolutionAction::NoChange,

        (_, P::LocalWins) => ResolutionAction::KeepLocal,
        (_, P::RemoteWins) => adopt,

        (K::LocalNewer | K::RemoteNewer | K::Incompatible | K::ManualReview, P::Manual) => {
            ResolutionAction::MarkForReview
        }

        (K::LocalNewer, P::Smart) => ResolutionAction::KeepLocal,
        (K::RemoteNewer, P::Smart) => adopt,
        (K::Incompatible | K::ManualReview, P::Smart) => ResolutionAction::MarkForReview,
    }
}
