//! Reconciles two copies of a game state.
//!
//! `local` is always the copy the server produced; `remote` is whatever a
//! client proposed. Clock comparison picks a winner outright, and only
//! fully tied clocks fall through to a per-territory merge. Turn order
//! fields are never taken from `remote`.
//!
//! The session server only uses the resolution label to tell a syncing
//! client how its copy compared; it never installs or sends
//! [`Resolved::state`]. The merged state is for callers that trust both
//! sides, such as replay tooling.

use log::{debug, info};
use shared::{GameState, Resolution};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub state: GameState,
    pub resolution: Resolution,
}

impl Resolved {
    /// True when the resolved state is not the local copy.
    pub fn adopted_remote(&self) -> bool {
        matches!(self.resolution, Resolution::RemoteNewer | Resolution::Merged)
    }
}

pub fn resolve(local: &GameState, remote: &GameState) -> Resolved {
    let resolved = if local == remote {
        Resolved {
            state: local.clone(),
            resolution: Resolution::Identical,
        }
    } else if local.timestamp != remote.timestamp {
        pick_newer(local, remote, local.timestamp > remote.timestamp, false)
    } else if local.version != remote.version {
        pick_newer(local, remote, local.version > remote.version, true)
    } else {
        Resolved {
            state: merge(local, remote),
            resolution: Resolution::Merged,
        }
    };

    if resolved.resolution != Resolution::Identical {
        audit(local, remote, &resolved);
    }
    resolved
}

fn pick_newer(local: &GameState, remote: &GameState, local_wins: bool, by_version: bool) -> Resolved {
    let (state, resolution) = match (local_wins, by_version) {
        (true, false) => (local.clone(), Resolution::LocalNewer),
        (false, false) => (remote.clone(), Resolution::RemoteNewer),
        (true, true) => (local.clone(), Resolution::Version),
        (false, true) => (remote.clone(), Resolution::Version),
    };
    Resolved { state, resolution }
}

/// Territories come from whichever side touched them last; everything
/// else comes from `local`.
fn merge(local: &GameState, remote: &GameState) -> GameState {
    let mut merged = local.clone();
    for (id, territory) in merged.territories.iter_mut() {
        if let Some(theirs) = remote.territories.get(id) {
            if theirs.updated_at > territory.updated_at {
                *territory = theirs.clone();
            }
        }
    }
    merged.version = local.version + 1;
    merged
}

fn audit(local: &GameState, remote: &GameState, resolved: &Resolved) {
    info!(
        "State conflict resolved as {}: local t={} v{}, remote t={} v{} -> t={} v{}",
        resolved.resolution.as_str(),
        local.timestamp,
        local.version,
        remote.timestamp,
        remote.version,
        resolved.state.timestamp,
        resolved.state.version
    );
    let snapshot = |state: &GameState| {
        serde_json::to_string(state).unwrap_or_else(|e| format!("<unserializable: {}>", e))
    };
    debug!("conflict before (local): {}", snapshot(local));
    debug!("conflict before (remote): {}", snapshot(remote));
    debug!("conflict after: {}", snapshot(&resolved.state));
}
