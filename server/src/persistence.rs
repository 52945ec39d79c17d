//! Durable session records.
//!
//! Sessions are written as one JSON file per code. Writes go to a temp
//! file first and are renamed into place, so a crash never leaves a
//! half-written record behind. The [`PersistenceWorker`] owns the
//! repository and applies queued operations in order, off the dispatch
//! path.

use crate::session::{Session, SessionPlayer, SessionStore};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use shared::{GameState, Lifecycle, PlayerId};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupt session record {code}: {reason}")]
    Corrupt { code: String, reason: String },
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Roster entry as stored on disk. Connection handles are never written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedPlayer {
    pub name: String,
    pub color: String,
    pub ready: bool,
    pub index: usize,
    #[serde(default)]
    pub eliminated: bool,
    #[serde(default)]
    pub left: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    pub session_id: String,
    pub host_id: PlayerId,
    pub max_players: usize,
    pub lifecycle_state: Lifecycle,
    pub created_at: u64,
    pub updated_at: u64,
    pub players: BTreeMap<PlayerId, PersistedPlayer>,
    pub game_state: Option<GameState>,
    pub turn_number: u32,
}

impl From<&Session> for PersistedSession {
    fn from(session: &Session) -> Self {
        let players = session
            .players
            .iter()
            .enumerate()
            .map(|(index, p)| {
                (
                    p.id.clone(),
                    PersistedPlayer {
                        name: p.name.clone(),
                        color: p.color.clone(),
                        ready: p.ready,
                        index,
                        eliminated: p.eliminated,
                        left: p.left,
                    },
                )
            })
            .collect();

        Self {
            session_id: session.code.clone(),
            host_id: session.host_id.clone(),
            max_players: session.max_players,
            lifecycle_state: session.lifecycle,
            created_at: session.created_at,
            updated_at: session.updated_at,
            players,
            game_state: session.game.clone(),
            turn_number: session.turn_number(),
        }
    }
}

impl PersistedSession {
    /// Rebuilds the in-memory session. Every player comes back
    /// disconnected.
    pub fn into_session(self) -> PersistenceResult<Session> {
        if self.players.is_empty() {
            return Err(self.corrupt("no players"));
        }
        if !self.players.contains_key(&self.host_id) {
            return Err(self.corrupt("host is not in the roster"));
        }
        if self.lifecycle_state == Lifecycle::InProgress && self.game_state.is_none() {
            return Err(self.corrupt("running session without a game state"));
        }

        let mut roster: Vec<(PlayerId, PersistedPlayer)> = self.players.into_iter().collect();
        roster.sort_by_key(|(_, p)| p.index);
        let players = roster
            .into_iter()
            .map(|(id, p)| SessionPlayer {
                id,
                name: p.name,
                color: p.color,
                connection: None,
                ready: p.ready,
                eliminated: p.eliminated,
                left: p.left,
            })
            .collect();

        Ok(Session {
            code: self.session_id,
            host_id: self.host_id,
            max_players: self.max_players,
            lifecycle: self.lifecycle_state,
            players,
            game: self.game_state,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }

    fn corrupt(&self, reason: &str) -> PersistenceError {
        PersistenceError::Corrupt {
            code: self.session_id.clone(),
            reason: reason.to_string(),
        }
    }
}

pub trait SessionRepository: Send {
    fn save(&self, record: &PersistedSession) -> PersistenceResult<()>;

    fn load(&self, code: &str) -> PersistenceResult<Option<PersistedSession>>;

    /// Codes of every stored session, sorted.
    fn list(&self) -> PersistenceResult<Vec<String>>;

    fn delete(&self, code: &str) -> PersistenceResult<()>;
}

/// Stores each session as `<code>.json` under `base_dir`.
#[derive(Debug, Clone)]
pub struct FileSessionRepository {
    base_dir: PathBuf,
}

impl FileSessionRepository {
    pub fn new(base_dir: impl AsRef<Path>) -> PersistenceResult<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn record_path(&self, code: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", code))
    }
}

impl SessionRepository for FileSessionRepository {
    fn save(&self, record: &PersistedSession) -> PersistenceResult<()> {
        let path = self.record_path(&record.session_id);
        let temp_path = path.with_extension("json.tmp");

        let bytes = serde_json::to_vec_pretty(record)?;
        fs::write(&temp_path, bytes)?;
        fs::rename(&temp_path, &path)?;

        debug!("Saved session {} to {}", record.session_id, path.display());
        Ok(())
    }

    fn load(&self, code: &str) -> PersistenceResult<Option<PersistedSession>> {
        let path = self.record_path(code);
        if !path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(&path)?;
        let record: PersistedSession =
            serde_json::from_slice(&bytes).map_err(|e| PersistenceError::Corrupt {
                code: code.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Some(record))
    }

    fn list(&self) -> PersistenceResult<Vec<String>> {
        let mut codes = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let path = entry?.path();
            if let Some(code) = path
                .file_name()
                .and_then(|s| s.to_str())
                .and_then(|name| name.strip_suffix(".json"))
            {
                codes.push(code.to_string());
            }
        }
        codes.sort_unstable();
        Ok(codes)
    }

    fn delete(&self, code: &str) -> PersistenceResult<()> {
        let path = self.record_path(code);
        if path.exists() {
            fs::remove_file(&path)?;
            debug!("Deleted session record {}", code);
        }
        Ok(())
    }
}

/// Repopulates `store` with every stored session that has not finished.
/// Unreadable records are skipped. Returns how many sessions came back.
///
/// Records are inserted oldest first so a player listed in several of
/// them ends up in the most recently updated one.
pub fn restore_active(repo: &dyn SessionRepository, store: &mut SessionStore, now: u64) -> usize {
    let codes = match repo.list() {
        Ok(codes) => codes,
        Err(e) => {
            error!("Could not list stored sessions: {}", e);
            return 0;
        }
    };

    let mut sessions = Vec::new();
    for code in codes {
        let record = match repo.load(&code) {
            Ok(Some(record)) => record,
            Ok(None) => continue,
            Err(e) => {
                warn!("Skipping session record {}: {}", code, e);
                continue;
            }
        };
        if record.lifecycle_state == Lifecycle::Finished {
            debug!("Not restoring finished session {}", code);
            continue;
        }
        match record.into_session() {
            Ok(session) => sessions.push(session),
            Err(e) => warn!("Skipping session record {}: {}", code, e),
        }
    }

    sessions.sort_by(|a, b| (a.updated_at, &a.code).cmp(&(b.updated_at, &b.code)));
    let restored = sessions.len();
    for session in sessions {
        store.insert_restored(session, now);
    }

    info!("Restored {} session(s) from storage", restored);
    restored
}

/// Deletes stored sessions not in progress whose last update is older
/// than `max_age`. Returns the deleted codes.
pub fn sweep_expired(repo: &dyn SessionRepository, now: u64, max_age: Duration) -> Vec<String> {
    let max_age_ms = max_age.as_millis() as u64;
    let codes = match repo.list() {
        Ok(codes) => codes,
        Err(e) => {
            error!("Could not list stored sessions: {}", e);
            return Vec::new();
        }
    };

    let mut deleted = Vec::new();
    for code in codes {
        let Ok(Some(record)) = repo.load(&code) else {
            continue;
        };
        if record.lifecycle_state == Lifecycle::InProgress {
            continue;
        }
        if now.saturating_sub(record.updated_at) <= max_age_ms {
            continue;
        }
        match repo.delete(&code) {
            Ok(()) => deleted.push(code),
            Err(e) => warn!("Failed to delete expired session {}: {}", code, e),
        }
    }

    if !deleted.is_empty() {
        info!("Swept {} expired session(s)", deleted.len());
    }
    deleted
}

/// Work queued for the persistence worker.
#[derive(Debug)]
pub enum PersistOp {
    Save(Box<PersistedSession>),
    Delete(String),
    SweepExpired { now: u64, max_age: Duration },
    /// Acknowledged once every earlier operation has been applied.
    Flush(oneshot::Sender<()>),
}

impl PersistOp {
    pub fn save(session: &Session) -> Self {
        PersistOp::Save(Box::new(PersistedSession::from(session)))
    }
}

pub struct PersistenceWorker<R: SessionRepository> {
    repo: R,
    op_rx: mpsc::UnboundedReceiver<PersistOp>,
}

impl<R: SessionRepository> PersistenceWorker<R> {
    pub fn new(repo: R, op_rx: mpsc::UnboundedReceiver<PersistOp>) -> Self {
        Self { repo, op_rx }
    }

    /// Applies operations until every sender is dropped.
    pub async fn run(mut self) {
        info!("Persistence worker started");
        while let Some(op) = self.op_rx.recv().await {
            self.apply(op);
        }
        info!("Persistence worker stopped");
    }

    fn apply(&mut self, op: PersistOp) {
        match op {
            PersistOp::Save(record) => {
                if let Err(e) = self.repo.save(&record) {
                    error!("Failed to save session {}: {}", record.session_id, e);
                }
            }
            PersistOp::Delete(code) => {
                if let Err(e) = self.repo.delete(&code) {
                    error!("Failed to delete session {}: {}", code, e);
                }
            }
            PersistOp::SweepExpired { now, max_age } => {
                sweep_expired(&self.repo, now, max_age);
            }
            PersistOp::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
}
