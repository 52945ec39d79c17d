//! Session store: lobby lifecycle, rosters and the authoritative games.
//!
//! The store is an explicitly constructed value owned by the server loop.
//! All mutation of a session's `GameState` goes through
//! [`SessionStore::apply_action`], which delegates to the rules engine.
//!
//! ```text
//! waiting ⇄ ready ──(host starts, ≥2 players)──▶ in_progress ──(victory)──▶ finished
//! ```

use crate::code::{normalize_code, CodeGenerator};
use crate::config::RuleConfig;
use crate::dice::{DiceRoller, RandomDice};
use crate::error::{GameError, GameResult};
use crate::rules::{ActionOutcome, GameAction, RulesEngine};
use crate::utils::{generate_color, sanitize_name};
use log::{info, warn};
use shared::{
    apply_assignment, assign_territories, GameState, Lifecycle, MapTopology, PlayerId,
    PlayerSummary, ServerMessage, SessionSnapshot, SessionSummary, MAX_PLAYERS, MIN_PLAYERS,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Transport handle of a connected player.
pub type ConnectionHandle = SocketAddr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPlayer {
    pub id: PlayerId,
    pub name: String,
    pub color: String,
    pub connection: Option<ConnectionHandle>,
    pub ready: bool,
    pub eliminated: bool,
    /// Gave up the seat mid-game with an explicit leave.
    pub left: bool,
}

impl SessionPlayer {
    pub fn new(id: &str, name: &str, color: String, connection: Option<ConnectionHandle>) -> Self {
        Self {
            id: id.to_string(),
            name: sanitize_name(name),
            color,
            connection,
            ready: false,
            eliminated: false,
            left: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn summary(&self) -> PlayerSummary {
        PlayerSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            color: self.color.clone(),
            ready: self.ready,
            connected: self.is_connected(),
            eliminated: self.eliminated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub code: String,
    pub host_id: PlayerId,
    pub max_players: usize,
    pub lifecycle: Lifecycle,
    pub players: Vec<SessionPlayer>,
    pub game: Option<GameState>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Session {
    fn new(code: String, host: SessionPlayer, max_players: usize, now: u64) -> Self {
        Self {
            code,
            host_id: host.id.clone(),
            max_players,
            lifecycle: Lifecycle::Waiting,
            players: vec![host],
            game: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn player(&self, player_id: &str) -> Option<&SessionPlayer> {
        self.players.iter().find(|p| p.id == player_id)
    }

    fn player_mut(&mut self, player_id: &str) -> Option<&mut SessionPlayer> {
        self.players.iter_mut().find(|p| p.id == player_id)
    }

    pub fn is_member(&self, player_id: &str) -> bool {
        self.player(player_id).is_some()
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_players
    }

    pub fn turn_number(&self) -> u32 {
        self.game.as_ref().map(|g| g.turn_number).unwrap_or(0)
    }

    /// Connected members, in roster order.
    pub fn connected_players(&self) -> Vec<PlayerId> {
        self.players
            .iter()
            .filter(|p| p.is_connected())
            .map(|p| p.id.clone())
            .collect()
    }

    pub fn roster(&self) -> Vec<PlayerSummary> {
        self.players.iter().map(SessionPlayer::summary).collect()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            code: self.code.clone(),
            host_id: self.host_id.clone(),
            max_players: self.max_players,
            lifecycle: self.lifecycle,
            players: self.roster(),
            turn_number: self.turn_number(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            code: self.code.clone(),
            player_count: self.players.len(),
            lifecycle: self.lifecycle,
            turn_number: self.turn_number(),
        }
    }

    /// Pre-start sessions are `ready` once at least two players are all ready.
    fn refresh_readiness(&mut self) {
        if !self.lifecycle.is_pre_start() {
            return;
        }
        let all_ready = self.players.len() >= MIN_PLAYERS && self.players.iter().all(|p| p.ready);
        self.lifecycle = if all_ready {
            Lifecycle::Ready
        } else {
            Lifecycle::Waiting
        };
    }
}

/// One notification addressed to one player. The transport resolves the
/// recipient to a connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub session: Option<String>,
    pub recipient: PlayerId,
    pub message: ServerMessage,
}

impl Delivery {
    pub fn direct(recipient: &str, message: ServerMessage) -> Self {
        Self {
            session: None,
            recipient: recipient.to_string(),
            message,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Joined,
    Rejoined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveKind {
    /// Removed from a pre-start roster; the session still exists.
    Removed,
    /// Removed as the last player; the session was deleted.
    Deleted,
    /// Kept in a running game, marked disconnected.
    Disconnected,
}

pub struct SessionStore {
    sessions: HashMap<String, Session>,
    memberships: HashMap<PlayerId, String>,
    codes: CodeGenerator,
    map: Arc<MapTopology>,
    rules: RuleConfig,
    dice: Box<dyn DiceRoller>,
}

impl SessionStore {
    pub fn new(map: Arc<MapTopology>, rules: RuleConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            memberships: HashMap::new(),
            codes: CodeGenerator::new(),
            map,
            rules,
            dice: Box::new(RandomDice::new()),
        }
    }

    pub fn with_dice(mut self, dice: Box<dyn DiceRoller>) -> Self {
        self.dice = dice;
        self
    }

    pub fn with_codes(mut self, codes: CodeGenerator) -> Self {
        self.codes = codes;
        self
    }

    pub fn map(&self) -> &MapTopology {
        &self.map
    }

    pub fn rules(&self) -> &RuleConfig {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn get_session(&self, code: &str) -> Option<&Session> {
        self.sessions.get(&normalize_code(code))
    }

    fn session_mut(&mut self, code: &str) -> GameResult<&mut Session> {
        let code = normalize_code(code);
        self.sessions
            .get_mut(&code)
            .ok_or(GameError::SessionNotFound(code))
    }

    /// Code of the session `player_id` currently plays in.
    pub fn session_of(&self, player_id: &str) -> Option<&str> {
        self.memberships.get(player_id).map(String::as_str)
    }

    pub fn list(&self) -> Vec<SessionSummary> {
        let mut summaries: Vec<SessionSummary> =
            self.sessions.values().map(Session::summary).collect();
        summaries.sort_by(|a, b| a.code.cmp(&b.code));
        summaries
    }

    /// Addresses `message` to every connected member of `code`.
    pub fn publish(&self, code: &str, message: &ServerMessage) -> Vec<Delivery> {
        let Some(session) = self.get_session(code) else {
            return Vec::new();
        };
        session
            .connected_players()
            .into_iter()
            .map(|recipient| Delivery {
                session: Some(session.code.clone()),
                recipient,
                message: message.clone(),
            })
            .collect()
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    fn ensure_free(&self, player_id: &str, code: Option<&str>) -> GameResult<()> {
        match self.memberships.get(player_id) {
            Some(current) if Some(current.as_str()) != code => {
                Err(GameError::AlreadyInSession(current.clone()))
            }
            _ => Ok(()),
        }
    }

    pub fn create_session(
        &mut self,
        host_id: &str,
        host_name: &str,
        max_players: usize,
        connection: Option<ConnectionHandle>,
        now: u64,
    ) -> GameResult<&Session> {
        if !(MIN_PLAYERS..=MAX_PLAYERS).contains(&max_players) {
            return Err(GameError::InvalidPlayerCount(max_players));
        }
        self.ensure_free(host_id, None)?;

        let sessions = &self.sessions;
        let code = self.codes.generate_unique(|c| sessions.contains_key(c))?;
        let host = SessionPlayer::new(host_id, host_name, generate_color(std::iter::empty::<&str>()), connection);
        let session = Session::new(code.clone(), host, max_players, now);

        info!("Session {} created by {} (max {} players)", code, host_id, max_players);
        self.memberships.insert(host_id.to_string(), code.clone());
        Ok(self.sessions.entry(code).or_insert(session))
    }

    pub fn join_session(
        &mut self,
        code: &str,
        player_id: &str,
        name: &str,
        connection: Option<ConnectionHandle>,
        now: u64,
    ) -> GameResult<JoinKind> {
        let code = normalize_code(code);
        self.ensure_free(player_id, Some(&code))?;
        let session = self.session_mut(&code)?;

        let kind = if let Some(player) = session.player_mut(player_id) {
            player.connection = connection;
            player.left = false;
            JoinKind::Rejoined
        } else {
            if !session.lifecycle.is_pre_start() {
                return Err(GameError::GameAlreadyInProgress(code));
            }
            if session.is_full() {
                return Err(GameError::SessionFull(code));
            }
            let color = generate_color(session.players.iter().map(|p| p.color.as_str()));
            session
                .players
                .push(SessionPlayer::new(player_id, name, color, connection));
            session.refresh_readiness();
            JoinKind::Joined
        };
        session.updated_at = now;

        info!("Player {} {:?} session {}", player_id, kind, code);
        self.memberships.insert(player_id.to_string(), code);
        Ok(kind)
    }

    pub fn leave_session(&mut self, code: &str, player_id: &str, now: u64) -> GameResult<LeaveKind> {
        let code = normalize_code(code);
        let session = self.session_mut(&code)?;
        let Some(position) = session.players.iter().position(|p| p.id == player_id) else {
            return Err(GameError::NotSessionMember(code));
        };

        let kind = if session.lifecycle.is_pre_start() {
            session.players.remove(position);
            if session.players.is_empty() {
                LeaveKind::Deleted
            } else {
                if session.host_id == player_id {
                    let next = &session.players[position % session.players.len()];
                    info!("Session {} host passes from {} to {}", code, player_id, next.id);
                    session.host_id = next.id.clone();
                }
                session.refresh_readiness();
                LeaveKind::Removed
            }
        } else {
            let player = &mut session.players[position];
            player.connection = None;
            player.left = true;
            LeaveKind::Disconnected
        };
        session.updated_at = now;

        self.memberships.remove(player_id);
        if kind == LeaveKind::Deleted {
            self.sessions.remove(&code);
            info!("Session {} deleted: last player left", code);
        } else {
            info!("Player {} left session {} ({:?})", player_id, code, kind);
        }
        Ok(kind)
    }

    pub fn set_ready(&mut self, code: &str, player_id: &str, ready: bool, now: u64) -> GameResult<&Session> {
        let code = normalize_code(code);
        let session = self.session_mut(&code)?;
        if !session.lifecycle.is_pre_start() {
            return Err(GameError::GameAlreadyInProgress(code));
        }
        let player = session
            .player_mut(player_id)
            .ok_or_else(|| GameError::NotSessionMember(code.clone()))?;
        player.ready = ready;
        session.refresh_readiness();
        session.updated_at = now;
        Ok(session)
    }

    /// Deals the board and moves the session to `in_progress`.
    pub fn start_session(
        &mut self,
        code: &str,
        player_id: &str,
        seed: Option<u64>,
        now: u64,
    ) -> GameResult<&Session> {
        let code = normalize_code(code);
        let map = Arc::clone(&self.map);
        let session = self.session_mut(&code)?;

        if !session.is_member(player_id) {
            return Err(GameError::NotSessionMember(code));
        }
        if !session.lifecycle.is_pre_start() {
            return Err(GameError::GameAlreadyInProgress(code));
        }
        if session.host_id != player_id {
            return Err(GameError::NotHost);
        }

        let roster: Vec<PlayerId> = session.players.iter().map(|p| p.id.clone()).collect();
        let seed = seed.unwrap_or_else(rand::random::<u64>);
        let assignment = assign_territories(&map, &roster, seed)?;

        let mut game = GameState::new(&map, seed, now);
        apply_assignment(&mut game, &roster, &assignment, now);
        game.version = 1;

        session.game = Some(game);
        session.lifecycle = Lifecycle::InProgress;
        session.updated_at = now;
        info!(
            "Session {} started with {} players (seed {})",
            code,
            roster.len(),
            seed
        );
        Ok(session)
    }

    /// Routes an in-game action to the player's session and applies it.
    pub fn apply_action(
        &mut self,
        player_id: &str,
        action: &GameAction,
        now: u64,
    ) -> GameResult<(String, ActionOutcome)> {
        let code = self
            .memberships
            .get(player_id)
            .cloned()
            .ok_or_else(|| GameError::PlayerNotFound(player_id.to_string()))?;
        let session = self
            .sessions
            .get_mut(&code)
            .ok_or_else(|| GameError::SessionNotFound(code.clone()))?;
        let game = session.game.as_mut().ok_or(GameError::GameNotStarted)?;

        let engine = RulesEngine::new(&self.map, &self.rules);
        let outcome = engine.apply(game, player_id, action, self.dice.as_mut(), now)?;
        record_outcome(session, &outcome, now);
        if session.lifecycle == Lifecycle::Finished {
            self.release_memberships(&code);
        }
        Ok((code, outcome))
    }

    /// Transport-level disconnect. Pre-start sessions drop the player;
    /// running games keep the seat for a later reconnect.
    pub fn disconnect(&mut self, player_id: &str, now: u64) -> Option<(String, LeaveKind)> {
        let code = self.memberships.get(player_id)?.clone();
        let session = self.sessions.get_mut(&code)?;

        if session.lifecycle.is_pre_start() {
            return self
                .leave_session(&code, player_id, now)
                .ok()
                .map(|kind| (code, kind));
        }
        if let Some(player) = session.player_mut(player_id) {
            player.connection = None;
        }
        session.updated_at = now;
        info!("Player {} disconnected from running session {}", player_id, code);
        Some((code, LeaveKind::Disconnected))
    }

    /// Re-binds a returning player's connection. Returns their session.
    pub fn bind_connection(&mut self, player_id: &str, connection: ConnectionHandle) -> Option<String> {
        let code = self.memberships.get(player_id)?.clone();
        let player = self.sessions.get_mut(&code)?.player_mut(player_id)?;
        player.connection = Some(connection);
        Some(code)
    }

    /// Ends turns held by disconnected players for longer than `idle`.
    pub fn sweep_idle_turns(&mut self, now: u64, idle: Duration) -> Vec<(String, ActionOutcome)> {
        let idle_ms = idle.as_millis() as u64;
        let mut forced = Vec::new();
        let mut finished = Vec::new();

        for session in self.sessions.values_mut() {
            if session.lifecycle != Lifecycle::InProgress {
                continue;
            }
            if now.saturating_sub(session.updated_at) < idle_ms {
                continue;
            }
            let Some(game) = session.game.as_mut() else {
                continue;
            };
            let Some(current) = game.current_player().cloned() else {
                continue;
            };
            let absent = session
                .players
                .iter()
                .find(|p| p.id == current)
                .map(|p| !p.is_connected())
                .unwrap_or(true);
            if !absent {
                continue;
            }

            let engine = RulesEngine::new(&self.map, &self.rules);
            match engine.force_end_turn(game, now) {
                Ok(outcome) => {
                    warn!(
                        "Session {}: {} idle while disconnected, turn forced on",
                        session.code, current
                    );
                    record_outcome(session, &outcome, now);
                    if session.lifecycle == Lifecycle::Finished {
                        finished.push(session.code.clone());
                    }
                    forced.push((session.code.clone(), outcome));
                }
                Err(e) => warn!("Session {}: could not force turn: {}", session.code, e),
            }
        }
        for code in finished {
            self.release_memberships(&code);
        }
        forced
    }

    /// Adds a session recovered from persistence. All players start
    /// disconnected until they reconnect, and the idle clock restarts at
    /// `now` so no turn is forced before its holder could come back.
    ///
    /// Seats given up with an explicit leave get no membership back.
    /// Insert oldest first: a player listed in several sessions belongs
    /// to the one inserted last.
    pub fn insert_restored(&mut self, mut session: Session, now: u64) {
        session.updated_at = session.updated_at.max(now);
        for player in &mut session.players {
            player.connection = None;
            if player.left || session.lifecycle == Lifecycle::Finished {
                continue;
            }
            if let Some(previous) = self
                .memberships
                .insert(player.id.clone(), session.code.clone())
            {
                warn!(
                    "Player {} listed in {} and {}; keeping {}",
                    player.id, previous, session.code, session.code
                );
            }
        }
        self.sessions.insert(session.code.clone(), session);
    }

    /// Removes a session and all memberships pointing at it.
    pub fn remove_session(&mut self, code: &str) -> Option<Session> {
        let session = self.sessions.remove(&normalize_code(code))?;
        self.release_memberships(&session.code);
        Some(session)
    }

    /// Drops sessions that are not in progress and have seen no change
    /// for longer than `max_age`. Returns the evicted codes, sorted.
    pub fn evict_expired(&mut self, now: u64, max_age: Duration) -> Vec<String> {
        let max_age_ms = max_age.as_millis() as u64;
        let mut expired: Vec<String> = self
            .sessions
            .values()
            .filter(|s| s.lifecycle != Lifecycle::InProgress)
            .filter(|s| now.saturating_sub(s.updated_at) > max_age_ms)
            .map(|s| s.code.clone())
            .collect();
        expired.sort_unstable();

        for code in &expired {
            self.remove_session(code);
            info!("Session {} evicted after expiry", code);
        }
        expired
    }

    fn release_memberships(&mut self, code: &str) {
        self.memberships.retain(|_, c| c != code);
    }
}

fn record_outcome(session: &mut Session, outcome: &ActionOutcome, now: u64) {
    for loser in &outcome.eliminated {
        if let Some(player) = session.player_mut(loser) {
            player.eliminated = true;
        }
    }
    if let Some(winner) = &outcome.winner {
        session.lifecycle = Lifecycle::Finished;
        info!("Session {} finished, winner {}", session.code, winner);
    }
    session.updated_at = now;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dice::ScriptedDice;
    use shared::Phase;

    fn store() -> SessionStore {
        SessionStore::new(Arc::new(MapTopology::classic()), RuleConfig::default())
            .with_codes(CodeGenerator::seeded(1))
            .with_dice(Box::new(ScriptedDice::default()))
    }

    fn addr(port: u16) -> Option<ConnectionHandle> {
        Some(format!("127.0.0.1:{}", port).parse().unwrap())
    }

    fn lobby(store: &mut SessionStore, players: &[&str]) -> String {
        let code = store
            .create_session(players[0], players[0], 6, addr(9000), 1)
            .unwrap()
            .code
            .clone();
        for (i, p) in players.iter().enumerate().skip(1) {
            store
                .join_session(&code, p, p, addr(9000 + i as u16), 2)
                .unwrap();
        }
        code
    }

    #[test]
    fn test_create_session() {
        let mut store = store();
        let session = store.create_session("host", "Host", 4, addr(1), 10).unwrap();

        assert_eq!(session.code.len(), 6);
        assert_eq!(session.host_id, "host");
        assert_eq!(session.lifecycle, Lifecycle::Waiting);
        assert_eq!(session.players[0].color, "red");
        let code = session.code.clone();
        assert_eq!(store.session_of("host"), Some(code.as_str()));
    }

    #[test]
    fn test_create_rejects_bad_max_players() {
        let mut store = store();
        assert!(matches!(
            store.create_session("h", "H", 1, None, 1),
            Err(GameError::InvalidPlayerCount(1))
        ));
        assert!(matches!(
            store.create_session("h", "H", 7, None, 1),
            Err(GameError::InvalidPlayerCount(7))
        ));
    }

    #[test]
    fn test_player_cannot_host_twice() {
        let mut store = store();
        let code = lobby(&mut store, &["a"]);
        assert_eq!(
            store.create_session("a", "A", 4, None, 2).map(|s| s.code.clone()),
            Err(GameError::AlreadyInSession(code))
        );
    }

    #[test]
    fn test_join_full_session() {
        let mut store = store();
        let code = store.create_session("a", "A", 2, None, 1).unwrap().code.clone();
        store.join_session(&code, "b", "B", None, 2).unwrap();

        assert_eq!(
            store.join_session(&code, "c", "C", None, 3),
            Err(GameError::SessionFull(code.clone()))
        );
        assert_eq!(store.get_session(&code).unwrap().players.len(), 2);
    }

    #[test]
    fn test_join_unknown_session() {
        let mut store = store();
        assert_eq!(
            store.join_session("NOPE22", "b", "B", None, 1),
            Err(GameError::SessionNotFound("NOPE22".into()))
        );
    }

    #[test]
    fn test_join_is_case_insensitive_and_assigns_colors() {
        let mut store = store();
        let code = lobby(&mut store, &["a"]);
        store
            .join_session(&code.to_lowercase(), "b", "B", None, 2)
            .unwrap();

        let session = store.get_session(&code).unwrap();
        assert_eq!(session.players[1].color, "blue");
    }

    #[test]
    fn test_readiness_lifecycle() {
        let mut store = store();
        let code = lobby(&mut store, &["a", "b"]);

        store.set_ready(&code, "a", true, 3).unwrap();
        assert_eq!(store.get_session(&code).unwrap().lifecycle, Lifecycle::Waiting);

        store.set_ready(&code, "b", true, 4).unwrap();
        assert_eq!(store.get_session(&code).unwrap().lifecycle, Lifecycle::Ready);

        // A newcomer is not ready yet.
        store.join_session(&code, "c", "C", None, 5).unwrap();
        assert_eq!(store.get_session(&code).unwrap().lifecycle, Lifecycle::Waiting);
    }

    #[test]
    fn test_host_reassigned_on_leave() {
        let mut store = store();
        let code = lobby(&mut store, &["a", "b", "c"]);

        assert_eq!(store.leave_session(&code, "a", 3), Ok(LeaveKind::Removed));
        let session = store.get_session(&code).unwrap();
        assert_eq!(session.host_id, "b");
        assert_eq!(session.players.len(), 2);
        assert_eq!(store.session_of("a"), None);
    }

    #[test]
    fn test_last_leave_deletes_session() {
        let mut store = store();
        let code = lobby(&mut store, &["a"]);

        assert_eq!(store.leave_session(&code, "a", 2), Ok(LeaveKind::Deleted));
        assert!(store.get_session(&code).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_start_requires_host_and_two_players() {
        let mut store = store();
        let code = lobby(&mut store, &["a"]);
        assert_eq!(
            store.start_session(&code, "a", Some(1), 2).map(|_| ()),
            Err(GameError::InvalidPlayerCount(1))
        );

        store.join_session(&code, "b", "B", None, 3).unwrap();
        assert_eq!(
            store.start_session(&code, "b", Some(1), 4).map(|_| ()),
            Err(GameError::NotHost)
        );

        let session = store.start_session(&code, "a", Some(1), 5).unwrap();
        assert_eq!(session.lifecycle, Lifecycle::InProgress);
        let game = session.game.as_ref().unwrap();
        assert_eq!(game.phase, Phase::Startup);
        assert_eq!(game.seed, 1);
        assert_eq!(game.total_armies(), 80);
    }

    #[test]
    fn test_start_is_reproducible() {
        let mut first = store();
        let code = lobby(&mut first, &["a", "b", "c"]);
        first.start_session(&code, "a", Some(42), 10).unwrap();

        let mut second = store();
        let other = lobby(&mut second, &["a", "b", "c"]);
        second.start_session(&other, "a", Some(42), 99).unwrap();

        let owners = |s: &SessionStore, code: &str| -> Vec<Option<PlayerId>> {
            s.get_session(code).unwrap().game.as_ref().unwrap()
                .territories
                .values()
                .map(|t| t.owner.clone())
                .collect()
        };
        assert_eq!(owners(&first, &code), owners(&second, &other));
    }

    #[test]
    fn test_cannot_join_or_start_running_game() {
        let mut store = store();
        let code = lobby(&mut store, &["a", "b"]);
        store.start_session(&code, "a", Some(3), 3).unwrap();

        assert_eq!(
            store.join_session(&code, "c", "C", None, 4),
            Err(GameError::GameAlreadyInProgress(code.clone()))
        );
        assert_eq!(
            store.start_session(&code, "a", Some(3), 5).map(|_| ()),
            Err(GameError::GameAlreadyInProgress(code.clone()))
        );
    }

    #[test]
    fn test_leave_mid_game_keeps_seat_and_rejoin_resumes() {
        let mut store = store();
        let code = lobby(&mut store, &["a", "b"]);
        store.start_session(&code, "a", Some(3), 3).unwrap();
        let before = store.get_session(&code).unwrap().game.clone();

        assert_eq!(store.leave_session(&code, "b", 4), Ok(LeaveKind::Disconnected));
        let session = store.get_session(&code).unwrap();
        assert_eq!(session.players.len(), 2);
        assert!(!session.players[1].is_connected());
        assert!(session.players[1].left);
        assert_eq!(session.game, before);
        assert_eq!(store.session_of("b"), None);

        assert_eq!(
            store.join_session(&code, "b", "B", addr(7777), 5),
            Ok(JoinKind::Rejoined)
        );
        assert!(store.get_session(&code).unwrap().players[1].is_connected());
        assert!(!store.get_session(&code).unwrap().players[1].left);
        assert_eq!(store.session_of("b"), Some(code.as_str()));
    }

    #[test]
    fn test_apply_action_routes_to_player_session() {
        let mut store = store();
        let code = lobby(&mut store, &["a", "b"]);
        store.start_session(&code, "a", Some(3), 3).unwrap();

        let territory = store
            .get_session(&code)
            .unwrap()
            .game
            .as_ref()
            .unwrap()
            .territories_owned_by("a")
            .next()
            .unwrap()
            .id
            .clone();
        let deploy = GameAction::Deploy {
            territory: territory.clone(),
            count: 2,
        };

        let (routed, _) = store.apply_action("a", &deploy, 10).unwrap();
        assert_eq!(routed, code);
        assert_eq!(
            store.apply_action("b", &deploy, 11).map(|_| ()),
            Err(GameError::NotPlayersTurn)
        );
        assert_eq!(
            store.apply_action("stranger", &deploy, 12).map(|_| ()),
            Err(GameError::PlayerNotFound("stranger".into()))
        );

        let game = store.get_session(&code).unwrap().game.as_ref().unwrap();
        assert_eq!(game.territory(&territory).unwrap().armies, 3);
    }

    #[test]
    fn test_action_before_start() {
        let mut store = store();
        lobby(&mut store, &["a", "b"]);
        assert_eq!(
            store
                .apply_action("a", &GameAction::AdvancePhase, 3)
                .map(|_| ()),
            Err(GameError::GameNotStarted)
        );
    }

    #[test]
    fn test_disconnect_pre_start_leaves() {
        let mut store = store();
        let code = lobby(&mut store, &["a", "b"]);
        assert_eq!(
            store.disconnect("b", 3),
            Some((code.clone(), LeaveKind::Removed))
        );
        assert_eq!(store.get_session(&code).unwrap().players.len(), 1);
    }

    #[test]
    fn test_disconnect_and_bind_in_game() {
        let mut store = store();
        let code = lobby(&mut store, &["a", "b"]);
        store.start_session(&code, "a", Some(3), 3).unwrap();

        assert_eq!(
            store.disconnect("a", 4),
            Some((code.clone(), LeaveKind::Disconnected))
        );
        assert_eq!(store.session_of("a"), Some(code.as_str()));

        let handle = addr(5555).unwrap();
        assert_eq!(store.bind_connection("a", handle), Some(code.clone()));
        assert_eq!(
            store.get_session(&code).unwrap().players[0].connection,
            Some(handle)
        );
    }

    #[test]
    fn test_sweep_forces_idle_disconnected_turn() {
        let mut store = store();
        let code = lobby(&mut store, &["a", "b"]);
        store.start_session(&code, "a", Some(3), 3).unwrap();
        store.disconnect("a", 4);
        let total = store.get_session(&code).unwrap().game.as_ref().unwrap().total_armies();

        // Not idle long enough.
        assert!(store.sweep_idle_turns(1_000, Duration::from_secs(60)).is_empty());

        let forced = store.sweep_idle_turns(100_000, Duration::from_secs(60));
        assert_eq!(forced.len(), 1);
        assert_eq!(forced[0].0, code);

        let game = store.get_session(&code).unwrap().game.as_ref().unwrap();
        assert!(game.is_current_player("b"));
        assert_eq!(game.remaining_to_deploy("a"), 0);
        assert_eq!(game.total_armies(), total);
    }

    #[test]
    fn test_sweep_leaves_connected_players_alone() {
        let mut store = store();
        let code = lobby(&mut store, &["a", "b"]);
        store.start_session(&code, "a", Some(3), 3).unwrap();

        assert!(store.sweep_idle_turns(100_000, Duration::from_secs(60)).is_empty());
        let game = store.get_session(&code).unwrap().game.as_ref().unwrap();
        assert!(game.is_current_player("a"));
    }

    #[test]
    fn test_insert_restored_marks_everyone_disconnected() {
        let mut source = store();
        let code = lobby(&mut source, &["a", "b"]);
        let session = source.get_session(&code).unwrap().clone();

        let mut restored = store();
        restored.insert_restored(session, 50);

        let session = restored.get_session(&code).unwrap();
        assert!(session.players.iter().all(|p| !p.is_connected()));
        assert_eq!(session.updated_at, 50);
        assert_eq!(restored.session_of("b"), Some(code.as_str()));
    }

    #[test]
    fn test_finished_game_releases_members() {
        let mut store = store().with_dice(Box::new(ScriptedDice::new([6, 6, 6, 1])));
        let code = lobby(&mut store, &["a", "b"]);
        store.start_session(&code, "a", Some(3), 3).unwrap();

        let game = store.sessions.get_mut(&code).unwrap().game.as_mut().unwrap();
        for territory in game.territories.values_mut() {
            territory.owner = Some("a".into());
            territory.armies = 1;
        }
        game.territories.get_mut("alaska").unwrap().owner = Some("b".into());
        game.territories.get_mut("kamchatka").unwrap().armies = 4;
        game.armies_to_deploy.clear();
        game.phase = Phase::Attack;

        let attack = GameAction::Attack {
            attacker: "kamchatka".into(),
            defender: "alaska".into(),
            committed_armies: 3,
        };
        let (_, outcome) = store.apply_action("a", &attack, 10).unwrap();
        assert_eq!(outcome.winner.as_deref(), Some("a"));

        let session = store.get_session(&code).unwrap();
        assert_eq!(session.lifecycle, Lifecycle::Finished);
        assert_eq!(store.session_of("a"), None);
        assert_eq!(store.session_of("b"), None);
        assert!(store.create_session("b", "B", 4, addr(9100), 11).is_ok());
    }

    #[test]
    fn test_evict_expired_keeps_running_games() {
        let mut store = store();
        let running = lobby(&mut store, &["a", "b"]);
        store.start_session(&running, "a", Some(3), 3).unwrap();
        let idle_lobby = lobby(&mut store, &["c"]);

        assert!(store.evict_expired(1_000, Duration::from_secs(5)).is_empty());

        let evicted = store.evict_expired(10_000, Duration::from_secs(5));
        assert_eq!(evicted, vec![idle_lobby.clone()]);
        assert!(store.get_session(&idle_lobby).is_none());
        assert_eq!(store.session_of("c"), None);
        assert!(store.get_session(&running).is_some());
        assert_eq!(store.session_of("a"), Some(running.as_str()));
    }

    #[test]
    fn test_publish_reaches_connected_members_only() {
        let mut store = store();
        let code = lobby(&mut store, &["a", "b", "c"]);
        store.start_session(&code, "a", Some(3), 3).unwrap();
        store.disconnect("b", 4);

        let message = ServerMessage::SessionClosed { code: code.clone() };
        let deliveries = store.publish(&code, &message);
        let recipients: Vec<&str> = deliveries.iter().map(|d| d.recipient.as_str()).collect();

        assert_eq!(recipients, vec!["a", "c"]);
        assert!(deliveries.iter().all(|d| d.session.as_deref() == Some(code.as_str())));
        assert!(store.publish("NOPE22", &message).is_empty());
    }

    #[test]
    fn test_list_sessions() {
        let mut store = store();
        let first = lobby(&mut store, &["a", "b"]);
        lobby(&mut store, &["c"]);

        let list = store.list();
        assert_eq!(list.len(), 2);
        let row = list.iter().find(|s| s.code == first).unwrap();
        assert_eq!(row.player_count, 2);
        assert_eq!(row.lifecycle, Lifecycle::Waiting);
        assert_eq!(row.turn_number, 0);
    }
}
