//! Turns client intents into store operations and notification lists.
//!
//! The dispatcher never touches a socket. Each call returns an [`Outcome`]
//! listing who must be told what, plus the persistence work the change
//! implies; the network layer delivers both. A rejected intent yields one
//! delivery to its sender and nothing else.

use crate::code::normalize_code;
use crate::conflict;
use crate::error::{GameError, GameResult};
use crate::persistence::PersistOp;
use crate::rules::{ActionOutcome, GameAction};
use crate::session::{ConnectionHandle, Delivery, JoinKind, LeaveKind, SessionStore};
use log::{debug, info, warn};
use shared::{ClientMessage, GameState, ServerMessage};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct Outcome {
    pub deliveries: Vec<Delivery>,
    pub persistence: Vec<PersistOp>,
}

impl Outcome {
    fn direct(recipient: &str, message: ServerMessage) -> Self {
        Self {
            deliveries: vec![Delivery::direct(recipient, message)],
            persistence: Vec::new(),
        }
    }

    fn rejected(recipient: &str, err: &GameError) -> Self {
        let reason = err.to_string();
        let message = if err.is_rule_violation() {
            ServerMessage::ValidationError { reason }
        } else {
            ServerMessage::SessionError { reason }
        };
        Self::direct(recipient, message)
    }

    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty() && self.persistence.is_empty()
    }

    pub fn merge(&mut self, other: Outcome) {
        self.deliveries.extend(other.deliveries);
        self.persistence.extend(other.persistence);
    }
}

pub struct Dispatcher {
    store: SessionStore,
}

impl Dispatcher {
    pub fn new(store: SessionStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut SessionStore {
        &mut self.store
    }

    /// Handles one intent from `player_id`, arriving on `connection`.
    pub fn handle(
        &mut self,
        player_id: &str,
        connection: Option<ConnectionHandle>,
        message: ClientMessage,
        now: u64,
    ) -> Outcome {
        let kind = message.kind();
        match self.route(player_id, connection, message, now) {
            Ok(outcome) => outcome,
            Err(err) => {
                debug!("Rejected {} from {}: {}", kind, player_id, err);
                Outcome::rejected(player_id, &err)
            }
        }
    }

    fn route(
        &mut self,
        player_id: &str,
        connection: Option<ConnectionHandle>,
        message: ClientMessage,
        now: u64,
    ) -> GameResult<Outcome> {
        match message {
            ClientMessage::Hello { .. } => Ok(self.hello(player_id, connection)),
            ClientMessage::Heartbeat => Ok(Outcome::default()),
            ClientMessage::Disconnect => Ok(self.disconnect(player_id, now)),
            ClientMessage::SessionCreate {
                host_name,
                max_players,
            } => {
                let code = self
                    .store
                    .create_session(player_id, &host_name, max_players, connection, now)?
                    .code
                    .clone();
                Ok(self.session_changed(&code))
            }
            ClientMessage::SessionJoin { code, player_name } => {
                let kind = self
                    .store
                    .join_session(&code, player_id, &player_name, connection, now)?;
                let code = normalize_code(&code);
                let mut outcome = self.session_changed(&code);
                if kind == JoinKind::Rejoined {
                    if let Some(state) = self.game_of(&code) {
                        outcome.deliveries.push(Delivery::direct(
                            player_id,
                            ServerMessage::GameStateUpdate { code, state },
                        ));
                    }
                }
                Ok(outcome)
            }
            ClientMessage::SessionLeave { code } => self.leave(player_id, &code, now),
            ClientMessage::PlayerReady { code, ready } => {
                self.store.set_ready(&code, player_id, ready, now)?;
                Ok(self.session_changed(&normalize_code(&code)))
            }
            ClientMessage::SessionStart { code, seed } => {
                let code = self
                    .store
                    .start_session(&code, player_id, seed, now)?
                    .code
                    .clone();
                let mut outcome = self.session_changed(&code);
                outcome.deliveries.extend(self.game_changed(&code, &ActionOutcome::default()));
                if let Some(state) = self.game_of(&code) {
                    if let Some(current) = state.current_player() {
                        let turn = ServerMessage::TurnStart {
                            current_player_id: current.clone(),
                            turn_number: state.turn_number,
                        };
                        outcome.deliveries.extend(self.store.publish(&code, &turn));
                    }
                }
                Ok(outcome)
            }
            ClientMessage::Deploy { territory, count } => {
                self.action(player_id, GameAction::Deploy { territory, count }, now)
            }
            ClientMessage::Attack {
                attacker,
                defender,
                committed_armies,
            } => self.action(
                player_id,
                GameAction::Attack {
                    attacker,
                    defender,
                    committed_armies,
                },
                now,
            ),
            ClientMessage::CompleteConquest { transfer_count } => self.action(
                player_id,
                GameAction::CompleteConquest { transfer_count },
                now,
            ),
            ClientMessage::Fortify {
                source,
                target,
                count,
            } => self.action(
                player_id,
                GameAction::Fortify {
                    source,
                    target,
                    count,
                },
                now,
            ),
            ClientMessage::AdvancePhase => self.action(player_id, GameAction::AdvancePhase, now),
            ClientMessage::SyncRequest { code, local_state } => {
                self.sync(player_id, &code, local_state)
            }
            ClientMessage::ListSessions => Ok(Outcome::direct(
                player_id,
                ServerMessage::SessionList {
                    sessions: self.store.list(),
                },
            )),
        }
    }

    fn hello(&mut self, player_id: &str, connection: Option<ConnectionHandle>) -> Outcome {
        let code = connection.and_then(|conn| self.store.bind_connection(player_id, conn));
        let mut outcome = Outcome::direct(
            player_id,
            ServerMessage::Welcome {
                player_id: player_id.to_string(),
                session_code: code.clone(),
            },
        );

        if let Some(code) = code {
            info!("Player {} resumed session {}", player_id, code);
            outcome.deliveries.extend(self.announce_session(&code));
            if let Some(state) = self.game_of(&code) {
                outcome.deliveries.push(Delivery::direct(
                    player_id,
                    ServerMessage::GameStateUpdate { code, state },
                ));
            }
        }
        outcome
    }

    /// Transport-level loss of a player: explicit goodbye or timeout.
    pub fn disconnect(&mut self, player_id: &str, now: u64) -> Outcome {
        match self.store.disconnect(player_id, now) {
            Some((code, LeaveKind::Deleted)) => Outcome {
                deliveries: Vec::new(),
                persistence: vec![PersistOp::Delete(code)],
            },
            Some((code, _)) => self.session_changed(&code),
            None => Outcome::default(),
        }
    }

    fn leave(&mut self, player_id: &str, code: &str, now: u64) -> GameResult<Outcome> {
        let kind = self.store.leave_session(code, player_id, now)?;
        let code = normalize_code(code);

        let mut outcome = match kind {
            LeaveKind::Deleted => Outcome {
                deliveries: Vec::new(),
                persistence: vec![PersistOp::Delete(code.clone())],
            },
            LeaveKind::Removed | LeaveKind::Disconnected => self.session_changed(&code),
        };
        outcome.deliveries.push(Delivery::direct(
            player_id,
            ServerMessage::SessionClosed { code },
        ));
        Ok(outcome)
    }

    fn action(&mut self, player_id: &str, action: GameAction, now: u64) -> GameResult<Outcome> {
        let (code, result) = self.store.apply_action(player_id, &action, now)?;
        Ok(self.after_turn_change(&code, &result))
    }

    /// Answers with the authoritative state. A supplied client copy is
    /// only classified against it; the resolved state is never sent or
    /// kept, even for a merge.
    fn sync(
        &self,
        player_id: &str,
        code: &str,
        local_state: Option<GameState>,
    ) -> GameResult<Outcome> {
        let code = normalize_code(code);
        let session = self
            .store
            .get_session(&code)
            .ok_or_else(|| GameError::SessionNotFound(code.clone()))?;
        if !session.is_member(player_id) {
            return Err(GameError::NotSessionMember(code));
        }
        let authoritative = session.game.as_ref().ok_or(GameError::GameNotStarted)?;

        let mut outcome = Outcome::direct(
            player_id,
            ServerMessage::GameStateUpdate {
                code: code.clone(),
                state: authoritative.clone(),
            },
        );

        if let Some(proposed) = local_state {
            let resolved = conflict::resolve(authoritative, &proposed);
            if resolved.adopted_remote() {
                warn!(
                    "{} proposed a {} state for {}; keeping the server copy",
                    player_id,
                    resolved.resolution.as_str(),
                    code
                );
            }
            outcome.deliveries.push(Delivery::direct(
                player_id,
                ServerMessage::SyncResult {
                    code,
                    resolution: resolved.resolution,
                },
            ));
        }
        Ok(outcome)
    }

    /// Forces idle turns along when `idle` is set.
    pub fn sweep(&mut self, now: u64, idle: Option<Duration>) -> Outcome {
        let mut outcome = Outcome::default();
        let Some(idle) = idle else {
            return outcome;
        };
        for (code, result) in self.store.sweep_idle_turns(now, idle) {
            outcome.merge(self.after_turn_change(&code, &result));
        }
        outcome
    }

    /// Evicts lobbies and finished games untouched for longer than
    /// `max_age` and deletes their records.
    pub fn evict_expired(&mut self, now: u64, max_age: Duration) -> Outcome {
        Outcome {
            deliveries: Vec::new(),
            persistence: self
                .store
                .evict_expired(now, max_age)
                .into_iter()
                .map(PersistOp::Delete)
                .collect(),
        }
    }

    fn after_turn_change(&self, code: &str, result: &ActionOutcome) -> Outcome {
        let mut outcome = Outcome {
            deliveries: self.game_changed(code, result),
            persistence: self.persist(code),
        };
        if result.winner.is_some() || !result.eliminated.is_empty() {
            outcome.deliveries.extend(self.announce_session(code));
        }
        outcome
    }

    fn game_of(&self, code: &str) -> Option<GameState> {
        self.store.get_session(code).and_then(|s| s.game.clone())
    }

    fn game_changed(&self, code: &str, result: &ActionOutcome) -> Vec<Delivery> {
        let mut deliveries = Vec::new();
        if let Some(report) = &result.attack {
            let message = ServerMessage::AttackResult {
                code: code.to_string(),
                report: report.clone(),
            };
            deliveries.extend(self.store.publish(code, &message));
        }
        if let Some(state) = self.game_of(code) {
            let message = ServerMessage::GameStateUpdate {
                code: code.to_string(),
                state,
            };
            deliveries.extend(self.store.publish(code, &message));
        }
        if let Some(turn) = &result.turn_start {
            let message = ServerMessage::TurnStart {
                current_player_id: turn.player_id.clone(),
                turn_number: turn.turn_number,
            };
            deliveries.extend(self.store.publish(code, &message));
        }
        deliveries
    }

    fn announce_session(&self, code: &str) -> Vec<Delivery> {
        let Some(session) = self.store.get_session(code) else {
            return Vec::new();
        };
        let mut deliveries = self.store.publish(
            code,
            &ServerMessage::SessionUpdate {
                session: session.snapshot(),
            },
        );
        deliveries.extend(self.store.publish(
            code,
            &ServerMessage::PlayersUpdate {
                code: session.code.clone(),
                roster: session.roster(),
            },
        ));
        deliveries
    }

    fn persist(&self, code: &str) -> Vec<PersistOp> {
        self.store
            .get_session(code)
            .map(|session| vec![PersistOp::save(session)])
            .unwrap_or_default()
    }

    fn session_changed(&self, code: &str) -> Outcome {
        Outcome {
            deliveries: self.announce_session(code),
            persistence: self.persist(code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::CodeGenerator;
    use crate::config::RuleConfig;
    use crate::dice::ScriptedDice;
    use shared::{Lifecycle, MapTopology, Phase, Resolution};
    use std::sync::Arc;

    fn dispatcher() -> Dispatcher {
        let store = SessionStore::new(Arc::new(MapTopology::classic()), RuleConfig::default())
            .with_codes(CodeGenerator::seeded(5))
            .with_dice(Box::new(ScriptedDice::default()));
        Dispatcher::new(store)
    }

    fn conn(port: u16) -> Option<ConnectionHandle> {
        format!("127.0.0.1:{}", port).parse().ok()
    }

    fn create(d: &mut Dispatcher, host: &str) -> String {
        d.handle(
            host,
            conn(1000),
            ClientMessage::SessionCreate {
                host_name: host.to_string(),
                max_players: 4,
            },
            1,
        );
        d.store().session_of(host).unwrap().to_string()
    }

    fn join(d: &mut Dispatcher, code: &str, player: &str, port: u16) -> Outcome {
        d.handle(
            player,
            conn(port),
            ClientMessage::SessionJoin {
                code: code.to_string(),
                player_name: player.to_string(),
            },
            2,
        )
    }

    fn started(d: &mut Dispatcher) -> String {
        let code = create(d, "alice");
        join(d, &code, "bob", 1001);
        d.handle(
            "alice",
            conn(1000),
            ClientMessage::SessionStart {
                code: code.clone(),
                seed: Some(42),
            },
            3,
        );
        code
    }

    fn messages_for<'a>(outcome: &'a Outcome, player: &str) -> Vec<&'a ServerMessage> {
        outcome
            .deliveries
            .iter()
            .filter(|d| d.recipient == player)
            .map(|d| &d.message)
            .collect()
    }

    #[test]
    fn test_create_announces_to_host_and_persists() {
        let mut d = dispatcher();
        let outcome = d.handle(
            "alice",
            conn(1000),
            ClientMessage::SessionCreate {
                host_name: "Alice".into(),
                max_players: 3,
            },
            1,
        );

        let messages = messages_for(&outcome, "alice");
        assert!(matches!(
            messages[0],
            ServerMessage::SessionUpdate { session } if session.max_players == 3
        ));
        assert_eq!(outcome.persistence.len(), 1);
    }

    #[test]
    fn test_join_publishes_to_all_members() {
        let mut d = dispatcher();
        let code = create(&mut d, "alice");
        let outcome = join(&mut d, &code, "bob", 1001);

        assert_eq!(messages_for(&outcome, "alice").len(), 2);
        assert_eq!(messages_for(&outcome, "bob").len(), 2);
    }

    #[test]
    fn test_rejection_goes_only_to_sender() {
        let mut d = dispatcher();
        let code = create(&mut d, "alice");
        join(&mut d, &code, "bob", 1001);

        let outcome = d.handle(
            "bob",
            conn(1001),
            ClientMessage::SessionStart {
                code: code.clone(),
                seed: None,
            },
            3,
        );
        assert_eq!(outcome.deliveries.len(), 1);
        assert!(outcome.persistence.is_empty());
        assert_eq!(
            outcome.deliveries[0],
            Delivery::direct(
                "bob",
                ServerMessage::SessionError {
                    reason: "only the host can do that".into()
                }
            )
        );
    }

    #[test]
    fn test_start_broadcasts_state_and_first_turn() {
        let mut d = dispatcher();
        let code = create(&mut d, "alice");
        join(&mut d, &code, "bob", 1001);
        let outcome = d.handle(
            "alice",
            conn(1000),
            ClientMessage::SessionStart {
                code: code.clone(),
                seed: Some(42),
            },
            3,
        );

        let bob = messages_for(&outcome, "bob");
        assert!(bob
            .iter()
            .any(|m| matches!(m, ServerMessage::GameStateUpdate { state, .. } if state.phase == Phase::Startup)));
        assert!(bob.iter().any(|m| matches!(
            m,
            ServerMessage::TurnStart { current_player_id, .. } if current_player_id == "alice"
        )));
        assert_eq!(
            d.store().get_session(&code).unwrap().lifecycle,
            Lifecycle::InProgress
        );
    }

    #[test]
    fn test_out_of_turn_action_is_a_validation_error() {
        let mut d = dispatcher();
        started(&mut d);

        let outcome = d.handle("bob", conn(1001), ClientMessage::AdvancePhase, 4);
        assert_eq!(
            messages_for(&outcome, "bob"),
            vec![&ServerMessage::ValidationError {
                reason: "it is not your turn".into()
            }]
        );
    }

    #[test]
    fn test_accepted_action_updates_everyone() {
        let mut d = dispatcher();
        let code = started(&mut d);
        let territory = d
            .store()
            .get_session(&code)
            .unwrap()
            .game
            .as_ref()
            .unwrap()
            .territories_owned_by("alice")
            .next()
            .unwrap()
            .id
            .clone();

        let outcome = d.handle(
            "alice",
            conn(1000),
            ClientMessage::Deploy {
                territory,
                count: 5,
            },
            4,
        );
        assert_eq!(messages_for(&outcome, "alice").len(), 1);
        assert_eq!(messages_for(&outcome, "bob").len(), 1);
        assert_eq!(outcome.persistence.len(), 1);
    }

    #[test]
    fn test_sync_with_stale_state_returns_server_copy() {
        let mut d = dispatcher();
        let code = started(&mut d);
        let server_state = d.store().get_session(&code).unwrap().game.clone().unwrap();

        let mut stale = server_state.clone();
        stale.timestamp -= 1;
        stale.territories.values_mut().for_each(|t| t.armies = 99);

        let outcome = d.handle(
            "bob",
            conn(1001),
            ClientMessage::SyncRequest {
                code: code.clone(),
                local_state: Some(stale),
            },
            5,
        );
        let bob = messages_for(&outcome, "bob");
        assert_eq!(
            bob[0],
            &ServerMessage::GameStateUpdate {
                code: code.clone(),
                state: server_state
            }
        );
        assert_eq!(
            bob[1],
            &ServerMessage::SyncResult {
                code,
                resolution: Resolution::LocalNewer
            }
        );
    }

    #[test]
    fn test_sync_never_adopts_newer_client_state() {
        let mut d = dispatcher();
        let code = started(&mut d);
        let server_state = d.store().get_session(&code).unwrap().game.clone().unwrap();

        let mut forged = server_state.clone();
        forged.timestamp += 10_000;
        forged.phase = Phase::Victory;

        let outcome = d.handle(
            "bob",
            conn(1001),
            ClientMessage::SyncRequest {
                code: code.clone(),
                local_state: Some(forged),
            },
            5,
        );
        assert!(matches!(
            messages_for(&outcome, "bob")[0],
            ServerMessage::GameStateUpdate { state, .. } if *state == server_state
        ));
        assert_eq!(
            d.store().get_session(&code).unwrap().game.as_ref(),
            Some(&server_state)
        );
    }

    #[test]
    fn test_sync_tied_clocks_still_answer_with_server_copy() {
        let mut d = dispatcher();
        let code = started(&mut d);
        let server_state = d.store().get_session(&code).unwrap().game.clone().unwrap();

        let mut tied = server_state.clone();
        let territory = tied.territories.values_mut().next().unwrap();
        territory.armies += 7;
        territory.updated_at += 1;

        let outcome = d.handle(
            "bob",
            conn(1001),
            ClientMessage::SyncRequest {
                code: code.clone(),
                local_state: Some(tied),
            },
            5,
        );
        let bob = messages_for(&outcome, "bob");
        assert!(matches!(
            bob[0],
            ServerMessage::GameStateUpdate { state, .. } if *state == server_state
        ));
        assert_eq!(
            bob[1],
            &ServerMessage::SyncResult {
                code: code.clone(),
                resolution: Resolution::Merged
            }
        );
        assert_eq!(
            d.store().get_session(&code).unwrap().game.as_ref(),
            Some(&server_state)
        );
    }

    #[test]
    fn test_evict_expired_deletes_idle_lobbies() {
        let mut d = dispatcher();
        let running = started(&mut d);
        let lobby = create(&mut d, "carol");

        let outcome = d.evict_expired(100_000, Duration::from_secs(10));
        assert!(outcome.deliveries.is_empty());
        assert!(matches!(
            outcome.persistence.as_slice(),
            [PersistOp::Delete(code)] if *code == lobby
        ));
        assert!(d.store().get_session(&lobby).is_none());
        assert!(d.store().get_session(&running).is_some());
    }

    #[test]
    fn test_sync_requires_membership() {
        let mut d = dispatcher();
        let code = started(&mut d);
        let outcome = d.handle(
            "mallory",
            conn(2000),
            ClientMessage::SyncRequest {
                code: code.clone(),
                local_state: None,
            },
            5,
        );
        assert!(matches!(
            messages_for(&outcome, "mallory")[0],
            ServerMessage::SessionError { .. }
        ));
    }

    #[test]
    fn test_last_leave_deletes_record() {
        let mut d = dispatcher();
        let code = create(&mut d, "alice");
        let outcome = d.handle(
            "alice",
            conn(1000),
            ClientMessage::SessionLeave { code: code.clone() },
            2,
        );

        assert!(matches!(
            outcome.persistence.as_slice(),
            [PersistOp::Delete(deleted)] if *deleted == code
        ));
        assert_eq!(
            messages_for(&outcome, "alice"),
            vec![&ServerMessage::SessionClosed { code }]
        );
    }

    #[test]
    fn test_hello_resumes_running_session() {
        let mut d = dispatcher();
        let code = started(&mut d);
        d.disconnect("bob", 4);

        let outcome = d.handle(
            "bob",
            conn(3000),
            ClientMessage::Hello {
                client_version: 1,
                player_id: "bob".into(),
            },
            5,
        );
        let bob = messages_for(&outcome, "bob");
        assert_eq!(
            bob[0],
            &ServerMessage::Welcome {
                player_id: "bob".into(),
                session_code: Some(code.clone())
            }
        );
        assert!(bob
            .iter()
            .any(|m| matches!(m, ServerMessage::GameStateUpdate { .. })));
    }

    #[test]
    fn test_list_sessions() {
        let mut d = dispatcher();
        let code = create(&mut d, "alice");
        let outcome = d.handle("eve", conn(4000), ClientMessage::ListSessions, 2);

        match messages_for(&outcome, "eve")[0] {
            ServerMessage::SessionList { sessions } => {
                assert_eq!(sessions.len(), 1);
                assert_eq!(sessions[0].code, code);
            }
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[test]
    fn test_heartbeat_is_silent() {
        let mut d = dispatcher();
        assert!(d
            .handle("alice", conn(1000), ClientMessage::Heartbeat, 1)
            .is_empty());
    }

    #[test]
    fn test_sweep_disabled_without_idle_limit() {
        let mut d = dispatcher();
        started(&mut d);
        d.disconnect("alice", 4);
        assert!(d.sweep(1_000_000, None).is_empty());
        assert!(!d.sweep(1_000_000, Some(Duration::from_secs(1))).is_empty());
    }
}
