//! Client-side view of the server's state
//!
//! The client never computes game state. It keeps the last copy the
//! server published, and hands that copy back on `sync` so the server can
//! tell it how stale it was.

use log::debug;
use shared::{GameState, PlayerId, ServerMessage, SessionSnapshot};

#[derive(Debug, Clone, Default)]
pub struct ClientGameState {
    pub player_id: PlayerId,
    pub session: Option<SessionSnapshot>,
    pub game: Option<GameState>,
    pub last_error: Option<String>,
}

impl ClientGameState {
    pub fn new(player_id: &str) -> Self {
        Self {
            player_id: player_id.to_string(),
            ..Self::default()
        }
    }

    pub fn session_code(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.code.as_str())
    }

    pub fn is_my_turn(&self) -> bool {
        self.game
            .as_ref()
            .map(|g| g.is_current_player(&self.player_id))
            .unwrap_or(false)
    }

    /// Cached state to offer on sync, when it belongs to `code`.
    pub fn local_state_for(&self, code: &str) -> Option<GameState> {
        if self.session_code()?.eq_ignore_ascii_case(code) {
            self.game.clone()
        } else {
            None
        }
    }

    /// Folds one server notification into the local view.
    pub fn apply_server_message(&mut self, message: &ServerMessage) {
        match message {
            ServerMessage::Welcome { session_code, .. } => {
                if session_code.is_none() {
                    self.session = None;
                    self.game = None;
                }
            }
            ServerMessage::SessionUpdate { session } => {
                self.session = Some(session.clone());
            }
            ServerMessage::PlayersUpdate { code, roster } => {
                if let Some(session) = self.session.as_mut().filter(|s| &s.code == code) {
                    session.players = roster.clone();
                }
            }
            ServerMessage::SessionClosed { code } => {
                if self.session_code() == Some(code.as_str()) {
                    self.session = None;
                    self.game = None;
                }
            }
            ServerMessage::GameStateUpdate { state, .. } => {
                let stale = self
                    .game
                    .as_ref()
                    .map(|current| current.version > state.version)
                    .unwrap_or(false);
                if stale {
                    debug!("Ignoring out-of-order state v{}", state.version);
                } else {
                    self.game = Some(state.clone());
                }
            }
            ServerMessage::ValidationError { reason } | ServerMessage::SessionError { reason } => {
                self.last_error = Some(reason.clone());
            }
            ServerMessage::Disconnected { .. } => {
                self.session = None;
                self.game = None;
            }
            _ => {}
        }
    }
}
