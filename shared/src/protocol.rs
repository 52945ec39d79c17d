//! Wire protocol between clients and the authoritative server.
//!
//! Every datagram carries exactly one message, serialized with bincode.
//! Each intent is its own variant with a typed payload, so an unknown tag
//! fails to decode and never reaches the game logic.

use crate::map::TerritoryId;
use crate::model::{AttackReport, GameState, PlayerId, PlayerSummary, SessionSnapshot, SessionSummary};
use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: u32 = 1;

/// Maximum encoded datagram size accepted by either side.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Client to server intents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    Hello {
        client_version: u32,
        player_id: PlayerId,
    },
    Heartbeat,
    Disconnect,

    SessionCreate {
        host_name: String,
        max_players: usize,
    },
    SessionJoin {
        code: String,
        player_name: String,
    },
    SessionLeave {
        code: String,
    },
    PlayerReady {
        code: String,
        ready: bool,
    },
    SessionStart {
        code: String,
        seed: Option<u64>,
    },

    Deploy {
        territory: TerritoryId,
        count: u32,
    },
    Attack {
        attacker: TerritoryId,
        defender: TerritoryId,
        committed_armies: u32,
    },
    CompleteConquest {
        transfer_count: u32,
    },
    Fortify {
        source: TerritoryId,
        target: TerritoryId,
        count: u32,
    },
    AdvancePhase,

    SyncRequest {
        code: String,
        local_state: Option<GameState>,
    },
    ListSessions,
}

impl ClientMessage {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Hello { .. } => "hello",
            ClientMessage::Heartbeat => "heartbeat",
            ClientMessage::Disconnect => "disconnect",
            ClientMessage::SessionCreate { .. } => "session.create",
            ClientMessage::SessionJoin { .. } => "session.join",
            ClientMessage::SessionLeave { .. } => "session.leave",
            ClientMessage::PlayerReady { .. } => "player.ready",
            ClientMessage::SessionStart { .. } => "session.start",
            ClientMessage::Deploy { .. } => "action.deploy",
            ClientMessage::Attack { .. } => "action.attack",
            ClientMessage::CompleteConquest { .. } => "action.completeConquest",
            ClientMessage::Fortify { .. } => "action.fortify",
            ClientMessage::AdvancePhase => "action.advancePhase",
            ClientMessage::SyncRequest { .. } => "state.syncRequest",
            ClientMessage::ListSessions => "session.list",
        }
    }
}

/// Conflict resolution outcome reported back to a syncing client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    Identical,
    RemoteNewer,
    LocalNewer,
    Version,
    Merged,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Identical => "identical",
            Resolution::RemoteNewer => "remote_newer",
            Resolution::LocalNewer => "local_newer",
            Resolution::Version => "version",
            Resolution::Merged => "merged",
        }
    }
}

/// Server to client notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    Welcome {
        player_id: PlayerId,
        session_code: Option<String>,
    },
    Disconnected {
        reason: String,
    },

    SessionUpdate {
        session: SessionSnapshot,
    },
    PlayersUpdate {
        code: String,
        roster: Vec<PlayerSummary>,
    },
    SessionClosed {
        code: String,
    },
    GameStateUpdate {
        code: String,
        state: GameState,
    },
    AttackResult {
        code: String,
        report: AttackReport,
    },
    TurnStart {
        current_player_id: PlayerId,
        turn_number: u32,
    },
    ValidationError {
        reason: String,
    },
    SessionError {
        reason: String,
    },
    SyncResult {
        code: String,
        resolution: Resolution,
    },
    SessionList {
        sessions: Vec<SessionSummary>,
    },
}

pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, bincode::Error> {
    bincode::serialize(message)
}

pub fn decode_client(bytes: &[u8]) -> Result<ClientMessage, bincode::Error> {
    bincode::deserialize(bytes)
}

pub fn decode_server(bytes: &[u8]) -> Result<ServerMessage, bincode::Error> {
    bincode::deserialize(bytes)
}
