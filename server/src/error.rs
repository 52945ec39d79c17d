//! Rejection reasons for client intents.

use shared::assignment::AssignmentError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("session {0} not found")]
    SessionNotFound(String),

    #[error("session {0} is full")]
    SessionFull(String),

    #[error("session {0} has already started")]
    GameAlreadyInProgress(String),

    #[error("it is not your turn")]
    NotPlayersTurn,

    #[error("action not allowed during the {0} phase")]
    WrongPhase(&'static str),

    #[error("territory {0} does not exist")]
    TerritoryNotFound(String),

    #[error("you do not own territory {0}")]
    NotOwner(String),

    #[error("you cannot attack your own territory {0}")]
    OwnTerritory(String),

    #[error("{0} is not adjacent to {1}")]
    NotAdjacent(String, String),

    #[error("not enough armies: {0}")]
    InsufficientArmies(String),

    #[error("invalid army count: {0}")]
    InvalidArmyCount(String),

    #[error("no path of your own territories connects {0} to {1}")]
    NoConnectedPath(String, String),

    #[error("invalid player count {0}: a game needs between 2 and 6 players")]
    InvalidPlayerCount(usize),

    #[error("could not find an unused session code after {0} attempts")]
    CodeSpaceExhausted(usize),

    #[error("unknown player {0}")]
    PlayerNotFound(String),

    #[error("you are not a member of session {0}")]
    NotSessionMember(String),

    #[error("you are already in session {0}")]
    AlreadyInSession(String),

    #[error("only the host can do that")]
    NotHost,

    #[error("the game has not started")]
    GameNotStarted,

    #[error("the game is over")]
    GameFinished,

    #[error("finish moving armies into {0} first")]
    ConquestPending(String),

    #[error("there is no conquest to complete")]
    NoPendingConquest,

    #[error("you have already fortified this turn")]
    AlreadyFortified,

    #[error("{0} armies still need to be deployed")]
    UndeployedArmies(u32),

    #[error("source and target are the same territory")]
    SameTerritory,
}

impl GameError {
    /// True for failures of an in-game action, reported as a turn
    /// validation error rather than a session error.
    pub fn is_rule_violation(&self) -> bool {
        matches!(
            self,
            GameError::NotPlayersTurn
                | GameError::WrongPhase(_)
                | GameError::TerritoryNotFound(_)
                | GameError::NotOwner(_)
                | GameError::OwnTerritory(_)
                | GameError::NotAdjacent(_, _)
                | GameError::InsufficientArmies(_)
                | GameError::InvalidArmyCount(_)
                | GameError::NoConnectedPath(_, _)
                | GameError::GameFinished
                | GameError::ConquestPending(_)
                | GameError::NoPendingConquest
                | GameError::AlreadyFortified
                | GameError::UndeployedArmies(_)
                | GameError::SameTerritory
        )
    }
}

impl From<AssignmentError> for GameError {
    fn from(err: AssignmentError) -> Self {
        match err {
            AssignmentError::InvalidPlayerCount(n) => GameError::InvalidPlayerCount(n),
        }
    }
}

pub type GameResult<T> = Result<T, GameError>;
