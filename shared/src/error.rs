use thiserror::Error;

use crate::model::Team;
use crate::transport::PayloadKind;

/// Failures of a connection's text or data stream.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Expected {expected} payload, received {found}")]
    UnexpectedPayload {
        expected: PayloadKind,
        found: PayloadKind,
    },

    #[error("Undecodable payload: {0}")]
    UnknownPayload(String),

    #[error("Frame of {0} bytes exceeds the frame limit")]
    FrameTooLarge(usize),

    #[error("Connection closed")]
    Closed,
}

impl TransportError {
    /// A wrong-shape payload is answered with a resync; everything else ends
    /// the connection.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TransportError::UnexpectedPayload { .. })
    }
}

impl From<bincode::Error> for TransportError {
    fn from(err: bincode::Error) -> Self {
        match *err {
            bincode::ErrorKind::Io(io) => TransportError::Io(io),
            other => TransportError::UnknownPayload(other.to_string()),
        }
    }
}

/// A message referenced state the local game model does not have.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GameStateError {
    #[error("Unknown hero {0}")]
    UnknownHero(String),

    #[error("Unknown town {0}")]
    UnknownTown(String),

    #[error("Unknown mine {0}")]
    UnknownMine(String),

    #[error("Team {0} is not part of the game")]
    UnknownTeam(Team),

    #[error("Missing argument {index}")]
    MissingArgument { index: usize },

    #[error("Invalid argument {value:?}")]
    InvalidArgument { value: String },

    #[error("Position {0} is outside the map")]
    OutOfBounds(crate::position::Position),

    #[error("Team {team} cannot afford {cost} gold")]
    InsufficientResources { team: Team, cost: u32 },

    #[error("Game state is corrupt: {0}")]
    Corrupt(String),
}

impl GameStateError {
    pub fn is_corrupt(&self) -> bool {
        matches!(self, GameStateError::Corrupt(_))
    }
}

#[derive(Error, Debug)]
pub enum ApplyError {
    #[error(transparent)]
    State(#[from] GameStateError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ApplyError {
    /// Missing entities and wrong-shape payloads are cured by one resync.
    pub fn needs_resync(&self) -> bool {
        match self {
            ApplyError::State(err) => !err.is_corrupt(),
            ApplyError::Transport(err) => err.is_recoverable(),
        }
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Authoritative state is corrupt: {0}")]
    CorruptState(GameStateError),

    #[error("Incompatible peer: {0}")]
    IncompatiblePeer(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
