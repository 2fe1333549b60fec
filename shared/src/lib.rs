//! # Shared Synchronization Core
//!
//! Types and logic both the server and the clients need to agree on: the game
//! model and its board checksum, the text wire protocol, the paired
//! connection transport, the apply layer that turns confirmed messages into
//! model changes, and the grid pathfinder used to compute and clamp movement.
//!
//! ## Consistency Model
//!
//! The server holds the authoritative model. Clients propose actions stamped
//! with the checksum of the board they saw; the server only accepts an action
//! whose checksum matches its own and whose sender holds the turn, applies
//! it, and broadcasts it. Everyone applies the broadcast through the same
//! `ApplyLayer` handlers, so identical message sequences yield identical
//! boards. Anyone who falls out of step asks for a full snapshot.

pub mod apply;
pub mod error;
pub mod message;
pub mod model;
pub mod pathfinding;
pub mod position;
pub mod transport;

pub use apply::{Applied, ApplyLayer, PayloadSource, SharedGameModel};
pub use error::{ApplyError, GameStateError, SessionError, TransportError};
pub use message::{Opcode, WireMessage};
pub use model::{EntityId, EntityRef, GameEvent, GameModel, GamePhase, Interaction, Team};
pub use pathfinding::PathMap;
pub use position::Position;
pub use transport::{Connection, ConnectionId, Inbound, NetContext, Payload, PayloadKind, Roster};

/// Default port the server listens on.
pub const DEFAULT_PORT: u16 = 8080;
