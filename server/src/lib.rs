//! # Game Server Library
//!
//! The authoritative host of a turn-based strategy match. The server owns the
//! canonical game model, decides which player actions are accepted, and
//! tells every client what happened so all boards stay identical.
//!
//! ## Core Responsibilities
//!
//! ### Optimistic Concurrency
//! Every action a client sends carries the checksum of the board it was
//! computed against. The server accepts it only if that checksum still
//! matches and the sender holds the turn (surrender is always accepted). A
//! rejected client receives a fresh snapshot and tries again from there.
//!
//! ### Propagation
//! Accepted actions are applied locally and then sent on:
//! - Movement is broadcast together with the clamped path
//! - Trades are echoed to the trading player only
//! - Battles are resolved here with one random draw per side
//! - Recruiting builds the hero and streams it to every client
//!
//! ### Connection Lifecycle
//! Players join with a handshake and are assigned a team. A player who
//! leaves mid-game is defeated and everyone is told. When only one team is
//! left the server announces the winner and stops every client.
//!
//! ## Module Organization
//!
//! - `config`: bind address, seat count, map size, fog and seed
//! - `validation`: checksum and turn checks
//! - `session`: the session loop and propagation rules
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::{ServerConfig, ServerSession};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = ServerSession::bind(ServerConfig::default()).await?;
//!     session.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod session;
pub mod validation;

pub use config::ServerConfig;
pub use session::{ServerSession, SessionState};
