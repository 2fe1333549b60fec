//! # Game Client Library
//!
//! The player side of a turn-based strategy match. The client keeps a copy
//! of the game model that mirrors the server's, proposes actions computed
//! against it, and applies only what the server confirms.
//!
//! ## Architecture Overview
//!
//! ### Server Authority
//! Nothing the player does is applied locally first. Actions are stamped
//! with the checksum of the local board and sent; the server either
//! broadcasts them back to everyone or answers with a fresh snapshot.
//!
//! ### Movement and Interactions
//! A path is truncated to the hero's remaining movement before it is sent.
//! When a hero has to walk up to its target first, the interaction waits in
//! a one-slot chain and goes out, re-stamped, once the move is confirmed.
//!
//! ### Recovery
//! A message that refers to something the local board lacks triggers one
//! sync request. A corrupt board or a peer that speaks a different payload
//! format ends the session.
//!
//! ## Module Organization
//!
//! - `config`: server address and player name
//! - `session`: the session loop, `ClientHandle` and `ClientEvent`
//! - `input`: text commands for the headless binary
//! - `rendering`: text rendering of the board and status
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::{ClientConfig, ClientEvent, ClientSession};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (session, handle, mut events) = ClientSession::connect(ClientConfig::default()).await?;
//!     tokio::spawn(session.run());
//!
//!     while let Some(event) = events.recv().await {
//!         if let ClientEvent::Joined(team) = event {
//!             println!("playing as {}", team);
//!             handle.end_turn()?;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod input;
pub mod rendering;
pub mod session;

pub use config::ClientConfig;
pub use session::{ClientCommand, ClientEvent, ClientHandle, ClientSession, ClientState};
