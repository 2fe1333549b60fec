//! Optimistic-concurrency check for player actions.
//!
//! A client stamps every action with the checksum of the board it acted on.
//! The server accepts the action only if that board is still the current one
//! and the sender holds the turn. Anything else gets a fresh snapshot instead.

use shared::{GameModel, Opcode, Team, WireMessage};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    StaleChecksum { expected: u32, found: u32 },
    NotTurnHolder { sender: Team, turn_taker: Option<Team> },
    /// The line claims a team other than the one bound to its connection.
    WrongSender { claimed: Team, bound: Team },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::StaleChecksum { expected, found } => {
                write!(f, "checksum {} does not match board {}", found, expected)
            }
            Rejection::NotTurnHolder { sender, turn_taker } => match turn_taker {
                Some(holder) => write!(f, "{} acted during the turn of {}", sender, holder),
                None => write!(f, "{} acted with no turn in progress", sender),
            },
            Rejection::WrongSender { claimed, bound } => {
                write!(f, "message claims {} on a connection bound to {}", claimed, bound)
            }
        }
    }
}

/// Opcodes only the server originates. Clients sending them are ignored.
pub fn is_server_authored(opcode: Opcode) -> bool {
    matches!(
        opcode,
        Opcode::SyncSent
            | Opcode::AssignId
            | Opcode::HeroDefeated
            | Opcode::TeamDefeated
            | Opcode::Victory
            | Opcode::AddHero
            | Opcode::PlayerDisconnected
            | Opcode::TownCaptured
    )
}

/// Surrender is always accepted.
pub fn validate(model: &GameModel, message: &WireMessage, bound: Team) -> Result<(), Rejection> {
    if message.opcode() == Opcode::Surrender {
        return Ok(());
    }
    if message.sender() != bound {
        return Err(Rejection::WrongSender {
            claimed: message.sender(),
            bound,
        });
    }

    let expected = model.checksum();
    if message.checksum() != expected {
        return Err(Rejection::StaleChecksum {
            expected,
            found: message.checksum(),
        });
    }

    let turn_taker = model.turn_taker();
    if !model.started() || turn_taker != Some(message.sender()) {
        return Err(Rejection::NotTurnHolder {
            sender: message.sender(),
            turn_taker,
        });
    }
    Ok(())
}
