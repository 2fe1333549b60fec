//! Applies confirmed messages to the game model.
//!
//! Both roles run the same handlers so that identical message sequences
//! produce identical boards. Payloads a message depends on are pulled from
//! the origin's data stream before any handler runs, so a failed lookup never
//! leaves an unread frame behind.

use async_trait::async_trait;
use log::{debug, trace};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{ApplyError, GameStateError, TransportError};
use crate::message::{Opcode, WireMessage};
use crate::model::{Battlefield, GameModel, Hero};
use crate::position::Position;
use crate::transport::{ConnectionId, Payload, PayloadKind};

pub type SharedGameModel = Arc<Mutex<GameModel>>;

/// Where handlers get the binary half of a message from.
#[async_trait]
pub trait PayloadSource: Send + Sync {
    async fn read_path(&self, origin: &ConnectionId) -> Result<Vec<Position>, TransportError>;
    async fn read_hero(&self, origin: &ConnectionId) -> Result<Hero, TransportError>;
    async fn read_battlefield(&self, origin: &ConnectionId) -> Result<Battlefield, TransportError>;
}

/// What applying a message changed beyond the model itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Applied {
    /// Steps a hero actually walked, after clamping.
    pub moved_path: Option<Vec<Position>>,
}

struct ApplyContext<'a> {
    model: &'a mut GameModel,
    payload: Option<Payload>,
}

impl ApplyContext<'_> {
    fn take_payload(&mut self, expected: PayloadKind) -> Result<Payload, GameStateError> {
        self.payload
            .take()
            .ok_or_else(|| GameStateError::Corrupt(format!("{} payload was not fetched", expected)))
    }
}

type Handler = fn(&mut ApplyContext<'_>, &WireMessage) -> Result<Applied, GameStateError>;

fn handler_for(opcode: Opcode) -> Option<Handler> {
    let handler: Handler = match opcode {
        Opcode::MoveHero => move_hero,
        Opcode::HeroBattle => hero_battle,
        Opcode::HeroTrade => hero_trade,
        Opcode::TradeConcluded => trade_concluded,
        Opcode::TownBattle | Opcode::TownCaptured => capture_town,
        Opcode::TownInteract => town_interact,
        Opcode::CaptureResource => capture_resource,
        Opcode::EndBattleTurn => end_battle_turn,
        Opcode::HeroDefeated => hero_defeated,
        Opcode::TeamDefeated => team_defeated,
        Opcode::TurnEnd => turn_end,
        Opcode::AddHero => add_hero,
        Opcode::PlayerDisconnected => player_disconnected,
        Opcode::Victory => victory,
        Opcode::GetBattlefield => battlefield_received,
        _ => return None,
    };
    Some(handler)
}

/// Payload a message carries on the data stream, if any.
pub fn inbound_payload(opcode: Opcode) -> Option<PayloadKind> {
    match opcode {
        Opcode::MoveHero => Some(PayloadKind::Path),
        Opcode::AddHero => Some(PayloadKind::Hero),
        Opcode::GetBattlefield => Some(PayloadKind::Battlefield),
        _ => None,
    }
}

pub struct ApplyLayer {
    model: SharedGameModel,
}

impl ApplyLayer {
    pub fn new(model: GameModel) -> Self {
        Self {
            model: Arc::new(Mutex::new(model)),
        }
    }

    pub fn model(&self) -> &SharedGameModel {
        &self.model
    }

    /// Locks the model for the whole application, payload reads included.
    pub async fn apply(
        &self,
        message: &WireMessage,
        origin: &ConnectionId,
        source: &dyn PayloadSource,
    ) -> Result<Applied, ApplyError> {
        let mut model = self.model.lock().await;
        Self::apply_locked(&mut model, message, origin, source).await
    }

    /// Applies `message` to a model the caller already holds the lock for.
    pub async fn apply_locked(
        model: &mut GameModel,
        message: &WireMessage,
        origin: &ConnectionId,
        source: &dyn PayloadSource,
    ) -> Result<Applied, ApplyError> {
        let payload = match inbound_payload(message.opcode()) {
            Some(PayloadKind::Path) => Some(Payload::Path(source.read_path(origin).await?)),
            Some(PayloadKind::Hero) => Some(Payload::Hero(source.read_hero(origin).await?)),
            Some(PayloadKind::Battlefield) => Some(Payload::Battlefield(source.read_battlefield(origin).await?)),
            Some(PayloadKind::GameState) | None => None,
        };

        let handler = match handler_for(message.opcode()) {
            Some(handler) => handler,
            None => {
                trace!("No state change for {}", message.opcode());
                return Ok(Applied::default());
            }
        };

        let mut context = ApplyContext { model, payload };
        let applied = handler(&mut context, message)?;
        debug!("Applied {}, checksum now {}", message, context.model.checksum());
        Ok(applied)
    }
}

fn move_hero(ctx: &mut ApplyContext<'_>, message: &WireMessage) -> Result<Applied, GameStateError> {
    let path = match ctx.take_payload(PayloadKind::Path)? {
        Payload::Path(path) => path,
        _ => return Err(GameStateError::Corrupt("path payload expected".into())),
    };
    let hero = message.id_arg(0)?;
    let moved = ctx.model.move_hero(hero, &path)?;
    Ok(Applied {
        moved_path: Some(moved),
    })
}

fn hero_battle(ctx: &mut ApplyContext<'_>, message: &WireMessage) -> Result<Applied, GameStateError> {
    ctx.model.hero(message.id_arg(0)?)?;
    ctx.model.hero(message.id_arg(1)?)?;
    ctx.model.start_battle();
    Ok(Applied::default())
}

fn hero_trade(ctx: &mut ApplyContext<'_>, message: &WireMessage) -> Result<Applied, GameStateError> {
    ctx.model.hero(message.id_arg(0)?)?;
    ctx.model.hero(message.id_arg(1)?)?;
    ctx.model.trade();
    Ok(Applied::default())
}

fn trade_concluded(ctx: &mut ApplyContext<'_>, _message: &WireMessage) -> Result<Applied, GameStateError> {
    ctx.model.trade_concluded();
    Ok(Applied::default())
}

fn capture_town(ctx: &mut ApplyContext<'_>, message: &WireMessage) -> Result<Applied, GameStateError> {
    ctx.model.capture_town(message.id_arg(0)?, message.id_arg(1)?)?;
    Ok(Applied::default())
}

fn town_interact(ctx: &mut ApplyContext<'_>, message: &WireMessage) -> Result<Applied, GameStateError> {
    ctx.model.hero(message.id_arg(0)?)?;
    ctx.model.town(message.id_arg(1)?)?;
    Ok(Applied::default())
}

fn capture_resource(ctx: &mut ApplyContext<'_>, message: &WireMessage) -> Result<Applied, GameStateError> {
    ctx.model.capture_mine(message.id_arg(0)?, message.id_arg(1)?)?;
    Ok(Applied::default())
}

fn end_battle_turn(ctx: &mut ApplyContext<'_>, _message: &WireMessage) -> Result<Applied, GameStateError> {
    ctx.model.battle_concluded();
    Ok(Applied::default())
}

fn hero_defeated(ctx: &mut ApplyContext<'_>, message: &WireMessage) -> Result<Applied, GameStateError> {
    ctx.model.kill_hero(message.id_arg(0)?)?;
    Ok(Applied::default())
}

fn team_defeated(ctx: &mut ApplyContext<'_>, message: &WireMessage) -> Result<Applied, GameStateError> {
    ctx.model.defeat_team(message.team_arg(0)?)?;
    Ok(Applied::default())
}

fn turn_end(ctx: &mut ApplyContext<'_>, _message: &WireMessage) -> Result<Applied, GameStateError> {
    ctx.model.end_turn();
    Ok(Applied::default())
}

fn add_hero(ctx: &mut ApplyContext<'_>, message: &WireMessage) -> Result<Applied, GameStateError> {
    let hero = match ctx.take_payload(PayloadKind::Hero)? {
        Payload::Hero(hero) => hero,
        _ => return Err(GameStateError::Corrupt("hero payload expected".into())),
    };
    let team = message.team_arg(0)?;
    let town = message.id_arg(1)?;
    ctx.model.buy_hero(team, hero, town)?;
    Ok(Applied::default())
}

fn player_disconnected(ctx: &mut ApplyContext<'_>, message: &WireMessage) -> Result<Applied, GameStateError> {
    ctx.model.notify_disconnected(message.team_arg(0)?);
    Ok(Applied::default())
}

fn victory(ctx: &mut ApplyContext<'_>, message: &WireMessage) -> Result<Applied, GameStateError> {
    ctx.model.declare_victory(message.team_arg(0)?);
    Ok(Applied::default())
}

fn battlefield_received(ctx: &mut ApplyContext<'_>, _message: &WireMessage) -> Result<Applied, GameStateError> {
    let battlefield = match ctx.take_payload(PayloadKind::Battlefield)? {
        Payload::Battlefield(battlefield) => battlefield,
        _ => return Err(GameStateError::Corrupt("battlefield payload expected".into())),
    };
    ctx.model.set_battlefield(battlefield);
    Ok(Applied::default())
}
