//! Text protocol messages.
//!
//! Every action travels as one line, `OPCODE;SENDER;CHECKSUM;arg0;arg1;...`.
//! Messages are only built through the named constructors below so that the
//! argument order always matches what the receiving handler decodes. The
//! sender and checksum are stamped by the transport right before the line is
//! written ("rebranding"), which lets a message be prepared before the final
//! identity or board state is known.

use log::trace;
use std::fmt;

use crate::error::GameStateError;
use crate::model::{EntityId, Interaction, Team};

const DELIMITER: char = ';';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Sync,
    SyncSent,
    Stop,
    StopAck,
    MoveHero,
    Handshake,
    GetBattlefield,
    TurnEnd,
    HeroDefeated,
    CaptureResource,
    TownBattle,
    TownInteract,
    TownCaptured,
    HeroBattle,
    HeroTrade,
    TradeConcluded,
    TeamDefeated,
    Victory,
    AssignId,
    EndBattleTurn,
    Surrender,
    ConnectionLost,
    PlayerDisconnected,
    BuyHero,
    AddHero,
}

impl Opcode {
    pub const ALL: [Opcode; 25] = [
        Opcode::Sync,
        Opcode::SyncSent,
        Opcode::Stop,
        Opcode::StopAck,
        Opcode::MoveHero,
        Opcode::Handshake,
        Opcode::GetBattlefield,
        Opcode::TurnEnd,
        Opcode::HeroDefeated,
        Opcode::CaptureResource,
        Opcode::TownBattle,
        Opcode::TownInteract,
        Opcode::TownCaptured,
        Opcode::HeroBattle,
        Opcode::HeroTrade,
        Opcode::TradeConcluded,
        Opcode::TeamDefeated,
        Opcode::Victory,
        Opcode::AssignId,
        Opcode::EndBattleTurn,
        Opcode::Surrender,
        Opcode::ConnectionLost,
        Opcode::PlayerDisconnected,
        Opcode::BuyHero,
        Opcode::AddHero,
    ];

    pub fn token(&self) -> &'static str {
        match self {
            Opcode::Sync => "SYNC",
            Opcode::SyncSent => "SYNC_SENT",
            Opcode::Stop => "STOP",
            Opcode::StopAck => "STOP_ACK",
            Opcode::MoveHero => "MOVE_HERO",
            Opcode::Handshake => "HANDSHAKE",
            Opcode::GetBattlefield => "GET_BATTLEFIELD",
            Opcode::TurnEnd => "TURN_END",
            Opcode::HeroDefeated => "HERO_DEFEATED",
            Opcode::CaptureResource => "CAPTURE_RESOURCE",
            Opcode::TownBattle => "TOWN_BATTLE",
            Opcode::TownInteract => "TOWN_INTERACT",
            Opcode::TownCaptured => "TOWN_CAPTURED",
            Opcode::HeroBattle => "HERO_BATTLE",
            Opcode::HeroTrade => "HERO_TRADE",
            Opcode::TradeConcluded => "TRADE_CONCLUDED",
            Opcode::TeamDefeated => "TEAM_DEFEATED",
            Opcode::Victory => "VICTORY",
            Opcode::AssignId => "ASSIGN_ID",
            Opcode::EndBattleTurn => "END_BATTLE_TURN",
            Opcode::Surrender => "SURRENDER",
            Opcode::ConnectionLost => "CONNECTION_LOST",
            Opcode::PlayerDisconnected => "PLAYER_DISCONNECTED",
            Opcode::BuyHero => "BUY_HERO",
            Opcode::AddHero => "ADD_HERO",
        }
    }

    pub fn from_token(token: &str) -> Option<Opcode> {
        Self::ALL.iter().find(|op| op.token() == token).copied()
    }

    /// Declared argument count. Diagnostic only: several builders send a
    /// different number and parsing never enforces it.
    pub fn expected_arguments(&self) -> usize {
        match self {
            Opcode::MoveHero
            | Opcode::CaptureResource
            | Opcode::TownBattle
            | Opcode::TownInteract
            | Opcode::TownCaptured
            | Opcode::HeroBattle
            | Opcode::HeroTrade
            | Opcode::AssignId
            | Opcode::AddHero => 2,
            Opcode::HeroDefeated
            | Opcode::TeamDefeated
            | Opcode::Victory
            | Opcode::PlayerDisconnected
            | Opcode::BuyHero => 1,
            _ => 0,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    opcode: Opcode,
    sender: Team,
    checksum: u32,
    args: Vec<String>,
}

impl WireMessage {
    fn new(opcode: Opcode, args: Vec<String>) -> Self {
        let message = Self {
            opcode,
            sender: Team::Neutral,
            checksum: 0,
            args,
        };
        trace!("Constructed message {}", message);
        message
    }

    pub fn move_hero(hero: EntityId) -> Self {
        Self::new(Opcode::MoveHero, vec![hero.to_string()])
    }

    pub fn hero_battle(actor: EntityId, target: EntityId) -> Self {
        Self::new(Opcode::HeroBattle, vec![actor.to_string(), target.to_string()])
    }

    pub fn hero_trade(actor: EntityId, target: EntityId) -> Self {
        Self::new(Opcode::HeroTrade, vec![actor.to_string(), target.to_string()])
    }

    pub fn capture_resource(hero: EntityId, mine: EntityId) -> Self {
        Self::new(Opcode::CaptureResource, vec![hero.to_string(), mine.to_string()])
    }

    pub fn town_battle(hero: EntityId, town: EntityId) -> Self {
        Self::new(Opcode::TownBattle, vec![hero.to_string(), town.to_string()])
    }

    pub fn town_interact(hero: EntityId, town: EntityId) -> Self {
        Self::new(Opcode::TownInteract, vec![hero.to_string(), town.to_string()])
    }

    pub fn town_captured(hero: EntityId, town: EntityId) -> Self {
        Self::new(Opcode::TownCaptured, vec![hero.to_string(), town.to_string()])
    }

    pub fn assign_id(team: Team) -> Self {
        Self::new(Opcode::AssignId, vec![team.token().to_string()])
    }

    pub fn end_battle_turn() -> Self {
        Self::new(Opcode::EndBattleTurn, Vec::new())
    }

    pub fn trade_concluded() -> Self {
        Self::new(Opcode::TradeConcluded, Vec::new())
    }

    pub fn sync() -> Self {
        Self::new(Opcode::Sync, Vec::new())
    }

    pub fn sync_sent() -> Self {
        Self::new(Opcode::SyncSent, Vec::new())
    }

    pub fn stop() -> Self {
        Self::new(Opcode::Stop, Vec::new())
    }

    pub fn stop_ack() -> Self {
        Self::new(Opcode::StopAck, Vec::new())
    }

    /// Player names are free text; delimiters and line breaks are replaced.
    pub fn handshake(player_name: &str) -> Self {
        Self::new(Opcode::Handshake, vec![sanitize(player_name)])
    }

    pub fn get_battlefield() -> Self {
        Self::new(Opcode::GetBattlefield, Vec::new())
    }

    pub fn turn_end() -> Self {
        Self::new(Opcode::TurnEnd, Vec::new())
    }

    pub fn surrender() -> Self {
        Self::new(Opcode::Surrender, Vec::new())
    }

    pub fn team_defeated(team: Team) -> Self {
        Self::new(Opcode::TeamDefeated, vec![team.token().to_string()])
    }

    pub fn victory(team: Team) -> Self {
        Self::new(Opcode::Victory, vec![team.token().to_string()])
    }

    pub fn hero_defeated(hero: EntityId) -> Self {
        Self::new(Opcode::HeroDefeated, vec![hero.to_string()])
    }

    pub fn connection_lost() -> Self {
        Self::new(Opcode::ConnectionLost, Vec::new())
    }

    pub fn player_disconnected(team: Team) -> Self {
        Self::new(Opcode::PlayerDisconnected, vec![team.token().to_string()])
    }

    pub fn buy_hero(town: EntityId) -> Self {
        Self::new(Opcode::BuyHero, vec![town.to_string()])
    }

    pub fn add_hero(team: Team, town: EntityId) -> Self {
        Self::new(Opcode::AddHero, vec![team.token().to_string(), town.to_string()])
    }

    /// The request for an interaction. Plain movement has none.
    pub fn for_interaction(interaction: Interaction) -> Option<Self> {
        match interaction {
            Interaction::Move => None,
            Interaction::HeroTrade { hero, target } => Some(Self::hero_trade(hero, target)),
            Interaction::HeroBattle { hero, target } => Some(Self::hero_battle(hero, target)),
            Interaction::TownInteract { hero, town } => Some(Self::town_interact(hero, town)),
            Interaction::TownBattle { hero, town } => Some(Self::town_battle(hero, town)),
            Interaction::CaptureResource { hero, mine } => Some(Self::capture_resource(hero, mine)),
        }
    }

    /// Parses one received line. Anything unrecognized yields `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut fields = line.split(DELIMITER);
        let opcode = Opcode::from_token(fields.next()?)?;
        let sender = Team::from_token(fields.next()?)?;
        let checksum = fields.next()?.parse::<u32>().ok()?;
        let args: Vec<String> = fields.map(str::to_string).collect();

        let message = Self {
            opcode,
            sender,
            checksum,
            args,
        };
        if !message.matches_declared_arity() {
            trace!("{} carries {} arguments, declared {}", opcode, message.args.len(), opcode.expected_arguments());
        }
        Some(message)
    }

    /// Wire form without the trailing line break.
    pub fn to_wire(&self) -> String {
        let mut line = format!("{}{}{}{}{}", self.opcode, DELIMITER, self.sender, DELIMITER, self.checksum);
        for arg in &self.args {
            line.push(DELIMITER);
            line.push_str(arg);
        }
        line
    }

    pub fn rebrand(&mut self, sender: Team) {
        self.sender = sender;
    }

    pub fn update_checksum(&mut self, checksum: u32) {
        self.checksum = checksum;
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn sender(&self) -> Team {
        self.sender
    }

    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn matches_declared_arity(&self) -> bool {
        self.args.len() == self.opcode.expected_arguments()
    }

    pub fn arg(&self, index: usize) -> Result<&str, GameStateError> {
        self.args
            .get(index)
            .map(String::as_str)
            .ok_or(GameStateError::MissingArgument { index })
    }

    pub fn id_arg(&self, index: usize) -> Result<EntityId, GameStateError> {
        let raw = self.arg(index)?;
        raw.parse().map_err(|_| GameStateError::InvalidArgument {
            value: raw.to_string(),
        })
    }

    pub fn team_arg(&self, index: usize) -> Result<Team, GameStateError> {
        let raw = self.arg(index)?;
        Team::from_token(raw).ok_or_else(|| GameStateError::InvalidArgument {
            value: raw.to_string(),
        })
    }
}

impl fmt::Display for WireMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.to_wire())
    }
}

fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| if c == DELIMITER || c == '\n' || c == '\r' { '_' } else { c })
        .collect()
}
