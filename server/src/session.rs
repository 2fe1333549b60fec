//! Authoritative game session.
//!
//! One task owns the session. It merges the lines of every connection into a
//! single queue and handles them one at a time while holding the game model
//! lock: validate, apply, propagate. Rejected actions are answered with a
//! full snapshot to the sender only.

use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::apply::inbound_payload;
use shared::model::skirmish::build_skirmish;
use shared::model::Battlefield;
use shared::{
    ApplyError, ApplyLayer, Connection, ConnectionId, GameModel, GameStateError, Inbound, NetContext, Opcode,
    Payload, Roster, SessionError, SharedGameModel, Team, WireMessage,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::ServerConfig;
use crate::validation::{is_server_authored, validate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingConnections,
    Active,
    Terminating,
    Closed,
}

pub struct ServerSession {
    context: Arc<NetContext>,
    layer: ApplyLayer,
    roster: Roster,
    state: SessionState,
    rng: StdRng,
    local_addr: SocketAddr,
    inbound_rx: mpsc::UnboundedReceiver<Inbound>,
    accepted_rx: mpsc::UnboundedReceiver<Arc<Connection>>,
}

impl ServerSession {
    /// Builds the skirmish board and starts accepting players.
    pub async fn bind(config: ServerConfig) -> Result<Self, SessionError> {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let model = build_skirmish(config.players, config.map_width, config.map_height, config.fog, &mut rng)
            .map_err(|e| SessionError::InvalidConfig(e.to_string()))?;

        let context = NetContext::new();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (local_addr, accepted_rx) = context.serve(&config.address(), config.players, inbound_tx).await?;

        Ok(Self {
            context,
            layer: ApplyLayer::new(model),
            roster: Roster::new(),
            state: SessionState::AwaitingConnections,
            rng,
            local_addr,
            inbound_rx,
            accepted_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn model(&self) -> SharedGameModel {
        Arc::clone(self.layer.model())
    }

    /// Runs until every connection is gone after the game ended, or until
    /// all peers vanish. A corrupt model ends the session with an error.
    pub async fn run(mut self) -> Result<(), SessionError> {
        info!("Server session running on {}", self.local_addr);

        let result = loop {
            if self.state == SessionState::Closed {
                break Ok(());
            }
            tokio::select! {
                Some(connection) = self.accepted_rx.recv() => self.admit(connection),
                Some(inbound) = self.inbound_rx.recv() => {
                    if let Err(e) = self.handle(inbound).await {
                        error!("Server session failed: {}", e);
                        break Err(e);
                    }
                }
                else => {
                    info!("No connections left");
                    break Ok(());
                }
            }
        };

        self.state = SessionState::Closed;
        self.context.shutdown().await;
        info!("Server session closed");
        result
    }

    fn admit(&mut self, connection: Arc<Connection>) {
        info!("Player connection {} admitted", connection.id());
        self.roster.insert(connection);
    }

    async fn handle(&mut self, inbound: Inbound) -> Result<(), SessionError> {
        // A listener may report before its connection reaches the roster.
        while let Ok(connection) = self.accepted_rx.try_recv() {
            self.admit(connection);
        }

        let Inbound { origin, message } = inbound;
        let connection = match self.roster.get(&origin) {
            Some(connection) => Arc::clone(connection),
            None => {
                debug!("Ignoring {} from departed connection {}", message, origin);
                return Ok(());
            }
        };

        match message.opcode() {
            Opcode::Handshake => self.handshake(&connection, &message).await?,
            Opcode::Sync => {
                let model = self.layer.model().lock().await;
                send_snapshot(&connection, &model).await;
            }
            Opcode::Stop => {
                if let Err(e) = connection.send(WireMessage::stop_ack()).await {
                    debug!("STOP_ACK to {} failed: {}", origin, e);
                }
                self.disconnect(&origin).await?;
            }
            Opcode::StopAck | Opcode::ConnectionLost => self.disconnect(&origin).await?,
            Opcode::GetBattlefield => self.send_battlefield(&connection).await,
            opcode if is_server_authored(opcode) => {
                warn!("Ignoring server-only {} from {}", opcode, origin);
                discard_payload(&connection, opcode).await;
            }
            opcode if self.state != SessionState::Active => {
                debug!("Ignoring {} while {:?}", message, self.state);
                discard_payload(&connection, opcode).await;
            }
            _ => self.handle_action(&connection, message).await?,
        }

        self.check_victory().await;
        if self.state == SessionState::Terminating && self.roster.is_empty() {
            self.state = SessionState::Closed;
        }
        Ok(())
    }

    async fn handshake(&mut self, connection: &Arc<Connection>, message: &WireMessage) -> Result<(), SessionError> {
        if connection.team().await != Team::Neutral {
            warn!("Repeated handshake on {}", connection.id());
            return Ok(());
        }
        let name = message.arg(0).unwrap_or("Player");

        let shared = Arc::clone(self.layer.model());
        let mut model = shared.lock().await;
        let team = match model.next_free_team() {
            Some(team) => team,
            None => {
                info!("Game is full, turning away {}", connection.id());
                if let Err(e) = connection.send(WireMessage::stop()).await {
                    debug!("STOP to {} failed: {}", connection.id(), e);
                }
                return Ok(());
            }
        };

        model.add_player(team, name).map_err(SessionError::CorruptState)?;
        connection.set_team(team).await;
        info!("{} joined as {} on {}", name, team, connection.id());
        if let Err(e) = connection.send(WireMessage::assign_id(team)).await {
            warn!("ASSIGN_ID to {} failed: {}", connection.id(), e);
        }

        if model.started() {
            self.state = SessionState::Active;
            info!("Game started, turn order {:?}", model.turn_order());
            for peer in self.roster.iter() {
                send_snapshot(peer, &model).await;
            }
        } else {
            send_snapshot(connection, &model).await;
        }
        Ok(())
    }

    /// Validates, applies and propagates a player action under one lock.
    async fn handle_action(&mut self, connection: &Arc<Connection>, message: WireMessage) -> Result<(), SessionError> {
        let shared = Arc::clone(self.layer.model());
        let mut model = shared.lock().await;
        let team = connection.team().await;

        if let Err(rejection) = validate(&model, &message, team) {
            warn!("Rejected {} from {}: {}", message, connection.id(), rejection);
            discard_payload(connection, message.opcode()).await;
            send_snapshot(connection, &model).await;
            return Ok(());
        }

        let applied = match ApplyLayer::apply_locked(&mut model, &message, connection.id(), &self.roster).await {
            Ok(applied) => applied,
            Err(ApplyError::State(e)) if e.is_corrupt() => return Err(SessionError::CorruptState(e)),
            Err(e) if e.needs_resync() => {
                warn!("Could not apply {} from {}: {}", message, connection.id(), e);
                send_snapshot(connection, &model).await;
                return Ok(());
            }
            Err(e) => {
                warn!("Stream failure on {}: {}", connection.id(), e);
                drop(model);
                return self.disconnect(connection.id()).await;
            }
        };

        match self.propagate(&mut model, connection, team, &message, applied.moved_path).await {
            Ok(()) => {}
            Err(e) if e.is_corrupt() => return Err(SessionError::CorruptState(e)),
            Err(e) => {
                warn!("Could not complete {} from {}: {}", message, connection.id(), e);
                send_snapshot(connection, &model).await;
            }
        }

        for event in model.drain_events() {
            debug!("Game event: {:?}", event);
        }
        Ok(())
    }

    async fn propagate(
        &mut self,
        model: &mut GameModel,
        connection: &Arc<Connection>,
        team: Team,
        message: &WireMessage,
        moved_path: Option<Vec<shared::Position>>,
    ) -> Result<(), GameStateError> {
        let mut outbound = message.clone();
        outbound.update_checksum(model.checksum());

        match message.opcode() {
            Opcode::MoveHero => {
                let path = moved_path.unwrap_or_default();
                self.roster.broadcast_with_payload(&outbound, &Payload::Path(path)).await;
            }
            Opcode::BuyHero => {
                let town = message.id_arg(0)?;
                if model.town(town)?.owner != team {
                    return Err(GameStateError::InvalidArgument {
                        value: format!("town {} is not owned by {}", town, team),
                    });
                }
                let hero = model.new_hero(&mut self.rng);
                let id = model.buy_hero(team, hero, town)?;
                let recruited = model.hero(id)?.clone();
                let add = stamped(WireMessage::add_hero(team, town), model.checksum());
                info!("{} recruited {} ({}) at town {}", team, recruited.name, id, town);
                self.roster.broadcast_with_payload(&add, &Payload::Hero(recruited)).await;
            }
            Opcode::HeroTrade | Opcode::TradeConcluded => {
                if let Err(e) = connection.send(outbound).await {
                    warn!("Echo to {} failed: {}", connection.id(), e);
                }
            }
            Opcode::HeroBattle => {
                let (challenger, defender) = (message.id_arg(0)?, message.id_arg(1)?);
                let participants = [model.hero(challenger)?.owner, model.hero(defender)?.owner];
                let battlefield = Battlefield::roll(challenger, defender, &mut self.rng);
                model.set_battlefield(battlefield.clone());
                self.send_to_participants(&participants, &battlefield, &outbound).await;

                let loser = battlefield.loser();
                info!(
                    "Battle {} ({}) vs {} ({}): {} falls",
                    challenger, battlefield.challenger_roll, defender, battlefield.defender_roll, loser
                );
                model.kill_hero(loser)?;
                let defeated = stamped(WireMessage::hero_defeated(loser), model.checksum());
                self.roster.broadcast(&defeated).await;
            }
            Opcode::Surrender => {
                if model.turn_order().contains(&team) {
                    model.defeat_team(team)?;
                    let defeated = stamped(WireMessage::team_defeated(team), model.checksum());
                    self.roster.broadcast(&defeated).await;
                } else {
                    debug!("{} surrendered after defeat", team);
                }
            }
            _ => self.roster.broadcast(&outbound).await,
        }
        Ok(())
    }

    /// Battles are private: only the two sides learn the battlefield and see
    /// the fight start. Bystanders hear about the outcome alone.
    async fn send_to_participants(&self, teams: &[Team; 2], battlefield: &Battlefield, battle: &WireMessage) {
        let mut seen: Vec<Team> = Vec::new();
        for team in teams {
            if seen.contains(team) {
                continue;
            }
            seen.push(*team);
            for peer in self.roster.for_team(*team).await {
                let payload = Payload::Battlefield(battlefield.clone());
                if let Err(e) = peer.send_with_payload(WireMessage::get_battlefield(), &payload).await {
                    warn!("Battlefield to {} failed: {}", peer.id(), e);
                    continue;
                }
                if let Err(e) = peer.send(battle.clone()).await {
                    warn!("Battle start to {} failed: {}", peer.id(), e);
                }
            }
        }
    }

    async fn send_battlefield(&self, connection: &Arc<Connection>) {
        let model = self.layer.model().lock().await;
        match model.battlefield() {
            Some(battlefield) => {
                let payload = Payload::Battlefield(battlefield.clone());
                if let Err(e) = connection.send_with_payload(WireMessage::get_battlefield(), &payload).await {
                    warn!("Battlefield to {} failed: {}", connection.id(), e);
                }
            }
            None => debug!("{} asked for a battlefield outside battle", connection.id()),
        }
    }

    /// Drops a connection and, the first time only, takes its team out of
    /// the game.
    async fn disconnect(&mut self, origin: &ConnectionId) -> Result<(), SessionError> {
        let connection = match self.roster.remove(origin) {
            Some(connection) => connection,
            None => return Ok(()),
        };
        let team = connection.team().await;
        connection.close().await;
        info!("{} ({}) disconnected", origin, team);

        if team == Team::Neutral || self.state == SessionState::Terminating {
            return Ok(());
        }

        let shared = Arc::clone(self.layer.model());
        let mut model = shared.lock().await;
        if !model.started() {
            warn!("{} left before the game started, shutting down", team);
            drop(model);
            self.terminate().await;
            return Ok(());
        }

        if model.player_alive(team) {
            model.defeat_team(team).map_err(SessionError::CorruptState)?;
            let defeated = stamped(WireMessage::team_defeated(team), model.checksum());
            self.roster.broadcast(&defeated).await;
        }
        model.notify_disconnected(team);
        let gone = stamped(WireMessage::player_disconnected(team), model.checksum());
        self.roster.broadcast(&gone).await;
        Ok(())
    }

    /// Announces the last team standing and stops everyone.
    async fn check_victory(&mut self) {
        if self.state != SessionState::Active {
            return;
        }
        let shared = Arc::clone(self.layer.model());
        let mut model = shared.lock().await;
        let winner = match model.sole_survivor() {
            Some(winner) => winner,
            None => return,
        };

        model.declare_victory(winner);
        info!("{} wins the game", winner);
        let victory = stamped(WireMessage::victory(winner), model.checksum());
        self.roster.broadcast(&victory).await;
        drop(model);
        self.terminate().await;
    }

    async fn terminate(&mut self) {
        self.state = SessionState::Terminating;
        self.roster.broadcast(&WireMessage::stop()).await;
        if self.roster.is_empty() {
            self.state = SessionState::Closed;
        }
    }
}

fn stamped(mut message: WireMessage, checksum: u32) -> WireMessage {
    message.update_checksum(checksum);
    message
}

/// Drops the frame that came with an unprocessed message so the data stream
/// stays aligned with the text stream.
async fn discard_payload(connection: &Connection, opcode: Opcode) {
    if inbound_payload(opcode).is_none() {
        return;
    }
    if let Err(e) = connection.read_payload().await {
        warn!("Could not discard payload from {}: {}", connection.id(), e);
    }
}

/// Sends the full model, stamped with its checksum.
async fn send_snapshot(connection: &Connection, model: &GameModel) {
    let message = stamped(WireMessage::sync_sent(), model.checksum());
    let payload = Payload::GameState(Box::new(model.clone()));
    match connection.send_with_payload(message, &payload).await {
        Ok(()) => debug!("Sent snapshot {} to {}", model.checksum(), connection.id()),
        Err(e) => warn!("Snapshot to {} failed: {}", connection.id(), e),
    }
}
