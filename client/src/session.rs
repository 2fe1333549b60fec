//! Client side of a match.
//!
//! The session treats everything the server broadcasts as ground truth and
//! applies it through the shared `ApplyLayer`. Player intents arrive through
//! a `ClientHandle`; they are checked and truncated against the local board,
//! stamped with its checksum and sent to the server, which decides whether
//! they happen. Nothing is applied locally before the server confirms it.

use log::{debug, error, info, warn};
use shared::{
    ApplyError, ApplyLayer, Connection, EntityId, EntityRef, GameEvent, GameModel, Inbound, NetContext, Opcode,
    Payload, Position, SessionError, SharedGameModel, Team, TransportError, WireMessage,
};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::ClientConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    AwaitingHandshake,
    Active,
    Terminating,
    Closed,
}

/// Player intents, sent through a `ClientHandle`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Move { hero: EntityId, to: Position },
    /// Walk up to whatever stands at `target` and interact with it.
    Interact { hero: EntityId, target: Position },
    BuyHero { town: EntityId },
    EndTurn,
    Surrender,
    RequestSync,
    ConcludeTrade,
    EndBattle,
    Disconnect,
}

/// What the session reports to whoever presents the game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Joined(Team),
    Synchronized { checksum: u32 },
    Game(GameEvent),
    /// The connection dropped. The game itself is not over.
    Disconnected,
    Closed,
}

/// Cloneable sender of player intents.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    commands: mpsc::UnboundedSender<ClientCommand>,
}

impl ClientHandle {
    pub fn send(&self, command: ClientCommand) -> Result<(), TransportError> {
        self.commands.send(command).map_err(|_| TransportError::Closed)
    }

    pub fn move_hero(&self, hero: EntityId, to: Position) -> Result<(), TransportError> {
        self.send(ClientCommand::Move { hero, to })
    }

    pub fn interact(&self, hero: EntityId, target: Position) -> Result<(), TransportError> {
        self.send(ClientCommand::Interact { hero, target })
    }

    pub fn buy_hero(&self, town: EntityId) -> Result<(), TransportError> {
        self.send(ClientCommand::BuyHero { town })
    }

    pub fn end_turn(&self) -> Result<(), TransportError> {
        self.send(ClientCommand::EndTurn)
    }

    pub fn surrender(&self) -> Result<(), TransportError> {
        self.send(ClientCommand::Surrender)
    }

    pub fn request_sync(&self) -> Result<(), TransportError> {
        self.send(ClientCommand::RequestSync)
    }

    pub fn conclude_trade(&self) -> Result<(), TransportError> {
        self.send(ClientCommand::ConcludeTrade)
    }

    pub fn end_battle(&self) -> Result<(), TransportError> {
        self.send(ClientCommand::EndBattle)
    }

    pub fn disconnect(&self) -> Result<(), TransportError> {
        self.send(ClientCommand::Disconnect)
    }
}

pub struct ClientSession {
    context: Arc<NetContext>,
    connection: Arc<Connection>,
    layer: ApplyLayer,
    state: ClientState,
    inbound_rx: mpsc::UnboundedReceiver<Inbound>,
    commands_rx: mpsc::UnboundedReceiver<ClientCommand>,
    events_tx: mpsc::UnboundedSender<ClientEvent>,
    resync_pending: bool,
    stop_sent: bool,
    connection_lost: bool,
}

impl ClientSession {
    /// Connects and introduces the player. The session is inert until `run`.
    pub async fn connect(
        config: ClientConfig,
    ) -> Result<(Self, ClientHandle, mpsc::UnboundedReceiver<ClientEvent>), SessionError> {
        let context = NetContext::new();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let connection = context.connect(&config.server, inbound_tx).await?;
        connection.send(WireMessage::handshake(&config.name)).await?;
        info!("Sent handshake as {}", config.name);

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let session = Self {
            context,
            connection,
            layer: ApplyLayer::new(GameModel::default()),
            state: ClientState::AwaitingHandshake,
            inbound_rx,
            commands_rx,
            events_tx,
            resync_pending: false,
            stop_sent: false,
            connection_lost: false,
        };
        let handle = ClientHandle { commands: commands_tx };
        Ok((session, handle, events_rx))
    }

    pub fn model(&self) -> SharedGameModel {
        Arc::clone(self.layer.model())
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn connection_lost(&self) -> bool {
        self.connection_lost
    }

    pub async fn run(mut self) -> Result<(), SessionError> {
        let result = loop {
            if self.state == ClientState::Closed {
                break Ok(());
            }
            tokio::select! {
                Some(inbound) = self.inbound_rx.recv() => {
                    if let Err(e) = self.handle(inbound).await {
                        error!("Client session failed: {}", e);
                        break Err(e);
                    }
                }
                Some(command) = self.commands_rx.recv() => self.execute(command).await,
                else => break Ok(()),
            }
        };

        self.close().await;
        self.emit(ClientEvent::Closed);
        result
    }

    async fn handle(&mut self, inbound: Inbound) -> Result<(), SessionError> {
        let message = inbound.message;
        match message.opcode() {
            Opcode::AssignId => match message.team_arg(0) {
                Ok(team) => {
                    self.connection.set_team(team).await;
                    self.layer.model().lock().await.set_current_team(team);
                    info!("Playing as {}", team);
                    self.emit(ClientEvent::Joined(team));
                }
                Err(e) => warn!("Malformed team assignment {}: {}", message, e),
            },
            Opcode::SyncSent => self.adopt_snapshot().await?,
            Opcode::Stop => {
                info!("Server stopped the session");
                if let Err(e) = self.connection.send(WireMessage::stop_ack()).await {
                    debug!("STOP_ACK failed: {}", e);
                }
                self.close().await;
            }
            Opcode::StopAck => self.close().await,
            Opcode::ConnectionLost => {
                warn!("Lost connection to the server");
                self.connection_lost = true;
                self.emit(ClientEvent::Disconnected);
                self.close().await;
            }
            _ => self.apply(&inbound.origin, message).await?,
        }

        self.after_message().await;
        Ok(())
    }

    async fn adopt_snapshot(&mut self) -> Result<(), SessionError> {
        match self.connection.read_game_state().await {
            Ok(snapshot) => {
                let mut model = self.layer.model().lock().await;
                model.adopt(snapshot);
                let checksum = model.checksum();
                drop(model);
                if let Some(stale) = self.connection.discard_chain().await {
                    debug!("Dropped {} staged against the replaced board", stale);
                }
                self.resync_pending = false;
                if self.state == ClientState::AwaitingHandshake {
                    self.state = ClientState::Active;
                }
                debug!("Adopted snapshot {}", checksum);
                self.emit(ClientEvent::Synchronized { checksum });
                Ok(())
            }
            Err(e) => self.payload_failure(e).await,
        }
    }

    async fn apply(&mut self, origin: &shared::ConnectionId, message: WireMessage) -> Result<(), SessionError> {
        let shared = Arc::clone(self.layer.model());
        let mut model = shared.lock().await;
        match ApplyLayer::apply_locked(&mut model, &message, origin, &*self.connection).await {
            Ok(_) => {
                if message.opcode() == Opcode::MoveHero {
                    let checksum = model.checksum();
                    drop(model);
                    if let Err(e) = self.connection.flush_chain(checksum).await {
                        self.lose_connection(e).await;
                    }
                }
                Ok(())
            }
            // Even a board that contradicts itself is replaced by the snapshot.
            Err(ApplyError::State(e)) => {
                warn!("Out of sync after {}: {}", message, e);
                drop(model);
                self.request_sync().await;
                Ok(())
            }
            Err(ApplyError::Transport(e)) => {
                drop(model);
                self.payload_failure(e).await
            }
        }
    }

    /// Wrong-shape payloads are cured by a resync; undecodable ones mean the
    /// peers do not speak the same protocol.
    async fn payload_failure(&mut self, err: TransportError) -> Result<(), SessionError> {
        match err {
            e if e.is_recoverable() => {
                warn!("{}", e);
                self.request_sync().await;
                Ok(())
            }
            TransportError::UnknownPayload(detail) => Err(SessionError::IncompatiblePeer(detail)),
            e => {
                self.lose_connection(e).await;
                Ok(())
            }
        }
    }

    async fn after_message(&mut self) {
        let shared = Arc::clone(self.layer.model());
        let mut model = shared.lock().await;
        for event in model.drain_events() {
            self.emit(ClientEvent::Game(event));
        }
        let lost = model.is_game_over() && !model.has_won();
        drop(model);

        if lost && self.state == ClientState::Active && !self.stop_sent {
            info!("Defeated, leaving the game");
            self.send_stop().await;
        }
    }

    async fn execute(&mut self, command: ClientCommand) {
        if command == ClientCommand::Disconnect {
            if !self.stop_sent && self.state != ClientState::Closed {
                self.send_stop().await;
            }
            return;
        }
        if self.state != ClientState::Active {
            warn!("Ignoring {:?} while {:?}", command, self.state);
            return;
        }
        let result = match command {
            ClientCommand::Move { hero, to } => self.move_to(hero, to).await,
            ClientCommand::Interact { hero, target } => self.interact(hero, target).await,
            ClientCommand::BuyHero { town } => self.send_action(WireMessage::buy_hero(town)).await,
            ClientCommand::EndTurn => self.send_action(WireMessage::turn_end()).await,
            ClientCommand::Surrender => self.send_action(WireMessage::surrender()).await,
            ClientCommand::ConcludeTrade => self.send_action(WireMessage::trade_concluded()).await,
            ClientCommand::EndBattle => self.send_action(WireMessage::end_battle_turn()).await,
            ClientCommand::RequestSync => {
                self.request_sync().await;
                Ok(())
            }
            ClientCommand::Disconnect => Ok(()),
        };

        match result {
            Ok(()) => {}
            Err(ApplyError::State(e)) => warn!("Cannot do that: {}", e),
            Err(ApplyError::Transport(e)) => self.lose_connection(e).await,
        }
    }

    /// Sends an action stamped with the checksum of the local board.
    async fn send_action(&self, message: WireMessage) -> Result<(), ApplyError> {
        let checksum = self.layer.model().lock().await.checksum();
        let mut message = message;
        message.update_checksum(checksum);
        self.connection.send(message).await?;
        Ok(())
    }

    async fn move_to(&self, hero: EntityId, to: Position) -> Result<(), ApplyError> {
        let model = self.layer.model().lock().await;
        let from = model.hero(hero)?.position;
        let path = model.find_path(from, to);
        if path.is_empty() {
            warn!("No path from {} to {}", from, to);
            return Ok(());
        }
        self.send_move(&model, hero, &path).await?;
        Ok(())
    }

    /// Proposes the affordable prefix of `path`. Returns whether all of it
    /// fit this turn.
    async fn send_move(&self, model: &GameModel, hero: EntityId, path: &[Position]) -> Result<bool, ApplyError> {
        let legal = model.legal_moves(hero, path)?;
        if legal.is_empty() {
            warn!("Hero {} has no movement left for that path", hero);
            return Ok(false);
        }
        let complete = legal.len() == path.len();
        let mut message = WireMessage::move_hero(hero);
        message.update_checksum(model.checksum());
        self.connection.send_with_payload(message, &Payload::Path(legal)).await?;
        Ok(complete)
    }

    /// Walks into range first when needed; the interaction then waits in the
    /// chain slot until the move is confirmed.
    async fn interact(&self, hero: EntityId, target: Position) -> Result<(), ApplyError> {
        let model = self.layer.model().lock().await;
        let target: EntityRef = match model.entity_at(target) {
            Some(entity) => entity,
            None => {
                warn!("Nothing to interact with at {}", target);
                return Ok(());
            }
        };
        let interaction = model.interaction(hero, target)?;
        let approach = model.approach_path(hero, target)?;

        match WireMessage::for_interaction(interaction) {
            None => {
                if !approach.is_empty() {
                    self.send_move(&model, hero, &approach).await?;
                }
            }
            Some(request) if !approach.is_empty() => {
                if self.send_move(&model, hero, &approach).await? {
                    self.connection.queue_chain(request).await;
                } else {
                    info!("Hero {} cannot reach its target this turn", hero);
                }
            }
            Some(mut request) => {
                if model.unit_can_interact_with(hero, target)? {
                    request.update_checksum(model.checksum());
                    self.connection.send(request).await?;
                } else {
                    warn!("Hero {} has no way to reach its target", hero);
                }
            }
        }
        Ok(())
    }

    async fn request_sync(&mut self) {
        if self.resync_pending {
            return;
        }
        self.resync_pending = true;
        info!("Requesting a fresh snapshot");
        if let Err(e) = self.connection.send(WireMessage::sync()).await {
            self.lose_connection(e).await;
        }
    }

    async fn send_stop(&mut self) {
        self.stop_sent = true;
        self.state = ClientState::Terminating;
        if let Err(e) = self.connection.send(WireMessage::stop()).await {
            debug!("STOP failed: {}", e);
            self.close().await;
        }
    }

    async fn lose_connection(&mut self, err: TransportError) {
        warn!("Connection failure: {}", err);
        self.connection_lost = true;
        self.emit(ClientEvent::Disconnected);
        self.close().await;
    }

    async fn close(&mut self) {
        if self.state == ClientState::Closed {
            return;
        }
        self.state = ClientState::Closed;
        self.connection.close().await;
        self.context.shutdown().await;
    }

    fn emit(&self, event: ClientEvent) {
        if self.events_tx.send(event).is_err() {
            debug!("Event receiver dropped");
        }
    }
}
