//! Paired TCP connections.
//!
//! Every connection owns two streams: a line-oriented text stream carrying
//! `WireMessage`s and a data stream carrying length-prefixed bincode frames
//! (paths, heroes, battlefields and full state snapshots). Both streams open
//! with a preamble naming their role and a random pairing key, which is how
//! the acceptor glues the right two sockets together.
//!
//! `NetContext` owns everything network related for one process: it hands
//! out connection ids, connects and accepts, and tears every connection and
//! task down on `shutdown`.

use async_trait::async_trait;
use log::{debug, error, info, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::apply::PayloadSource;
use crate::error::TransportError;
use crate::message::WireMessage;
use crate::model::{Battlefield, GameModel, Hero, Team};
use crate::position::Position;

/// Largest data frame either side accepts.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const TEXT_STREAM: u8 = b'T';
const DATA_STREAM: u8 = b'D';

/// Typed binary payloads sent alongside messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Payload {
    Path(Vec<Position>),
    Hero(Hero),
    GameState(Box<GameModel>),
    Battlefield(Battlefield),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Path,
    Hero,
    GameState,
    Battlefield,
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PayloadKind::Path => "path",
            PayloadKind::Hero => "hero",
            PayloadKind::GameState => "game state",
            PayloadKind::Battlefield => "battlefield",
        };
        f.write_str(name)
    }
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Path(_) => PayloadKind::Path,
            Payload::Hero(_) => PayloadKind::Hero,
            Payload::GameState(_) => PayloadKind::GameState,
            Payload::Battlefield(_) => PayloadKind::Battlefield,
        }
    }
}

/// Writes one frame: 4-byte big-endian length, then the bincode body.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &Payload) -> Result<(), TransportError> {
    let body = bincode::serialize(payload)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge(body.len()));
    }
    writer.write_u32(body.len() as u32).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Payload, TransportError> {
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(TransportError::Closed),
        Err(e) => return Err(e.into()),
    };
    if len > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge(len));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(bincode::deserialize(&body)?)
}

/// Opaque per-process connection identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A parsed line and the connection it came from.
#[derive(Debug, Clone)]
pub struct Inbound {
    pub origin: ConnectionId,
    pub message: WireMessage,
}

pub struct Connection {
    id: ConnectionId,
    team: RwLock<Team>,
    text_writer: Mutex<OwnedWriteHalf>,
    data_writer: Mutex<OwnedWriteHalf>,
    data_reader: Mutex<BufReader<OwnedReadHalf>>,
    chain: Mutex<Option<WireMessage>>,
    closed: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl Connection {
    /// Splits both streams. The text read half is returned for the listener.
    fn new(id: ConnectionId, text: TcpStream, data: TcpStream) -> (Arc<Self>, OwnedReadHalf) {
        let (text_reader, text_writer) = text.into_split();
        let (data_reader, data_writer) = data.into_split();
        let (shutdown, _) = watch::channel(false);

        let connection = Arc::new(Self {
            id,
            team: RwLock::new(Team::Neutral),
            text_writer: Mutex::new(text_writer),
            data_writer: Mutex::new(data_writer),
            data_reader: Mutex::new(BufReader::new(data_reader)),
            chain: Mutex::new(None),
            closed: AtomicBool::new(false),
            shutdown,
        });
        (connection, text_reader)
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub async fn team(&self) -> Team {
        *self.team.read().await
    }

    pub async fn set_team(&self, team: Team) {
        *self.team.write().await = team;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Rebrands `message` with this connection's team and writes it.
    pub async fn send(&self, mut message: WireMessage) -> Result<(), TransportError> {
        self.ensure_open()?;
        message.rebrand(self.team().await);
        let mut writer = self.text_writer.lock().await;
        write_line(&mut *writer, &message).await
    }

    /// Sends a message and its payload without another sender interleaving
    /// on either stream. The frame goes first so it is waiting by the time
    /// the peer reacts to the line.
    pub async fn send_with_payload(&self, mut message: WireMessage, payload: &Payload) -> Result<(), TransportError> {
        self.ensure_open()?;
        message.rebrand(self.team().await);
        let mut text = self.text_writer.lock().await;
        let mut data = self.data_writer.lock().await;
        write_frame(&mut *data, payload).await?;
        write_line(&mut *text, &message).await
    }

    pub async fn read_payload(&self) -> Result<Payload, TransportError> {
        self.ensure_open()?;
        let mut reader = self.data_reader.lock().await;
        read_frame(&mut *reader).await
    }

    pub async fn read_path(&self) -> Result<Vec<Position>, TransportError> {
        match self.read_payload().await? {
            Payload::Path(path) => Ok(path),
            other => Err(unexpected(PayloadKind::Path, &other)),
        }
    }

    pub async fn read_hero(&self) -> Result<Hero, TransportError> {
        match self.read_payload().await? {
            Payload::Hero(hero) => Ok(hero),
            other => Err(unexpected(PayloadKind::Hero, &other)),
        }
    }

    pub async fn read_game_state(&self) -> Result<GameModel, TransportError> {
        match self.read_payload().await? {
            Payload::GameState(model) => Ok(*model),
            other => Err(unexpected(PayloadKind::GameState, &other)),
        }
    }

    pub async fn read_battlefield(&self) -> Result<Battlefield, TransportError> {
        match self.read_payload().await? {
            Payload::Battlefield(battlefield) => Ok(battlefield),
            other => Err(unexpected(PayloadKind::Battlefield, &other)),
        }
    }

    /// Stages a message to go out after the next confirmed move. Only one
    /// message is held; staging again replaces it.
    pub async fn queue_chain(&self, message: WireMessage) {
        let mut slot = self.chain.lock().await;
        if let Some(previous) = slot.replace(message) {
            warn!("{}: chained message {} replaced before it was sent", self.id, previous);
        }
    }

    /// Empties the chain slot without sending.
    pub async fn discard_chain(&self) -> Option<WireMessage> {
        self.chain.lock().await.take()
    }

    /// Sends the staged message, if any, stamped with `checksum`.
    pub async fn flush_chain(&self, checksum: u32) -> Result<bool, TransportError> {
        match self.discard_chain().await {
            Some(mut message) => {
                message.update_checksum(checksum);
                debug!("{}: flushing chained {}", self.id, message);
                self.send(message).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Stops the listener and shuts down both write halves. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown.send(true);
        if let Err(e) = self.text_writer.lock().await.shutdown().await {
            debug!("{}: text stream shutdown: {}", self.id, e);
        }
        if let Err(e) = self.data_writer.lock().await.shutdown().await {
            debug!("{}: data stream shutdown: {}", self.id, e);
        }
        info!("Closed connection {}", self.id);
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.is_closed() {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, message: &WireMessage) -> Result<(), TransportError> {
    let mut line = message.to_wire();
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    debug!("Sent {}", message);
    Ok(())
}

fn unexpected(expected: PayloadKind, found: &Payload) -> TransportError {
    TransportError::UnexpectedPayload {
        expected,
        found: found.kind(),
    }
}

#[async_trait]
impl PayloadSource for Connection {
    async fn read_path(&self, _origin: &ConnectionId) -> Result<Vec<Position>, TransportError> {
        Connection::read_path(self).await
    }

    async fn read_hero(&self, _origin: &ConnectionId) -> Result<Hero, TransportError> {
        Connection::read_hero(self).await
    }

    async fn read_battlefield(&self, _origin: &ConnectionId) -> Result<Battlefield, TransportError> {
        Connection::read_battlefield(self).await
    }
}

/// Reads lines until the peer goes away or the connection is closed locally.
/// A peer-side loss is reported as CONNECTION_LOST from the connection's team.
async fn listen(connection: Arc<Connection>, reader: OwnedReadHalf, inbound: mpsc::UnboundedSender<Inbound>) {
    let mut lines = BufReader::new(reader).lines();
    let mut shutdown = connection.shutdown.subscribe();
    if *shutdown.borrow() {
        return;
    }

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                debug!("Listener for {} cancelled", connection.id);
                return;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => match WireMessage::parse(&line) {
                    Some(message) => {
                        debug!("Received {} on {}", message, connection.id);
                        let item = Inbound { origin: connection.id.clone(), message };
                        if inbound.send(item).is_err() {
                            debug!("Inbound queue gone, stopping listener for {}", connection.id);
                            return;
                        }
                    }
                    None => warn!("Discarding unparsable line from {}: {:?}", connection.id, line),
                },
                Ok(None) => {
                    info!("Peer closed connection {}", connection.id);
                    break;
                }
                Err(e) => {
                    warn!("Read failure on {}: {}", connection.id, e);
                    break;
                }
            }
        }
    }

    if connection.is_closed() {
        return;
    }
    let mut lost = WireMessage::connection_lost();
    lost.rebrand(connection.team().await);
    let item = Inbound {
        origin: connection.id.clone(),
        message: lost,
    };
    if inbound.send(item).is_err() {
        debug!("Inbound queue gone, dropping loss of {}", connection.id);
    }
}

/// The connections of a server session, addressable by id.
#[derive(Default)]
pub struct Roster {
    connections: HashMap<ConnectionId, Arc<Connection>>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, connection: Arc<Connection>) {
        self.connections.insert(connection.id().clone(), connection);
    }

    pub fn remove(&mut self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.connections.remove(id)
    }

    pub fn get(&self, id: &ConnectionId) -> Option<&Arc<Connection>> {
        self.connections.get(id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Connection>> {
        self.connections.values()
    }

    /// Connections that play for `team`.
    pub async fn for_team(&self, team: Team) -> Vec<Arc<Connection>> {
        let mut found = Vec::new();
        for connection in self.connections.values() {
            if connection.team().await == team {
                found.push(Arc::clone(connection));
            }
        }
        found
    }

    /// Sends to every connection. Failures are logged; the listener reports
    /// the loss separately.
    pub async fn broadcast(&self, message: &WireMessage) {
        for connection in self.connections.values() {
            if let Err(e) = connection.send(message.clone()).await {
                warn!("Broadcast to {} failed: {}", connection.id(), e);
            }
        }
    }

    pub async fn broadcast_with_payload(&self, message: &WireMessage, payload: &Payload) {
        for connection in self.connections.values() {
            if let Err(e) = connection.send_with_payload(message.clone(), payload).await {
                warn!("Broadcast to {} failed: {}", connection.id(), e);
            }
        }
    }

    fn lookup(&self, origin: &ConnectionId) -> Result<&Arc<Connection>, TransportError> {
        self.connections.get(origin).ok_or(TransportError::Closed)
    }
}

#[async_trait]
impl PayloadSource for Roster {
    async fn read_path(&self, origin: &ConnectionId) -> Result<Vec<Position>, TransportError> {
        self.lookup(origin)?.read_path().await
    }

    async fn read_hero(&self, origin: &ConnectionId) -> Result<Hero, TransportError> {
        self.lookup(origin)?.read_hero().await
    }

    async fn read_battlefield(&self, origin: &ConnectionId) -> Result<Battlefield, TransportError> {
        self.lookup(origin)?.read_battlefield().await
    }
}

/// Owner of every connection and network task in the process.
#[derive(Default)]
pub struct NetContext {
    next_id: AtomicU64,
    connections: Mutex<Vec<Arc<Connection>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl NetContext {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn allocate_id(&self) -> ConnectionId {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        ConnectionId::new(format!("conn-{}", n))
    }

    pub async fn spawn<F>(&self, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        let mut tasks = self.tasks.lock().await;
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    /// Records a paired connection. Its listener is started separately so
    /// callers can publish the connection before any line arrives.
    async fn register(&self, text: TcpStream, data: TcpStream) -> (Arc<Connection>, OwnedReadHalf) {
        let (connection, text_reader) = Connection::new(self.allocate_id(), text, data);
        self.connections.lock().await.push(Arc::clone(&connection));
        (connection, text_reader)
    }

    async fn start_listener(
        &self,
        connection: &Arc<Connection>,
        reader: OwnedReadHalf,
        inbound: mpsc::UnboundedSender<Inbound>,
    ) {
        self.spawn(listen(Arc::clone(connection), reader, inbound)).await;
    }

    /// Opens both streams to a server and starts listening on the text one.
    pub async fn connect(
        self: &Arc<Self>,
        addr: &str,
        inbound: mpsc::UnboundedSender<Inbound>,
    ) -> Result<Arc<Connection>, TransportError> {
        let key: u64 = rand::thread_rng().gen();

        let mut text = TcpStream::connect(addr).await?;
        text.set_nodelay(true)?;
        write_preamble(&mut text, TEXT_STREAM, key).await?;

        let mut data = TcpStream::connect(addr).await?;
        data.set_nodelay(true)?;
        write_preamble(&mut data, DATA_STREAM, key).await?;

        let (connection, reader) = self.register(text, data).await;
        self.start_listener(&connection, reader, inbound).await;
        info!("Connected to {} as {}", addr, connection.id());
        Ok(connection)
    }

    /// Binds `addr` and accepts up to `capacity` paired connections, handing
    /// each to the returned channel.
    pub async fn serve(
        self: &Arc<Self>,
        addr: &str,
        capacity: usize,
        inbound: mpsc::UnboundedSender<Inbound>,
    ) -> Result<(SocketAddr, mpsc::UnboundedReceiver<Arc<Connection>>), TransportError> {
        let listener = TcpListener::bind(addr).await?;
        let local = listener.local_addr()?;
        info!("Listening on {} for {} players", local, capacity);

        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        let context = Arc::clone(self);
        self.spawn(async move {
            context.accept_loop(listener, capacity, inbound, accepted_tx).await;
        })
        .await;
        Ok((local, accepted_rx))
    }

    async fn accept_loop(
        self: Arc<Self>,
        listener: TcpListener,
        capacity: usize,
        inbound: mpsc::UnboundedSender<Inbound>,
        accepted: mpsc::UnboundedSender<Arc<Connection>>,
    ) {
        let mut pending: HashMap<u64, (u8, TcpStream)> = HashMap::new();
        let mut paired = 0;

        while paired < capacity {
            let (mut stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Accept failed: {}", e);
                    break;
                }
            };
            if let Err(e) = stream.set_nodelay(true) {
                debug!("set_nodelay on {}: {}", peer, e);
            }
            let (kind, key) = match read_preamble(&mut stream).await {
                Ok(preamble) => preamble,
                Err(e) => {
                    warn!("Dropping stream from {}: {}", peer, e);
                    continue;
                }
            };

            let (text, data) = match pending.remove(&key) {
                Some((other_kind, other)) if other_kind != kind => {
                    if kind == TEXT_STREAM {
                        (stream, other)
                    } else {
                        (other, stream)
                    }
                }
                Some(_) => {
                    warn!("Duplicate stream for pairing key from {}, keeping the newest", peer);
                    pending.insert(key, (kind, stream));
                    continue;
                }
                None => {
                    pending.insert(key, (kind, stream));
                    continue;
                }
            };

            let (connection, reader) = self.register(text, data).await;
            info!("Accepted {} from {}", connection.id(), peer);
            paired += 1;
            if accepted.send(Arc::clone(&connection)).is_err() {
                debug!("Session stopped accepting connections");
                connection.close().await;
                break;
            }
            self.start_listener(&connection, reader, inbound.clone()).await;
        }
        info!("Acceptor finished after {} connections", paired);
    }

    /// Closes every connection and aborts every task.
    pub async fn shutdown(&self) {
        let connections: Vec<Arc<Connection>> = self.connections.lock().await.drain(..).collect();
        for connection in connections {
            connection.close().await;
        }
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            task.abort();
        }
        debug!("Network context shut down");
    }
}

async fn write_preamble(stream: &mut TcpStream, kind: u8, key: u64) -> Result<(), TransportError> {
    let mut preamble = [0u8; 9];
    preamble[0] = kind;
    preamble[1..].copy_from_slice(&key.to_be_bytes());
    stream.write_all(&preamble).await?;
    Ok(())
}

async fn read_preamble(stream: &mut TcpStream) -> Result<(u8, u64), TransportError> {
    let mut preamble = [0u8; 9];
    stream.read_exact(&mut preamble).await?;
    let kind = preamble[0];
    if kind != TEXT_STREAM && kind != DATA_STREAM {
        return Err(TransportError::UnknownPayload(format!("stream kind {:#04x}", kind)));
    }
    let mut key = [0u8; 8];
    key.copy_from_slice(&preamble[1..]);
    Ok((kind, u64::from_be_bytes(key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Opcode;
    use crate::model::EntityId;

    async fn loopback() -> (
        Arc<NetContext>,
        Arc<Connection>,
        Arc<Connection>,
        mpsc::UnboundedReceiver<Inbound>,
        mpsc::UnboundedReceiver<Inbound>,
    ) {
        let context = NetContext::new();
        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (client_tx, client_rx) = mpsc::unbounded_channel();
        let (addr, mut accepted) = context.serve("127.0.0.1:0", 1, server_tx).await.unwrap();
        let client = context.connect(&addr.to_string(), client_tx).await.unwrap();
        let server = accepted.recv().await.unwrap();
        (context, server, client, server_rx, client_rx)
    }

    #[tokio::test]
    async fn test_frame_round_trip_over_duplex() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        let path = vec![Position::new(1, 2), Position::new(2, 3)];
        write_frame(&mut a, &Payload::Path(path.clone())).await.unwrap();
        match read_frame(&mut b).await.unwrap() {
            Payload::Path(read) => assert_eq!(read, path),
            other => panic!("unexpected payload {:?}", other.kind()),
        }
    }

    #[tokio::test]
    async fn test_oversized_frame_is_rejected() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_u32((MAX_FRAME_LEN + 1) as u32).await.unwrap();
        assert!(matches!(
            read_frame(&mut b).await,
            Err(TransportError::FrameTooLarge(_))
        ));
    }

    #[tokio::test]
    async fn test_garbage_frame_is_unknown_payload() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_u32(4).await.unwrap();
        a.write_all(&[0xff, 0xff, 0xff, 0xff]).await.unwrap();
        assert!(matches!(
            read_frame(&mut b).await,
            Err(TransportError::UnknownPayload(_))
        ));
    }

    #[tokio::test]
    async fn test_send_rebrands_with_connection_team() {
        let (context, server, client, mut server_rx, _client_rx) = loopback().await;
        client.set_team(Team::Team3).await;

        let mut message = WireMessage::turn_end();
        message.rebrand(Team::Team7);
        client.send(message).await.unwrap();

        let inbound = server_rx.recv().await.unwrap();
        assert_eq!(inbound.origin, *server.id());
        assert_eq!(inbound.message.opcode(), Opcode::TurnEnd);
        assert_eq!(inbound.message.sender(), Team::Team3);
        context.shutdown().await;
    }

    #[tokio::test]
    async fn test_message_with_payload_and_typed_reads() {
        let (context, server, client, mut server_rx, _client_rx) = loopback().await;
        let path = vec![Position::new(3, 3), Position::new(4, 4)];
        client
            .send_with_payload(WireMessage::move_hero(EntityId(1)), &Payload::Path(path.clone()))
            .await
            .unwrap();

        let inbound = server_rx.recv().await.unwrap();
        assert_eq!(inbound.message.opcode(), Opcode::MoveHero);
        assert_eq!(server.read_path().await.unwrap(), path);

        {
            let mut data = client.data_writer.lock().await;
            write_frame(&mut *data, &Payload::Path(Vec::new())).await.unwrap();
        }
        let err = server.read_hero().await.unwrap_err();
        assert!(err.is_recoverable());
        context.shutdown().await;
    }

    #[tokio::test]
    async fn test_unparsable_lines_are_dropped() {
        let (context, server, _client, _server_rx, mut client_rx) = loopback().await;
        {
            let mut writer = server.text_writer.lock().await;
            writer.write_all(b"garbage\nNOT;A;MESSAGE\n").await.unwrap();
        }
        server.send(WireMessage::sync()).await.unwrap();

        let inbound = client_rx.recv().await.unwrap();
        assert_eq!(inbound.message.opcode(), Opcode::Sync);
        context.shutdown().await;
    }

    #[tokio::test]
    async fn test_peer_close_reports_connection_lost_with_team() {
        let (context, server, client, mut server_rx, _client_rx) = loopback().await;
        server.set_team(Team::Team2).await;
        client.close().await;

        let inbound = server_rx.recv().await.unwrap();
        assert_eq!(inbound.message.opcode(), Opcode::ConnectionLost);
        assert_eq!(inbound.message.sender(), Team::Team2);
        assert_eq!(inbound.origin, *server.id());
        context.shutdown().await;
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_blocks_sends() {
        let (context, _server, client, _server_rx, _client_rx) = loopback().await;
        client.close().await;
        client.close().await;
        assert!(client.is_closed());
        assert!(matches!(
            client.send(WireMessage::sync()).await,
            Err(TransportError::Closed)
        ));
        context.shutdown().await;
    }

    #[tokio::test]
    async fn test_chain_slot_keeps_last_submission() {
        let (context, _server, client, mut server_rx, _client_rx) = loopback().await;
        client.queue_chain(WireMessage::hero_trade(EntityId(1), EntityId(2))).await;
        client.queue_chain(WireMessage::capture_resource(EntityId(1), EntityId(9))).await;
        assert!(client.flush_chain(4242).await.unwrap());
        assert!(!client.flush_chain(4242).await.unwrap());

        let inbound = server_rx.recv().await.unwrap();
        assert_eq!(inbound.message.opcode(), Opcode::CaptureResource);
        assert_eq!(inbound.message.checksum(), 4242);
        context.shutdown().await;
    }

    #[tokio::test]
    async fn test_discarded_chain_is_never_sent() {
        let (context, _server, client, mut server_rx, _client_rx) = loopback().await;
        client.queue_chain(WireMessage::town_interact(EntityId(1), EntityId(3))).await;
        assert_eq!(
            client.discard_chain().await.map(|m| m.opcode()),
            Some(Opcode::TownInteract)
        );
        assert!(client.discard_chain().await.is_none());
        assert!(!client.flush_chain(7).await.unwrap());

        client.send(WireMessage::sync()).await.unwrap();
        let inbound = server_rx.recv().await.unwrap();
        assert_eq!(inbound.message.opcode(), Opcode::Sync);
        context.shutdown().await;
    }
}
