//! Integration tests for the server and client sessions
//!
//! These tests run a real server session on a loopback port and talk to it
//! either through raw protocol peers or through full client sessions.

use client::{ClientConfig, ClientEvent, ClientHandle, ClientSession};
use server::{ServerConfig, ServerSession};
use shared::model::{Hero, MainMap};
use shared::{
    Connection, EntityId, GameEvent, GameModel, Inbound, NetContext, Opcode, Payload, Position, SessionError,
    SharedGameModel, Team, WireMessage,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(300);

async fn start_server(seed: u64) -> (SocketAddr, SharedGameModel, JoinHandle<Result<(), SessionError>>) {
    start_server_for(2, seed).await
}

async fn start_server_for(
    players: usize,
    seed: u64,
) -> (SocketAddr, SharedGameModel, JoinHandle<Result<(), SessionError>>) {
    let config = ServerConfig {
        port: 0,
        players,
        fog: false,
        seed: Some(seed),
        ..ServerConfig::default()
    };
    let session = ServerSession::bind(config).await.unwrap();
    let addr = session.local_addr();
    let model = session.model();
    (addr, model, tokio::spawn(session.run()))
}

/// A protocol-level player that records what the server sends it.
struct Peer {
    context: Arc<NetContext>,
    connection: Arc<Connection>,
    inbound: mpsc::UnboundedReceiver<Inbound>,
    team: Team,
    board: GameModel,
}

impl Peer {
    async fn join(addr: SocketAddr, name: &str) -> Peer {
        let context = NetContext::new();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let connection = context.connect(&addr.to_string(), inbound_tx).await.unwrap();
        connection.send(WireMessage::handshake(name)).await.unwrap();

        let mut peer = Peer {
            context,
            connection,
            inbound,
            team: Team::Neutral,
            board: GameModel::default(),
        };
        let assigned = peer.expect(Opcode::AssignId).await;
        peer.team = assigned.team_arg(0).unwrap();
        peer.connection.set_team(peer.team).await;
        peer.expect_snapshot().await;
        peer
    }

    async fn next(&mut self) -> WireMessage {
        timeout(WAIT, self.inbound.recv())
            .await
            .expect("timed out waiting for the server")
            .expect("inbound queue closed")
            .message
    }

    async fn expect(&mut self, opcode: Opcode) -> WireMessage {
        let message = self.next().await;
        assert_eq!(message.opcode(), opcode, "unexpected {}", message);
        message
    }

    async fn expect_snapshot(&mut self) -> u32 {
        let message = self.expect(Opcode::SyncSent).await;
        self.board = self.connection.read_game_state().await.unwrap();
        assert_eq!(self.board.checksum(), message.checksum());
        message.checksum()
    }

    async fn assert_quiet(&mut self) {
        if let Ok(Some(inbound)) = timeout(QUIET, self.inbound.recv()).await {
            panic!("{} received unexpected {}", self.team, inbound.message);
        }
    }

    async fn send_stamped(&self, mut message: WireMessage, checksum: u32) {
        message.update_checksum(checksum);
        self.connection.send(message).await.unwrap();
    }

    async fn leave(&self) {
        self.connection.close().await;
        self.context.shutdown().await;
    }
}

/// Joins two peers and returns them as (turn holder, waiting player).
async fn started_game(addr: SocketAddr) -> (Peer, Peer) {
    let mut first = Peer::join(addr, "first").await;
    let second = Peer::join(addr, "second").await;
    first.expect_snapshot().await;

    assert_eq!(first.board.checksum(), second.board.checksum());
    assert!(first.board.started());
    if first.board.turn_taker() == Some(first.team) {
        (first, second)
    } else {
        (second, first)
    }
}

/// Joins three peers. The last one to join completes the table, so the
/// first two see one more snapshot each.
async fn started_three_player_game(addr: SocketAddr) -> Vec<Peer> {
    let mut first = Peer::join(addr, "first").await;
    let mut second = Peer::join(addr, "second").await;
    let third = Peer::join(addr, "third").await;
    first.expect_snapshot().await;
    second.expect_snapshot().await;

    let peers = vec![first, second, third];
    assert!(peers.iter().all(|peer| peer.board.checksum() == peers[0].board.checksum()));
    assert!(peers[0].board.started());
    peers
}

fn three_step_move(board: &GameModel, team: Team) -> (EntityId, Vec<Position>) {
    for hero in board.owned_heroes(team) {
        for x in 0..board.map().width() {
            for y in 0..board.map().height() {
                let path = board.find_path(hero.position, Position::new(x, y));
                if path.len() == 3 && board.legal_moves(hero.id, &path).unwrap().len() == 3 {
                    return (hero.id, path);
                }
            }
        }
    }
    panic!("no three-step move for {}", team);
}

/// PROTOCOL FLOW TESTS
mod protocol_tests {
    use super::*;

    /// Tests that the handshake assigns teams in seat order and starts the game
    #[tokio::test]
    async fn handshake_assigns_teams_and_starts_game() {
        let (addr, model, _server) = start_server(11).await;
        let (active, waiting) = started_game(addr).await;

        let mut teams = vec![active.team, waiting.team];
        teams.sort();
        assert_eq!(teams, vec![Team::Team1, Team::Team2]);

        let model = model.lock().await;
        assert!(model.started());
        assert_eq!(model.checksum(), active.board.checksum());
        assert_eq!(model.player_names().get(&Team::Team1).map(String::as_str), Some("first"));
    }

    /// Tests that a move is broadcast with the identical path to every player
    #[tokio::test]
    async fn move_is_broadcast_with_path() {
        let (addr, model, _server) = start_server(12).await;
        let (mut active, mut waiting) = started_game(addr).await;

        let (hero, path) = three_step_move(&active.board, active.team);
        let mut message = WireMessage::move_hero(hero);
        message.update_checksum(active.board.checksum());
        active
            .connection
            .send_with_payload(message, &Payload::Path(path.clone()))
            .await
            .unwrap();

        let mover = active.team;
        let mut stamps = Vec::new();
        for peer in [&mut active, &mut waiting] {
            let echoed = peer.expect(Opcode::MoveHero).await;
            assert_eq!(echoed.sender(), mover);
            assert_eq!(echoed.id_arg(0).unwrap(), hero);
            assert_eq!(peer.connection.read_path().await.unwrap(), path);
            stamps.push(echoed.checksum());
        }

        let model = model.lock().await;
        assert_eq!(model.hero(hero).unwrap().position, *path.last().unwrap());
        assert!(stamps.iter().all(|checksum| *checksum == model.checksum()));
    }

    /// Tests that a battle defeats the hero with the lower draw
    #[tokio::test]
    async fn battle_defeats_lower_draw() {
        let (addr, model, _server) = start_server(13).await;
        let (mut active, mut waiting) = started_game(addr).await;

        let challenger = active.board.owned_heroes(active.team).next().unwrap().id;
        let defender = active.board.owned_heroes(waiting.team).next().unwrap().id;
        active
            .send_stamped(WireMessage::hero_battle(challenger, defender), active.board.checksum())
            .await;

        let mut losers = Vec::new();
        for peer in [&mut active, &mut waiting] {
            peer.expect(Opcode::GetBattlefield).await;
            let battlefield = peer.connection.read_battlefield().await.unwrap();
            assert_ne!(battlefield.challenger_roll, battlefield.defender_roll);
            let started = peer.expect(Opcode::HeroBattle).await;
            assert_eq!(started.id_arg(0).unwrap(), challenger);
            assert_eq!(started.id_arg(1).unwrap(), defender);

            let defeated = peer.expect(Opcode::HeroDefeated).await.id_arg(0).unwrap();
            let lower = if battlefield.challenger_roll < battlefield.defender_roll {
                challenger
            } else {
                defender
            };
            assert_eq!(defeated, lower);
            losers.push(defeated);
        }
        assert_eq!(losers[0], losers[1]);

        let model = model.lock().await;
        assert!(model.hero(losers[0]).is_err());
    }

    /// Tests that a battle stays between its two sides until a hero falls
    #[tokio::test]
    async fn bystander_only_hears_battle_outcome() {
        let (addr, model, server) = start_server_for(3, 5).await;
        let mut peers = started_three_player_game(addr).await;

        let holder = peers[0].board.turn_taker().unwrap();
        let others: Vec<Team> = peers.iter().map(|p| p.team).filter(|t| *t != holder).collect();
        let (defending, bystanding) = (others[0], others[1]);
        let index_of = |team: Team, peers: &[Peer]| peers.iter().position(|p| p.team == team).unwrap();

        let attacker = index_of(holder, &peers);
        let board = &peers[attacker].board;
        let challenger = board.owned_heroes(holder).next().unwrap().id;
        let defender = board.owned_heroes(defending).next().unwrap().id;
        let checksum = board.checksum();
        peers[attacker]
            .send_stamped(WireMessage::hero_battle(challenger, defender), checksum)
            .await;

        let mut fallen = Vec::new();
        for team in [holder, defending] {
            let index = index_of(team, &peers);
            let peer = &mut peers[index];
            peer.expect(Opcode::GetBattlefield).await;
            peer.connection.read_battlefield().await.unwrap();
            peer.expect(Opcode::HeroBattle).await;
            fallen.push(peer.expect(Opcode::HeroDefeated).await.id_arg(0).unwrap());
        }

        let index = index_of(bystanding, &peers);
        let bystander = &mut peers[index];
        let outcome = bystander.expect(Opcode::HeroDefeated).await;
        assert_eq!(outcome.id_arg(0).unwrap(), fallen[0]);
        bystander.assert_quiet().await;

        assert_eq!(fallen[0], fallen[1]);
        assert_eq!(outcome.checksum(), model.lock().await.checksum());
        assert!(!server.is_finished());
    }

    /// Tests that a bought hero reaches every player with its payload
    #[tokio::test]
    async fn bought_hero_is_announced_to_all() {
        let (addr, model, server) = start_server(12).await;
        let (mut active, mut waiting) = started_game(addr).await;
        let buyer = active.team;
        let town = active.board.towns().find(|t| t.owner == buyer).unwrap().id;

        active.send_stamped(WireMessage::buy_hero(town), active.board.checksum()).await;

        let mut recruits = Vec::new();
        for peer in [&mut active, &mut waiting] {
            let added = peer.expect(Opcode::AddHero).await;
            assert_eq!(added.team_arg(0).unwrap(), buyer);
            assert_eq!(added.id_arg(1).unwrap(), town);
            let hero = peer.connection.read_hero().await.unwrap();
            // Every peer lands the recruit on the same tile.
            peer.board.buy_hero(buyer, hero.clone(), town).unwrap();
            assert_eq!(peer.board.checksum(), added.checksum());
            recruits.push(hero.id);
        }
        assert_eq!(recruits[0], recruits[1]);

        {
            let model = model.lock().await;
            assert_eq!(model.owned_heroes(buyer).count(), 3);
            assert!(!model.can_afford_hero(buyer));
            assert_eq!(model.checksum(), active.board.checksum());
        }

        // The treasury is empty now: the second purchase only earns a resync.
        active.send_stamped(WireMessage::buy_hero(town), active.board.checksum()).await;
        active.expect_snapshot().await;
        waiting.assert_quiet().await;
        assert_eq!(active.board.owned_heroes(buyer).count(), 3);
        assert!(!server.is_finished());
    }

    /// Tests that a stale checksum is answered with one snapshot to the sender only
    #[tokio::test]
    async fn stale_checksum_gets_single_resync() {
        let (addr, model, _server) = start_server(14).await;
        let (mut active, mut waiting) = started_game(addr).await;
        let holder = active.team;

        active
            .send_stamped(WireMessage::turn_end(), active.board.checksum().wrapping_add(1))
            .await;
        active.expect_snapshot().await;
        active.assert_quiet().await;
        waiting.assert_quiet().await;

        assert_eq!(model.lock().await.turn_taker(), Some(holder));
    }

    /// Tests that only the turn holder may act
    #[tokio::test]
    async fn out_of_turn_action_is_rejected() {
        let (addr, _model, _server) = start_server(15).await;
        let (mut active, mut waiting) = started_game(addr).await;

        waiting.send_stamped(WireMessage::turn_end(), waiting.board.checksum()).await;
        waiting.expect_snapshot().await;
        active.assert_quiet().await;

        active.send_stamped(WireMessage::turn_end(), active.board.checksum()).await;
        let ended = active.expect(Opcode::TurnEnd).await;
        assert_eq!(ended.sender(), active.team);
        waiting.expect(Opcode::TurnEnd).await;
    }

    /// Tests that a dropped player is defeated before the disconnect notice
    #[tokio::test]
    async fn disconnect_defeats_then_announces() {
        let (addr, _model, server) = start_server(16).await;
        let (mut active, waiting) = started_game(addr).await;
        let gone = waiting.team;
        waiting.leave().await;

        assert_eq!(active.expect(Opcode::TeamDefeated).await.team_arg(0).unwrap(), gone);
        assert_eq!(active.expect(Opcode::PlayerDisconnected).await.team_arg(0).unwrap(), gone);
        assert_eq!(active.expect(Opcode::Victory).await.team_arg(0).unwrap(), active.team);
        active.expect(Opcode::Stop).await;

        active.connection.send(WireMessage::stop_ack()).await.unwrap();
        let finished = timeout(WAIT, server).await.expect("server did not close");
        assert!(finished.unwrap().is_ok());
    }
}

/// MALFORMED INPUT TESTS
mod malformed_input_tests {
    use super::*;

    async fn raw_stream(addr: SocketAddr, kind: u8, key: u64) -> TcpStream {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut preamble = vec![kind];
        preamble.extend_from_slice(&key.to_be_bytes());
        stream.write_all(&preamble).await.unwrap();
        stream
    }

    /// Tests that unparsable lines are dropped without ending the connection
    #[tokio::test]
    async fn malformed_lines_are_ignored() {
        let (addr, _model, _server) = start_server(18).await;
        let mut text = raw_stream(addr, b'T', 0xfeed).await;
        let _data = raw_stream(addr, b'D', 0xfeed).await;

        text.write_all(b"complete nonsense\n").await.unwrap();
        text.write_all(b"MOVE_HERO;NOT_A_TEAM;1;2\n").await.unwrap();
        text.write_all(b"TURN_END;TEAM_1;not-a-number\n").await.unwrap();
        text.write_all(b"HANDSHAKE;NEUTRAL;0;raw\r\n").await.unwrap();

        let (reader, _writer) = text.into_split();
        let mut lines = BufReader::new(reader).lines();
        let line = timeout(WAIT, lines.next_line())
            .await
            .expect("no reply to the handshake")
            .unwrap()
            .expect("stream closed");
        let reply = WireMessage::parse(&line).expect("unparsable reply");
        assert_eq!(reply.opcode(), Opcode::AssignId);
        assert_eq!(reply.team_arg(0).unwrap(), Team::Team1);
    }

    /// Tests that truncated payload frames are rejected
    #[tokio::test]
    async fn truncated_payload_is_rejected() {
        let payload = Payload::Path(vec![Position::new(1, 1), Position::new(2, 2)]);
        let body = bincode::serialize(&payload).unwrap();
        let mut frame = (body.len() as u32).to_be_bytes().to_vec();
        frame.extend_from_slice(&body[..body.len() / 2]);

        let mut reader = frame.as_slice();
        assert!(shared::transport::read_frame(&mut reader).await.is_err());
    }
}

/// CLIENT SESSION TESTS
mod client_tests {
    use super::*;

    async fn next_event(events: &mut mpsc::UnboundedReceiver<ClientEvent>) -> ClientEvent {
        timeout(WAIT, events.recv())
            .await
            .expect("timed out waiting for a client event")
            .expect("client event stream ended")
    }

    async fn wait_for(events: &mut mpsc::UnboundedReceiver<ClientEvent>, wanted: impl Fn(&ClientEvent) -> bool) {
        loop {
            if wanted(&next_event(events).await) {
                return;
            }
        }
    }

    fn config(addr: SocketAddr, name: &str) -> ClientConfig {
        ClientConfig {
            server: addr.to_string(),
            name: name.to_string(),
        }
    }

    /// Plays the server by hand so a test sees exactly what a client sends.
    struct HandServer {
        context: Arc<NetContext>,
        connection: Arc<Connection>,
        inbound: mpsc::UnboundedReceiver<Inbound>,
        board: GameModel,
    }

    impl HandServer {
        async fn next(&mut self) -> WireMessage {
            timeout(WAIT, self.inbound.recv())
                .await
                .expect("timed out waiting for the client")
                .expect("inbound queue closed")
                .message
        }

        async fn expect(&mut self, opcode: Opcode) -> WireMessage {
            let message = self.next().await;
            assert_eq!(message.opcode(), opcode, "unexpected {}", message);
            message
        }

        async fn assert_quiet(&mut self) {
            if let Ok(Some(inbound)) = timeout(QUIET, self.inbound.recv()).await {
                panic!("client sent unexpected {}", inbound.message);
            }
        }

        async fn send_snapshot(&self) {
            let mut message = WireMessage::sync_sent();
            message.update_checksum(self.board.checksum());
            let payload = Payload::GameState(Box::new(self.board.clone()));
            self.connection.send_with_payload(message, &payload).await.unwrap();
        }

        /// Applies a move to the hand-kept board and echoes it back.
        async fn confirm_move(&mut self, hero: EntityId, path: &[Position]) {
            let moved = self.board.move_hero(hero, path).unwrap();
            let mut message = WireMessage::move_hero(hero);
            message.update_checksum(self.board.checksum());
            self.connection
                .send_with_payload(message, &Payload::Path(moved))
                .await
                .unwrap();
        }
    }

    /// A wide grass board: Team 1 holds the west town and moves first.
    fn open_board() -> (GameModel, EntityId, EntityId) {
        let mut board = GameModel::new(MainMap::new(40, 10), 2, false);
        let west = board.add_town(Position::new(1, 1)).unwrap();
        let east = board.add_town(Position::new(10, 1)).unwrap();
        board.set_town_owner(west, Team::Team1).unwrap();
        board.set_town_owner(east, Team::Team2).unwrap();
        board.add_player(Team::Team1, "ann").unwrap();
        board.add_player(Team::Team2, "ben").unwrap();
        let ours = board.give_hero(Team::Team1, Hero::new(EntityId(20), "Ours"), west).unwrap();
        let theirs = board.give_hero(Team::Team2, Hero::new(EntityId(21), "Theirs"), east).unwrap();
        (board, ours, theirs)
    }

    /// Connects a client session to a hand server that seats it as Team 1.
    async fn seated_client(
        board: GameModel,
    ) -> (
        HandServer,
        ClientHandle,
        mpsc::UnboundedReceiver<ClientEvent>,
        JoinHandle<Result<(), SessionError>>,
    ) {
        let context = NetContext::new();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let (addr, mut accepted) = context.serve("127.0.0.1:0", 1, inbound_tx).await.unwrap();

        let (session, handle, mut events) = ClientSession::connect(config(addr, "ann")).await.unwrap();
        let task = tokio::spawn(session.run());
        let connection = timeout(WAIT, accepted.recv()).await.unwrap().unwrap();

        let mut server = HandServer {
            context,
            connection,
            inbound,
            board,
        };
        server.expect(Opcode::Handshake).await;
        server.connection.send(WireMessage::assign_id(Team::Team1)).await.unwrap();
        server.send_snapshot().await;
        wait_for(&mut events, |e| matches!(e, ClientEvent::Synchronized { .. })).await;
        (server, handle, events, task)
    }

    /// Tests that a move beyond the budget is cut to what the hero can afford
    #[tokio::test]
    async fn client_truncates_move_to_budget() {
        let (board, ours, _) = open_board();
        let (mut server, handle, _events, _task) = seated_client(board).await;

        let target = Position::new(38, 8);
        handle.move_hero(ours, target).unwrap();
        let proposed = server.expect(Opcode::MoveHero).await;
        assert_eq!(proposed.id_arg(0).unwrap(), ours);
        assert_eq!(proposed.checksum(), server.board.checksum());
        let path = server.connection.read_path().await.unwrap();

        let from = server.board.hero(ours).unwrap().position;
        let full = server.board.find_path(from, target);
        assert!(path.len() < full.len());
        assert_eq!(path, full[..path.len()].to_vec());
        assert_eq!(path, server.board.legal_moves(ours, &full).unwrap());
        server.context.shutdown().await;
    }

    /// Tests that an interaction out of reach waits for its move to be confirmed
    #[tokio::test]
    async fn client_chains_battle_after_confirmed_move() {
        let (board, ours, theirs) = open_board();
        let (mut server, handle, mut events, _task) = seated_client(board).await;

        let enemy_at = server.board.hero(theirs).unwrap().position;
        handle.interact(ours, enemy_at).unwrap();
        server.expect(Opcode::MoveHero).await;
        let approach = server.connection.read_path().await.unwrap();
        assert!(approach.last().unwrap().is_adjacent_or_same(enemy_at));
        // Nothing else goes out until the server has its say on the move.
        server.assert_quiet().await;

        server.confirm_move(ours, &approach).await;
        let battle = server.expect(Opcode::HeroBattle).await;
        assert_eq!(battle.id_arg(0).unwrap(), ours);
        assert_eq!(battle.id_arg(1).unwrap(), theirs);
        assert_eq!(battle.checksum(), server.board.checksum());
        wait_for(&mut events, |e| matches!(e, ClientEvent::Game(GameEvent::HeroMoved { .. }))).await;
        server.context.shutdown().await;
    }

    /// Tests that a broadcast the client cannot apply earns one resync, not a crash
    #[tokio::test]
    async fn unappliable_broadcast_requests_single_resync() {
        let (board, _, _) = open_board();
        let (mut server, _handle, mut events, task) = seated_client(board).await;
        let ghost = EntityId(999);

        server.connection.send(WireMessage::hero_defeated(ghost)).await.unwrap();
        server
            .connection
            .send_with_payload(WireMessage::move_hero(ghost), &Payload::Path(vec![Position::new(5, 5)]))
            .await
            .unwrap();
        server.expect(Opcode::Sync).await;
        server.assert_quiet().await;
        assert!(!task.is_finished());

        server.send_snapshot().await;
        wait_for(&mut events, |e| matches!(e, ClientEvent::Synchronized { .. })).await;
        server.connection.send(WireMessage::hero_defeated(ghost)).await.unwrap();
        server.expect(Opcode::Sync).await;
        assert!(!task.is_finished());
        server.context.shutdown().await;
    }

    /// Tests a short game between two client sessions: one turn, then a surrender
    #[tokio::test]
    async fn clients_follow_turns_and_surrender() {
        let (addr, server_model, server) = start_server(19).await;

        let (first, first_handle, mut first_events) = ClientSession::connect(config(addr, "ann")).await.unwrap();
        let first_model = first.model();
        let first_task = tokio::spawn(first.run());
        wait_for(&mut first_events, |e| matches!(e, ClientEvent::Synchronized { .. })).await;

        let (second, second_handle, mut second_events) = ClientSession::connect(config(addr, "ben")).await.unwrap();
        let second_model = second.model();
        let second_task = tokio::spawn(second.run());
        wait_for(&mut second_events, |e| matches!(e, ClientEvent::Synchronized { .. })).await;
        wait_for(&mut first_events, |e| matches!(e, ClientEvent::Synchronized { .. })).await;

        let holder = first_model.lock().await.turn_taker().unwrap();
        assert!(first_model.lock().await.started());
        let (holder_handle, other_handle) = if first_model.lock().await.current_team() == Some(holder) {
            (&first_handle, &second_handle)
        } else {
            (&second_handle, &first_handle)
        };

        holder_handle.end_turn().unwrap();
        wait_for(&mut first_events, |e| matches!(e, ClientEvent::Game(GameEvent::TurnStart(_)))).await;
        wait_for(&mut second_events, |e| matches!(e, ClientEvent::Game(GameEvent::TurnStart(_)))).await;

        let next = server_model.lock().await.turn_taker().unwrap();
        assert_ne!(next, holder);
        assert_eq!(first_model.lock().await.turn_taker(), Some(next));
        assert_eq!(second_model.lock().await.turn_taker(), Some(next));
        assert_eq!(
            first_model.lock().await.checksum(),
            server_model.lock().await.checksum()
        );

        other_handle.surrender().unwrap();
        wait_for(&mut first_events, |e| matches!(e, ClientEvent::Game(GameEvent::Victory(_)))).await;
        wait_for(&mut second_events, |e| matches!(e, ClientEvent::Game(GameEvent::Victory(_)))).await;
        assert_eq!(server_model.lock().await.winner(), Some(holder));

        assert!(timeout(WAIT, first_task).await.expect("first client hung").unwrap().is_ok());
        assert!(timeout(WAIT, second_task).await.expect("second client hung").unwrap().is_ok());
        assert!(timeout(WAIT, server).await.expect("server hung").unwrap().is_ok());
    }
}
