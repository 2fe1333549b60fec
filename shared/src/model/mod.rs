//! Game-state aggregate shared by both roles.
//!
//! `GameModel` owns the main map, every hero, town and mine, the turn order
//! and the per-team resources and fog. Servers and clients hold one each and
//! keep them identical by applying the same confirmed messages in the same
//! order; the board checksum is how they find out when they are not.

pub mod entities;
pub mod map;
pub mod skirmish;

use log::{debug, info, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::GameStateError;
use crate::pathfinding::PathMap;
use crate::position::Position;

pub use entities::{
    Battlefield, EntityId, Hero, Interactable, Mine, Resource, ResourceStock, Team, Town,
    SITE_FOOTPRINT, STANDARD_MAX_MOVE,
};
pub use map::{FogOfWar, MainMap, MapView, Passability, TerrainType};

pub const HERO_GOLD_COST: u32 = 500;
pub const TEAM_STARTING_GOLD: u32 = 500;
pub const SIGHT_RANGE: i32 = 3;
const STARTING_HEROES_PER_TEAM: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GamePhase {
    MainMap,
    Battlefield,
    Trade,
    GameOver,
}

/// Notifications for whoever presents the game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    TurnStart(Team),
    HeroMoved { hero: EntityId, to: Position },
    HeroAdded(EntityId),
    HeroKilled(EntityId),
    PropertyCaptured { property: EntityId, owner: Team },
    PhaseChanged(GamePhase),
    TeamDefeated(Team),
    PlayerDisconnected(Team),
    Victory(Team),
    StateReplaced,
}

/// Whatever occupies a tile, unit layer first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityRef {
    Hero(EntityId),
    Town(EntityId),
    Mine(EntityId),
}

impl EntityRef {
    pub fn id(&self) -> EntityId {
        match self {
            EntityRef::Hero(id) | EntityRef::Town(id) | EntityRef::Mine(id) => *id,
        }
    }
}

/// What a hero does to a target once it stands next to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interaction {
    /// Friendly property: walking there is all there is to do.
    Move,
    HeroTrade { hero: EntityId, target: EntityId },
    HeroBattle { hero: EntityId, target: EntityId },
    TownInteract { hero: EntityId, town: EntityId },
    TownBattle { hero: EntityId, town: EntityId },
    CaptureResource { hero: EntityId, mine: EntityId },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameModel {
    map: MainMap,
    heroes: BTreeMap<EntityId, Hero>,
    towns: BTreeMap<EntityId, Town>,
    mines: BTreeMap<EntityId, Mine>,
    teams: Vec<Team>,
    turn_order: Vec<Team>,
    turn_taker: usize,
    player_names: BTreeMap<Team, String>,
    stockpiles: BTreeMap<Team, ResourceStock>,
    fog: BTreeMap<Team, FogOfWar>,
    phase: GamePhase,
    battlefield: Option<Battlefield>,
    started: bool,
    winner: Option<Team>,
    won: bool,
    next_id: u32,

    // Local to one process; never part of a snapshot.
    #[serde(skip)]
    current_team: Option<Team>,
    #[serde(skip)]
    events: Vec<GameEvent>,
}

impl Default for GameModel {
    /// An empty board, used by clients until the first snapshot arrives.
    fn default() -> Self {
        Self::new(MainMap::new(0, 0), 0, false)
    }
}

impl GameModel {
    pub fn new(map: MainMap, human_players: usize, fog_enabled: bool) -> Self {
        let teams: Vec<Team> = Team::PLAYERS.iter().take(human_players).copied().collect();
        let stockpiles = teams
            .iter()
            .map(|team| (*team, ResourceStock::with_gold(TEAM_STARTING_GOLD)))
            .collect();
        let fog = teams
            .iter()
            .map(|team| (*team, FogOfWar::new(map.width(), map.height(), fog_enabled)))
            .collect();

        Self {
            map,
            heroes: BTreeMap::new(),
            towns: BTreeMap::new(),
            mines: BTreeMap::new(),
            turn_order: teams.clone(),
            teams,
            turn_taker: 0,
            player_names: BTreeMap::new(),
            stockpiles,
            fog,
            phase: GamePhase::MainMap,
            battlefield: None,
            started: false,
            winner: None,
            won: false,
            next_id: 0,
            current_team: None,
            events: Vec::new(),
        }
    }

    pub fn map(&self) -> &MainMap {
        &self.map
    }

    /// Optimistic-concurrency token over terrain and unit placement.
    pub fn checksum(&self) -> u32 {
        self.map.checksum()
    }

    pub fn heroes(&self) -> impl Iterator<Item = &Hero> {
        self.heroes.values()
    }

    pub fn towns(&self) -> impl Iterator<Item = &Town> {
        self.towns.values()
    }

    pub fn mines(&self) -> impl Iterator<Item = &Mine> {
        self.mines.values()
    }

    pub fn hero(&self, id: EntityId) -> Result<&Hero, GameStateError> {
        self.heroes
            .get(&id)
            .ok_or_else(|| GameStateError::UnknownHero(id.to_string()))
    }

    fn hero_mut(&mut self, id: EntityId) -> Result<&mut Hero, GameStateError> {
        self.heroes
            .get_mut(&id)
            .ok_or_else(|| GameStateError::UnknownHero(id.to_string()))
    }

    pub fn town(&self, id: EntityId) -> Result<&Town, GameStateError> {
        self.towns
            .get(&id)
            .ok_or_else(|| GameStateError::UnknownTown(id.to_string()))
    }

    pub fn mine(&self, id: EntityId) -> Result<&Mine, GameStateError> {
        self.mines
            .get(&id)
            .ok_or_else(|| GameStateError::UnknownMine(id.to_string()))
    }

    pub fn owned_heroes(&self, team: Team) -> impl Iterator<Item = &Hero> {
        self.heroes.values().filter(move |hero| hero.owner == team)
    }

    pub fn entity_at(&self, pos: Position) -> Option<EntityRef> {
        if let Some(id) = self.map.unit_at(pos) {
            return Some(EntityRef::Hero(id));
        }
        let feature = self.map.feature(pos)?;
        if self.towns.contains_key(&feature.id) {
            Some(EntityRef::Town(feature.id))
        } else if self.mines.contains_key(&feature.id) {
            Some(EntityRef::Mine(feature.id))
        } else {
            None
        }
    }

    fn interactable(&self, target: EntityRef) -> Result<&dyn Interactable, GameStateError> {
        let interactable: &dyn Interactable = match target {
            EntityRef::Hero(id) => self.hero(id)?,
            EntityRef::Town(id) => self.town(id)?,
            EntityRef::Mine(id) => self.mine(id)?,
        };
        Ok(interactable)
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn is_game_over(&self) -> bool {
        self.phase == GamePhase::GameOver
    }

    pub fn has_won(&self) -> bool {
        self.won
    }

    pub fn winner(&self) -> Option<Team> {
        self.winner
    }

    pub fn started(&self) -> bool {
        self.started
    }

    pub fn human_players(&self) -> usize {
        self.teams.len()
    }

    pub fn turn_order(&self) -> &[Team] {
        &self.turn_order
    }

    /// The team holding turn authority.
    pub fn turn_taker(&self) -> Option<Team> {
        self.turn_order.get(self.turn_taker).copied()
    }

    pub fn current_team(&self) -> Option<Team> {
        self.current_team
    }

    pub fn set_current_team(&mut self, team: Team) {
        self.current_team = Some(team);
    }

    pub fn on_turn(&self) -> bool {
        self.started && self.current_team.is_some() && self.turn_taker() == self.current_team
    }

    pub fn player_names(&self) -> &BTreeMap<Team, String> {
        &self.player_names
    }

    pub fn stockpile(&self, team: Team) -> Option<&ResourceStock> {
        self.stockpiles.get(&team)
    }

    pub fn fog(&self, team: Team) -> Option<&FogOfWar> {
        self.fog.get(&team)
    }

    pub fn battlefield(&self) -> Option<&Battlefield> {
        self.battlefield.as_ref()
    }

    pub fn set_battlefield(&mut self, battlefield: Battlefield) {
        self.battlefield = Some(battlefield);
    }

    /// Registers a joining player; the game starts once every seat is taken.
    pub fn add_player(&mut self, team: Team, name: &str) -> Result<(), GameStateError> {
        if !self.teams.contains(&team) {
            return Err(GameStateError::UnknownTeam(team));
        }
        self.player_names.insert(team, name.to_string());
        if self.player_names.len() == self.teams.len() {
            info!("All {} players joined, starting game", self.teams.len());
            self.started = true;
        }
        Ok(())
    }

    /// Next team without a player, in seat order.
    pub fn next_free_team(&self) -> Option<Team> {
        self.teams
            .iter()
            .find(|team| !self.player_names.contains_key(team))
            .copied()
    }

    pub fn player_alive(&self, team: Team) -> bool {
        self.turn_order.len() > 1 && self.turn_order.contains(&team)
    }

    pub fn end_turn(&mut self) {
        if self.turn_order.is_empty() {
            return;
        }
        if self.turn_taker + 1 >= self.turn_order.len() {
            self.turn_taker = 0;
            self.generate_resources();
        } else {
            self.turn_taker += 1;
        }

        let team = self.turn_order[self.turn_taker];
        debug!("Turn passes to {}", team);
        self.refresh_hero_moves(team);
        self.events.push(GameEvent::TurnStart(team));
    }

    fn refresh_hero_moves(&mut self, team: Team) {
        for hero in self.heroes.values_mut().filter(|hero| hero.owner == team) {
            hero.refresh_move();
        }
    }

    fn generate_resources(&mut self) {
        for town in self.towns.values() {
            if let Some(stock) = self.stockpiles.get_mut(&town.owner) {
                stock.add_all(&town.income);
            }
        }
        for mine in self.mines.values() {
            if let Some(stock) = self.stockpiles.get_mut(&mine.owner) {
                stock.add(mine.resource, mine.resource.mine_output_per_turn());
            }
        }
    }

    fn set_phase(&mut self, phase: GamePhase) {
        // Nothing brings a finished game back.
        if self.phase == GamePhase::GameOver || self.phase == phase {
            return;
        }
        self.phase = phase;
        self.events.push(GameEvent::PhaseChanged(phase));
    }

    pub fn start_battle(&mut self) {
        self.set_phase(GamePhase::Battlefield);
    }

    pub fn battle_concluded(&mut self) {
        self.battlefield = None;
        self.set_phase(GamePhase::MainMap);
    }

    pub fn trade(&mut self) {
        self.set_phase(GamePhase::Trade);
    }

    pub fn trade_concluded(&mut self) {
        self.set_phase(GamePhase::MainMap);
    }

    pub fn defeat_team(&mut self, team: Team) -> Result<(), GameStateError> {
        let index = self
            .turn_order
            .iter()
            .position(|t| *t == team)
            .ok_or(GameStateError::UnknownTeam(team))?;

        if self.turn_taker == index {
            self.end_turn();
        }
        let holder = self.turn_order[self.turn_taker];
        self.turn_order.remove(index);
        self.turn_taker = self
            .turn_order
            .iter()
            .position(|t| *t == holder)
            .unwrap_or(0);

        self.purge_team(team);
        info!("{} has been defeated", team);
        self.events.push(GameEvent::TeamDefeated(team));

        if self.current_team == Some(team) {
            self.phase = GamePhase::GameOver;
            self.events.push(GameEvent::PhaseChanged(GamePhase::GameOver));
        } else if let [last] = self.turn_order[..] {
            self.declare_victory(last);
        }
        Ok(())
    }

    /// Ends the game in favour of `team`. Repeated calls are ignored.
    pub fn declare_victory(&mut self, team: Team) {
        if self.winner == Some(team) {
            return;
        }
        self.winner = Some(team);
        self.won = self.current_team == Some(team);
        if self.phase != GamePhase::GameOver {
            self.phase = GamePhase::GameOver;
            self.events.push(GameEvent::PhaseChanged(GamePhase::GameOver));
        }
        self.events.push(GameEvent::Victory(team));
    }

    /// The last team standing, once only one is left.
    pub fn sole_survivor(&self) -> Option<Team> {
        match self.turn_order[..] {
            [last] if self.started => Some(last),
            _ => None,
        }
    }

    /// Neutralizes the team's property and removes its heroes.
    fn purge_team(&mut self, team: Team) {
        for town in self.towns.values_mut().filter(|town| town.owner == team) {
            town.owner = Team::Neutral;
        }
        for mine in self.mines.values_mut().filter(|mine| mine.owner == team) {
            mine.owner = Team::Neutral;
        }
        let defeated: Vec<EntityId> = self.owned_heroes(team).map(|hero| hero.id).collect();
        for id in defeated {
            if let Some(hero) = self.heroes.remove(&id) {
                self.map.clear_unit(hero.position);
            }
        }
    }

    /// Defeats every team left without a town.
    pub fn check_defeat(&mut self) -> Result<(), GameStateError> {
        let homeless: Vec<Team> = self
            .turn_order
            .iter()
            .filter(|team| !self.towns.values().any(|town| town.owner == **team))
            .copied()
            .collect();
        for team in homeless {
            if self.turn_order.contains(&team) {
                self.defeat_team(team)?;
            }
        }
        Ok(())
    }

    pub fn notify_disconnected(&mut self, team: Team) {
        self.events.push(GameEvent::PlayerDisconnected(team));
    }

    fn allocate_id(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn add_town(&mut self, origin: Position) -> Result<EntityId, GameStateError> {
        let id = EntityId(self.next_id);
        self.map.place_feature(origin, id, &SITE_FOOTPRINT)?;
        self.allocate_id();
        self.towns.insert(id, Town::castle(id, origin));
        Ok(id)
    }

    pub fn add_mine(&mut self, origin: Position, resource: Resource) -> Result<EntityId, GameStateError> {
        let id = EntityId(self.next_id);
        self.map.place_feature(origin, id, &SITE_FOOTPRINT)?;
        self.allocate_id();
        self.mines.insert(
            id,
            Mine {
                id,
                owner: Team::Neutral,
                position: origin,
                resource,
            },
        );
        Ok(id)
    }

    /// A fresh, unplaced hero with a new id.
    pub fn new_hero<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Hero {
        let id = self.allocate_id();
        Hero::random(id, rng)
    }

    /// Places `hero` at the gate of `town` and hands it to `team`. A taken
    /// gate falls back to the tile below it, then to the gate's other
    /// neighbours in a fixed order, so every peer picks the same tile.
    pub fn give_hero(&mut self, team: Team, mut hero: Hero, town: EntityId) -> Result<EntityId, GameStateError> {
        if self.heroes.contains_key(&hero.id) {
            return Err(GameStateError::InvalidArgument {
                value: hero.id.to_string(),
            });
        }
        let gate = self.town(town)?.interaction_point();
        let spot = self
            .spawn_spot(gate)
            .ok_or_else(|| GameStateError::InvalidArgument {
                value: format!("no free tile at town {}", town),
            })?;

        self.map.place_unit(spot, hero.id)?;
        hero.owner = team;
        hero.position = spot;
        let id = hero.id;
        self.next_id = self.next_id.max(id.0 + 1);
        self.heroes.insert(id, hero);
        self.events.push(GameEvent::HeroAdded(id));
        Ok(id)
    }

    fn spawn_spot(&self, gate: Position) -> Option<Position> {
        let around = (-1..=1)
            .flat_map(|dy| (-1..=1).map(move |dx| gate.offset(dx, dy)))
            .filter(|pos| *pos != gate && *pos != gate.offset(0, 1));
        std::iter::once(gate)
            .chain(std::iter::once(gate.offset(0, 1)))
            .chain(around)
            .find(|pos| self.map.is_passable_through(*pos, None))
    }

    pub fn can_afford_hero(&self, team: Team) -> bool {
        self.stockpiles
            .get(&team)
            .map_or(false, |stock| stock.get(Resource::Gold) >= HERO_GOLD_COST)
    }

    /// Charges `team` for `hero` and recruits it at `town`.
    pub fn buy_hero(&mut self, team: Team, hero: Hero, town: EntityId) -> Result<EntityId, GameStateError> {
        if !self.stockpiles.contains_key(&team) {
            return Err(GameStateError::UnknownTeam(team));
        }
        if !self.can_afford_hero(team) {
            return Err(GameStateError::InsufficientResources {
                team,
                cost: HERO_GOLD_COST,
            });
        }
        let id = self.give_hero(team, hero, town)?;
        if let Some(stock) = self.stockpiles.get_mut(&team) {
            stock.spend(Resource::Gold, HERO_GOLD_COST);
        }
        Ok(id)
    }

    /// Shuffles the turn order and hands every team a town with two heroes.
    pub fn prepare_map<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<(), GameStateError> {
        self.turn_order.shuffle(rng);

        for team in self.teams.clone() {
            let neutral: Vec<EntityId> = self
                .towns
                .values()
                .filter(|town| town.owner == Team::Neutral)
                .map(|town| town.id)
                .collect();
            let town = *neutral.choose(rng).ok_or_else(|| {
                GameStateError::Corrupt(format!("no neutral town left for {}", team))
            })?;
            self.set_town_owner(town, team)?;
            for _ in 0..STARTING_HEROES_PER_TEAM {
                let hero = self.new_hero(rng);
                self.give_hero(team, hero, town)?;
            }
        }

        let sightings: Vec<(Team, Position)> =
            self.heroes.values().map(|hero| (hero.owner, hero.position)).collect();
        for (team, position) in sightings {
            self.explore(team, position);
        }
        Ok(())
    }

    fn explore(&mut self, team: Team, around: Position) {
        if let Some(fog) = self.fog.get_mut(&team) {
            fog.reveal(around, SIGHT_RANGE);
        }
    }

    /// The main map as the local team sees it. Servers see everything.
    pub fn view(&self) -> MapView<'_> {
        let fog = self.current_team.and_then(|team| self.fog.get(&team));
        self.map.view(fog)
    }

    pub fn find_path(&self, from: Position, to: Position) -> Vec<Position> {
        self.view().find_path(from, to)
    }

    /// Longest prefix of `path` the hero can still walk this turn.
    pub fn legal_moves(&self, hero: EntityId, path: &[Position]) -> Result<Vec<Position>, GameStateError> {
        let budget = self.hero(hero)?.remaining_move;
        Ok(self.map.view(None).truncate_to_budget(path, budget))
    }

    /// Walks a hero along `path`, clamped to its remaining movement. Returns
    /// the steps actually taken.
    pub fn move_hero(&mut self, id: EntityId, path: &[Position]) -> Result<Vec<Position>, GameStateError> {
        let hero = self.hero(id)?;
        let (owner, start, budget) = (hero.owner, hero.position, hero.remaining_move);

        let mut previous = start;
        for step in path {
            if !self.map.in_bounds(*step) {
                return Err(GameStateError::OutOfBounds(*step));
            }
            if previous.chebyshev_distance(*step) != 1 {
                return Err(GameStateError::InvalidArgument {
                    value: format!("step {} -> {}", previous, step),
                });
            }
            if let Some(other) = self.map.unit_at(*step) {
                if other != id {
                    return Err(GameStateError::InvalidArgument {
                        value: format!("step onto unit {} at {}", other, step),
                    });
                }
            }
            previous = *step;
        }

        let legal = self.map.view(None).truncate_to_budget(path, budget);
        if legal.len() < path.len() {
            warn!(
                "Clamped path of hero {} from {} to {} steps",
                id,
                path.len(),
                legal.len()
            );
        }

        let mut position = start;
        let mut remaining = budget;
        for step in &legal {
            self.map.move_unit(position, *step)?;
            remaining = remaining.saturating_sub(self.map.pass_cost(*step));
            position = *step;
            self.explore(owner, position);
            self.events.push(GameEvent::HeroMoved { hero: id, to: position });
        }

        let hero = self.hero_mut(id)?;
        hero.position = position;
        hero.remaining_move = remaining;
        Ok(legal)
    }

    pub fn kill_hero(&mut self, id: EntityId) -> Result<Hero, GameStateError> {
        let hero = self
            .heroes
            .remove(&id)
            .ok_or_else(|| GameStateError::UnknownHero(id.to_string()))?;
        self.map.clear_unit(hero.position);
        self.events.push(GameEvent::HeroKilled(id));
        Ok(hero)
    }

    /// Reassigns a town without checking anyone for defeat.
    pub fn set_town_owner(&mut self, town: EntityId, team: Team) -> Result<(), GameStateError> {
        let entry = self
            .towns
            .get_mut(&town)
            .ok_or_else(|| GameStateError::UnknownTown(town.to_string()))?;
        entry.owner = team;
        Ok(())
    }

    /// Hands `town` to the owner of `hero`, then defeats anyone left homeless.
    pub fn capture_town(&mut self, hero: EntityId, town: EntityId) -> Result<(), GameStateError> {
        let owner = self.hero(hero)?.owner;
        let entry = self
            .towns
            .get_mut(&town)
            .ok_or_else(|| GameStateError::UnknownTown(town.to_string()))?;
        entry.owner = owner;
        self.events.push(GameEvent::PropertyCaptured {
            property: town,
            owner,
        });
        self.check_defeat()
    }

    pub fn capture_mine(&mut self, hero: EntityId, mine: EntityId) -> Result<(), GameStateError> {
        let owner = self.hero(hero)?.owner;
        let entry = self
            .mines
            .get_mut(&mine)
            .ok_or_else(|| GameStateError::UnknownMine(mine.to_string()))?;
        entry.owner = owner;
        self.events.push(GameEvent::PropertyCaptured {
            property: mine,
            owner,
        });
        Ok(())
    }

    pub fn unit_can_interact_with(&self, hero: EntityId, target: EntityRef) -> Result<bool, GameStateError> {
        let hero = self.hero(hero)?;
        let target = self.interactable(target)?;
        let point = target.interaction_point();
        if self.view().is_passable(point) {
            Ok(hero.position == point)
        } else {
            Ok(hero.position.is_adjacent_or_same(target.position()))
        }
    }

    /// What `hero` would do to `target`, judged from ownership.
    pub fn interaction(&self, hero: EntityId, target: EntityRef) -> Result<Interaction, GameStateError> {
        if target == EntityRef::Hero(hero) {
            return Err(GameStateError::InvalidArgument {
                value: hero.to_string(),
            });
        }
        let team = self.hero(hero)?.owner;
        let friendly = self.interactable(target)?.is_friendly(team);
        Ok(match target {
            EntityRef::Hero(other) if friendly => Interaction::HeroTrade {
                hero,
                target: other,
            },
            EntityRef::Hero(other) => Interaction::HeroBattle {
                hero,
                target: other,
            },
            EntityRef::Town(town) if friendly => Interaction::TownInteract { hero, town },
            EntityRef::Town(town) => Interaction::TownBattle { hero, town },
            EntityRef::Mine(_) if friendly => Interaction::Move,
            EntityRef::Mine(mine) => Interaction::CaptureResource { hero, mine },
        })
    }

    /// Cheapest path that brings `hero` within reach of `target`. Empty when
    /// it already is, or when no approach exists.
    pub fn approach_path(&self, hero: EntityId, target: EntityRef) -> Result<Vec<Position>, GameStateError> {
        if self.unit_can_interact_with(hero, target)? {
            return Ok(Vec::new());
        }
        let start = self.hero(hero)?.position;
        let point = self.interactable(target)?.interaction_point();
        let view = self.view();

        let destinations: Vec<Position> = if view.is_passable(point) {
            vec![point]
        } else {
            view.neighbors(point)
                .into_iter()
                .chain(std::iter::once(point))
                .filter(|pos| view.is_passable(*pos))
                .collect()
        };

        Ok(destinations
            .into_iter()
            .map(|destination| view.find_path(start, destination))
            .filter(|path| !path.is_empty())
            .min_by_key(|path| view.path_cost(path))
            .unwrap_or_default())
    }

    /// Replaces this model with an authoritative snapshot, keeping the local
    /// identity and undelivered events.
    pub fn adopt(&mut self, snapshot: GameModel) {
        let current_team = self.current_team;
        let mut events = std::mem::take(&mut self.events);
        *self = snapshot;
        self.current_team = current_team;
        if let Some(team) = current_team {
            self.won = self.winner == Some(team);
            if self.phase != GamePhase::GameOver && !self.turn_order.contains(&team) && self.started {
                self.phase = GamePhase::GameOver;
            }
        }
        events.push(GameEvent::StateReplaced);
        self.events = events;
    }

    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }
}
