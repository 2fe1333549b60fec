use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::model::map::Passability;
use crate::position::Position;

pub const STANDARD_MAX_MOVE: u32 = 20;
pub const TOWN_GOLD_INCOME: u32 = 250;
pub const BATTLEFIELD_WIDTH: i32 = 20;
pub const BATTLEFIELD_HEIGHT: i32 = 20;
/// Battle draws are uniform over `1..=BATTLE_DRAW_MAX`.
pub const BATTLE_DRAW_MAX: u32 = 100;

const HERO_NAMES: [&str; 10] = [
    "Foulque the Giant",
    "Gawin the Angel",
    "Radulf the Twisted",
    "Christofur the Bruiser",
    "Gifardus the Loyal",
    "Geffrey the Cautious",
    "Remont the Great",
    "Carac the Wild",
    "Ulric the Harbinger",
    "Kit the Hungry",
];

/// Stable opaque identifier shared by heroes, towns and mines.
///
/// Travels on the wire as a decimal string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntityId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(EntityId)
    }
}

/// Participant identity. `Neutral` owns unclaimed property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Team {
    Team1,
    Team2,
    Team3,
    Team4,
    Team5,
    Team6,
    Team7,
    Team8,
    Neutral,
}

impl Team {
    pub const PLAYERS: [Team; 8] = [
        Team::Team1,
        Team::Team2,
        Team::Team3,
        Team::Team4,
        Team::Team5,
        Team::Team6,
        Team::Team7,
        Team::Team8,
    ];

    /// The `index`th player team, if there are that many.
    pub fn player(index: usize) -> Option<Team> {
        Self::PLAYERS.get(index).copied()
    }

    pub fn token(&self) -> &'static str {
        match self {
            Team::Team1 => "TEAM_1",
            Team::Team2 => "TEAM_2",
            Team::Team3 => "TEAM_3",
            Team::Team4 => "TEAM_4",
            Team::Team5 => "TEAM_5",
            Team::Team6 => "TEAM_6",
            Team::Team7 => "TEAM_7",
            Team::Team8 => "TEAM_8",
            Team::Neutral => "NEUTRAL",
        }
    }

    pub fn from_token(token: &str) -> Option<Team> {
        Self::PLAYERS
            .iter()
            .chain(std::iter::once(&Team::Neutral))
            .find(|team| team.token() == token)
            .copied()
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resource {
    Gold,
    Mercury,
    Gems,
    Wood,
    Ore,
    Sulfur,
    Crystal,
}

impl Resource {
    pub const ALL: [Resource; 7] = [
        Resource::Gold,
        Resource::Mercury,
        Resource::Gems,
        Resource::Wood,
        Resource::Ore,
        Resource::Sulfur,
        Resource::Crystal,
    ];

    pub fn mine_output_per_turn(&self) -> u32 {
        match self {
            Resource::Gold => 1000,
            _ => 5,
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

/// Per-team amounts of every resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceStock([u32; 7]);

impl ResourceStock {
    pub fn with_gold(gold: u32) -> Self {
        let mut stock = Self::default();
        stock.add(Resource::Gold, gold);
        stock
    }

    pub fn get(&self, resource: Resource) -> u32 {
        self.0[resource.index()]
    }

    pub fn add(&mut self, resource: Resource, amount: u32) {
        let slot = &mut self.0[resource.index()];
        *slot = slot.saturating_add(amount);
    }

    pub fn add_all(&mut self, other: &ResourceStock) {
        for resource in Resource::ALL {
            self.add(resource, other.get(resource));
        }
    }

    /// Spends `amount`, leaving the stock untouched when it is short.
    pub fn spend(&mut self, resource: Resource, amount: u32) -> bool {
        let slot = &mut self.0[resource.index()];
        match slot.checked_sub(amount) {
            Some(left) => {
                *slot = left;
                true
            }
            None => false,
        }
    }
}

/// Footprint shared by towns and mines: 3 wide, 2 high, indexed `[dx][dy]`,
/// with a passable gate at the interaction offset.
pub const SITE_FOOTPRINT: [[Passability; 2]; 3] = [
    [Passability::Impassable, Passability::Impassable],
    [Passability::Impassable, Passability::Normal],
    [Passability::Impassable, Passability::Impassable],
];
pub const SITE_INTERACTION_OFFSET: Position = Position::new(1, 1);

/// Something on the main map another unit can interact with.
pub trait Interactable {
    fn id(&self) -> EntityId;
    fn owner(&self) -> Team;
    fn position(&self) -> Position;
    fn interaction_point(&self) -> Position;

    fn is_friendly(&self, team: Team) -> bool {
        self.owner() == team
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hero {
    pub id: EntityId,
    pub name: String,
    pub owner: Team,
    pub position: Position,
    pub max_move: u32,
    pub remaining_move: u32,
}

impl Hero {
    pub fn new(id: EntityId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            owner: Team::Neutral,
            position: Position::new(0, 0),
            max_move: STANDARD_MAX_MOVE,
            remaining_move: STANDARD_MAX_MOVE,
        }
    }

    /// A hero with a name drawn from the standard roster.
    pub fn random<R: Rng + ?Sized>(id: EntityId, rng: &mut R) -> Self {
        let name = HERO_NAMES[rng.gen_range(0..HERO_NAMES.len())];
        Self::new(id, name)
    }

    pub fn refresh_move(&mut self) {
        self.remaining_move = self.max_move;
    }
}

impl Interactable for Hero {
    fn id(&self) -> EntityId {
        self.id
    }

    fn owner(&self) -> Team {
        self.owner
    }

    fn position(&self) -> Position {
        self.position
    }

    fn interaction_point(&self) -> Position {
        self.position
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Town {
    pub id: EntityId,
    pub owner: Team,
    pub position: Position,
    pub income: ResourceStock,
}

impl Town {
    pub fn castle(id: EntityId, position: Position) -> Self {
        Self {
            id,
            owner: Team::Neutral,
            position,
            income: ResourceStock::with_gold(TOWN_GOLD_INCOME),
        }
    }
}

impl Interactable for Town {
    fn id(&self) -> EntityId {
        self.id
    }

    fn owner(&self) -> Team {
        self.owner
    }

    fn position(&self) -> Position {
        self.position
    }

    fn interaction_point(&self) -> Position {
        self.position.add(SITE_INTERACTION_OFFSET)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mine {
    pub id: EntityId,
    pub owner: Team,
    pub position: Position,
    pub resource: Resource,
}

impl Interactable for Mine {
    fn id(&self) -> EntityId {
        self.id
    }

    fn owner(&self) -> Team {
        self.owner
    }

    fn position(&self) -> Position {
        self.position
    }

    fn interaction_point(&self) -> Position {
        self.position.add(SITE_INTERACTION_OFFSET)
    }
}

/// Sub-map two heroes fight on. The outcome is settled by one draw per side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Battlefield {
    pub width: i32,
    pub height: i32,
    pub challenger: EntityId,
    pub defender: EntityId,
    pub challenger_roll: u32,
    pub defender_roll: u32,
}

impl Battlefield {
    /// Draws both results, re-rolling until they differ.
    pub fn roll<R: Rng + ?Sized>(challenger: EntityId, defender: EntityId, rng: &mut R) -> Self {
        let mut challenger_roll = 0;
        let mut defender_roll = 0;
        while challenger_roll == defender_roll {
            defender_roll = rng.gen_range(1..=BATTLE_DRAW_MAX);
            challenger_roll = rng.gen_range(1..=BATTLE_DRAW_MAX);
        }

        Self {
            width: BATTLEFIELD_WIDTH,
            height: BATTLEFIELD_HEIGHT,
            challenger,
            defender,
            challenger_roll,
            defender_roll,
        }
    }

    /// The hero with the lower draw.
    pub fn loser(&self) -> EntityId {
        if self.challenger_roll > self.defender_roll {
            self.defender
        } else {
            self.challenger
        }
    }

    pub fn winner(&self) -> EntityId {
        if self.loser() == self.challenger {
            self.defender
        } else {
            self.challenger
        }
    }
}
