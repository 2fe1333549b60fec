use serde::{Deserialize, Serialize};

use crate::error::GameStateError;
use crate::model::entities::EntityId;
use crate::pathfinding::{PathMap, IMPASSABLE_COST};
use crate::position::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Passability {
    Impassable,
    Normal,
    Rough,
}

impl Passability {
    pub fn cost(&self) -> u32 {
        match self {
            Passability::Impassable => IMPASSABLE_COST,
            Passability::Normal => 1,
            Passability::Rough => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TerrainType {
    Sea,
    Grass,
    Mud,
}

impl TerrainType {
    pub const ALL: [TerrainType; 3] = [TerrainType::Sea, TerrainType::Grass, TerrainType::Mud];

    pub fn passability(&self) -> Passability {
        match self {
            TerrainType::Sea => Passability::Impassable,
            TerrainType::Grass => Passability::Normal,
            TerrainType::Mud => Passability::Rough,
        }
    }
}

/// One tile of a town or mine footprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureTile {
    pub id: EntityId,
    pub passability: Passability,
}

/// Per-team record of unexplored tiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FogOfWar {
    width: i32,
    height: i32,
    hidden: Vec<bool>,
}

impl FogOfWar {
    pub fn new(width: i32, height: i32, enabled: bool) -> Self {
        let len = (width.max(0) * height.max(0)) as usize;
        Self {
            width,
            height,
            hidden: vec![enabled; len],
        }
    }

    /// Out-of-bounds tiles count as hidden.
    pub fn is_hidden(&self, pos: Position) -> bool {
        match tile_index(self.width, self.height, pos) {
            Some(index) => self.hidden[index],
            None => true,
        }
    }

    /// Uncovers the square of `radius` tiles around `center`, clipped to the map.
    pub fn reveal(&mut self, center: Position, radius: i32) {
        let left = (center.x - radius).max(0);
        let right = (center.x + radius).min(self.width - 1);
        let top = (center.y - radius).max(0);
        let bottom = (center.y + radius).min(self.height - 1);
        for x in left..=right {
            for y in top..=bottom {
                self.hidden[(y * self.width + x) as usize] = false;
            }
        }
    }
}

fn tile_index(width: i32, height: i32, pos: Position) -> Option<usize> {
    if pos.x < 0 || pos.y < 0 || pos.x >= width || pos.y >= height {
        return None;
    }
    Some((pos.y * width + pos.x) as usize)
}

/// The main game board: terrain, features (towns and mines) and units, each
/// as its own layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MainMap {
    width: i32,
    height: i32,
    terrain: Vec<TerrainType>,
    features: Vec<Option<FeatureTile>>,
    units: Vec<Option<EntityId>>,
}

impl MainMap {
    pub fn new(width: i32, height: i32) -> Self {
        let len = (width.max(0) * height.max(0)) as usize;
        Self {
            width,
            height,
            terrain: vec![TerrainType::Grass; len],
            features: vec![None; len],
            units: vec![None; len],
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn in_bounds(&self, pos: Position) -> bool {
        tile_index(self.width, self.height, pos).is_some()
    }

    fn index(&self, pos: Position) -> Result<usize, GameStateError> {
        tile_index(self.width, self.height, pos).ok_or(GameStateError::OutOfBounds(pos))
    }

    pub fn terrain(&self, pos: Position) -> Option<TerrainType> {
        tile_index(self.width, self.height, pos).map(|index| self.terrain[index])
    }

    pub fn set_terrain(&mut self, pos: Position, terrain: TerrainType) -> Result<(), GameStateError> {
        let index = self.index(pos)?;
        self.terrain[index] = terrain;
        Ok(())
    }

    pub fn feature(&self, pos: Position) -> Option<FeatureTile> {
        tile_index(self.width, self.height, pos).and_then(|index| self.features[index])
    }

    /// Draws a `[dx][dy]` footprint with its top-left corner at `origin`.
    pub fn place_feature<const W: usize, const H: usize>(
        &mut self,
        origin: Position,
        id: EntityId,
        footprint: &[[Passability; H]; W],
    ) -> Result<(), GameStateError> {
        // Check the whole footprint first so a failed placement leaves no trace.
        for dx in 0..W {
            for dy in 0..H {
                self.index(origin.offset(dx as i32, dy as i32))?;
            }
        }
        for (dx, column) in footprint.iter().enumerate() {
            for (dy, passability) in column.iter().enumerate() {
                let index = self.index(origin.offset(dx as i32, dy as i32))?;
                self.features[index] = Some(FeatureTile {
                    id,
                    passability: *passability,
                });
            }
        }
        Ok(())
    }

    pub fn unit_at(&self, pos: Position) -> Option<EntityId> {
        tile_index(self.width, self.height, pos).and_then(|index| self.units[index])
    }

    pub fn place_unit(&mut self, pos: Position, id: EntityId) -> Result<(), GameStateError> {
        let index = self.index(pos)?;
        if let Some(other) = self.units[index] {
            if other != id {
                return Err(GameStateError::Corrupt(format!(
                    "unit {} placed on {} occupied by {}",
                    id, pos, other
                )));
            }
        }
        self.units[index] = Some(id);
        Ok(())
    }

    pub fn clear_unit(&mut self, pos: Position) {
        if let Some(index) = tile_index(self.width, self.height, pos) {
            self.units[index] = None;
        }
    }

    pub fn move_unit(&mut self, from: Position, to: Position) -> Result<(), GameStateError> {
        let id = self
            .unit_at(from)
            .ok_or_else(|| GameStateError::Corrupt(format!("no unit to move at {}", from)))?;
        let target = self.index(to)?;
        self.clear_unit(from);
        self.units[target] = Some(id);
        Ok(())
    }

    /// Passability as seen through `fog`. `None` sees the whole board.
    pub fn is_passable_through(&self, pos: Position, fog: Option<&FogOfWar>) -> bool {
        let Some(index) = tile_index(self.width, self.height, pos) else {
            return false;
        };
        if fog.map_or(false, |fog| fog.is_hidden(pos)) {
            return false;
        }
        if self.units[index].is_some() {
            return false;
        }
        match self.features[index] {
            Some(feature) => feature.passability != Passability::Impassable,
            None => self.terrain[index].passability() != Passability::Impassable,
        }
    }

    /// Cost of entering `pos`. Units do not change the cost.
    pub fn pass_cost(&self, pos: Position) -> u32 {
        let Some(index) = tile_index(self.width, self.height, pos) else {
            return IMPASSABLE_COST;
        };
        match self.features[index] {
            Some(feature) => feature.passability.cost(),
            None => self.terrain[index].passability().cost(),
        }
    }

    /// Board digest over terrain and unit placement.
    pub fn checksum(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&self.width.to_be_bytes());
        hasher.update(&self.height.to_be_bytes());
        for (terrain, unit) in self.terrain.iter().zip(&self.units) {
            hasher.update(&[*terrain as u8]);
            match unit {
                Some(id) => {
                    hasher.update(&[1]);
                    hasher.update(&id.0.to_be_bytes());
                }
                None => hasher.update(&[0]),
            }
        }
        hasher.finalize()
    }

    pub fn view<'a>(&'a self, fog: Option<&'a FogOfWar>) -> MapView<'a> {
        MapView { map: self, fog }
    }
}

/// The main map as one team sees it.
pub struct MapView<'a> {
    map: &'a MainMap,
    fog: Option<&'a FogOfWar>,
}

impl PathMap for MapView<'_> {
    fn is_passable(&self, pos: Position) -> bool {
        self.map.is_passable_through(pos, self.fog)
    }

    fn pass_cost(&self, pos: Position) -> u32 {
        self.map.pass_cost(pos)
    }

    fn neighbors(&self, pos: Position) -> Vec<Position> {
        let mut neighbors = Vec::with_capacity(8);
        for dx in -1..=1 {
            for dy in -1..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let neighbor = pos.offset(dx, dy);
                if self.map.in_bounds(neighbor) {
                    neighbors.push(neighbor);
                }
            }
        }
        neighbors
    }

    fn heuristic(&self, from: Position, to: Position) -> u32 {
        from.chebyshev_distance(to)
    }
}
