use log::info;
use rand::Rng;

use crate::error::GameStateError;
use crate::model::{GameModel, MainMap, Resource, TerrainType};
use crate::position::Position;

pub const MIN_SKIRMISH_HEIGHT: i32 = 12;
const SITE_WIDTH: i32 = 3;
const SITE_SPACING: i32 = SITE_WIDTH + 1;

/// Builds the built-in skirmish map: a sea-bordered board with one more
/// town than there are players along its middle and a gold mine near the
/// top and bottom edges. Every team starts with a town and two heroes.
pub fn build_skirmish<R: Rng + ?Sized>(
    players: usize,
    width: i32,
    height: i32,
    fog: bool,
    rng: &mut R,
) -> Result<GameModel, GameStateError> {
    if players == 0 || players > 8 {
        return Err(GameStateError::InvalidArgument {
            value: format!("{} players", players),
        });
    }
    let towns = players as i32 + 1;
    let spacing = (width - 2) / towns;
    if spacing < SITE_SPACING || height < MIN_SKIRMISH_HEIGHT {
        return Err(GameStateError::InvalidArgument {
            value: format!("{}x{} map for {} players", width, height, players),
        });
    }

    let mut map = MainMap::new(width, height);
    randomize_terrain(&mut map, rng)?;

    let town_row = height / 2 - 1;
    let town_sites: Vec<Position> = (0..towns)
        .map(|i| Position::new(1 + i * spacing + (spacing - SITE_WIDTH) / 2, town_row))
        .collect();
    let mine_x = width / 2 - 1;
    let mine_sites = [Position::new(mine_x, 1), Position::new(mine_x, height - 4)];

    for site in town_sites.iter().chain(mine_sites.iter()) {
        clear_approach(&mut map, *site)?;
    }

    let mut model = GameModel::new(map, players, fog);
    for site in town_sites {
        model.add_town(site)?;
    }
    for site in mine_sites {
        model.add_mine(site, Resource::Gold)?;
    }
    model.prepare_map(rng)?;

    info!(
        "Built {}x{} skirmish map for {} players, checksum {}",
        width,
        height,
        players,
        model.checksum()
    );
    Ok(model)
}

/// Sea on the border, mostly grass with some mud and the odd lake inside.
fn randomize_terrain<R: Rng + ?Sized>(map: &mut MainMap, rng: &mut R) -> Result<(), GameStateError> {
    let (width, height) = (map.width(), map.height());
    for x in 0..width {
        for y in 0..height {
            let terrain = if x == 0 || y == 0 || x == width - 1 || y == height - 1 {
                TerrainType::Sea
            } else {
                match rng.gen_range(0..8) {
                    0 => TerrainType::Sea,
                    1 | 2 => TerrainType::Mud,
                    _ => TerrainType::Grass,
                }
            };
            map.set_terrain(Position::new(x, y), terrain)?;
        }
    }
    Ok(())
}

/// Turns sea below a site's footprint and around its gate into grass so the
/// gate can be reached.
fn clear_approach(map: &mut MainMap, site: Position) -> Result<(), GameStateError> {
    for dx in -1..=SITE_WIDTH {
        for dy in 2..=3 {
            let pos = site.offset(dx, dy);
            let on_border = pos.x <= 0 || pos.y <= 0 || pos.x >= map.width() - 1 || pos.y >= map.height() - 1;
            if !on_border && map.terrain(pos) == Some(TerrainType::Sea) {
                map.set_terrain(pos, TerrainType::Grass)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Team;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_default_skirmish_layout() {
        let mut rng = StdRng::seed_from_u64(11);
        let model = build_skirmish(2, 21, 20, false, &mut rng).unwrap();

        assert_eq!(model.towns().count(), 3);
        assert_eq!(model.mines().count(), 2);
        assert_eq!(model.heroes().count(), 4);
        for team in [Team::Team1, Team::Team2] {
            assert_eq!(model.towns().filter(|town| town.owner == team).count(), 1);
        }
        assert_eq!(model.map().terrain(Position::new(0, 5)), Some(TerrainType::Sea));
    }

    #[test]
    fn test_same_seed_same_board() {
        let a = build_skirmish(3, 30, 12, true, &mut StdRng::seed_from_u64(5)).unwrap();
        let b = build_skirmish(3, 30, 12, true, &mut StdRng::seed_from_u64(5)).unwrap();
        assert_eq!(a.checksum(), b.checksum());
        assert_eq!(a.turn_order(), b.turn_order());
    }

    #[test]
    fn test_rejects_boards_too_small_for_players() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(build_skirmish(8, 21, 20, false, &mut rng).is_err());
        assert!(build_skirmish(2, 21, 6, false, &mut rng).is_err());
        assert!(build_skirmish(0, 21, 20, false, &mut rng).is_err());
        assert!(build_skirmish(8, 40, 12, false, &mut rng).is_ok());
    }
}
