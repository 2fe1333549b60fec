use shared::model::{Resource, TerrainType};
use shared::{GameModel, Position, Team};
use std::fmt::Write;

/// Draws the main map as text, one character per tile, as seen by `viewer`.
///
/// The viewer's heroes are `@`, other heroes their team number. Towns are
/// `T` when owned by the viewer and `t` otherwise, mines `$`. Fogged tiles
/// are blank.
pub fn render_board(model: &GameModel, viewer: Option<Team>) -> String {
    let map = model.map();
    let fog = viewer.and_then(|team| model.fog(team));
    let mut out = String::with_capacity(((map.width() + 1) * map.height()) as usize);

    for y in 0..map.height() {
        for x in 0..map.width() {
            let pos = Position::new(x, y);
            if fog.map_or(false, |f| f.is_hidden(pos)) {
                out.push(' ');
                continue;
            }
            out.push(tile_glyph(model, pos, viewer));
        }
        out.push('\n');
    }
    out
}

fn tile_glyph(model: &GameModel, pos: Position, viewer: Option<Team>) -> char {
    if let Some(hero) = model.map().unit_at(pos).and_then(|id| model.hero(id).ok()) {
        if Some(hero.owner) == viewer {
            return '@';
        }
        return Team::PLAYERS
            .iter()
            .position(|team| *team == hero.owner)
            .and_then(|index| char::from_digit(index as u32 + 1, 10))
            .unwrap_or('?');
    }
    if let Some(feature) = model.map().feature(pos) {
        if let Ok(town) = model.town(feature.id) {
            return if Some(town.owner) == viewer { 'T' } else { 't' };
        }
        return '$';
    }
    match model.map().terrain(pos) {
        Some(TerrainType::Sea) => '~',
        Some(TerrainType::Grass) => '.',
        Some(TerrainType::Mud) => ',',
        None => ' ',
    }
}

/// One status block for the local team: whose turn it is, the stockpile and
/// heroes.
pub fn render_status(model: &GameModel) -> String {
    let mut out = String::new();
    match model.turn_taker() {
        Some(team) if model.started() => {
            let _ = writeln!(out, "turn: {}{}", team, if model.on_turn() { " (you)" } else { "" });
        }
        _ => {
            let _ = writeln!(out, "waiting for players");
        }
    }

    let team = match model.current_team() {
        Some(team) => team,
        None => return out,
    };
    if let Some(stock) = model.stockpile(team) {
        let resources: Vec<String> = Resource::ALL
            .iter()
            .map(|r| format!("{:?} {}", r, stock.get(*r)))
            .collect();
        let _ = writeln!(out, "stockpile: {}", resources.join(", "));
    }
    for hero in model.owned_heroes(team) {
        let _ = writeln!(
            out,
            "hero {} {} at {} moves {}/{}",
            hero.id, hero.name, hero.position, hero.remaining_move, hero.max_move
        );
    }
    for town in model.towns().filter(|t| t.owner == team) {
        let _ = writeln!(out, "town {} at {}", town.id, town.position);
    }
    out
}
