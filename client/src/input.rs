//! Text commands for the headless client.
//!
//! One command per line, for example `move 4 10 7` or `interact 4 12 8`.
//! Coordinates are tile columns and rows.

use shared::{EntityId, Position};

use crate::session::ClientCommand;

pub const HELP: &str = "\
commands:
  move <hero> <x> <y>       walk a hero towards a tile
  interact <hero> <x> <y>   walk up to whatever is on a tile and interact
  buy <town>                recruit a hero at one of your towns
  end                       end your turn
  trade-done                leave the trade screen
  battle-done               leave the battlefield
  surrender                 give up
  sync                      ask the server for a fresh snapshot
  board                     print the map
  status                    print turn and stockpile
  quit                      leave the game";

/// What a line of input asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Command(ClientCommand),
    Board,
    Status,
    Help,
    Quit,
}

pub fn parse_input(line: &str) -> Result<Input, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let (verb, rest) = match words.split_first() {
        Some((verb, rest)) => (*verb, rest),
        None => return Err("empty command".to_string()),
    };

    let input = match verb {
        "move" => {
            let (hero, to) = hero_and_tile(rest)?;
            Input::Command(ClientCommand::Move { hero, to })
        }
        "interact" => {
            let (hero, target) = hero_and_tile(rest)?;
            Input::Command(ClientCommand::Interact { hero, target })
        }
        "buy" => match rest {
            [town] => Input::Command(ClientCommand::BuyHero {
                town: number(town)?,
            }),
            _ => return Err("usage: buy <town>".to_string()),
        },
        "end" => Input::Command(ClientCommand::EndTurn),
        "trade-done" => Input::Command(ClientCommand::ConcludeTrade),
        "battle-done" => Input::Command(ClientCommand::EndBattle),
        "surrender" => Input::Command(ClientCommand::Surrender),
        "sync" => Input::Command(ClientCommand::RequestSync),
        "board" => Input::Board,
        "status" => Input::Status,
        "help" | "?" => Input::Help,
        "quit" | "exit" => Input::Quit,
        other => return Err(format!("unknown command {:?}, try help", other)),
    };
    Ok(input)
}

fn hero_and_tile(args: &[&str]) -> Result<(EntityId, Position), String> {
    match args {
        [hero, x, y] => Ok((number(hero)?, Position::new(number(x)?, number(y)?))),
        _ => Err("expected <hero> <x> <y>".to_string()),
    }
}

fn number<T: std::str::FromStr>(word: &str) -> Result<T, String> {
    word.parse().map_err(|_| format!("not a number: {:?}", word))
}
