//! One line of client input, parsed.

use delve_engine::action::Intent;
use delve_engine::components::Slot;
use delve_engine::inventory::EditOp;

/// What a participant asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Queued for the next tick.
    Act(Intent),
    /// Applied immediately through an out-of-band inventory edit.
    Edit(EditOp),
    ShowInventory,
    ShowShop,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("Unknown command '{0}'. Type 'help' for a list.")]
    Unknown(String),
    #[error("'{0}' needs an item number, for example '{0} 1'.")]
    MissingIndex(&'static str),
    #[error("'{0}' is not an item number.")]
    BadIndex(String),
    #[error("'{0}' is not a slot. Try weapon, armor or trinket.")]
    BadSlot(String),
}

impl Command {
    /// Parse one line. Item numbers are 1-based, as listed to the player.
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let line = line.trim();
        let mut words = line.split_whitespace();
        let verb = words.next().unwrap_or("").to_ascii_lowercase();
        let arg = words.next();

        let edit = |name: &'static str, op: fn(usize) -> EditOp| -> Result<Command, CommandError> {
            Ok(Command::Edit(op(item_index(name, arg)?)))
        };
        match verb.as_str() {
            "use" | "quaff" => edit("use", EditOp::Use),
            "equip" | "wield" | "wear" => edit("equip", EditOp::Equip),
            "drop" => edit("drop", EditOp::Drop),
            "buy" => edit("buy", EditOp::Buy),
            "unequip" | "remove" => {
                let slot = arg.ok_or(CommandError::MissingIndex("unequip"))?;
                Ok(Command::Edit(EditOp::Unequip(parse_slot(slot)?)))
            }
            "shop" => Ok(Command::ShowShop),
            "help" | "?" => Ok(Command::Help),
            _ => match line.parse::<Intent>() {
                Ok(Intent::Inventory) => Ok(Command::ShowInventory),
                Ok(Intent::Quit) => Ok(Command::Quit),
                Ok(intent) => Ok(Command::Act(intent)),
                Err(_) => Err(CommandError::Unknown(line.to_string())),
            },
        }
    }
}

fn item_index(verb: &'static str, arg: Option<&str>) -> Result<usize, CommandError> {
    let arg = arg.ok_or(CommandError::MissingIndex(verb))?;
    match arg.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n - 1),
        _ => Err(CommandError::BadIndex(arg.to_string())),
    }
}

fn parse_slot(word: &str) -> Result<Slot, CommandError> {
    match word.to_ascii_lowercase().as_str() {
        "weapon" | "w" => Ok(Slot::Weapon),
        "armor" | "armour" | "a" => Ok(Slot::Armor),
        "trinket" | "t" => Ok(Slot::Trinket),
        _ => Err(CommandError::BadSlot(word.to_string())),
    }
}

pub const HELP: &str = "\
Movement: h j k l y u b n (or north, south, ne, ...). '.' waits.
g picks up, > descends, < ascends, a uses your ability.
i lists your pack. use N, equip N, drop N, unequip SLOT.
shop lists the merchant's wares in town; buy N purchases.
q quits.";

#[cfg(test)]
mod tests {
    use super::*;
    use delve_engine::geom::Direction;

    #[test]
    fn movement_and_actions_become_intents() {
        assert_eq!(Command::parse("k"), Ok(Command::Act(Intent::Move(Direction::North))));
        assert_eq!(Command::parse(" > \r"), Ok(Command::Act(Intent::Descend)));
        assert_eq!(Command::parse(""), Ok(Command::Act(Intent::Wait)));
        assert_eq!(Command::parse("a"), Ok(Command::Act(Intent::Ability)));
    }

    #[test]
    fn inventory_and_quit_stay_out_of_the_tick() {
        assert_eq!(Command::parse("i"), Ok(Command::ShowInventory));
        assert_eq!(Command::parse("quit"), Ok(Command::Quit));
        assert_eq!(Command::parse("shop"), Ok(Command::ShowShop));
    }

    #[test]
    fn edits_take_one_based_numbers() {
        assert_eq!(Command::parse("use 1"), Ok(Command::Edit(EditOp::Use(0))));
        assert_eq!(Command::parse("EQUIP 3"), Ok(Command::Edit(EditOp::Equip(2))));
        assert_eq!(Command::parse("buy 2"), Ok(Command::Edit(EditOp::Buy(1))));
        assert_eq!(
            Command::parse("unequip armor"),
            Ok(Command::Edit(EditOp::Unequip(Slot::Armor)))
        );
        assert_eq!(Command::parse("use 0"), Err(CommandError::BadIndex("0".into())));
        assert_eq!(Command::parse("drop"), Err(CommandError::MissingIndex("drop")));
        assert_eq!(Command::parse("unequip hat"), Err(CommandError::BadSlot("hat".into())));
    }

    #[test]
    fn gibberish_is_reported_back() {
        assert_eq!(Command::parse("dance"), Err(CommandError::Unknown("dance".into())));
    }
}
