//! Plain-text rendering of frames and listings.
//!
//! Output uses `\r\n` line endings so raw telnet clients display it
//! correctly.

use std::fmt::Write as _;

use delve_engine::components::{EquipmentPiece, ItemKind};
use delve_engine::content::ShopOffer;
use delve_engine::inventory::InventoryEdit;
use delve_engine::map::TileKind;
use delve_engine::render::{Cell, Frame};

/// Clears the screen and homes the cursor.
pub const CLEAR: &str = "\x1b[2J\x1b[H";

pub fn tile_char(kind: TileKind) -> char {
    match kind {
        TileKind::Wall => '#',
        TileKind::Floor => '.',
        TileKind::DoorClosed => '+',
        TileKind::DoorOpen => '\'',
        TileKind::StairsUp => '<',
        TileKind::StairsDown => '>',
        TileKind::Grass => '"',
        TileKind::Tree => 'T',
        TileKind::Water => '~',
    }
}

fn cell_char(cell: Cell) -> char {
    match cell {
        Cell::Unknown => ' ',
        // Remembered floor fades out so the lit area stands apart.
        Cell::Remembered(TileKind::Floor | TileKind::Grass) => ' ',
        Cell::Remembered(kind) | Cell::Visible(kind) => tile_char(kind),
        Cell::Actor(glyph) => glyph.ch,
    }
}

/// Map, status lines and recent messages.
pub fn render_text(frame: &Frame) -> String {
    let mut out = String::with_capacity(((frame.width + 2) * (frame.height + 8)) as usize);
    for row in frame.rows() {
        let line: String = row.iter().map(|c| cell_char(*c)).collect();
        out.push_str(line.trim_end());
        out.push_str("\r\n");
    }

    let hud = &frame.hud;
    let _ = write!(
        out,
        "{} the {} | {} (depth {}) | turn {}\r\n",
        hud.name, hud.class, hud.level_name, hud.depth, hud.turns
    );
    if hud.death_countdown > 0 {
        let _ = write!(out, "You are dead. You wake in {} ticks.\r\n", hud.death_countdown);
    } else {
        let ability = match hud.ability_cooldown {
            0 => "ready".to_string(),
            n => format!("{n} turns"),
        };
        let _ = write!(
            out,
            "HP {}/{} | Atk {} ({:+}) Def {} ({:+}) | Gold {} | {}: {}",
            hud.hp, hud.max_hp, hud.attack, hud.attack_bonus, hud.defense, hud.defense_bonus, hud.gold, hud.ability, ability
        );
        for (kind, turns) in &hud.effects {
            let _ = write!(out, " | {} ({turns})", kind.label());
        }
        out.push_str("\r\n");
    }
    for msg in &frame.messages {
        out.push_str(msg);
        out.push_str("\r\n");
    }
    out
}

fn piece_stats(piece: &EquipmentPiece) -> String {
    let mut parts = Vec::new();
    if piece.attack_bonus != 0 {
        parts.push(format!("atk {:+}", piece.attack_bonus));
    }
    if piece.defense_bonus != 0 {
        parts.push(format!("def {:+}", piece.defense_bonus));
    }
    parts.join(", ")
}

fn item_line(item: &ItemKind) -> String {
    match item {
        ItemKind::Equipment(piece) => format!("{} ({:?}; {})", piece.name, piece.slot, piece_stats(piece)),
        other => other.name(),
    }
}

/// The pack as captured by an inventory edit, numbered from 1.
pub fn render_inventory(edit: &InventoryEdit) -> String {
    let mut out = format!("Pack ({}/{}), {} gold:\r\n", edit.items.len(), edit.capacity, edit.gold);
    if edit.items.is_empty() {
        out.push_str("  (empty)\r\n");
    }
    for (i, item) in edit.items.iter().enumerate() {
        let _ = write!(out, "  {}. {}\r\n", i + 1, item_line(item));
    }
    let worn: Vec<&EquipmentPiece> = edit.equipment.pieces().collect();
    if !worn.is_empty() {
        out.push_str("Worn:\r\n");
        for piece in worn {
            let _ = write!(out, "  {:?}: {} ({})\r\n", piece.slot, piece.name, piece_stats(piece));
        }
    }
    out
}

pub fn render_shop(offers: &[ShopOffer]) -> String {
    let mut out = String::from("The merchant offers:\r\n");
    for (i, offer) in offers.iter().enumerate() {
        let _ = write!(out, "  {}. {} - {} gold\r\n", i + 1, item_line(&offer.item), offer.price);
    }
    out.push_str("Type 'buy N' to purchase.\r\n");
    out
}
