//! Single-process game: one participant, one tick per line of input.

use std::io::{self, BufRead, Write};

use anyhow::Context;
use delve_engine::prelude::*;
use delve_server::commands::{Command, HELP};
use delve_server::render::{render_inventory, render_shop, render_text, CLEAR};
use delve_server::{init_tracing, ServerConfig};

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing("warn");
    let config = ServerConfig::from_env().context("invalid configuration")?;

    let world = World::new(
        config.world.clone(),
        Box::new(StandardContent),
        Box::new(JsonLinesRunLog::new(&config.run_log)),
    );
    let mut tick_loop = TickLoop::new(
        world,
        TickConfig {
            tick_interval: config.tick_interval,
        },
    );

    let stdin = io::stdin();
    let mut input = stdin.lock().lines();
    let mut out = io::stdout().lock();

    write!(out, "What is your name? ")?;
    out.flush()?;
    let Some(name) = input.next().transpose()? else {
        return Ok(());
    };
    let class = loop {
        write!(out, "Choose a class: [w]arrior, [m]age, [c]leric: ")?;
        out.flush()?;
        let Some(line) = input.next().transpose()? else {
            return Ok(());
        };
        match line.parse::<PlayerClass>() {
            Ok(class) => break class,
            Err(e) => writeln!(out, "{e}")?,
        }
    };
    let id = tick_loop.world_mut().connect(&name, class)?;

    let mut listing: Option<InventoryEdit> = None;
    let mut notice = String::new();
    loop {
        if let Some(frame) = tick_loop.world().render_snapshot_for(id, config.view_width, config.view_height) {
            write!(out, "{CLEAR}{}", render_text(&frame))?;
        }
        if !notice.is_empty() {
            write!(out, "{notice}")?;
            notice.clear();
        }
        write!(out, "> ")?;
        out.flush()?;

        let Some(line) = input.next().transpose()? else {
            break;
        };
        let command = match Command::parse(&line) {
            Ok(command) => command,
            Err(e) => {
                notice = format!("{e}\r\n");
                continue;
            }
        };
        match command {
            Command::Act(intent) => {
                tick_loop.world_mut().enqueue_intent(id, intent);
                let report = tick_loop.tick();
                if report.interactions.contains(&(id, Interaction::OpenShop)) {
                    notice = render_shop(&tick_loop.world().content().shop_offers());
                }
            }
            Command::Edit(op) => {
                let world = tick_loop.world_mut();
                let result = match listing.take().or_else(|| world.open_inventory(id)) {
                    Some(mut edit) => {
                        edit.push(op);
                        world.commit_inventory(edit).map(|_| ())
                    }
                    None => Err(EditError::Stale),
                };
                if let Err(e) = result {
                    notice = format!("You cannot do that: {e}.\r\n");
                }
            }
            Command::ShowInventory => {
                listing = tick_loop.world().open_inventory(id);
                notice = listing
                    .as_ref()
                    .map_or_else(|| "You have nothing while dead.\r\n".to_string(), render_inventory);
            }
            Command::ShowShop => {
                let world = tick_loop.world();
                notice = if world.session(id).map(|s| s.depth) == Some(0) {
                    render_shop(&world.content().shop_offers())
                } else {
                    "There is no shop here.\r\n".to_string()
                };
            }
            Command::Help => notice = format!("{}\r\n", HELP.replace('\n', "\r\n")),
            Command::Quit => break,
        }
    }

    tick_loop.world_mut().disconnect(id);
    writeln!(out, "Farewell.")?;
    Ok(())
}
