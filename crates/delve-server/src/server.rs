//! Multiplayer TCP front end.
//!
//! One scheduler task owns the clock: it locks the shared [`TickLoop`],
//! ticks, unlocks, and publishes the tick number on a `watch` channel. Every
//! connection gets a reader (its own task loop, turning lines into intents or
//! inventory edits) and a writer task that wakes on that signal, copies its
//! participant's frame under the lock and formats and sends it after
//! releasing. A slow socket only delays its own frames; `watch` coalesces
//! the ones it missed.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use delve_engine::prelude::*;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::commands::{Command, HELP};
use crate::config::{FrameFormat, ServerConfig};
use crate::render::{render_inventory, render_shop, render_text, CLEAR};

/// Text pushed to one participant outside the frame cadence.
type NoticeSender = mpsc::UnboundedSender<String>;

/// State every connection task shares.
pub struct ServerContext {
    tick_loop: Arc<Mutex<TickLoop>>,
    notices: Mutex<HashMap<SessionId, NoticeSender>>,
    frames: watch::Receiver<u64>,
    view: (i32, i32),
    format: FrameFormat,
}

impl ServerContext {
    pub fn new(tick_loop: Arc<Mutex<TickLoop>>, frames: watch::Receiver<u64>, config: &ServerConfig) -> Self {
        Self {
            tick_loop,
            notices: Mutex::new(HashMap::new()),
            frames,
            view: (config.view_width, config.view_height),
            format: config.frame_format,
        }
    }

    pub fn tick_loop(&self) -> &Arc<Mutex<TickLoop>> {
        &self.tick_loop
    }

    async fn notify(&self, id: SessionId, text: String) {
        if let Some(tx) = self.notices.lock().await.get(&id) {
            let _ = tx.send(text);
        }
    }
}

/// Build the world described by `config` and serve it on `listener` until
/// the listener fails.
pub async fn run(listener: TcpListener, config: ServerConfig) -> io::Result<()> {
    let address = listener.local_addr()?;
    let world = World::new(
        config.world.clone(),
        Box::new(StandardContent),
        Box::new(JsonLinesRunLog::new(&config.run_log)),
    );
    let tick_loop = Arc::new(Mutex::new(TickLoop::new(
        world,
        TickConfig {
            tick_interval: config.tick_interval,
        },
    )));
    let (frame_tx, frame_rx) = watch::channel(0u64);
    let ctx = Arc::new(ServerContext::new(tick_loop, frame_rx, &config));

    tokio::spawn(run_scheduler(ctx.clone(), config.tick_interval, frame_tx));
    info!(%address, seed = config.world.seed, run_log = %config.run_log.display(), "listening");

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };
        tokio::spawn(handle_connection(stream, peer, ctx.clone()));
    }
}

/// Tick forever at `interval`, signalling a new frame after each tick.
pub async fn run_scheduler(ctx: Arc<ServerContext>, interval: Duration, frames: watch::Sender<u64>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let (report, offers) = {
            let mut tick_loop = ctx.tick_loop.lock().await;
            let report = tick_loop.tick();
            let shop_opened = report
                .interactions
                .iter()
                .any(|(_, i)| *i == Interaction::OpenShop);
            let offers = shop_opened.then(|| tick_loop.world().content().shop_offers());
            (report, offers)
        };
        frames.send_replace(report.tick);

        if let Some(offers) = offers {
            let listing = render_shop(&offers);
            for (id, interaction) in &report.interactions {
                if *interaction == Interaction::OpenShop {
                    ctx.notify(*id, listing.clone()).await;
                }
            }
        }
        if !report.deaths.is_empty() || !report.victories.is_empty() {
            info!(tick = report.tick, deaths = report.deaths.len(), victories = report.victories.len(), "runs ended");
        }
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, ctx: Arc<ServerContext>) {
    debug!(%peer, "connection opened");
    if let Err(e) = serve_participant(stream, &ctx).await {
        debug!(%peer, error = %e, "connection closed with error");
    }
    debug!(%peer, "connection closed");
}

async fn prompt<W: AsyncWrite + Unpin>(out: &mut W, text: &str) -> io::Result<()> {
    out.write_all(text.as_bytes()).await?;
    out.flush().await
}

/// Ask for a name and class; `None` if the client hung up first.
async fn sign_in(
    lines: &mut Lines<BufReader<OwnedReadHalf>>,
    out: &mut OwnedWriteHalf,
) -> io::Result<Option<(String, PlayerClass)>> {
    prompt(out, "Welcome to the delve.\r\nWhat is your name? ").await?;
    let Some(name) = lines.next_line().await? else {
        return Ok(None);
    };
    loop {
        prompt(out, "Choose a class: [w]arrior, [m]age, [c]leric: ").await?;
        let Some(line) = lines.next_line().await? else {
            return Ok(None);
        };
        match line.parse::<PlayerClass>() {
            Ok(class) => return Ok(Some((name, class))),
            Err(e) => prompt(out, &format!("{e}\r\n")).await?,
        }
    }
}

async fn serve_participant(stream: TcpStream, ctx: &Arc<ServerContext>) -> io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    let Some((name, class)) = sign_in(&mut lines, &mut write_half).await? else {
        return Ok(());
    };
    let connected = ctx.tick_loop.lock().await.world_mut().connect(&name, class);
    let id = match connected {
        Ok(id) => id,
        Err(e) => {
            prompt(&mut write_half, &format!("Sorry, {e}.\r\n")).await?;
            return Ok(());
        }
    };

    let (notice_tx, notice_rx) = mpsc::unbounded_channel();
    ctx.notices.lock().await.insert(id, notice_tx.clone());
    let writer = tokio::spawn(write_frames(write_half, id, ctx.clone(), notice_rx));

    let result = read_commands(&mut lines, id, ctx, &notice_tx).await;

    ctx.notices.lock().await.remove(&id);
    ctx.tick_loop.lock().await.world_mut().disconnect(id);
    // The writer drains pending notices, then sees the channel close.
    drop(notice_tx);
    let _ = writer.await;
    result
}

async fn read_commands(
    lines: &mut Lines<BufReader<OwnedReadHalf>>,
    id: SessionId,
    ctx: &ServerContext,
    notices: &NoticeSender,
) -> io::Result<()> {
    // Listing the player last looked at; edits are checked against it.
    let mut listing: Option<InventoryEdit> = None;

    while let Some(line) = lines.next_line().await? {
        let command = match Command::parse(&line) {
            Ok(command) => command,
            Err(e) => {
                let _ = notices.send(format!("{e}\r\n"));
                continue;
            }
        };
        match command {
            Command::Act(intent) => {
                ctx.tick_loop.lock().await.world_mut().enqueue_intent(id, intent);
            }
            Command::Edit(op) => {
                let result = apply_edit(ctx, id, listing.take(), op).await;
                if let Err(e) = result {
                    let text = match e {
                        EditError::Stale => "Your pack has changed. Look again with 'i'.".to_string(),
                        other => format!("You cannot do that: {other}."),
                    };
                    let _ = notices.send(format!("{text}\r\n"));
                }
            }
            Command::ShowInventory => {
                listing = ctx.tick_loop.lock().await.world().open_inventory(id);
                let text = match &listing {
                    Some(edit) => render_inventory(edit),
                    None => "You have nothing while dead.\r\n".to_string(),
                };
                let _ = notices.send(text);
            }
            Command::ShowShop => {
                let offers = {
                    let tick_loop = ctx.tick_loop.lock().await;
                    let world = tick_loop.world();
                    (world.session(id).map(|s| s.depth) == Some(0)).then(|| world.content().shop_offers())
                };
                let text = match offers {
                    Some(offers) => render_shop(&offers),
                    None => "There is no shop here.\r\n".to_string(),
                };
                let _ = notices.send(text);
            }
            Command::Help => {
                let _ = notices.send(format!("{}\r\n", HELP.replace('\n', "\r\n")));
            }
            Command::Quit => {
                let _ = notices.send("Farewell.\r\n".to_string());
                info!(session = %id, "participant quit");
                return Ok(());
            }
        }
    }
    Ok(())
}

/// Commit `op` against the listing the player saw, or a fresh one.
async fn apply_edit(
    ctx: &ServerContext,
    id: SessionId,
    listing: Option<InventoryEdit>,
    op: EditOp,
) -> Result<(), EditError> {
    let mut tick_loop = ctx.tick_loop.lock().await;
    let world = tick_loop.world_mut();
    let mut edit = match listing {
        Some(edit) => edit,
        None => world.open_inventory(id).ok_or(EditError::Stale)?,
    };
    edit.push(op);
    world.commit_inventory(edit).map(|_| ())
}

async fn write_frames(
    mut out: OwnedWriteHalf,
    id: SessionId,
    ctx: Arc<ServerContext>,
    mut notices: mpsc::UnboundedReceiver<String>,
) -> io::Result<()> {
    let mut frames = ctx.frames.clone();
    let (view_w, view_h) = ctx.view;
    loop {
        tokio::select! {
            changed = frames.changed() => {
                if changed.is_err() {
                    break;
                }
                let frame = ctx.tick_loop.lock().await.world().render_snapshot_for(id, view_w, view_h);
                // Gone after quitting; keep draining notices until the reader closes them.
                let Some(frame) = frame else {
                    continue;
                };
                let text = match ctx.format {
                    FrameFormat::Text => format!("{CLEAR}{}", render_text(&frame)),
                    FrameFormat::Json => {
                        let mut line = serde_json::to_string(&frame).map_err(io::Error::other)?;
                        line.push_str("\r\n");
                        line
                    }
                };
                out.write_all(text.as_bytes()).await?;
            }
            notice = notices.recv() => {
                let Some(text) = notice else {
                    break;
                };
                out.write_all(text.as_bytes()).await?;
            }
        }
    }
    out.shutdown().await
}
