//! rootless-wm
//!
//! An X11 window manager for a rootless X server living inside a host
//! desktop: client windows are framed and managed here, while minimizing
//! goes through the host dock and the CLIPBOARD selection is proxied to the
//! host pasteboard.

mod config;
mod error;
mod host;
mod shared;
mod wm;
mod x11_async;

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::host::ipc::HostMessage;
use crate::wm::WindowManager;
use crate::wm::atoms::Atoms;
use crate::wm::xconn::X11Conn;
use crate::x11_async::X11EventStream;

/// Command line options
struct Args {
    replace: bool,
    config: Option<PathBuf>,
}

impl Args {
    fn parse() -> Result<Self> {
        let mut args = Args { replace: false, config: None };
        let mut iter = std::env::args().skip(1);
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--replace" | "-r" => args.replace = true,
                "--config" => {
                    let path = iter.next().context("--config needs a path")?;
                    args.config = Some(PathBuf::from(path));
                }
                other => warn!("Ignoring unknown argument {:?}", other),
            }
        }
        Ok(args)
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<config::Config> {
    match path {
        Some(path) => config::Config::load_from(path),
        None => config::Config::load(),
    }
}

async fn next_host_message(events: &mut Option<mpsc::UnboundedReceiver<HostMessage>>) -> Option<HostMessage> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Dispatch loop: X events and host messages, one at a time
async fn run(args: Args, mut shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
    let config = load_config(args.config.as_ref()).context("Failed to load configuration")?;

    let conn = X11Conn::connect().context("Failed to connect to X server")?;
    let check_window = conn.become_wm(args.replace)?;
    let heads = conn.query_heads()?;
    let atoms = Atoms::new(conn.connection().as_ref()).context("Failed to intern atoms")?;
    let stream = X11EventStream::new(conn.connection())
        .context("Failed to initialize X11 event stream")?;

    let host = host::connect(&config.dock).await;
    let mut host_events = host.events;

    let mut wm = WindowManager::new(conn, atoms, config, heads, host.dock, host.pasteboard, check_window)?;
    wm.scan_existing()?;

    let mut quit_check = tokio::time::interval(Duration::from_secs(1));
    quit_check.tick().await;

    info!("Starting main event loop");
    loop {
        for event in stream.drain().context("X11 connection lost")? {
            if let Err(e) = wm.handle_event(event) {
                warn!("Event handler failed: {:#}", e);
            }
        }
        if let Err(e) = stream.flush() {
            error!("Failed to flush X11 requests: {}", e);
            break;
        }
        if wm.should_quit(Instant::now()) {
            info!("No windows left, quitting");
            break;
        }

        let mut host_closed = false;
        tokio::select! {
            () = stream.readable() => {}
            message = next_host_message(&mut host_events) => match message {
                Some(message) => {
                    if let Err(e) = wm.handle_host_message(message) {
                        warn!("Host message handler failed: {:#}", e);
                    }
                }
                None => host_closed = true,
            },
            _ = quit_check.tick() => {}
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received, cleaning up...");
                break;
            }
        }
        if host_closed {
            warn!("Host connection closed, continuing without dock integration");
            host_events = None;
        }
    }

    wm.teardown()
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "rootless_wm=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting rootless-wm");

    let args = Args::parse()?;
    if args.replace {
        info!("--replace flag detected: will attempt to replace existing WM");
    }

    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully"),
                _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully"),
            }
            let _ = shutdown_tx.send(()).await;
        });
    }

    if let Err(e) = run(args, shutdown_rx).await {
        error!("Fatal: {:#}", e);
        return Err(e);
    }
    debug!("Clean exit");
    Ok(())
}
