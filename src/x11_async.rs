//! X11 Async Event Stream
//!
//! A mio poller on a blocking thread watches the X socket and wakes the
//! dispatch loop through a [`Notify`]; the loop then drains every queued
//! event without blocking.

use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{Notify, oneshot};
use x11rb::connection::Connection;
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;

const X_SOCKET: mio::Token = mio::Token(0);
/// How often the poller notices the stream was dropped
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// X11 event stream with readiness notification
pub struct X11EventStream {
    conn: Arc<RustConnection>,
    notify: Arc<Notify>,
    /// Dropping this stops the poller thread
    _task_guard: oneshot::Receiver<()>,
}

impl X11EventStream {
    /// Register the X socket with mio and start the poller thread
    pub fn new(conn: Arc<RustConnection>) -> Result<Self> {
        let (notify, task_guard) = spawn_poller(conn.stream().as_raw_fd())?;
        Ok(Self {
            conn,
            notify,
            _task_guard: task_guard,
        })
    }

    /// Wait until the X socket is readable
    pub async fn readable(&self) {
        self.notify.notified().await;
    }

    /// Every event already read or readable without blocking, in arrival order
    pub fn drain(&self) -> Result<Vec<Event>> {
        let mut events = Vec::new();
        while let Some(event) = self.conn.poll_for_event()? {
            events.push(event);
        }
        Ok(events)
    }

    /// Flush queued requests to the server
    pub fn flush(&self) -> Result<()> {
        self.conn.flush()?;
        Ok(())
    }
}

/// Watch `fd` on a blocking thread; the thread exits once the returned
/// receiver is dropped.
fn spawn_poller(fd: RawFd) -> Result<(Arc<Notify>, oneshot::Receiver<()>)> {
    let mut poll = mio::Poll::new().context("Failed to create mio Poll")?;
    poll.registry()
        .register(&mut mio::unix::SourceFd(&fd), X_SOCKET, mio::Interest::READABLE)
        .context("Failed to register X11 FD with mio")?;

    let notify = Arc::new(Notify::new());
    let (guard, task_guard) = oneshot::channel::<()>();
    let wake = notify.clone();
    tokio::task::spawn_blocking(move || {
        let mut events = mio::Events::with_capacity(1);
        while !guard.is_closed() {
            match poll.poll(&mut events, Some(POLL_INTERVAL)) {
                Ok(()) if !events.is_empty() => wake.notify_one(),
                Ok(()) => {}
                Err(err) => tracing::warn!("X11 socket poll failed: {:?}", err),
            }
        }
        tracing::debug!("X11 socket poller stopped");
    });
    Ok((notify, task_guard))
}
