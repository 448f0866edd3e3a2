//! Host IPC Protocol
//!
//! Message types and framing for the socket shared with the host process
//! (dock, pasteboard, session activation), and the socket-backed dock bridge.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::host::dock::{
    DockBridge, DockError, DockEvent, DockOrientation, NativeWindowId, NULL_NATIVE_WINDOW_ID,
};
use crate::host::pasteboard::PasteboardContent;
use crate::shared::Rect;

/// Frames larger than this are treated as a corrupt stream
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Default socket path for the host bridge
pub fn default_socket_path() -> PathBuf {
    dirs::runtime_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("rootless-wm-host.sock")
}

// ============================================================================
// WM → Host Commands
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostCommand {
    Minimize { window: NativeWindowId, title: String },
    Restore { window: NativeWindowId },
    Remove { window: NativeWindowId },
    DragBegin { window: NativeWindowId },
    DragEnd { window: NativeWindowId },
    SetPasteboard { content: PasteboardContent },
}

// ============================================================================
// Host → WM Messages
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMessage {
    Dock { event: DockEvent },
    DockGeometry { orientation: DockOrientation, rect: Rect },
    /// The X11 session became (in)active on the host
    Activation { active: bool },
    Pasteboard { content: PasteboardContent },
    HideAll,
    ShowAll,
    ForceQuit { window: NativeWindowId },
}

// ============================================================================
// Message Framing
// ============================================================================

/// Encode with a 4-byte big-endian length prefix
pub fn encode_frame<T: Serialize>(msg: &T) -> Result<Vec<u8>> {
    let data = serde_json::to_vec(msg)?;
    let mut buf = Vec::with_capacity(4 + data.len());
    buf.extend_from_slice(&(data.len() as u32).to_be_bytes());
    buf.extend_from_slice(&data);
    Ok(buf)
}

/// Read one frame body; `None` on a clean end of stream
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    if reader.read_exact(&mut len_buf).await.is_err() {
        return Ok(None);
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        anyhow::bail!("Message too large: {} bytes", len);
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}

// ============================================================================
// Socket-backed dock
// ============================================================================

/// Dock facts cached from host messages so queries never round-trip
#[derive(Debug, Default)]
pub struct DockState {
    pub orientation: DockOrientation,
    pub rect: Rect,
    pub minimized: HashSet<NativeWindowId>,
}

impl DockState {
    fn observe(&mut self, msg: &HostMessage) {
        match msg {
            HostMessage::DockGeometry { orientation, rect } => {
                self.orientation = *orientation;
                self.rect = *rect;
            }
            HostMessage::Dock { event: event @ DockEvent::MinimizeCompleted { success: true, .. } } => {
                self.minimized.extend(event.windows().iter().copied());
            }
            HostMessage::Dock { event: event @ DockEvent::RestoreCompleted { success: true, .. } } => {
                for id in event.windows() {
                    self.minimized.remove(id);
                }
            }
            _ => {}
        }
    }
}

pub struct SocketDock {
    outbox: mpsc::UnboundedSender<HostCommand>,
    state: Arc<Mutex<DockState>>,
}

impl SocketDock {
    fn state(&self) -> MutexGuard<'_, DockState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn submit(&self, window: NativeWindowId, command: HostCommand) -> Result<(), DockError> {
        if window == NULL_NATIVE_WINDOW_ID {
            return Err(DockError::InvalidWindow(window));
        }
        self.outbox.send(command).map_err(|_| DockError::Disconnected)
    }
}

impl DockBridge for SocketDock {
    fn is_available(&self) -> bool {
        !self.outbox.is_closed()
    }

    fn minimize(&self, window: NativeWindowId, title: &str) -> Result<(), DockError> {
        self.submit(window, HostCommand::Minimize { window, title: title.to_string() })
    }

    fn restore(&self, window: NativeWindowId) -> Result<(), DockError> {
        self.submit(window, HostCommand::Restore { window })
    }

    fn remove(&self, window: NativeWindowId) -> Result<(), DockError> {
        self.state().minimized.remove(&window);
        self.submit(window, HostCommand::Remove { window })
    }

    fn drag_begin(&self, window: NativeWindowId) -> Result<(), DockError> {
        self.submit(window, HostCommand::DragBegin { window })
    }

    fn drag_end(&self, window: NativeWindowId) -> Result<(), DockError> {
        self.submit(window, HostCommand::DragEnd { window })
    }

    fn is_window_visible(&self, window: NativeWindowId) -> Result<bool, DockError> {
        if self.outbox.is_closed() {
            return Err(DockError::Disconnected);
        }
        Ok(!self.state().minimized.contains(&window))
    }

    fn orientation(&self) -> DockOrientation {
        self.state().orientation
    }

    fn dock_rect(&self) -> Rect {
        self.state().rect
    }
}

/// Both halves of a live host connection
pub struct HostChannel {
    pub dock: SocketDock,
    pub commands: mpsc::UnboundedSender<HostCommand>,
    pub messages: mpsc::UnboundedReceiver<HostMessage>,
}

/// Spawn the reader and writer tasks for an established stream
pub fn spawn_host_tasks<R, W>(mut reader: R, mut writer: W) -> HostChannel
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let state = Arc::new(Mutex::new(DockState::default()));
    let (message_tx, message_rx) = mpsc::unbounded_channel();
    let (command_tx, mut command_rx) = mpsc::unbounded_channel::<HostCommand>();

    // Reader task (Host → WM)
    let reader_state = state.clone();
    tokio::spawn(async move {
        loop {
            let body = match read_frame(&mut reader).await {
                Ok(Some(body)) => body,
                Ok(None) => {
                    debug!("Host reader task ended");
                    break;
                }
                Err(e) => {
                    warn!("Host stream corrupt: {}", e);
                    break;
                }
            };

            match serde_json::from_slice::<HostMessage>(&body) {
                Ok(msg) => {
                    debug!("Received host message: {:?}", msg);
                    match reader_state.lock() {
                        Ok(mut s) => s.observe(&msg),
                        Err(poisoned) => poisoned.into_inner().observe(&msg),
                    }
                    if message_tx.send(msg).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Failed to decode host message: {}", e);
                }
            }
        }
    });

    // Writer task (WM → Host)
    tokio::spawn(async move {
        while let Some(command) = command_rx.recv().await {
            let frame = match encode_frame(&command) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("Failed to encode host command: {}", e);
                    continue;
                }
            };
            if let Err(e) = writer.write_all(&frame).await {
                warn!("Host writer task ended: {}", e);
                break;
            }
        }
    });

    HostChannel {
        dock: SocketDock { outbox: command_tx.clone(), state },
        commands: command_tx,
        messages: message_rx,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dock_events_arrive_and_update_cache() {
        let (ours, theirs) = tokio::net::UnixStream::pair().unwrap();
        let (read_half, write_half) = ours.into_split();
        let mut channel = spawn_host_tasks(read_half, write_half);
        let (mut host_read, mut host_write) = theirs.into_split();

        let geometry = HostMessage::DockGeometry {
            orientation: DockOrientation::Left,
            rect: Rect::new(0, 0, 64, 900),
        };
        let minimized = HostMessage::Dock {
            event: DockEvent::MinimizeCompleted { windows: vec![42, 0], success: true },
        };
        host_write.write_all(&encode_frame(&geometry).unwrap()).await.unwrap();
        host_write.write_all(&encode_frame(&minimized).unwrap()).await.unwrap();

        assert_eq!(channel.messages.recv().await, Some(geometry));
        assert_eq!(channel.messages.recv().await, Some(minimized));

        assert_eq!(channel.dock.orientation(), DockOrientation::Left);
        assert_eq!(channel.dock.dock_rect(), Rect::new(0, 0, 64, 900));
        assert!(!channel.dock.is_window_visible(42).unwrap());
        assert!(channel.dock.is_window_visible(43).unwrap());

        channel.dock.restore(42).unwrap();
        let body = read_frame(&mut host_read).await.unwrap().unwrap();
        let command: HostCommand = serde_json::from_slice(&body).unwrap();
        assert_eq!(command, HostCommand::Restore { window: 42 });
    }

    #[tokio::test]
    async fn test_oversized_frame_is_rejected() {
        let (mut a, mut b) = tokio::net::UnixStream::pair().unwrap();
        a.write_all(&((MAX_FRAME_LEN as u32) + 1).to_be_bytes()).await.unwrap();
        assert!(read_frame(&mut b).await.is_err());
    }

    #[test]
    fn test_null_window_is_rejected_synchronously() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let dock = SocketDock { outbox: tx, state: Arc::default() };
        assert!(matches!(dock.minimize(0, "x"), Err(DockError::InvalidWindow(0))));
    }
}
