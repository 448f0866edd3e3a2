//! Host desktop integration
//!
//! The dock, the pasteboard and session activation all live in a separate
//! host process reached over a Unix socket. When that process is missing the
//! window manager keeps running without dock integration.

pub mod dock;
pub mod ipc;
pub mod pasteboard;

use anyhow::{Context, Result};
use std::path::Path;
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::DockConfig;
use dock::{DockBridge, NullDock};
use ipc::HostMessage;
use pasteboard::Pasteboard;

/// Everything the dispatcher needs from the host side
pub struct HostBridge {
    pub dock: Box<dyn DockBridge>,
    pub pasteboard: Pasteboard,
    /// `None` when running without a host process
    pub events: Option<mpsc::UnboundedReceiver<HostMessage>>,
}

impl HostBridge {
    /// No dock, local-only pasteboard
    pub fn detached() -> Self {
        Self {
            dock: Box::new(NullDock),
            pasteboard: Pasteboard::local(),
            events: None,
        }
    }

    pub fn from_stream(stream: UnixStream) -> Self {
        let (reader, writer) = stream.into_split();
        let channel = ipc::spawn_host_tasks(reader, writer);
        Self {
            dock: Box::new(channel.dock),
            pasteboard: Pasteboard::with_host(channel.commands),
            events: Some(channel.messages),
        }
    }
}

async fn open(path: &Path) -> Result<UnixStream> {
    UnixStream::connect(path)
        .await
        .with_context(|| format!("Failed to connect to host socket {:?}", path))
}

/// Connect to the host process, degrading to [`HostBridge::detached`]
pub async fn connect(config: &DockConfig) -> HostBridge {
    if !config.enabled {
        info!("Dock integration disabled by configuration");
        return HostBridge::detached();
    }

    let path = config.socket_path.clone().unwrap_or_else(ipc::default_socket_path);
    match open(&path).await {
        Ok(stream) => {
            info!("Connected to host at {:?}", path);
            HostBridge::from_stream(stream)
        }
        Err(e) => {
            warn!("Host integration unavailable: {:#}", e);
            HostBridge::detached()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_missing_socket_degrades_to_detached() {
        let config = DockConfig {
            enabled: true,
            socket_path: Some(PathBuf::from("/nonexistent/rootless-wm-test.sock")),
        };
        let bridge = connect(&config).await;
        assert!(!bridge.dock.is_available());
        assert!(bridge.events.is_none());
    }

    #[tokio::test]
    async fn test_bridge_over_stream_is_available() {
        let (ours, _theirs) = UnixStream::pair().unwrap();
        let bridge = HostBridge::from_stream(ours);
        assert!(bridge.dock.is_available());
        assert!(bridge.events.is_some());
    }
}
