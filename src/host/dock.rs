//! Dock lifecycle bridge
//!
//! Fire-and-forget minimize/restore/remove/drag requests to the host dock and
//! the asynchronous events it sends back. Requests only report whether they
//! were accepted; completion arrives later as a [`DockEvent`] carrying native
//! window ids, which the window manager resolves through its registry.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::Rect;

/// Host compositor's identifier for a window
pub type NativeWindowId = u32;

/// Terminator of native id lists on the wire
pub const NULL_NATIVE_WINDOW_ID: NativeWindowId = 0;

/// Dock location
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DockOrientation {
    #[default]
    Bottom = 2,
    Left = 3,
    Right = 4,
}

/// Events delivered by the dock, out of band from X11 events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DockEvent {
    /// User asked for every minimized window back
    RestoreAllWindows,
    /// Restore these windows (all managed windows when empty)
    RestoreWindows { windows: Vec<NativeWindowId> },
    /// Bring these windows forward (all managed windows when empty)
    SelectWindows { windows: Vec<NativeWindowId> },
    RestoreCompleted { windows: Vec<NativeWindowId>, success: bool },
    MinimizeCompleted { windows: Vec<NativeWindowId>, success: bool },
}

impl DockEvent {
    /// Affected windows, cut at the first null id
    pub fn windows(&self) -> &[NativeWindowId] {
        let list: &[NativeWindowId] = match self {
            DockEvent::RestoreAllWindows => &[],
            DockEvent::RestoreWindows { windows }
            | DockEvent::SelectWindows { windows }
            | DockEvent::RestoreCompleted { windows, .. }
            | DockEvent::MinimizeCompleted { windows, .. } => windows,
        };
        let end = list
            .iter()
            .position(|&id| id == NULL_NATIVE_WINDOW_ID)
            .unwrap_or(list.len());
        &list[..end]
    }
}

#[derive(Debug, Error)]
pub enum DockError {
    #[error("dock integration is unavailable")]
    Unavailable,

    #[error("dock rejected native window id {0}")]
    InvalidWindow(NativeWindowId),

    #[error("dock transport closed")]
    Disconnected,
}

/// The dock bridge ABI
pub trait DockBridge {
    fn is_available(&self) -> bool;

    fn minimize(&self, window: NativeWindowId, title: &str) -> Result<(), DockError>;
    fn restore(&self, window: NativeWindowId) -> Result<(), DockError>;
    fn remove(&self, window: NativeWindowId) -> Result<(), DockError>;
    fn drag_begin(&self, window: NativeWindowId) -> Result<(), DockError>;
    fn drag_end(&self, window: NativeWindowId) -> Result<(), DockError>;

    fn is_window_visible(&self, window: NativeWindowId) -> Result<bool, DockError>;
    fn orientation(&self) -> DockOrientation;
    fn dock_rect(&self) -> Rect;
}

/// Stand-in used when the host dock cannot be reached
#[derive(Debug, Default)]
pub struct NullDock;

impl DockBridge for NullDock {
    fn is_available(&self) -> bool {
        false
    }

    fn minimize(&self, _window: NativeWindowId, _title: &str) -> Result<(), DockError> {
        Err(DockError::Unavailable)
    }

    fn restore(&self, _window: NativeWindowId) -> Result<(), DockError> {
        Err(DockError::Unavailable)
    }

    fn remove(&self, _window: NativeWindowId) -> Result<(), DockError> {
        Err(DockError::Unavailable)
    }

    fn drag_begin(&self, _window: NativeWindowId) -> Result<(), DockError> {
        Err(DockError::Unavailable)
    }

    fn drag_end(&self, _window: NativeWindowId) -> Result<(), DockError> {
        Err(DockError::Unavailable)
    }

    fn is_window_visible(&self, _window: NativeWindowId) -> Result<bool, DockError> {
        Err(DockError::Unavailable)
    }

    fn orientation(&self) -> DockOrientation {
        DockOrientation::Bottom
    }

    fn dock_rect(&self) -> Rect {
        Rect::EMPTY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_list_stops_at_null_id() {
        let event = DockEvent::MinimizeCompleted {
            windows: vec![7, 9, NULL_NATIVE_WINDOW_ID, 11],
            success: true,
        };
        assert_eq!(event.windows(), &[7, 9]);
    }

    #[test]
    fn test_null_dock_rejects_everything() {
        let dock = NullDock;
        assert!(!dock.is_available());
        assert!(matches!(dock.minimize(1, "xterm"), Err(DockError::Unavailable)));
        assert!(dock.dock_rect().is_empty());
    }
}
