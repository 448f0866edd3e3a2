//! Typed failure classes
//!
//! Everything fallible returns `anyhow::Result`; these are the failures a
//! caller may want to tell apart (tests downcast to them).

use thiserror::Error;
use x11rb::protocol::xproto::Window;

use crate::host::dock::DockError;

#[derive(Debug, Error)]
pub enum WmError {
    #[error("window 0x{0:x} is not managed")]
    UnknownWindow(Window),

    #[error("window 0x{0:x} has no native window id")]
    NoNativeId(Window),

    #[error("window 0x{0:x} is closing")]
    Closing(Window),

    #[error("dock refused request for window 0x{window:x}: {source}")]
    DockRejected {
        window: Window,
        #[source]
        source: DockError,
    },

    #[error("dock reported minimize failure for window 0x{0:x}")]
    MinimizeFailed(Window),

    #[error("dock reported restore failure for window 0x{0:x}")]
    RestoreFailed(Window),
}
