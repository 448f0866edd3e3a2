//! Pasteboard boundary
//!
//! The host pasteboard as seen from the window manager: a typed content
//! snapshot plus a change counter that only ever grows. Local writes are
//! forwarded to the host when a transport is attached; host-originated
//! updates are mirrored in without being echoed back.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::host::ipc::HostCommand;

/// Representations the proxy knows how to serve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    PlainText,
    RichText,
}

/// One pasteboard generation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasteboardContent {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub rich_text: Option<String>,
}

impl PasteboardContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: Some(text.into()), rich_text: None }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.rich_text.is_none()
    }
}

#[derive(Debug, Default)]
pub struct Pasteboard {
    content: PasteboardContent,
    change_count: u64,
    outbox: Option<mpsc::UnboundedSender<HostCommand>>,
}

impl Pasteboard {
    /// Pasteboard with no host behind it
    pub fn local() -> Self {
        Self::default()
    }

    pub fn with_host(outbox: mpsc::UnboundedSender<HostCommand>) -> Self {
        Self { outbox: Some(outbox), ..Self::default() }
    }

    pub fn change_count(&self) -> u64 {
        self.change_count
    }

    pub fn has_content(&self) -> bool {
        !self.content.is_empty()
    }

    pub fn read(&self, kind: ContentKind) -> Option<Vec<u8>> {
        let value = match kind {
            ContentKind::PlainText => self.content.text.as_ref(),
            ContentKind::RichText => self.content.rich_text.as_ref(),
        };
        value.map(|s| s.as_bytes().to_vec())
    }

    /// Replace the content from the X side; returns the new change count.
    pub fn declare(&mut self, content: PasteboardContent) -> u64 {
        self.content = content;
        self.change_count += 1;

        if let Some(outbox) = &self.outbox {
            let command = HostCommand::SetPasteboard { content: self.content.clone() };
            if outbox.send(command).is_err() {
                warn!("Host transport closed, pasteboard change stays local");
                self.outbox = None;
            }
        }

        debug!("Pasteboard declared, change count {}", self.change_count);
        self.change_count
    }

    /// Apply content that originated on the host.
    pub fn mirror_host(&mut self, content: PasteboardContent) -> u64 {
        self.content = content;
        self.change_count += 1;
        self.change_count
    }
}
