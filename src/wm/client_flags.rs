//! Client Flags
//!
//! Bitfield flags for window state, ICCCM protocols and frame attributes.

use bitflags::bitflags;
use x11rb::protocol::xproto::Atom;

use crate::wm::atoms::Atoms;

bitflags! {
    /// Orthogonal lifecycle axes of a managed window
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WindowFlags: u32 {
        const MAPPED        = 1 << 0;
        const SHADED        = 1 << 1;
        const MINIMIZED     = 1 << 2;
        /// Unmapped by a host hide-all, not minimized
        const HIDDEN        = 1 << 3;
        const FULLSCREEN    = 1 << 4;
        const FOCUSED       = 1 << 5;
        const REPARENTED    = 1 << 6;
        /// Terminal: the client was killed and its destruction is awaited
        const CLOSING       = 1 << 7;
        const MODAL         = 1 << 8;
        const SHAPED        = 1 << 9;
        const SHAPED_EMPTY  = 1 << 10;
        const URGENT        = 1 << 11;
    }
}

impl WindowFlags {
    /// Flags describing on-screen visibility
    pub fn visibility() -> Self {
        Self::MAPPED | Self::MINIMIZED | Self::HIDDEN
    }
}

bitflags! {
    /// WM_PROTOCOLS advertised by the client
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WmProtocols: u32 {
        const DELETE_WINDOW = 1 << 0;
        const TAKE_FOCUS    = 1 << 1;
    }
}

impl WmProtocols {
    pub fn from_atoms(list: impl IntoIterator<Item = Atom>, atoms: &Atoms) -> Self {
        let mut protocols = Self::empty();
        for atom in list {
            if atom == atoms.wm_delete_window {
                protocols.insert(Self::DELETE_WINDOW);
            } else if atom == atoms.wm_take_focus {
                protocols.insert(Self::TAKE_FOCUS);
            }
        }
        protocols
    }
}

bitflags! {
    /// Decoration attributes fed to the frame engine
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FrameAttr: u32 {
        const ACTIVE           = 1 << 0;
        const URGENT           = 1 << 1;
        const TITLE            = 1 << 2;
        /// Pointer is over the button cluster
        const PRELIGHT         = 1 << 3;
        const SHADED           = 1 << 4;
        const CLOSE_BOX        = 1 << 5;
        const COLLAPSE_BOX     = 1 << 6;
        const ZOOM_BOX         = 1 << 7;
        const GROW_BOX         = 1 << 8;
        const CLOSE_CLICKED    = 1 << 9;
        const COLLAPSE_CLICKED = 1 << 10;
        const ZOOM_CLICKED     = 1 << 11;
    }
}

impl FrameAttr {
    pub fn clicked() -> Self {
        Self::CLOSE_CLICKED | Self::COLLAPSE_CLICKED | Self::ZOOM_CLICKED
    }
}

/// Window type (EWMH _NET_WM_WINDOW_TYPE)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowType {
    #[default]
    Normal,
    Dialog,
    Utility,
    Toolbar,
    Splash,
    Menu,
    Tooltip,
    Notification,
    Dock,
    Desktop,
}

impl WindowType {
    pub fn from_atom(atom: Atom, atoms: &Atoms) -> Self {
        if atom == atoms.net_wm_window_type_dialog {
            Self::Dialog
        } else if atom == atoms.net_wm_window_type_utility {
            Self::Utility
        } else if atom == atoms.net_wm_window_type_toolbar {
            Self::Toolbar
        } else if atom == atoms.net_wm_window_type_splash {
            Self::Splash
        } else if atom == atoms.net_wm_window_type_menu
            || atom == atoms.net_wm_window_type_dropdown_menu
            || atom == atoms.net_wm_window_type_popup_menu
        {
            Self::Menu
        } else if atom == atoms.net_wm_window_type_tooltip {
            Self::Tooltip
        } else if atom == atoms.net_wm_window_type_notification {
            Self::Notification
        } else if atom == atoms.net_wm_window_type_dock {
            Self::Dock
        } else if atom == atoms.net_wm_window_type_desktop {
            Self::Desktop
        } else {
            Self::Normal
        }
    }

    /// Types that get a titlebar
    pub fn is_decorated(self) -> bool {
        matches!(self, Self::Normal | Self::Dialog | Self::Utility | Self::Toolbar)
    }

    pub fn uses_small_decor(self) -> bool {
        matches!(self, Self::Utility | Self::Toolbar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wm::testing::test_atoms;

    #[test]
    fn test_protocols_from_atoms() {
        let atoms = test_atoms();
        let p = WmProtocols::from_atoms([atoms.wm_take_focus, 9999], &atoms);
        assert_eq!(p, WmProtocols::TAKE_FOCUS);
    }

    #[test]
    fn test_window_type_decoration() {
        let atoms = test_atoms();
        assert_eq!(
            WindowType::from_atom(atoms.net_wm_window_type_popup_menu, &atoms),
            WindowType::Menu
        );
        assert!(!WindowType::Menu.is_decorated());
        assert!(WindowType::Utility.uses_small_decor());
    }
}
