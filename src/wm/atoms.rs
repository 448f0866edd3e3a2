//! Interned atoms
//!
//! ICCCM, EWMH and selection atoms used by the window manager, interned in
//! one pipelined batch at startup.

use anyhow::Result;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{Atom, ConnectionExt as _};

macro_rules! atoms {
    ($($field:ident => $name:expr,)*) => {
        /// Holds all interned atoms
        #[derive(Debug, Clone, Copy)]
        pub struct Atoms {
            $(pub $field: Atom,)*
        }

        impl Atoms {
            /// Atom names in interning order
            pub const NAMES: &'static [&'static str] = &[$($name,)*];

            /// Build the table, asking `intern` for each name in [`Atoms::NAMES`] order
            pub fn intern_with<F>(mut intern: F) -> Result<Self>
            where
                F: FnMut(&str) -> Result<Atom>,
            {
                Ok(Self {
                    $($field: intern($name)?,)*
                })
            }
        }
    };
}

atoms! {
    // ICCCM
    wm_protocols => "WM_PROTOCOLS",
    wm_delete_window => "WM_DELETE_WINDOW",
    wm_take_focus => "WM_TAKE_FOCUS",
    wm_state => "WM_STATE",
    wm_change_state => "WM_CHANGE_STATE",
    wm_name => "WM_NAME",
    wm_normal_hints => "WM_NORMAL_HINTS",
    wm_hints => "WM_HINTS",
    wm_transient_for => "WM_TRANSIENT_FOR",
    utf8_string => "UTF8_STRING",
    motif_wm_hints => "_MOTIF_WM_HINTS",

    // EWMH root properties
    net_supported => "_NET_SUPPORTED",
    net_supporting_wm_check => "_NET_SUPPORTING_WM_CHECK",
    net_client_list => "_NET_CLIENT_LIST",
    net_client_list_stacking => "_NET_CLIENT_LIST_STACKING",
    net_active_window => "_NET_ACTIVE_WINDOW",
    net_close_window => "_NET_CLOSE_WINDOW",

    // EWMH window properties
    net_wm_name => "_NET_WM_NAME",
    net_frame_extents => "_NET_FRAME_EXTENTS",
    net_wm_state => "_NET_WM_STATE",
    net_wm_state_fullscreen => "_NET_WM_STATE_FULLSCREEN",
    net_wm_state_shaded => "_NET_WM_STATE_SHADED",
    net_wm_state_hidden => "_NET_WM_STATE_HIDDEN",
    net_wm_state_maximized_vert => "_NET_WM_STATE_MAXIMIZED_VERT",
    net_wm_state_maximized_horz => "_NET_WM_STATE_MAXIMIZED_HORZ",
    net_wm_state_modal => "_NET_WM_STATE_MODAL",
    net_wm_state_demands_attention => "_NET_WM_STATE_DEMANDS_ATTENTION",
    net_wm_allowed_actions => "_NET_WM_ALLOWED_ACTIONS",
    net_wm_action_move => "_NET_WM_ACTION_MOVE",
    net_wm_action_resize => "_NET_WM_ACTION_RESIZE",
    net_wm_action_minimize => "_NET_WM_ACTION_MINIMIZE",
    net_wm_action_shade => "_NET_WM_ACTION_SHADE",
    net_wm_action_maximize_horz => "_NET_WM_ACTION_MAXIMIZE_HORZ",
    net_wm_action_maximize_vert => "_NET_WM_ACTION_MAXIMIZE_VERT",
    net_wm_action_fullscreen => "_NET_WM_ACTION_FULLSCREEN",
    net_wm_action_close => "_NET_WM_ACTION_CLOSE",
    net_wm_window_type => "_NET_WM_WINDOW_TYPE",
    net_wm_window_type_normal => "_NET_WM_WINDOW_TYPE_NORMAL",
    net_wm_window_type_dialog => "_NET_WM_WINDOW_TYPE_DIALOG",
    net_wm_window_type_utility => "_NET_WM_WINDOW_TYPE_UTILITY",
    net_wm_window_type_toolbar => "_NET_WM_WINDOW_TYPE_TOOLBAR",
    net_wm_window_type_splash => "_NET_WM_WINDOW_TYPE_SPLASH",
    net_wm_window_type_menu => "_NET_WM_WINDOW_TYPE_MENU",
    net_wm_window_type_dropdown_menu => "_NET_WM_WINDOW_TYPE_DROPDOWN_MENU",
    net_wm_window_type_popup_menu => "_NET_WM_WINDOW_TYPE_POPUP_MENU",
    net_wm_window_type_tooltip => "_NET_WM_WINDOW_TYPE_TOOLTIP",
    net_wm_window_type_notification => "_NET_WM_WINDOW_TYPE_NOTIFICATION",
    net_wm_window_type_dock => "_NET_WM_WINDOW_TYPE_DOCK",
    net_wm_window_type_desktop => "_NET_WM_WINDOW_TYPE_DESKTOP",

    // Host integration
    native_window_id => "_NATIVE_WINDOW_ID",

    // Selections
    clipboard => "CLIPBOARD",
    targets => "TARGETS",
    timestamp => "TIMESTAMP",
    text => "TEXT",
    text_plain_utf8 => "text/plain;charset=utf-8",
    text_rtf => "text/rtf",
    incr => "INCR",
    selection_property => "_ROOTLESS_SELECTION",
}

impl Atoms {
    /// Intern all required atoms
    pub fn new<C: Connection>(conn: &C) -> Result<Self> {
        let cookies = Self::NAMES
            .iter()
            .map(|name| conn.intern_atom(false, name.as_bytes()))
            .collect::<Result<Vec<_>, _>>()?;
        let mut replies = cookies.into_iter();

        Self::intern_with(|name| match replies.next() {
            Some(cookie) => Ok(cookie.reply()?.atom),
            None => anyhow::bail!("No intern_atom reply for {}", name),
        })
    }

    /// Contents of _NET_SUPPORTED
    pub fn supported(&self) -> Vec<Atom> {
        vec![
            self.net_supported,
            self.net_supporting_wm_check,
            self.net_client_list,
            self.net_client_list_stacking,
            self.net_active_window,
            self.net_close_window,
            self.net_wm_name,
            self.net_frame_extents,
            self.net_wm_state,
            self.net_wm_state_fullscreen,
            self.net_wm_state_shaded,
            self.net_wm_state_hidden,
            self.net_wm_state_maximized_vert,
            self.net_wm_state_maximized_horz,
            self.net_wm_state_modal,
            self.net_wm_state_demands_attention,
            self.net_wm_allowed_actions,
            self.net_wm_window_type,
        ]
    }
}
