//! Focus Module
//!
//! The active-window pointer, focus history and focus policy. Raising is the
//! registry's business; focusing only moves the pointer, toggles the frames'
//! active state and publishes `_NET_ACTIVE_WINDOW`.

use anyhow::Result;
use std::collections::VecDeque;
use tracing::debug;
use x11rb::NONE;
use x11rb::protocol::xproto::{AtomEnum, Timestamp, Window};

use crate::config::FocusConfig;
use crate::error::WmError;
use crate::wm::screen::Screen;
use crate::wm::window::WindowEnv;
use crate::wm::xconn::{PropertyData, Request};

/// Focus policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPolicy {
    /// Click to focus
    ClickToFocus,
    /// Focus follows mouse
    FocusFollowsMouse,
}

/// Focus manager
pub struct FocusManager {
    /// Currently focused window
    pub focused_window: Option<Window>,

    /// Most recent first
    pub focus_history: VecDeque<Window>,

    pub max_history_size: usize,

    pub focus_policy: FocusPolicy,

    /// Focus new windows when they map
    pub focus_new: bool,

    /// Last user interaction time
    pub last_user_time: Timestamp,
}

impl FocusManager {
    pub fn new(config: &FocusConfig) -> Self {
        Self {
            focused_window: None,
            focus_history: VecDeque::new(),
            max_history_size: 20,
            focus_policy: if config.follows_mouse {
                FocusPolicy::FocusFollowsMouse
            } else {
                FocusPolicy::ClickToFocus
            },
            focus_new: config.focus_on_new_window,
            last_user_time: 0,
        }
    }

    /// Give focus to `id`. Returns false when the window declined it.
    pub fn set_focus(
        &mut self,
        env: &WindowEnv,
        screen: &mut Screen,
        id: Window,
        timestamp: Timestamp,
        force: bool,
    ) -> Result<bool> {
        let window = screen.get_mut(id).ok_or(WmError::UnknownWindow(id))?;
        if window.is_closing() {
            return Err(WmError::Closing(id).into());
        }
        if !window.accept_focus(env, timestamp, force)? {
            debug!("Window 0x{:x} declined focus", id);
            return Ok(false);
        }

        if let Some(old) = self.focused_window.filter(|&old| old != id) {
            if let Some(old_window) = screen.get_mut(old) {
                old_window.x_focus_out(env)?;
            }
        }
        if let Some(window) = screen.get_mut(id) {
            window.x_focus_in(env)?;
        }

        self.focus_history.retain(|&w| w != id);
        self.focus_history.push_front(id);
        self.focus_history.truncate(self.max_history_size);

        if self.focused_window != Some(id) {
            self.focused_window = Some(id);
            self.update_active_window(env, Some(id))?;
            debug!("Set focus on window 0x{:x}", id);
        }
        Ok(true)
    }

    /// Window is going away
    pub fn forget(&mut self, id: Window) {
        self.focus_history.retain(|&w| w != id);
        if self.focused_window == Some(id) {
            self.focused_window = None;
        }
    }

    /// Focus the most recently focused window still able to take it, else
    /// the topmost one; the root gets focus when nothing qualifies.
    pub fn focus_next(
        &mut self,
        env: &WindowEnv,
        screen: &mut Screen,
        except: Option<Window>,
        timestamp: Timestamp,
    ) -> Result<()> {
        let from_history = self
            .focus_history
            .iter()
            .copied()
            .filter(|&w| Some(w) != except)
            .find(|&w| screen.get(w).is_some_and(|w| w.is_focusable()));
        let candidate = from_history.or_else(|| screen.topmost_focusable(except));

        if let Some(id) = candidate {
            if self.set_focus(env, screen, id, timestamp, false)? {
                return Ok(());
            }
        }

        if let Some(old) = self.focused_window.take() {
            if let Some(window) = screen.get_mut(old) {
                window.x_focus_out(env)?;
            }
        }
        env.conn.send(Request::SetInputFocus { window: env.conn.root(), time: timestamp })?;
        self.update_active_window(env, None)
    }

    pub fn update_active_window(&self, env: &WindowEnv, window: Option<Window>) -> Result<()> {
        env.conn.send(Request::ChangeProperty {
            window: env.conn.root(),
            property: env.atoms.net_active_window,
            type_: AtomEnum::WINDOW.into(),
            data: PropertyData::Card32(vec![window.unwrap_or(NONE)]),
        })
    }

    /// Update last user interaction time
    pub fn update_user_time(&mut self, time: Timestamp) {
        if time != 0 {
            self.last_user_time = time;
        }
    }
}
