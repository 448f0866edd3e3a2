//! Managed windows
//!
//! One [`ManagedWindow`] per top-level client. Geometry changes go through a
//! two-slot reconciliation: at most one configure request is outstanding
//! (`pending_frame`), and anything requested meanwhile overwrites a single
//! `queued_frame` that is sent when the server confirms the pending one.
//! Minimize and restore are split the same way: the dock is asked, and the
//! transition only completes when its completion event comes back.

use anyhow::Result;
use tracing::{debug, trace, warn};
use x11rb::NONE;
use x11rb::protocol::xproto::{Atom, AtomEnum, EventMask, Timestamp, Window};

use crate::config::Config;
use crate::error::WmError;
use crate::host::dock::{DockBridge, NativeWindowId};
use crate::shared::{Point, Rect, Size};
use crate::wm::atoms::Atoms;
use crate::wm::client_flags::{FrameAttr, WindowFlags, WindowType, WmProtocols};
use crate::wm::frame::{self, DecorClass, FrameGeometry, FrameWindows, HitRegion};
use crate::wm::hints::{HintsManager, SizeConstraints, SizeHints, WmHints};
use crate::wm::screen::Heads;
use crate::wm::xconn::{PropertyData, Request, XConn};

// WM_STATE values
pub const WITHDRAWN_STATE: u32 = 0;
pub const NORMAL_STATE: u32 = 1;
pub const ICONIC_STATE: u32 = 3;

// _NET_WM_STATE actions
pub const NET_WM_STATE_REMOVE: u32 = 0;
pub const NET_WM_STATE_ADD: u32 = 1;
pub const NET_WM_STATE_TOGGLE: u32 = 2;

/// Collaborators a window needs while handling one event
pub struct WindowEnv<'a> {
    pub conn: &'a dyn XConn,
    pub atoms: &'a Atoms,
    pub config: &'a Config,
    pub heads: &'a Heads,
    pub dock: &'a dyn DockBridge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DockOpKind {
    Minimize,
    Restore,
}

/// Dock request awaiting its completion event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DockOp {
    pub kind: DockOpKind,
    /// Visibility flags before the optimistic change
    prior: WindowFlags,
}

/// What a property change means beyond the window itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyChange {
    None,
    TransientFor(Option<Window>),
}

#[derive(Debug)]
pub struct ManagedWindow {
    pub id: Window,
    pub frames: Option<FrameWindows>,

    pub transient_for: Option<Window>,
    pub transients: Vec<Window>,

    /// Last frame known to be in effect on screen
    pub current_frame: Rect,
    /// Sent to the server, not yet confirmed
    pub pending_frame: Option<Rect>,
    /// Requested while `pending_frame` was outstanding
    pub queued_frame: Option<Rect>,
    pub unzoomed_frame: Option<Rect>,
    /// Frame to return to when leaving fullscreen
    pub restore_frame: Option<Rect>,
    /// Frame height when not shaded
    pub frame_height: i32,

    pub flags: WindowFlags,
    pub protocols: WmProtocols,
    pub size_hints: Option<SizeHints>,
    pub wm_hints: Option<WmHints>,
    pub window_type: WindowType,
    pub decor: DecorClass,
    pub attrs: FrameAttr,
    pub title: String,

    pub native_id: Option<NativeWindowId>,
    pub dock_op: Option<DockOp>,
    /// Unmap notifications caused by our own reparenting
    pub ignore_unmaps: u32,
}

impl ManagedWindow {
    pub fn new(id: Window, frame: Rect) -> Self {
        Self {
            id,
            frames: None,
            transient_for: None,
            transients: Vec::new(),
            current_frame: frame,
            pending_frame: None,
            queued_frame: None,
            unzoomed_frame: None,
            restore_frame: None,
            frame_height: frame.height,
            flags: WindowFlags::empty(),
            protocols: WmProtocols::empty(),
            size_hints: None,
            wm_hints: None,
            window_type: WindowType::Normal,
            decor: DecorClass::Large,
            attrs: FrameAttr::empty(),
            title: String::new(),
            native_id: None,
            dock_op: None,
            ignore_unmaps: 0,
        }
    }

    pub fn frame_id(&self) -> Option<Window> {
        self.frames.map(|f| f.frame)
    }

    pub fn is_closing(&self) -> bool {
        self.flags.contains(WindowFlags::CLOSING)
    }

    pub fn is_minimized(&self) -> bool {
        self.flags.contains(WindowFlags::MINIMIZED)
    }

    pub fn is_mapped(&self) -> bool {
        self.flags.contains(WindowFlags::MAPPED)
    }

    pub fn is_shaded(&self) -> bool {
        self.flags.contains(WindowFlags::SHADED)
    }

    pub fn is_zoomed(&self) -> bool {
        self.unzoomed_frame.is_some()
    }

    pub fn is_fullscreen(&self) -> bool {
        self.flags.contains(WindowFlags::FULLSCREEN)
    }

    pub fn accepts_input(&self) -> bool {
        self.wm_hints.is_none_or(|h| h.accepts_input())
    }

    pub fn is_focusable(&self) -> bool {
        !self.flags.intersects(WindowFlags::CLOSING | WindowFlags::SHAPED_EMPTY | WindowFlags::MINIMIZED)
            && self.is_mapped()
            && (self.accepts_input() || self.protocols.contains(WmProtocols::TAKE_FOCUS))
    }

    /// Decoration actually drawn; fullscreen windows have none
    pub fn effective_decor(&self) -> DecorClass {
        if self.is_fullscreen() {
            DecorClass::None
        } else {
            self.decor
        }
    }

    pub fn titlebar_height(&self, config: &Config) -> i32 {
        frame::titlebar_height(self.effective_decor(), &config.decorations)
    }

    fn effective_attrs(&self) -> FrameAttr {
        let mut attrs = self.attrs;
        if self.is_shaded() || self.is_fullscreen() {
            attrs.remove(FrameAttr::GROW_BOX);
        }
        attrs.set(FrameAttr::SHADED, self.is_shaded());
        attrs
    }

    fn geometry_for(&self, rect: Rect, config: &Config) -> FrameGeometry {
        FrameGeometry::new(rect, self.effective_decor(), self.effective_attrs(), &config.decorations)
    }

    pub fn frame_geometry(&self, config: &Config) -> FrameGeometry {
        self.geometry_for(self.current_frame, config)
    }

    /// Newest requested frame: queued, else pending, else current
    pub fn latest_frame(&self) -> Rect {
        self.queued_frame.or(self.pending_frame).unwrap_or(self.current_frame)
    }

    /// Newest requested frame at its unshaded height
    fn latest_unshaded(&self) -> Rect {
        let latest = self.latest_frame();
        if self.is_shaded() {
            latest.with_height(self.frame_height)
        } else {
            latest
        }
    }

    pub fn constraints(&self, config: &Config) -> SizeConstraints {
        SizeConstraints::new(self.size_hints.as_ref(), &config.windows)
    }

    pub fn is_resizable(&self, config: &Config) -> bool {
        let c = self.constraints(config);
        c.min != c.max
    }

    /// Recompute the structural attributes, keeping transient ones
    pub fn update_attrs(&mut self, config: &Config) {
        let keep = FrameAttr::ACTIVE | FrameAttr::URGENT | FrameAttr::PRELIGHT | FrameAttr::clicked();
        let mut attrs = self.attrs & keep;
        if self.decor != DecorClass::None {
            attrs |= FrameAttr::TITLE | FrameAttr::CLOSE_BOX;
            if self.transient_for.is_none() && self.window_type == WindowType::Normal {
                attrs |= FrameAttr::COLLAPSE_BOX;
            }
            if self.is_resizable(config) {
                attrs |= FrameAttr::ZOOM_BOX | FrameAttr::GROW_BOX;
            }
        }
        attrs.set(FrameAttr::URGENT, self.flags.contains(WindowFlags::URGENT));
        self.attrs = attrs;
    }

    // ------------------------------------------------------------------
    // Geometry
    // ------------------------------------------------------------------

    /// Apply size hints and the titlebar reachability policy to a frame
    pub fn validate_frame_rect(&self, env: &WindowEnv, r: Rect, from_user: bool) -> Rect {
        let tb = self.titlebar_height(env.config);
        let client = self
            .constraints(env.config)
            .constrain(Size::new(r.width, r.height - tb));
        let mut r = Rect::new(r.x, r.y, client.width, client.height + tb);

        if from_user && env.config.windows.limit_size {
            let head = env.heads.head_for_rect(&r);
            r.width = r.width.min(head.width);
            r.height = r.height.min(head.height);
        }

        env.heads
            .validate_window_position(r, tb, env.config.windows.min_visible_titlebar)
    }

    /// Ask for a new frame; never blocks.
    pub fn request_frame_change(&mut self, env: &WindowEnv, r: Rect, from_user: bool) -> Result<()> {
        if self.is_closing() {
            return Ok(());
        }

        let tb = self.titlebar_height(env.config);
        let r = if self.is_shaded() && r.height <= tb {
            r.with_height(self.frame_height)
        } else {
            r
        };
        let r = self.validate_frame_rect(env, r, from_user);

        self.frame_height = r.height;
        if self.is_shaded() {
            self.submit_frame(env, r.with_height(tb))
        } else {
            self.submit_frame(env, r)
        }
    }

    /// Send `target` now, or park it in the queue slot behind the pending one
    fn submit_frame(&mut self, env: &WindowEnv, target: Rect) -> Result<()> {
        if let Some(pending) = self.pending_frame {
            self.queued_frame = (target != pending).then_some(target);
            trace!("Window 0x{:x}: queued {:?} behind {:?}", self.id, target, pending);
            return Ok(());
        }
        if target == self.current_frame {
            return Ok(());
        }
        if self.frames.is_none() {
            self.current_frame = target;
            return Ok(());
        }

        self.pending_frame = Some(target);
        self.send_frame(env, target)
    }

    fn send_frame(&self, env: &WindowEnv, r: Rect) -> Result<()> {
        let Some(frames) = self.frames else {
            return Ok(());
        };
        let tb = self.titlebar_height(env.config);
        let client_height = if self.is_shaded() {
            self.frame_height - tb
        } else {
            r.height - tb
        };

        env.conn.send(Request::ConfigureWindow { window: frames.frame, rect: r })?;
        if !self.is_shaded() {
            env.conn.send(Request::ConfigureWindow {
                window: self.id,
                rect: Rect::new(0, tb, r.width, client_height),
            })?;
        }
        env.conn.send(Request::SendConfigureNotify {
            window: self.id,
            rect: Rect::new(r.x, r.y + tb, r.width, client_height),
        })?;
        frames.layout(env.conn, &self.geometry_for(r, env.config))
    }

    /// Server confirmation of the frame geometry
    pub fn on_configure_notify(&mut self, env: &WindowEnv, confirmed: Rect) -> Result<()> {
        self.current_frame = confirmed;

        match self.pending_frame {
            Some(pending) if pending == confirmed => {
                self.pending_frame = None;
                if let Some(queued) = self.queued_frame.take() {
                    if queued != confirmed {
                        self.pending_frame = Some(queued);
                        self.send_frame(env, queued)?;
                    }
                }
            }
            Some(pending) => {
                trace!(
                    "Window 0x{:x}: notify {:?} while {:?} is pending",
                    self.id, confirmed, pending
                );
            }
            None => {}
        }

        if !self.is_shaded() && self.pending_frame.is_none() {
            self.frame_height = confirmed.height;
        }
        Ok(())
    }

    /// Forget outstanding geometry after the server rejected a request
    pub fn abandon_pending(&mut self) {
        if self.pending_frame.is_some() || self.queued_frame.is_some() {
            debug!("Window 0x{:x}: abandoning pending frame change", self.id);
        }
        self.pending_frame = None;
        self.queued_frame = None;
    }

    // ------------------------------------------------------------------
    // Shade, zoom, fullscreen
    // ------------------------------------------------------------------

    pub fn do_shade(&mut self, env: &WindowEnv, timestamp: Timestamp) -> Result<()> {
        if self.is_closing() || self.is_shaded() || self.effective_decor() == DecorClass::None {
            return Ok(());
        }
        debug!("Shading window 0x{:x} (time {})", self.id, timestamp);

        let latest = self.latest_frame();
        self.frame_height = latest.height;
        self.flags.insert(WindowFlags::SHADED);
        let tb = self.titlebar_height(env.config);
        self.submit_frame(env, latest.with_height(tb))?;
        self.update_net_wm_state(env)
    }

    pub fn do_unshade(&mut self, env: &WindowEnv, timestamp: Timestamp) -> Result<()> {
        if self.is_closing() || !self.is_shaded() {
            return Ok(());
        }
        debug!("Unshading window 0x{:x} (time {})", self.id, timestamp);

        let target = self.latest_unshaded();
        self.flags.remove(WindowFlags::SHADED);
        self.submit_frame(env, target)?;
        self.update_net_wm_state(env)
    }

    pub fn do_toggle_shaded(&mut self, env: &WindowEnv, timestamp: Timestamp) -> Result<()> {
        if self.is_shaded() {
            self.do_unshade(env, timestamp)
        } else {
            self.do_shade(env, timestamp)
        }
    }

    /// Toggle between the remembered frame and the head minus the dock
    pub fn do_zoom(&mut self, env: &WindowEnv) -> Result<()> {
        if self.is_closing() || self.is_fullscreen() {
            return Ok(());
        }

        let latest = self.latest_unshaded();
        let target = match self.unzoomed_frame.take() {
            Some(previous) => previous,
            None => {
                self.unzoomed_frame = Some(latest);
                let zoomed = env
                    .heads
                    .zoomed_rect(&latest, &env.dock.dock_rect(), env.dock.orientation());
                self.validate_frame_rect(env, zoomed, false)
            }
        };
        debug!("Zooming window 0x{:x} to {:?} (zoomed={})", self.id, target, self.is_zoomed());

        self.flags.remove(WindowFlags::SHADED);
        self.frame_height = target.height;
        self.submit_frame(env, target)?;
        self.update_net_wm_state(env)
    }

    /// Fit a zoomed frame to the dock's current position
    pub fn refit_zoom(&mut self, env: &WindowEnv) -> Result<()> {
        if self.is_closing() || self.is_fullscreen() || !self.is_zoomed() {
            return Ok(());
        }
        let zoomed = env
            .heads
            .zoomed_rect(&self.latest_unshaded(), &env.dock.dock_rect(), env.dock.orientation());
        self.request_frame_change(env, zoomed, false)
    }

    pub fn set_fullscreen(&mut self, env: &WindowEnv, fullscreen: bool) -> Result<()> {
        if self.is_closing() || fullscreen == self.is_fullscreen() {
            return Ok(());
        }

        let latest = self.latest_unshaded();
        let target = if fullscreen {
            self.restore_frame = Some(latest);
            self.flags.remove(WindowFlags::SHADED);
            self.flags.insert(WindowFlags::FULLSCREEN);
            env.heads.head_for_rect(&latest)
        } else {
            self.flags.remove(WindowFlags::FULLSCREEN);
            self.restore_frame.take().unwrap_or(latest)
        };
        debug!("Window 0x{:x} fullscreen={} -> {:?}", self.id, fullscreen, target);

        self.frame_height = target.height;
        self.submit_frame(env, target)?;
        self.update_frame_extents(env)?;
        self.update_net_wm_state(env)
    }

    // ------------------------------------------------------------------
    // Minimize / restore through the dock
    // ------------------------------------------------------------------

    fn require_native_id(&self) -> Result<NativeWindowId, WmError> {
        self.native_id.ok_or(WmError::NoNativeId(self.id))
    }

    /// Ask the dock to minimize; completes in [`Self::collapse_finished`]
    pub fn do_collapse(&mut self, env: &WindowEnv) -> Result<()> {
        if self.is_closing() || self.is_minimized() || self.dock_op.is_some() || !self.is_mapped() {
            return Ok(());
        }

        let native = self.require_native_id()?;
        env.dock
            .minimize(native, &self.title)
            .map_err(|source| WmError::DockRejected { window: self.id, source })?;

        debug!("Window 0x{:x}: minimize requested (native {})", self.id, native);
        self.dock_op = Some(DockOp {
            kind: DockOpKind::Minimize,
            prior: self.flags & WindowFlags::visibility(),
        });
        self.flags.insert(WindowFlags::MINIMIZED);
        Ok(())
    }

    pub fn collapse_finished(&mut self, env: &WindowEnv, success: bool) -> Result<()> {
        let Some(op) = self.dock_op.filter(|op| op.kind == DockOpKind::Minimize) else {
            debug!("Window 0x{:x}: ignoring minimize completion with nothing in flight", self.id);
            return Ok(());
        };
        self.dock_op = None;

        if !success {
            self.flags = (self.flags - WindowFlags::visibility()) | op.prior;
            warn!("Window 0x{:x}: dock failed to minimize", self.id);
            return Err(WmError::MinimizeFailed(self.id).into());
        }

        if let Some(frame) = self.frame_id() {
            env.conn.send(Request::UnmapWindow(frame))?;
        }
        self.flags.remove(WindowFlags::MAPPED | WindowFlags::HIDDEN);
        self.flags.insert(WindowFlags::MINIMIZED);
        self.set_wm_state(env, ICONIC_STATE)?;
        self.update_net_wm_state(env)
    }

    /// Leave the minimized state, optionally asking the dock to restore first
    pub fn do_uncollapse(&mut self, env: &WindowEnv, tell_dock: bool) -> Result<()> {
        if self.is_closing() || !self.is_minimized() || self.dock_op.is_some() {
            return Ok(());
        }

        if !tell_dock {
            return self.show_restored(env);
        }

        let native = self.require_native_id()?;
        if env.dock.is_window_visible(native).unwrap_or(false) {
            debug!("Window 0x{:x}: already visible in the host, restoring locally", self.id);
            return self.show_restored(env);
        }
        env.dock
            .restore(native)
            .map_err(|source| WmError::DockRejected { window: self.id, source })?;

        debug!("Window 0x{:x}: restore requested (native {})", self.id, native);
        self.dock_op = Some(DockOp {
            kind: DockOpKind::Restore,
            prior: self.flags & WindowFlags::visibility(),
        });
        self.flags.remove(WindowFlags::MINIMIZED);
        Ok(())
    }

    pub fn uncollapse_finished(&mut self, env: &WindowEnv, success: bool) -> Result<()> {
        let Some(op) = self.dock_op.filter(|op| op.kind == DockOpKind::Restore) else {
            debug!("Window 0x{:x}: ignoring restore completion with nothing in flight", self.id);
            return Ok(());
        };
        self.dock_op = None;

        if !success {
            self.flags = (self.flags - WindowFlags::visibility()) | op.prior;
            warn!("Window 0x{:x}: dock failed to restore", self.id);
            return Err(WmError::RestoreFailed(self.id).into());
        }
        self.show_restored(env)
    }

    fn show_restored(&mut self, env: &WindowEnv) -> Result<()> {
        if let Some(frame) = self.frame_id() {
            env.conn.send(Request::MapWindow(frame))?;
        }
        self.flags.remove(WindowFlags::MINIMIZED | WindowFlags::HIDDEN);
        self.flags.insert(WindowFlags::MAPPED);
        self.set_wm_state(env, NORMAL_STATE)?;
        self.update_net_wm_state(env)
    }

    /// Tell the dock to drop any tile it holds for this window
    pub fn forget_in_dock(&self, env: &WindowEnv) {
        if !(self.is_minimized() || self.dock_op.is_some()) {
            return;
        }
        if let Some(native) = self.native_id {
            if let Err(e) = env.dock.remove(native) {
                debug!("Window 0x{:x}: dock remove failed: {}", self.id, e);
            }
        }
    }

    // ------------------------------------------------------------------
    // Hide / show (host session)
    // ------------------------------------------------------------------

    pub fn do_hide(&mut self, env: &WindowEnv) -> Result<()> {
        if !self.is_mapped() || self.is_minimized() {
            return Ok(());
        }
        if let Some(frame) = self.frame_id() {
            env.conn.send(Request::UnmapWindow(frame))?;
        }
        self.flags.remove(WindowFlags::MAPPED);
        self.flags.insert(WindowFlags::HIDDEN);
        Ok(())
    }

    pub fn do_unhide(&mut self, env: &WindowEnv) -> Result<()> {
        if !self.flags.contains(WindowFlags::HIDDEN) {
            return Ok(());
        }
        if let Some(frame) = self.frame_id() {
            env.conn.send(Request::MapWindow(frame))?;
        }
        self.flags.remove(WindowFlags::HIDDEN);
        self.flags.insert(WindowFlags::MAPPED);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Focus
    // ------------------------------------------------------------------

    /// Hand input focus to the client.
    ///
    /// Returns false when the window cannot take focus. `force` gives focus
    /// to clients whose input hint refuses it.
    pub fn accept_focus(&mut self, env: &WindowEnv, timestamp: Timestamp, force: bool) -> Result<bool> {
        if self.flags.intersects(WindowFlags::CLOSING | WindowFlags::SHAPED_EMPTY | WindowFlags::MINIMIZED)
            || !self.is_mapped()
        {
            return Ok(false);
        }

        let input = self.accepts_input();
        let take_focus = self.protocols.contains(WmProtocols::TAKE_FOCUS);
        if !input && !take_focus && !force {
            return Ok(false);
        }

        if input || force {
            env.conn.send(Request::SetInputFocus { window: self.id, time: timestamp })?;
        }
        if take_focus {
            env.conn.send(Request::SendClientMessage {
                window: self.id,
                message_type: env.atoms.wm_protocols,
                data: [env.atoms.wm_take_focus, timestamp, 0, 0, 0],
            })?;
        }
        Ok(true)
    }

    pub fn x_focus_in(&mut self, env: &WindowEnv) -> Result<()> {
        self.flags.insert(WindowFlags::FOCUSED);
        self.set_active(env, true)
    }

    pub fn x_focus_out(&mut self, env: &WindowEnv) -> Result<()> {
        self.flags.remove(WindowFlags::FOCUSED);
        self.set_active(env, false)
    }

    fn set_active(&mut self, env: &WindowEnv, active: bool) -> Result<()> {
        if self.attrs.contains(FrameAttr::ACTIVE) == active {
            return Ok(());
        }
        self.attrs.set(FrameAttr::ACTIVE, active);
        if active {
            env.conn.send(Request::UngrabButton(self.id))?;
        } else if !self.is_closing() {
            env.conn.send(Request::GrabButton(self.id))?;
        }
        if let Some(frame) = self.frame_id() {
            let decorations = &env.config.decorations;
            let pixel = if active { decorations.active_color } else { decorations.inactive_color };
            env.conn.send(Request::SetBackground { window: frame, pixel })?;
        }
        Ok(())
    }

    /// Hover feedback over the button cluster
    pub fn set_prelight(&mut self, on: bool) {
        self.attrs.set(FrameAttr::PRELIGHT, on);
    }

    /// Point in root coordinates
    pub fn hit_test_frame(&self, config: &Config, point: Point) -> HitRegion {
        if self.flags.contains(WindowFlags::SHAPED_EMPTY) {
            return HitRegion::None;
        }
        self.frame_geometry(config).hit_test(point)
    }

    // ------------------------------------------------------------------
    // Close
    // ------------------------------------------------------------------

    /// Polite close when the client supports it; no timeout is enforced.
    pub fn do_close(&mut self, env: &WindowEnv, timestamp: Timestamp) -> Result<()> {
        if self.is_closing() {
            return Ok(());
        }
        if self.protocols.contains(WmProtocols::DELETE_WINDOW) {
            debug!("Sending WM_DELETE_WINDOW to 0x{:x}", self.id);
            return env.conn.send(Request::SendClientMessage {
                window: self.id,
                message_type: env.atoms.wm_protocols,
                data: [env.atoms.wm_delete_window, timestamp, 0, 0, 0],
            });
        }
        self.force_close(env)
    }

    pub fn force_close(&mut self, env: &WindowEnv) -> Result<()> {
        if self.is_closing() {
            return Ok(());
        }
        debug!("Killing client of window 0x{:x}", self.id);
        self.flags.insert(WindowFlags::CLOSING);
        self.abandon_pending();
        env.conn.send(Request::KillClient(self.id))
    }

    // ------------------------------------------------------------------
    // EWMH state
    // ------------------------------------------------------------------

    pub fn do_net_wm_state_change(&mut self, env: &WindowEnv, mode: u32, state: Atom) -> Result<()> {
        let want = |on: bool| match mode {
            NET_WM_STATE_REMOVE => false,
            NET_WM_STATE_ADD => true,
            NET_WM_STATE_TOGGLE => !on,
            _ => on,
        };
        let atoms = env.atoms;

        if state == atoms.net_wm_state_fullscreen {
            self.set_fullscreen(env, want(self.is_fullscreen()))
        } else if state == atoms.net_wm_state_shaded {
            if want(self.is_shaded()) {
                self.do_shade(env, x11rb::CURRENT_TIME)
            } else {
                self.do_unshade(env, x11rb::CURRENT_TIME)
            }
        } else if state == atoms.net_wm_state_hidden {
            if want(self.is_minimized()) {
                self.do_collapse(env)
            } else {
                self.do_uncollapse(env, true)
            }
        } else if state == atoms.net_wm_state_maximized_vert || state == atoms.net_wm_state_maximized_horz {
            if want(self.is_zoomed()) != self.is_zoomed() {
                self.do_zoom(env)?;
            }
            Ok(())
        } else if state == atoms.net_wm_state_modal {
            self.flags.set(WindowFlags::MODAL, want(self.flags.contains(WindowFlags::MODAL)));
            self.update_net_wm_state(env)
        } else if state == atoms.net_wm_state_demands_attention {
            self.flags.set(WindowFlags::URGENT, want(self.flags.contains(WindowFlags::URGENT)));
            self.update_attrs(env.config);
            self.update_net_wm_state(env)
        } else {
            trace!("Unsupported _NET_WM_STATE atom {}", state);
            Ok(())
        }
    }

    pub fn set_wm_state(&self, env: &WindowEnv, state: u32) -> Result<()> {
        env.conn.send(Request::ChangeProperty {
            window: self.id,
            property: env.atoms.wm_state,
            type_: env.atoms.wm_state,
            data: PropertyData::Card32(vec![state, NONE]),
        })
    }

    pub fn update_net_wm_state(&self, env: &WindowEnv) -> Result<()> {
        let atoms = env.atoms;
        let mut states = Vec::new();
        if self.is_fullscreen() {
            states.push(atoms.net_wm_state_fullscreen);
        }
        if self.is_shaded() {
            states.push(atoms.net_wm_state_shaded);
        }
        if self.is_minimized() {
            states.push(atoms.net_wm_state_hidden);
        }
        if self.is_zoomed() {
            states.push(atoms.net_wm_state_maximized_vert);
            states.push(atoms.net_wm_state_maximized_horz);
        }
        if self.flags.contains(WindowFlags::MODAL) {
            states.push(atoms.net_wm_state_modal);
        }
        if self.flags.contains(WindowFlags::URGENT) {
            states.push(atoms.net_wm_state_demands_attention);
        }
        env.conn.send(Request::ChangeProperty {
            window: self.id,
            property: atoms.net_wm_state,
            type_: AtomEnum::ATOM.into(),
            data: PropertyData::Card32(states),
        })
    }

    pub fn update_allowed_actions(&self, env: &WindowEnv) -> Result<()> {
        let atoms = env.atoms;
        let mut actions = vec![atoms.net_wm_action_move, atoms.net_wm_action_close, atoms.net_wm_action_fullscreen];
        if self.attrs.contains(FrameAttr::GROW_BOX) {
            actions.push(atoms.net_wm_action_resize);
        }
        if self.attrs.contains(FrameAttr::ZOOM_BOX) {
            actions.push(atoms.net_wm_action_maximize_horz);
            actions.push(atoms.net_wm_action_maximize_vert);
        }
        if self.attrs.contains(FrameAttr::COLLAPSE_BOX) {
            actions.push(atoms.net_wm_action_minimize);
        }
        if self.decor != DecorClass::None {
            actions.push(atoms.net_wm_action_shade);
        }
        env.conn.send(Request::ChangeProperty {
            window: self.id,
            property: atoms.net_wm_allowed_actions,
            type_: AtomEnum::ATOM.into(),
            data: PropertyData::Card32(actions),
        })
    }

    pub fn update_frame_extents(&self, env: &WindowEnv) -> Result<()> {
        let tb = self.titlebar_height(env.config) as u32;
        env.conn.send(Request::ChangeProperty {
            window: self.id,
            property: env.atoms.net_frame_extents,
            type_: AtomEnum::CARDINAL.into(),
            data: PropertyData::Card32(vec![0, 0, tb, 0]),
        })
    }

    /// Re-read a changed client property
    pub fn property_changed(&mut self, env: &WindowEnv, atom: Atom) -> Result<PropertyChange> {
        let (conn, atoms) = (env.conn, env.atoms);

        if atom == atoms.wm_name || atom == atoms.net_wm_name {
            self.title = HintsManager::read_title(conn, atoms, self.id)?;
            debug!("Window 0x{:x} title: {:?}", self.id, self.title);
        } else if atom == atoms.wm_normal_hints {
            self.size_hints = HintsManager::read_size_hints(conn, atoms, self.id)?;
            self.update_attrs(env.config);
            let latest = self.latest_unshaded();
            self.request_frame_change(env, latest, false)?;
        } else if atom == atoms.wm_hints {
            self.wm_hints = HintsManager::read_wm_hints(conn, atoms, self.id)?;
            let urgent = self.wm_hints.is_some_and(|h| h.is_urgent());
            if urgent != self.flags.contains(WindowFlags::URGENT) {
                self.flags.set(WindowFlags::URGENT, urgent);
                self.update_attrs(env.config);
                self.update_net_wm_state(env)?;
            }
        } else if atom == atoms.wm_protocols {
            self.protocols = HintsManager::read_protocols(conn, atoms, self.id)?;
        } else if atom == atoms.wm_transient_for {
            let parent = HintsManager::read_transient_for(conn, atoms, self.id)?;
            return Ok(PropertyChange::TransientFor(parent));
        }
        Ok(PropertyChange::None)
    }

    // ------------------------------------------------------------------
    // Reparenting
    // ------------------------------------------------------------------

    /// Create the frame around the client and take it over
    pub fn reparent_in(&mut self, env: &WindowEnv, frame_rect: Rect, client_mapped: bool) -> Result<()> {
        let conn = env.conn;
        let frame_rect = self.validate_frame_rect(env, frame_rect, false);
        self.current_frame = frame_rect;
        self.frame_height = frame_rect.height;
        let tb = self.titlebar_height(env.config);

        conn.send(Request::SelectInput {
            window: self.id,
            mask: EventMask::PROPERTY_CHANGE | EventMask::FOCUS_CHANGE,
        })?;
        conn.send(Request::SelectShapeInput(self.id))?;
        conn.send(Request::GrabButton(self.id))?;
        conn.send(Request::AddToSaveSet(self.id))?;

        let frames = FrameWindows::create(
            conn,
            &self.frame_geometry(env.config),
            env.config.decorations.inactive_color,
        )?;
        if client_mapped {
            self.ignore_unmaps += 1;
        }
        conn.send(Request::ReparentWindow { window: self.id, parent: frames.frame, x: 0, y: tb })?;
        conn.send(Request::ConfigureWindow {
            window: self.id,
            rect: Rect::new(0, tb, frame_rect.width, frame_rect.height - tb),
        })?;

        self.frames = Some(frames);
        self.flags.insert(WindowFlags::REPARENTED);
        self.native_id = Some(self.resolve_native_id(env, frames.frame)?);

        self.update_frame_extents(env)?;
        self.update_allowed_actions(env)
    }

    /// Host id published on the frame, else the frame id itself
    fn resolve_native_id(&self, env: &WindowEnv, frame: Window) -> Result<NativeWindowId> {
        let published = env
            .conn
            .get_property(frame, env.atoms.native_window_id, false)?
            .and_then(|p| p.value32().first().copied())
            .filter(|&id| id != 0);
        Ok(published.unwrap_or(frame))
    }

    /// Map frame and client
    pub fn show(&mut self, env: &WindowEnv) -> Result<()> {
        env.conn.send(Request::MapWindow(self.id))?;
        if let Some(frame) = self.frame_id() {
            env.conn.send(Request::MapWindow(frame))?;
        }
        self.flags.insert(WindowFlags::MAPPED);
        self.set_wm_state(env, NORMAL_STATE)
    }

    /// Give the client back to the root and drop the frame windows
    pub fn reparent_out(&mut self, env: &WindowEnv, client_alive: bool) -> Result<()> {
        let Some(frames) = self.frames.take() else {
            return Ok(());
        };
        if client_alive {
            let tb = self.titlebar_height(env.config);
            env.conn.send(Request::ReparentWindow {
                window: self.id,
                parent: env.conn.root(),
                x: self.current_frame.x,
                y: self.current_frame.y + tb,
            })?;
            env.conn.send(Request::RemoveFromSaveSet(self.id))?;
        }
        self.flags.remove(WindowFlags::REPARENTED);
        frames.destroy(env.conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::dock::DockError;
    use crate::wm::testing::{DockCall, TestEnv, managed};

    fn frame_configures(requests: &[Request], frame: Window) -> Vec<Rect> {
        requests
            .iter()
            .filter_map(|r| match r {
                Request::ConfigureWindow { window, rect } if *window == frame => Some(*rect),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_rapid_requests_coalesce_to_one_outstanding() {
        let t = TestEnv::new();
        let env = t.env();
        let mut w = managed(1, Rect::new(100, 100, 300, 200));
        let frame = w.frame_id().unwrap();

        for i in 1..=10 {
            w.request_frame_change(&env, Rect::new(100 + i, 100 + i, 300, 200), true).unwrap();
        }
        let sent = frame_configures(&t.conn.take_requests(), frame);
        assert_eq!(sent, vec![Rect::new(101, 101, 300, 200)]);
        assert_eq!(w.queued_frame, Some(Rect::new(110, 110, 300, 200)));

        w.on_configure_notify(&env, Rect::new(101, 101, 300, 200)).unwrap();
        let sent = frame_configures(&t.conn.take_requests(), frame);
        assert_eq!(sent, vec![Rect::new(110, 110, 300, 200)]);
        assert_eq!(w.pending_frame, Some(Rect::new(110, 110, 300, 200)));
        assert_eq!(w.queued_frame, None);

        w.on_configure_notify(&env, Rect::new(110, 110, 300, 200)).unwrap();
        assert!(t.conn.take_requests().is_empty());
        assert_eq!(w.pending_frame, None);
        assert_eq!(w.current_frame, Rect::new(110, 110, 300, 200));
    }

    #[test]
    fn test_stale_notify_does_not_clear_pending() {
        let t = TestEnv::new();
        let env = t.env();
        let mut w = managed(1, Rect::new(100, 100, 300, 200));
        w.request_frame_change(&env, Rect::new(150, 100, 300, 200), false).unwrap();
        w.on_configure_notify(&env, Rect::new(100, 100, 300, 200)).unwrap();
        assert_eq!(w.pending_frame, Some(Rect::new(150, 100, 300, 200)));
    }

    #[test]
    fn test_oversized_min_hint_does_not_abort_resize() {
        let t = TestEnv::new();
        let env = t.env();
        let mut w = managed(1, Rect::new(100, 100, 300, 200));
        w.size_hints = Some(SizeHints {
            flags: crate::wm::hints::P_MIN_SIZE,
            min_width: 40000,
            min_height: 40000,
            ..SizeHints::default()
        });

        w.request_frame_change(&env, Rect::new(100, 100, 400, 300), true).unwrap();
        let pending = w.pending_frame.unwrap();
        assert!(pending.width <= 32767);
        assert!(pending.height <= 32767 + w.titlebar_height(&t.config));
    }

    #[test]
    fn test_closing_window_ignores_geometry() {
        let t = TestEnv::new();
        let env = t.env();
        let mut w = managed(1, Rect::new(100, 100, 300, 200));
        w.force_close(&env).unwrap();
        t.conn.take_requests();

        w.request_frame_change(&env, Rect::new(0, 0, 500, 500), true).unwrap();
        assert!(t.conn.take_requests().is_empty());
        assert!(!w.accept_focus(&env, 0, true).unwrap());
    }

    #[test]
    fn test_shade_queues_behind_pending_resize() {
        let t = TestEnv::new();
        let env = t.env();
        let mut w = managed(1, Rect::new(100, 100, 300, 200));

        w.request_frame_change(&env, Rect::new(100, 100, 300, 400), false).unwrap();
        w.do_shade(&env, 0).unwrap();
        assert_eq!(w.pending_frame, Some(Rect::new(100, 100, 300, 400)));
        assert_eq!(w.queued_frame, Some(Rect::new(100, 100, 300, 22)));
        assert_eq!(w.frame_height, 400);

        w.on_configure_notify(&env, Rect::new(100, 100, 300, 400)).unwrap();
        w.on_configure_notify(&env, Rect::new(100, 100, 300, 22)).unwrap();
        assert_eq!(w.current_frame.height, 22);

        w.do_unshade(&env, 0).unwrap();
        assert_eq!(w.pending_frame, Some(Rect::new(100, 100, 300, 400)));
    }

    #[test]
    fn test_zoom_twice_restores_original() {
        let t = TestEnv::new();
        let env = t.env();
        let original = Rect::new(100, 100, 300, 200);
        let mut w = managed(1, original);

        w.do_zoom(&env).unwrap();
        let zoomed = w.pending_frame.unwrap();
        assert_eq!(zoomed, Rect::new(0, 0, 1920, 1080));
        w.on_configure_notify(&env, zoomed).unwrap();

        w.do_zoom(&env).unwrap();
        w.on_configure_notify(&env, w.pending_frame.unwrap()).unwrap();
        assert_eq!(w.current_frame, original);
        assert!(!w.is_zoomed());
    }

    #[test]
    fn test_zoom_avoids_dock() {
        let t = TestEnv::new();
        t.dock.set_rect(Rect::new(0, 1000, 1920, 80));
        let env = t.env();
        let mut w = managed(1, Rect::new(100, 100, 300, 200));
        w.do_zoom(&env).unwrap();
        assert_eq!(w.pending_frame, Some(Rect::new(0, 0, 1920, 1000)));
    }

    #[test]
    fn test_refit_zoom_follows_dock_and_skips_unzoomed() {
        let t = TestEnv::new();
        t.dock.set_rect(Rect::new(0, 1000, 1920, 80));
        let env = t.env();
        let mut w = managed(1, Rect::new(100, 100, 300, 200));
        w.refit_zoom(&env).unwrap();
        assert_eq!(w.pending_frame, None);

        w.do_zoom(&env).unwrap();
        w.on_configure_notify(&env, Rect::new(0, 0, 1920, 1000)).unwrap();
        t.dock.set_rect(Rect::new(0, 960, 1920, 120));
        w.refit_zoom(&env).unwrap();
        assert_eq!(w.pending_frame, Some(Rect::new(0, 0, 1920, 960)));
        assert_eq!(w.unzoomed_frame, Some(Rect::new(100, 100, 300, 200)));
    }

    #[test]
    fn test_minimize_round_trip_success() {
        let t = TestEnv::new();
        let env = t.env();
        let mut w = managed(1, Rect::new(100, 100, 300, 200));
        w.title = "xterm".into();

        w.do_collapse(&env).unwrap();
        assert_eq!(t.dock.calls(), vec![DockCall::Minimize(w.native_id.unwrap(), "xterm".into())]);
        assert!(w.is_mapped());

        w.collapse_finished(&env, true).unwrap();
        assert!(w.is_minimized());
        assert!(!w.is_mapped());
        assert!(t.conn.take_requests().contains(&Request::UnmapWindow(w.frame_id().unwrap())));
    }

    #[test]
    fn test_minimize_failure_reverts() {
        let t = TestEnv::new();
        let env = t.env();
        let mut w = managed(1, Rect::new(100, 100, 300, 200));
        let before = w.flags & WindowFlags::visibility();

        w.do_collapse(&env).unwrap();
        let err = w.collapse_finished(&env, false).unwrap_err();
        assert!(matches!(err.downcast_ref::<WmError>(), Some(WmError::MinimizeFailed(1))));
        assert_eq!(w.flags & WindowFlags::visibility(), before);
        assert!(w.dock_op.is_none());
    }

    #[test]
    fn test_dock_rejection_changes_nothing() {
        let t = TestEnv::new();
        t.dock.fail_with(DockError::Unavailable);
        let env = t.env();
        let mut w = managed(1, Rect::new(100, 100, 300, 200));
        let flags = w.flags;

        let err = w.do_collapse(&env).unwrap_err();
        assert!(matches!(err.downcast_ref::<WmError>(), Some(WmError::DockRejected { .. })));
        assert_eq!(w.flags, flags);
        assert!(w.dock_op.is_none());
    }

    #[test]
    fn test_stray_completion_is_ignored() {
        let t = TestEnv::new();
        let env = t.env();
        let mut w = managed(1, Rect::new(100, 100, 300, 200));
        let flags = w.flags;
        w.collapse_finished(&env, true).unwrap();
        w.uncollapse_finished(&env, false).unwrap();
        assert_eq!(w.flags, flags);
    }

    #[test]
    fn test_restore_through_dock() {
        let t = TestEnv::new();
        let env = t.env();
        let mut w = managed(1, Rect::new(100, 100, 300, 200));
        w.do_collapse(&env).unwrap();
        w.collapse_finished(&env, true).unwrap();

        w.do_uncollapse(&env, true).unwrap();
        assert!(!w.is_mapped());
        w.uncollapse_finished(&env, true).unwrap();
        assert!(w.is_mapped());
        assert!(!w.is_minimized());
    }

    #[test]
    fn test_restore_skips_dock_when_host_already_shows_window() {
        let t = TestEnv::new();
        let env = t.env();
        let mut w = managed(1, Rect::new(100, 100, 300, 200));
        w.do_collapse(&env).unwrap();
        w.collapse_finished(&env, true).unwrap();
        t.dock.set_visible(w.native_id.unwrap());

        w.do_uncollapse(&env, true).unwrap();
        assert!(w.is_mapped());
        assert!(w.dock_op.is_none());
        assert!(!t.dock.calls().iter().any(|c| matches!(c, DockCall::Restore(_))));
    }

    #[test]
    fn test_restore_failure_stays_minimized() {
        let t = TestEnv::new();
        let env = t.env();
        let mut w = managed(1, Rect::new(100, 100, 300, 200));
        w.do_collapse(&env).unwrap();
        w.collapse_finished(&env, true).unwrap();

        w.do_uncollapse(&env, true).unwrap();
        assert!(w.uncollapse_finished(&env, false).is_err());
        assert!(w.is_minimized());
        assert!(!w.is_mapped());
    }

    #[test]
    fn test_focus_respects_input_hint_unless_forced() {
        let t = TestEnv::new();
        let env = t.env();
        let mut w = managed(1, Rect::new(100, 100, 300, 200));
        w.wm_hints = WmHints::from_values(&[crate::wm::hints::INPUT_HINT, 0, 0]);

        assert!(!w.accept_focus(&env, 5, false).unwrap());
        assert!(w.accept_focus(&env, 5, true).unwrap());
        assert!(t.conn.take_requests().contains(&Request::SetInputFocus { window: 1, time: 5 }));
    }

    #[test]
    fn test_take_focus_message() {
        let t = TestEnv::new();
        let env = t.env();
        let mut w = managed(1, Rect::new(100, 100, 300, 200));
        w.protocols.insert(WmProtocols::TAKE_FOCUS);
        w.wm_hints = WmHints::from_values(&[crate::wm::hints::INPUT_HINT, 0, 0]);

        assert!(w.accept_focus(&env, 9, false).unwrap());
        let requests = t.conn.take_requests();
        assert!(requests.contains(&Request::SendClientMessage {
            window: 1,
            message_type: t.atoms.wm_protocols,
            data: [t.atoms.wm_take_focus, 9, 0, 0, 0],
        }));
        assert!(!requests.iter().any(|r| matches!(r, Request::SetInputFocus { .. })));
    }

    #[test]
    fn test_shaped_empty_is_not_hit_or_focused() {
        let t = TestEnv::new();
        let env = t.env();
        let mut w = managed(1, Rect::new(100, 100, 300, 200));
        w.flags.insert(WindowFlags::SHAPED_EMPTY);
        assert_eq!(w.hit_test_frame(&t.config, Point::new(200, 200)), HitRegion::None);
        assert!(!w.accept_focus(&env, 0, true).unwrap());
    }

    #[test]
    fn test_close_prefers_delete_protocol() {
        let t = TestEnv::new();
        let env = t.env();
        let mut w = managed(1, Rect::new(100, 100, 300, 200));
        w.do_close(&env, 3).unwrap();
        assert!(!w.is_closing());
        let requests = t.conn.take_requests();
        assert!(matches!(requests.as_slice(), [Request::SendClientMessage { .. }]));

        w.protocols = WmProtocols::empty();
        w.do_close(&env, 3).unwrap();
        assert!(w.is_closing());
        assert_eq!(t.conn.take_requests(), vec![Request::KillClient(1)]);
    }

    #[test]
    fn test_fullscreen_round_trip() {
        let t = TestEnv::new();
        let env = t.env();
        let original = Rect::new(100, 100, 300, 200);
        let mut w = managed(1, original);

        w.set_fullscreen(&env, true).unwrap();
        assert_eq!(w.titlebar_height(&t.config), 0);
        let target = w.pending_frame.unwrap();
        assert_eq!(target, Rect::new(0, 0, 1920, 1080));
        w.on_configure_notify(&env, target).unwrap();

        w.set_fullscreen(&env, false).unwrap();
        assert_eq!(w.pending_frame, Some(original));
    }

    #[test]
    fn test_net_wm_state_toggle_shade() {
        let t = TestEnv::new();
        let env = t.env();
        let mut w = managed(1, Rect::new(100, 100, 300, 200));
        w.do_net_wm_state_change(&env, NET_WM_STATE_TOGGLE, t.atoms.net_wm_state_shaded).unwrap();
        assert!(w.is_shaded());
        w.do_net_wm_state_change(&env, NET_WM_STATE_ADD, t.atoms.net_wm_state_shaded).unwrap();
        assert!(w.is_shaded());
        w.do_net_wm_state_change(&env, NET_WM_STATE_REMOVE, t.atoms.net_wm_state_shaded).unwrap();
        assert!(!w.is_shaded());
    }
}
