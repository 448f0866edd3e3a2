//! Window Manager Module
//!
//! [`WindowManager`] is the process-wide context: it owns the display
//! session, the window registry, focus and gesture tracking, the selection
//! proxy and the host bridge, and dispatches X events and host messages to
//! them strictly one at a time.

pub mod atoms;
pub mod client_flags;
pub mod focus;
pub mod frame;
pub mod hints;
pub mod moveresize;
pub mod screen;
pub mod selection;
pub mod window;
pub mod xconn;

#[cfg(test)]
pub mod testing;

use anyhow::Result;
use std::time::Instant;
use tracing::{debug, info, trace, warn};
use x11rb::protocol::shape;
use x11rb::protocol::xproto::*;
use x11rb::protocol::{ErrorKind, Event};

use crate::config::Config;
use crate::host::dock::{DockBridge, DockEvent, NativeWindowId};
use crate::host::ipc::HostMessage;
use crate::host::pasteboard::Pasteboard;
use crate::shared::{Point, Rect, Size};
use crate::wm::atoms::Atoms;
use crate::wm::client_flags::WindowFlags;
use crate::wm::focus::{FocusManager, FocusPolicy};
use crate::wm::frame::{DecorClass, HitRegion};
use crate::wm::hints::HintsManager;
use crate::wm::moveresize::{MoveResizeManager, PressOutcome};
use crate::wm::screen::{Heads, Screen};
use crate::wm::selection::SelectionProxy;
use crate::wm::window::{
    DockOpKind, ICONIC_STATE, ManagedWindow, PropertyChange, WITHDRAWN_STATE, WindowEnv,
};
use crate::wm::xconn::{PropertyData, Request, XConn};

/// Borrow the collaborators of a [`WindowEnv`] field by field, leaving the
/// registry and focus state free for mutable use.
macro_rules! window_env {
    ($wm:expr) => {
        WindowEnv {
            conn: &$wm.conn,
            atoms: &$wm.atoms,
            config: &$wm.config,
            heads: &$wm.heads,
            dock: $wm.dock.as_ref(),
        }
    };
}

const WM_NAME: &str = "rootless-wm";

pub struct WindowManager<C: XConn> {
    pub(crate) conn: C,
    pub atoms: Atoms,
    pub config: Config,
    pub heads: Heads,
    pub screen: Screen,
    pub focus: FocusManager,
    moveresize: MoveResizeManager,
    selection: Option<SelectionProxy>,
    dock: Box<dyn DockBridge>,
    pub pasteboard: Pasteboard,
    /// Clients in the order they were managed
    client_list: Vec<Window>,
    /// Latest server time seen in an event
    last_time: Timestamp,
    /// When the last managed window went away
    empty_since: Option<Instant>,
    /// Owner of the manager selection, named by _NET_SUPPORTING_WM_CHECK
    check_window: Window,
}

impl<C: XConn> WindowManager<C> {
    pub fn new(
        conn: C,
        atoms: Atoms,
        config: Config,
        heads: Heads,
        dock: Box<dyn DockBridge>,
        pasteboard: Pasteboard,
        check_window: Window,
    ) -> Result<Self> {
        let root = conn.root();

        for window in [root, check_window] {
            conn.send(Request::ChangeProperty {
                window,
                property: atoms.net_supporting_wm_check,
                type_: AtomEnum::WINDOW.into(),
                data: PropertyData::Card32(vec![check_window]),
            })?;
        }
        conn.send(Request::ChangeProperty {
            window: check_window,
            property: atoms.net_wm_name,
            type_: atoms.utf8_string,
            data: PropertyData::Bytes(WM_NAME.as_bytes().to_vec()),
        })?;
        conn.send(Request::ChangeProperty {
            window: root,
            property: atoms.net_supported,
            type_: AtomEnum::ATOM.into(),
            data: PropertyData::Card32(atoms.supported()),
        })?;

        let selection = if config.selection.enabled {
            Some(SelectionProxy::new(&conn, &atoms, &config.selection)?)
        } else {
            info!("Selection proxy disabled by configuration");
            None
        };

        if !dock.is_available() {
            info!("No host dock; minimize requests will be refused");
        }
        info!("Window manager initialized on {} head(s)", heads.rects().len());
        Ok(Self {
            screen: Screen::new(),
            focus: FocusManager::new(&config.focus),
            moveresize: MoveResizeManager::new(&config.windows),
            conn,
            atoms,
            config,
            heads,
            selection,
            dock,
            pasteboard,
            client_list: Vec::new(),
            last_time: x11rb::CURRENT_TIME,
            empty_since: Some(Instant::now()),
            check_window,
        })
    }

    /// Adopt the clients that were already on screen at startup
    pub fn scan_existing(&mut self) -> Result<()> {
        let children = self.conn.children()?;
        debug!("Scanning {} existing root children", children.len());
        for id in children {
            if let Err(e) = self.manage_window(id, true) {
                warn!("Failed to adopt window 0x{:x}: {:#}", id, e);
            }
        }
        self.conn.flush()
    }

    // ------------------------------------------------------------------
    // X event dispatch
    // ------------------------------------------------------------------

    pub fn handle_event(&mut self, event: Event) -> Result<()> {
        if let Some(time) = event_time(&event) {
            self.last_time = time;
        }

        match event {
            Event::MapRequest(e) => self.on_map_request(e.window),
            Event::UnmapNotify(e) => self.on_unmap_notify(e.window),
            Event::DestroyNotify(e) => self.unmanage(e.window, false),
            Event::ConfigureRequest(e) => self.on_configure_request(&e),
            Event::ConfigureNotify(e) => self.on_configure_notify(&e),
            Event::PropertyNotify(e) => self.on_property_notify(&e),
            Event::ClientMessage(e) => self.on_client_message(&e),
            Event::ButtonPress(e) => self.on_button_press(&e),
            Event::ButtonRelease(e) => self.on_button_release(&e),
            Event::MotionNotify(e) => self.on_motion(&e),
            Event::EnterNotify(e) => self.on_crossing(e.event, e.mode, true),
            Event::LeaveNotify(e) => self.on_crossing(e.event, e.mode, false),
            Event::ShapeNotify(e) => self.on_shape_notify(&e),
            Event::SelectionClear(e) => {
                if let Some(proxy) = self.selection.as_mut() {
                    proxy.on_clear_event(&e);
                }
                Ok(())
            }
            Event::SelectionRequest(e) => match self.selection.as_ref() {
                Some(proxy) => proxy.on_request_event(&self.conn, &self.pasteboard, &e),
                None => Ok(()),
            },
            Event::SelectionNotify(e) => match self.selection.as_mut() {
                Some(proxy) => proxy.on_notify_event(&self.conn, &mut self.pasteboard, &e),
                None => Ok(()),
            },
            Event::Error(e) => {
                self.on_protocol_error(e.bad_value, e.error_kind);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn on_map_request(&mut self, id: Window) -> Result<()> {
        if self.screen.get(id).is_none() {
            return self.manage_window(id, false);
        }
        let env = window_env!(self);
        match self.screen.get_mut(id) {
            Some(window) if window.is_minimized() => window.do_uncollapse(&env, true),
            Some(window) => window.do_unhide(&env),
            None => Ok(()),
        }
    }

    fn on_unmap_notify(&mut self, id: Window) -> Result<()> {
        let Some(window) = self.screen.get_mut(id) else {
            return Ok(());
        };
        if window.ignore_unmaps > 0 {
            window.ignore_unmaps -= 1;
            trace!("Ignoring our own unmap of 0x{:x}", id);
            return Ok(());
        }
        self.unmanage(id, true)
    }

    fn on_configure_request(&mut self, e: &ConfigureRequestEvent) -> Result<()> {
        let env = window_env!(self);
        let Some(window) = self.screen.get_mut(e.window) else {
            debug!("Passing through ConfigureRequest for unmanaged 0x{:x}", e.window);
            return self.conn.send(Request::ConfigureWindow {
                window: e.window,
                rect: Rect::new(e.x.into(), e.y.into(), e.width.into(), e.height.into()),
            });
        };

        let tb = window.titlebar_height(&self.config);
        let mut target = window.latest_frame();
        if has_field(e.value_mask, ConfigWindow::X) {
            target.x = e.x.into();
        }
        if has_field(e.value_mask, ConfigWindow::Y) {
            target.y = e.y.into();
        }
        if has_field(e.value_mask, ConfigWindow::WIDTH) {
            target.width = e.width.into();
        }
        if has_field(e.value_mask, ConfigWindow::HEIGHT) {
            target.height = i32::from(e.height) + tb;
        }
        window.request_frame_change(&env, target, false)?;

        // Nothing moved: the client still expects an answer
        if window.pending_frame.is_none() {
            let frame = window.current_frame;
            self.conn.send(Request::SendConfigureNotify {
                window: e.window,
                rect: Rect::new(frame.x, frame.y + tb, frame.width, window.frame_height - tb),
            })?;
        }

        if has_field(e.value_mask, ConfigWindow::STACK_MODE) && e.stack_mode == StackMode::ABOVE {
            self.raise(e.window)?;
        }
        Ok(())
    }

    fn on_configure_notify(&mut self, e: &ConfigureNotifyEvent) -> Result<()> {
        let env = window_env!(self);
        let Some(id) = self.screen.find_window(e.window) else {
            return Ok(());
        };
        match self.screen.get_mut(id) {
            Some(window) if window.frame_id() == Some(e.window) => {
                window.on_configure_notify(&env, Rect::from(e))
            }
            _ => Ok(()),
        }
    }

    fn on_property_notify(&mut self, e: &PropertyNotifyEvent) -> Result<()> {
        let env = window_env!(self);
        let Some(window) = self.screen.get_mut(e.window) else {
            return Ok(());
        };
        if let PropertyChange::TransientFor(parent) = window.property_changed(&env, e.atom)? {
            debug!("Window 0x{:x} is now transient for {:?}", e.window, parent);
            self.screen.set_transient_for(e.window, parent);
        }
        Ok(())
    }

    fn on_client_message(&mut self, e: &ClientMessageEvent) -> Result<()> {
        let data = e.data.as_data32();
        let atoms = &self.atoms;

        if e.type_ == atoms.net_active_window {
            let time = if data[1] != 0 { data[1] } else { self.last_time };
            return self.activate_window(e.window, time);
        }

        let env = window_env!(self);
        let Some(window) = self.screen.get_mut(e.window) else {
            trace!("Client message {} for unmanaged 0x{:x}", e.type_, e.window);
            return Ok(());
        };

        if e.type_ == atoms.net_close_window {
            window.do_close(&env, data[0])
        } else if e.type_ == atoms.wm_change_state {
            if data[0] == ICONIC_STATE {
                window.do_collapse(&env)
            } else {
                Ok(())
            }
        } else if e.type_ == atoms.net_wm_state {
            let maximize = [atoms.net_wm_state_maximized_vert, atoms.net_wm_state_maximized_horz];
            window.do_net_wm_state_change(&env, data[0], data[1])?;
            // Both maximize atoms in one message are a single zoom
            let pair = maximize.contains(&data[1]) && maximize.contains(&data[2]);
            if data[2] != 0 && data[2] != data[1] && !pair {
                window.do_net_wm_state_change(&env, data[0], data[2])?;
            }
            Ok(())
        } else {
            trace!("Unhandled client message {} for 0x{:x}", e.type_, e.window);
            Ok(())
        }
    }

    fn on_button_press(&mut self, e: &ButtonPressEvent) -> Result<()> {
        let Some(id) = self.screen.find_window(e.event) else {
            return Ok(());
        };
        self.focus.update_user_time(e.time);

        // Passive grab on the client of an inactive window
        if e.event == id {
            self.raise_and_focus(id, e.time)?;
            return self.conn.send(Request::AllowEvents {
                replay: self.config.focus.click_through,
                time: e.time,
            });
        }
        if e.detail != 1 {
            return Ok(());
        }

        let point = Point::new(e.root_x.into(), e.root_y.into());
        let outcome = {
            let env = window_env!(self);
            let Some(window) = self.screen.get_mut(id) else {
                return Ok(());
            };
            let outcome = self.moveresize.button_press(&env, window, point, e.time);
            if outcome == PressOutcome::DoubleClick {
                if self.config.windows.shading {
                    window.do_toggle_shaded(&env, e.time)?;
                } else {
                    window.do_collapse(&env)?;
                }
            }
            outcome
        };

        match outcome {
            PressOutcome::Activate => self.raise_and_focus(id, e.time),
            PressOutcome::DoubleClick | PressOutcome::None => Ok(()),
        }
    }

    fn on_button_release(&mut self, e: &ButtonReleaseEvent) -> Result<()> {
        let Some(id) = self.moveresize.tracked_window() else {
            return Ok(());
        };
        let env = window_env!(self);
        let Some(window) = self.screen.get_mut(id) else {
            self.moveresize.cancel(id);
            return Ok(());
        };

        let point = Point::new(e.root_x.into(), e.root_y.into());
        match self.moveresize.button_release(&env, window, point) {
            Some(HitRegion::CloseBox) => window.do_close(&env, e.time),
            Some(HitRegion::CollapseBox) => window.do_collapse(&env),
            Some(HitRegion::ZoomBox) => window.do_zoom(&env),
            _ => Ok(()),
        }
    }

    fn on_motion(&mut self, e: &MotionNotifyEvent) -> Result<()> {
        let Some(id) = self.moveresize.tracked_window() else {
            return Ok(());
        };
        let env = window_env!(self);
        let Some(window) = self.screen.get_mut(id) else {
            return Ok(());
        };
        let point = Point::new(e.root_x.into(), e.root_y.into());
        self.moveresize.handle_motion(&env, window, point)
    }

    /// Enter/leave on a tracking window or, with focus-follows-mouse, a frame
    fn on_crossing(&mut self, event_window: Window, mode: NotifyMode, entered: bool) -> Result<()> {
        if mode != NotifyMode::NORMAL {
            return Ok(());
        }
        let Some(id) = self.screen.find_window(event_window) else {
            return Ok(());
        };
        let Some(window) = self.screen.get_mut(id) else {
            return Ok(());
        };
        let Some(frames) = window.frames else {
            return Ok(());
        };

        if event_window == frames.tracking {
            window.set_prelight(entered);
        } else if event_window == frames.frame
            && entered
            && self.focus.focus_policy == FocusPolicy::FocusFollowsMouse
            && self.focus.focused_window != Some(id)
        {
            let env = window_env!(self);
            self.focus.set_focus(&env, &mut self.screen, id, self.last_time, false)?;
        }
        Ok(())
    }

    fn on_shape_notify(&mut self, e: &shape::NotifyEvent) -> Result<()> {
        let id = e.affected_window;
        let empty = match self.screen.get(id) {
            Some(_) => self.conn.shape_is_empty(id)?,
            None => return Ok(()),
        };
        let Some(window) = self.screen.get_mut(id) else {
            return Ok(());
        };
        window.flags.set(WindowFlags::SHAPED, e.shaped);
        window.flags.set(WindowFlags::SHAPED_EMPTY, empty);
        debug!("Window 0x{:x} shape changed (shaped={}, empty={})", id, e.shaped, empty);

        if empty && self.focus.focused_window == Some(id) {
            let env = window_env!(self);
            self.focus.focus_next(&env, &mut self.screen, Some(id), self.last_time)?;
        }
        Ok(())
    }

    /// A request naming `bad_value` was refused by the server
    pub fn on_protocol_error(&mut self, bad_value: u32, kind: ErrorKind) {
        if let Some(window) = self
            .screen
            .find_window(bad_value)
            .and_then(|id| self.screen.get_mut(id))
        {
            window.abandon_pending();
        }
        match kind {
            ErrorKind::Window | ErrorKind::Drawable | ErrorKind::Match => {
                trace!("X error {:?} for 0x{:x}", kind, bad_value);
            }
            _ => warn!("X error {:?} for 0x{:x}", kind, bad_value),
        }
    }

    // ------------------------------------------------------------------
    // Host dispatch
    // ------------------------------------------------------------------

    pub fn handle_host_message(&mut self, message: HostMessage) -> Result<()> {
        match message {
            HostMessage::Dock { event } => self.handle_dock_event(event),
            HostMessage::DockGeometry { orientation, rect } => {
                debug!("Dock moved: {:?} {:?}", orientation, rect);
                let head = self.heads.head_for_rect(&rect);
                let env = window_env!(self);
                for id in self.screen.all_windows_on_head(&self.heads, &head) {
                    if let Some(window) = self.screen.get_mut(id) {
                        log_window_error(id, window.refit_zoom(&env));
                    }
                }
                Ok(())
            }
            HostMessage::Activation { active } => {
                let Some(proxy) = self.selection.as_mut() else {
                    return Ok(());
                };
                debug!("X session {}", if active { "activated" } else { "deactivated" });
                if active {
                    proxy.become_active(&self.conn, &self.pasteboard, self.last_time)
                } else {
                    proxy.become_inactive(&self.conn, self.last_time)
                }
            }
            HostMessage::Pasteboard { content } => {
                self.pasteboard.mirror_host(content);
                match self.selection.as_mut() {
                    Some(proxy) if proxy.is_active() => {
                        proxy.copy_to_x(&self.conn, &self.pasteboard, self.last_time)
                    }
                    _ => Ok(()),
                }
            }
            HostMessage::HideAll => {
                let env = window_env!(self);
                for id in self.screen.stacking().to_vec() {
                    if let Some(window) = self.screen.get_mut(id) {
                        window.do_hide(&env)?;
                    }
                }
                Ok(())
            }
            HostMessage::ShowAll => {
                let env = window_env!(self);
                for id in self.screen.stacking().to_vec() {
                    if let Some(window) = self.screen.get_mut(id) {
                        window.do_unhide(&env)?;
                    }
                }
                Ok(())
            }
            HostMessage::ForceQuit { window } => {
                let env = window_env!(self);
                match self.screen.find_by_native(window).and_then(|id| self.screen.get_mut(id)) {
                    Some(w) => {
                        info!("Force quitting window 0x{:x}", w.id);
                        w.force_close(&env)
                    }
                    None => {
                        debug!("Force quit for unknown native window {}", window);
                        Ok(())
                    }
                }
            }
        }
    }

    /// Dock events name windows by native id; a lookup miss is not an error.
    pub fn handle_dock_event(&mut self, event: DockEvent) -> Result<()> {
        debug!("Dock event: {:?}", event);
        let named = self.resolve_native(event.windows());

        match event {
            DockEvent::RestoreAllWindows => {
                let minimized: Vec<Window> = self
                    .screen
                    .stacking()
                    .iter()
                    .copied()
                    .filter(|&id| self.screen.get(id).is_some_and(|w| w.is_minimized()))
                    .collect();
                {
                    let env = window_env!(self);
                    for &id in &minimized {
                        if let Some(window) = self.screen.get_mut(id) {
                            log_window_error(id, window.do_uncollapse(&env, false));
                        }
                    }
                }
                match minimized.last() {
                    Some(&top) => self.raise_and_focus(top, self.last_time),
                    None => Ok(()),
                }
            }
            DockEvent::RestoreWindows { .. } => {
                let targets = self.targets_or_all(named);
                {
                    let env = window_env!(self);
                    for &id in &targets {
                        if let Some(window) = self.screen.get_mut(id) {
                            log_window_error(id, window.do_uncollapse(&env, false));
                        }
                    }
                }
                match targets.last() {
                    Some(&top) => self.raise_and_focus(top, self.last_time),
                    None => Ok(()),
                }
            }
            DockEvent::SelectWindows { .. } => {
                let targets = self.targets_or_all(named);
                for &id in &targets {
                    let minimized = self.screen.get(id).is_some_and(|w| w.is_minimized());
                    if minimized {
                        let env = window_env!(self);
                        if let Some(window) = self.screen.get_mut(id) {
                            log_window_error(id, window.do_uncollapse(&env, true));
                        }
                    } else {
                        self.raise(id)?;
                    }
                }
                match targets.iter().rev().find(|&&id| self.screen.get(id).is_some_and(|w| w.is_focusable())) {
                    Some(&top) => self.raise_and_focus(top, self.last_time),
                    None => Ok(()),
                }
            }
            DockEvent::RestoreCompleted { success, .. } => {
                for id in named {
                    let env = window_env!(self);
                    let Some(window) = self.screen.get_mut(id) else {
                        continue;
                    };
                    let restored = success && window.dock_op.is_some_and(|op| op.kind == DockOpKind::Restore);
                    match window.uncollapse_finished(&env, success) {
                        Ok(()) if restored => self.raise_and_focus(id, self.last_time)?,
                        Ok(()) => {}
                        Err(e) => log_window_error(id, Err(e)),
                    }
                }
                Ok(())
            }
            DockEvent::MinimizeCompleted { success, .. } => {
                for id in named {
                    let env = window_env!(self);
                    let Some(window) = self.screen.get_mut(id) else {
                        continue;
                    };
                    match window.collapse_finished(&env, success) {
                        Ok(()) if success && self.focus.focused_window == Some(id) => {
                            self.focus.forget(id);
                            self.focus.focus_next(&env, &mut self.screen, Some(id), self.last_time)?;
                        }
                        Ok(()) => {}
                        Err(e) => log_window_error(id, Err(e)),
                    }
                }
                Ok(())
            }
        }
    }

    /// Managed client ids for native ids, in stacking order
    fn resolve_native(&self, natives: &[NativeWindowId]) -> Vec<Window> {
        let ids: Vec<Window> = natives
            .iter()
            .filter_map(|&native| {
                let id = self.screen.find_by_native(native);
                if id.is_none() {
                    debug!("No window for native id {}", native);
                }
                id
            })
            .collect();
        self.screen.stacking_order(&ids)
    }

    fn targets_or_all(&self, named: Vec<Window>) -> Vec<Window> {
        if named.is_empty() {
            self.screen.stacking().to_vec()
        } else {
            named
        }
    }

    // ------------------------------------------------------------------
    // Registry operations
    // ------------------------------------------------------------------

    /// Frame and adopt a client. `initializing` is true for windows that
    /// were already on screen when the manager started.
    pub fn manage_window(&mut self, id: Window, initializing: bool) -> Result<()> {
        if self.screen.find_window(id).is_some()
            || id == self.check_window
            || self.selection.as_ref().is_some_and(|s| s.window() == id)
        {
            return Ok(());
        }
        let Some(info) = self.conn.window_info(id)? else {
            debug!("Window 0x{:x} vanished before it could be managed", id);
            return Ok(());
        };
        if info.override_redirect || (initializing && !info.mapped) {
            return Ok(());
        }

        let conn: &dyn XConn = &self.conn;
        let atoms = &self.atoms;
        let mut window = ManagedWindow::new(id, info.rect);
        window.title = HintsManager::read_title(conn, atoms, id)?;
        window.size_hints = HintsManager::read_size_hints(conn, atoms, id)?;
        window.wm_hints = HintsManager::read_wm_hints(conn, atoms, id)?;
        window.protocols = HintsManager::read_protocols(conn, atoms, id)?;
        window.window_type = HintsManager::read_window_type(conn, atoms, id)?;
        let transient_for = HintsManager::read_transient_for(conn, atoms, id)?
            .filter(|&parent| self.screen.get(parent).is_some());
        window.transient_for = transient_for;

        let decorated = window.window_type.is_decorated()
            && HintsManager::read_motif_decorations(conn, atoms, id)?;
        window.decor = match (decorated, window.window_type.uses_small_decor()) {
            (false, _) => DecorClass::None,
            (true, true) => DecorClass::Small,
            (true, false) => DecorClass::Large,
        };
        window.update_attrs(&self.config);
        if conn.shape_is_empty(id)? {
            window.flags.insert(WindowFlags::SHAPED | WindowFlags::SHAPED_EMPTY);
        }

        let tb = window.titlebar_height(&self.config);
        let client = info.rect;
        let size = Size::new(client.width, client.height + tb);
        let frame_rect = if initializing {
            Rect::new(client.x, client.y - tb, size.width, size.height)
        } else if window.size_hints.is_some_and(|h| h.has_position()) {
            Rect::new(client.x, client.y, size.width, size.height)
        } else if let Some(parent) = transient_for.and_then(|p| self.screen.get(p)) {
            let c = parent.current_frame.center();
            Rect::new(c.x - size.width / 2, c.y - size.height / 2, size.width, size.height)
        } else {
            self.heads.center_on_main(size)
        };

        {
            let env = window_env!(self);
            window.reparent_in(&env, frame_rect, info.mapped)?;
            window.show(&env)?;
            if window.wm_hints.is_some_and(|h| h.starts_iconic()) {
                log_window_error(id, window.do_collapse(&env));
            }
            window.update_net_wm_state(&env)?;
        }

        info!(
            "Managing window 0x{:x} {:?} at {:?} ({:?})",
            id, window.title, window.current_frame, window.decor
        );
        let focusable = window.is_focusable();
        self.screen.insert(window);
        self.screen.set_transient_for(id, transient_for);
        self.client_list.push(id);
        self.empty_since = None;
        self.update_client_list()?;

        if self.focus.focus_new && !initializing && focusable {
            let env = window_env!(self);
            self.focus.set_focus(&env, &mut self.screen, id, self.last_time, false)?;
        }
        Ok(())
    }

    /// Drop a client; `alive` is false when it was destroyed
    pub fn unmanage(&mut self, id: Window, alive: bool) -> Result<()> {
        let Some(mut window) = self.screen.remove(id) else {
            return Ok(());
        };
        info!("Unmanaging window 0x{:x} (alive={})", id, alive);
        self.moveresize.cancel(id);
        self.client_list.retain(|&w| w != id);

        let env = window_env!(self);
        window.forget_in_dock(&env);
        if alive {
            window.set_wm_state(&env, WITHDRAWN_STATE)?;
        }
        window.reparent_out(&env, alive)?;

        let was_focused = self.focus.focused_window == Some(id);
        self.focus.forget(id);
        if was_focused {
            self.focus.focus_next(&env, &mut self.screen, Some(id), self.last_time)?;
        }

        if self.screen.is_empty() {
            self.empty_since = Some(Instant::now());
        }
        self.update_client_list()
    }

    /// Uncollapse a minimized window, else raise and focus it
    pub fn activate_window(&mut self, id: Window, time: Timestamp) -> Result<()> {
        let minimized = match self.screen.get(id) {
            Some(window) => window.is_minimized(),
            None => return Ok(()),
        };
        if !minimized {
            return self.raise_and_focus(id, time);
        }
        let env = window_env!(self);
        match self.screen.get_mut(id) {
            Some(window) => window.do_uncollapse(&env, true),
            None => Ok(()),
        }
    }

    /// Raise with transients, emitting the restack requests
    fn raise(&mut self, id: Window) -> Result<()> {
        let group = self.screen.raise_window(id);
        for request in self.screen.restack_requests(&group) {
            self.conn.send(request)?;
        }
        Ok(())
    }

    /// Explicit activation: focus is forced past a client's input hint
    pub fn raise_and_focus(&mut self, id: Window, time: Timestamp) -> Result<()> {
        self.raise(id)?;
        let env = window_env!(self);
        self.focus.set_focus(&env, &mut self.screen, id, time, true)?;
        self.update_client_list()
    }

    fn update_client_list(&self) -> Result<()> {
        let root = self.conn.root();
        self.conn.send(Request::ChangeProperty {
            window: root,
            property: self.atoms.net_client_list,
            type_: AtomEnum::WINDOW.into(),
            data: PropertyData::Card32(self.client_list.clone()),
        })?;
        self.conn.send(Request::ChangeProperty {
            window: root,
            property: self.atoms.net_client_list_stacking,
            type_: AtomEnum::WINDOW.into(),
            data: PropertyData::Card32(self.screen.stacking().to_vec()),
        })
    }

    // ------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------

    /// Auto-quit: no windows for longer than the configured timeout
    pub fn should_quit(&self, now: Instant) -> bool {
        let session = &self.config.session;
        session.auto_quit
            && self.screen.is_empty()
            && self
                .empty_since
                .is_some_and(|since| now.saturating_duration_since(since) >= session.auto_quit_timeout())
    }

    /// Give every client back to the root and release what we own
    pub fn teardown(&mut self) -> Result<()> {
        info!("Tearing down, releasing {} window(s)", self.client_list.len());
        {
            let env = window_env!(self);
            for id in self.screen.stacking().to_vec() {
                let Some(mut window) = self.screen.remove(id) else {
                    continue;
                };
                window.forget_in_dock(&env);
                if let Err(e) = window.reparent_out(&env, true) {
                    warn!("Failed to release window 0x{:x}: {:#}", id, e);
                }
            }
        }
        self.client_list.clear();

        if let Some(mut proxy) = self.selection.take() {
            proxy.shutdown(&self.conn, self.last_time)?;
        }
        let root = self.conn.root();
        for property in [self.atoms.net_supporting_wm_check, self.atoms.net_active_window] {
            self.conn.send(Request::DeleteProperty { window: root, property })?;
        }
        self.conn.send(Request::DestroyWindow(self.check_window))?;
        self.conn.flush()
    }
}

fn has_field(mask: ConfigWindow, field: ConfigWindow) -> bool {
    u16::from(mask) & u16::from(field) != 0
}

fn log_window_error(id: Window, result: Result<()>) {
    if let Err(e) = result {
        warn!("Window 0x{:x}: {:#}", id, e);
    }
}

/// Server time carried by an event, if any
fn event_time(event: &Event) -> Option<Timestamp> {
    let time = match event {
        Event::ButtonPress(e) => e.time,
        Event::ButtonRelease(e) => e.time,
        Event::MotionNotify(e) => e.time,
        Event::EnterNotify(e) => e.time,
        Event::LeaveNotify(e) => e.time,
        Event::PropertyNotify(e) => e.time,
        Event::SelectionClear(e) => e.time,
        Event::SelectionRequest(e) => e.time,
        Event::SelectionNotify(e) => e.time,
        _ => return None,
    };
    (time != x11rb::CURRENT_TIME).then_some(time)
}
