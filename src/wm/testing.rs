//! Recording fakes for the display connection and the dock

use anyhow::Result;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use x11rb::protocol::xproto::{Atom, Window};

use crate::config::Config;
use crate::host::dock::{DockBridge, DockError, DockOrientation, NativeWindowId};
use crate::shared::Rect;
use crate::wm::atoms::Atoms;
use crate::wm::client_flags::{FrameAttr, WindowFlags, WmProtocols};
use crate::wm::frame::FrameWindows;
use crate::wm::screen::Heads;
use crate::wm::window::{ManagedWindow, WindowEnv};
use crate::wm::xconn::{ClientInfo, Property, Request, WindowSpec, XConn};

pub const ROOT: Window = 0x100;

/// Atoms numbered from 1 in declaration order
pub fn test_atoms() -> Atoms {
    let mut next = 0;
    Atoms::intern_with(|_| {
        next += 1;
        Ok(next)
    })
    .unwrap()
}

/// A framed, mapped, decorated window without any round trips
pub fn managed(id: Window, frame: Rect) -> ManagedWindow {
    let mut window = ManagedWindow::new(id, frame);
    window.frames = Some(FrameWindows {
        frame: id + 0x1000,
        tracking: id + 0x2000,
        growbox: id + 0x3000,
    });
    window.flags = WindowFlags::MAPPED | WindowFlags::REPARENTED;
    window.protocols = WmProtocols::DELETE_WINDOW;
    window.attrs = FrameAttr::TITLE
        | FrameAttr::CLOSE_BOX
        | FrameAttr::COLLAPSE_BOX
        | FrameAttr::ZOOM_BOX
        | FrameAttr::GROW_BOX;
    window.native_id = Some(id + 0x5000);
    window
}

/// Records every request; canned replies for round trips
#[derive(Default)]
pub struct RecordingConn {
    next_id: Cell<Window>,
    requests: RefCell<Vec<Request>>,
    created: RefCell<Vec<WindowSpec>>,
    properties: RefCell<HashMap<(Window, Atom), Property>>,
    infos: RefCell<HashMap<Window, ClientInfo>>,
    children: RefCell<Vec<Window>>,
    empty_shapes: RefCell<HashSet<Window>>,
}

impl RecordingConn {
    pub fn new() -> Self {
        Self { next_id: Cell::new(0x40_0000), ..Self::default() }
    }

    pub fn take_requests(&self) -> Vec<Request> {
        self.requests.take()
    }

    pub fn created(&self) -> Vec<WindowSpec> {
        self.created.borrow().clone()
    }

    pub fn set_property(&self, window: Window, atom: Atom, property: Property) {
        self.properties.borrow_mut().insert((window, atom), property);
    }

    pub fn add_client(&self, window: Window, info: ClientInfo) {
        self.infos.borrow_mut().insert(window, info);
        self.children.borrow_mut().push(window);
    }

    pub fn set_shape_empty(&self, window: Window) {
        self.empty_shapes.borrow_mut().insert(window);
    }
}

impl XConn for RecordingConn {
    fn root(&self) -> Window {
        ROOT
    }

    fn create_window(&self, spec: &WindowSpec) -> Result<Window> {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        self.created.borrow_mut().push(*spec);
        Ok(id)
    }

    fn send(&self, request: Request) -> Result<()> {
        self.requests.borrow_mut().push(request);
        Ok(())
    }

    fn get_property(&self, window: Window, property: Atom, delete: bool) -> Result<Option<Property>> {
        let mut properties = self.properties.borrow_mut();
        Ok(if delete {
            properties.remove(&(window, property))
        } else {
            properties.get(&(window, property)).cloned()
        })
    }

    fn window_info(&self, window: Window) -> Result<Option<ClientInfo>> {
        Ok(self.infos.borrow().get(&window).copied())
    }

    fn children(&self) -> Result<Vec<Window>> {
        Ok(self.children.borrow().clone())
    }

    fn shape_is_empty(&self, window: Window) -> Result<bool> {
        Ok(self.empty_shapes.borrow().contains(&window))
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DockCall {
    Minimize(NativeWindowId, String),
    Restore(NativeWindowId),
    Remove(NativeWindowId),
    DragBegin(NativeWindowId),
    DragEnd(NativeWindowId),
}

#[derive(Default)]
struct DockLog {
    calls: RefCell<Vec<DockCall>>,
    failure: Cell<Option<fn() -> DockError>>,
    rect: Cell<Rect>,
    visible: RefCell<Vec<NativeWindowId>>,
}

/// Dock that records calls; clones share one log
#[derive(Clone, Default)]
pub struct RecordingDock {
    log: Rc<DockLog>,
}

impl RecordingDock {
    pub fn calls(&self) -> Vec<DockCall> {
        self.log.calls.borrow().clone()
    }

    pub fn fail_with(&self, error: DockError) {
        let make: fn() -> DockError = match error {
            DockError::Unavailable => || DockError::Unavailable,
            DockError::Disconnected => || DockError::Disconnected,
            DockError::InvalidWindow(_) => || DockError::InvalidWindow(0),
        };
        self.log.failure.set(Some(make));
    }

    /// Report `window` as already shown by the host
    pub fn set_visible(&self, window: NativeWindowId) {
        self.log.visible.borrow_mut().push(window);
    }

    pub fn set_rect(&self, rect: Rect) {
        self.log.rect.set(rect);
    }

    fn record(&self, call: DockCall) -> Result<(), DockError> {
        if let Some(make) = self.log.failure.get() {
            return Err(make());
        }
        self.log.calls.borrow_mut().push(call);
        Ok(())
    }
}

impl DockBridge for RecordingDock {
    fn is_available(&self) -> bool {
        self.log.failure.get().is_none()
    }

    fn minimize(&self, window: NativeWindowId, title: &str) -> Result<(), DockError> {
        self.record(DockCall::Minimize(window, title.to_string()))
    }

    fn restore(&self, window: NativeWindowId) -> Result<(), DockError> {
        self.record(DockCall::Restore(window))
    }

    fn remove(&self, window: NativeWindowId) -> Result<(), DockError> {
        self.record(DockCall::Remove(window))
    }

    fn drag_begin(&self, window: NativeWindowId) -> Result<(), DockError> {
        self.record(DockCall::DragBegin(window))
    }

    fn drag_end(&self, window: NativeWindowId) -> Result<(), DockError> {
        self.record(DockCall::DragEnd(window))
    }

    fn is_window_visible(&self, window: NativeWindowId) -> Result<bool, DockError> {
        Ok(self.log.visible.borrow().contains(&window))
    }

    fn orientation(&self) -> DockOrientation {
        DockOrientation::Bottom
    }

    fn dock_rect(&self) -> Rect {
        self.log.rect.get()
    }
}

/// Everything a [`WindowEnv`] borrows, on a single 1920x1080 head
pub struct TestEnv {
    pub conn: RecordingConn,
    pub atoms: Atoms,
    pub config: Config,
    pub heads: Heads,
    pub dock: RecordingDock,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            conn: RecordingConn::new(),
            atoms: test_atoms(),
            config: Config::default(),
            heads: Heads::new(vec![Rect::new(0, 0, 1920, 1080)], 0),
            dock: RecordingDock::default(),
        }
    }

    pub fn env(&self) -> WindowEnv<'_> {
        WindowEnv {
            conn: &self.conn,
            atoms: &self.atoms,
            config: &self.config,
            heads: &self.heads,
            dock: &self.dock,
        }
    }
}
