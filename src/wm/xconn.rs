//! Display protocol session
//!
//! Everything the window manager asks of the X server goes through the
//! [`XConn`] trait: requests are plain [`Request`] values sent without waiting
//! for a reply, and the few round trips (properties, attributes, the window
//! tree) are explicit methods. [`X11Conn`] is the x11rb implementation.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use x11rb::connection::Connection;
use x11rb::errors::ReplyError;
use x11rb::protocol::randr::ConnectionExt as _;
use x11rb::protocol::shape::{self, ConnectionExt as _};
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;
use x11rb::{CURRENT_TIME, NONE};

use crate::shared::Rect;
use crate::wm::screen::Heads;

/// Parameters for a window the manager creates itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSpec {
    pub parent: Window,
    pub rect: Rect,
    pub input_only: bool,
    pub event_mask: EventMask,
    pub override_redirect: bool,
    pub background_pixel: Option<u32>,
}

/// Property payload written by [`Request::ChangeProperty`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyData {
    /// Format 32 (atoms, windows, cardinals)
    Card32(Vec<u32>),
    /// Format 8
    Bytes(Vec<u8>),
}

/// A property as read back from the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub type_: Atom,
    pub format: u8,
    pub value: Vec<u8>,
}

impl Property {
    pub fn from_u32s(type_: Atom, values: &[u32]) -> Self {
        Self {
            type_,
            format: 32,
            value: values.iter().flat_map(|v| v.to_ne_bytes()).collect(),
        }
    }

    pub fn from_bytes(type_: Atom, value: &[u8]) -> Self {
        Self { type_, format: 8, value: value.to_vec() }
    }

    /// 32-bit items, empty unless the property has format 32
    pub fn value32(&self) -> Vec<u32> {
        if self.format != 32 {
            return Vec::new();
        }
        self.value
            .chunks_exact(4)
            .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    pub fn as_string(&self) -> String {
        let end = self.value.iter().position(|&b| b == 0).unwrap_or(self.value.len());
        String::from_utf8_lossy(&self.value[..end]).into_owned()
    }
}

/// Attributes of an existing client window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientInfo {
    pub rect: Rect,
    pub override_redirect: bool,
    pub mapped: bool,
}

/// Requests the window manager emits; none of them wait for a reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    ConfigureWindow { window: Window, rect: Rect },
    Restack { window: Window, sibling: Option<Window>, mode: StackMode },
    MapWindow(Window),
    UnmapWindow(Window),
    DestroyWindow(Window),
    KillClient(Window),
    ReparentWindow { window: Window, parent: Window, x: i32, y: i32 },
    AddToSaveSet(Window),
    RemoveFromSaveSet(Window),
    SelectInput { window: Window, mask: EventMask },
    SelectShapeInput(Window),
    SetBackground { window: Window, pixel: u32 },
    SetInputFocus { window: Window, time: Timestamp },
    /// Passive button grab so clicks on an inactive client reach us first
    GrabButton(Window),
    UngrabButton(Window),
    /// Release a frozen pointer; `replay` passes the click on to the client
    AllowEvents { replay: bool, time: Timestamp },
    SendClientMessage { window: Window, message_type: Atom, data: [u32; 5] },
    SendConfigureNotify { window: Window, rect: Rect },
    ChangeProperty { window: Window, property: Atom, type_: Atom, data: PropertyData },
    DeleteProperty { window: Window, property: Atom },
    ConvertSelection {
        requestor: Window,
        selection: Atom,
        target: Atom,
        property: Atom,
        time: Timestamp,
    },
    SetSelectionOwner { owner: Window, selection: Atom, time: Timestamp },
    SendSelectionNotify {
        requestor: Window,
        selection: Atom,
        target: Atom,
        property: Atom,
        time: Timestamp,
    },
}

pub trait XConn {
    fn root(&self) -> Window;
    fn create_window(&self, spec: &WindowSpec) -> Result<Window>;
    fn send(&self, request: Request) -> Result<()>;
    /// `None` when the property is not set
    fn get_property(&self, window: Window, property: Atom, delete: bool) -> Result<Option<Property>>;
    /// `None` when the window no longer exists
    fn window_info(&self, window: Window) -> Result<Option<ClientInfo>>;
    /// Root children, bottom to top
    fn children(&self) -> Result<Vec<Window>>;
    /// True when the bounding shape has no rectangles
    fn shape_is_empty(&self, window: Window) -> Result<bool>;
    fn flush(&self) -> Result<()>;
}

/// x11rb-backed session
pub struct X11Conn {
    conn: Arc<RustConnection>,
    screen_num: usize,
    root: Window,
}

impl X11Conn {
    pub fn connect() -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None).context("Failed to connect to X server")?;
        let root = conn.setup().roots[screen_num].root;
        info!("Connected to X server (screen {}, root 0x{:x})", screen_num, root);
        Ok(Self { conn: Arc::new(conn), screen_num, root })
    }

    pub fn connection(&self) -> Arc<RustConnection> {
        self.conn.clone()
    }

    /// Take the WM_Sn manager selection and substructure redirect on the root.
    ///
    /// Returns the owner window, which doubles as the _NET_SUPPORTING_WM_CHECK
    /// window.
    pub fn become_wm(&self, replace: bool) -> Result<Window> {
        let conn = self.conn.as_ref();
        let screen = &conn.setup().roots[self.screen_num];

        let wm_selection_name = format!("WM_S{}", self.screen_num);
        let wm_selection = conn
            .intern_atom(false, wm_selection_name.as_bytes())?
            .reply()
            .context("Failed to intern WM selection atom")?
            .atom;

        let current_owner = conn
            .get_selection_owner(wm_selection)?
            .reply()
            .context("Failed to get current WM selection owner")?
            .owner;

        if current_owner != NONE {
            if !replace {
                anyhow::bail!(
                    "Another window manager is already running (window 0x{:x}). \
                    Use --replace to attempt to replace it.",
                    current_owner
                );
            }
            info!("Existing WM detected (window 0x{:x}), attempting replace...", current_owner);
            conn.change_window_attributes(
                current_owner,
                &ChangeWindowAttributesAux::new().event_mask(EventMask::STRUCTURE_NOTIFY),
            )?;
        }

        let owner = conn.generate_id()?;
        conn.create_window(
            screen.root_depth,
            owner,
            self.root,
            -1000,
            -1000,
            1,
            1,
            0,
            WindowClass::INPUT_OUTPUT,
            0,
            &CreateWindowAux::new().override_redirect(1),
        )?;
        conn.set_selection_owner(owner, wm_selection, CURRENT_TIME)?
            .check()
            .context("Failed to set WM selection owner")?;

        if current_owner != NONE {
            info!("Waiting for previous WM to exit...");
            let timeout = Duration::from_secs(15);
            let start = Instant::now();
            loop {
                if conn.get_window_attributes(current_owner)?.reply().is_err() {
                    info!("Previous WM exited");
                    break;
                }
                if start.elapsed() >= timeout {
                    warn!("Timeout waiting for previous WM to exit, proceeding anyway");
                    break;
                }
                std::thread::sleep(Duration::from_millis(100));
            }
        }

        let mask = EventMask::SUBSTRUCTURE_REDIRECT
            | EventMask::SUBSTRUCTURE_NOTIFY
            | EventMask::PROPERTY_CHANGE
            | EventMask::FOCUS_CHANGE;
        conn.change_window_attributes(self.root, &ChangeWindowAttributesAux::new().event_mask(mask))?
            .check()
            .context("Failed to select events on root window - is another WM running?")?;

        conn.change_property8(PropMode::REPLACE, owner, AtomEnum::WM_NAME, AtomEnum::STRING, b"rootless-wm")?;
        conn.flush()?;

        info!("Successfully became window manager");
        Ok(owner)
    }

    /// Heads from RandR monitors, falling back to the root window size
    pub fn query_heads(&self) -> Result<Heads> {
        let conn = self.conn.as_ref();
        let screen = &conn.setup().roots[self.screen_num];
        let fallback = Rect::new(0, 0, screen.width_in_pixels as i32, screen.height_in_pixels as i32);

        let monitors = match conn.randr_get_monitors(self.root, true)?.reply() {
            Ok(reply) => reply.monitors,
            Err(e) => {
                warn!("RandR monitors unavailable ({}), using root geometry", e);
                return Ok(Heads::new(vec![fallback], 0));
            }
        };
        if monitors.is_empty() {
            return Ok(Heads::new(vec![fallback], 0));
        }

        let main = monitors.iter().position(|m| m.primary).unwrap_or(0);
        let rects = monitors
            .iter()
            .map(|m| Rect::new(m.x as i32, m.y as i32, m.width as i32, m.height as i32))
            .collect();
        debug!("Detected {} heads (main {})", monitors.len(), main);
        Ok(Heads::new(rects, main))
    }
}

/// X errors in a reply become `None`; connection failures propagate
fn x_reply<T>(reply: Result<T, ReplyError>) -> Result<Option<T>> {
    match reply {
        Ok(r) => Ok(Some(r)),
        Err(ReplyError::X11Error(e)) => {
            debug!("X error in reply: {:?}", e.error_kind);
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

impl XConn for X11Conn {
    fn root(&self) -> Window {
        self.root
    }

    fn create_window(&self, spec: &WindowSpec) -> Result<Window> {
        let conn = self.conn.as_ref();
        let id = conn.generate_id()?;
        let class = if spec.input_only { WindowClass::INPUT_ONLY } else { WindowClass::INPUT_OUTPUT };

        let mut aux = CreateWindowAux::new()
            .event_mask(spec.event_mask)
            .override_redirect(u32::from(spec.override_redirect));
        if let (Some(pixel), false) = (spec.background_pixel, spec.input_only) {
            aux = aux.background_pixel(pixel);
        }

        conn.create_window(
            x11rb::COPY_DEPTH_FROM_PARENT,
            id,
            spec.parent,
            spec.rect.x as i16,
            spec.rect.y as i16,
            spec.rect.width.max(1) as u16,
            spec.rect.height.max(1) as u16,
            0,
            class,
            x11rb::COPY_FROM_PARENT,
            &aux,
        )?;
        Ok(id)
    }

    fn send(&self, request: Request) -> Result<()> {
        let conn = self.conn.as_ref();
        match request {
            Request::ConfigureWindow { window, rect } => {
                conn.configure_window(
                    window,
                    &ConfigureWindowAux::new()
                        .x(rect.x)
                        .y(rect.y)
                        .width(rect.width.max(1) as u32)
                        .height(rect.height.max(1) as u32),
                )?;
            }
            Request::Restack { window, sibling, mode } => {
                let mut aux = ConfigureWindowAux::new().stack_mode(mode);
                if let Some(sibling) = sibling {
                    aux = aux.sibling(sibling);
                }
                conn.configure_window(window, &aux)?;
            }
            Request::MapWindow(window) => {
                conn.map_window(window)?;
            }
            Request::UnmapWindow(window) => {
                conn.unmap_window(window)?;
            }
            Request::DestroyWindow(window) => {
                conn.destroy_window(window)?;
            }
            Request::KillClient(window) => {
                conn.kill_client(window)?;
            }
            Request::ReparentWindow { window, parent, x, y } => {
                conn.reparent_window(window, parent, x as i16, y as i16)?;
            }
            Request::AddToSaveSet(window) => {
                conn.change_save_set(SetMode::INSERT, window)?;
            }
            Request::RemoveFromSaveSet(window) => {
                conn.change_save_set(SetMode::DELETE, window)?;
            }
            Request::SelectInput { window, mask } => {
                conn.change_window_attributes(window, &ChangeWindowAttributesAux::new().event_mask(mask))?;
            }
            Request::SelectShapeInput(window) => {
                conn.shape_select_input(window, true)?;
            }
            Request::SetBackground { window, pixel } => {
                conn.change_window_attributes(window, &ChangeWindowAttributesAux::new().background_pixel(pixel))?;
                conn.clear_area(false, window, 0, 0, 0, 0)?;
            }
            Request::SetInputFocus { window, time } => {
                conn.set_input_focus(InputFocus::POINTER_ROOT, window, time)?;
            }
            Request::GrabButton(window) => {
                conn.grab_button(
                    false,
                    window,
                    EventMask::BUTTON_PRESS,
                    GrabMode::SYNC,
                    GrabMode::ASYNC,
                    NONE,
                    NONE,
                    ButtonIndex::ANY,
                    ModMask::ANY,
                )?;
            }
            Request::UngrabButton(window) => {
                conn.ungrab_button(ButtonIndex::ANY, window, ModMask::ANY)?;
            }
            Request::AllowEvents { replay, time } => {
                let mode = if replay { Allow::REPLAY_POINTER } else { Allow::ASYNC_POINTER };
                conn.allow_events(mode, time)?;
            }
            Request::SendClientMessage { window, message_type, data } => {
                let event = ClientMessageEvent::new(32, window, message_type, data);
                conn.send_event(false, window, EventMask::NO_EVENT, event)?;
            }
            Request::SendConfigureNotify { window, rect } => {
                let event = ConfigureNotifyEvent {
                    response_type: CONFIGURE_NOTIFY_EVENT,
                    sequence: 0,
                    event: window,
                    window,
                    above_sibling: NONE,
                    x: rect.x as i16,
                    y: rect.y as i16,
                    width: rect.width.max(1) as u16,
                    height: rect.height.max(1) as u16,
                    border_width: 0,
                    override_redirect: false,
                };
                conn.send_event(false, window, EventMask::STRUCTURE_NOTIFY, event)?;
            }
            Request::ChangeProperty { window, property, type_, data } => match data {
                PropertyData::Card32(values) => {
                    conn.change_property32(PropMode::REPLACE, window, property, type_, &values)?;
                }
                PropertyData::Bytes(bytes) => {
                    conn.change_property8(PropMode::REPLACE, window, property, type_, &bytes)?;
                }
            },
            Request::DeleteProperty { window, property } => {
                conn.delete_property(window, property)?;
            }
            Request::ConvertSelection { requestor, selection, target, property, time } => {
                conn.convert_selection(requestor, selection, target, property, time)?;
            }
            Request::SetSelectionOwner { owner, selection, time } => {
                conn.set_selection_owner(owner, selection, time)?;
            }
            Request::SendSelectionNotify { requestor, selection, target, property, time } => {
                let event = SelectionNotifyEvent {
                    response_type: SELECTION_NOTIFY_EVENT,
                    sequence: 0,
                    time,
                    requestor,
                    selection,
                    target,
                    property,
                };
                conn.send_event(false, requestor, EventMask::NO_EVENT, event)?;
            }
        }
        Ok(())
    }

    fn get_property(&self, window: Window, property: Atom, delete: bool) -> Result<Option<Property>> {
        let cookie = self.conn.get_property(delete, window, property, AtomEnum::ANY, 0, u32::MAX / 4)?;
        Ok(x_reply(cookie.reply())?.and_then(|reply| {
            (reply.type_ != NONE).then(|| Property {
                type_: reply.type_,
                format: reply.format,
                value: reply.value,
            })
        }))
    }

    fn window_info(&self, window: Window) -> Result<Option<ClientInfo>> {
        let attrs = self.conn.get_window_attributes(window)?;
        let geometry = self.conn.get_geometry(window)?;
        let (Some(attrs), Some(geometry)) = (x_reply(attrs.reply())?, x_reply(geometry.reply())?) else {
            return Ok(None);
        };
        Ok(Some(ClientInfo {
            rect: Rect::new(
                geometry.x as i32,
                geometry.y as i32,
                geometry.width as i32,
                geometry.height as i32,
            ),
            override_redirect: attrs.override_redirect,
            mapped: attrs.map_state != MapState::UNMAPPED,
        }))
    }

    fn children(&self) -> Result<Vec<Window>> {
        Ok(self.conn.query_tree(self.root)?.reply()?.children)
    }

    fn shape_is_empty(&self, window: Window) -> Result<bool> {
        let cookie = self.conn.shape_get_rectangles(window, shape::SK::BOUNDING)?;
        Ok(x_reply(cookie.reply())?.is_some_and(|r| r.rectangles.is_empty()))
    }

    fn flush(&self) -> Result<()> {
        self.conn.flush()?;
        Ok(())
    }
}
