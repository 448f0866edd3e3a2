//! MoveResize Module
//!
//! Interactive titlebar drags, growbox resizes and box-control clicks. Every
//! pointer position becomes a `request_frame_change(from_user = true)`, so a
//! fast drag coalesces into one outstanding configure at a time. Frames
//! select button events, which gives us the implicit pointer grab.

use anyhow::Result;
use tracing::debug;
use x11rb::protocol::xproto::{Timestamp, Window};

use crate::config::WindowsConfig;
use crate::shared::{Point, Rect};
use crate::wm::client_flags::FrameAttr;
use crate::wm::frame::HitRegion;
use crate::wm::window::{ManagedWindow, WindowEnv};

/// Move/resize operation type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveResizeOperation {
    /// Titlebar drag
    Move,
    /// Growbox drag, bottom-right corner
    Resize,
}

/// Move/resize operation state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveResizeState {
    pub window: Window,
    /// Press position (root coordinates)
    pub start: Point,
    pub start_frame: Rect,
    pub operation: MoveResizeOperation,
    /// The pointer moved past the drag threshold
    pub dragging: bool,
}

/// What a button press asks of the window manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressOutcome {
    /// Nothing beyond local tracking
    None,
    /// Focus and raise the window
    Activate,
    /// Second titlebar click within the double-click interval
    DoubleClick,
}

/// Move/resize manager
pub struct MoveResizeManager {
    pub state: Option<MoveResizeState>,
    /// Box control pressed, fires on release inside the same box
    pub armed: Option<(Window, HitRegion)>,
    last_click: Option<(Window, Timestamp)>,
    drag_threshold: i32,
    double_click_ms: u32,
}

impl MoveResizeManager {
    pub fn new(config: &WindowsConfig) -> Self {
        Self {
            state: None,
            armed: None,
            last_click: None,
            drag_threshold: config.drag_threshold,
            double_click_ms: config.double_click_ms,
        }
    }

    /// Window the current gesture belongs to
    pub fn tracked_window(&self) -> Option<Window> {
        self.state.map(|s| s.window).or(self.armed.map(|(w, _)| w))
    }

    pub fn button_press(
        &mut self,
        env: &WindowEnv,
        window: &mut ManagedWindow,
        point: Point,
        time: Timestamp,
    ) -> PressOutcome {
        if window.is_closing() {
            return PressOutcome::None;
        }

        let region = window.hit_test_frame(env.config, point);
        match region {
            HitRegion::Titlebar => {
                if self.is_double_click(window.id, time) {
                    self.last_click = None;
                    return PressOutcome::DoubleClick;
                }
                self.last_click = Some((window.id, time));
                self.start(window, point, MoveResizeOperation::Move);
                PressOutcome::Activate
            }
            HitRegion::Growbox => {
                self.start(window, point, MoveResizeOperation::Resize);
                PressOutcome::Activate
            }
            HitRegion::CloseBox | HitRegion::CollapseBox | HitRegion::ZoomBox => {
                self.armed = Some((window.id, region));
                set_clicked(window, region, true);
                PressOutcome::None
            }
            HitRegion::Client => PressOutcome::Activate,
            HitRegion::None => PressOutcome::None,
        }
    }

    fn is_double_click(&self, id: Window, time: Timestamp) -> bool {
        self.last_click
            .is_some_and(|(w, t)| w == id && time.wrapping_sub(t) <= self.double_click_ms)
    }

    fn start(&mut self, window: &ManagedWindow, point: Point, operation: MoveResizeOperation) {
        debug!("Starting {:?} for window 0x{:x}", operation, window.id);
        self.state = Some(MoveResizeState {
            window: window.id,
            start: point,
            start_frame: window.latest_frame(),
            operation,
            dragging: false,
        });
    }

    /// Handle motion during move/resize
    pub fn handle_motion(&mut self, env: &WindowEnv, window: &mut ManagedWindow, point: Point) -> Result<()> {
        if let Some((id, region)) = self.armed {
            if id == window.id {
                let inside = window.hit_test_frame(env.config, point) == region;
                set_clicked(window, region, inside);
            }
            return Ok(());
        }

        let Some(state) = self.state.as_mut().filter(|s| s.window == window.id) else {
            return Ok(());
        };
        let dx = point.x - state.start.x;
        let dy = point.y - state.start.y;

        if !state.dragging {
            if dx.abs().max(dy.abs()) < self.drag_threshold {
                return Ok(());
            }
            state.dragging = true;
            if state.operation == MoveResizeOperation::Move {
                if let Some(native) = window.native_id {
                    if let Err(e) = env.dock.drag_begin(native) {
                        debug!("Dock drag_begin failed: {}", e);
                    }
                }
            }
        }

        let start = state.start_frame;
        let target = match state.operation {
            MoveResizeOperation::Move => start.translate(dx, dy),
            MoveResizeOperation::Resize => Rect::new(start.x, start.y, start.width + dx, start.height + dy),
        };
        window.request_frame_change(env, target, true)
    }

    /// End the gesture; returns the box control clicked, if any
    pub fn button_release(
        &mut self,
        env: &WindowEnv,
        window: &mut ManagedWindow,
        point: Point,
    ) -> Option<HitRegion> {
        if let Some(state) = self.state.take() {
            if state.operation == MoveResizeOperation::Move && state.dragging {
                if let Some(native) = window.native_id {
                    if let Err(e) = env.dock.drag_end(native) {
                        debug!("Dock drag_end failed: {}", e);
                    }
                }
            }
            debug!("Finished {:?} for window 0x{:x}", state.operation, state.window);
            return None;
        }

        let (id, region) = self.armed.take()?;
        if id != window.id {
            return None;
        }
        set_clicked(window, region, false);
        (window.hit_test_frame(env.config, point) == region).then_some(region)
    }

    /// Forget a gesture on a window that went away
    pub fn cancel(&mut self, id: Window) {
        if self.state.is_some_and(|s| s.window == id) {
            self.state = None;
        }
        if self.armed.is_some_and(|(w, _)| w == id) {
            self.armed = None;
        }
    }
}

fn set_clicked(window: &mut ManagedWindow, region: HitRegion, on: bool) {
    let attr = match region {
        HitRegion::CloseBox => FrameAttr::CLOSE_CLICKED,
        HitRegion::CollapseBox => FrameAttr::COLLAPSE_CLICKED,
        HitRegion::ZoomBox => FrameAttr::ZOOM_CLICKED,
        _ => return,
    };
    window.attrs.set(attr, on);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::wm::frame::FrameGeometry;
    use crate::wm::testing::{DockCall, TestEnv, managed};

    fn geometry(w: &ManagedWindow, config: &Config) -> FrameGeometry {
        w.frame_geometry(config)
    }

    #[test]
    fn test_drag_waits_for_threshold_and_brackets_dock() {
        let t = TestEnv::new();
        let env = t.env();
        let mut w = managed(1, Rect::new(100, 100, 300, 200));
        let mut mr = MoveResizeManager::new(&t.config.windows);

        let outcome = mr.button_press(&env, &mut w, Point::new(300, 110), 10);
        assert_eq!(outcome, PressOutcome::Activate);

        mr.handle_motion(&env, &mut w, Point::new(301, 111)).unwrap();
        assert!(w.pending_frame.is_none());

        mr.handle_motion(&env, &mut w, Point::new(320, 130)).unwrap();
        mr.handle_motion(&env, &mut w, Point::new(340, 150)).unwrap();
        assert_eq!(w.pending_frame, Some(Rect::new(120, 120, 300, 200)));
        assert_eq!(w.queued_frame, Some(Rect::new(140, 140, 300, 200)));

        assert_eq!(mr.button_release(&env, &mut w, Point::new(340, 150)), None);
        assert_eq!(t.dock.calls(), vec![DockCall::DragBegin(0x5001), DockCall::DragEnd(0x5001)]);
        assert_eq!(mr.tracked_window(), None);
    }

    #[test]
    fn test_growbox_resize() {
        let t = TestEnv::new();
        let env = t.env();
        let mut w = managed(1, Rect::new(100, 100, 300, 200));
        let mut mr = MoveResizeManager::new(&t.config.windows);
        let grow = geometry(&w, &t.config).growbox_rect().center();

        mr.button_press(&env, &mut w, grow, 10);
        mr.handle_motion(&env, &mut w, Point::new(grow.x + 50, grow.y + 40)).unwrap();
        assert_eq!(w.pending_frame, Some(Rect::new(100, 100, 350, 240)));
        mr.button_release(&env, &mut w, grow);
        assert!(t.dock.calls().is_empty());
    }

    #[test]
    fn test_box_click_fires_only_inside() {
        let t = TestEnv::new();
        let env = t.env();
        let mut w = managed(1, Rect::new(100, 100, 300, 200));
        let mut mr = MoveResizeManager::new(&t.config.windows);
        let close = geometry(&w, &t.config).close_box_rect().center();

        assert_eq!(mr.button_press(&env, &mut w, close, 10), PressOutcome::None);
        assert!(w.attrs.contains(FrameAttr::CLOSE_CLICKED));
        assert_eq!(mr.button_release(&env, &mut w, close), Some(HitRegion::CloseBox));
        assert!(!w.attrs.contains(FrameAttr::CLOSE_CLICKED));

        mr.button_press(&env, &mut w, close, 20);
        mr.handle_motion(&env, &mut w, Point::new(350, 250)).unwrap();
        assert!(!w.attrs.contains(FrameAttr::CLOSE_CLICKED));
        assert_eq!(mr.button_release(&env, &mut w, Point::new(350, 250)), None);
    }

    #[test]
    fn test_double_click_on_titlebar() {
        let t = TestEnv::new();
        let env = t.env();
        let mut w = managed(1, Rect::new(100, 100, 300, 200));
        let mut mr = MoveResizeManager::new(&t.config.windows);
        let p = Point::new(300, 110);

        assert_eq!(mr.button_press(&env, &mut w, p, 1000), PressOutcome::Activate);
        mr.button_release(&env, &mut w, p);
        assert_eq!(mr.button_press(&env, &mut w, p, 1200), PressOutcome::DoubleClick);

        assert_eq!(mr.button_press(&env, &mut w, p, 5000), PressOutcome::Activate);
        mr.button_release(&env, &mut w, p);
        assert_eq!(mr.button_press(&env, &mut w, p, 6000), PressOutcome::Activate);
    }
}
