//! Window frames
//!
//! Pure frame geometry and hit-testing over a decoration class plus an
//! attribute set, and the three server-side windows that make up a frame:
//! the decorative frame itself, an input-only tracking window over the button
//! cluster (hover feedback) and an input-only growbox (resize handle).

use anyhow::Result;
use x11rb::protocol::xproto::{EventMask, Window};

use crate::config::{DecorMetrics, DecorationConfig};
use crate::shared::{Point, Rect};
use crate::wm::client_flags::FrameAttr;
use crate::wm::xconn::{Request, WindowSpec, XConn};

/// Decoration class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecorClass {
    None,
    Small,
    #[default]
    Large,
}

/// Result of a frame hit-test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitRegion {
    None,
    Titlebar,
    CloseBox,
    CollapseBox,
    ZoomBox,
    Growbox,
    Client,
}

/// Metrics of a class; `None` is all zeros
pub fn metrics(class: DecorClass, decor: &DecorationConfig) -> DecorMetrics {
    match class {
        DecorClass::None => DecorMetrics {
            titlebar_height: 0,
            button_size: 0,
            button_spacing: 0,
            button_inset: 0,
        },
        DecorClass::Small => decor.small,
        DecorClass::Large => decor.large,
    }
}

pub fn titlebar_height(class: DecorClass, decor: &DecorationConfig) -> i32 {
    metrics(class, decor).titlebar_height
}

/// Frame geometry value, in root coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    pub outer: Rect,
    pub inner: Rect,
    pub class: DecorClass,
    pub attrs: FrameAttr,
    metrics: DecorMetrics,
    growbox_size: i32,
}

impl FrameGeometry {
    pub fn new(outer: Rect, class: DecorClass, attrs: FrameAttr, decor: &DecorationConfig) -> Self {
        let metrics = metrics(class, decor);
        let tb = metrics.titlebar_height;
        let inner = Rect::new(outer.x, outer.y + tb, outer.width, (outer.height - tb).max(0));
        Self { outer, inner, class, attrs, metrics, growbox_size: decor.growbox_size }
    }

    pub fn titlebar_rect(&self) -> Rect {
        if self.class == DecorClass::None {
            return Rect::EMPTY;
        }
        Rect::new(self.outer.x, self.outer.y, self.outer.width, self.metrics.titlebar_height)
    }

    /// Box `index` counted from the left edge: close, collapse, zoom
    fn box_rect(&self, index: i32) -> Rect {
        let m = &self.metrics;
        Rect::new(
            self.outer.x + m.button_inset + index * (m.button_size + m.button_spacing),
            self.outer.y + (m.titlebar_height - m.button_size) / 2,
            m.button_size,
            m.button_size,
        )
    }

    pub fn close_box_rect(&self) -> Rect {
        self.box_rect(0)
    }

    pub fn collapse_box_rect(&self) -> Rect {
        self.box_rect(1)
    }

    pub fn zoom_box_rect(&self) -> Rect {
        self.box_rect(2)
    }

    /// Span of the button cluster
    pub fn tracking_rect(&self) -> Rect {
        if self.class == DecorClass::None {
            return Rect::EMPTY;
        }
        let first = self.close_box_rect();
        let last = self.zoom_box_rect();
        Rect::new(first.x, first.y, last.right() - first.x, first.height)
    }

    /// Square at the bottom-right corner
    pub fn growbox_rect(&self) -> Rect {
        if !self.attrs.contains(FrameAttr::GROW_BOX) {
            return Rect::EMPTY;
        }
        let size = self.growbox_size;
        Rect::new(self.outer.right() - size, self.outer.bottom() - size, size, size)
    }

    /// Classify `point`: boxes first, then titlebar, growbox and client area.
    pub fn hit_test(&self, point: Point) -> HitRegion {
        if !self.outer.contains_point(point) {
            return HitRegion::None;
        }

        if self.class != DecorClass::None {
            let boxes = [
                (FrameAttr::CLOSE_BOX, self.close_box_rect(), HitRegion::CloseBox),
                (FrameAttr::COLLAPSE_BOX, self.collapse_box_rect(), HitRegion::CollapseBox),
                (FrameAttr::ZOOM_BOX, self.zoom_box_rect(), HitRegion::ZoomBox),
            ];
            for (attr, rect, region) in boxes {
                if self.attrs.contains(attr) && rect.contains_point(point) {
                    return region;
                }
            }
            if self.titlebar_rect().contains_point(point) {
                return HitRegion::Titlebar;
            }
        }

        if self.attrs.contains(FrameAttr::GROW_BOX) && self.growbox_rect().contains_point(point) {
            return HitRegion::Growbox;
        }
        if !self.attrs.contains(FrameAttr::SHADED) && self.inner.contains_point(point) {
            return HitRegion::Client;
        }
        HitRegion::None
    }

    /// `rect` relative to the frame origin
    pub fn to_local(&self, rect: Rect) -> Rect {
        if rect.is_empty() {
            return rect;
        }
        rect.translate(-self.outer.x, -self.outer.y)
    }
}

/// Server-side windows of one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameWindows {
    pub frame: Window,
    pub tracking: Window,
    pub growbox: Window,
}

impl FrameWindows {
    pub fn create(conn: &dyn XConn, geometry: &FrameGeometry, background: u32) -> Result<Self> {
        let frame = conn.create_window(&WindowSpec {
            parent: conn.root(),
            rect: geometry.outer,
            input_only: false,
            event_mask: EventMask::SUBSTRUCTURE_REDIRECT
                | EventMask::SUBSTRUCTURE_NOTIFY
                | EventMask::BUTTON_PRESS
                | EventMask::BUTTON_RELEASE
                | EventMask::BUTTON_MOTION
                | EventMask::ENTER_WINDOW
                | EventMask::EXPOSURE,
            override_redirect: true,
            background_pixel: Some(background),
        })?;
        let tracking = conn.create_window(&WindowSpec {
            parent: frame,
            rect: geometry.to_local(geometry.tracking_rect()),
            input_only: true,
            event_mask: EventMask::ENTER_WINDOW | EventMask::LEAVE_WINDOW,
            override_redirect: true,
            background_pixel: None,
        })?;
        let growbox = conn.create_window(&WindowSpec {
            parent: frame,
            rect: geometry.to_local(geometry.growbox_rect()),
            input_only: true,
            event_mask: EventMask::BUTTON_PRESS | EventMask::BUTTON_RELEASE | EventMask::BUTTON_MOTION,
            override_redirect: true,
            background_pixel: None,
        })?;

        let windows = Self { frame, tracking, growbox };
        windows.layout(conn, geometry)?;
        Ok(windows)
    }

    /// Place the auxiliary windows for `geometry`; empty regions are unmapped.
    pub fn layout(&self, conn: &dyn XConn, geometry: &FrameGeometry) -> Result<()> {
        for (window, rect) in [
            (self.tracking, geometry.tracking_rect()),
            (self.growbox, geometry.growbox_rect()),
        ] {
            if rect.is_empty() {
                conn.send(Request::UnmapWindow(window))?;
            } else {
                conn.send(Request::ConfigureWindow { window, rect: geometry.to_local(rect) })?;
                conn.send(Request::MapWindow(window))?;
            }
        }
        Ok(())
    }

    pub fn contains(&self, window: Window) -> bool {
        window == self.frame || window == self.tracking || window == self.growbox
    }

    pub fn destroy(&self, conn: &dyn XConn) -> Result<()> {
        conn.send(Request::DestroyWindow(self.growbox))?;
        conn.send(Request::DestroyWindow(self.tracking))?;
        conn.send(Request::DestroyWindow(self.frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_boxes() -> FrameAttr {
        FrameAttr::TITLE
            | FrameAttr::CLOSE_BOX
            | FrameAttr::COLLAPSE_BOX
            | FrameAttr::ZOOM_BOX
            | FrameAttr::GROW_BOX
    }

    fn geometry() -> FrameGeometry {
        FrameGeometry::new(
            Rect::new(100, 100, 400, 300),
            DecorClass::Large,
            all_boxes(),
            &DecorationConfig::default(),
        )
    }

    #[test]
    fn test_close_box_wins_over_titlebar() {
        let g = geometry();
        let close = g.close_box_rect();
        let p = close.center();
        assert!(g.titlebar_rect().contains_point(p));
        assert_eq!(g.hit_test(p), HitRegion::CloseBox);
    }

    #[test]
    fn test_regions() {
        let g = geometry();
        assert_eq!(g.hit_test(g.collapse_box_rect().center()), HitRegion::CollapseBox);
        assert_eq!(g.hit_test(g.zoom_box_rect().center()), HitRegion::ZoomBox);
        assert_eq!(g.hit_test(Point::new(400, 105)), HitRegion::Titlebar);
        assert_eq!(g.hit_test(Point::new(495, 395)), HitRegion::Growbox);
        assert_eq!(g.hit_test(Point::new(300, 250)), HitRegion::Client);
        assert_eq!(g.hit_test(Point::new(10, 10)), HitRegion::None);
    }

    #[test]
    fn test_disabled_box_falls_through_to_titlebar() {
        let mut g = geometry();
        g.attrs.remove(FrameAttr::CLOSE_BOX);
        assert_eq!(g.hit_test(g.close_box_rect().center()), HitRegion::Titlebar);
    }

    #[test]
    fn test_undecorated_frame_is_all_client() {
        let g = FrameGeometry::new(
            Rect::new(0, 0, 200, 100),
            DecorClass::None,
            FrameAttr::empty(),
            &DecorationConfig::default(),
        );
        assert_eq!(g.inner, g.outer);
        assert!(g.tracking_rect().is_empty());
        assert_eq!(g.hit_test(Point::new(5, 5)), HitRegion::Client);
    }

    #[test]
    fn test_titlebar_height_per_class() {
        let decor = DecorationConfig::default();
        assert_eq!(titlebar_height(DecorClass::Large, &decor), 22);
        assert_eq!(titlebar_height(DecorClass::Small, &decor), 16);
        assert_eq!(titlebar_height(DecorClass::None, &decor), 0);
    }

    #[test]
    fn test_tracking_rect_spans_buttons() {
        let g = geometry();
        let t = g.tracking_rect();
        assert_eq!(t.x, g.close_box_rect().x);
        assert_eq!(t.right(), g.zoom_box_rect().right());
        assert_eq!(g.to_local(t).x, 8);
    }
}
