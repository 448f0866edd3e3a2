//! Geometry primitives
//!
//! Rectangle, point and size value types in root-window coordinates, plus the
//! rectangle intersection used by head placement and dock avoidance.

use serde::{Deserialize, Serialize};

/// A point in X11 coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// A width/height pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }
}

/// Window rectangle
///
/// Corners are treated as a closed interval: `x..=x + width`. A zero-sized
/// rectangle at a non-zero origin is a degenerate line or point, which is
/// distinct from [`Rect::EMPTY`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    /// Canonical empty rectangle returned by a failed intersection
    pub const EMPTY: Rect = Rect { x: 0, y: 0, width: 0, height: 0 };

    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    pub fn from_origin_size(origin: Point, size: Size) -> Self {
        Self::new(origin.x, origin.y, size.width, size.height)
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2, self.y + self.height / 2)
    }

    pub fn area(&self) -> i64 {
        self.width as i64 * self.height as i64
    }

    /// Equal to [`Rect::EMPTY`]; degenerate rectangles elsewhere are not empty.
    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    pub fn contains_point(&self, p: Point) -> bool {
        self.x <= p.x && p.x <= self.right() && self.y <= p.y && p.y <= self.bottom()
    }

    pub fn with_origin(self, origin: Point) -> Self {
        Self { x: origin.x, y: origin.y, ..self }
    }

    pub fn with_height(self, height: i32) -> Self {
        Self { height, ..self }
    }

    pub fn translate(self, dx: i32, dy: i32) -> Self {
        Self { x: self.x + dx, y: self.y + dy, ..self }
    }

    /// Overlap of two rectangles.
    ///
    /// Edge-touching rectangles overlap in a zero-width (or zero-height)
    /// rectangle on the shared edge; disjoint ones yield [`Rect::EMPTY`].
    pub fn intersection(&self, other: &Rect) -> Rect {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.right().min(other.right());
        let y2 = self.bottom().min(other.bottom());

        if x1 <= x2 && y1 <= y2 {
            Rect::new(x1, y1, x2 - x1, y2 - y1)
        } else {
            Rect::EMPTY
        }
    }
}

impl From<&x11rb::protocol::xproto::ConfigureNotifyEvent> for Rect {
    fn from(e: &x11rb::protocol::xproto::ConfigureNotifyEvent) -> Self {
        Rect::new(e.x as i32, e.y as i32, e.width as i32, e.height as i32)
    }
}
