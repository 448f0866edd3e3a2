//! Types shared by the window manager and the host bridge.

pub mod geometry;

pub use geometry::{Point, Rect, Size};
