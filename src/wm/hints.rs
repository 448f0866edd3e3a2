//! Hints Module
//!
//! Window hints reading and application (WM_NORMAL_HINTS, WM_HINTS, Motif
//! hints, titles, protocols, transient-for and window type).

use anyhow::Result;
use tracing::debug;
use x11rb::protocol::xproto::Window;

use crate::config::WindowsConfig;
use crate::shared::Size;
use crate::wm::atoms::Atoms;
use crate::wm::client_flags::{WindowType, WmProtocols};
use crate::wm::window::ICONIC_STATE;
use crate::wm::xconn::XConn;

// WM_NORMAL_HINTS flags
pub const US_POSITION: u32 = 1 << 0;
pub const P_POSITION: u32 = 1 << 2;
pub const P_MIN_SIZE: u32 = 1 << 4;
pub const P_MAX_SIZE: u32 = 1 << 5;
pub const P_RESIZE_INC: u32 = 1 << 6;
pub const P_ASPECT: u32 = 1 << 7;
pub const P_BASE_SIZE: u32 = 1 << 8;

// WM_HINTS flags
pub const INPUT_HINT: u32 = 1 << 0;
pub const STATE_HINT: u32 = 1 << 1;
pub const URGENCY_HINT: u32 = 1 << 8;

/// Size hints (XSizeHints equivalent)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SizeHints {
    pub flags: u32,
    pub min_width: i32,
    pub min_height: i32,
    pub max_width: i32,
    pub max_height: i32,
    pub width_inc: i32,
    pub height_inc: i32,
    pub min_aspect: (i32, i32),
    pub max_aspect: (i32, i32),
    pub base_width: i32,
    pub base_height: i32,
    pub win_gravity: u32,
}

impl SizeHints {
    /// Decode the 18-item property; shorter (pre-ICCCM) forms are padded
    pub fn from_values(values: &[u32]) -> Option<Self> {
        if values.len() < 15 {
            return None;
        }
        let v = |i: usize| values.get(i).copied().unwrap_or(0) as i32;
        Some(Self {
            flags: values[0],
            min_width: v(5),
            min_height: v(6),
            max_width: v(7),
            max_height: v(8),
            width_inc: v(9),
            height_inc: v(10),
            min_aspect: (v(11), v(12)),
            max_aspect: (v(13), v(14)),
            base_width: v(15),
            base_height: v(16),
            win_gravity: v(17) as u32,
        })
    }

    pub fn has_position(&self) -> bool {
        self.flags & (US_POSITION | P_POSITION) != 0
    }
}

/// WM hints (XWMHints equivalent)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WmHints {
    pub flags: u32,
    pub input: bool,
    pub initial_state: u32,
}

impl WmHints {
    pub fn from_values(values: &[u32]) -> Option<Self> {
        if values.len() < 3 {
            return None;
        }
        Some(Self {
            flags: values[0],
            input: values[1] != 0,
            initial_state: values[2],
        })
    }

    /// Input hint absent means the client wants focus
    pub fn accepts_input(&self) -> bool {
        self.flags & INPUT_HINT == 0 || self.input
    }

    /// `initial_state` only counts when StateHint is set
    pub fn starts_iconic(&self) -> bool {
        self.flags & STATE_HINT != 0 && self.initial_state == ICONIC_STATE
    }

    pub fn is_urgent(&self) -> bool {
        self.flags & URGENCY_HINT != 0
    }
}

/// Client-area size limits with config fallbacks already applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeConstraints {
    pub min: Size,
    pub max: Size,
    pub base: Size,
    pub inc: Size,
    pub min_aspect: Option<(i32, i32)>,
    pub max_aspect: Option<(i32, i32)>,
}

impl SizeConstraints {
    pub fn new(hints: Option<&SizeHints>, defaults: &WindowsConfig) -> Self {
        let default_min = Size::new(defaults.default_min_width, defaults.default_min_height);
        let default_max = Size::new(defaults.default_max_width, defaults.default_max_height);
        let mut c = Self {
            min: default_min,
            max: default_max,
            base: Size::default(),
            inc: Size::new(1, 1),
            min_aspect: None,
            max_aspect: None,
        };
        let Some(h) = hints else {
            return c;
        };

        if h.flags & P_MIN_SIZE != 0 && h.min_width > 0 && h.min_height > 0 {
            c.min = Size::new(
                h.min_width.clamp(default_min.width.min(default_max.width), default_max.width),
                h.min_height.clamp(default_min.height.min(default_max.height), default_max.height),
            );
        }
        if h.flags & P_MAX_SIZE != 0 && h.max_width >= c.min.width && h.max_height >= c.min.height {
            c.max = Size::new(h.max_width.min(default_max.width), h.max_height.min(default_max.height));
        } else if h.flags & P_MAX_SIZE != 0 {
            debug!("Ignoring inconsistent max size {}x{}", h.max_width, h.max_height);
        }
        if h.flags & P_BASE_SIZE != 0 && h.base_width >= 0 && h.base_height >= 0 {
            c.base = Size::new(h.base_width, h.base_height);
        } else if h.flags & P_MIN_SIZE != 0 {
            c.base = c.min;
        }
        if h.flags & P_RESIZE_INC != 0 && h.width_inc > 0 && h.height_inc > 0 {
            c.inc = Size::new(h.width_inc, h.height_inc);
        }
        if h.flags & P_ASPECT != 0 {
            let valid = |(n, d): (i32, i32)| (n > 0 && d > 0).then_some((n, d));
            c.min_aspect = valid(h.min_aspect);
            c.max_aspect = valid(h.max_aspect);
        }
        c
    }

    /// Apply aspect, increments and min/max to a client size
    pub fn constrain(&self, size: Size) -> Size {
        let mut w = size.width as i64;
        let mut h = size.height as i64;

        if let Some((num, den)) = self.min_aspect {
            // w / h >= num / den
            if w * (den as i64) < h * (num as i64) {
                h = w * den as i64 / num as i64;
            }
        }
        if let Some((num, den)) = self.max_aspect {
            // w / h <= num / den
            if w * (den as i64) > h * (num as i64) {
                w = h * num as i64 / den as i64;
            }
        }

        let inc_w = self.inc.width as i64;
        let inc_h = self.inc.height as i64;
        let base_w = self.base.width as i64;
        let base_h = self.base.height as i64;
        if inc_w > 1 && w > base_w {
            w = base_w + (w - base_w) / inc_w * inc_w;
        }
        if inc_h > 1 && h > base_h {
            h = base_h + (h - base_h) / inc_h * inc_h;
        }

        // max wins over min
        let w = w.max(self.min.width as i64).min(self.max.width as i64);
        let h = h.max(self.min.height as i64).min(self.max.height as i64);
        Size::new(w as i32, h as i32)
    }
}

/// Motif hints: only the decorations field is honoured
pub fn motif_wants_decorations(values: &[u32]) -> bool {
    const MWM_HINTS_DECORATIONS: u32 = 1 << 1;
    match values {
        [flags, _functions, decorations, ..] if flags & MWM_HINTS_DECORATIONS != 0 => *decorations != 0,
        _ => true,
    }
}

/// Hints manager
pub struct HintsManager;

impl HintsManager {
    pub fn read_size_hints(conn: &dyn XConn, atoms: &Atoms, window: Window) -> Result<Option<SizeHints>> {
        let prop = conn.get_property(window, atoms.wm_normal_hints, false)?;
        Ok(prop.and_then(|p| SizeHints::from_values(&p.value32())))
    }

    pub fn read_wm_hints(conn: &dyn XConn, atoms: &Atoms, window: Window) -> Result<Option<WmHints>> {
        let prop = conn.get_property(window, atoms.wm_hints, false)?;
        Ok(prop.and_then(|p| WmHints::from_values(&p.value32())))
    }

    /// _NET_WM_NAME, falling back to WM_NAME
    pub fn read_title(conn: &dyn XConn, atoms: &Atoms, window: Window) -> Result<String> {
        if let Some(p) = conn.get_property(window, atoms.net_wm_name, false)? {
            if p.type_ == atoms.utf8_string && !p.value.is_empty() {
                return Ok(p.as_string());
            }
        }
        Ok(conn
            .get_property(window, atoms.wm_name, false)?
            .map(|p| p.as_string())
            .unwrap_or_default())
    }

    pub fn read_protocols(conn: &dyn XConn, atoms: &Atoms, window: Window) -> Result<WmProtocols> {
        let prop = conn.get_property(window, atoms.wm_protocols, false)?;
        Ok(prop
            .map(|p| WmProtocols::from_atoms(p.value32(), atoms))
            .unwrap_or_default())
    }

    pub fn read_transient_for(conn: &dyn XConn, atoms: &Atoms, window: Window) -> Result<Option<Window>> {
        let prop = conn.get_property(window, atoms.wm_transient_for, false)?;
        Ok(prop
            .and_then(|p| p.value32().first().copied())
            .filter(|&w| w != x11rb::NONE && w != window))
    }

    pub fn read_window_type(conn: &dyn XConn, atoms: &Atoms, window: Window) -> Result<WindowType> {
        let prop = conn.get_property(window, atoms.net_wm_window_type, false)?;
        Ok(prop
            .and_then(|p| p.value32().first().copied())
            .map(|atom| WindowType::from_atom(atom, atoms))
            .unwrap_or_default())
    }

    pub fn read_motif_decorations(conn: &dyn XConn, atoms: &Atoms, window: Window) -> Result<bool> {
        let prop = conn.get_property(window, atoms.motif_wm_hints, false)?;
        Ok(prop.map(|p| motif_wants_decorations(&p.value32())).unwrap_or(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hints(flags: u32) -> SizeHints {
        SizeHints { flags, ..SizeHints::default() }
    }

    #[test]
    fn test_constrain_min_max() {
        let mut h = hints(P_MIN_SIZE | P_MAX_SIZE);
        h.min_width = 100;
        h.min_height = 50;
        h.max_width = 400;
        h.max_height = 300;
        let c = SizeConstraints::new(Some(&h), &WindowsConfig::default());
        assert_eq!(c.constrain(Size::new(10, 10)), Size::new(100, 50));
        assert_eq!(c.constrain(Size::new(1000, 1000)), Size::new(400, 300));
    }

    #[test]
    fn test_malformed_hints_fall_back_to_defaults() {
        let mut h = hints(P_MIN_SIZE | P_MAX_SIZE);
        h.min_width = -5;
        h.min_height = 0;
        h.max_width = 0;
        h.max_height = 0;
        let c = SizeConstraints::new(Some(&h), &WindowsConfig::default());
        assert_eq!(c.min, Size::new(1, 1));
        assert_eq!(c.max, Size::new(32767, 32767));
    }

    #[test]
    fn test_oversized_min_hint_is_capped_at_max() {
        let mut h = hints(P_MIN_SIZE);
        h.min_width = 40000;
        h.min_height = 50;
        let c = SizeConstraints::new(Some(&h), &WindowsConfig::default());
        assert_eq!(c.min, Size::new(32767, 50));
        assert_eq!(c.constrain(Size::new(300, 200)), Size::new(32767, 200));
    }

    #[test]
    fn test_initial_state_needs_state_hint() {
        let without_flag = WmHints::from_values(&[INPUT_HINT, 1, ICONIC_STATE]).unwrap();
        assert!(!without_flag.starts_iconic());
        let with_flag = WmHints::from_values(&[INPUT_HINT | STATE_HINT, 1, ICONIC_STATE]).unwrap();
        assert!(with_flag.starts_iconic());
        let normal = WmHints::from_values(&[STATE_HINT, 1, 1]).unwrap();
        assert!(!normal.starts_iconic());
    }

    #[test]
    fn test_constrain_with_crossed_limits_keeps_max() {
        let c = SizeConstraints {
            min: Size::new(500, 500),
            max: Size::new(100, 100),
            base: Size::default(),
            inc: Size::new(1, 1),
            min_aspect: None,
            max_aspect: None,
        };
        assert_eq!(c.constrain(Size::new(300, 300)), Size::new(100, 100));
    }

    #[test]
    fn test_constrain_increments_from_base() {
        let mut h = hints(P_RESIZE_INC | P_BASE_SIZE);
        h.width_inc = 10;
        h.height_inc = 20;
        h.base_width = 4;
        h.base_height = 2;
        let c = SizeConstraints::new(Some(&h), &WindowsConfig::default());
        assert_eq!(c.constrain(Size::new(107, 95)), Size::new(104, 82));
    }

    #[test]
    fn test_constrain_aspect() {
        let mut h = hints(P_ASPECT);
        h.min_aspect = (1, 1);
        h.max_aspect = (2, 1);
        let c = SizeConstraints::new(Some(&h), &WindowsConfig::default());
        assert_eq!(c.constrain(Size::new(100, 200)), Size::new(100, 100));
        assert_eq!(c.constrain(Size::new(500, 100)), Size::new(200, 100));
    }

    #[test]
    fn test_wm_hints_input_default() {
        let absent = WmHints::from_values(&[0, 0, 0]).unwrap();
        assert!(absent.accepts_input());
        let refused = WmHints::from_values(&[INPUT_HINT, 0, 0]).unwrap();
        assert!(!refused.accepts_input());
        assert!(WmHints::from_values(&[URGENCY_HINT, 1, 0]).unwrap().is_urgent());
    }

    #[test]
    fn test_motif_decorations() {
        assert!(!motif_wants_decorations(&[2, 0, 0, 0, 0]));
        assert!(motif_wants_decorations(&[1, 0, 0, 0, 0]));
        assert!(motif_wants_decorations(&[]));
    }
}
