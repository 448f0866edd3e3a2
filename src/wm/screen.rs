//! Screen Module
//!
//! Per-display state: the heads (monitors) and the registry, an arena of
//! managed windows keyed by client id with the stacking order and the
//! transient tree. Transient links are ids resolved through the arena, never
//! owning references.

use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};
use x11rb::protocol::xproto::{StackMode, Window};

use crate::host::dock::{DockOrientation, NativeWindowId};
use crate::shared::{Point, Rect, Size};
use crate::wm::window::ManagedWindow;
use crate::wm::xconn::Request;

/// Monitor rectangles in root coordinates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heads {
    rects: Vec<Rect>,
    main: usize,
}

impl Heads {
    pub fn new(mut rects: Vec<Rect>, main: usize) -> Self {
        if rects.is_empty() {
            warn!("No heads reported, assuming a single 1024x768 head");
            rects.push(Rect::new(0, 0, 1024, 768));
        }
        let main = main.min(rects.len() - 1);
        Self { rects, main }
    }

    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    pub fn main(&self) -> Rect {
        self.rects[self.main]
    }

    /// Head index overlapping `rect` the most, main head when none does
    pub fn head_index_for_rect(&self, rect: &Rect) -> usize {
        self.rects
            .iter()
            .enumerate()
            .map(|(i, head)| (i, head.intersection(rect).area()))
            .filter(|&(_, area)| area > 0)
            .max_by_key(|&(_, area)| area)
            .map(|(i, _)| i)
            .unwrap_or(self.main)
    }

    pub fn head_for_rect(&self, rect: &Rect) -> Rect {
        self.rects[self.head_index_for_rect(rect)]
    }

    /// Move `frame` so that at least `min_visible` pixels of its titlebar sit
    /// on some head.
    pub fn validate_window_position(&self, frame: Rect, titlebar_height: i32, min_visible: i32) -> Rect {
        let tb = titlebar_height.max(1);
        let needed = min_visible.min(frame.width).max(1);
        let titlebar = Rect::new(frame.x, frame.y, frame.width, tb);

        let reachable = self.rects.iter().any(|head| {
            let overlap = head.intersection(&titlebar);
            titlebar.y >= head.y && titlebar.y + tb <= head.bottom() && overlap.width >= needed
        });
        if reachable {
            return frame;
        }

        let head = self.head_for_rect(&frame);
        let x = frame.x.clamp(head.x + needed - frame.width, (head.right() - needed).max(head.x));
        let y = frame.y.clamp(head.y, (head.bottom() - tb).max(head.y));
        debug!("Pulled frame {:?} back to ({}, {})", frame, x, y);
        frame.with_origin(Point::new(x, y))
    }

    /// Zoomed rectangle for the head of `frame`, minus the dock
    pub fn zoomed_rect(&self, frame: &Rect, dock: &Rect, orientation: DockOrientation) -> Rect {
        let head = self.head_for_rect(frame);
        let covered = head.intersection(dock);
        if covered.area() == 0 {
            return head;
        }
        match orientation {
            DockOrientation::Bottom => head.with_height(covered.y - head.y),
            DockOrientation::Left => Rect::new(
                covered.right(),
                head.y,
                head.right() - covered.right(),
                head.height,
            ),
            DockOrientation::Right => Rect::new(head.x, head.y, covered.x - head.x, head.height),
        }
    }

    /// `size` centered on the main head
    pub fn center_on_main(&self, size: Size) -> Rect {
        let head = self.main();
        let origin = Point::new(
            (head.x + (head.width - size.width) / 2).max(head.x),
            (head.y + (head.height - size.height) / 2).max(head.y),
        );
        Rect::from_origin_size(origin, size)
    }
}

/// Per-screen window registry
#[derive(Default)]
pub struct Screen {
    pub windows: HashMap<Window, ManagedWindow>,
    /// Client ids, bottom to top
    stacking: Vec<Window>,
}

impl Screen {
    pub fn new() -> Self {
        Self {
            windows: HashMap::new(),
            stacking: Vec::new(),
        }
    }

    /// Insert at the top of the stacking order
    pub fn insert(&mut self, window: ManagedWindow) {
        let id = window.id;
        self.stacking.retain(|&w| w != id);
        self.stacking.push(id);
        self.windows.insert(id, window);
    }

    /// Remove a window and every transient link pointing at it
    pub fn remove(&mut self, id: Window) -> Option<ManagedWindow> {
        let window = self.windows.remove(&id)?;
        self.stacking.retain(|&w| w != id);

        if let Some(parent) = window.transient_for.and_then(|p| self.windows.get_mut(&p)) {
            parent.transients.retain(|&w| w != id);
        }
        for child in &window.transients {
            if let Some(child) = self.windows.get_mut(child) {
                child.transient_for = None;
            }
        }
        Some(window)
    }

    pub fn get(&self, id: Window) -> Option<&ManagedWindow> {
        self.windows.get(&id)
    }

    pub fn get_mut(&mut self, id: Window) -> Option<&mut ManagedWindow> {
        self.windows.get_mut(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Resolve a client, frame, tracking or growbox id to its client id
    pub fn find_window(&self, id: Window) -> Option<Window> {
        if self.windows.contains_key(&id) {
            return Some(id);
        }
        self.windows
            .values()
            .find(|w| w.frames.is_some_and(|f| f.contains(id)))
            .map(|w| w.id)
    }

    pub fn find_by_native(&self, native: NativeWindowId) -> Option<Window> {
        self.windows
            .values()
            .find(|w| w.native_id == Some(native))
            .map(|w| w.id)
    }

    /// Windows on a head, bottom to top
    pub fn all_windows_on_head(&self, heads: &Heads, head: &Rect) -> Vec<Window> {
        self.stacking
            .iter()
            .copied()
            .filter(|id| {
                self.windows
                    .get(id)
                    .is_some_and(|w| heads.head_for_rect(&w.current_frame) == *head)
            })
            .collect()
    }

    /// `subset` sorted bottom to top; unknown ids are dropped
    pub fn stacking_order(&self, subset: &[Window]) -> Vec<Window> {
        self.stacking
            .iter()
            .copied()
            .filter(|id| subset.contains(id))
            .collect()
    }

    /// Full stacking order, bottom to top
    pub fn stacking(&self) -> &[Window] {
        &self.stacking
    }

    /// Link `child` under `parent`, refusing links that would form a cycle
    pub fn set_transient_for(&mut self, child: Window, parent: Option<Window>) {
        let old = self.windows.get(&child).and_then(|w| w.transient_for);
        if let Some(old) = old.and_then(|p| self.windows.get_mut(&p)) {
            old.transients.retain(|&w| w != child);
        }

        let parent = parent.filter(|&p| self.windows.contains_key(&p) && !self.is_ancestor(child, p));
        if let Some(p) = parent.and_then(|p| self.windows.get_mut(&p)) {
            p.transients.push(child);
        }
        if let Some(w) = self.windows.get_mut(&child) {
            w.transient_for = parent;
        }
    }

    /// True when `ancestor` is `window` or above it in the transient tree
    fn is_ancestor(&self, ancestor: Window, window: Window) -> bool {
        let mut seen = HashSet::new();
        let mut cursor = Some(window);
        while let Some(id) = cursor {
            if id == ancestor {
                return true;
            }
            if !seen.insert(id) {
                return false;
            }
            cursor = self.windows.get(&id).and_then(|w| w.transient_for);
        }
        false
    }

    fn transient_descendants(&self, id: Window) -> HashSet<Window> {
        let mut found = HashSet::new();
        let mut todo = vec![id];
        while let Some(w) = todo.pop() {
            if let Some(window) = self.windows.get(&w) {
                for &child in &window.transients {
                    if found.insert(child) {
                        todo.push(child);
                    }
                }
            }
        }
        found.remove(&id);
        found
    }

    /// Raise `id` and its transient descendants to the top.
    ///
    /// Descendants keep their relative order above the parent. Returns the
    /// raised group bottom to top.
    pub fn raise_window(&mut self, id: Window) -> Vec<Window> {
        if !self.windows.contains_key(&id) {
            return Vec::new();
        }
        let descendants = self.transient_descendants(id);
        let mut group = vec![id];
        group.extend(self.stacking.iter().copied().filter(|w| descendants.contains(w)));

        self.stacking.retain(|w| !group.contains(w));
        self.stacking.extend(group.iter().copied());
        group
    }

    /// Restack requests putting `group` on top in order
    pub fn restack_requests(&self, group: &[Window]) -> Vec<Request> {
        let mut requests = Vec::new();
        let mut below: Option<Window> = None;
        for id in group {
            let Some(frame) = self.windows.get(id).and_then(|w| w.frames).map(|f| f.frame) else {
                continue;
            };
            requests.push(Request::Restack {
                window: frame,
                sibling: below,
                mode: StackMode::ABOVE,
            });
            below = Some(frame);
        }
        requests
    }

    /// Topmost window accepting focus, skipping `except`
    pub fn topmost_focusable(&self, except: Option<Window>) -> Option<Window> {
        self.stacking
            .iter()
            .rev()
            .copied()
            .filter(|&id| Some(id) != except)
            .find(|id| self.windows.get(id).is_some_and(|w| w.is_focusable()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wm::testing::managed;

    fn screen_with(ids: &[Window]) -> Screen {
        let mut screen = Screen::new();
        for &id in ids {
            screen.insert(managed(id, Rect::new(10, 10, 300, 200)));
        }
        screen
    }

    #[test]
    fn test_raise_keeps_transient_order() {
        // stacking: parent(10), child_b(12), other(20), child_a(11)
        let mut screen = screen_with(&[10, 12, 20, 11]);
        screen.set_transient_for(11, Some(10));
        screen.set_transient_for(12, Some(10));

        let group = screen.raise_window(10);
        assert_eq!(group, vec![10, 12, 11]);
        assert_eq!(screen.stacking(), &[20, 10, 12, 11]);
    }

    #[test]
    fn test_transient_cycle_is_refused() {
        let mut screen = screen_with(&[1, 2]);
        screen.set_transient_for(2, Some(1));
        screen.set_transient_for(1, Some(2));
        assert_eq!(screen.get(1).unwrap().transient_for, None);
        assert_eq!(screen.get(2).unwrap().transient_for, Some(1));
    }

    #[test]
    fn test_remove_clears_back_references() {
        let mut screen = screen_with(&[1, 2, 3]);
        screen.set_transient_for(2, Some(1));
        screen.set_transient_for(3, Some(2));
        screen.remove(2);
        assert!(screen.get(1).unwrap().transients.is_empty());
        assert_eq!(screen.get(3).unwrap().transient_for, None);
        assert_eq!(screen.stacking(), &[1, 3]);
    }

    #[test]
    fn test_find_window_resolves_frame_ids() {
        let screen = screen_with(&[7]);
        let frame = screen.get(7).unwrap().frames.unwrap().frame;
        assert_eq!(screen.find_window(frame), Some(7));
        assert_eq!(screen.find_window(7), Some(7));
        assert_eq!(screen.find_window(999), None);
    }

    #[test]
    fn test_windows_on_head_in_stacking_order() {
        let heads = Heads::new(vec![Rect::new(0, 0, 1000, 800), Rect::new(1000, 0, 1000, 800)], 0);
        let mut screen = screen_with(&[1, 2]);
        screen.insert(managed(3, Rect::new(1200, 10, 300, 200)));
        screen.raise_window(1);
        assert_eq!(screen.all_windows_on_head(&heads, &heads.main()), vec![2, 1]);
        assert_eq!(screen.all_windows_on_head(&heads, &heads.rects()[1]), vec![3]);
    }

    #[test]
    fn test_stacking_order_of_subset() {
        let screen = screen_with(&[5, 6, 7, 8]);
        assert_eq!(screen.stacking_order(&[8, 5, 42]), vec![5, 8]);
    }

    #[test]
    fn test_validate_pulls_titlebar_back_on_screen() {
        let heads = Heads::new(vec![Rect::new(0, 0, 1000, 800)], 0);
        let off = Rect::new(2000, -50, 300, 200);
        let fixed = heads.validate_window_position(off, 22, 40);
        assert_eq!(fixed, Rect::new(960, 0, 300, 200));

        let fine = Rect::new(100, 100, 300, 200);
        assert_eq!(heads.validate_window_position(fine, 22, 40), fine);
    }

    #[test]
    fn test_zoomed_rect_excludes_dock() {
        let heads = Heads::new(vec![Rect::new(0, 0, 1000, 800)], 0);
        let frame = Rect::new(10, 10, 100, 100);
        let bottom = heads.zoomed_rect(&frame, &Rect::new(200, 740, 600, 60), DockOrientation::Bottom);
        assert_eq!(bottom, Rect::new(0, 0, 1000, 740));
        let left = heads.zoomed_rect(&frame, &Rect::new(0, 100, 64, 600), DockOrientation::Left);
        assert_eq!(left, Rect::new(64, 0, 936, 800));
        assert_eq!(heads.zoomed_rect(&frame, &Rect::EMPTY, DockOrientation::Right), heads.main());
    }
}
