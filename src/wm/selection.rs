//! Selection proxy
//!
//! Bridges the `CLIPBOARD` selection and the host pasteboard through one
//! unmapped window. Host content is offered to X lazily: we take ownership
//! and answer `SelectionRequest`s from the pasteboard. X content is pulled
//! when X stops being the active session, by converting the selection into
//! a property on our window. At most one conversion is outstanding; a second
//! one waits in a single deferred slot.

use anyhow::Result;
use tracing::{debug, trace, warn};
use x11rb::NONE;
use x11rb::protocol::xproto::{
    Atom, AtomEnum, EventMask, SelectionClearEvent, SelectionNotifyEvent, SelectionRequestEvent,
    Timestamp, Window,
};

use crate::config::SelectionConfig;
use crate::host::pasteboard::{ContentKind, Pasteboard, PasteboardContent};
use crate::shared::Rect;
use crate::wm::atoms::Atoms;
use crate::wm::xconn::{PropertyData, Request, WindowSpec, XConn};

/// Conversion we asked the selection owner for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Conversion {
    target: Atom,
    time: Timestamp,
    /// A refused `TARGETS` already fell back to `UTF8_STRING`
    fallback: bool,
}

#[derive(Debug)]
pub struct SelectionProxy {
    window: Window,
    atoms: Atoms,
    selection: Atom,
    /// We own `selection` on behalf of the pasteboard
    owned: bool,
    owned_since: Timestamp,
    /// Pasteboard change count at the last synchronization
    synced_change_count: u64,
    active: bool,
    pending: Option<Conversion>,
    /// Timestamp of a pull requested while `pending` was outstanding
    deferred: Option<Timestamp>,
    stale_after: u32,
}

impl SelectionProxy {
    pub fn new(conn: &dyn XConn, atoms: &Atoms, config: &SelectionConfig) -> Result<Self> {
        let window = conn.create_window(&WindowSpec {
            parent: conn.root(),
            rect: Rect::new(-1, -1, 1, 1),
            input_only: true,
            event_mask: EventMask::PROPERTY_CHANGE,
            override_redirect: true,
            background_pixel: None,
        })?;
        debug!("Selection proxy window 0x{:x}", window);

        Ok(Self {
            window,
            atoms: *atoms,
            selection: atoms.clipboard,
            owned: false,
            owned_since: x11rb::CURRENT_TIME,
            synced_change_count: 0,
            active: true,
            pending: None,
            deferred: None,
            stale_after: config.stale_after_ms,
        })
    }

    pub fn window(&self) -> Window {
        self.window
    }

    #[cfg(test)]
    pub fn owns_selection(&self) -> bool {
        self.owned
    }

    #[cfg(test)]
    pub fn is_awaiting_notify(&self) -> bool {
        self.pending.is_some()
    }

    /// X became the active session
    pub fn become_active(&mut self, conn: &dyn XConn, pasteboard: &Pasteboard, timestamp: Timestamp) -> Result<()> {
        self.active = true;
        if pasteboard.change_count() != self.synced_change_count && pasteboard.has_content() {
            self.copy_to_x(conn, pasteboard, timestamp)?;
        }
        Ok(())
    }

    /// A host application became active; hand it what X holds
    pub fn become_inactive(&mut self, conn: &dyn XConn, timestamp: Timestamp) -> Result<()> {
        self.active = false;
        if self.owned {
            return Ok(());
        }
        self.request_targets(conn, timestamp)
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Offer the current pasteboard content to X clients
    pub fn copy_to_x(&mut self, conn: &dyn XConn, pasteboard: &Pasteboard, timestamp: Timestamp) -> Result<()> {
        conn.send(Request::SetSelectionOwner {
            owner: self.window,
            selection: self.selection,
            time: timestamp,
        })?;
        self.owned = true;
        self.owned_since = timestamp;
        self.synced_change_count = pasteboard.change_count();
        debug!("Took CLIPBOARD ownership at change count {}", self.synced_change_count);
        Ok(())
    }

    pub fn on_clear_event(&mut self, event: &SelectionClearEvent) {
        if event.selection != self.selection {
            return;
        }
        debug!("Lost CLIPBOARD ownership (time {})", event.time);
        self.owned = false;
        self.pending = None;
        self.deferred = None;
    }

    /// Answer a conversion request from the pasteboard. Always replies.
    pub fn on_request_event(
        &self,
        conn: &dyn XConn,
        pasteboard: &Pasteboard,
        event: &SelectionRequestEvent,
    ) -> Result<()> {
        // Obsolete requestors pass no property
        let property = if event.property == NONE { event.target } else { event.property };

        let reply = if event.selection == self.selection && self.owned {
            self.convert(pasteboard, event.target)
        } else {
            None
        };

        let property = match reply {
            Some((type_, data)) => {
                conn.send(Request::ChangeProperty {
                    window: event.requestor,
                    property,
                    type_,
                    data,
                })?;
                property
            }
            None => {
                warn!(
                    "Refusing selection request for target {} from 0x{:x}",
                    event.target, event.requestor
                );
                NONE
            }
        };

        conn.send(Request::SendSelectionNotify {
            requestor: event.requestor,
            selection: event.selection,
            target: event.target,
            property,
            time: event.time,
        })
    }

    fn convert(&self, pasteboard: &Pasteboard, target: Atom) -> Option<(Atom, PropertyData)> {
        let a = &self.atoms;
        if target == a.targets {
            let mut targets = vec![
                a.targets,
                a.timestamp,
                a.utf8_string,
                AtomEnum::STRING.into(),
                a.text,
                a.text_plain_utf8,
            ];
            if pasteboard.read(ContentKind::RichText).is_some() {
                targets.push(a.text_rtf);
            }
            return Some((AtomEnum::ATOM.into(), PropertyData::Card32(targets)));
        }
        if target == a.timestamp {
            return Some((AtomEnum::INTEGER.into(), PropertyData::Card32(vec![self.owned_since])));
        }
        if target == a.utf8_string || target == a.text || target == a.text_plain_utf8 {
            let type_ = if target == a.text_plain_utf8 { target } else { a.utf8_string };
            return pasteboard
                .read(ContentKind::PlainText)
                .map(|bytes| (type_, PropertyData::Bytes(bytes)));
        }
        if target == Atom::from(AtomEnum::STRING) {
            return pasteboard
                .read(ContentKind::PlainText)
                .map(|bytes| (target, PropertyData::Bytes(latin1(&bytes))));
        }
        if target == a.text_rtf {
            return pasteboard
                .read(ContentKind::RichText)
                .map(|bytes| (target, PropertyData::Bytes(bytes)));
        }
        None
    }

    /// Start pulling the X selection, asking for `TARGETS` first
    pub fn request_targets(&mut self, conn: &dyn XConn, timestamp: Timestamp) -> Result<()> {
        if let Some(pending) = self.pending {
            if timestamp.wrapping_sub(pending.time) <= self.stale_after {
                trace!("Conversion outstanding, deferring pull at {}", timestamp);
                self.deferred = Some(timestamp);
                return Ok(());
            }
            warn!("Abandoning stale conversion of {} from {}", pending.target, pending.time);
            self.pending = None;
        }
        self.convert_selection(conn, self.atoms.targets, timestamp, false)
    }

    fn convert_selection(&mut self, conn: &dyn XConn, target: Atom, time: Timestamp, fallback: bool) -> Result<()> {
        conn.send(Request::ConvertSelection {
            requestor: self.window,
            selection: self.selection,
            target,
            property: self.atoms.selection_property,
            time,
        })?;
        self.pending = Some(Conversion { target, time, fallback });
        Ok(())
    }

    /// Reply to our own conversion request
    pub fn on_notify_event(
        &mut self,
        conn: &dyn XConn,
        pasteboard: &mut Pasteboard,
        event: &SelectionNotifyEvent,
    ) -> Result<()> {
        let Some(pending) = self.pending else {
            trace!("Unexpected SelectionNotify for target {}", event.target);
            return Ok(());
        };
        if event.selection != self.selection || event.time != pending.time {
            trace!("Ignoring SelectionNotify from {} (waiting on {})", event.time, pending.time);
            return Ok(());
        }
        self.pending = None;

        if event.property == NONE {
            if pending.target == self.atoms.targets && !pending.fallback {
                debug!("TARGETS refused, trying UTF8_STRING");
                return self.convert_selection(conn, self.atoms.utf8_string, pending.time, true);
            }
            warn!("Selection owner refused conversion to {}", pending.target);
            return self.finish(conn);
        }

        let property = conn.get_property(self.window, event.property, true)?;
        let Some(property) = property else {
            warn!("Converted selection property vanished");
            return self.finish(conn);
        };
        if property.type_ == self.atoms.incr {
            warn!("Incremental selection transfers are not supported");
            return self.finish(conn);
        }

        if pending.target == self.atoms.targets {
            let offered = property.value32();
            return match self.best_text_target(&offered) {
                Some(target) => self.convert_selection(conn, target, pending.time, pending.fallback),
                None => {
                    debug!("Selection offers no text target");
                    self.finish(conn)
                }
            };
        }

        let text = if pending.target == Atom::from(AtomEnum::STRING) {
            property.value.iter().map(|&b| b as char).collect()
        } else {
            String::from_utf8_lossy(&property.value).into_owned()
        };
        self.synced_change_count = pasteboard.declare(PasteboardContent::text(text));
        self.finish(conn)
    }

    fn best_text_target(&self, offered: &[Atom]) -> Option<Atom> {
        let a = &self.atoms;
        [a.utf8_string, a.text_plain_utf8, AtomEnum::STRING.into()]
            .into_iter()
            .find(|target| offered.contains(target))
    }

    /// Back to idle; start the deferred pull if there is one
    fn finish(&mut self, conn: &dyn XConn) -> Result<()> {
        match self.deferred.take() {
            Some(time) => self.convert_selection(conn, self.atoms.targets, time, false),
            None => Ok(()),
        }
    }

    pub fn shutdown(&mut self, conn: &dyn XConn, timestamp: Timestamp) -> Result<()> {
        if self.owned {
            conn.send(Request::SetSelectionOwner { owner: NONE, selection: self.selection, time: timestamp })?;
            self.owned = false;
        }
        self.pending = None;
        self.deferred = None;
        conn.send(Request::DestroyWindow(self.window))
    }
}

/// UTF-8 to Latin-1, unrepresentable characters become `?`
fn latin1(bytes: &[u8]) -> Vec<u8> {
    String::from_utf8_lossy(bytes)
        .chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wm::testing::{RecordingConn, test_atoms};
    use crate::wm::xconn::Property;
    use x11rb::protocol::xproto::{SELECTION_NOTIFY_EVENT, SELECTION_REQUEST_EVENT};

    const REQUESTOR: Window = 0x77;

    fn proxy(conn: &RecordingConn, atoms: &Atoms) -> SelectionProxy {
        let proxy = SelectionProxy::new(conn, atoms, &SelectionConfig::default()).unwrap();
        conn.take_requests();
        proxy
    }

    fn owner_changes(requests: &[Request]) -> usize {
        requests
            .iter()
            .filter(|r| matches!(r, Request::SetSelectionOwner { .. }))
            .count()
    }

    fn request(atoms: &Atoms, target: Atom, property: Atom) -> SelectionRequestEvent {
        SelectionRequestEvent {
            response_type: SELECTION_REQUEST_EVENT,
            sequence: 0,
            time: 50,
            owner: 0,
            requestor: REQUESTOR,
            selection: atoms.clipboard,
            target,
            property,
        }
    }

    fn notify(atoms: &Atoms, target: Atom, property: Atom, time: Timestamp) -> SelectionNotifyEvent {
        SelectionNotifyEvent {
            response_type: SELECTION_NOTIFY_EVENT,
            sequence: 0,
            time,
            requestor: 0,
            selection: atoms.clipboard,
            target,
            property,
        }
    }

    #[test]
    fn test_become_active_twice_owns_once() {
        let conn = RecordingConn::new();
        let atoms = test_atoms();
        let mut p = proxy(&conn, &atoms);
        let mut pb = Pasteboard::local();
        pb.mirror_host(PasteboardContent::text("hi"));

        p.become_active(&conn, &pb, 10).unwrap();
        p.become_active(&conn, &pb, 11).unwrap();
        assert_eq!(owner_changes(&conn.take_requests()), 1);

        pb.mirror_host(PasteboardContent::text("again"));
        p.become_active(&conn, &pb, 12).unwrap();
        assert_eq!(owner_changes(&conn.take_requests()), 1);
    }

    #[test]
    fn test_serves_utf8_text() {
        let conn = RecordingConn::new();
        let atoms = test_atoms();
        let mut p = proxy(&conn, &atoms);
        let mut pb = Pasteboard::local();
        pb.mirror_host(PasteboardContent::text("héllo"));
        p.copy_to_x(&conn, &pb, 10).unwrap();
        conn.take_requests();

        p.on_request_event(&conn, &pb, &request(&atoms, atoms.utf8_string, 900)).unwrap();
        let requests = conn.take_requests();
        assert_eq!(
            requests[0],
            Request::ChangeProperty {
                window: REQUESTOR,
                property: 900,
                type_: atoms.utf8_string,
                data: PropertyData::Bytes("héllo".as_bytes().to_vec()),
            }
        );
        assert!(matches!(requests[1], Request::SendSelectionNotify { property: 900, .. }));
    }

    #[test]
    fn test_string_target_is_latin1() {
        assert_eq!(latin1("hé€".as_bytes()), vec![b'h', 0xe9, b'?']);
    }

    #[test]
    fn test_unsupported_target_is_refused() {
        let conn = RecordingConn::new();
        let atoms = test_atoms();
        let mut p = proxy(&conn, &atoms);
        let mut pb = Pasteboard::local();
        pb.mirror_host(PasteboardContent::text("x"));
        p.copy_to_x(&conn, &pb, 10).unwrap();
        conn.take_requests();

        p.on_request_event(&conn, &pb, &request(&atoms, 4242, 900)).unwrap();
        assert_eq!(
            conn.take_requests(),
            vec![Request::SendSelectionNotify {
                requestor: REQUESTOR,
                selection: atoms.clipboard,
                target: 4242,
                property: NONE,
                time: 50,
            }]
        );
    }

    #[test]
    fn test_obsolete_requestor_gets_target_as_property() {
        let conn = RecordingConn::new();
        let atoms = test_atoms();
        let mut p = proxy(&conn, &atoms);
        let mut pb = Pasteboard::local();
        pb.mirror_host(PasteboardContent::text("x"));
        p.copy_to_x(&conn, &pb, 10).unwrap();
        conn.take_requests();

        p.on_request_event(&conn, &pb, &request(&atoms, atoms.targets, NONE)).unwrap();
        let requests = conn.take_requests();
        assert!(matches!(requests[0], Request::ChangeProperty { property, .. } if property == atoms.targets));
    }

    #[test]
    fn test_pull_targets_then_text() {
        let conn = RecordingConn::new();
        let atoms = test_atoms();
        let mut p = proxy(&conn, &atoms);
        let mut pb = Pasteboard::local();

        p.become_inactive(&conn, 100).unwrap();
        assert!(p.is_awaiting_notify());
        conn.set_property(
            p.window(),
            atoms.selection_property,
            Property::from_u32s(AtomEnum::ATOM.into(), &[atoms.targets, atoms.utf8_string]),
        );
        p.on_notify_event(&conn, &mut pb, &notify(&atoms, atoms.targets, atoms.selection_property, 100))
            .unwrap();
        assert!(conn.take_requests().contains(&Request::ConvertSelection {
            requestor: p.window(),
            selection: atoms.clipboard,
            target: atoms.utf8_string,
            property: atoms.selection_property,
            time: 100,
        }));

        conn.set_property(
            p.window(),
            atoms.selection_property,
            Property::from_bytes(atoms.utf8_string, b"copied"),
        );
        p.on_notify_event(&conn, &mut pb, &notify(&atoms, atoms.utf8_string, atoms.selection_property, 100))
            .unwrap();
        assert!(!p.is_awaiting_notify());
        assert_eq!(pb.read(ContentKind::PlainText), Some(b"copied".to_vec()));

        // Content that came from X is not offered back to X
        p.become_active(&conn, &pb, 120).unwrap();
        assert_eq!(owner_changes(&conn.take_requests()), 0);
    }

    #[test]
    fn test_second_pull_waits_then_runs() {
        let conn = RecordingConn::new();
        let atoms = test_atoms();
        let mut p = proxy(&conn, &atoms);
        let mut pb = Pasteboard::local();

        p.request_targets(&conn, 100).unwrap();
        p.request_targets(&conn, 200).unwrap();
        assert_eq!(conn.take_requests().len(), 1);

        // Refused TARGETS falls back once, then the deferred pull starts
        p.on_notify_event(&conn, &mut pb, &notify(&atoms, atoms.targets, NONE, 100)).unwrap();
        p.on_notify_event(&conn, &mut pb, &notify(&atoms, atoms.utf8_string, NONE, 100)).unwrap();
        let requests = conn.take_requests();
        assert_eq!(requests.len(), 2);
        assert!(matches!(requests[1], Request::ConvertSelection { time: 200, .. }));
    }

    #[test]
    fn test_stale_conversion_is_abandoned() {
        let conn = RecordingConn::new();
        let atoms = test_atoms();
        let mut p = proxy(&conn, &atoms);

        p.request_targets(&conn, 100).unwrap();
        p.request_targets(&conn, 100 + 5000).unwrap();
        let requests = conn.take_requests();
        assert_eq!(requests.len(), 2);
        assert!(matches!(requests[1], Request::ConvertSelection { time: 5100, .. }));
    }

    #[test]
    fn test_mismatched_notify_ignored_and_clear_resets() {
        let conn = RecordingConn::new();
        let atoms = test_atoms();
        let mut p = proxy(&conn, &atoms);
        let mut pb = Pasteboard::local();

        p.request_targets(&conn, 100).unwrap();
        p.on_notify_event(&conn, &mut pb, &notify(&atoms, atoms.targets, NONE, 99)).unwrap();
        assert!(p.is_awaiting_notify());

        p.on_clear_event(&SelectionClearEvent {
            response_type: x11rb::protocol::xproto::SELECTION_CLEAR_EVENT,
            sequence: 0,
            time: 101,
            owner: p.window(),
            selection: atoms.clipboard,
        });
        assert!(!p.is_awaiting_notify());
        assert!(!p.owns_selection());
    }

    #[test]
    fn test_incr_is_refused() {
        let conn = RecordingConn::new();
        let atoms = test_atoms();
        let mut p = proxy(&conn, &atoms);
        let mut pb = Pasteboard::local();

        p.request_targets(&conn, 100).unwrap();
        conn.set_property(p.window(), atoms.selection_property, Property::from_u32s(atoms.incr, &[4096]));
        p.on_notify_event(&conn, &mut pb, &notify(&atoms, atoms.targets, atoms.selection_property, 100))
            .unwrap();
        assert!(!p.is_awaiting_notify());
        assert!(!pb.has_content());
    }
}
