//! Event decoding and dispatch
//!
//! Event frames are decoded into a typed [`Event`] and handed to at most one
//! callback per [`EventCategory`]. Registering a second callback for a
//! category replaces the first.
//!
//! Callbacks run on the read loop's task. A callback that blocks stalls
//! every later event *and* every pending reply until it returns.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::IpcError;
use crate::message::EventKind;
use crate::types::TreeNode;

/// Why a workspace event fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceChange {
    Focus,
    Init,
    Empty,
    Urgent,
}

/// Payload of a workspace event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceEvent {
    pub change: WorkspaceChange,
    /// Workspace that now has focus (or was created, emptied, marked urgent)
    #[serde(default)]
    pub current: Option<TreeNode>,
    /// Previously focused workspace, only set for `focus`
    #[serde(default)]
    pub old: Option<TreeNode>,
}

/// Payload of a binding mode event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeEvent {
    /// Name of the mode now active, `default` when leaving a mode
    pub change: String,
    #[serde(default)]
    pub pango_markup: bool,
}

/// Payload of a window event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowEvent {
    /// e.g. `new`, `close`, `focus`, `title`
    pub change: String,
    pub container: TreeNode,
}

/// A decoded event
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Workspace(WorkspaceEvent),
    /// Outputs changed; i3 sends no useful detail
    Output,
    Mode(ModeEvent),
    Window(WindowEvent),
}

/// Key under which a callback is registered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    WorkspaceFocus,
    WorkspaceInit,
    WorkspaceEmpty,
    WorkspaceUrgent,
    Output,
    Mode,
    Window,
}

impl Event {
    /// Decode an event payload of the given kind
    ///
    /// # Errors
    ///
    /// Returns `IpcError::EventDecode` if the payload does not match the
    /// kind's shape, including an unknown workspace change.
    pub fn decode(kind: EventKind, payload: &[u8]) -> Result<Self, IpcError> {
        fn parse<T: serde::de::DeserializeOwned>(
            kind: EventKind,
            payload: &[u8],
        ) -> Result<T, IpcError> {
            serde_json::from_slice(payload).map_err(|source| IpcError::EventDecode { kind, source })
        }

        let event = match kind {
            EventKind::Workspace => Event::Workspace(parse(kind, payload)?),
            EventKind::Output => Event::Output,
            EventKind::Mode => Event::Mode(parse(kind, payload)?),
            EventKind::Window => Event::Window(parse(kind, payload)?),
        };
        Ok(event)
    }

    pub fn category(&self) -> EventCategory {
        match self {
            Event::Workspace(ws) => match ws.change {
                WorkspaceChange::Focus => EventCategory::WorkspaceFocus,
                WorkspaceChange::Init => EventCategory::WorkspaceInit,
                WorkspaceChange::Empty => EventCategory::WorkspaceEmpty,
                WorkspaceChange::Urgent => EventCategory::WorkspaceUrgent,
            },
            Event::Output => EventCategory::Output,
            Event::Mode(_) => EventCategory::Mode,
            Event::Window(_) => EventCategory::Window,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Event::Workspace(_) => EventKind::Workspace,
            Event::Output => EventKind::Output,
            Event::Mode(_) => EventKind::Mode,
            Event::Window(_) => EventKind::Window,
        }
    }
}

impl EventCategory {
    pub const ALL: [EventCategory; 7] = [
        EventCategory::WorkspaceFocus,
        EventCategory::WorkspaceInit,
        EventCategory::WorkspaceEmpty,
        EventCategory::WorkspaceUrgent,
        EventCategory::Output,
        EventCategory::Mode,
        EventCategory::Window,
    ];

    /// The event kind that must be subscribed to for this category to fire
    pub fn kind(self) -> EventKind {
        match self {
            EventCategory::WorkspaceFocus
            | EventCategory::WorkspaceInit
            | EventCategory::WorkspaceEmpty
            | EventCategory::WorkspaceUrgent => EventKind::Workspace,
            EventCategory::Output => EventKind::Output,
            EventCategory::Mode => EventKind::Mode,
            EventCategory::Window => EventKind::Window,
        }
    }
}

type Callback = Arc<dyn Fn(&Event) + Send + Sync>;

/// Per-category callback registry
#[derive(Default)]
pub struct EventDispatcher {
    handlers: RwLock<HashMap<EventCategory, Callback>>,
    paused: AtomicBool,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("EventDispatcher")
            .field("categories", &handlers.keys().collect::<Vec<_>>())
            .field("paused", &self.is_paused())
            .finish()
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `category`, replacing any earlier one
    ///
    /// Returns `true` if a callback was replaced.
    pub fn on<F>(&self, category: EventCategory, callback: F) -> bool
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let previous = self
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(category, Arc::new(callback));
        if previous.is_some() {
            debug!(?category, "Replaced event callback");
        }
        previous.is_some()
    }

    /// Unregister the callback for `category`; returns whether one existed
    pub fn remove(&self, category: EventCategory) -> bool {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&category)
            .is_some()
    }

    pub fn has_callback(&self, category: EventCategory) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&category)
    }

    /// Called with the newly focused workspace and the previous one
    pub fn on_workspace_focus<F>(&self, callback: F) -> bool
    where
        F: Fn(Option<&TreeNode>, Option<&TreeNode>) + Send + Sync + 'static,
    {
        self.on(EventCategory::WorkspaceFocus, move |event| {
            if let Event::Workspace(ws) = event {
                callback(ws.current.as_ref(), ws.old.as_ref());
            }
        })
    }

    pub fn on_workspace_init<F>(&self, callback: F) -> bool
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on(EventCategory::WorkspaceInit, move |_| callback())
    }

    pub fn on_workspace_empty<F>(&self, callback: F) -> bool
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on(EventCategory::WorkspaceEmpty, move |_| callback())
    }

    pub fn on_workspace_urgent<F>(&self, callback: F) -> bool
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on(EventCategory::WorkspaceUrgent, move |_| callback())
    }

    pub fn on_output<F>(&self, callback: F) -> bool
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on(EventCategory::Output, move |_| callback())
    }

    /// Called with the name of the binding mode just entered
    pub fn on_mode<F>(&self, callback: F) -> bool
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on(EventCategory::Mode, move |event| {
            if let Event::Mode(mode) = event {
                callback(&mode.change);
            }
        })
    }

    /// Called with the change reason and the affected container
    pub fn on_window<F>(&self, callback: F) -> bool
    where
        F: Fn(&str, &TreeNode) + Send + Sync + 'static,
    {
        self.on(EventCategory::Window, move |event| {
            if let Event::Window(window) = event {
                callback(&window.change, &window.container);
            }
        })
    }

    /// Drop events until [`EventDispatcher::resume`]
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Decode one event frame and run its callback
    ///
    /// Returns `Ok(true)` if a callback ran, `Ok(false)` if the event was
    /// dropped (paused or nobody registered).
    ///
    /// # Errors
    ///
    /// Returns `IpcError::EventDecode` if the payload is malformed. No
    /// callback runs in that case.
    pub fn dispatch(&self, kind: EventKind, payload: &[u8]) -> Result<bool, IpcError> {
        let event = Event::decode(kind, payload)?;
        Ok(self.deliver(&event))
    }

    /// Run the callback for an already decoded event
    pub fn deliver(&self, event: &Event) -> bool {
        let category = event.category();
        if self.is_paused() {
            debug!(?category, "Dispatcher paused, dropping event");
            return false;
        }

        // Clone out so the callback runs without the lock held
        let callback = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&category)
            .cloned();

        match callback {
            Some(callback) => {
                callback(event);
                true
            }
            None => {
                trace!(?category, "No callback registered for event");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    const FOCUS: &[u8] = br#"{
        "change": "focus",
        "current": {"id": 10, "name": "2", "type": "workspace", "focused": true},
        "old": {"id": 9, "name": "1", "type": "workspace"}
    }"#;

    fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        (count.clone(), count)
    }

    #[test]
    fn test_workspace_focus_delivers_nodes_once() {
        let dispatcher = EventDispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        dispatcher.on_workspace_focus(move |current, old| {
            sink.lock().unwrap().push((
                current.and_then(|n| n.name.clone()),
                old.and_then(|n| n.name.clone()),
            ));
        });

        assert!(dispatcher.dispatch(EventKind::Workspace, FOCUS).unwrap());
        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![(Some("2".to_string()), Some("1".to_string()))]
        );
    }

    #[test]
    fn test_workspace_change_routes_to_its_category() {
        let dispatcher = EventDispatcher::new();
        let (init, init_seen) = counter();
        let (focus, focus_seen) = counter();
        dispatcher.on_workspace_init(move || {
            init.fetch_add(1, Ordering::SeqCst);
        });
        dispatcher.on_workspace_focus(move |_, _| {
            focus.fetch_add(1, Ordering::SeqCst);
        });

        let payload = br#"{"change": "init", "current": {"id": 3, "type": "workspace"}}"#;
        assert!(dispatcher.dispatch(EventKind::Workspace, payload).unwrap());
        assert_eq!(init_seen.load(Ordering::SeqCst), 1);
        assert_eq!(focus_seen.load(Ordering::SeqCst), 0);

        // No urgent callback registered
        let payload = br#"{"change": "urgent"}"#;
        assert!(!dispatcher.dispatch(EventKind::Workspace, payload).unwrap());
    }

    #[test]
    fn test_unknown_workspace_change_fails_closed() {
        let dispatcher = EventDispatcher::new();
        let (count, seen) = counter();
        dispatcher.on(EventCategory::WorkspaceFocus, move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        });

        let err = dispatcher
            .dispatch(EventKind::Workspace, br#"{"change": "reload"}"#)
            .unwrap_err();
        assert!(
            matches!(err, IpcError::EventDecode { kind: EventKind::Workspace, .. }),
            "{err:?}"
        );
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_registration_replaces() {
        let dispatcher = EventDispatcher::new();
        let (first, first_seen) = counter();
        let (second, second_seen) = counter();

        assert!(!dispatcher.on_output(move || {
            first.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(dispatcher.on_output(move || {
            second.fetch_add(1, Ordering::SeqCst);
        }));

        dispatcher.dispatch(EventKind::Output, br#"{"change":"unspecified"}"#).unwrap();
        assert_eq!(first_seen.load(Ordering::SeqCst), 0);
        assert_eq!(second_seen.load(Ordering::SeqCst), 1);

        assert!(dispatcher.remove(EventCategory::Output));
        assert!(!dispatcher.has_callback(EventCategory::Output));
        assert!(!dispatcher.dispatch(EventKind::Output, b"{}").unwrap());
    }

    #[test]
    fn test_pause_drops_events() {
        let dispatcher = EventDispatcher::new();
        let (count, seen) = counter();
        dispatcher.on_mode(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        });

        dispatcher.pause();
        assert!(dispatcher.is_paused());
        assert!(!dispatcher.dispatch(EventKind::Mode, br#"{"change":"resize"}"#).unwrap());

        dispatcher.resume();
        assert!(dispatcher.dispatch(EventKind::Mode, br#"{"change":"default"}"#).unwrap());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_mode_and_window_payloads() {
        let dispatcher = EventDispatcher::new();
        let modes = Arc::new(Mutex::new(Vec::new()));
        let windows = Arc::new(Mutex::new(Vec::new()));

        let sink = modes.clone();
        dispatcher.on_mode(move |name| sink.lock().unwrap().push(name.to_string()));
        let sink = windows.clone();
        dispatcher.on_window(move |change, container| {
            sink.lock().unwrap().push((change.to_string(), container.window));
        });

        dispatcher
            .dispatch(EventKind::Mode, br#"{"change":"resize","pango_markup":false}"#)
            .unwrap();
        dispatcher
            .dispatch(
                EventKind::Window,
                br#"{"change":"title","container":{"id":5,"window":77,"name":"vim"}}"#,
            )
            .unwrap();

        assert_eq!(*modes.lock().unwrap(), vec!["resize".to_string()]);
        assert_eq!(*windows.lock().unwrap(), vec![("title".to_string(), Some(77))]);
    }

    #[test]
    fn test_callback_may_register_handlers() {
        let dispatcher = Arc::new(EventDispatcher::new());
        let inner = dispatcher.clone();
        dispatcher.on_output(move || {
            inner.on_output(|| {});
        });

        assert!(dispatcher.dispatch(EventKind::Output, b"{}").unwrap());
        assert!(dispatcher.has_callback(EventCategory::Output));
    }

    #[test]
    fn test_category_kind_mapping() {
        assert_eq!(EventCategory::WorkspaceUrgent.kind(), EventKind::Workspace);
        assert_eq!(EventCategory::Window.kind(), EventKind::Window);

        let event = Event::decode(EventKind::Mode, br#"{"change":"x"}"#).unwrap();
        assert_eq!(event.kind(), EventKind::Mode);
        assert_eq!(event.category(), EventCategory::Mode);
    }
}
