//! Session-scoped registry of custom event types and type colors.
//!
//! Custom types are allocated negative ids on first sight of their name,
//! starting at `-2` and counting down. The registry is append-only: ids are
//! never reused or removed for the lifetime of the registry. Reads and
//! writes go through an `RwLock`, so a registry can be shared between
//! ingestion threads behind an `Arc`.

use crate::event_type::EventType;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Color used for types with no registered color.
pub const OTHER_COLOR: &str = "lightgrey";

#[derive(Debug)]
struct Inner {
    ids_by_name: HashMap<String, EventType>,
    names_by_id: HashMap<EventType, String>,
    colors: HashMap<EventType, String>,
    next_custom: i32,
}

/// Maps custom type names to ids and event types to display colors.
#[derive(Debug)]
pub struct EventTypeRegistry {
    inner: RwLock<Inner>,
}

impl EventTypeRegistry {
    /// Creates a registry seeded with the built-in type colors.
    pub fn new() -> Self {
        let colors = [
            (EventType::DOM_EVENT, "orange"),
            (EventType::LAYOUT, "blueviolet"),
            (EventType::PAINT, "midnightblue"),
            (EventType::PARSE_HTML, "indianred"),
            (EventType::LOG_MESSAGE, "cyan"),
            (EventType::TIMER_FIRED, "blue"),
            (EventType::XHR_READY_STATE_CHANGE, "lightgreen"),
            (EventType::RECALC_STYLE, "darkgreen"),
            (EventType::EVAL_SCRIPT, "peachpuff"),
            (EventType::JAVASCRIPT_EXECUTION, "yellow"),
            (EventType::RESOURCE_DATA_RECEIVED, "darkblue"),
            (EventType::GC, "brown"),
        ]
        .into_iter()
        .map(|(t, c)| (t, c.to_string()))
        .collect();

        Self {
            inner: RwLock::new(Inner {
                ids_by_name: HashMap::new(),
                names_by_id: HashMap::new(),
                colors,
                next_custom: EventType::FIRST_CUSTOM.0,
            }),
        }
    }

    // A panic while holding the lock cannot leave the maps half-updated, so
    // a poisoned lock is still safe to use.
    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the id for `name`, allocating one on first sight.
    ///
    /// A color given on first registration is recorded for the new id.
    /// Later registrations of the same name return the existing id and do
    /// not touch its color.
    pub fn register_custom(&self, name: &str, color: Option<&str>) -> EventType {
        if let Some(id) = self.read().ids_by_name.get(name) {
            return *id;
        }

        let mut inner = self.write();
        // Another writer may have won the race between the two locks.
        if let Some(id) = inner.ids_by_name.get(name) {
            return *id;
        }
        let id = EventType(inner.next_custom);
        inner.next_custom -= 1;
        inner.ids_by_name.insert(name.to_string(), id);
        inner.names_by_id.insert(id, name.to_string());
        if let Some(color) = color {
            inner.colors.insert(id, color.to_string());
        }
        tracing::debug!(name, id = id.0, "registered custom event type");
        id
    }

    pub fn custom_id(&self, name: &str) -> Option<EventType> {
        self.read().ids_by_name.get(name).copied()
    }

    pub fn custom_name(&self, id: EventType) -> Option<String> {
        self.read().names_by_id.get(&id).cloned()
    }

    pub fn custom_count(&self) -> usize {
        self.read().ids_by_name.len()
    }

    pub fn register_color(&self, event_type: EventType, color: &str) {
        self.write().colors.insert(event_type, color.to_string());
    }

    /// Display color for a type, falling back to [`OTHER_COLOR`].
    pub fn color_for(&self, event_type: EventType) -> String {
        self.read()
            .colors
            .get(&event_type)
            .cloned()
            .unwrap_or_else(|| OTHER_COLOR.to_string())
    }
}

impl Default for EventTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
