//! Raw event normalization.
//!
//! Raw event trees carry timeline type names and absolute timestamps in the
//! source clock. Normalizing translates the type into an [`EventType`] and
//! rewrites every timestamp as milliseconds relative to the session base
//! time. The traversal is postorder, so children are finished before their
//! parent is visited.

use crate::config::TimeUnit;
use speedtrace_model::{EventType, EventTypeRegistry, PendingEvent, RawEvent, RawType, UiEvent};
use std::collections::HashSet;

/// Converts raw events onto the session timeline.
#[derive(Debug)]
pub struct Normalizer {
    unit: TimeUnit,
    /// Base time in raw source units.
    base_time: Option<f64>,
    warned: HashSet<String>,
}

impl Normalizer {
    pub fn new(unit: TimeUnit) -> Self {
        Self {
            unit,
            base_time: None,
            warned: HashSet::new(),
        }
    }

    /// The base time in raw source units, once established.
    pub fn base_time(&self) -> Option<f64> {
        self.base_time
    }

    pub fn set_base_time(&mut self, base_time: f64) {
        self.base_time = Some(base_time);
    }

    /// Converts an absolute source time to ms relative to the base time.
    ///
    /// Returns `None` before the base time is known or when the result is
    /// not a finite number.
    pub fn to_relative_ms(&self, raw_time: f64) -> Option<f64> {
        let base = self.base_time?;
        let ms = (raw_time - base) * self.unit.to_ms();
        ms.is_finite().then_some(ms)
    }

    /// Translates the type of `raw` into an [`EventType`].
    ///
    /// Events carrying a `typeName` are custom and get registered. Unknown
    /// timeline names map to [`EventType::INVALID`] and are reported once.
    pub fn translate_type(&mut self, raw: &RawEvent, registry: &EventTypeRegistry) -> EventType {
        self.translate(
            &raw.raw_type,
            raw.type_name.as_deref(),
            raw.color.as_deref(),
            registry,
        )
    }

    fn translate(
        &mut self,
        raw_type: &RawType,
        type_name: Option<&str>,
        color: Option<&str>,
        registry: &EventTypeRegistry,
    ) -> EventType {
        if let Some(name) = type_name {
            return registry.register_custom(name, color);
        }
        match raw_type {
            RawType::Code(code) => EventType(*code),
            RawType::Name(name) => match EventType::from_raw_name(name) {
                Some(event_type) => event_type,
                None => {
                    if self.warned.insert(name.clone()) {
                        tracing::warn!(type_name = %name, "unknown event type, marking it invalid");
                    }
                    EventType::INVALID
                }
            },
        }
    }

    /// Normalizes a whole raw event tree.
    ///
    /// Returns `None` if the root's start time cannot be placed on the
    /// timeline.
    pub fn normalize(&mut self, raw: RawEvent, registry: &EventTypeRegistry) -> Option<PendingEvent> {
        let time = self.to_relative_ms(raw.start_time)?;
        Some(self.normalize_node(raw, registry, time))
    }

    fn normalize_node(
        &mut self,
        raw: RawEvent,
        registry: &EventTypeRegistry,
        fallback_time: f64,
    ) -> PendingEvent {
        let RawEvent {
            raw_type,
            start_time,
            end_time,
            duration,
            children,
            data,
            stack_trace,
            type_name,
            color,
        } = raw;

        // A child with an unusable start is pinned to its parent's start.
        let time = self.to_relative_ms(start_time).unwrap_or(fallback_time);

        let children: Vec<PendingEvent> = children
            .into_iter()
            .map(|child| self.normalize_node(child, registry, time))
            .collect();

        let event_type = self.translate(&raw_type, type_name.as_deref(), color.as_deref(), registry);
        let duration = self.duration_ms(start_time, end_time, duration);

        let mut event = UiEvent::new(event_type, time, duration);
        event.data = data;
        event.stack_trace = stack_trace;
        PendingEvent { event, children }
    }

    fn duration_ms(&self, start_time: f64, end_time: Option<f64>, duration: Option<f64>) -> f64 {
        let ms = match (end_time, duration) {
            (Some(end), _) => (end - start_time) * self.unit.to_ms(),
            (None, Some(ms)) => ms,
            (None, None) => 0.0,
        };
        if ms.is_finite() && ms >= 0.0 {
            ms
        } else {
            tracing::debug!(duration = ms, "unusable event duration, using 0");
            0.0
        }
    }
}
