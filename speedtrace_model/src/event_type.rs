//! Event type taxonomy.
//!
//! Every timeline record carries an [`EventType`]. Built-in types use small
//! non-negative codes plus a handful of high sentinel codes for synthetic
//! records. `-1` is reserved for "invalid/unset", and everything at or below
//! `-2` is a custom type allocated at runtime by an
//! [`EventTypeRegistry`](crate::registry::EventTypeRegistry).

use crate::registry::EventTypeRegistry;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A numeric event type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventType(pub i32);

impl EventType {
    pub const INVALID: EventType = EventType(-1);
    /// First id handed out to a custom type. Later ones count downwards.
    pub const FIRST_CUSTOM: EventType = EventType(-2);

    pub const DOM_EVENT: EventType = EventType(0);
    pub const LAYOUT: EventType = EventType(1);
    pub const RECALC_STYLE: EventType = EventType(2);
    pub const PAINT: EventType = EventType(3);
    pub const PARSE_HTML: EventType = EventType(4);
    pub const TIMER_INSTALLED: EventType = EventType(5);
    pub const TIMER_CLEARED: EventType = EventType(6);
    pub const TIMER_FIRED: EventType = EventType(7);
    pub const XHR_READY_STATE_CHANGE: EventType = EventType(8);
    pub const XHR_LOAD: EventType = EventType(9);
    pub const EVAL_SCRIPT: EventType = EventType(10);
    pub const LOG_MESSAGE: EventType = EventType(11);
    pub const RESOURCE_SEND_REQUEST: EventType = EventType(12);
    pub const RESOURCE_RECEIVE_RESPONSE: EventType = EventType(13);
    pub const RESOURCE_FINISH: EventType = EventType(14);
    pub const JAVASCRIPT_EXECUTION: EventType = EventType(15);
    pub const RESOURCE_DATA_RECEIVED: EventType = EventType(16);
    pub const GC: EventType = EventType(17);
    pub const SCHEDULE_RESOURCE_REQUEST: EventType = EventType(18);
    pub const DOM_CONTENT_LOADED: EventType = EventType(19);
    pub const LOAD_EVENT: EventType = EventType(20);
    pub const PROGRAM: EventType = EventType(21);

    pub const AGGREGATED_EVENTS: EventType = EventType(0x7FFF_FFFF);
    pub const TAB_CHANGED: EventType = EventType(0x7FFF_FFFE);
    pub const RESOURCE_UPDATED: EventType = EventType(0x7FFF_FFFD);
    pub const PROFILE_DATA: EventType = EventType(0x7FFF_FFFC);

    /// Returns true for ids allocated by the custom type registry.
    pub fn is_custom(self) -> bool {
        self.0 <= Self::FIRST_CUSTOM.0
    }

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    /// Translates a raw timeline type string into its event type.
    ///
    /// Returns `None` for strings outside the table; callers decide how to
    /// report those.
    pub fn from_raw_name(name: &str) -> Option<EventType> {
        let event_type = match name {
            "Program" => Self::PROGRAM,
            "EventDispatch" => Self::DOM_EVENT,
            "Layout" => Self::LAYOUT,
            "RecalculateStyles" => Self::RECALC_STYLE,
            "Paint" => Self::PAINT,
            "ParseHTML" => Self::PARSE_HTML,
            "TimerInstall" => Self::TIMER_INSTALLED,
            "TimerRemove" => Self::TIMER_CLEARED,
            "TimerFire" => Self::TIMER_FIRED,
            "XHRReadyStateChange" => Self::XHR_READY_STATE_CHANGE,
            "XHRLoad" => Self::XHR_LOAD,
            "EvaluateScript" => Self::EVAL_SCRIPT,
            // MarkTimeline is the older spelling of TimeStamp.
            "MarkTimeline" | "TimeStamp" => Self::LOG_MESSAGE,
            "ScheduleResourceRequest" => Self::SCHEDULE_RESOURCE_REQUEST,
            "ResourceSendRequest" => Self::RESOURCE_SEND_REQUEST,
            "ResourceReceiveResponse" => Self::RESOURCE_RECEIVE_RESPONSE,
            "ResourceReceivedData" => Self::RESOURCE_DATA_RECEIVED,
            "ResourceFinish" => Self::RESOURCE_FINISH,
            "FunctionCall" => Self::JAVASCRIPT_EXECUTION,
            "GCEvent" => Self::GC,
            "MarkDOMContent" => Self::DOM_CONTENT_LOADED,
            "MarkLoad" => Self::LOAD_EVENT,
            _ => return None,
        };
        Some(event_type)
    }

    fn builtin(self) -> Option<(&'static str, &'static str)> {
        if (0..BUILTIN.len() as i32).contains(&self.0) {
            return Some(BUILTIN[self.0 as usize]);
        }
        match self {
            Self::AGGREGATED_EVENTS => Some((
                "AGGREGATED Events",
                "This event represents many short events that have been aggregated to help reduce the total amount of data displayed.",
            )),
            Self::TAB_CHANGED => Some((
                "Tab Changed",
                "Something about the Tab where the page viewed changed. Usually this is the title string or the location of the page.",
            )),
            Self::RESOURCE_UPDATED => Some((
                "Resource Updated",
                "Details about a Network Resource were updated.",
            )),
            Self::PROFILE_DATA => Some((
                "JavaScript CPU profile data",
                "Contains raw data from the JavaScript engine profiler.",
            )),
            _ => None,
        }
    }

    /// Short display label. Custom types resolve through `registry`.
    pub fn label(self, registry: &EventTypeRegistry) -> String {
        if let Some((label, _)) = self.builtin() {
            return label.to_string();
        }
        if self.is_custom() {
            if let Some(name) = registry.custom_name(self) {
                return name;
            }
        }
        format!("(Unknown Event Type: {})", self.0)
    }

    /// Long help text. Custom types resolve through `registry`.
    pub fn help(self, registry: &EventTypeRegistry) -> String {
        if let Some((_, help)) = self.builtin() {
            return help.to_string();
        }
        if self.is_custom() {
            if let Some(name) = registry.custom_name(self) {
                return format!("Custom Event Type: {}", name);
            }
        }
        format!("(Unknown Event Type: {})", self.0)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.builtin() {
            Some((label, _)) => f.write_str(label),
            None => write!(f, "{}", self.0),
        }
    }
}

const BUILTIN: [(&str, &str); 22] = [
    (
        "Dom Event",
        "A top level DOM event fired, such as mousemove or DOMContentLoaded fired.",
    ),
    (
        "Layout",
        "The browser's rendering engine performed layout calculations.",
    ),
    ("Style Recalculation", "The renderer recalculated CSS styles."),
    (
        "Paint",
        "The browser's rendering engine updated the screen.",
    ),
    ("Parse HTML", "A block of HTML was parsed."),
    ("Timer Installed", "A new JavaScript timer was created."),
    ("Timer Cleared", "A JavaScript timer was cancelled."),
    (
        "Timer Fire",
        "A block of JavaScript was executed due to a JavaScript timer firing.",
    ),
    (
        "XMLHttpRequest",
        "The handler for an XMLHttpRequest ran. Check the state field to see if this is an intermediate state or the last call for the request.",
    ),
    ("XHR Load", "The onload handler for an XMLHttpRequest ran."),
    (
        "Script Evaluation",
        "A block of JavaScript was parsed/compiled and executed. This only includes script encountered via an HTML <script> tag.",
    ),
    (
        "Log Message",
        "A log message written using console.markTimeline.",
    ),
    ("Resource Request", "A network request was queued up to send."),
    (
        "Resource Response",
        "A network resource load began to receive data from the server.",
    ),
    (
        "Resource Finish",
        "A new request for a network resource completed.",
    ),
    ("JavaScript Callback", "JavaScript was run in an event dispatch."),
    (
        "Resource Data Received",
        "Processing a file received by the resource loader.",
    ),
    (
        "Garbage Collection",
        "The JavaScript engine ran its garbage collector to reclaim memory.",
    ),
    (
        "Schedule Resource Request",
        "A network request was scheduled by the resource loader.",
    ),
    (
        "DOMContentLoaded",
        "The DOMContentLoaded event fired for the page.",
    ),
    ("Load", "The load event fired for the page."),
    (
        "Program",
        "A top level task run by the renderer's message loop.",
    ),
];
