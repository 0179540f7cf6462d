//! Network resources assembled from lifecycle messages.
//!
//! A resource is created by its start message and then updated by any
//! number of response, data, update and finish messages, each of which
//! only touches the fields it carries. Messages can arrive out of order:
//! an update after the finish still fills in what it flags. A resource may
//! never finish, in which case its end time stays unset.
//!
//! All times stored here are ms relative to the session base time.

use serde::Serialize;
use speedtrace_model::raw::Headers;
use speedtrace_model::{
    HintRecord, ResourceData, ResourceFinish, ResourceResponse, ResourceStart, ResourceUpdate,
};
use std::collections::BTreeMap;

/// Coarse resource category, derived from the response mime type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResourceType {
    Document,
    Stylesheet,
    Script,
    Image,
    Favicon,
    Other,
}

impl ResourceType {
    /// Classifies a resource from a `Content-Type` style mime string and
    /// its URL.
    pub fn classify(content_type: &str, url: &str) -> ResourceType {
        let Some(mime) = leading_mime_type(content_type) else {
            return ResourceType::Other;
        };
        match mime.as_str() {
            "text/plain" | "text/html" | "text/xml" | "application/xml" | "application/json" => {
                ResourceType::Document
            }
            "text/css" => ResourceType::Stylesheet,
            "text/javascript" | "application/javascript" | "application/x-javascript" => {
                ResourceType::Script
            }
            _ if mime == "image/vnd.microsoft.icon"
                || url.to_ascii_lowercase().ends_with("/favicon.ico") =>
            {
                ResourceType::Favicon
            }
            _ if mime.starts_with("image/") => ResourceType::Image,
            _ => ResourceType::Other,
        }
    }
}

/// The `type/subtype` prefix of a content type, lowercased.
fn leading_mime_type(content_type: &str) -> Option<String> {
    let essence = content_type.split(';').next()?;
    let (kind, subtype) = essence.split_once('/')?;
    if kind.is_empty() || subtype.is_empty() || subtype.contains('/') {
        return None;
    }
    Some(essence.trim_end().to_ascii_lowercase())
}

/// Where a resource is in its lifecycle. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResourceState {
    Started,
    Responded,
    ReceivingData,
    Finished,
    Failed,
}

impl ResourceState {
    fn rank(self) -> u8 {
        match self {
            ResourceState::Started => 0,
            ResourceState::Responded => 1,
            ResourceState::ReceivingData => 2,
            ResourceState::Finished | ResourceState::Failed => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.rank() == 3
    }
}

pub fn is_redirect(status_code: i32) -> bool {
    status_code == 301 || status_code == 302
}

// ============================================================================
// Resource
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkResource {
    pub identifier: u64,
    pub url: String,
    pub http_method: String,
    pub is_main_resource: bool,
    pub start_time: f64,
    pub state: ResourceState,

    pub domain: Option<String>,
    pub path: Option<String>,
    pub last_path_component: String,
    pub request_headers: Headers,
    pub cached: bool,

    pub mime_type: Option<String>,
    pub status_code: i32,
    pub response_headers: Headers,
    pub expected_content_length: i64,
    pub content_length: i64,
    /// Bytes seen across data messages.
    pub data_length: i64,

    pub response_received_time: Option<f64>,
    pub end_time: Option<f64>,
    /// Start time reported by update messages. Kept for matching up
    /// redirects, which keep their original identifier.
    pub other_start_time: Option<f64>,
    pub did_fail: bool,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<HintRecord>,
}

impl NetworkResource {
    pub fn start(message: &ResourceStart, time: f64) -> Self {
        Self {
            identifier: message.identifier,
            url: message.url.clone(),
            http_method: message.http_method.clone(),
            is_main_resource: message.is_main_resource,
            start_time: time,
            state: ResourceState::Started,
            domain: None,
            path: None,
            last_path_component: "/".to_string(),
            request_headers: message.request_headers.clone(),
            cached: false,
            mime_type: None,
            status_code: -1,
            response_headers: Headers::new(),
            expected_content_length: -1,
            content_length: -1,
            data_length: 0,
            response_received_time: None,
            end_time: None,
            other_start_time: None,
            did_fail: false,
            hints: message.hints.clone(),
        }
    }

    fn advance(&mut self, next: ResourceState) {
        if next.rank() > self.state.rank() {
            self.state = next;
        }
    }

    pub fn apply_response(&mut self, message: &ResourceResponse, time: f64) {
        self.response_received_time = Some(time.max(self.start_time));
        self.expected_content_length = message.expected_content_length;
        if !message.mime_type.is_empty() {
            self.mime_type = Some(message.mime_type.clone());
        }
        self.status_code = message.status_code;
        if !message.response_headers.is_empty() {
            self.response_headers = message.response_headers.clone();
        }
        self.hints.extend(message.hints.iter().cloned());
        self.advance(ResourceState::Responded);
    }

    pub fn apply_data(&mut self, message: &ResourceData) {
        self.data_length += message.data_length.max(0);
        self.advance(ResourceState::ReceivingData);
    }

    /// Copies the field groups `update` flags as changed.
    ///
    /// `to_ms` converts the update's absolute times onto the session
    /// timeline. Timing only fills end and response times that are still
    /// unset, and only from positive source times.
    pub fn apply_update(&mut self, update: &ResourceUpdate, to_ms: impl Fn(f64) -> Option<f64>) {
        if update.did_request_change {
            if let Some(url) = &update.url {
                self.url = url.clone();
            }
            self.domain = update.domain.clone();
            self.path = update.path.clone();
            if let Some(last) = &update.last_path_component {
                self.last_path_component = last.clone();
            }
            self.request_headers = update.request_headers.clone();
            self.cached = update.cached;
        }

        if update.did_response_change {
            self.response_headers = update.response_headers.clone();
            if let Some(mime) = &update.mime_type {
                self.mime_type = Some(mime.clone());
            }
            if self.status_code < 0 {
                if let Some(status) = update.status_code {
                    self.status_code = status;
                }
            }
        }

        if update.did_length_change {
            if let Some(length) = update.content_length {
                self.content_length = length;
            }
        }

        if update.did_timing_change {
            let positive = |time: Option<f64>| time.filter(|t| *t > 0.0).and_then(&to_ms);
            if self.end_time.is_none() {
                self.end_time = positive(update.end_time);
            }
            if self.response_received_time.is_none() {
                self.response_received_time = positive(update.response_received_time);
            }
            if let Some(start) = positive(update.start_time) {
                self.other_start_time = Some(start);
            }
        }
    }

    pub fn apply_finish(&mut self, message: &ResourceFinish, time: f64) {
        self.end_time = Some(time);
        self.did_fail = message.did_fail;
        self.hints.extend(message.hints.iter().cloned());
        self.advance(if message.did_fail {
            ResourceState::Failed
        } else {
            ResourceState::Finished
        });
    }

    pub fn is_redirect(&self) -> bool {
        is_redirect(self.status_code)
    }

    pub fn resource_type(&self) -> ResourceType {
        let content_type = self
            .response_headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.as_str())
            .or(self.mime_type.as_deref());
        match content_type {
            Some(content_type) => ResourceType::classify(content_type, &self.url),
            None => ResourceType::Other,
        }
    }

    /// Total time from start to end, once the resource has ended.
    pub fn duration(&self) -> Option<f64> {
        self.end_time.map(|end| end - self.start_time)
    }
}

// ============================================================================
// Model
// ============================================================================

/// All resources of a session, keyed by identifier.
#[derive(Debug, Default)]
pub struct NetworkModel {
    resources: BTreeMap<u64, NetworkResource>,
}

impl NetworkModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn resource(&self, identifier: u64) -> Option<&NetworkResource> {
        self.resources.get(&identifier)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NetworkResource> {
        self.resources.values()
    }

    /// Creates a resource. A second start for a live identifier is ignored.
    pub fn start(&mut self, message: &ResourceStart, time: f64) -> bool {
        if self.resources.contains_key(&message.identifier) {
            tracing::debug!(
                identifier = message.identifier,
                "duplicate resource start, keeping the first"
            );
            return false;
        }
        self.resources
            .insert(message.identifier, NetworkResource::start(message, time));
        true
    }

    fn lookup(&mut self, identifier: u64, kind: &'static str) -> Option<&mut NetworkResource> {
        let resource = self.resources.get_mut(&identifier);
        if resource.is_none() {
            tracing::debug!(identifier, kind, "message for unknown resource, dropping it");
        }
        resource
    }

    pub fn response(&mut self, message: &ResourceResponse, time: f64) -> bool {
        self.lookup(message.identifier, "response")
            .map(|resource| resource.apply_response(message, time))
            .is_some()
    }

    pub fn data(&mut self, message: &ResourceData) -> bool {
        self.lookup(message.identifier, "data")
            .map(|resource| resource.apply_data(message))
            .is_some()
    }

    pub fn update(&mut self, message: &ResourceUpdate, to_ms: impl Fn(f64) -> Option<f64>) -> bool {
        self.lookup(message.identifier, "update")
            .map(|resource| resource.apply_update(message, to_ms))
            .is_some()
    }

    pub fn finish(&mut self, message: &ResourceFinish, time: f64) -> bool {
        self.lookup(message.identifier, "finish")
            .map(|resource| resource.apply_finish(message, time))
            .is_some()
    }
}
