//! Raw records as they arrive from a timeline data source.
//!
//! Nothing here is normalized: UI event trees carry string types and
//! absolute timestamps, network messages carry absolute timestamps, and
//! profile records carry undecoded log text.

use crate::hint::HintRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Type discriminant of a raw UI event: a timeline type name or a code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawType {
    Code(i32),
    Name(String),
}

impl Default for RawType {
    fn default() -> Self {
        RawType::Code(-1)
    }
}

/// An unnormalized UI event tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    #[serde(rename = "type")]
    pub raw_type: RawType,
    /// Absolute start time in the source clock.
    pub start_time: f64,
    /// Absolute end time in the source clock.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<f64>,
    /// Explicit duration in milliseconds; used when `end_time` is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<RawEvent>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<serde_json::Value>,
    /// Name of a custom event type. Its presence marks the event as custom.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    /// Display color for a custom event type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl RawEvent {
    pub fn type_name_str(&self) -> Option<&str> {
        match &self.raw_type {
            RawType::Name(name) => Some(name),
            RawType::Code(_) => None,
        }
    }
}

pub type Headers = BTreeMap<String, String>;

fn default_method() -> String {
    "GET".to_string()
}

fn unset_i64() -> i64 {
    -1
}

fn unset_i32() -> i32 {
    -1
}

/// A network request is about to be sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStart {
    pub identifier: u64,
    pub start_time: f64,
    pub url: String,
    #[serde(default = "default_method")]
    pub http_method: String,
    #[serde(default)]
    pub is_main_resource: bool,
    #[serde(default)]
    pub request_headers: Headers,
    #[serde(default)]
    pub hints: Vec<HintRecord>,
}

/// The first response bytes for a request arrived.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceResponse {
    pub identifier: u64,
    pub start_time: f64,
    #[serde(default = "unset_i64")]
    pub expected_content_length: i64,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default = "unset_i32")]
    pub status_code: i32,
    #[serde(default)]
    pub response_headers: Headers,
    #[serde(default)]
    pub hints: Vec<HintRecord>,
}

/// A chunk of response data arrived.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceData {
    pub identifier: u64,
    pub start_time: f64,
    #[serde(default)]
    pub data_length: i64,
}

/// A partial update to a resource. Only flagged field groups apply.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceUpdate {
    pub identifier: u64,
    pub did_request_change: bool,
    pub did_response_change: bool,
    pub did_length_change: bool,
    pub did_timing_change: bool,

    // Request group.
    pub url: Option<String>,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub last_path_component: Option<String>,
    pub request_headers: Headers,
    pub cached: bool,

    // Response group.
    pub response_headers: Headers,
    pub status_code: Option<i32>,
    pub mime_type: Option<String>,

    // Length group.
    pub content_length: Option<i64>,

    // Timing group, absolute source-clock times.
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
    pub response_received_time: Option<f64>,
}

/// A request completed or failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceFinish {
    pub identifier: u64,
    pub start_time: f64,
    #[serde(default)]
    pub did_fail: bool,
    #[serde(default)]
    pub hints: Vec<HintRecord>,
}

/// Raw profiler output tied to the record that preceded it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRecord {
    pub format: String,
    #[serde(default)]
    pub profile_data: String,
}

/// Any record from the source stream.
#[derive(Debug, Clone)]
pub enum RawRecord {
    Event(RawEvent),
    ResourceStart(ResourceStart),
    ResourceResponse(ResourceResponse),
    ResourceData(ResourceData),
    ResourceUpdate(ResourceUpdate),
    ResourceFinish(ResourceFinish),
    Profile(ProfileRecord),
    Hint(HintRecord),
}

impl RawRecord {
    /// The `kind` discriminant used in record dumps.
    pub fn kind(&self) -> &'static str {
        match self {
            RawRecord::Event(_) => "event",
            RawRecord::ResourceStart(_) => "resourceStart",
            RawRecord::ResourceResponse(_) => "resourceResponse",
            RawRecord::ResourceData(_) => "resourceData",
            RawRecord::ResourceUpdate(_) => "resourceUpdate",
            RawRecord::ResourceFinish(_) => "resourceFinish",
            RawRecord::Profile(_) => "profile",
            RawRecord::Hint(_) => "hint",
        }
    }
}
