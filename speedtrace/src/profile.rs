//! JavaScript CPU profiles reconstructed from profiler logs.
//!
//! A profile record in the stream profiles the UI event that immediately
//! precedes it, so profiles are cached under `sequence - 1`. Each profile
//! holds three call trees built from the same ticks:
//!
//! - **bottom-up**: rooted at the executing function, walking out to callers
//! - **top-down**: rooted at the outermost caller, walking in to the callee
//! - **flat**: every function directly under the root
//!
//! plus a table of time per VM state.

use crate::v8::{SymbolType, V8LogParser};
use serde::Serialize;
use speedtrace_model::ProfileRecord;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Which call tree of a profile to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileType {
    Flat,
    BottomUp,
    TopDown,
}

impl ProfileType {
    fn index(self) -> usize {
        match self {
            ProfileType::Flat => 0,
            ProfileType::BottomUp => 1,
            ProfileType::TopDown => 2,
        }
    }
}

/// VM state reported with each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum VmState {
    JavaScript = 0,
    GarbageCollection = 1,
    Compiler = 2,
    Other = 3,
    External = 4,
    Unknown = 5,
}

impl VmState {
    pub const ALL: [VmState; 6] = [
        VmState::JavaScript,
        VmState::GarbageCollection,
        VmState::Compiler,
        VmState::Other,
        VmState::External,
        VmState::Unknown,
    ];

    /// Maps a log state code. Codes outside the table are `Unknown`.
    pub fn from_code(code: i64) -> VmState {
        match code {
            0 => VmState::JavaScript,
            1 => VmState::GarbageCollection,
            2 => VmState::Compiler,
            3 => VmState::Other,
            4 => VmState::External,
            _ => VmState::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VmState::JavaScript => "JavaScript",
            VmState::GarbageCollection => "Garbage Collection",
            VmState::Compiler => "Compiler",
            VmState::Other => "Other",
            VmState::External => "External",
            VmState::Unknown => "Unknown",
        }
    }
}

/// A node in a profile call tree. Children have distinct symbol names.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileNode {
    pub symbol_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol_type: Option<SymbolType>,
    pub self_time: f64,
    /// Inclusive of descendants.
    pub time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_line_number: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ProfileNode>,
}

impl ProfileNode {
    pub fn new(symbol_name: impl Into<String>, symbol_type: Option<SymbolType>) -> Self {
        let symbol_name = symbol_name.into();
        let (resource_url, resource_line_number) = match parse_resource_location(&symbol_name) {
            Some((url, line)) => (Some(url.to_string()), line),
            None => (None, None),
        };
        Self {
            symbol_name,
            symbol_type,
            self_time: 0.0,
            time: 0.0,
            resource_url,
            resource_line_number,
            children: Vec::new(),
        }
    }

    pub fn add_time(&mut self, ms: f64) {
        self.time += ms;
    }

    /// Self time also counts towards total time.
    pub fn add_self_time(&mut self, ms: f64) {
        self.self_time += ms;
        self.time += ms;
    }

    pub fn child(&self, symbol_name: &str) -> Option<&ProfileNode> {
        self.children.iter().find(|c| c.symbol_name == symbol_name)
    }

    pub fn get_or_insert_child(
        &mut self,
        symbol_name: &str,
        symbol_type: Option<SymbolType>,
    ) -> &mut ProfileNode {
        let index = match self
            .children
            .iter()
            .position(|c| c.symbol_name == symbol_name)
        {
            Some(index) => index,
            None => {
                self.children
                    .push(ProfileNode::new(symbol_name, symbol_type));
                self.children.len() - 1
            }
        };
        let child = &mut self.children[index];
        if child.symbol_type.is_none() {
            child.symbol_type = symbol_type;
        }
        child
    }

    /// Sorts every level by descending self time, then descending time.
    pub fn sort_by_time(&mut self) {
        self.children.sort_by(node_time_order);
        for child in &mut self.children {
            child.sort_by_time();
        }
    }

    /// Symbol name with any URL shortened to its last path component.
    pub fn short_name(&self) -> String {
        match &self.resource_url {
            Some(url) => {
                let file = url.rsplit('/').find(|s| !s.is_empty()).unwrap_or(url);
                self.symbol_name.replacen(url.as_str(), file, 1)
            }
            None => self.symbol_name.clone(),
        }
    }
}

/// Descending self time, ties broken by descending total time.
pub fn node_time_order(a: &ProfileNode, b: &ProfileNode) -> Ordering {
    b.self_time
        .total_cmp(&a.self_time)
        .then_with(|| b.time.total_cmp(&a.time))
}

// Names look like "fn http://host/app.js:12" for script code.
fn parse_resource_location(symbol_name: &str) -> Option<(&str, Option<u32>)> {
    let location = symbol_name.rsplit(' ').next()?;
    if !location.contains("://") {
        return None;
    }
    match location.rsplit_once(':') {
        Some((url, line)) if url.contains("://") => match line.parse() {
            Ok(line) => Some((url, Some(line))),
            Err(_) => Some((location, None)),
        },
        _ => Some((location, None)),
    }
}

/// Call trees and VM-state times for one profiled event.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JavaScriptProfile {
    trees: [Option<ProfileNode>; 3],
    state_times: [f64; 6],
}

impl JavaScriptProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn profile(&self, profile_type: ProfileType) -> Option<&ProfileNode> {
        self.trees[profile_type.index()].as_ref()
    }

    pub fn get_or_create_profile(&mut self, profile_type: ProfileType) -> &mut ProfileNode {
        self.trees[profile_type.index()].get_or_insert_with(|| ProfileNode::new("(root)", None))
    }

    pub fn add_state_time(&mut self, state: VmState, ms: f64) {
        self.state_times[state as usize] += ms;
    }

    pub fn state_time(&self, state: VmState) -> f64 {
        self.state_times[state as usize]
    }

    /// Total sampled time, read from the flat tree.
    pub fn total_time(&self) -> f64 {
        self.profile(ProfileType::Flat).map_or(0.0, |root| root.time)
    }
}

/// Parses raw profile data of one format into a profile.
pub trait ProfileParser {
    fn parse(&mut self, data: &str, profile: &mut JavaScriptProfile);
}

/// Parser for formats nothing understands. Discards the data.
#[derive(Debug)]
pub struct NullProfileParser {
    format: String,
}

impl ProfileParser for NullProfileParser {
    fn parse(&mut self, data: &str, _profile: &mut JavaScriptProfile) {
        tracing::warn!(
            format = %self.format,
            bytes = data.len(),
            "no profile model available for profile format"
        );
    }
}

/// Profiles of a session, keyed by the sequence of the profiled event.
#[derive(Default)]
pub struct JavaScriptProfileModel {
    parsers: HashMap<String, Box<dyn ProfileParser>>,
    profiles: HashMap<u64, JavaScriptProfile>,
}

impl JavaScriptProfileModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a profile record arriving at `sequence` into the profile of the
    /// record before it.
    ///
    /// Returns the profiled sequence, or `None` if there is no earlier record.
    pub fn process(&mut self, sequence: u64, record: &ProfileRecord) -> Option<u64> {
        let Some(target) = sequence.checked_sub(1) else {
            tracing::warn!("profile record has no preceding event, dropping it");
            return None;
        };

        let parser = self
            .parsers
            .entry(record.format.clone())
            .or_insert_with(|| parser_for_format(&record.format));
        let profile = self.profiles.entry(target).or_default();
        parser.parse(&record.profile_data, profile);
        Some(target)
    }

    /// The profile for the event with `sequence`, if one exists.
    pub fn profile(&self, sequence: u64) -> Option<&JavaScriptProfile> {
        self.profiles.get(&sequence)
    }

    pub fn sequences(&self) -> impl Iterator<Item = u64> + '_ {
        self.profiles.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

fn parser_for_format(format: &str) -> Box<dyn ProfileParser> {
    match format {
        "v8" => Box::new(V8LogParser::new()),
        other => Box::new(NullProfileParser {
            format: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v8_record(data: &str) -> ProfileRecord {
        ProfileRecord {
            format: "v8".to_string(),
            profile_data: data.to_string(),
        }
    }

    #[test]
    fn self_time_counts_towards_time() {
        let mut node = ProfileNode::new("foo", None);
        node.add_self_time(2.0);
        node.add_time(3.0);
        assert_eq!(node.self_time, 2.0);
        assert_eq!(node.time, 5.0);
    }

    #[test]
    fn children_are_unique_by_name() {
        let mut root = ProfileNode::new("(root)", None);
        root.get_or_insert_child("a", None).add_self_time(1.0);
        root.get_or_insert_child("a", Some(SymbolType::Function))
            .add_self_time(1.0);
        root.get_or_insert_child("b", None).add_time(1.0);
        assert_eq!(root.children.len(), 2);
        let a = root.child("a").unwrap();
        assert_eq!(a.self_time, 2.0);
        assert_eq!(a.symbol_type, Some(SymbolType::Function));
    }

    #[test]
    fn sort_orders_by_self_then_total() {
        let mut root = ProfileNode::new("(root)", None);
        root.get_or_insert_child("low", None).add_time(9.0);
        root.get_or_insert_child("high", None).add_self_time(3.0);
        let tie = root.get_or_insert_child("tie", None);
        tie.add_self_time(3.0);
        tie.add_time(2.0);
        root.sort_by_time();
        let names: Vec<&str> = root.children.iter().map(|c| c.symbol_name.as_str()).collect();
        assert_eq!(names, vec!["tie", "high", "low"]);
    }

    #[test]
    fn resource_locations() {
        let node = ProfileNode::new("render http://example.com/static/app.js:42", None);
        assert_eq!(node.resource_url.as_deref(), Some("http://example.com/static/app.js"));
        assert_eq!(node.resource_line_number, Some(42));
        assert_eq!(node.short_name(), "render app.js:42");

        let plain = ProfileNode::new("parentNode", None);
        assert_eq!(plain.resource_url, None);
        assert_eq!(plain.short_name(), "parentNode");
    }

    #[test]
    fn vm_state_names() {
        assert_eq!(VmState::from_code(1).as_str(), "Garbage Collection");
        assert_eq!(VmState::from_code(42), VmState::Unknown);
    }

    #[test]
    fn profiles_key_on_preceding_sequence() {
        let mut model = JavaScriptProfileModel::new();
        let data = "code-creation,LazyCompile,0x100,10,\"foo\"\ntick,0x100,+1,0\n";
        assert_eq!(model.process(8, &v8_record(data)), Some(7));

        let profile = model.profile(7).unwrap();
        assert_eq!(profile.total_time(), 1.0);
        assert!(model.profile(8).is_none());
        assert_eq!(model.len(), 1);
    }

    #[test]
    fn symbols_persist_across_records() {
        let mut model = JavaScriptProfileModel::new();
        model.process(2, &v8_record("code-creation,LazyCompile,0x100,10,\"foo\"\n"));
        model.process(5, &v8_record("tick,0x104,+1,0\n"));

        let root = model.profile(4).unwrap().profile(ProfileType::BottomUp).unwrap();
        assert_eq!(root.child("foo").unwrap().self_time, 1.0);
    }

    #[test]
    fn unknown_format_is_discarded() {
        let mut model = JavaScriptProfileModel::new();
        let record = ProfileRecord {
            format: "jsc".to_string(),
            profile_data: "tick,0x100,+1,0".to_string(),
        };
        assert_eq!(model.process(3, &record), Some(2));
        let profile = model.profile(2).unwrap();
        assert_eq!(profile.total_time(), 0.0);
        assert!(profile.profile(ProfileType::BottomUp).is_none());
    }

    #[test]
    fn first_record_cannot_be_profile() {
        let mut model = JavaScriptProfileModel::new();
        assert_eq!(model.process(0, &v8_record("tick,0x1,+1,0")), None);
        assert!(model.is_empty());
    }
}
