//! Serializable summary of a finished session.

use crate::dominant::{DominantTypeVisitor, fold_suppressed};
use crate::network::{NetworkResource, ResourceType};
use crate::profile::{JavaScriptProfile, ProfileType, VmState, node_time_order};
use crate::session::{Session, SessionStats};
use serde::Serialize;
use speedtrace_model::{EventType, EventTypeRegistry, HintRecord, Severity, TypeDurations};
use std::collections::BTreeMap;

/// How many heaviest bottom-up functions to list per profile.
const TOP_FUNCTIONS: usize = 10;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport<'a> {
    pub pixels_per_ms: f64,
    pub events: Vec<EventSummary>,
    pub resources: Vec<ResourceSummary<'a>>,
    pub profiles: Vec<ProfileSummary>,
    pub stats: SessionStats,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSummary {
    pub sequence: u64,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub label: String,
    pub time: f64,
    pub duration: f64,
    pub self_time: f64,
    /// Subtree time per type label.
    pub type_durations: BTreeMap<String, f64>,
    pub has_dominant_type: bool,
    /// Nodes in the subtree that borrow a dominant type's color.
    pub dominant_nodes: usize,
    /// Bars drawn for the subtree's breakdown graph.
    pub bars: usize,
    pub aggregated_bars: usize,
    /// Suppressed time per type label that never reached a bar.
    pub suppressed: BTreeMap<String, f64>,
    pub hints: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub most_severe_hint: Option<Severity>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSummary<'a> {
    #[serde(flatten)]
    pub resource: &'a NetworkResource,
    pub resource_type: ResourceType,
    pub is_redirect: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSummary {
    pub sequence: u64,
    pub total_time: f64,
    pub state_times: BTreeMap<&'static str, f64>,
    pub top_functions: Vec<FunctionSummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionSummary {
    pub name: String,
    pub self_time: f64,
    pub time: f64,
}

fn labelled(durations: &TypeDurations, registry: &EventTypeRegistry) -> BTreeMap<String, f64> {
    let mut out = BTreeMap::new();
    for (event_type, ms) in durations {
        *out.entry(event_type.label(registry)).or_insert(0.0) += ms;
    }
    out
}

fn summarize_profile(sequence: u64, profile: &JavaScriptProfile) -> ProfileSummary {
    let state_times = VmState::ALL
        .iter()
        .map(|state| (state.as_str(), profile.state_time(*state)))
        .filter(|(_, ms)| *ms > 0.0)
        .collect();

    let mut functions: Vec<_> = profile
        .profile(ProfileType::BottomUp)
        .map(|root| root.children.iter().collect())
        .unwrap_or_default();
    functions.sort_by(|a, b| node_time_order(a, b));
    let top_functions = functions
        .into_iter()
        .take(TOP_FUNCTIONS)
        .map(|node| FunctionSummary {
            name: node.short_name(),
            self_time: node.self_time,
            time: node.time,
        })
        .collect();

    ProfileSummary {
        sequence,
        total_time: profile.total_time(),
        state_times,
        top_functions,
    }
}

impl<'a> SessionReport<'a> {
    /// Summarizes `session` as drawn at `pixels_per_ms`.
    pub fn build(session: &'a Session, pixels_per_ms: f64) -> Self {
        let tree = session.tree();
        let registry = session.registry();
        let config = session.config();
        let mut visitor = DominantTypeVisitor::from_config(config);

        let mut events = Vec::with_capacity(tree.roots().len());
        for &root in tree.roots() {
            let event = tree.get(root);
            let subtree = tree.preorder(root);
            let dominant_nodes = subtree
                .iter()
                .filter(|node| visitor.has_dominant_type(tree, root, **node, pixels_per_ms))
                .count();
            let fold = fold_suppressed(tree, root, pixels_per_ms, config.significance_px);
            let hints: Vec<HintRecord> = subtree
                .iter()
                .flat_map(|node| tree.get(*node).hints.iter().cloned())
                .collect();

            events.push(EventSummary {
                sequence: event.sequence.unwrap_or_default(),
                event_type: event.event_type,
                label: event.event_type.label(registry),
                time: event.time,
                duration: event.duration,
                self_time: event.self_time(),
                type_durations: event
                    .type_durations()
                    .map(|durations| labelled(durations, registry))
                    .unwrap_or_default(),
                has_dominant_type: visitor.has_dominant_type(tree, root, root, pixels_per_ms),
                dominant_nodes,
                bars: fold.bars.len(),
                aggregated_bars: fold.bars.iter().filter(|bar| bar.aggregated).count(),
                suppressed: labelled(&fold.suppressed, registry),
                hints: hints.len(),
                most_severe_hint: (!hints.is_empty()).then(|| HintRecord::most_severe(&hints)),
            });
        }

        let resources = session
            .network()
            .iter()
            .map(|resource| ResourceSummary {
                resource,
                resource_type: resource.resource_type(),
                is_redirect: resource.is_redirect(),
                duration: resource.duration(),
            })
            .collect();

        let mut sequences: Vec<u64> = session.profiles().sequences().collect();
        sequences.sort_unstable();
        let profiles = sequences
            .into_iter()
            .filter_map(|sequence| {
                session
                    .profile(sequence)
                    .map(|profile| summarize_profile(sequence, profile))
            })
            .collect();

        tracing::debug!(events = events.len(), "built session report");
        Self {
            pixels_per_ms,
            events,
            resources,
            profiles,
            stats: session.stats().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use speedtrace_model::RecordDump;
    use std::io::Cursor;

    const DUMP: &str = r#"{"kind":"resourceStart","identifier":7,"startTime":0.5,"url":"http://x/app.js"}
{"kind":"event","type":"TimerFire","startTime":1,"duration":1000,"children":[{"type":"TimeStamp","startTime":1.1,"duration":0.01},{"type":"Layout","startTime":1.2,"duration":300}]}
{"kind":"profile","format":"v8","profileData":"code-creation,Function,0x1000,10,\"main http://x/app.js:3\"\ncode-creation,Function,0x2000,10,\"helper\"\ntick,0x1001,0x0,0\ntick,0x2001,0x0,1,0x1001\ntick,0x2002,0x0,0,0x1001\n"}
{"kind":"hint","hintletRule":"Long Timer","description":"slow timer","severity":2,"refRecord":1,"timestamp":1.0}
{"kind":"resourceResponse","identifier":7,"startTime":1.3,"mimeType":"text/javascript","statusCode":200}
{"kind":"resourceFinish","identifier":7,"startTime":1.5}
"#;

    fn session() -> Session {
        let dump = RecordDump::parse(Cursor::new(DUMP)).unwrap();
        let mut session = Session::new(Config::default());
        session.ingest_all(dump.records);
        session.finish();
        session
    }

    #[test]
    fn summarizes_events() {
        let session = session();
        let report = SessionReport::build(&session, 1.0);

        assert_eq!(report.events.len(), 1);
        let event = &report.events[0];
        assert_eq!(event.sequence, 1);
        assert_eq!(event.label, "Timer Fire");
        assert_eq!(event.duration, 1000.0);
        assert!((event.self_time - 699.99).abs() < 1e-9);
        assert_eq!(event.type_durations["Layout"], 300.0);
        assert!(!event.has_dominant_type);
        assert_eq!(event.dominant_nodes, 1);
        assert_eq!(event.bars, 2);
        assert_eq!(event.suppressed.len(), 1);
        assert_eq!(event.hints, 1);
        assert_eq!(event.most_severe_hint, Some(Severity::Warning));
    }

    #[test]
    fn summarizes_resources_and_profiles() {
        let session = session();
        let report = SessionReport::build(&session, 1.0);

        assert_eq!(report.resources.len(), 1);
        let resource = &report.resources[0];
        assert_eq!(resource.resource_type, ResourceType::Script);
        assert!(!resource.is_redirect);
        assert_eq!(resource.duration, Some(1000.0));

        assert_eq!(report.profiles.len(), 1);
        let profile = &report.profiles[0];
        assert_eq!(profile.sequence, 1);
        assert_eq!(profile.total_time, 3.0);
        assert_eq!(profile.state_times["JavaScript"], 2.0);
        assert_eq!(profile.top_functions[0].name, "helper");
        assert_eq!(profile.top_functions[0].self_time, 2.0);
        assert_eq!(profile.top_functions[1].name, "main app.js:3");
    }

    #[test]
    fn serializes_to_json() {
        let session = session();
        let report = SessionReport::build(&session, 1.0);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["events"][0]["type"], 7);
        assert_eq!(json["resources"][0]["identifier"], 7);
        assert_eq!(json["resources"][0]["resourceType"], "Script");
        assert_eq!(json["stats"]["profiles"], 1);
    }
}
