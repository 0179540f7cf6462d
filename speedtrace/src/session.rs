//! A monitoring session: ingest ordering, sequencing and dispatch.
//!
//! Records are ingested one at a time in arrival order. Until the base time
//! is known, resource-start records are buffered. The first other UI event
//! fixes the base time as the minimum of its own start and every buffered
//! start, and the buffer is replayed in arrival order before that event is
//! dispatched. Network messages other than starts that arrive before the
//! base time cannot be placed on the timeline and are discarded.
//!
//! Every forwarded record gets the next sequence number. A `Program`
//! record is never forwarded itself; its children are ingested as
//! top-level records instead.

use crate::aggregate::aggregate;
use crate::config::Config;
use crate::network::NetworkModel;
use crate::normalize::Normalizer;
use crate::profile::{JavaScriptProfile, JavaScriptProfileModel};
use serde::Serialize;
use speedtrace_model::{
    EventTree, EventType, EventTypeRegistry, HintRecord, ProfileRecord, RawEvent, RawRecord,
    RawType,
};
use std::sync::Arc;

/// Counters describing what happened to ingested records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub records: usize,
    pub events: usize,
    pub network_messages: usize,
    pub profiles: usize,
    pub hints: usize,
    pub buffered: usize,
    pub orphan_hints: usize,
    pub dropped_negative_time: usize,
    pub dropped_bad_time: usize,
    pub discarded_before_base: usize,
}

pub struct Session {
    config: Config,
    registry: Arc<EventTypeRegistry>,
    normalizer: Normalizer,
    tree: EventTree,
    network: NetworkModel,
    profiles: JavaScriptProfileModel,
    pending: Vec<RawRecord>,
    next_sequence: u64,
    stats: SessionStats,
}

/// Event type of a raw event when it can be told without registering
/// anything. Custom events give `None`.
fn builtin_type(raw: &RawEvent) -> Option<EventType> {
    if raw.type_name.is_some() {
        return None;
    }
    match &raw.raw_type {
        RawType::Code(code) => Some(EventType(*code)),
        RawType::Name(name) => EventType::from_raw_name(name),
    }
}

/// Records that may be held back until the base time is known.
fn is_bufferable(record: &RawRecord) -> bool {
    match record {
        RawRecord::ResourceStart(_) => true,
        RawRecord::Event(raw) => builtin_type(raw) == Some(EventType::RESOURCE_SEND_REQUEST),
        _ => false,
    }
}

fn start_time(record: &RawRecord) -> Option<f64> {
    match record {
        RawRecord::Event(raw) => Some(raw.start_time),
        RawRecord::ResourceStart(message) => Some(message.start_time),
        RawRecord::ResourceResponse(message) => Some(message.start_time),
        RawRecord::ResourceData(message) => Some(message.start_time),
        RawRecord::ResourceFinish(message) => Some(message.start_time),
        RawRecord::ResourceUpdate(_) | RawRecord::Profile(_) | RawRecord::Hint(_) => None,
    }
}

impl Session {
    pub fn new(config: Config) -> Self {
        Self::with_registry(config, Arc::new(EventTypeRegistry::new()))
    }

    /// Creates a session sharing an existing type registry.
    pub fn with_registry(config: Config, registry: Arc<EventTypeRegistry>) -> Self {
        Self {
            normalizer: Normalizer::new(config.time_unit),
            config,
            registry,
            tree: EventTree::new(),
            network: NetworkModel::new(),
            profiles: JavaScriptProfileModel::new(),
            pending: Vec::new(),
            next_sequence: 0,
            stats: SessionStats::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<EventTypeRegistry> {
        &self.registry
    }

    pub fn tree(&self) -> &EventTree {
        &self.tree
    }

    pub fn network(&self) -> &NetworkModel {
        &self.network
    }

    pub fn profiles(&self) -> &JavaScriptProfileModel {
        &self.profiles
    }

    /// The profile built for the event with `sequence`, if any.
    pub fn profile(&self, sequence: u64) -> Option<&JavaScriptProfile> {
        self.profiles.profile(sequence)
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Base time in raw source units, once established.
    pub fn base_time(&self) -> Option<f64> {
        self.normalizer.base_time()
    }

    /// Number of records waiting for the base time.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn ingest_all(&mut self, records: impl IntoIterator<Item = RawRecord>) {
        for record in records {
            self.ingest(record);
        }
    }

    pub fn ingest(&mut self, record: RawRecord) {
        self.stats.records += 1;

        if let RawRecord::Event(raw) = record {
            if builtin_type(&raw) == Some(EventType::PROGRAM) {
                for child in raw.children {
                    self.ingest(RawRecord::Event(child));
                }
                return;
            }
            self.ingest_forwardable(RawRecord::Event(raw));
        } else {
            self.ingest_forwardable(record);
        }
    }

    fn ingest_forwardable(&mut self, record: RawRecord) {
        if self.normalizer.base_time().is_none() {
            if is_bufferable(&record) {
                self.stats.buffered += 1;
                self.pending.push(record);
                return;
            }
            match &record {
                RawRecord::Event(raw) => self.establish_base_time(raw.start_time),
                RawRecord::Profile(_) | RawRecord::Hint(_) => {}
                _ => {
                    tracing::debug!(
                        kind = record.kind(),
                        "network message before base time, discarding it"
                    );
                    self.stats.discarded_before_base += 1;
                    return;
                }
            }
        }
        self.dispatch(record);
    }

    /// Fixes the base time and replays everything buffered before it.
    fn establish_base_time(&mut self, trigger: f64) {
        let base = self
            .pending
            .iter()
            .filter_map(start_time)
            .chain(std::iter::once(trigger))
            .filter(|time| time.is_finite())
            .fold(f64::INFINITY, f64::min);
        if !base.is_finite() {
            return;
        }

        tracing::debug!(base, buffered = self.pending.len(), "established base time");
        self.normalizer.set_base_time(base);
        for record in std::mem::take(&mut self.pending) {
            self.dispatch(record);
        }
    }

    /// Flushes anything still buffered, using the earliest buffered start
    /// as the base time if none was ever established.
    pub fn finish(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        match self.pending.iter().filter_map(start_time).reduce(f64::min) {
            Some(earliest) if self.normalizer.base_time().is_none() => {
                self.establish_base_time(earliest);
            }
            _ => {
                for record in std::mem::take(&mut self.pending) {
                    self.dispatch(record);
                }
            }
        }
        tracing::info!(
            events = self.stats.events,
            resources = self.network.len(),
            profiles = self.profiles.len(),
            "session finished"
        );
    }

    fn next_sequence(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }

    /// Places a raw time on the timeline, or explains why it cannot be.
    fn place(&mut self, raw_time: f64, kind: &'static str) -> Option<f64> {
        let Some(time) = self.normalizer.to_relative_ms(raw_time) else {
            tracing::debug!(kind, raw_time, "record time cannot be normalized, dropping it");
            self.stats.dropped_bad_time += 1;
            return None;
        };
        if time < 0.0 && self.config.drop_negative_times {
            // Upstream clocks occasionally report records from before the
            // session started.
            tracing::debug!(kind, time, "negative record time, dropping it");
            self.stats.dropped_negative_time += 1;
            return None;
        }
        Some(time)
    }

    fn dispatch(&mut self, record: RawRecord) {
        match record {
            RawRecord::Event(raw) => self.dispatch_event(raw),
            RawRecord::ResourceStart(message) => {
                if let Some(time) = self.place(message.start_time, record_kind::START) {
                    self.next_sequence();
                    self.stats.network_messages += 1;
                    self.network.start(&message, time);
                }
            }
            RawRecord::ResourceResponse(message) => {
                if let Some(time) = self.place(message.start_time, record_kind::RESPONSE) {
                    self.next_sequence();
                    self.stats.network_messages += 1;
                    self.network.response(&message, time);
                }
            }
            RawRecord::ResourceData(message) => {
                if self.place(message.start_time, record_kind::DATA).is_some() {
                    self.next_sequence();
                    self.stats.network_messages += 1;
                    self.network.data(&message);
                }
            }
            RawRecord::ResourceUpdate(message) => {
                self.next_sequence();
                self.stats.network_messages += 1;
                let normalizer = &self.normalizer;
                self.network
                    .update(&message, |raw| normalizer.to_relative_ms(raw));
            }
            RawRecord::ResourceFinish(message) => {
                if let Some(time) = self.place(message.start_time, record_kind::FINISH) {
                    self.next_sequence();
                    self.stats.network_messages += 1;
                    self.network.finish(&message, time);
                }
            }
            RawRecord::Profile(profile) => self.dispatch_profile(profile),
            RawRecord::Hint(hint) => self.dispatch_hint(hint),
        }
    }

    fn dispatch_event(&mut self, raw: RawEvent) {
        if self.place(raw.start_time, record_kind::EVENT).is_none() {
            return;
        }
        let Some(pending) = self.normalizer.normalize(raw, &self.registry) else {
            return;
        };
        let sequence = self.next_sequence();
        let root = self.tree.insert(pending, sequence);
        aggregate(&mut self.tree, root);
        self.stats.events += 1;
    }

    fn dispatch_profile(&mut self, profile: ProfileRecord) {
        let sequence = self.next_sequence();
        if !self.config.profiles {
            return;
        }
        if let Some(target) = self.profiles.process(sequence, &profile) {
            tracing::debug!(sequence, target, format = %profile.format, "processed profile record");
            self.stats.profiles += 1;
        }
    }

    fn dispatch_hint(&mut self, hint: HintRecord) {
        self.next_sequence();
        self.stats.hints += 1;
        match hint.ref_sequence().and_then(|seq| self.tree.by_sequence(seq)) {
            Some(node) => self.tree.add_hint(node, hint),
            None => {
                tracing::debug!(rule = %hint.hintlet_rule, "hint references no known event");
                self.stats.orphan_hints += 1;
            }
        }
    }
}

mod record_kind {
    pub const EVENT: &str = "event";
    pub const START: &str = "resourceStart";
    pub const RESPONSE: &str = "resourceResponse";
    pub const DATA: &str = "resourceData";
    pub const FINISH: &str = "resourceFinish";
}
