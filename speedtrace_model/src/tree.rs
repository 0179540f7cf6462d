//! Arena-backed tree of normalized UI events.
//!
//! Nodes live in a flat vector and refer to each other by [`NodeId`]. Each
//! top-level record is one root of the forest and owns the record's
//! sequence number. The tree keeps an epoch counter that moves whenever
//! its structure or any timing input changes, so derived data keyed by
//! node id can tell when it is stale.

use crate::event_type::EventType;
use crate::hint::HintRecord;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Aggregated milliseconds per event type.
pub type TypeDurations = BTreeMap<EventType, f64>;

/// Index of a node in an [`EventTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A normalized, timed event in the tree.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UiEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Start time in ms relative to the session base time.
    pub time: f64,
    /// Duration in ms, possibly 0.
    pub duration: f64,
    /// Sequence number. Only set on top-level records.
    pub sequence: Option<u64>,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<HintRecord>,
    self_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    type_durations: Option<TypeDurations>,
    #[serde(skip)]
    parent: Option<NodeId>,
    #[serde(skip)]
    children: Vec<NodeId>,
}

impl UiEvent {
    pub fn new(event_type: EventType, time: f64, duration: f64) -> Self {
        Self {
            event_type,
            time,
            duration,
            sequence: None,
            data: serde_json::Value::Null,
            stack_trace: None,
            hints: Vec::new(),
            self_time: duration,
            type_durations: None,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn end_time(&self) -> f64 {
        self.time + self.duration
    }

    /// Time spent in this node exclusive of its direct children.
    pub fn self_time(&self) -> f64 {
        self.self_time
    }

    /// Per-type time over this node's subtree, once computed.
    pub fn type_durations(&self) -> Option<&TypeDurations> {
        self.type_durations.as_ref()
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// A normalized event subtree waiting to be inserted into an [`EventTree`].
#[derive(Debug, Clone)]
pub struct PendingEvent {
    pub event: UiEvent,
    pub children: Vec<PendingEvent>,
}

impl PendingEvent {
    pub fn leaf(event: UiEvent) -> Self {
        Self {
            event,
            children: Vec::new(),
        }
    }
}

/// Forest of UI events keyed by top-level sequence number.
#[derive(Debug, Default)]
pub struct EventTree {
    nodes: Vec<UiEvent>,
    roots: Vec<NodeId>,
    by_sequence: HashMap<u64, NodeId>,
    epoch: u64,
}

impl EventTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Changes whenever structure or timing inputs change.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn get(&self, id: NodeId) -> &UiEvent {
        &self.nodes[id.0]
    }

    pub fn by_sequence(&self, sequence: u64) -> Option<NodeId> {
        self.by_sequence.get(&sequence).copied()
    }

    /// Adds a top-level event carrying `sequence`.
    pub fn add_root(&mut self, mut event: UiEvent, sequence: u64) -> NodeId {
        event.sequence = Some(sequence);
        event.parent = None;
        event.children.clear();
        let id = self.push(event);
        self.roots.push(id);
        self.by_sequence.insert(sequence, id);
        id
    }

    /// Appends `event` as the last child of `parent`.
    pub fn add_child(&mut self, parent: NodeId, mut event: UiEvent) -> NodeId {
        event.parent = Some(parent);
        event.children.clear();
        let id = self.push(event);
        self.nodes[parent.0].children.push(id);
        id
    }

    fn push(&mut self, event: UiEvent) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(event);
        self.epoch += 1;
        id
    }

    /// Inserts a whole pending subtree as a new root.
    pub fn insert(&mut self, pending: PendingEvent, sequence: u64) -> NodeId {
        let PendingEvent { event, children } = pending;
        let root = self.add_root(event, sequence);
        let mut stack: Vec<(NodeId, std::vec::IntoIter<PendingEvent>)> =
            vec![(root, children.into_iter())];
        while let Some((parent, iter)) = stack.last_mut() {
            let parent = *parent;
            match iter.next() {
                Some(child) => {
                    let id = self.add_child(parent, child.event);
                    stack.push((id, child.children.into_iter()));
                }
                None => {
                    stack.pop();
                }
            }
        }
        root
    }

    pub fn set_duration(&mut self, id: NodeId, duration: f64) {
        if self.nodes[id.0].duration != duration {
            self.nodes[id.0].duration = duration;
            self.epoch += 1;
        }
    }

    pub fn set_self_time(&mut self, id: NodeId, self_time: f64) {
        if self.nodes[id.0].self_time != self_time {
            self.nodes[id.0].self_time = self_time;
            self.epoch += 1;
        }
    }

    pub fn set_type_durations(&mut self, id: NodeId, durations: TypeDurations) {
        self.nodes[id.0].type_durations = Some(durations);
    }

    pub fn add_hint(&mut self, id: NodeId, hint: HintRecord) {
        self.nodes[id.0].hints.push(hint);
    }

    /// Node ids of the subtree at `id`, children before parents.
    pub fn postorder(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![(id, false)];
        while let Some((node, expanded)) = stack.pop() {
            if expanded {
                out.push(node);
                continue;
            }
            stack.push((node, true));
            for child in self.nodes[node.0].children.iter().rev() {
                stack.push((*child, false));
            }
        }
        out
    }

    /// Node ids of the subtree at `id`, parents before children.
    pub fn preorder(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            out.push(node);
            for child in self.nodes[node.0].children.iter().rev() {
                stack.push(*child);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> (EventTree, NodeId) {
        let pending = PendingEvent {
            event: UiEvent::new(EventType::LAYOUT, 0.0, 100.0),
            children: vec![
                PendingEvent {
                    event: UiEvent::new(EventType::PAINT, 1.0, 20.0),
                    children: vec![PendingEvent::leaf(UiEvent::new(
                        EventType::GC,
                        2.0,
                        5.0,
                    ))],
                },
                PendingEvent::leaf(UiEvent::new(EventType::PARSE_HTML, 30.0, 10.0)),
            ],
        };
        let mut tree = EventTree::new();
        let root = tree.insert(pending, 7);
        (tree, root)
    }

    #[test]
    fn insert_preserves_child_order() {
        let (tree, root) = sample_tree();
        assert_eq!(tree.len(), 4);
        assert_eq!(tree.roots(), &[root]);
        assert_eq!(tree.by_sequence(7), Some(root));
        assert_eq!(tree.get(root).sequence, Some(7));

        let children = tree.get(root).children();
        assert_eq!(children.len(), 2);
        assert_eq!(tree.get(children[0]).event_type, EventType::PAINT);
        assert_eq!(tree.get(children[1]).event_type, EventType::PARSE_HTML);
        assert_eq!(tree.get(children[0]).parent(), Some(root));
        assert_eq!(tree.get(children[0]).sequence, None);
    }

    #[test]
    fn traversal_orders() {
        let (tree, root) = sample_tree();
        let types = |ids: Vec<NodeId>| -> Vec<EventType> {
            ids.into_iter().map(|id| tree.get(id).event_type).collect()
        };
        assert_eq!(
            types(tree.postorder(root)),
            vec![
                EventType::GC,
                EventType::PAINT,
                EventType::PARSE_HTML,
                EventType::LAYOUT
            ]
        );
        assert_eq!(
            types(tree.preorder(root)),
            vec![
                EventType::LAYOUT,
                EventType::PAINT,
                EventType::GC,
                EventType::PARSE_HTML
            ]
        );
    }

    #[test]
    fn epoch_tracks_changes() {
        let (mut tree, root) = sample_tree();
        let epoch = tree.epoch();
        tree.set_self_time(root, tree.get(root).self_time());
        tree.set_duration(root, 100.0);
        assert_eq!(tree.epoch(), epoch);

        tree.set_duration(root, 120.0);
        assert!(tree.epoch() > epoch);
        assert_eq!(tree.get(root).end_time(), 120.0);
    }
}
