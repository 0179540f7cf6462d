//! Self time and per-type durations over event subtrees.
//!
//! Both passes walk a subtree postorder and only read the subtree they are
//! given, so a newly inserted root can be aggregated without touching the
//! rest of the tree. Running either pass again on an unchanged subtree gives
//! the same values.

use speedtrace_model::{EventTree, EventType, NodeId, TypeDurations};

// ============================================================================
// Type map aggregation
// ============================================================================

/// Sums durations per event type, tracking the type with the largest total.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeMapAggregator {
    durations: TypeDurations,
    max_value: f64,
    type_of_max: Option<EventType>,
}

impl TypeMapAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `ms` to the total for `event_type`.
    ///
    /// A total equal to the current maximum takes over as the max type.
    pub fn add(&mut self, event_type: EventType, ms: f64) {
        let total = self.durations.entry(event_type).or_insert(0.0);
        *total += ms;
        if *total >= self.max_value {
            self.max_value = *total;
            self.type_of_max = Some(event_type);
        }
    }

    /// Adds every entry of `durations`.
    pub fn merge(&mut self, durations: &TypeDurations) {
        for (event_type, ms) in durations {
            self.add(*event_type, *ms);
        }
    }

    pub fn durations(&self) -> &TypeDurations {
        &self.durations
    }

    pub fn get(&self, event_type: EventType) -> f64 {
        self.durations.get(&event_type).copied().unwrap_or(0.0)
    }

    pub fn max_value(&self) -> f64 {
        self.max_value
    }

    pub fn type_of_max(&self) -> Option<EventType> {
        self.type_of_max
    }

    pub fn into_durations(self) -> TypeDurations {
        self.durations
    }
}

// ============================================================================
// Passes
// ============================================================================

/// Sets `selfTime = max(0, duration - sum of direct child durations)` for
/// every node under `root`.
pub fn compute_self_times(tree: &mut EventTree, root: NodeId) {
    for id in tree.postorder(root) {
        let node = tree.get(id);
        let children: f64 = node
            .children()
            .iter()
            .map(|child| tree.get(*child).duration)
            .sum();
        let self_time = node.duration - children;
        if self_time < 0.0 {
            tracing::debug!(
                duration = node.duration,
                children,
                "children outlast their parent, clamping self time"
            );
        }
        tree.set_self_time(id, self_time.max(0.0));
    }
}

/// Builds the per-type duration map of `id` from its children's maps plus
/// its own self time.
pub fn type_map(tree: &EventTree, id: NodeId, child_maps: &[&TypeDurations]) -> TypeMapAggregator {
    let node = tree.get(id);
    let mut aggregator = TypeMapAggregator::new();
    for map in child_maps {
        aggregator.merge(map);
    }
    aggregator.add(node.event_type, node.self_time());
    aggregator
}

/// Stores a per-type duration map on every node under `root`.
///
/// Self times must already be current.
pub fn compute_type_durations(tree: &mut EventTree, root: NodeId) {
    for id in tree.postorder(root) {
        let node = tree.get(id);
        let child_maps: Vec<&TypeDurations> = node
            .children()
            .iter()
            .filter_map(|child| tree.get(*child).type_durations())
            .collect();
        let durations = type_map(tree, id, &child_maps).into_durations();
        tree.set_type_durations(id, durations);
    }
}

/// Runs both passes over the subtree at `root`.
pub fn aggregate(tree: &mut EventTree, root: NodeId) {
    compute_self_times(tree, root);
    compute_type_durations(tree, root);
}

#[cfg(test)]
mod tests {
    use super::*;
    use speedtrace_model::{PendingEvent, UiEvent};

    fn node(event_type: EventType, time: f64, duration: f64, children: Vec<PendingEvent>) -> PendingEvent {
        PendingEvent {
            event: UiEvent::new(event_type, time, duration),
            children,
        }
    }

    fn durations(pairs: &[(EventType, f64)]) -> TypeDurations {
        pairs.iter().copied().collect()
    }

    #[test]
    fn layout_with_parse_child() {
        let mut tree = EventTree::new();
        let root = tree.insert(
            node(
                EventType::LAYOUT,
                0.0,
                100.0,
                vec![node(EventType::PARSE_HTML, 1.0, 9.0, vec![])],
            ),
            0,
        );
        aggregate(&mut tree, root);

        let child = tree.get(root).children()[0];
        assert_eq!(tree.get(root).self_time(), 91.0);
        assert_eq!(tree.get(child).self_time(), 9.0);
        assert_eq!(
            tree.get(root).type_durations(),
            Some(&durations(&[(EventType::LAYOUT, 91.0), (EventType::PARSE_HTML, 9.0)]))
        );
        assert_eq!(
            tree.get(child).type_durations(),
            Some(&durations(&[(EventType::PARSE_HTML, 9.0)]))
        );
    }

    #[test]
    fn self_time_is_clamped_at_zero() {
        let mut tree = EventTree::new();
        let root = tree.insert(
            node(
                EventType::TIMER_FIRED,
                0.0,
                10.0,
                vec![
                    node(EventType::LAYOUT, 0.0, 8.0, vec![]),
                    node(EventType::PAINT, 8.0, 7.0, vec![]),
                ],
            ),
            0,
        );
        aggregate(&mut tree, root);

        for id in tree.preorder(root) {
            assert!(tree.get(id).self_time() >= 0.0);
        }
        assert_eq!(tree.get(root).self_time(), 0.0);
        let map = tree.get(root).type_durations().unwrap();
        assert_eq!(map[&EventType::TIMER_FIRED], 0.0);
        assert_eq!(map[&EventType::LAYOUT], 8.0);
        assert_eq!(map[&EventType::PAINT], 7.0);
    }

    #[test]
    fn self_time_conserves_duration() {
        let mut tree = EventTree::new();
        let root = tree.insert(
            node(
                EventType::DOM_EVENT,
                0.0,
                50.0,
                vec![
                    node(
                        EventType::JAVASCRIPT_EXECUTION,
                        1.0,
                        30.0,
                        vec![
                            node(EventType::GC, 2.0, 4.0, vec![]),
                            node(EventType::LAYOUT, 10.0, 6.5, vec![]),
                        ],
                    ),
                    node(EventType::PAINT, 35.0, 5.0, vec![]),
                ],
            ),
            3,
        );
        aggregate(&mut tree, root);

        for id in tree.preorder(root) {
            let event = tree.get(id);
            let children: f64 = event.children().iter().map(|c| tree.get(*c).duration).sum();
            assert_eq!(event.duration, event.self_time() + children);
        }

        let total: f64 = tree.get(root).type_durations().unwrap().values().sum();
        assert_eq!(total, 50.0);
    }

    #[test]
    fn passes_are_idempotent() {
        let mut tree = EventTree::new();
        let root = tree.insert(
            node(
                EventType::EVAL_SCRIPT,
                0.0,
                20.0,
                vec![node(EventType::GC, 0.0, 2.5, vec![])],
            ),
            0,
        );
        aggregate(&mut tree, root);
        let epoch = tree.epoch();
        let first = tree.get(root).type_durations().cloned();

        aggregate(&mut tree, root);
        assert_eq!(tree.get(root).type_durations().cloned(), first);
        assert_eq!(tree.epoch(), epoch);
    }

    #[test]
    fn aggregator_tracks_max_with_ties_going_to_latest() {
        let mut aggregator = TypeMapAggregator::new();
        aggregator.add(EventType::LAYOUT, 3.0);
        aggregator.add(EventType::PAINT, 2.0);
        assert_eq!(aggregator.type_of_max(), Some(EventType::LAYOUT));

        aggregator.add(EventType::PAINT, 1.0);
        assert_eq!(aggregator.type_of_max(), Some(EventType::PAINT));
        assert_eq!(aggregator.max_value(), 3.0);

        aggregator.merge(&durations(&[(EventType::GC, 4.0), (EventType::LAYOUT, 0.5)]));
        assert_eq!(aggregator.type_of_max(), Some(EventType::GC));
        assert_eq!(aggregator.get(EventType::LAYOUT), 3.5);
        assert_eq!(aggregator.get(EventType::XHR_LOAD), 0.0);
    }
}
