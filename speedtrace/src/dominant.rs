//! Folding of visually insignificant events.
//!
//! Two separate algorithms live here, serving two rendering paths:
//!
//! - [`DominantTypeVisitor`] decides, for an event narrower than the
//!   insignificance threshold, whether it should borrow the color of an
//!   important type buried beneath it. Results are memoized per node and
//!   dropped whenever the tree epoch or the pixel scale changes.
//! - [`fold_suppressed`] walks a subtree once for a breakdown bar,
//!   accumulating suppressed self time per type and emitting one discrete
//!   bar each time a type's accumulated time reaches the threshold.
//!
//! All thresholds are configured in pixels and converted to milliseconds
//! as `px / pixels_per_ms`.

use crate::aggregate::{TypeMapAggregator, type_map};
use crate::config::Config;
use serde::Serialize;
use speedtrace_model::{EventTree, EventType, EventTypeRegistry, NodeId, TypeDurations};
use std::collections::HashMap;

// ============================================================================
// Dominant type visitor
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
struct MemoKey {
    epoch: u64,
    pixels_per_ms: f64,
}

/// Memoized dominant-type queries over an [`EventTree`].
#[derive(Debug)]
pub struct DominantTypeVisitor {
    significance_px: f64,
    aggregate_significance_px: f64,
    key: Option<MemoKey>,
    maps: HashMap<NodeId, TypeMapAggregator>,
    /// Decisions keyed by (rendered root, node).
    dominant: HashMap<(NodeId, NodeId), Option<EventType>>,
}

impl DominantTypeVisitor {
    pub fn new(significance_px: f64, aggregate_significance_px: f64) -> Self {
        Self {
            significance_px,
            aggregate_significance_px,
            key: None,
            maps: HashMap::new(),
            dominant: HashMap::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.significance_px, config.aggregate_significance_px)
    }

    /// Events shorter than this many ms are insignificant.
    pub fn insignificance_threshold(&self, pixels_per_ms: f64) -> f64 {
        self.significance_px / pixels_per_ms
    }

    /// Time a type needs across a whole root to count as important.
    pub fn aggregate_threshold(&self, pixels_per_ms: f64) -> f64 {
        self.aggregate_significance_px / pixels_per_ms
    }

    /// Number of nodes with a memoized type map.
    pub fn memoized(&self) -> usize {
        self.maps.len()
    }

    fn sync(&mut self, tree: &EventTree, pixels_per_ms: f64) {
        let key = MemoKey {
            epoch: tree.epoch(),
            pixels_per_ms,
        };
        if self.key != Some(key) {
            self.maps.clear();
            self.dominant.clear();
            self.key = Some(key);
        }
    }

    fn ensure_maps(&mut self, tree: &EventTree, id: NodeId) {
        if self.maps.contains_key(&id) {
            return;
        }
        for node in tree.postorder(id) {
            if self.maps.contains_key(&node) {
                continue;
            }
            let aggregator = {
                let child_maps: Vec<&TypeDurations> = tree
                    .get(node)
                    .children()
                    .iter()
                    .filter_map(|child| self.maps.get(child).map(TypeMapAggregator::durations))
                    .collect();
                type_map(tree, node, &child_maps)
            };
            self.maps.insert(node, aggregator);
        }
    }

    /// Per-type durations of the subtree at `id`.
    pub fn type_durations(&mut self, tree: &EventTree, id: NodeId, pixels_per_ms: f64) -> &TypeDurations {
        self.sync(tree, pixels_per_ms);
        self.ensure_maps(tree, id);
        self.maps.entry(id).or_default().durations()
    }

    /// The type whose color `node` should borrow when drawn inside `root`.
    ///
    /// Only events under the insignificance threshold get one. A log
    /// message always does; anything else only when its heaviest type adds
    /// up to the aggregate threshold across the whole of `root`.
    pub fn dominant_type(
        &mut self,
        tree: &EventTree,
        root: NodeId,
        node: NodeId,
        pixels_per_ms: f64,
    ) -> Option<EventType> {
        self.sync(tree, pixels_per_ms);
        if let Some(decision) = self.dominant.get(&(root, node)) {
            return *decision;
        }

        self.ensure_maps(tree, root);
        self.ensure_maps(tree, node);
        let event = tree.get(node);
        let decision = if event.duration < self.insignificance_threshold(pixels_per_ms) {
            let type_of_max = self.maps.get(&node).and_then(TypeMapAggregator::type_of_max);
            let root_total = |event_type: EventType| {
                self.maps.get(&root).map_or(0.0, |map| map.get(event_type))
            };
            let threshold = self.aggregate_threshold(pixels_per_ms);
            type_of_max.filter(|dominant| {
                event.event_type == EventType::LOG_MESSAGE || root_total(*dominant) >= threshold
            })
        } else {
            None
        };

        self.dominant.insert((root, node), decision);
        decision
    }

    pub fn has_dominant_type(
        &mut self,
        tree: &EventTree,
        root: NodeId,
        node: NodeId,
        pixels_per_ms: f64,
    ) -> bool {
        self.dominant_type(tree, root, node, pixels_per_ms).is_some()
    }

    /// Color of the dominant type, if `node` has one.
    pub fn dominant_type_color(
        &mut self,
        tree: &EventTree,
        root: NodeId,
        node: NodeId,
        pixels_per_ms: f64,
        registry: &EventTypeRegistry,
    ) -> Option<String> {
        self.dominant_type(tree, root, node, pixels_per_ms)
            .map(|event_type| registry.color_for(event_type))
    }
}

// ============================================================================
// Suppressed time fold
// ============================================================================

/// One bar of a breakdown graph, in pixels from the root's start.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bar {
    pub node: NodeId,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub x: f64,
    pub width: f64,
    /// True for a bar standing in for several suppressed events.
    pub aggregated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FoldResult {
    pub bars: Vec<Bar>,
    /// Suppressed time per type that never reached the threshold.
    pub suppressed: TypeDurations,
}

/// Lays out the subtree at `root` as bars, folding insignificant events.
///
/// Events at least `significance_px` wide get their own bar. Narrower ones
/// add their self time to a per-type accumulator. When an accumulator
/// reaches the threshold, the event that tipped it gets a bar exactly
/// `significance_px` wide and the accumulator restarts at zero.
pub fn fold_suppressed(
    tree: &EventTree,
    root: NodeId,
    pixels_per_ms: f64,
    significance_px: f64,
) -> FoldResult {
    let threshold = significance_px / pixels_per_ms;
    let origin = tree.get(root).time;
    let mut result = FoldResult::default();

    for id in tree.preorder(root) {
        let event = tree.get(id);
        let x = (event.time - origin) * pixels_per_ms;
        if event.duration < threshold {
            let pending = result.suppressed.entry(event.event_type).or_insert(0.0);
            let total = *pending + event.self_time();
            if total < threshold {
                *pending = total;
                continue;
            }
            *pending = 0.0;
            result.bars.push(Bar {
                node: id,
                event_type: event.event_type,
                x,
                width: significance_px,
                aggregated: true,
            });
        } else {
            result.bars.push(Bar {
                node: id,
                event_type: event.event_type,
                x,
                width: event.duration * pixels_per_ms,
                aggregated: false,
            });
        }
    }

    result.suppressed.retain(|_, ms| *ms > 0.0);
    result
}
