//! Statistics and schema facts consumed by leaf planning, costing and the
//! plan staleness check.
//!
//! The planner never talks to storage directly. Embedders implement
//! [`PlanningMetadata`] over their catalog; [`InMemoryMetadata`] serves tests
//! and benchmarks, and allows statistics to be changed in place so staleness
//! can be exercised.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

/// Identifies one statistic the planner may read.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum StatisticsKey {
    /// Total number of nodes.
    AllNodes,
    /// Number of nodes carrying a label.
    NodesWithLabel(String),
    /// Number of relationships of a type, or of any type when `None`.
    RelationshipsWithType(Option<String>),
}

impl fmt::Display for StatisticsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatisticsKey::AllNodes => f.write_str("()"),
            StatisticsKey::NodesWithLabel(label) => write!(f, "(:{label})"),
            StatisticsKey::RelationshipsWithType(Some(t)) => write!(f, "()-[:{t}]->()"),
            StatisticsKey::RelationshipsWithType(None) => f.write_str("()-[]->()"),
        }
    }
}

/// Live graph statistics.
pub trait GraphStatistics: Send + Sync {
    /// Current value of a statistic; unknown keys read as zero.
    fn value(&self, key: &StatisticsKey) -> f64;
}

/// Statistics plus the schema facts leaf planning needs.
pub trait PlanningMetadata: GraphStatistics {
    /// Whether a node property index exists for `label(property)`.
    fn has_node_index(&self, label: &str, property: &str) -> bool;
}

#[derive(Default)]
struct MetadataInner {
    stats: BTreeMap<StatisticsKey, f64>,
    indexes: BTreeSet<(String, String)>,
}

/// In-memory metadata, configured through builder calls.
#[derive(Default)]
pub struct InMemoryMetadata {
    inner: RwLock<MetadataInner>,
}

impl InMemoryMetadata {
    /// Empty metadata: every count reads as zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the total node count.
    pub fn with_nodes(self, count: u64) -> Self {
        self.set(StatisticsKey::AllNodes, count as f64);
        self
    }

    /// Sets the node count for a label.
    pub fn with_label(self, label: impl Into<String>, count: u64) -> Self {
        self.set(StatisticsKey::NodesWithLabel(label.into()), count as f64);
        self
    }

    /// Sets the relationship count for a type.
    pub fn with_relationship_type(self, rel_type: impl Into<String>, count: u64) -> Self {
        self.set(
            StatisticsKey::RelationshipsWithType(Some(rel_type.into())),
            count as f64,
        );
        self
    }

    /// Sets the total relationship count.
    pub fn with_relationships(self, count: u64) -> Self {
        self.set(StatisticsKey::RelationshipsWithType(None), count as f64);
        self
    }

    /// Declares a node property index.
    pub fn with_node_index(self, label: impl Into<String>, property: impl Into<String>) -> Self {
        self.inner
            .write()
            .indexes
            .insert((label.into(), property.into()));
        self
    }

    /// Overwrites one statistic in place.
    pub fn set(&self, key: StatisticsKey, value: f64) {
        self.inner.write().stats.insert(key, value);
    }
}

impl GraphStatistics for InMemoryMetadata {
    fn value(&self, key: &StatisticsKey) -> f64 {
        self.inner.read().stats.get(key).copied().unwrap_or(0.0)
    }
}

impl PlanningMetadata for InMemoryMetadata {
    fn has_node_index(&self, label: &str, property: &str) -> bool {
        self.inner
            .read()
            .indexes
            .contains(&(label.to_owned(), property.to_owned()))
    }
}

/// Statistics values read while planning one query.
///
/// The snapshot is stored with a cached plan and later recomputed against
/// live statistics to decide whether the plan went stale.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStatisticsSnapshot {
    values: BTreeMap<StatisticsKey, f64>,
}

impl GraphStatisticsSnapshot {
    /// Empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `value` for `key`, keeping the first value seen.
    pub fn record(&mut self, key: StatisticsKey, value: f64) {
        self.values.entry(key).or_insert(value);
    }

    /// Recorded keys and values.
    pub fn values(&self) -> &BTreeMap<StatisticsKey, f64> {
        &self.values
    }

    /// True when nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Reads the same keys from `statistics`.
    pub fn recompute(&self, statistics: &dyn GraphStatistics) -> GraphStatisticsSnapshot {
        GraphStatisticsSnapshot {
            values: self
                .values
                .keys()
                .map(|key| (key.clone(), statistics.value(key)))
                .collect(),
        }
    }

    /// First key whose relative change towards `other` exceeds `threshold`,
    /// with the old and new values.
    pub fn diverges(
        &self,
        other: &GraphStatisticsSnapshot,
        threshold: f64,
    ) -> Option<(&StatisticsKey, f64, f64)> {
        self.values.iter().find_map(|(key, &before)| {
            let after = other.values.get(key).copied().unwrap_or(0.0);
            (relative_change(before, after) > threshold).then_some((key, before, after))
        })
    }
}

fn relative_change(before: f64, after: f64) -> f64 {
    if before == after {
        return 0.0;
    }
    (before - after).abs() / before.abs().max(after.abs())
}

/// Records every statistic the planner reads into a
/// [`GraphStatisticsSnapshot`].
pub struct InstrumentedMetadata {
    inner: Arc<dyn PlanningMetadata>,
    snapshot: Mutex<GraphStatisticsSnapshot>,
}

impl InstrumentedMetadata {
    /// Wraps `inner`.
    pub fn new(inner: Arc<dyn PlanningMetadata>) -> Self {
        Self {
            inner,
            snapshot: Mutex::new(GraphStatisticsSnapshot::new()),
        }
    }

    /// Values read so far.
    pub fn snapshot(&self) -> GraphStatisticsSnapshot {
        self.snapshot.lock().clone()
    }
}

impl GraphStatistics for InstrumentedMetadata {
    fn value(&self, key: &StatisticsKey) -> f64 {
        let value = self.inner.value(key);
        self.snapshot.lock().record(key.clone(), value);
        value
    }
}

impl PlanningMetadata for InstrumentedMetadata {
    fn has_node_index(&self, label: &str, property: &str) -> bool {
        self.inner.has_node_index(label, property)
    }
}
