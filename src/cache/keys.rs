//! Cache keys.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::query::explain::plan_hash;
use crate::query::logical::LogicalPlan;

/// Coarse type of a query parameter. Plans are only shared between
/// invocations whose parameters have the same types.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    /// Untyped or `null`.
    Any,
    /// Boolean.
    Boolean,
    /// Integer.
    Integer,
    /// Floating point.
    Float,
    /// String.
    String,
    /// List.
    List,
    /// Map.
    Map,
    /// Node.
    Node,
    /// Relationship.
    Relationship,
    /// Path.
    Path,
}

/// Key of the query-shaped tiers: the query itself plus everything else that
/// changes how it is compiled.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct CacheKey<K> {
    /// Query text or syntax tree.
    pub key: K,
    /// Parameter names and their types.
    pub parameter_types: BTreeMap<String, ParameterType>,
    /// Whether the running transaction has uncommitted writes.
    pub tx_state_has_changes: bool,
}

impl<K> CacheKey<K> {
    /// Key without parameters and with a clean transaction state.
    pub fn new(key: K) -> Self {
        Self {
            key,
            parameter_types: BTreeMap::new(),
            tx_state_has_changes: false,
        }
    }

    /// Adds a typed parameter.
    pub fn with_parameter(mut self, name: impl Into<String>, ty: ParameterType) -> Self {
        self.parameter_types.insert(name.into(), ty);
        self
    }

    /// Sets the transaction-state flag.
    pub fn with_tx_state_changes(mut self, has_changes: bool) -> Self {
        self.tx_state_has_changes = has_changes;
        self
    }
}

/// Key of the execution-plan tier.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ExecutionPlanCacheKey {
    /// Runtime the plan is built for.
    pub runtime: String,
    /// Structural hash of the logical plan.
    pub plan_fingerprint: u64,
}

impl ExecutionPlanCacheKey {
    /// Key of `plan` built for `runtime`.
    pub fn for_plan(runtime: impl Into<String>, plan: &LogicalPlan) -> Self {
        Self {
            runtime: runtime.into(),
            plan_fingerprint: plan_hash(plan),
        }
    }
}
