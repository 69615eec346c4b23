//! Planner hints and mutating patterns attached to a query graph.

use std::collections::BTreeSet;
use std::fmt;

use crate::query::expr::{Expression, Var};

/// `USING ...` hint.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Hint {
    /// `USING INDEX var:Label(property)`
    UsingIndex {
        /// Hinted node.
        var: Var,
        /// Label of the index.
        label: String,
        /// Indexed property.
        property: String,
    },
    /// `USING SCAN var:Label`
    UsingScan {
        /// Hinted node.
        var: Var,
        /// Scanned label.
        label: String,
    },
    /// `USING JOIN ON vars`
    UsingJoin {
        /// Join nodes.
        vars: BTreeSet<Var>,
    },
}

impl Hint {
    /// Variables the hint refers to.
    pub fn variables(&self) -> BTreeSet<Var> {
        match self {
            Hint::UsingIndex { var, .. } | Hint::UsingScan { var, .. } => {
                BTreeSet::from([var.clone()])
            }
            Hint::UsingJoin { vars } => vars.clone(),
        }
    }

    /// True for `USING JOIN`.
    pub fn is_join(&self) -> bool {
        matches!(self, Hint::UsingJoin { .. })
    }
}

impl fmt::Display for Hint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hint::UsingIndex {
                var,
                label,
                property,
            } => write!(f, "USING INDEX {var}:{label}({property})"),
            Hint::UsingScan { var, label } => write!(f, "USING SCAN {var}:{label}"),
            Hint::UsingJoin { vars } => {
                let names: Vec<&str> = vars.iter().map(Var::as_str).collect();
                write!(f, "USING JOIN ON {}", names.join(", "))
            }
        }
    }
}

/// Write clause carried by a query graph. The planner only reads their ids
/// and dependencies; planning updates is the caller's business.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum MutatingPattern {
    /// `CREATE` of nodes and relationships.
    Create {
        /// Created node variables.
        nodes: Vec<Var>,
        /// Created relationship variables.
        relationships: Vec<Var>,
    },
    /// `SET var.key = value`
    SetProperty {
        /// Entity variable.
        var: Var,
        /// Property key.
        key: String,
        /// New value.
        value: Expression,
    },
    /// `[DETACH] DELETE expr`
    Delete {
        /// Deleted expression.
        expr: Expression,
        /// Whether relationships are deleted too.
        detach: bool,
    },
}

impl MutatingPattern {
    /// Identifiers introduced by the clause.
    pub fn covered_ids(&self) -> BTreeSet<Var> {
        match self {
            MutatingPattern::Create {
                nodes,
                relationships,
            } => nodes.iter().chain(relationships).cloned().collect(),
            MutatingPattern::SetProperty { .. } | MutatingPattern::Delete { .. } => BTreeSet::new(),
        }
    }

    /// Identifiers the clause reads.
    pub fn dependencies(&self) -> BTreeSet<Var> {
        match self {
            MutatingPattern::Create { .. } => BTreeSet::new(),
            MutatingPattern::SetProperty { var, value, .. } => {
                let mut deps = value.dependencies();
                deps.insert(var.clone());
                deps
            }
            MutatingPattern::Delete { expr, .. } => expr.dependencies(),
        }
    }
}
