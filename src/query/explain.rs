//! Explain trees and deterministic plan hashes.

use std::fmt::Write as _;
use std::hash::Hasher;

use serde::Serialize;
use serde_json::{json, Map, Value};
use xxhash_rust::xxh64::Xxh64;

use crate::query::expr::Var;
use crate::query::logical::{LogicalOp, LogicalPlan};

/// Human-readable explain tree.
#[derive(Clone, Debug, Serialize)]
pub struct PlanExplain {
    /// Root node of the explain tree
    pub root: ExplainNode,
    /// Deterministic hash for the plan.
    pub plan_hash: u64,
}

impl PlanExplain {
    /// Explain tree and hash of `plan`.
    pub fn of(plan: &LogicalPlan) -> Self {
        Self {
            root: build_explain_tree(plan),
            plan_hash: plan_hash(plan),
        }
    }

    /// Indented text rendering. With `redact` set, literal values are
    /// replaced by `?`.
    pub fn render(&self, redact: bool) -> String {
        let mut out = String::new();
        render_node(&self.root, 0, redact, &mut out);
        out
    }

    /// JSON rendering with properties flattened to a key/value object.
    pub fn to_json(&self, redact: bool) -> Value {
        json!({
            "plan_hash": format!("{:016x}", self.plan_hash),
            "root": node_json(&self.root, redact),
        })
    }
}

/// Explain node representing an operator with optional metadata.
#[derive(Clone, Debug, Serialize)]
pub struct ExplainNode {
    /// Operator name
    pub op: String,
    /// Additional properties describing the operator
    pub props: Vec<ExplainProp>,
    /// Input operators
    pub inputs: Vec<ExplainNode>,
}

impl ExplainNode {
    /// Creates a new explain node with the given operator name.
    pub fn new(op: impl Into<String>) -> Self {
        Self {
            op: op.into(),
            props: Vec::new(),
            inputs: Vec::new(),
        }
    }
}

/// Single property associated with an [`ExplainNode`].
#[derive(Clone, Debug, Serialize)]
pub struct ExplainProp {
    /// Property key.
    pub key: String,
    /// Property value serialized for display.
    pub value: String,
    /// Whether this property contains literal data that may be redacted.
    pub redactable: bool,
}

impl ExplainProp {
    fn plain(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            redactable: false,
        }
    }

    fn literal(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            redactable: true,
        }
    }
}

/// Explain tree of `plan`.
pub fn build_explain_tree(plan: &LogicalPlan) -> ExplainNode {
    let mut explain = ExplainNode::new(plan.op.name());
    explain.props = op_props(&plan.op);
    explain.inputs = plan.inputs.iter().map(build_explain_tree).collect();
    explain
}

/// Structural hash of `plan`: operator names, their properties and the tree
/// shape. Plan ids do not contribute, so equal plans built separately hash
/// equal.
pub fn plan_hash(plan: &LogicalPlan) -> u64 {
    let mut hasher = Xxh64::new(0);
    hash_plan_node(plan, &mut hasher);
    hasher.finish()
}

fn hash_plan_node(plan: &LogicalPlan, hasher: &mut Xxh64) {
    hasher.write(plan.op.name().as_bytes());
    for prop in op_props(&plan.op) {
        hasher.write(prop.key.as_bytes());
        hasher.write(prop.value.as_bytes());
    }
    hasher.write_u64(plan.inputs.len() as u64);
    for child in &plan.inputs {
        hash_plan_node(child, hasher);
    }
}

fn node_json(node: &ExplainNode, redact: bool) -> Value {
    let props: Map<String, Value> = node
        .props
        .iter()
        .map(|p| {
            let value = if redact && p.redactable { "?" } else { p.value.as_str() };
            (p.key.clone(), Value::String(value.to_owned()))
        })
        .collect();
    json!({
        "op": node.op,
        "props": props,
        "inputs": node.inputs.iter().map(|n| node_json(n, redact)).collect::<Vec<_>>(),
    })
}

fn render_node(node: &ExplainNode, depth: usize, redact: bool, out: &mut String) {
    let _ = write!(out, "{:indent$}{}", "", node.op, indent = depth * 2);
    if !node.props.is_empty() {
        let props: Vec<String> = node
            .props
            .iter()
            .map(|p| {
                let value = if redact && p.redactable { "?" } else { p.value.as_str() };
                format!("{}={}", p.key, value)
            })
            .collect();
        let _ = write!(out, " [{}]", props.join(", "));
    }
    out.push('\n');
    for input in &node.inputs {
        render_node(input, depth + 1, redact, out);
    }
}

fn join_vars<'a>(vars: impl IntoIterator<Item = &'a Var>) -> String {
    vars.into_iter()
        .map(Var::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn types_of(types: &[String]) -> String {
    if types.is_empty() {
        "*".into()
    } else {
        types.join("|")
    }
}

fn op_props(op: &LogicalOp) -> Vec<ExplainProp> {
    match op {
        LogicalOp::Argument { vars } => vec![ExplainProp::plain("vars", join_vars(vars))],
        LogicalOp::AllNodesScan { var, .. } => vec![ExplainProp::plain("as", var.as_str())],
        LogicalOp::NodeByLabelScan { var, label, .. } => vec![
            ExplainProp::plain("label", label.clone()),
            ExplainProp::plain("as", var.as_str()),
        ],
        LogicalOp::NodeIndexSeek {
            var,
            label,
            property,
            value,
            ..
        } => vec![
            ExplainProp::plain("label", label.clone()),
            ExplainProp::plain("prop", property.clone()),
            ExplainProp::plain("as", var.as_str()),
            ExplainProp::literal("value", value.to_string()),
        ],
        LogicalOp::DirectedRelationshipTypeScan {
            rel,
            start,
            end,
            rel_type,
            ..
        } => vec![
            ExplainProp::plain("rel", rel.as_str()),
            ExplainProp::plain("from", start.as_str()),
            ExplainProp::plain("to", end.as_str()),
            ExplainProp::plain("type", rel_type.clone()),
        ],
        LogicalOp::Expand {
            from,
            rel,
            to,
            direction,
            types,
            ..
        } => vec![
            ExplainProp::plain("from", from.as_str()),
            ExplainProp::plain("rel", rel.as_str()),
            ExplainProp::plain("to", to.as_str()),
            ExplainProp::plain("dir", format!("{direction:?}")),
            ExplainProp::plain("type", types_of(types)),
        ],
        LogicalOp::VarExpand {
            from,
            rel,
            to,
            direction,
            types,
            min,
            max,
            mode,
        } => vec![
            ExplainProp::plain("from", from.as_str()),
            ExplainProp::plain("rel", rel.as_str()),
            ExplainProp::plain("to", to.as_str()),
            ExplainProp::plain("dir", format!("{direction:?}")),
            ExplainProp::plain("type", types_of(types)),
            ExplainProp::plain(
                "length",
                format!("{min}..{}", max.map(|m| m.to_string()).unwrap_or_default()),
            ),
            ExplainProp::plain("mode", format!("{mode:?}")),
        ],
        LogicalOp::ProjectEndpoints {
            rel,
            start,
            start_in_scope,
            end,
            end_in_scope,
            direction,
        } => vec![
            ExplainProp::plain("rel", rel.as_str()),
            ExplainProp::plain("start", start.as_str()),
            ExplainProp::plain("start_in_scope", start_in_scope.to_string()),
            ExplainProp::plain("end", end.as_str()),
            ExplainProp::plain("end_in_scope", end_in_scope.to_string()),
            ExplainProp::plain("dir", format!("{direction:?}")),
        ],
        LogicalOp::Trail {
            pattern,
            from,
            to,
            mode,
        } => vec![
            ExplainProp::plain("from", from.as_str()),
            ExplainProp::plain("to", to.as_str()),
            ExplainProp::literal("pattern", pattern.to_string()),
            ExplainProp::plain("mode", format!("{mode:?}")),
        ],
        LogicalOp::StatefulShortestPath {
            pattern,
            from,
            to,
            mode,
        } => vec![
            ExplainProp::plain("from", from.as_str()),
            ExplainProp::plain("to", to.as_str()),
            ExplainProp::literal("pattern", pattern.to_string()),
            ExplainProp::plain("mode", format!("{mode:?}")),
        ],
        LogicalOp::ShortestPath { pattern } => {
            vec![ExplainProp::literal("pattern", pattern.to_string())]
        }
        LogicalOp::Selection { predicates } => vec![ExplainProp::literal(
            "predicate",
            predicates
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" AND "),
        )],
        LogicalOp::CartesianProduct | LogicalOp::Apply => Vec::new(),
        LogicalOp::NodeHashJoin { join_nodes } => {
            vec![ExplainProp::plain("on", join_vars(join_nodes))]
        }
        LogicalOp::Optional { arguments } => {
            vec![ExplainProp::plain("arguments", join_vars(arguments))]
        }
        LogicalOp::Sort { columns } => vec![ExplainProp::plain(
            "by",
            columns
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        )],
    }
}
