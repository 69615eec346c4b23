#![forbid(unsafe_code)]

//! Query compilation: query graphs, join enumeration and logical planning.
//!
//! A [`QueryGraph`] is split into connected components, each component is
//! planned by the [`SingleComponentPlanner`] on top of the [`idp`] solver, and
//! the [`QueryGraphSolver`] stitches component plans and optional matches
//! together.

/// Fluent query-graph construction.
pub mod builder;

/// Planner configuration and the per-compilation planning context.
pub mod context;

/// Cost model and plan ranking.
pub mod cost;

/// Fatal planning errors.
pub mod errors;

/// Explain trees and plan fingerprints.
pub mod explain;

/// Expressions, variables and predicates.
pub mod expr;

/// The query-graph intermediate representation.
pub mod graph;

/// Budgeted iterative dynamic programming.
pub mod idp;

/// Leaf plan enumeration.
pub mod leaf;

/// Logical plan algebra.
pub mod logical;

/// Graph statistics and schema information consumed by planning.
pub mod metadata;

/// Interesting and provided orders.
pub mod order;

/// Single-component planning.
pub mod planner;

/// Construction of logical plan nodes.
pub mod producer;

/// Whole-query-graph planning.
pub mod solver;

pub use builder::QueryGraphBuilder;
pub use context::{PlannerConfig, PlanningContext, QueryPlannerKit};
pub use errors::PlanningError;
pub use explain::{ExplainNode, ExplainProp, PlanExplain};
pub use graph::QueryGraph;
pub use logical::LogicalPlan;
pub use order::InterestingOrder;
pub use planner::{BestPlans, SingleComponentPlanner};
pub use solver::QueryGraphSolver;
