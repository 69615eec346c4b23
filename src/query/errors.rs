#![forbid(unsafe_code)]

use std::fmt;

use thiserror::Error;

/// Fatal planning failures.
///
/// Every variant reports a precondition that the query-graph builder should
/// have guaranteed. None of them are recoverable: the whole compilation is
/// aborted and the error is surfaced to the caller as-is.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanningError {
    /// No leaf plan covers every identifier of a connection-free query graph.
    #[error("no leaf plan covers query graph {{{ids}}}")]
    NoCoveringLeaf {
        /// Identifiers that had to be covered.
        ids: String,
    },
    /// No access plan could be built for a single node connection.
    #[error("no access plan found for pattern {pattern}")]
    NoAccessPlan {
        /// Rendered pattern.
        pattern: String,
    },
    /// A sort item depends on something other than one bound variable.
    #[error("sort item '{item}' must reference exactly one bound variable")]
    NonSimpleSortItem {
        /// Rendered sort item.
        item: String,
    },
    /// The solver table did not converge to exactly one plan for the goal.
    #[error("expected exactly one plan for {goal} but found {found}")]
    TableConvergence {
        /// Rendered goal description.
        goal: String,
        /// Number of surviving plans.
        found: usize,
    },
    /// An IDP iteration finished without completing any block.
    #[error("IDP iteration {iteration} finished without completing a block")]
    UnfinishedIteration {
        /// One-based iteration counter.
        iteration: usize,
    },
    /// The selector produced no winner for a completed block.
    #[error("found no solution for block of size {size}")]
    NoSolutionForBlock {
        /// Block size that was searched.
        size: usize,
    },
    /// A connected component could not be planned at all.
    #[error("component {component} could not be planned")]
    UnplannableComponent {
        /// Rendered component.
        component: String,
    },
}

impl PlanningError {
    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            PlanningError::NoCoveringLeaf { .. } => "NoCoveringLeaf",
            PlanningError::NoAccessPlan { .. } => "NoAccessPlan",
            PlanningError::NonSimpleSortItem { .. } => "NonSimpleSortItem",
            PlanningError::TableConvergence { .. } => "TableConvergence",
            PlanningError::UnfinishedIteration { .. } => "UnfinishedIteration",
            PlanningError::NoSolutionForBlock { .. } => "NoSolutionForBlock",
            PlanningError::UnplannableComponent { .. } => "UnplannableComponent",
        }
    }
}

/// Convenience wrapper that formats planning errors with their codes.
pub struct PlanningErrorWithCode<'a>(pub &'a PlanningError);

impl fmt::Display for PlanningErrorWithCode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.0.code(), self.0)
    }
}
