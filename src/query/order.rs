//! Interesting (required) and provided output orders.

use std::collections::BTreeSet;
use std::fmt;

use crate::query::expr::{Expression, Var};

/// Sort direction of one column.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum SortDirection {
    /// Ascending.
    Ascending,
    /// Descending.
    Descending,
}

/// A single sort item.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ColumnOrder {
    /// Sorted expression.
    pub expr: Expression,
    /// Direction.
    pub direction: SortDirection,
}

impl ColumnOrder {
    /// Ascending order on `expr`.
    pub fn asc(expr: Expression) -> Self {
        Self {
            expr,
            direction: SortDirection::Ascending,
        }
    }

    /// Descending order on `expr`.
    pub fn desc(expr: Expression) -> Self {
        Self {
            expr,
            direction: SortDirection::Descending,
        }
    }

    /// Variables the sort item reads.
    pub fn dependencies(&self) -> BTreeSet<Var> {
        self.expr.dependencies()
    }
}

impl fmt::Display for ColumnOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            SortDirection::Ascending => write!(f, "{} ASC", self.expr),
            SortDirection::Descending => write!(f, "{} DESC", self.expr),
        }
    }
}

/// Output order a consuming operator would like to receive.
///
/// An empty interesting order means "no particular order".
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct InterestingOrder {
    required: Vec<ColumnOrder>,
}

impl InterestingOrder {
    /// No order requirement.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Requires the given columns, in sequence.
    pub fn required(columns: impl IntoIterator<Item = ColumnOrder>) -> Self {
        Self {
            required: columns.into_iter().collect(),
        }
    }

    /// True when no order is requested.
    pub fn is_empty(&self) -> bool {
        self.required.is_empty()
    }

    /// Requested columns.
    pub fn columns(&self) -> &[ColumnOrder] {
        &self.required
    }

    /// True when `provided` already delivers this order.
    pub fn is_satisfied_by(&self, provided: &ProvidedOrder) -> bool {
        !self.is_empty() && provided.satisfies(self)
    }
}

/// Order an operator guarantees on its output.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct ProvidedOrder {
    columns: Vec<ColumnOrder>,
}

impl ProvidedOrder {
    /// No order guarantee.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Guarantees the given columns.
    pub fn new(columns: impl IntoIterator<Item = ColumnOrder>) -> Self {
        Self {
            columns: columns.into_iter().collect(),
        }
    }

    /// Guaranteed columns.
    pub fn columns(&self) -> &[ColumnOrder] {
        &self.columns
    }

    /// True when nothing is guaranteed.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// A required order is satisfied when it is a prefix of the provided one.
    pub fn satisfies(&self, required: &InterestingOrder) -> bool {
        let wanted = required.columns();
        wanted.len() <= self.columns.len()
            && wanted.iter().zip(&self.columns).all(|(w, p)| w == p)
    }

    /// Keeps the longest prefix whose dependencies stay inside `available`.
    pub fn restricted_to(&self, available: &BTreeSet<Var>) -> Self {
        let columns = self
            .columns
            .iter()
            .take_while(|c| c.dependencies().is_subset(available))
            .cloned()
            .collect();
        Self { columns }
    }
}
