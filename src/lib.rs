//! Query-compilation core of a graph database.
//!
//! [`query`] turns a declarative query graph into a cost-ranked logical plan
//! through connected-component decomposition and budgeted iterative dynamic
//! programming. [`cache`] memoizes every compilation stage in bounded tiers
//! and re-validates cached plans against live statistics.

#![warn(missing_docs)]

pub mod cache;
pub mod query;
pub mod types;

pub use types::{PenumbraError, Result};
