//! Geometric Constraint Solver.
//! Solves 2D sketches of points and lines by splitting them into rigid clusters,
//! placing each cluster in closed form, then merging the clusters back together.
//!
//! Anything the clusters can't settle is handed to a numeric fallback.

pub use crate::cluster::GraphCluster;
pub use crate::config::Config;
pub use crate::constraint::{Constraint, ConstraintKind};
pub use crate::element::{ConstraintLevel, Element, Geometry, Line, Point};
pub use crate::error::{GcsError, NumericError, TextualError};
pub use crate::graph::ConstraintGraph;
pub use crate::id::{ClusterId, ConstraintId, ElementId, Id};
pub use crate::solve_state::SolveState;

/// Closed-form placement of single elements.
pub mod analytic;
/// Rigid clusters of elements.
mod cluster;
mod config;
/// Distance and angle constraints.
mod constraint;
/// Points and lines.
mod element;
mod error;
/// GraphViz output.
mod export;
/// The constraint graph, its decomposition and merging.
mod graph;
/// IDs of elements, constraints and clusters.
mod id;
/// Levenberg-Marquardt fallback for clusters that won't merge.
mod numeric;
mod repository;
mod solve_state;
/// Unit tests
#[cfg(test)]
mod tests;
/// Parser for a textual representation of sketches.
pub mod textual;
mod transform;
mod vector;

/// Anything smaller than this is treated as zero.
pub(crate) const EPSILON: f64 = 1e-12;
