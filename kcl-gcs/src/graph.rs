use indexmap::IndexSet;
use tracing::{debug, warn};

use crate::{
    ClusterId, Config, ConstraintId, ElementId, GcsError, SolveState,
    cluster::GraphCluster,
    constraint::{self, Constraint, ConstraintKind},
    element::{ConstraintLevel, Element, Geometry, Line, Point},
    id::IdGenerator,
    repository::{ConstraintRepository, ElementRepository},
};

mod decompose;
mod merge;

/// Points, lines and the constraints between them, plus everything needed to solve them.
///
/// ```
/// use kcl_gcs::{ConstraintGraph, SolveState};
///
/// let mut graph = ConstraintGraph::new();
/// let o = graph.add_fixed_point(0.0, 0.0);
/// let p = graph.add_point(3.0, 0.5);
/// let q = graph.add_point(0.5, 2.0);
/// graph.add_distance(o, p, 4.0).unwrap();
/// graph.add_distance(o, q, 3.0).unwrap();
/// graph.add_distance(p, q, 5.0).unwrap();
/// assert_eq!(graph.solve(), SolveState::Solved);
/// let (p, q) = (graph.point(p).unwrap(), graph.point(q).unwrap());
/// assert!((p.distance_to(&q) - 5.0).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConstraintGraph {
    config: Config,
    pub(crate) elements: ElementRepository,
    pub(crate) constraints: ConstraintRepository,
    pub(crate) clusters: Vec<GraphCluster>,
    cluster_ids: IdGenerator,
    /// Constraints no cluster has used yet.
    pub(crate) free: IndexSet<ConstraintId>,
    pub(crate) conflicting: IndexSet<ConstraintId>,
    built: bool,
    state: SolveState,
    dirty: bool,
}

impl ConstraintGraph {
    /// An empty graph with the default [`Config`].
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty graph that solves with this config.
    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Tolerances and limits used when solving.
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn add_element(&mut self, geometry: Geometry, fixed: bool) -> ElementId {
        self.dirty = true;
        self.elements.insert(geometry, fixed)
    }

    /// Adds a point that the solver may move.
    pub fn add_point(&mut self, x: f64, y: f64) -> ElementId {
        self.add_element(Geometry::Point(Point { x, y }), false)
    }

    /// Adds a point that never moves.
    pub fn add_fixed_point(&mut self, x: f64, y: f64) -> ElementId {
        self.add_element(Geometry::Point(Point { x, y }), true)
    }

    /// Adds the line `a·x + b·y + c = 0`. The coefficients are normalized.
    pub fn add_line(&mut self, a: f64, b: f64, c: f64) -> Result<ElementId, GcsError> {
        let line = Line::new(a, b, c).ok_or(GcsError::DegenerateLine { a, b, c })?;
        Ok(self.add_element(Geometry::Line(line), false))
    }

    /// Adds a line that never moves.
    pub fn add_fixed_line(&mut self, a: f64, b: f64, c: f64) -> Result<ElementId, GcsError> {
        let line = Line::new(a, b, c).ok_or(GcsError::DegenerateLine { a, b, c })?;
        Ok(self.add_element(Geometry::Line(line), true))
    }

    /// Relates two elements.
    ///
    /// Distances may relate points to points or to lines; angles relate two lines.
    pub fn add_constraint(
        &mut self,
        kind: ConstraintKind,
        e0: ElementId,
        e1: ElementId,
        value: f64,
    ) -> Result<ConstraintId, GcsError> {
        if e0 == e1 {
            return Err(GcsError::SelfConstraint(e0));
        }
        let g0 = self.elements.get(e0).ok_or(GcsError::UnknownElement(e0))?.geometry;
        let g1 = self.elements.get(e1).ok_or(GcsError::UnknownElement(e1))?.geometry;
        if !kind.accepts(&g0, &g1) {
            return Err(GcsError::InvalidConstraint {
                kind,
                first: g0.kind_name(),
                second: g1.kind_name(),
            });
        }
        validate_value(kind, value)?;
        self.dirty = true;
        Ok(self.constraints.insert(kind, [e0, e1], value))
    }

    /// Shorthand for a [`ConstraintKind::Distance`] constraint.
    pub fn add_distance(&mut self, e0: ElementId, e1: ElementId, distance: f64) -> Result<ConstraintId, GcsError> {
        self.add_constraint(ConstraintKind::Distance, e0, e1, distance)
    }

    /// Shorthand for a [`ConstraintKind::Angle`] constraint, in radians.
    pub fn add_angle(&mut self, l0: ElementId, l1: ElementId, radians: f64) -> Result<ConstraintId, GcsError> {
        self.add_constraint(ConstraintKind::Angle, l0, l1, radians)
    }

    /// Changes a constraint's target value. The next solve starts over.
    pub fn set_constraint_value(&mut self, id: ConstraintId, value: f64) -> Result<(), GcsError> {
        let constraint = self
            .constraints
            .get_mut(id)
            .ok_or(GcsError::UnknownConstraint(id))?;
        validate_value(constraint.kind, value)?;
        constraint.value = value;
        self.dirty = true;
        Ok(())
    }

    /// Merges point `remove` into point `keep`.
    ///
    /// Every constraint on `remove` is rewritten to reference `keep`.
    /// Constraints that end up relating `keep` to itself are dropped.
    /// If either point is fixed, the result is fixed at that position.
    pub fn combine_points(&mut self, keep: ElementId, remove: ElementId) -> Result<ElementId, GcsError> {
        if keep == remove {
            return Ok(keep);
        }
        let kept = self.elements.get(keep).ok_or(GcsError::UnknownElement(keep))?;
        let removed = self
            .elements
            .get(remove)
            .ok_or(GcsError::UnknownElement(remove))?;
        let (Some(kept_point), Some(removed_point)) = (kept.as_point(), removed.as_point()) else {
            let culprit = if kept.as_point().is_none() { keep } else { remove };
            return Err(GcsError::NotAPoint(culprit));
        };
        let (kept_fixed, removed_fixed) = (kept.fixed, removed.fixed);
        if kept_fixed && removed_fixed && kept_point.distance_to(&removed_point) > self.config.tolerance {
            return Err(GcsError::FixedPointsDisagree(keep, remove));
        }
        if removed_fixed && !kept_fixed {
            if let Some(kept) = self.elements.get_mut(keep) {
                kept.geometry = Geometry::Point(removed_point);
                kept.fixed = true;
            }
        }
        for dropped in self.constraints.rewrite_element(remove, keep) {
            warn!(constraint = %dropped.id, %keep, %remove, "Dropped a constraint between two combined points");
        }
        self.elements.remove(remove);
        self.dirty = true;
        Ok(keep)
    }

    /// Forgets the current decomposition and every solve result.
    /// Coordinates are kept, so the next solve starts from them.
    pub fn reset_clusters(&mut self) {
        self.elements.clear_claims();
        self.clusters.clear();
        self.free = self.constraints.ids().collect();
        self.conflicting.clear();
        for constraint in self.constraints.iter_mut() {
            constraint.solved = false;
        }
        let ids: Vec<ElementId> = self.elements.iter().map(|e| e.id).collect();
        for id in ids {
            if let Some(element) = self.elements.get_mut(id) {
                element.level = ConstraintLevel::UnderConstrained;
            }
        }
        self.built = false;
        self.state = SolveState::None;
    }

    /// Solves the graph and returns the overall outcome.
    ///
    /// Solving an unchanged graph again returns the same state and leaves coordinates alone.
    pub fn solve(&mut self) -> SolveState {
        if !self.dirty && self.state != SolveState::None {
            return self.state;
        }
        if self.dirty {
            self.reset_clusters();
        }
        self.build_clusters();

        let mut state = SolveState::Solved;
        if self.elements.iter().any(|e| !self.elements.is_claimed(e.id)) {
            state = SolveState::UnderConstrained;
        }

        let tolerance = self.config.tolerance;
        let mut local = SolveState::Solved;
        for cluster in &self.clusters {
            local = cluster.solve_local(&mut self.elements, &self.constraints, tolerance);
            if local == SolveState::Solved {
                local = cluster.anchor_to_fixed(&mut self.elements, tolerance);
            }
            if local != SolveState::Solved {
                break;
            }
        }
        if local != SolveState::Solved {
            return self.finish(local);
        }

        let merged = self.merge_clusters();
        if merged != SolveState::Solved {
            return self.finish(merged);
        }
        if self.clusters.len() > 1 {
            let numeric = self.solve_numerically();
            if numeric != SolveState::Solved {
                return self.finish(numeric);
            }
        }
        self.elements.merge_all_to_root();
        let verified = self.verify();
        self.finish(state.worst(verified))
    }

    fn finish(&mut self, state: SolveState) -> SolveState {
        if !state.is_consistent() {
            // Still mark what was satisfied, for diagnostics.
            self.verify();
        }
        debug!(%state, clusters = self.clusters.len(), "Solve finished");
        self.state = state;
        self.dirty = false;
        state
    }

    /// Checks every constraint against the root copies and marks the satisfied ones.
    fn verify(&mut self) -> SolveState {
        let tolerance = self.config.tolerance;
        let mut state = SolveState::Solved;
        let ids: Vec<ConstraintId> = self.constraints.ids().collect();
        for id in ids {
            let residual = self.residual(id);
            let solved = residual.is_some_and(|r| r.abs() <= tolerance);
            if let Some(constraint) = self.constraints.get_mut(id) {
                constraint.solved = solved;
            }
            if !solved {
                let loose = self
                    .constraints
                    .get(id)
                    .is_some_and(|c| c.elements.iter().any(|e| !self.elements.is_claimed(*e)));
                let failure = if loose {
                    // An element no cluster placed; nothing was expected of it.
                    SolveState::UnderConstrained
                } else if self.conflicting.contains(&id) {
                    SolveState::OverConstrained
                } else {
                    SolveState::NonConvergent
                };
                debug!(constraint = %id, ?residual, "Constraint not satisfied");
                state = state.worst(failure);
            }
        }
        state
    }

    /// Residual of the constraint using root copies.
    fn residual(&self, id: ConstraintId) -> Option<f64> {
        let c = self.constraints.get(id)?;
        let [e0, e1] = c.elements;
        let g0 = self.elements.get(e0)?.geometry;
        let g1 = self.elements.get(e1)?.geometry;
        constraint::residual(c.kind, c.value, &g0, &g1)
    }

    /// Residual of the constraint as a cluster sees it.
    pub(crate) fn residual_in(&self, cluster: ClusterId, id: ConstraintId) -> Option<f64> {
        let c = self.constraints.get(id)?;
        let [e0, e1] = c.elements;
        let g0 = self.elements.view(cluster, e0)?.geometry;
        let g1 = self.elements.view(cluster, e1)?.geometry;
        constraint::residual(c.kind, c.value, &g0, &g1)
    }

    pub(crate) fn next_cluster_id(&mut self) -> ClusterId {
        ClusterId(self.cluster_ids.next_id())
    }

    pub(crate) fn cluster_index(&self, id: ClusterId) -> Option<usize> {
        self.clusters.iter().position(|c| c.id == id)
    }

    pub(crate) fn cluster(&self, id: ClusterId) -> Option<&GraphCluster> {
        self.clusters.iter().find(|c| c.id == id)
    }

    /// Any element by ID.
    pub fn element(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(id)
    }

    /// All elements, in the order they were added.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.elements.iter()
    }

    /// The point with this ID, if it is one.
    pub fn point(&self, id: ElementId) -> Option<Point> {
        self.elements.get(id)?.as_point()
    }

    /// The line with this ID, if it is one.
    pub fn line(&self, id: ElementId) -> Option<Line> {
        self.elements.get(id)?.as_line()
    }

    /// Any constraint by ID.
    pub fn constraint(&self, id: ConstraintId) -> Option<&Constraint> {
        self.constraints.get(id)
    }

    /// All constraints, in the order they were added.
    pub fn constraints(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter()
    }

    /// Fixed elements count as solved. Others need at least two satisfied constraints.
    pub fn is_element_solved(&self, id: ElementId) -> bool {
        let Some(element) = self.elements.get(id) else {
            return false;
        };
        if element.fixed {
            return true;
        }
        self.constraints
            .for_element(id)
            .iter()
            .filter(|c| self.constraints.get(**c).is_some_and(|c| c.solved))
            .count()
            >= 2
    }

    /// How constrained decomposition found this element to be.
    pub fn element_level(&self, id: ElementId) -> Option<ConstraintLevel> {
        self.elements.get(id).map(|e| e.level)
    }

    /// Constraints found to be redundant with others during decomposition or merging.
    pub fn conflicting_constraints(&self) -> impl Iterator<Item = ConstraintId> + '_ {
        self.conflicting.iter().copied()
    }

    /// The current clusters.
    pub fn clusters(&self) -> &[GraphCluster] {
        &self.clusters
    }

    /// State reported by the last solve.
    pub fn state(&self) -> SolveState {
        self.state
    }

    /// Unknowns minus constraints, counting the three rigid motions of an unanchored sketch.
    /// Zero for a well-constrained sketch, negative when there are more constraints than freedoms.
    pub fn degrees_of_freedom(&self) -> i64 {
        let movable = self.elements.iter().filter(|e| !e.fixed).count() as i64;
        let any_fixed = self.elements.iter().any(|e| e.fixed);
        let effective = self
            .constraints
            .iter()
            .filter(|c| {
                !c.elements
                    .iter()
                    .all(|e| self.elements.get(*e).is_some_and(|el| el.fixed))
            })
            .count() as i64;
        let rigid_motions = if any_fixed { 0 } else { (2 * movable).min(3) };
        2 * movable - effective - rigid_motions
    }

    #[cfg(test)]
    pub(crate) fn install_cluster(&mut self, elements: &[ElementId], constraints: &[ConstraintId]) -> ClusterId {
        let id = self.next_cluster_id();
        let mut cluster = GraphCluster::new(id);
        for &e in elements {
            cluster.elements.insert(e);
            self.elements.claim(id, e);
        }
        for &c in constraints {
            cluster.constraints.insert(c);
            self.free.shift_remove(&c);
        }
        self.clusters.push(cluster);
        self.built = true;
        id
    }
}

fn validate_value(kind: ConstraintKind, value: f64) -> Result<(), GcsError> {
    let valid = match kind {
        ConstraintKind::Distance => value.is_finite() && value >= 0.0,
        ConstraintKind::Angle => value.is_finite(),
    };
    if valid {
        Ok(())
    } else {
        Err(GcsError::InvalidValue { kind, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_constraints() {
        let mut graph = ConstraintGraph::new();
        let p = graph.add_point(0.0, 0.0);
        let q = graph.add_point(1.0, 0.0);
        let l = graph.add_line(0.0, 1.0, 0.0).unwrap();
        let m = graph.add_line(1.0, 0.0, 0.0).unwrap();
        assert_eq!(
            graph.add_angle(p, l, 1.0),
            Err(GcsError::InvalidConstraint {
                kind: ConstraintKind::Angle,
                first: "point",
                second: "line"
            })
        );
        assert!(matches!(
            graph.add_distance(l, m, 1.0),
            Err(GcsError::InvalidConstraint { .. })
        ));
        assert_eq!(graph.add_distance(p, p, 1.0), Err(GcsError::SelfConstraint(p)));
        assert!(matches!(
            graph.add_distance(p, q, -1.0),
            Err(GcsError::InvalidValue { .. })
        ));
        assert!(matches!(
            graph.add_distance(p, q, f64::NAN),
            Err(GcsError::InvalidValue { .. })
        ));
        assert_eq!(
            graph.add_distance(p, ElementId(99), 1.0),
            Err(GcsError::UnknownElement(ElementId(99)))
        );
        assert!(matches!(
            graph.add_line(0.0, 0.0, 1.0),
            Err(GcsError::DegenerateLine { .. })
        ));
        assert!(graph.add_distance(p, l, 2.0).is_ok());
        assert!(graph.add_angle(l, m, 0.5).is_ok());
    }

    #[test]
    fn combining_points_rewrites_constraints() {
        let mut graph = ConstraintGraph::new();
        let a = graph.add_point(0.0, 0.0);
        let b = graph.add_point(0.1, 0.0);
        let c = graph.add_point(3.0, 0.0);
        let ab = graph.add_distance(a, b, 0.0).unwrap();
        let bc = graph.add_distance(b, c, 3.0).unwrap();
        assert_eq!(graph.combine_points(a, b), Ok(a));
        assert!(graph.element(b).is_none());
        assert!(graph.constraint(ab).is_none());
        assert_eq!(graph.constraint(bc).unwrap().elements(), [a, c]);
    }

    #[test]
    fn combining_with_a_fixed_point_fixes_the_result() {
        let mut graph = ConstraintGraph::new();
        let a = graph.add_point(1.0, 1.0);
        let o = graph.add_fixed_point(0.0, 0.0);
        graph.combine_points(a, o).unwrap();
        let survivor = graph.element(a).unwrap();
        assert!(survivor.is_fixed());
        assert_eq!(survivor.as_point(), Some(Point::new(0.0, 0.0)));

        let other = graph.add_fixed_point(5.0, 0.0);
        assert_eq!(
            graph.combine_points(a, other),
            Err(GcsError::FixedPointsDisagree(a, other))
        );
        let l = graph.add_line(0.0, 1.0, 0.0).unwrap();
        assert_eq!(graph.combine_points(a, l), Err(GcsError::NotAPoint(l)));
    }

    #[test]
    fn set_constraint_value_checks_the_value() {
        let mut graph = ConstraintGraph::new();
        let p = graph.add_point(0.0, 0.0);
        let q = graph.add_point(1.0, 0.0);
        let c = graph.add_distance(p, q, 1.0).unwrap();
        assert!(graph.set_constraint_value(c, 2.0).is_ok());
        assert_eq!(graph.constraint(c).unwrap().value(), 2.0);
        assert!(graph.set_constraint_value(c, -2.0).is_err());
        assert_eq!(
            graph.set_constraint_value(ConstraintId(7), 1.0),
            Err(GcsError::UnknownConstraint(ConstraintId(7)))
        );
    }

    #[test]
    fn degrees_of_freedom() {
        let mut graph = ConstraintGraph::new();
        let p = graph.add_point(0.0, 0.0);
        let q = graph.add_point(1.0, 0.0);
        // Two free points, floating: 4 - 3 rigid motions.
        assert_eq!(graph.degrees_of_freedom(), 1);
        graph.add_distance(p, q, 1.0).unwrap();
        assert_eq!(graph.degrees_of_freedom(), 0);
        let o = graph.add_fixed_point(0.0, 0.0);
        graph.add_distance(o, p, 0.0).unwrap();
        // Anchored now: 4 unknowns, 2 constraints.
        assert_eq!(graph.degrees_of_freedom(), 2);
    }
}
