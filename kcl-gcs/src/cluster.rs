//! Rigid clusters: sets of elements whose relative positions are fully determined.
use indexmap::IndexSet;
use tracing::{debug, trace};

use crate::{
    ClusterId, ConstraintId, ElementId, SolveState,
    analytic::{self, Relation},
    constraint::{Constraint, ConstraintKind},
    element::{Geometry, minimal_rotation},
    repository::{ConstraintRepository, ElementRepository},
    transform::{self, RigidTransform},
    vector::V,
};

/// How a cluster was grown, and therefore how to solve it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum GrowthStep {
    /// The first two elements and the constraint between them.
    Seed(ConstraintId),
    /// An element placed from two constraints to elements placed before it.
    Place {
        element: ElementId,
        constraints: [ConstraintId; 2],
    },
}

/// A rigid group of elements found by decomposition.
#[derive(Clone, Debug)]
pub struct GraphCluster {
    pub(crate) id: ClusterId,
    pub(crate) elements: IndexSet<ElementId>,
    pub(crate) constraints: IndexSet<ConstraintId>,
    pub(crate) steps: Vec<GrowthStep>,
}

impl GraphCluster {
    pub(crate) fn new(id: ClusterId) -> Self {
        Self {
            id,
            elements: IndexSet::new(),
            constraints: IndexSet::new(),
            steps: Vec::new(),
        }
    }

    /// This cluster's ID.
    pub fn id(&self) -> ClusterId {
        self.id
    }

    /// Elements in the order they were added.
    pub fn elements(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.elements.iter().copied()
    }

    /// Constraints inside the cluster.
    pub fn constraints(&self) -> impl Iterator<Item = ConstraintId> + '_ {
        self.constraints.iter().copied()
    }

    /// Whether the element belongs to this cluster.
    pub fn contains(&self, element: ElementId) -> bool {
        self.elements.contains(&element)
    }

    /// How many elements the cluster holds.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the cluster holds no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Elements this cluster has in common with `other`.
    pub(crate) fn shared_with(&self, other: &GraphCluster) -> Vec<ElementId> {
        self.elements
            .iter()
            .copied()
            .filter(|e| other.contains(*e))
            .collect()
    }

    pub(crate) fn has_fixed(&self, elements: &ElementRepository) -> bool {
        self.elements
            .iter()
            .any(|e| elements.get(*e).is_some_and(|el| el.fixed))
    }

    /// Moves every element of the cluster, in the cluster's own view.
    pub(crate) fn apply(&self, t: &RigidTransform, elements: &mut ElementRepository) {
        for &id in &self.elements {
            if let Some(element) = elements.view_mut(self.id, id) {
                element.geometry = element.geometry.transformed(t);
            }
        }
    }

    /// Places every element of the cluster, one growth step at a time.
    pub(crate) fn solve_local(
        &self,
        elements: &mut ElementRepository,
        constraints: &ConstraintRepository,
        tolerance: f64,
    ) -> SolveState {
        for step in &self.steps {
            let state = match *step {
                GrowthStep::Seed(c) => self.place_seed(c, elements, constraints),
                GrowthStep::Place {
                    element,
                    constraints: [c0, c1],
                } => self.place(element, [c0, c1], elements, constraints, tolerance),
            };
            if state != SolveState::Solved {
                debug!(cluster = %self.id, ?step, %state, "Local solve failed");
                return state;
            }
        }
        SolveState::Solved
    }

    fn place_seed(
        &self,
        c: ConstraintId,
        elements: &mut ElementRepository,
        constraints: &ConstraintRepository,
    ) -> SolveState {
        let Some(constraint) = constraints.get(c) else {
            return SolveState::NonConvergent;
        };
        let [e0, e1] = constraint.elements;
        let fixed = |e| elements.get(e).is_some_and(|el| el.fixed);
        // The fixed end stays put, if there is one.
        let (keeper, mover) = if fixed(e1) && !fixed(e0) {
            (e1, e0)
        } else {
            (e0, e1)
        };
        let (Some(keeper_geometry), Some(mover_geometry)) = (
            elements.view(self.id, keeper).map(|el| el.geometry),
            elements.view(self.id, mover).map(|el| el.geometry),
        ) else {
            return SolveState::NonConvergent;
        };
        let Some(placed) = seed_placement(constraint, &keeper_geometry, &mover_geometry) else {
            return SolveState::NonConvergent;
        };
        if let Some(element) = elements.view_mut(self.id, mover) {
            element.geometry = placed;
        }
        trace!(cluster = %self.id, %keeper, %mover, "Placed seed");
        SolveState::Solved
    }

    fn place(
        &self,
        element: ElementId,
        pair: [ConstraintId; 2],
        elements: &mut ElementRepository,
        constraints: &ConstraintRepository,
        tolerance: f64,
    ) -> SolveState {
        let Some(prior) = elements.view(self.id, element).map(|el| el.geometry) else {
            return SolveState::NonConvergent;
        };
        let relation = |c: ConstraintId| -> Option<Relation> {
            let constraint = constraints.get(c)?;
            let other = constraint.other(element)?;
            let known = elements.view(self.id, other)?.geometry;
            Some(Relation {
                kind: constraint.kind,
                value: constraint.value,
                known,
            })
        };
        let (Some(r0), Some(r1)) = (relation(pair[0]), relation(pair[1])) else {
            return SolveState::NonConvergent;
        };
        match analytic::solve_element(&prior, [r0, r1], tolerance) {
            Ok(placed) => {
                if let Some(el) = elements.view_mut(self.id, element) {
                    el.geometry = placed;
                }
                trace!(cluster = %self.id, %element, "Placed element");
                SolveState::Solved
            }
            Err(e) => {
                debug!(cluster = %self.id, %element, error = %e, "Could not place element");
                e.into()
            }
        }
    }

    /// Moves the solved cluster onto the true positions of its fixed elements.
    pub(crate) fn anchor_to_fixed(&self, elements: &mut ElementRepository, tolerance: f64) -> SolveState {
        let fixed: Vec<(Geometry, Geometry)> = self
            .elements
            .iter()
            .filter_map(|&id| {
                let truth = elements.get(id).filter(|el| el.fixed)?.geometry;
                let local = elements.view(self.id, id)?.geometry;
                Some((local, truth))
            })
            .collect();
        if fixed.is_empty() {
            return SolveState::Solved;
        }
        let t = fixed
            .iter()
            .enumerate()
            .flat_map(|(i, a)| fixed[i + 1..].iter().map(move |b| (a, b)))
            .find_map(|(a, b)| transform::from_pairs([a.0, b.0], [a.1, b.1], tolerance).ok())
            .or_else(|| transform::align_single(&fixed[0].0, &fixed[0].1).ok());
        let Some(t) = t else {
            debug!(cluster = %self.id, "Fixed elements disagree with the cluster's shape");
            return SolveState::OverConstrained;
        };
        self.apply(&t, elements);
        let agrees = self.elements.iter().all(|&id| {
            match (elements.get(id), elements.view(self.id, id)) {
                (Some(truth), Some(local)) if truth.fixed => {
                    truth.geometry.is_close(&local.geometry, tolerance)
                }
                _ => true,
            }
        });
        if agrees {
            SolveState::Solved
        } else {
            debug!(cluster = %self.id, "Fixed elements disagree with the cluster's shape");
            SolveState::OverConstrained
        }
    }
}

/// Moves `mover` as little as possible so that the seed constraint holds.
fn seed_placement(constraint: &Constraint, keeper: &Geometry, mover: &Geometry) -> Option<Geometry> {
    use Geometry as G;
    let value = constraint.value;
    match (constraint.kind, keeper, mover) {
        (ConstraintKind::Distance, G::Point(k), G::Point(m)) => {
            let dir = (m.v() - k.v()).normalized().unwrap_or(V::new(1.0, 0.0));
            Some(G::Point((k.v() + dir * value).into()))
        }
        (ConstraintKind::Distance, G::Point(k), G::Line(m)) => {
            let s = m.signed_distance(k);
            let target = if s >= 0.0 { value } else { -value };
            Some(G::Line(m.translated(m.normal() * (s - target))))
        }
        (ConstraintKind::Distance, G::Line(k), G::Point(m)) => {
            let s = k.signed_distance(m);
            let target = if s >= 0.0 { value } else { -value };
            Some(G::Point((m.v() + k.normal() * (target - s)).into()))
        }
        (ConstraintKind::Angle, G::Line(k), G::Line(m)) => {
            let turn = minimal_rotation(k.angle_to(m), value);
            let pivot = k.intersection(m).map(|p| p.v()).unwrap_or(m.anchor());
            Some(G::Line(m.rotated_about(pivot, turn)))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        element::{Line, Point},
        tests::assert_nearly_eq,
    };

    fn distance(a: u32, b: u32, value: f64) -> Constraint {
        Constraint {
            id: ConstraintId(0),
            kind: ConstraintKind::Distance,
            elements: [ElementId(a), ElementId(b)],
            value,
            solved: false,
        }
    }

    #[test]
    fn seed_moves_points_along_their_offset() {
        let k = Geometry::Point(Point::new(1.0, 1.0));
        let m = Geometry::Point(Point::new(1.0, 3.0));
        let Some(Geometry::Point(p)) = seed_placement(&distance(0, 1, 5.0), &k, &m) else {
            panic!("expected a point");
        };
        assert_nearly_eq(p.x, 1.0);
        assert_nearly_eq(p.y, 6.0);
    }

    #[test]
    fn seed_keeps_line_side() {
        let k = Geometry::Point(Point::new(0.0, 3.0));
        let m = Geometry::Line(Line::new(0.0, 1.0, 0.0).unwrap());
        let Some(Geometry::Line(l)) = seed_placement(&distance(0, 1, 1.0), &k, &m) else {
            panic!("expected a line");
        };
        assert_nearly_eq(l.signed_distance(&Point::new(0.0, 3.0)), 1.0);
        assert_nearly_eq(l.c(), -2.0);
    }

    #[test]
    fn seed_rotates_lines_minimally() {
        let k = Geometry::Line(Line::new(0.0, 1.0, 0.0).unwrap());
        let m = Geometry::Line(Line::through(Point::new(1.0, 0.0), Point::new(2.0, 2.0)).unwrap());
        let angle = Constraint {
            kind: ConstraintKind::Angle,
            ..distance(0, 1, 45.0_f64.to_radians())
        };
        let Some(Geometry::Line(l)) = seed_placement(&angle, &k, &m) else {
            panic!("expected a line");
        };
        let Geometry::Line(k) = k else { unreachable!() };
        assert_nearly_eq(k.angle_to(&l).to_degrees(), 45.0);
        // Turned about the crossing point.
        assert_nearly_eq(l.distance(&Point::new(1.0, 0.0)), 0.0);
    }
}
