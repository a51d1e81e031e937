use std::fmt;

use crate::{
    ConstraintId, ElementId,
    element::{Geometry, angle_error},
};

/// What a constraint measures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    /// Point-point or point-line distance.
    /// Point-line distances are unsigned: either side of the line will do.
    Distance,
    /// Angle between two lines' directions, in radians.
    /// Unsigned and modulo half a turn, so an angle of θ is also met by -θ, θ+π and π-θ.
    Angle,
}

impl ConstraintKind {
    /// Lowercase name, as used in text and diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            ConstraintKind::Distance => "distance",
            ConstraintKind::Angle => "angle",
        }
    }

    /// Whether this kind of constraint can relate the two shapes.
    pub(crate) fn accepts(self, g0: &Geometry, g1: &Geometry) -> bool {
        use Geometry as G;
        match self {
            ConstraintKind::Distance => !matches!((g0, g1), (G::Line(_), G::Line(_))),
            ConstraintKind::Angle => matches!((g0, g1), (G::Line(_), G::Line(_))),
        }
    }
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A binary relation between two elements.
#[derive(Clone, Debug, PartialEq)]
pub struct Constraint {
    pub(crate) id: ConstraintId,
    pub(crate) kind: ConstraintKind,
    pub(crate) elements: [ElementId; 2],
    pub(crate) value: f64,
    pub(crate) solved: bool,
}

impl Constraint {
    /// This constraint's ID.
    pub fn id(&self) -> ConstraintId {
        self.id
    }

    /// What the constraint measures.
    pub fn kind(&self) -> ConstraintKind {
        self.kind
    }

    /// The two constrained elements, in the order they were given.
    pub fn elements(&self) -> [ElementId; 2] {
        self.elements
    }

    /// Target distance, or target angle in radians.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Whether the last solve satisfied this constraint.
    pub fn is_solved(&self) -> bool {
        self.solved
    }

    /// The element at the other end from `element`.
    pub(crate) fn other(&self, element: ElementId) -> Option<ElementId> {
        match self.elements {
            [a, b] if a == element => Some(b),
            [a, b] if b == element => Some(a),
            _ => None,
        }
    }
}

/// How far the two geometries are from satisfying the relation.
/// `None` if the relation doesn't apply to this pair of shapes.
pub(crate) fn residual(kind: ConstraintKind, value: f64, g0: &Geometry, g1: &Geometry) -> Option<f64> {
    use Geometry as G;
    match (kind, g0, g1) {
        (ConstraintKind::Distance, G::Point(p), G::Point(q)) => Some(p.distance_to(q) - value),
        (ConstraintKind::Distance, G::Point(p), G::Line(l))
        | (ConstraintKind::Distance, G::Line(l), G::Point(p)) => Some(l.distance(p) - value),
        (ConstraintKind::Angle, G::Line(l), G::Line(m)) => Some(angle_error(l.angle_to(m), value)),
        _ => None,
    }
}

/// The relation the two geometries currently have: the distance between them,
/// or the signed angle from the first line to the second.
pub(crate) fn measure(g0: &Geometry, g1: &Geometry) -> (ConstraintKind, f64) {
    use Geometry as G;
    match (g0, g1) {
        (G::Point(p), G::Point(q)) => (ConstraintKind::Distance, p.distance_to(q)),
        (G::Point(p), G::Line(l)) | (G::Line(l), G::Point(p)) => {
            (ConstraintKind::Distance, l.distance(p))
        }
        (G::Line(l), G::Line(m)) => (ConstraintKind::Angle, l.angle_to(m)),
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::FRAC_PI_2;

    use super::*;
    use crate::element::{Line, Point};

    #[test]
    fn residuals() {
        let p = Geometry::Point(Point::new(0.0, 3.0));
        let q = Geometry::Point(Point::new(4.0, 0.0));
        let x_axis = Geometry::Line(Line::new(0.0, 1.0, 0.0).unwrap());
        let y_axis = Geometry::Line(Line::new(1.0, 0.0, 0.0).unwrap());
        let r = residual(ConstraintKind::Distance, 5.0, &p, &q).unwrap();
        assert!(r.abs() < 1e-12);
        let r = residual(ConstraintKind::Distance, 1.0, &x_axis, &p).unwrap();
        assert!((r - 2.0).abs() < 1e-12);
        let r = residual(ConstraintKind::Angle, FRAC_PI_2, &x_axis, &y_axis).unwrap();
        assert!(r.abs() < 1e-12);
        assert!(residual(ConstraintKind::Angle, 1.0, &p, &x_axis).is_none());
        assert!(residual(ConstraintKind::Distance, 1.0, &x_axis, &y_axis).is_none());
    }

    #[test]
    fn other_end() {
        let c = Constraint {
            id: ConstraintId(0),
            kind: ConstraintKind::Distance,
            elements: [ElementId(1), ElementId(2)],
            value: 1.0,
            solved: false,
        };
        assert_eq!(c.other(ElementId(1)), Some(ElementId(2)));
        assert_eq!(c.other(ElementId(2)), Some(ElementId(1)));
        assert_eq!(c.other(ElementId(3)), None);
    }
}
