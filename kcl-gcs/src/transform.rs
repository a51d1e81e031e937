use std::f64::consts::PI;

use crate::{
    element::{Geometry, Line, Point, wrap_angle, wrap_half_turn},
    vector::V,
};

/// A rotation about `pivot` followed by a translation.
/// Never mirrors, so clusters keep their handedness when they move.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct RigidTransform {
    pivot: V,
    angle: f64,
    translation: V,
}

/// Why no rigid transform maps one pair of geometries onto another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub(crate) enum TransformError {
    /// The pairs are related differently in the two frames.
    #[error("the two pairs are not congruent")]
    Mismatch,
    /// The pair leaves some motion free, e.g. two parallel lines.
    #[error("the pair does not determine a rigid motion")]
    Degenerate,
}

impl RigidTransform {
    pub fn translation(t: V) -> Self {
        Self {
            pivot: V::default(),
            angle: 0.0,
            translation: t,
        }
    }

    pub fn rotation_about(pivot: V, angle: f64) -> Self {
        Self {
            pivot,
            angle,
            translation: V::default(),
        }
    }

    pub fn apply_point(&self, p: V) -> V {
        p.rotate_about(self.pivot, self.angle) + self.translation
    }

    pub fn apply_line(&self, l: &Line) -> Line {
        l.rotated_about(self.pivot, self.angle)
            .translated(self.translation)
    }

    /// The same motion followed by a half turn about where the pivot lands.
    ///
    /// Two crossing lines, or a point on a line, end up on the same places
    /// either way, so callers pick between the two by looking at the rest.
    pub fn half_turned(&self) -> Self {
        Self {
            angle: wrap_angle(self.angle + PI),
            ..*self
        }
    }
}

/// Of rotating by `delta` or half a turn further, whichever is smaller.
fn shortest_of_half_turns(delta: f64) -> f64 {
    let flipped = wrap_angle(delta + PI);
    if delta.abs() <= flipped.abs() {
        delta
    } else {
        flipped
    }
}

/// Rotation that makes `from` parallel to `to`, ignoring which way either points.
fn parallel_rotation(from: &Line, to: &Line) -> f64 {
    shortest_of_half_turns(wrap_angle(to.direction().angle() - from.direction().angle()))
}

/// Finds the rigid transform taking `src[0]` to `dst[0]` and `src[1]` to `dst[1]`.
pub(crate) fn from_pairs(
    src: [Geometry; 2],
    dst: [Geometry; 2],
    tolerance: f64,
) -> Result<RigidTransform, TransformError> {
    use Geometry as G;
    match (src, dst) {
        ([G::Point(p), G::Point(q)], [G::Point(p2), G::Point(q2)]) => {
            from_points(p, q, p2, q2, tolerance)
        }
        ([G::Point(p), G::Line(l)], [G::Point(p2), G::Line(l2)])
        | ([G::Line(l), G::Point(p)], [G::Line(l2), G::Point(p2)]) => {
            from_point_line(p, &l, p2, &l2, tolerance)
        }
        ([G::Line(l), G::Line(m)], [G::Line(l2), G::Line(m2)]) => {
            from_lines(&l, &m, &l2, &m2, tolerance)
        }
        _ => Err(TransformError::Mismatch),
    }
}

fn from_points(
    p: Point,
    q: Point,
    p2: Point,
    q2: Point,
    tolerance: f64,
) -> Result<RigidTransform, TransformError> {
    let (d, d2) = (p.distance_to(&q), p2.distance_to(&q2));
    if (d - d2).abs() > tolerance {
        return Err(TransformError::Mismatch);
    }
    if d <= tolerance {
        return Err(TransformError::Degenerate);
    }
    let angle = wrap_angle((q2.v() - p2.v()).angle() - (q.v() - p.v()).angle());
    Ok(RigidTransform {
        pivot: p.v(),
        angle,
        translation: p2.v() - p.v(),
    })
}

fn from_point_line(
    p: Point,
    l: &Line,
    p2: Point,
    l2: &Line,
    tolerance: f64,
) -> Result<RigidTransform, TransformError> {
    let (s, s2) = (l.signed_distance(&p), l2.signed_distance(&p2));
    if (s.abs() - s2.abs()).abs() > tolerance {
        return Err(TransformError::Mismatch);
    }
    let delta = wrap_angle(l2.normal().angle() - l.normal().angle());
    let angle = if s.abs() <= tolerance {
        // The point lies on the line, so either orientation works.
        shortest_of_half_turns(delta)
    } else if (s > 0.0) == (s2 > 0.0) {
        delta
    } else {
        wrap_angle(delta + PI)
    };
    Ok(RigidTransform {
        pivot: p.v(),
        angle,
        translation: p2.v() - p.v(),
    })
}

fn from_lines(
    l: &Line,
    m: &Line,
    l2: &Line,
    m2: &Line,
    tolerance: f64,
) -> Result<RigidTransform, TransformError> {
    if wrap_half_turn(l.angle_to(m) - l2.angle_to(m2)).abs() > tolerance {
        return Err(TransformError::Mismatch);
    }
    let (Some(x), Some(x2)) = (l.intersection(m), l2.intersection(m2)) else {
        return Err(TransformError::Degenerate);
    };
    // A half turn about the crossing also maps both lines onto themselves,
    // see `RigidTransform::half_turned`. This one keeps the first line's direction.
    Ok(RigidTransform {
        pivot: x.v(),
        angle: wrap_angle(l2.direction().angle() - l.direction().angle()),
        translation: x2.v() - x.v(),
    })
}

/// Moves `src` onto `dst` as directly as possible: a translation for points,
/// the smallest rotation followed by a shift along the normal for lines.
pub(crate) fn align_single(src: &Geometry, dst: &Geometry) -> Result<RigidTransform, TransformError> {
    match (src, dst) {
        (Geometry::Point(p), Geometry::Point(q)) => Ok(RigidTransform::translation(q.v() - p.v())),
        (Geometry::Line(l), Geometry::Line(l2)) => {
            let pivot = l.anchor();
            let s = l2.signed_distance(&pivot.into());
            Ok(RigidTransform {
                pivot,
                angle: parallel_rotation(l, l2),
                translation: l2.normal() * -s,
            })
        }
        _ => Err(TransformError::Mismatch),
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::FRAC_PI_3;

    use super::*;

    const TOL: f64 = 1e-9;

    fn point(x: f64, y: f64) -> Geometry {
        Geometry::Point(Point::new(x, y))
    }

    fn line_through(x0: f64, y0: f64, x1: f64, y1: f64) -> Geometry {
        Geometry::Line(Line::through(Point::new(x0, y0), Point::new(x1, y1)).unwrap())
    }

    fn moved(g: &Geometry) -> Geometry {
        let t = RigidTransform {
            pivot: V::new(1.0, -2.0),
            angle: 2.0,
            translation: V::new(-3.0, 0.5),
        };
        g.transformed(&t)
    }

    #[test]
    fn recovers_transform_from_each_kind_of_pair() {
        struct Test {
            name: &'static str,
            pair: [Geometry; 2],
            witness: Geometry,
        }
        let tests = vec![
            Test {
                name: "point-point",
                pair: [point(0.0, 0.0), point(3.0, 1.0)],
                witness: point(-1.0, 4.0),
            },
            Test {
                name: "point-line off the line",
                pair: [point(0.5, 2.0), line_through(0.0, 0.0, 4.0, 1.0)],
                witness: point(5.0, 5.0),
            },
            Test {
                name: "line-point",
                pair: [line_through(0.0, 0.0, 4.0, 1.0), point(0.5, -2.0)],
                witness: line_through(1.0, 1.0, 2.0, 3.0),
            },
            Test {
                name: "line-line",
                pair: [
                    line_through(0.0, 0.0, 1.0, 0.0),
                    line_through(2.0, 0.0, 3.0, 1.0),
                ],
                witness: point(7.0, -1.0),
            },
        ];
        for test in tests {
            let dst = [moved(&test.pair[0]), moved(&test.pair[1])];
            let t = from_pairs(test.pair, dst, TOL)
                .unwrap_or_else(|e| panic!("{}: {e}", test.name));
            assert!(
                test.witness.transformed(&t).is_close(&moved(&test.witness), 1e-9),
                "{}: witness landed in the wrong place",
                test.name
            );
        }
    }

    #[test]
    fn incongruent_pairs_are_rejected() {
        let src = [point(0.0, 0.0), point(3.0, 0.0)];
        let dst = [point(0.0, 0.0), point(4.0, 0.0)];
        assert_eq!(from_pairs(src, dst, TOL), Err(TransformError::Mismatch));

        let src = [point(0.0, 1.0), line_through(0.0, 0.0, 1.0, 0.0)];
        let dst = [point(0.0, 2.0), line_through(0.0, 0.0, 1.0, 0.0)];
        assert_eq!(from_pairs(src, dst, TOL), Err(TransformError::Mismatch));

        // Mirror images can't be reached by rotating.
        let x_axis = line_through(0.0, 0.0, 1.0, 0.0);
        let up = line_through(0.0, 0.0, 1.0, 2.0);
        let down = line_through(0.0, 0.0, 1.0, -2.0);
        assert_eq!(
            from_pairs([x_axis, up], [x_axis, down], TOL),
            Err(TransformError::Mismatch)
        );
    }

    #[test]
    fn parallel_lines_do_not_pin_a_transform() {
        let a = line_through(0.0, 0.0, 1.0, 0.0);
        let b = line_through(0.0, 1.0, 1.0, 1.0);
        assert_eq!(
            from_pairs([a, b], [a, b], TOL),
            Err(TransformError::Degenerate)
        );
    }

    #[test]
    fn point_on_line_takes_the_smallest_turn() {
        let src = [point(1.0, 0.0), line_through(0.0, 0.0, 1.0, 0.0)];
        // Same line, normal pointing the other way.
        let dst = [point(1.0, 0.0), line_through(1.0, 0.0, 0.0, 0.0)];
        let t = from_pairs(src, dst, TOL).unwrap();
        let p = t.apply_point(V::new(5.0, 3.0));
        assert!((p.x - 5.0).abs() < 1e-9 && (p.y - 3.0).abs() < 1e-9);
    }

    #[test]
    fn align_line_rotates_minimally() {
        let src = line_through(0.0, 1.0, 1.0, 1.0);
        let dst = Geometry::Line(
            Line::through(Point::new(0.0, 0.0), Point::from(V::unit(FRAC_PI_3))).unwrap(),
        );
        let t = align_single(&src, &dst).unwrap();
        assert!(src.transformed(&t).is_close(&dst, 1e-9));
        assert!((t.angle - FRAC_PI_3).abs() < 1e-9);
    }

    #[test]
    fn half_turn_keeps_crossing_lines_in_place() {
        let pair = [line_through(0.0, 0.0, 2.0, 1.0), line_through(1.0, 3.0, 1.0, -1.0)];
        let t = from_pairs(pair, pair.map(|g| moved(&g)), TOL).unwrap();
        let turned = t.half_turned();
        for g in pair {
            assert!(g.transformed(&t).is_close(&g.transformed(&turned), TOL));
        }
        let witness = point(4.0, 4.0);
        assert!(!witness.transformed(&t).is_close(&witness.transformed(&turned), TOL));
    }
}
