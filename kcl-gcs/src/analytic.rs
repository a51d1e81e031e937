//! Closed-form placement of one point or line from two relations to geometry that's already placed.
//!
//! Every routine takes a `prior`, the element's current position, and returns
//! whichever solution lies closest to it. Results are new values; nothing is mutated.
use crate::{
    EPSILON, SolveState,
    constraint::ConstraintKind,
    element::{Geometry, Line, Point, minimal_rotation},
    vector::V,
};

/// Why no closed-form placement exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(not(feature = "unstable-exhaustive"), non_exhaustive)]
pub enum AnalyticError {
    /// The circles are too far apart, or one lies inside the other.
    #[error("The two circles do not intersect")]
    CirclesDisjoint,
    /// No point is both on the circle and at the requested distance from the line.
    #[error("The circle does not reach the line")]
    CircleMissesLine,
    /// Parallel lines have no (unique) intersection.
    #[error("The lines are parallel")]
    ParallelLines,
    /// The circles admit no common tangent.
    #[error("The circles have no common tangent")]
    NoTangent,
    /// This pair of relations can't place this kind of element.
    #[error("These two relations cannot place a {0}")]
    Unsupported(&'static str),
}

impl From<AnalyticError> for SolveState {
    fn from(_: AnalyticError) -> Self {
        SolveState::NonConvergent
    }
}

/// One relation between the element being placed and an element that's already placed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Relation {
    /// What's measured.
    pub kind: ConstraintKind,
    /// Target distance or angle.
    pub value: f64,
    /// The already placed element.
    pub known: Geometry,
}

fn nearest(candidates: impl IntoIterator<Item = V>, prior: V) -> Option<V> {
    candidates.into_iter().min_by(|a, b| {
        a.euclidean_distance(prior)
            .total_cmp(&b.euclidean_distance(prior))
    })
}

/// Intersects the circles `(c1, r1)` and `(c2, r2)`.
pub fn point_from_points(
    c1: Point,
    r1: f64,
    c2: Point,
    r2: f64,
    prior: Point,
    tolerance: f64,
) -> Result<Point, AnalyticError> {
    let (c1, c2, prior) = (c1.v(), c2.v(), prior.v());
    let d = c1.euclidean_distance(c2);
    if d > r1 + r2 + tolerance || d < (r1 - r2).abs() - tolerance {
        return Err(AnalyticError::CirclesDisjoint);
    }
    if d < EPSILON {
        // Concentric. Only coincident circles meet, and then anywhere on them.
        if (r1 - r2).abs() > tolerance {
            return Err(AnalyticError::CirclesDisjoint);
        }
        let dir = (prior - c1).normalized().unwrap_or(V::new(1.0, 0.0));
        return Ok((c1 + dir * r1).into());
    }
    let u = (c2 - c1) * (1.0 / d);
    let a = (r1 * r1 - r2 * r2 + d * d) / (2.0 * d);
    let h = (r1 * r1 - a * a).max(0.0).sqrt();
    let base = c1 + u * a;
    if h <= tolerance {
        return Ok(base.into());
    }
    let offset = u.perp() * h;
    let chosen = nearest([base + offset, base - offset], prior).unwrap_or(base);
    Ok(chosen.into())
}

/// Points on the circle `(center, r)` whose distance to `line` is `d`.
pub fn point_from_point_line(
    center: Point,
    r: f64,
    line: &Line,
    d: f64,
    prior: Point,
    tolerance: f64,
) -> Result<Point, AnalyticError> {
    let (n, dir) = (line.normal(), line.direction());
    let offsets: &[f64] = if d <= tolerance { &[0.0] } else { &[d, -d] };
    let mut candidates = Vec::with_capacity(4);
    for &offset in offsets {
        // Distance from the circle's center to the parallel at this offset.
        let h = line.signed_distance(&center) - offset;
        if h.abs() > r + tolerance {
            continue;
        }
        let foot = center.v() - n * h;
        let t = (r * r - h * h).max(0.0).sqrt();
        if t <= tolerance {
            candidates.push(foot);
        } else {
            candidates.push(foot + dir * t);
            candidates.push(foot - dir * t);
        }
    }
    nearest(candidates, prior.v())
        .map(Point::from)
        .ok_or(AnalyticError::CircleMissesLine)
}

/// Points at distance `d1` from `l1` and `d2` from `l2`.
pub fn point_from_lines(
    l1: &Line,
    d1: f64,
    l2: &Line,
    d2: f64,
    prior: Point,
) -> Result<Point, AnalyticError> {
    if l1.is_parallel_to(l2) {
        return Err(AnalyticError::ParallelLines);
    }
    let mut candidates = Vec::with_capacity(4);
    for s1 in [d1, -d1] {
        for s2 in [d2, -d2] {
            if let Some(p) = l1.translated(l1.normal() * s1).intersection(&l2.translated(l2.normal() * s2)) {
                candidates.push(p.v());
            }
        }
    }
    nearest(candidates, prior.v())
        .map(Point::from)
        .ok_or(AnalyticError::ParallelLines)
}

/// Lines tangent to both circles `(c1, r1)` and `(c2, r2)`.
///
/// Candidates are compared to `prior` by the average of their normal-angle
/// difference and the difference in distance from the origin, after flipping
/// each candidate's normal to agree with the prior's.
pub fn line_from_points(
    c1: Point,
    r1: f64,
    c2: Point,
    r2: f64,
    prior: &Line,
    tolerance: f64,
) -> Result<Line, AnalyticError> {
    let delta = c2.v() - c1.v();
    let len = delta.magnitude();
    if len < EPSILON {
        if (r1 - r2).abs() > tolerance {
            return Err(AnalyticError::NoTangent);
        }
        // Concentric and equal: tangent anywhere, so keep the prior's direction.
        let n = prior.normal();
        let offset = if prior.signed_distance(&c1) >= 0.0 { r1 } else { -r1 };
        return Ok(Line::from_normal(n, c1.v() - n * offset));
    }
    let alpha = delta.angle();
    let mut candidates = Vec::with_capacity(4);
    // With s1 = n·c1 + c = r1, the tangent's normal satisfies n·delta = s2 - r1.
    for s2 in [r2, -r2] {
        let k = s2 - r1;
        if k.abs() > len + tolerance {
            continue;
        }
        let spread = libm::acos((k / len).clamp(-1.0, 1.0));
        for beta in [alpha + spread, alpha - spread] {
            let n = V::unit(beta);
            let c = r1 - n.dot(&c1.v());
            candidates.push(Line::from_normal(n, n * -c));
        }
    }
    let prior_normal = prior.normal();
    candidates
        .into_iter()
        .map(|line| {
            if line.normal().dot(&prior_normal) < 0.0 {
                line.flipped()
            } else {
                line
            }
        })
        .min_by(|a, b| tangent_score(a, prior).total_cmp(&tangent_score(b, prior)))
        .ok_or(AnalyticError::NoTangent)
}

fn tangent_score(candidate: &Line, prior: &Line) -> f64 {
    let cos = candidate.normal().dot(&prior.normal()).clamp(-1.0, 1.0);
    (libm::acos(cos) + (candidate.c() - prior.c()).abs()) / 2.0
}

/// A line at angle `theta` to `reference` and at distance `d` from `p`.
///
/// The prior is turned by the smallest rotation that meets the angle,
/// then shifted along its normal to whichever offset from `p` is closer.
pub fn line_from_point_line(
    reference: &Line,
    theta: f64,
    p: Point,
    d: f64,
    prior: &Line,
) -> Line {
    let turn = minimal_rotation(reference.angle_to(prior), theta);
    let rotated = prior.rotated_about(prior.foot_of(&p).v(), turn);
    let n = rotated.normal();
    let c = [d, -d]
        .into_iter()
        .map(|offset| offset - n.dot(&p.v()))
        .min_by(|a, b| (a - rotated.c()).abs().total_cmp(&(b - rotated.c()).abs()))
        .unwrap_or(rotated.c());
    Line::from_normal(n, n * -c)
}

/// Places `target` so that both relations hold, choosing the solution nearest its current position.
pub fn solve_element(
    target: &Geometry,
    relations: [Relation; 2],
    tolerance: f64,
) -> Result<Geometry, AnalyticError> {
    use ConstraintKind::{Angle, Distance};
    use Geometry as G;
    let [r0, r1] = relations;
    match target {
        G::Point(prior) => match ((r0.kind, r0.known), (r1.kind, r1.known)) {
            ((Distance, G::Point(c1)), (Distance, G::Point(c2))) => {
                point_from_points(c1, r0.value, c2, r1.value, *prior, tolerance).map(G::Point)
            }
            ((Distance, G::Point(c)), (Distance, G::Line(l))) => {
                point_from_point_line(c, r0.value, &l, r1.value, *prior, tolerance).map(G::Point)
            }
            ((Distance, G::Line(l)), (Distance, G::Point(c))) => {
                point_from_point_line(c, r1.value, &l, r0.value, *prior, tolerance).map(G::Point)
            }
            ((Distance, G::Line(l1)), (Distance, G::Line(l2))) => {
                point_from_lines(&l1, r0.value, &l2, r1.value, *prior).map(G::Point)
            }
            _ => Err(AnalyticError::Unsupported("point")),
        },
        G::Line(prior) => match ((r0.kind, r0.known), (r1.kind, r1.known)) {
            ((Distance, G::Point(c1)), (Distance, G::Point(c2))) => {
                line_from_points(c1, r0.value, c2, r1.value, prior, tolerance).map(G::Line)
            }
            ((Angle, G::Line(reference)), (Distance, G::Point(p))) => Ok(G::Line(
                line_from_point_line(&reference, r0.value, p, r1.value, prior),
            )),
            ((Distance, G::Point(p)), (Angle, G::Line(reference))) => Ok(G::Line(
                line_from_point_line(&reference, r1.value, p, r0.value, prior),
            )),
            _ => Err(AnalyticError::Unsupported("line")),
        },
    }
}

/// Whether [`solve_element`] can place an element of this shape from relations of these kinds.
pub(crate) fn can_place(target: &Geometry, kinds: [ConstraintKind; 2]) -> bool {
    match target {
        Geometry::Point(_) => kinds == [ConstraintKind::Distance; 2],
        Geometry::Line(_) => kinds != [ConstraintKind::Angle; 2],
    }
}
