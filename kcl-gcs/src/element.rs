//! Points and lines, the two kinds of geometry a sketch is made of.
use std::f64::consts::PI;

use crate::{ElementId, EPSILON, transform::RigidTransform, vector::V};

/// A point in the plane.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
}

impl Point {
    /// A point at (x, y).
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Distance between the two points.
    pub fn distance_to(&self, other: &Point) -> f64 {
        self.v().euclidean_distance(other.v())
    }

    pub(crate) fn v(self) -> V {
        V::new(self.x, self.y)
    }
}

impl From<V> for Point {
    fn from(v: V) -> Self {
        Self { x: v.x, y: v.y }
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// An infinite line `a·x + b·y + c = 0`, stored with `a² + b² = 1`.
///
/// The unit normal is `(a, b)` and the direction is `(b, -a)`.
/// Both matter: the sign of [`Line::signed_distance`] depends on the normal,
/// and [`Line::angle_to`] measures between directions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Line {
    a: f64,
    b: f64,
    c: f64,
}

impl Line {
    /// Normalizes the coefficients so that `a² + b² = 1`.
    /// Returns `None` if `a` and `b` are both (nearly) zero.
    pub fn new(a: f64, b: f64, c: f64) -> Option<Self> {
        let len = libm::hypot(a, b);
        if !len.is_finite() || len <= EPSILON || !c.is_finite() {
            return None;
        }
        Some(Self {
            a: a / len,
            b: b / len,
            c: c / len,
        })
    }

    /// The line through both points, directed from `p` to `q`.
    pub fn through(p: Point, q: Point) -> Option<Self> {
        let dir = (q.v() - p.v()).normalized()?;
        Some(Self::from_normal(dir.perp(), p.v()))
    }

    /// Line with the given unit normal, passing through `on`.
    pub(crate) fn from_normal(normal: V, on: V) -> Self {
        Self {
            a: normal.x,
            b: normal.y,
            c: -normal.dot(&on),
        }
    }

    /// Coefficient of x.
    pub fn a(&self) -> f64 {
        self.a
    }

    /// Coefficient of y.
    pub fn b(&self) -> f64 {
        self.b
    }

    /// Constant term.
    pub fn c(&self) -> f64 {
        self.c
    }

    pub(crate) fn normal(&self) -> V {
        V::new(self.a, self.b)
    }

    pub(crate) fn direction(&self) -> V {
        V::new(self.b, -self.a)
    }

    /// Positive on the side the normal points to.
    pub fn signed_distance(&self, p: &Point) -> f64 {
        self.a * p.x + self.b * p.y + self.c
    }

    /// Unsigned distance from the point to this line.
    pub fn distance(&self, p: &Point) -> f64 {
        self.signed_distance(p).abs()
    }

    /// Signed angle from this line's direction to `other`'s, in (-π, π].
    pub fn angle_to(&self, other: &Line) -> f64 {
        let (d0, d1) = (self.direction(), other.direction());
        libm::atan2(d0.cross_2d(&d1), d0.dot(&d1))
    }

    /// Where the two lines cross, if they aren't parallel.
    pub fn intersection(&self, other: &Line) -> Option<Point> {
        let det = self.a * other.b - other.a * self.b;
        if det.abs() < EPSILON {
            return None;
        }
        let x = (self.b * other.c - other.b * self.c) / det;
        let y = (other.a * self.c - self.a * other.c) / det;
        Some(Point { x, y })
    }

    /// Closest point on the line to `p`.
    pub fn foot_of(&self, p: &Point) -> Point {
        (p.v() - self.normal() * self.signed_distance(p)).into()
    }

    /// Closest point on the line to the origin.
    pub(crate) fn anchor(&self) -> V {
        self.normal() * -self.c
    }

    pub(crate) fn translated(&self, t: V) -> Self {
        Self {
            c: self.c - self.normal().dot(&t),
            ..*self
        }
    }

    pub(crate) fn rotated_about(&self, pivot: V, angle: f64) -> Self {
        let normal = self.normal().rotate(angle);
        let on = self.anchor().rotate_about(pivot, angle);
        Self::from_normal(normal, on)
    }

    /// Same line with the normal pointing the other way.
    pub(crate) fn flipped(&self) -> Self {
        Self {
            a: -self.a,
            b: -self.b,
            c: -self.c,
        }
    }

    pub(crate) fn is_parallel_to(&self, other: &Line) -> bool {
        self.normal().cross_2d(&other.normal()).abs() < EPSILON
    }
}

impl std::fmt::Display for Line {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.a, self.b, self.c)
    }
}

/// Shape of an element.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Geometry {
    /// A point.
    Point(Point),
    /// An infinite line.
    Line(Line),
}

impl Geometry {
    /// "point" or "line".
    pub fn kind_name(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "point",
            Geometry::Line(_) => "line",
        }
    }

    pub(crate) fn transformed(&self, t: &RigidTransform) -> Self {
        match self {
            Geometry::Point(p) => Geometry::Point(t.apply_point(p.v()).into()),
            Geometry::Line(l) => Geometry::Line(t.apply_line(l)),
        }
    }

    /// Whether the two geometries describe the same point or line.
    /// Lines compare equal regardless of which way their normals point.
    pub(crate) fn is_close(&self, other: &Geometry, tolerance: f64) -> bool {
        match (self, other) {
            (Geometry::Point(p), Geometry::Point(q)) => p.distance_to(q) <= tolerance,
            (Geometry::Line(l), Geometry::Line(m)) => {
                let m = if l.normal().dot(&m.normal()) < 0.0 {
                    m.flipped()
                } else {
                    *m
                };
                (l.a - m.a).abs() <= tolerance
                    && (l.b - m.b).abs() <= tolerance
                    && (l.c - m.c).abs() <= tolerance
            }
            _ => false,
        }
    }

    /// A point the geometry passes through, used as a pivot.
    pub(crate) fn reference_point(&self) -> V {
        match self {
            Geometry::Point(p) => p.v(),
            Geometry::Line(l) => l.anchor(),
        }
    }
}

impl From<Point> for Geometry {
    fn from(p: Point) -> Self {
        Geometry::Point(p)
    }
}

impl From<Line> for Geometry {
    fn from(l: Line) -> Self {
        Geometry::Line(l)
    }
}

/// How much of an element's freedom its constraints take away.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConstraintLevel {
    /// Not yet part of any rigid cluster.
    #[default]
    UnderConstrained,
    /// Placed by a rigid cluster.
    FullyConstrained,
    /// More constraints reach this element than it has freedom for.
    OverConstrained,
}

/// A point or line stored in a [`crate::ConstraintGraph`].
#[derive(Clone, Debug, PartialEq)]
pub struct Element {
    pub(crate) id: ElementId,
    pub(crate) geometry: Geometry,
    pub(crate) fixed: bool,
    pub(crate) level: ConstraintLevel,
}

impl Element {
    pub(crate) fn new(id: ElementId, geometry: Geometry, fixed: bool) -> Self {
        Self {
            id,
            geometry,
            fixed,
            level: ConstraintLevel::default(),
        }
    }

    /// This element's ID.
    pub fn id(&self) -> ElementId {
        self.id
    }

    /// Current shape.
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Fixed elements never move.
    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    /// Set by decomposition.
    pub fn level(&self) -> ConstraintLevel {
        self.level
    }

    /// The point, if this is one.
    pub fn as_point(&self) -> Option<Point> {
        match self.geometry {
            Geometry::Point(p) => Some(p),
            Geometry::Line(_) => None,
        }
    }

    /// The line, if this is one.
    pub fn as_line(&self) -> Option<Line> {
        match self.geometry {
            Geometry::Line(l) => Some(l),
            Geometry::Point(_) => None,
        }
    }
}

/// Wraps an angle difference into (-π, π].
pub(crate) fn wrap_angle(delta: f64) -> f64 {
    let (sin, cos) = libm::sincos(delta);
    libm::atan2(sin, cos)
}

/// Wraps an angle difference into (-π/2, π/2], so that angles half a turn apart compare equal.
pub(crate) fn wrap_half_turn(delta: f64) -> f64 {
    let wrapped = wrap_angle(delta);
    if wrapped > PI / 2.0 {
        wrapped - PI
    } else if wrapped <= -PI / 2.0 {
        wrapped + PI
    } else {
        wrapped
    }
}

/// The four signed angles that all satisfy an unsigned angle constraint of `target`.
pub(crate) fn angle_candidates(target: f64) -> [f64; 4] {
    [target, -target, target + PI, PI - target]
}

/// How far `actual` is from satisfying an angle constraint of `target`.
pub(crate) fn angle_error(actual: f64, target: f64) -> f64 {
    wrap_half_turn(actual - target)
        .abs()
        .min(wrap_half_turn(actual + target).abs())
}

/// Smallest rotation that moves a signed angle of `current` onto one of the candidates for `target`.
pub(crate) fn minimal_rotation(current: f64, target: f64) -> f64 {
    angle_candidates(target)
        .into_iter()
        .map(|candidate| wrap_angle(candidate - current))
        .min_by(|a, b| a.abs().total_cmp(&b.abs()))
        .unwrap_or(0.0)
}
