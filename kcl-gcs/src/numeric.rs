//! Numeric fallback for clusters that no closed-form merge could join.
//!
//! Every element that links clusters becomes a set of unknowns. Each cluster
//! contributes equations that keep its linking elements in the same relative
//! position, and every free constraint contributes its own equation. The
//! system is solved with damped least squares, then each cluster is moved
//! rigidly onto the result.
use faer::{Mat, prelude::Solve};
use indexmap::{IndexMap, IndexSet};
use tracing::{debug, trace};

use crate::{
    ClusterId, ConstraintGraph, ElementId, NumericError, SolveState,
    constraint::{self, ConstraintKind},
    element::{Geometry, Line, Point, wrap_half_turn},
    transform::{self, RigidTransform},
    vector::V,
};

/// Where an element's coordinates live while optimizing.
#[derive(Clone, Copy, Debug)]
enum Unknown {
    /// `x[i]`, `x[i + 1]`.
    Point(usize),
    /// A line through `x[i..i + 2]` and `x[i + 2..i + 4]`.
    Segment(usize),
    /// Never moves.
    Fixed(Geometry),
}

/// The line's geometry as the optimizer sees it.
#[derive(Clone, Copy, Debug)]
enum LineValue {
    Fixed(Line),
    Segment { offset: usize, start: V, end: V },
}

impl LineValue {
    fn direction(&self) -> V {
        match self {
            LineValue::Fixed(l) => l.direction(),
            LineValue::Segment { start, end, .. } => *end - *start,
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Equation {
    /// Distance between two points, or from a point to a line.
    Distance { a: usize, b: usize, value: f64 },
    /// Both coordinates of two points agree.
    Coincident { a: usize, b: usize },
    /// The signed angle from line `a` to line `b`.
    Angle { a: usize, b: usize, target: f64 },
    /// Keeps a segment from collapsing or growing without bound.
    SegmentLength { segment: usize },
}

/// A nonlinear system over the linking elements.
#[derive(Debug)]
pub(crate) struct NumericSystem {
    elements: Vec<ElementId>,
    unknowns: Vec<Unknown>,
    equations: Vec<Equation>,
    initial: Vec<f64>,
}

/// One row of the Jacobian, as (column, partial derivative) pairs.
type Row = Vec<(usize, f64)>;

impl NumericSystem {
    fn new() -> Self {
        Self {
            elements: Vec::new(),
            unknowns: Vec::new(),
            equations: Vec::new(),
            initial: Vec::new(),
        }
    }

    fn add_element(&mut self, id: ElementId, geometry: Geometry, fixed: bool) -> usize {
        let unknown = match geometry {
            _ if fixed => Unknown::Fixed(geometry),
            Geometry::Point(p) => {
                let offset = self.initial.len();
                self.initial.extend([p.x, p.y]);
                Unknown::Point(offset)
            }
            Geometry::Line(l) => {
                let offset = self.initial.len();
                let start = l.anchor();
                let end = start + l.direction();
                self.initial.extend([start.x, start.y, end.x, end.y]);
                Unknown::Segment(offset)
            }
        };
        self.elements.push(id);
        self.unknowns.push(unknown);
        if let Unknown::Segment(_) = unknown {
            self.equations.push(Equation::SegmentLength {
                segment: self.unknowns.len() - 1,
            });
        }
        self.unknowns.len() - 1
    }

    fn num_variables(&self) -> usize {
        self.initial.len()
    }

    fn point(&self, index: usize, x: &[f64]) -> Option<(V, Option<usize>)> {
        match self.unknowns[index] {
            Unknown::Point(o) => Some((V::new(x[o], x[o + 1]), Some(o))),
            Unknown::Fixed(Geometry::Point(p)) => Some((p.v(), None)),
            _ => None,
        }
    }

    fn line(&self, index: usize, x: &[f64]) -> Option<LineValue> {
        match self.unknowns[index] {
            Unknown::Segment(o) => Some(LineValue::Segment {
                offset: o,
                start: V::new(x[o], x[o + 1]),
                end: V::new(x[o + 2], x[o + 3]),
            }),
            Unknown::Fixed(Geometry::Line(l)) => Some(LineValue::Fixed(l)),
            _ => None,
        }
    }

    /// The geometry of an element at `x`.
    fn geometry(&self, index: usize, x: &[f64]) -> Option<Geometry> {
        match self.unknowns[index] {
            Unknown::Fixed(g) => Some(g),
            Unknown::Point(o) => Some(Geometry::Point(Point::new(x[o], x[o + 1]))),
            Unknown::Segment(o) => {
                Line::through(Point::new(x[o], x[o + 1]), Point::new(x[o + 2], x[o + 3])).map(Geometry::Line)
            }
        }
    }

    /// Appends the residuals and Jacobian rows for one equation.
    fn evaluate(&self, equation: &Equation, x: &[f64], residuals: &mut Vec<f64>, rows: &mut Vec<Row>) {
        match *equation {
            Equation::Coincident { a, b } => {
                let (Some((p, pa)), Some((q, qb))) = (self.point(a, x), self.point(b, x)) else {
                    return;
                };
                for axis in 0..2 {
                    let mut row = Row::new();
                    if let Some(o) = pa {
                        row.push((o + axis, 1.0));
                    }
                    if let Some(o) = qb {
                        row.push((o + axis, -1.0));
                    }
                    residuals.push(if axis == 0 { p.x - q.x } else { p.y - q.y });
                    rows.push(row);
                }
            }
            Equation::Distance { a, b, value } => {
                if let (Some((p, pa)), Some((q, qb))) = (self.point(a, x), self.point(b, x)) {
                    let delta = p - q;
                    let d = delta.magnitude();
                    let unit = delta.normalized().unwrap_or(V::new(1.0, 0.0));
                    let mut row = Row::new();
                    if let Some(o) = pa {
                        row.extend([(o, unit.x), (o + 1, unit.y)]);
                    }
                    if let Some(o) = qb {
                        row.extend([(o, -unit.x), (o + 1, -unit.y)]);
                    }
                    residuals.push(d - value);
                    rows.push(row);
                    return;
                }
                let (point, line) = if self.point(a, x).is_some() { (a, b) } else { (b, a) };
                let (Some((p, po)), Some(l)) = (self.point(point, x), self.line(line, x)) else {
                    return;
                };
                let (s, row) = signed_distance(p, po, &l);
                let side = if s >= 0.0 { 1.0 } else { -1.0 };
                if value == 0.0 {
                    residuals.push(s);
                } else {
                    residuals.push(s - side * value);
                }
                rows.push(row);
            }
            Equation::Angle { a, b, target } => {
                let (Some(l0), Some(l1)) = (self.line(a, x), self.line(b, x)) else {
                    return;
                };
                let (d0, d1) = (l0.direction(), l1.direction());
                let actual = libm::atan2(d0.cross_2d(&d1), d0.dot(&d1));
                let mut row = Row::new();
                // The signed angle grows as the second line turns counterclockwise.
                for (line, sign) in [(l0, -1.0), (l1, 1.0)] {
                    if let LineValue::Segment { offset, start, end } = line {
                        let u = end - start;
                        let len_sq = u.magnitude_squared();
                        let (gx, gy) = (-u.y / len_sq * sign, u.x / len_sq * sign);
                        row.extend([(offset, -gx), (offset + 1, -gy), (offset + 2, gx), (offset + 3, gy)]);
                    }
                }
                residuals.push(wrap_half_turn(actual - target));
                rows.push(row);
            }
            Equation::SegmentLength { segment } => {
                let Some(LineValue::Segment { offset, start, end }) = self.line(segment, x) else {
                    return;
                };
                let u = end - start;
                let len = u.magnitude();
                let unit = u.normalized().unwrap_or(V::new(1.0, 0.0));
                residuals.push(len - 1.0);
                rows.push(vec![
                    (offset, -unit.x),
                    (offset + 1, -unit.y),
                    (offset + 2, unit.x),
                    (offset + 3, unit.y),
                ]);
            }
        }
    }

    fn residuals_and_jacobian(&self, x: &[f64]) -> (Vec<f64>, Vec<Row>) {
        let mut residuals = Vec::with_capacity(self.equations.len());
        let mut rows = Vec::with_capacity(self.equations.len());
        for equation in &self.equations {
            self.evaluate(equation, x, &mut residuals, &mut rows);
        }
        (residuals, rows)
    }

    fn cost(&self, x: &[f64]) -> f64 {
        let (residuals, _) = self.residuals_and_jacobian(x);
        residuals.iter().map(|r| r * r).sum::<f64>() / 2.0
    }

    /// Minimizes the squared residuals with Levenberg-Marquardt.
    pub(crate) fn solve(&self, config: &crate::Config) -> Result<Vec<f64>, NumericError> {
        let n = self.num_variables();
        let mut x = self.initial.clone();
        if n == 0 {
            let (residuals, _) = self.residuals_and_jacobian(&x);
            let worst = largest(&residuals);
            return if worst <= config.numeric_tolerance {
                Ok(x)
            } else {
                Err(NumericError::DidNotConverge {
                    iterations: 0,
                    residual: worst,
                })
            };
        }
        if self.equations.is_empty() {
            return Err(NumericError::EmptySystem);
        }

        let mut damping = config.initial_damping;
        let mut worst = f64::INFINITY;
        for iteration in 0..config.max_iterations {
            let (residuals, rows) = self.residuals_and_jacobian(&x);
            worst = largest(&residuals);
            if worst <= config.numeric_tolerance {
                debug!(iterations = iteration, "Numeric solve converged");
                return Ok(x);
            }
            let cost = residuals.iter().map(|r| r * r).sum::<f64>() / 2.0;

            // (JᵀJ + λI) d = -Jᵀr
            let mut jtj = vec![0.0; n * n];
            let mut jtr = vec![0.0; n];
            for (row, r) in rows.iter().zip(&residuals) {
                for &(i, di) in row {
                    jtr[i] += di * r;
                    for &(j, dj) in row {
                        jtj[i * n + j] += di * dj;
                    }
                }
            }
            let rhs = Mat::from_fn(n, 1, |i, _| -jtr[i]);

            let mut accepted = false;
            while damping <= MAX_DAMPING {
                let a = Mat::from_fn(n, n, |i, j| jtj[i * n + j] + if i == j { damping } else { 0.0 });
                let solution = a.full_piv_lu().solve(rhs.as_ref());
                let d: Vec<f64> = (0..n).map(|i| solution[(i, 0)]).collect();
                if d.iter().any(|v| !v.is_finite()) {
                    return Err(NumericError::Singular);
                }
                let candidate: Vec<f64> = x.iter().zip(d.iter()).map(|(xi, di)| xi + di).collect();
                let new_cost = self.cost(&candidate);
                if new_cost < cost {
                    let step = d.iter().map(|v| v.abs()).fold(0.0, libm::fmax);
                    let scale = x.iter().map(|v| v.abs()).fold(0.0, libm::fmax);
                    x = candidate;
                    damping = (damping / 10.0).max(MIN_DAMPING);
                    accepted = true;
                    trace!(iteration, cost = new_cost, damping, "Accepted step");
                    if step <= config.step_tolerance * (scale + config.step_tolerance) {
                        let (residuals, _) = self.residuals_and_jacobian(&x);
                        worst = largest(&residuals);
                        return if worst <= config.numeric_tolerance {
                            Ok(x)
                        } else {
                            Err(NumericError::DidNotConverge {
                                iterations: iteration + 1,
                                residual: worst,
                            })
                        };
                    }
                    break;
                }
                damping *= 10.0;
            }
            if !accepted {
                // No step reduces the cost: a local minimum that isn't a solution.
                return Err(NumericError::DidNotConverge {
                    iterations: iteration + 1,
                    residual: worst,
                });
            }
        }
        let (residuals, _) = self.residuals_and_jacobian(&x);
        let last = largest(&residuals);
        if last <= config.numeric_tolerance {
            return Ok(x);
        }
        Err(NumericError::DidNotConverge {
            iterations: config.max_iterations,
            residual: last.min(worst),
        })
    }
}

const MIN_DAMPING: f64 = 1e-12;
const MAX_DAMPING: f64 = 1e12;

fn largest(residuals: &[f64]) -> f64 {
    residuals.iter().map(|r| r.abs()).fold(0.0, libm::fmax)
}

/// Signed distance from the point to the line, and its partial derivatives.
fn signed_distance(p: V, point_offset: Option<usize>, line: &LineValue) -> (f64, Row) {
    let mut row = Row::new();
    match line {
        LineValue::Fixed(l) => {
            let n = l.normal();
            if let Some(o) = point_offset {
                row.extend([(o, n.x), (o + 1, n.y)]);
            }
            (n.dot(&p) + l.c(), row)
        }
        LineValue::Segment { offset, start, end } => {
            let u = *end - *start;
            let w = p - *start;
            let len = u.magnitude().max(crate::EPSILON);
            let cross = u.cross_2d(&w);
            let s = cross / len;
            let unit = u * (1.0 / len);
            // ds = dC / L - s · dL / L
            let partial = |d_cross: f64, d_len: f64| d_cross / len - s * d_len / len;
            let o = *offset;
            row.extend([
                (o, partial(u.y - w.y, -unit.x)),
                (o + 1, partial(w.x - u.x, -unit.y)),
                (o + 2, partial(w.y, unit.x)),
                (o + 3, partial(-w.x, unit.y)),
            ]);
            if let Some(po) = point_offset {
                row.extend([(po, partial(-u.y, 0.0)), (po + 1, partial(u.x, 0.0))]);
            }
            (s, row)
        }
    }
}

impl ConstraintGraph {
    /// Joins the remaining clusters numerically.
    pub(crate) fn solve_numerically(&mut self) -> SolveState {
        let Some((system, members)) = self.numeric_system() else {
            return SolveState::NonConvergent;
        };
        debug!(
            variables = system.num_variables(),
            equations = system.equations.len(),
            clusters = members.len(),
            "Solving remaining clusters numerically"
        );
        let solution = match system.solve(self.config()) {
            Ok(solution) => solution,
            Err(e) => {
                debug!(error = %e, "Numeric solve failed");
                return SolveState::NonConvergent;
            }
        };
        let solved: IndexMap<ElementId, Geometry> = system
            .elements
            .iter()
            .enumerate()
            .filter_map(|(i, id)| Some((*id, system.geometry(i, &solution)?)))
            .collect();
        self.fold_back(&members, &solved)
    }

    /// Builds the system, along with each cluster's linking elements.
    /// `None` if some cluster has too few linking elements to be placed.
    fn numeric_system(&self) -> Option<(NumericSystem, IndexMap<ClusterId, Vec<ElementId>>)> {
        let mut linking: IndexSet<ElementId> = IndexSet::new();
        for element in self.elements.iter() {
            if self.elements.owners(element.id).len() > 1 {
                linking.insert(element.id);
            }
        }
        for c in &self.free {
            if let Some(c) = self.constraints.get(*c) {
                linking.extend(c.elements);
            }
        }
        for cluster in &self.clusters {
            for e in cluster.elements() {
                if self.elements.get(e).is_some_and(|el| el.fixed) {
                    linking.insert(e);
                }
            }
        }

        let mut members: IndexMap<ClusterId, Vec<ElementId>> = IndexMap::new();
        for cluster in &self.clusters {
            let inside: Vec<ElementId> = cluster.elements().filter(|e| linking.contains(e)).collect();
            if inside.len() < 2 {
                debug!(cluster = %cluster.id, "Cluster has too few links to place numerically");
                return None;
            }
            members.insert(cluster.id, inside);
        }

        let mut system = NumericSystem::new();
        let mut index: IndexMap<ElementId, usize> = IndexMap::new();
        let mut starts: IndexMap<ElementId, Geometry> = IndexMap::new();
        for &id in &linking {
            let element = self.elements.get(id)?;
            let start = match self.elements.owners(id).first() {
                Some(&owner) => self.elements.view(owner, id)?.geometry,
                None => element.geometry,
            };
            index.insert(id, system.add_element(id, start, element.fixed));
            starts.insert(id, start);
        }

        for (&cluster, inside) in &members {
            for (k, &a) in inside.iter().enumerate() {
                for &b in &inside[k + 1..] {
                    let fixed = |e: ElementId| self.elements.get(e).is_some_and(|el| el.fixed);
                    if fixed(a) && fixed(b) {
                        continue;
                    }
                    let ga = self.elements.view(cluster, a)?.geometry;
                    let gb = self.elements.view(cluster, b)?.geometry;
                    let (kind, value) = constraint::measure(&ga, &gb);
                    system
                        .equations
                        .push(equation(kind, index[&a], index[&b], value, &ga, &gb));
                }
            }
        }
        for c in &self.free {
            let c = self.constraints.get(*c)?;
            let [a, b] = c.elements;
            let (ga, gb) = (*starts.get(&a)?, *starts.get(&b)?);
            let value = match c.kind {
                // Pick whichever sign the lines are closest to now.
                ConstraintKind::Angle => {
                    let actual = constraint::measure(&ga, &gb).1;
                    if wrap_half_turn(actual - c.value).abs() <= wrap_half_turn(actual + c.value).abs() {
                        c.value
                    } else {
                        -c.value
                    }
                }
                ConstraintKind::Distance => c.value,
            };
            system
                .equations
                .push(equation(c.kind, index[&a], index[&b], value, &ga, &gb));
        }
        Some((system, members))
    }

    /// Moves each cluster rigidly onto the optimized linking elements, then joins them all.
    fn fold_back(&mut self, members: &IndexMap<ClusterId, Vec<ElementId>>, solved: &IndexMap<ElementId, Geometry>) -> SolveState {
        let tolerance = self.config().tolerance;
        for (&cluster, inside) in members {
            let mut pairs: Vec<[ElementId; 2]> = inside
                .iter()
                .enumerate()
                .flat_map(|(k, &a)| inside[k + 1..].iter().map(move |&b| [a, b]))
                .collect();
            pairs.sort_by_key(|pair| {
                pair.iter()
                    .filter(|e| matches!(solved.get(*e), Some(Geometry::Line(_))))
                    .count()
            });
            let lands_on_solved = |t: &RigidTransform| {
                inside.iter().all(|e| {
                    match (self.elements.view(cluster, *e), solved.get(e)) {
                        (Some(local), Some(target)) => local.geometry.transformed(t).is_close(target, tolerance),
                        _ => false,
                    }
                })
            };
            let t = pairs.iter().find_map(|&[a, b]| {
                let src = [self.elements.view(cluster, a)?.geometry, self.elements.view(cluster, b)?.geometry];
                let dst = [*solved.get(&a)?, *solved.get(&b)?];
                let t = transform::from_pairs(src, dst, tolerance).ok()?;
                Some(
                    [t, t.half_turned()]
                        .into_iter()
                        .find(|t| lands_on_solved(t))
                        .unwrap_or(t),
                )
            });
            let Some(t) = t else {
                debug!(%cluster, "Optimized links do not fit the cluster's shape");
                return SolveState::NonConvergent;
            };
            if let Some(index) = self.cluster_index(cluster) {
                self.clusters[index].apply(&t, &mut self.elements);
            }
            let fits = inside.iter().all(|e| {
                match (self.elements.view(cluster, *e), solved.get(e)) {
                    (Some(local), Some(target)) => local.geometry.is_close(target, tolerance),
                    _ => false,
                }
            });
            if !fits {
                debug!(%cluster, "Cluster was mirrored or distorted by the numeric solve");
                return SolveState::NonConvergent;
            }
        }
        // Elements outside every cluster take the optimized value directly.
        for (id, geometry) in solved {
            if !self.elements.is_claimed(*id) {
                if let Some(element) = self.elements.get_mut(*id) {
                    if !element.fixed {
                        element.geometry = *geometry;
                    }
                }
            }
        }
        let ids: Vec<ClusterId> = self.clusters.iter().map(|c| c.id).collect();
        if let Some((&first, rest)) = ids.split_first() {
            let free: Vec<_> = self.free.iter().copied().collect();
            for &other in rest {
                self.absorb(first, other, &[]);
            }
            // Whatever stayed free was an equation of the system.
            for c in free {
                self.free.shift_remove(&c);
                if let Some(cluster) = self.clusters.iter_mut().find(|k| k.id == first) {
                    cluster.constraints.insert(c);
                }
            }
        }
        SolveState::Solved
    }
}

fn equation(kind: ConstraintKind, a: usize, b: usize, value: f64, ga: &Geometry, gb: &Geometry) -> Equation {
    match (kind, ga, gb) {
        (ConstraintKind::Angle, _, _) => Equation::Angle { a, b, target: value },
        (ConstraintKind::Distance, Geometry::Point(_), Geometry::Point(_)) if value == 0.0 => {
            Equation::Coincident { a, b }
        }
        (ConstraintKind::Distance, _, _) => Equation::Distance { a, b, value },
    }
}
