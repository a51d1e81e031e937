//! Joins solved clusters into bigger rigid clusters.
//!
//! Each round looks for the first applicable pattern, in this order:
//! two clusters sharing two or more elements, two clusters sharing one element
//! plus a free constraint between them, three clusters sharing one element
//! pairwise, and two clusters linked by a free angle and a free distance.
use tracing::{debug, trace, warn};

use crate::{
    ClusterId, ConstraintGraph, ConstraintId, ElementId, SolveState,
    analytic::{self, Relation},
    constraint::{self, ConstraintKind},
    element::{Geometry, minimal_rotation},
    transform::{self, RigidTransform, TransformError},
    vector::V,
};

enum MergeOutcome {
    Merged,
    Stalled,
    Failed(SolveState),
}

impl ConstraintGraph {
    /// Merges clusters until one is left or no pattern applies.
    /// Returns [`SolveState::Solved`] unless some merge found the clusters inconsistent.
    pub(crate) fn merge_clusters(&mut self) -> SolveState {
        while self.clusters.len() > 1 {
            match self.merge_once() {
                MergeOutcome::Merged => {}
                MergeOutcome::Stalled => break,
                MergeOutcome::Failed(state) => return state,
            }
        }
        SolveState::Solved
    }

    fn merge_once(&mut self) -> MergeOutcome {
        if let Some(outcome) = self.try_shared_pair() {
            return outcome;
        }
        if let Some(outcome) = self.try_shared_one() {
            return outcome;
        }
        if let Some(outcome) = self.try_triangle() {
            return outcome;
        }
        if let Some(outcome) = self.try_unshared() {
            return outcome;
        }
        trace!(clusters = self.clusters.len(), "No merge applies");
        MergeOutcome::Stalled
    }

    fn cluster_has_fixed(&self, index: usize) -> bool {
        self.clusters[index].has_fixed(&self.elements)
    }

    /// Which of two clusters stays put: one holding fixed elements, else the earlier one.
    fn anchor_order(&self, i: usize, j: usize) -> (ClusterId, ClusterId) {
        let (a, b) = (self.clusters[i].id, self.clusters[j].id);
        if self.cluster_has_fixed(j) && !self.cluster_has_fixed(i) {
            (b, a)
        } else {
            (a, b)
        }
    }

    fn geometry_in(&self, cluster: ClusterId, element: ElementId) -> Option<Geometry> {
        self.elements.view(cluster, element).map(|e| e.geometry)
    }

    fn move_cluster(&mut self, cluster: ClusterId, t: &RigidTransform) {
        if let Some(index) = self.cluster_index(cluster) {
            self.clusters[index].apply(t, &mut self.elements);
        }
    }

    /// Whether the cluster's copies of its fixed elements are where they belong.
    fn fixed_agree(&self, cluster: ClusterId) -> bool {
        let tolerance = self.config().tolerance;
        let Some(c) = self.cluster(cluster) else {
            return false;
        };
        c.elements().all(|id| match (self.elements.get(id), self.geometry_in(cluster, id)) {
            (Some(truth), Some(local)) if truth.fixed => truth.geometry.is_close(&local, tolerance),
            _ => true,
        })
    }

    fn agree(&self, element: ElementId, a: ClusterId, b: ClusterId) -> bool {
        let tolerance = self.config().tolerance;
        match (self.geometry_in(a, element), self.geometry_in(b, element)) {
            (Some(x), Some(y)) => x.is_close(&y, tolerance),
            _ => false,
        }
    }

    /// Whether moving `from` by `t` would put each of `elements` where `onto` has it.
    fn carries_onto(&self, t: &RigidTransform, from: ClusterId, onto: ClusterId, elements: &[ElementId]) -> bool {
        let tolerance = self.config().tolerance;
        elements.iter().all(|&e| {
            match (self.geometry_in(from, e), self.geometry_in(onto, e)) {
                (Some(x), Some(y)) => x.transformed(t).is_close(&y, tolerance),
                _ => false,
            }
        })
    }

    /// Whether a constraint between the two clusters holds, reading each end from its own cluster.
    fn link_holds(&self, link: ConstraintId, anchor: ClusterId, moving: ClusterId) -> bool {
        let Some(c) = self.constraints.get(link) else {
            return false;
        };
        let view = |e: ElementId| {
            let in_anchor = self.cluster(anchor).is_some_and(|k| k.contains(e));
            self.geometry_in(if in_anchor { anchor } else { moving }, e)
        };
        let [e0, e1] = c.elements;
        match (view(e0), view(e1)) {
            (Some(g0), Some(g1)) => constraint::residual(c.kind, c.value, &g0, &g1)
                .is_some_and(|r| r.abs() <= self.config().tolerance),
            _ => false,
        }
    }

    /// Free constraints with one end only in cluster `i` and the other only in cluster `j`.
    fn links_between(&self, i: usize, j: usize) -> Vec<ConstraintId> {
        let (ci, cj) = (&self.clusters[i], &self.clusters[j]);
        self.free
            .iter()
            .copied()
            .filter(|&id| {
                self.constraints.get(id).is_some_and(|c| {
                    let [a, b] = c.elements;
                    let only = |e: ElementId, k: &crate::GraphCluster, other: &crate::GraphCluster| {
                        k.contains(e) && !other.contains(e)
                    };
                    (only(a, ci, cj) && only(b, cj, ci)) || (only(a, cj, ci) && only(b, ci, cj))
                })
            })
            .collect()
    }

    fn try_shared_pair(&mut self) -> Option<MergeOutcome> {
        let n = self.clusters.len();
        for i in 0..n {
            for j in i + 1..n {
                let shared = self.clusters[i].shared_with(&self.clusters[j]);
                if shared.len() < 2 {
                    continue;
                }
                let (anchor, moving) = self.anchor_order(i, j);
                if let Some(outcome) = self.merge_shared_pair(anchor, moving, &shared) {
                    return Some(outcome);
                }
            }
        }
        None
    }

    /// `None` if no pair of shared elements pins down the motion.
    fn merge_shared_pair(&mut self, anchor: ClusterId, moving: ClusterId, shared: &[ElementId]) -> Option<MergeOutcome> {
        let tolerance = self.config().tolerance;
        let mut pairs: Vec<[ElementId; 2]> = shared
            .iter()
            .enumerate()
            .flat_map(|(k, &a)| shared[k + 1..].iter().map(move |&b| [a, b]))
            .collect();
        // Point pairs pin a transform most reliably.
        pairs.sort_by_key(|pair| {
            pair.iter()
                .filter(|e| matches!(self.geometry_in(anchor, **e), Some(Geometry::Line(_))))
                .count()
        });
        let mut mismatch = false;
        let mut found = None;
        for [a, b] in pairs {
            let (Some(sa), Some(sb), Some(da), Some(db)) = (
                self.geometry_in(moving, a),
                self.geometry_in(moving, b),
                self.geometry_in(anchor, a),
                self.geometry_in(anchor, b),
            ) else {
                continue;
            };
            match transform::from_pairs([sa, sb], [da, db], tolerance) {
                Ok(t) => {
                    found = Some(t);
                    break;
                }
                Err(TransformError::Mismatch) => mismatch = true,
                Err(TransformError::Degenerate) => {}
            }
        }
        let Some(t) = found else {
            if mismatch {
                debug!(%anchor, %moving, "Shared elements are arranged differently in each cluster");
                return Some(MergeOutcome::Failed(SolveState::OverConstrained));
            }
            return None;
        };
        // Lines alone can leave a half turn open; the other shared elements settle it.
        let t = [t, t.half_turned()]
            .into_iter()
            .find(|t| self.carries_onto(t, moving, anchor, shared))
            .unwrap_or(t);
        self.move_cluster(moving, &t);
        let consistent = shared.iter().all(|&e| self.agree(e, anchor, moving)) && self.fixed_agree(moving);
        if !consistent {
            debug!(%anchor, %moving, "Clusters disagree after aligning shared elements");
            return Some(MergeOutcome::Failed(SolveState::OverConstrained));
        }
        debug!(%anchor, %moving, shared = shared.len(), "Merged clusters sharing elements");
        self.absorb(anchor, moving, &[]);
        Some(MergeOutcome::Merged)
    }

    fn try_shared_one(&mut self) -> Option<MergeOutcome> {
        let n = self.clusters.len();
        for i in 0..n {
            for j in i + 1..n {
                let shared = self.clusters[i].shared_with(&self.clusters[j]);
                let [shared] = shared.as_slice() else {
                    continue;
                };
                if self.cluster_has_fixed(i) && self.cluster_has_fixed(j) {
                    continue;
                }
                let (anchor, moving) = self.anchor_order(i, j);
                for link in self.links_between(i, j) {
                    if let Some(outcome) = self.merge_shared_one(anchor, moving, *shared, link) {
                        return Some(outcome);
                    }
                }
            }
        }
        None
    }

    /// Rotates `moving` about the shared element until the link holds.
    /// `None` if the link can't place its moving end.
    fn merge_shared_one(
        &mut self,
        anchor: ClusterId,
        moving: ClusterId,
        shared: ElementId,
        link: ConstraintId,
    ) -> Option<MergeOutcome> {
        let tolerance = self.config().tolerance;
        let c = self.constraints.get(link)?.clone();
        let anchor_cluster = self.cluster(anchor)?;
        let (x, y) = if anchor_cluster.contains(c.elements[0]) {
            (c.elements[0], c.elements[1])
        } else {
            (c.elements[1], c.elements[0])
        };
        let s_anchor = self.geometry_in(anchor, shared)?;
        let s_moving = self.geometry_in(moving, shared)?;
        let y_moving = self.geometry_in(moving, y)?;
        let x_anchor = self.geometry_in(anchor, x)?;
        let (held_kind, held_value) = constraint::measure(&s_moving, &y_moving);
        if !analytic::can_place(&y_moving, [held_kind, c.kind]) {
            return None;
        }

        let Ok(align) = transform::align_single(&s_moving, &s_anchor) else {
            return None;
        };
        self.move_cluster(moving, &align);
        let prior = self.geometry_in(moving, y)?;
        let s_moving = self.geometry_in(moving, shared)?;
        let relations = [
            Relation {
                kind: held_kind,
                value: held_value,
                known: s_anchor,
            },
            Relation {
                kind: c.kind,
                value: c.value,
                known: x_anchor,
            },
        ];
        let placed = match analytic::solve_element(&prior, relations, tolerance) {
            Ok(placed) => placed,
            Err(e) => {
                debug!(%anchor, %moving, %link, error = %e, "Link cannot be met by rotating about the shared element");
                return Some(MergeOutcome::Failed(e.into()));
            }
        };
        let Ok(t) = transform::from_pairs([s_moving, prior], [s_anchor, placed], tolerance) else {
            debug!(%anchor, %moving, %link, "No rigid motion meets the link");
            return Some(MergeOutcome::Failed(SolveState::NonConvergent));
        };
        self.move_cluster(moving, &t);
        if !(self.agree(shared, anchor, moving) && self.link_holds(link, anchor, moving) && self.fixed_agree(moving)) {
            debug!(%anchor, %moving, %link, "Clusters disagree after meeting the link");
            return Some(MergeOutcome::Failed(SolveState::NonConvergent));
        }
        debug!(%anchor, %moving, %shared, %link, "Merged clusters sharing one element");
        self.absorb(anchor, moving, &[link]);
        Some(MergeOutcome::Merged)
    }

    fn try_triangle(&mut self) -> Option<MergeOutcome> {
        let n = self.clusters.len();
        for i in 0..n {
            for j in i + 1..n {
                for k in j + 1..n {
                    let fixed = [i, j, k].iter().filter(|&&c| self.cluster_has_fixed(c)).count();
                    if fixed > 1 {
                        continue;
                    }
                    // The anchor is whichever cluster holds fixed elements, else the first.
                    let [a, b, c] = if self.cluster_has_fixed(j) {
                        [j, k, i]
                    } else if self.cluster_has_fixed(k) {
                        [k, i, j]
                    } else {
                        [i, j, k]
                    };
                    let single = |p: usize, q: usize| -> Option<ElementId> {
                        match self.clusters[p].shared_with(&self.clusters[q]).as_slice() {
                            [one] => Some(*one),
                            _ => None,
                        }
                    };
                    let (Some(s_ab), Some(s_bc), Some(s_ca)) = (single(a, b), single(b, c), single(c, a)) else {
                        continue;
                    };
                    if s_ab == s_bc || s_bc == s_ca || s_ca == s_ab {
                        continue;
                    }
                    let ids = [self.clusters[a].id, self.clusters[b].id, self.clusters[c].id];
                    if let Some(outcome) = self.merge_triangle(ids, [s_ab, s_bc, s_ca]) {
                        return Some(outcome);
                    }
                }
            }
        }
        None
    }

    /// Places the element shared by `b` and `c` from its relations to the elements
    /// they each share with `a`, then moves `b` and `c` onto it.
    fn merge_triangle(&mut self, clusters: [ClusterId; 3], shared: [ElementId; 3]) -> Option<MergeOutcome> {
        let tolerance = self.config().tolerance;
        let [a, b, c] = clusters;
        let [s_ab, s_bc, s_ca] = shared;
        let (held_b, value_b) = constraint::measure(&self.geometry_in(b, s_ab)?, &self.geometry_in(b, s_bc)?);
        let (held_c, value_c) = constraint::measure(&self.geometry_in(c, s_ca)?, &self.geometry_in(c, s_bc)?);
        let target = self.geometry_in(b, s_bc)?;
        if !analytic::can_place(&target, [held_b, held_c]) {
            return None;
        }
        let ab_anchor = self.geometry_in(a, s_ab)?;
        let ca_anchor = self.geometry_in(a, s_ca)?;

        let Ok(align) = transform::align_single(&self.geometry_in(b, s_ab)?, &ab_anchor) else {
            return None;
        };
        self.move_cluster(b, &align);
        let prior = self.geometry_in(b, s_bc)?;
        let relations = [
            Relation {
                kind: held_b,
                value: value_b,
                known: ab_anchor,
            },
            Relation {
                kind: held_c,
                value: value_c,
                known: ca_anchor,
            },
        ];
        let placed = match analytic::solve_element(&prior, relations, tolerance) {
            Ok(placed) => placed,
            Err(e) => {
                debug!(%a, %b, %c, error = %e, "Clusters cannot close into a triangle");
                return Some(MergeOutcome::Failed(e.into()));
            }
        };
        let to_b = transform::from_pairs([self.geometry_in(b, s_ab)?, prior], [ab_anchor, placed], tolerance);
        let to_c = transform::from_pairs(
            [self.geometry_in(c, s_ca)?, self.geometry_in(c, s_bc)?],
            [ca_anchor, placed],
            tolerance,
        );
        let (Ok(to_b), Ok(to_c)) = (to_b, to_c) else {
            debug!(%a, %b, %c, "No rigid motion closes the triangle");
            return Some(MergeOutcome::Failed(SolveState::NonConvergent));
        };
        self.move_cluster(b, &to_b);
        self.move_cluster(c, &to_c);
        let consistent = self.agree(s_ab, a, b)
            && self.agree(s_bc, b, c)
            && self.agree(s_ca, c, a)
            && self.fixed_agree(b)
            && self.fixed_agree(c);
        if !consistent {
            debug!(%a, %b, %c, "Shared elements disagree after closing the triangle");
            return Some(MergeOutcome::Failed(SolveState::NonConvergent));
        }
        debug!(%a, %b, %c, "Merged three clusters");
        self.absorb(a, b, &[]);
        self.absorb(a, c, &[]);
        Some(MergeOutcome::Merged)
    }

    fn try_unshared(&mut self) -> Option<MergeOutcome> {
        let n = self.clusters.len();
        for i in 0..n {
            for j in i + 1..n {
                if !self.clusters[i].shared_with(&self.clusters[j]).is_empty() {
                    continue;
                }
                if self.cluster_has_fixed(i) && self.cluster_has_fixed(j) {
                    continue;
                }
                let links = self.links_between(i, j);
                let kind = |c: &ConstraintId| self.constraints.get(*c).map(|c| c.kind);
                let angle = links.iter().find(|c| kind(c) == Some(ConstraintKind::Angle));
                let distance = links.iter().find(|c| kind(c) == Some(ConstraintKind::Distance));
                let (Some(&angle), Some(&distance)) = (angle, distance) else {
                    continue;
                };
                let (anchor, moving) = self.anchor_order(i, j);
                if let Some(outcome) = self.merge_unshared(anchor, moving, angle, distance) {
                    return Some(outcome);
                }
            }
        }
        None
    }

    /// Splits a link's ends into the anchor's and the moving cluster's.
    fn ends(&self, link: ConstraintId, anchor: ClusterId) -> Option<(ElementId, ElementId)> {
        let c = self.constraints.get(link)?;
        let [e0, e1] = c.elements;
        if self.cluster(anchor)?.contains(e0) {
            Some((e0, e1))
        } else {
            Some((e1, e0))
        }
    }

    /// Turns `moving` to meet the angle, then slides it to meet the distance.
    fn merge_unshared(
        &mut self,
        anchor: ClusterId,
        moving: ClusterId,
        angle: ConstraintId,
        distance: ConstraintId,
    ) -> Option<MergeOutcome> {
        let target_angle = self.constraints.get(angle)?.value;
        let target_distance = self.constraints.get(distance)?.value;
        let (la, lm) = self.ends(angle, anchor)?;
        let (da, dm) = self.ends(distance, anchor)?;
        let (Some(Geometry::Line(line_a)), Some(Geometry::Line(line_m))) =
            (self.geometry_in(anchor, la), self.geometry_in(moving, lm))
        else {
            return None;
        };
        let pivot = self.geometry_in(moving, dm)?.reference_point();
        let turn = minimal_rotation(line_a.angle_to(&line_m), target_angle);
        self.move_cluster(moving, &RigidTransform::rotation_about(pivot, turn));

        let shift = match (self.geometry_in(anchor, da)?, self.geometry_in(moving, dm)?) {
            (Geometry::Point(p), Geometry::Point(q)) => {
                let dir = (q.v() - p.v()).normalized().unwrap_or(V::new(1.0, 0.0));
                p.v() + dir * target_distance - q.v()
            }
            (Geometry::Point(p), Geometry::Line(l)) => {
                let s = l.signed_distance(&p);
                let side = if s >= 0.0 { 1.0 } else { -1.0 };
                l.normal() * (s - side * target_distance)
            }
            (Geometry::Line(l), Geometry::Point(q)) => {
                let s = l.signed_distance(&q);
                let side = if s >= 0.0 { 1.0 } else { -1.0 };
                l.normal() * (side * target_distance - s)
            }
            (Geometry::Line(_), Geometry::Line(_)) => return None,
        };
        self.move_cluster(moving, &RigidTransform::translation(shift));
        if !(self.link_holds(angle, anchor, moving) && self.link_holds(distance, anchor, moving)) {
            debug!(%anchor, %moving, "Links between unshared clusters do not hold");
            return Some(MergeOutcome::Failed(SolveState::NonConvergent));
        }
        debug!(%anchor, %moving, %angle, %distance, "Merged unshared clusters");
        self.absorb(anchor, moving, &[angle, distance]);
        Some(MergeOutcome::Merged)
    }

    /// Moves every element and constraint of `moving` into `anchor`.
    pub(crate) fn absorb(&mut self, anchor: ClusterId, moving: ClusterId, links: &[ConstraintId]) {
        let tolerance = self.config().tolerance;
        let Some(index) = self.cluster_index(moving) else {
            return;
        };
        let absorbed = self.clusters.remove(index);
        for &e in &absorbed.elements {
            self.elements.reassign(moving, anchor, e);
        }
        for link in links {
            self.free.shift_remove(link);
        }
        let Some(target) = self.clusters.iter_mut().find(|c| c.id == anchor) else {
            return;
        };
        target.elements.extend(absorbed.elements.iter().copied());
        target.constraints.extend(absorbed.constraints.iter().copied());
        target.constraints.extend(links.iter().copied());
        let members = target.elements.clone();

        let internal: Vec<ConstraintId> = self
            .free
            .iter()
            .copied()
            .filter(|c| {
                self.constraints
                    .get(*c)
                    .is_some_and(|c| c.elements.iter().all(|e| members.contains(e)))
            })
            .collect();
        for &c in &internal {
            let satisfied = self.residual_in(anchor, c).is_some_and(|r| r.abs() <= tolerance);
            if !satisfied {
                warn!(constraint = %c, cluster = %anchor, "Merged cluster does not satisfy a constraint between its elements");
                self.conflicting.insert(c);
            }
            self.free.shift_remove(&c);
        }
        if let Some(target) = self.clusters.iter_mut().find(|k| k.id == anchor) {
            target.constraints.extend(internal);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{ConstraintGraph, SolveState, element::Point, tests::assert_nearly_eq};

    #[test]
    fn shared_pair_moves_the_second_cluster() {
        let mut graph = ConstraintGraph::new();
        let a = graph.add_point(0.0, 0.0);
        let b = graph.add_point(4.0, 0.0);
        let c = graph.add_point(2.0, 3.0);
        let d = graph.add_point(12.0, 12.0);
        let first = graph.install_cluster(&[a, b, c], &[]);
        let second = graph.install_cluster(&[a, b, d], &[]);
        graph.elements.view_mut(second, a).unwrap().geometry = Point::new(10.0, 10.0).into();
        graph.elements.view_mut(second, b).unwrap().geometry = Point::new(10.0, 14.0).into();

        assert_eq!(graph.merge_clusters(), SolveState::Solved);
        assert_eq!(graph.clusters().len(), 1);
        assert_eq!(graph.clusters()[0].id(), first);
        graph.elements.merge_all_to_root();
        let d = graph.point(d).unwrap();
        assert_nearly_eq(d.x, 2.0);
        assert_nearly_eq(d.y, -2.0);
        assert_eq!(graph.point(a), Some(Point::new(0.0, 0.0)));
    }

    #[test]
    fn shared_pair_at_different_distances_conflicts() {
        let mut graph = ConstraintGraph::new();
        let a = graph.add_point(0.0, 0.0);
        let b = graph.add_point(4.0, 0.0);
        let _first = graph.install_cluster(&[a, b], &[]);
        let second = graph.install_cluster(&[a, b], &[]);
        graph.elements.view_mut(second, b).unwrap().geometry = Point::new(5.0, 0.0).into();
        assert_eq!(graph.merge_clusters(), SolveState::OverConstrained);
    }

    #[test]
    fn shared_lines_settle_the_half_turn() {
        let mut graph = ConstraintGraph::new();
        let x_axis = graph.add_line(0.0, 1.0, 0.0).unwrap();
        let y_axis = graph.add_line(1.0, 0.0, 0.0).unwrap();
        let above = graph.add_line(0.0, 1.0, -1.0).unwrap();
        let d = graph.add_point(2.0, 3.0);
        let first = graph.install_cluster(&[x_axis, y_axis, above], &[]);
        let second = graph.install_cluster(&[x_axis, y_axis, above, d], &[]);
        // The same x-axis, pointing the other way. Only `above` rules out the half turn.
        let flipped = graph.line(x_axis).unwrap().flipped();
        graph.elements.view_mut(second, x_axis).unwrap().geometry = flipped.into();

        assert_eq!(graph.merge_clusters(), SolveState::Solved);
        assert_eq!(graph.clusters().len(), 1);
        assert_eq!(graph.clusters()[0].id(), first);
        graph.elements.merge_all_to_root();
        let d = graph.point(d).unwrap();
        assert_nearly_eq(d.x, 2.0);
        assert_nearly_eq(d.y, 3.0);
        let above = graph.line(above).unwrap();
        assert_nearly_eq(above.signed_distance(&Point::new(5.0, 1.0)), 0.0);
    }
}
