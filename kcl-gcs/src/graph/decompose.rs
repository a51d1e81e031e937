//! Splits the graph into rigid clusters, each solvable one element at a time.
use indexmap::{IndexMap, IndexSet};
use tracing::{debug, trace};

use crate::{
    ConstraintGraph, ConstraintId, ElementId,
    cluster::{GraphCluster, GrowthStep},
    constraint::ConstraintKind,
    element::{ConstraintLevel, Geometry},
};

/// A cluster that has been grown but not yet committed to the graph.
struct Growth {
    cluster: GraphCluster,
    /// Connecting constraints beyond the two each element needed.
    excess: Vec<ConstraintId>,
    overconstrained: Vec<ElementId>,
}

impl ConstraintGraph {
    /// Partitions the graph into rigid clusters.
    /// Does nothing if clusters have already been built since the last reset.
    pub fn build_clusters(&mut self) {
        if self.built {
            return;
        }
        self.reset_clusters();
        let mut cancelled: IndexSet<ConstraintId> = IndexSet::new();
        // A cancelled attempt hands its ID to the next one.
        let mut unused_id = None;
        loop {
            if self.elements.iter().all(|e| self.elements.is_claimed(e.id)) {
                break;
            }
            let Some((seed, retry)) = self.pick_seed(&cancelled) else {
                break;
            };
            let id = unused_id.take().unwrap_or_else(|| self.next_cluster_id());
            let growth = self.grow(GraphCluster::new(id), seed);
            if growth.cluster.steps.len() == 1 && !retry {
                trace!(%seed, "Seed did not grow, cancelling");
                cancelled.insert(seed);
                unused_id = Some(id);
                continue;
            }
            self.commit(growth);
        }
        self.built = true;
        debug!(clusters = self.clusters.len(), free = self.free.len(), "Decomposed");
    }

    fn is_fixed(&self, id: ElementId) -> bool {
        self.elements.get(id).is_some_and(|e| e.fixed)
    }

    fn free_degree(&self, id: ElementId) -> usize {
        self.constraints
            .for_element(id)
            .iter()
            .filter(|c| self.free.contains(*c))
            .count()
    }

    /// Picks the constraint to grow the next cluster from.
    /// The flag says whether this is a cancelled seed being retried.
    fn pick_seed(&self, cancelled: &IndexSet<ConstraintId>) -> Option<(ConstraintId, bool)> {
        let candidates: Vec<(ConstraintId, [ElementId; 2])> = self
            .free
            .iter()
            .filter(|c| !cancelled.contains(*c))
            .filter_map(|&c| Some((c, self.constraints.get(c)?.elements)))
            .collect();
        let claimed = |e: ElementId| self.elements.is_claimed(e);

        if let Some((c, _)) = candidates
            .iter()
            .find(|(_, [a, b])| self.is_fixed(*a) && self.is_fixed(*b))
        {
            return Some((*c, false));
        }
        if let Some((c, _)) = candidates.iter().find(|(_, [a, b])| claimed(*a) && claimed(*b)) {
            return Some((*c, false));
        }
        let mut best: Option<(ConstraintId, usize)> = None;
        for (c, [a, b]) in &candidates {
            let anchor = match (claimed(*a), claimed(*b)) {
                (true, false) => *a,
                (false, true) => *b,
                _ => continue,
            };
            let degree = self.free_degree(anchor);
            if best.is_none_or(|(_, d)| degree > d) {
                best = Some((*c, degree));
            }
        }
        if let Some((c, _)) = best {
            return Some((c, false));
        }
        if let Some((c, _)) = candidates.first() {
            return Some((*c, false));
        }
        self.free
            .iter()
            .filter(|c| cancelled.contains(*c))
            .find(|c| {
                self.constraints
                    .get(**c)
                    .is_some_and(|c| c.elements.iter().any(|e| !claimed(*e)))
            })
            .map(|c| (*c, true))
    }

    /// Grows a cluster from the seed, without changing the graph.
    fn grow(&self, mut cluster: GraphCluster, seed: ConstraintId) -> Growth {
        let mut growth_excess = Vec::new();
        let mut overconstrained = Vec::new();
        if let Some(c) = self.constraints.get(seed) {
            cluster.elements.extend(c.elements);
        }
        cluster.constraints.insert(seed);
        cluster.steps.push(GrowthStep::Seed(seed));
        trace!(cluster = %cluster.id, %seed, "Seeded cluster");

        while let Some((element, pair, excess)) = self.next_admission(&cluster) {
            trace!(cluster = %cluster.id, %element, "Admitted element");
            cluster.elements.insert(element);
            cluster.constraints.extend(pair);
            cluster.steps.push(GrowthStep::Place {
                element,
                constraints: pair,
            });
            if !excess.is_empty() {
                cluster.constraints.extend(excess.iter().copied());
                growth_excess.extend(excess);
                overconstrained.push(element);
            }
        }
        Growth {
            cluster,
            excess: growth_excess,
            overconstrained,
        }
    }

    /// The first outside element connected to the cluster by a usable pair of free constraints.
    fn next_admission(&self, cluster: &GraphCluster) -> Option<(ElementId, [ConstraintId; 2], Vec<ConstraintId>)> {
        let mut links: IndexMap<ElementId, Vec<ConstraintId>> = IndexMap::new();
        for &c in &self.free {
            if cluster.constraints.contains(&c) {
                continue;
            }
            let Some(constraint) = self.constraints.get(c) else {
                continue;
            };
            let [a, b] = constraint.elements;
            match (cluster.contains(a), cluster.contains(b)) {
                (true, false) => links.entry(b).or_default().push(c),
                (false, true) => links.entry(a).or_default().push(c),
                _ => {}
            }
        }
        links.into_iter().find_map(|(element, connecting)| {
            let pair = self.usable_pair(element, &connecting)?;
            let excess = connecting
                .into_iter()
                .filter(|c| !pair.contains(c))
                .collect();
            Some((element, pair, excess))
        })
    }

    /// Two of the connecting constraints that can place the element.
    /// Any two distances place a point; a line needs at least one distance.
    fn usable_pair(&self, element: ElementId, connecting: &[ConstraintId]) -> Option<[ConstraintId; 2]> {
        let is_line = matches!(self.elements.get(element)?.geometry, Geometry::Line(_));
        let kind = |c: ConstraintId| self.constraints.get(c).map(|c| c.kind);
        for (i, &first) in connecting.iter().enumerate() {
            for &second in &connecting[i + 1..] {
                let both_angles = kind(first) == Some(ConstraintKind::Angle)
                    && kind(second) == Some(ConstraintKind::Angle);
                if !is_line || !both_angles {
                    return Some([first, second]);
                }
            }
        }
        None
    }

    fn commit(&mut self, growth: Growth) {
        let Growth {
            mut cluster,
            excess,
            overconstrained,
        } = growth;
        for &e in &cluster.elements {
            self.elements.claim(cluster.id, e);
        }
        for c in &cluster.constraints {
            self.free.shift_remove(c);
        }
        // Free constraints with both ends inside are redundant with the cluster's own.
        let internal: Vec<ConstraintId> = self
            .free
            .iter()
            .copied()
            .filter(|c| {
                self.constraints
                    .get(*c)
                    .is_some_and(|c| c.elements.iter().all(|e| cluster.contains(*e)))
            })
            .collect();
        for c in internal {
            self.free.shift_remove(&c);
            cluster.constraints.insert(c);
            self.conflicting.insert(c);
            debug!(cluster = %cluster.id, constraint = %c, "Constraint is redundant within its cluster");
        }
        for c in excess {
            self.conflicting.insert(c);
        }
        for &e in &cluster.elements {
            if let Some(element) = self.elements.get_mut(e) {
                if element.level == ConstraintLevel::UnderConstrained {
                    element.level = ConstraintLevel::FullyConstrained;
                }
            }
        }
        for e in overconstrained {
            if let Some(element) = self.elements.get_mut(e) {
                element.level = ConstraintLevel::OverConstrained;
            }
        }
        debug!(cluster = %cluster.id, elements = cluster.len(), "Committed cluster");
        self.clusters.push(cluster);
    }
}
