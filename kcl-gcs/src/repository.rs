//! Storage for elements and constraints.
//!
//! Every element has one root copy. A cluster that shares an element with
//! another cluster works on its own overlay copy, so solving one cluster never
//! moves another cluster's view of a shared element.
use indexmap::IndexMap;

use crate::{
    ClusterId, ConstraintId, ElementId,
    constraint::{Constraint, ConstraintKind},
    element::{Element, Geometry},
    id::IdGenerator,
};

#[derive(Debug, Default, Clone)]
pub(crate) struct ElementRepository {
    root: IndexMap<ElementId, Element>,
    overlays: IndexMap<ClusterId, IndexMap<ElementId, Element>>,
    owners: IndexMap<ElementId, Vec<ClusterId>>,
    ids: IdGenerator,
}

impl ElementRepository {
    pub fn insert(&mut self, geometry: Geometry, fixed: bool) -> ElementId {
        let id = ElementId(self.ids.next_id());
        self.root.insert(id, Element::new(id, geometry, fixed));
        id
    }

    pub fn get(&self, id: ElementId) -> Option<&Element> {
        self.root.get(&id)
    }

    pub fn get_mut(&mut self, id: ElementId) -> Option<&mut Element> {
        self.root.get_mut(&id)
    }

    pub fn remove(&mut self, id: ElementId) -> Option<Element> {
        self.owners.shift_remove(&id);
        for overlay in self.overlays.values_mut() {
            overlay.shift_remove(&id);
        }
        self.root.shift_remove(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Element> {
        self.root.values()
    }

    /// Which clusters have claimed this element.
    pub fn owners(&self, id: ElementId) -> &[ClusterId] {
        self.owners.get(&id).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn is_claimed(&self, id: ElementId) -> bool {
        !self.owners(id).is_empty()
    }

    pub fn has_overlay(&self, cluster: ClusterId, id: ElementId) -> bool {
        self.overlays
            .get(&cluster)
            .is_some_and(|overlay| overlay.contains_key(&id))
    }

    /// Records that `cluster` uses this element.
    ///
    /// The first claimer works on the root copy. Once a second cluster claims
    /// it, every claimer gets an overlay copy. Fixed elements are always
    /// copied so the root keeps their true position.
    pub fn claim(&mut self, cluster: ClusterId, id: ElementId) {
        let Some(element) = self.root.get(&id) else {
            return;
        };
        let owners = self.owners.entry(id).or_default();
        if owners.contains(&cluster) {
            return;
        }
        if owners.len() == 1 && !element.fixed {
            let first = owners[0];
            self.overlays
                .entry(first)
                .or_default()
                .insert(id, element.clone());
        }
        if !owners.is_empty() || element.fixed {
            self.overlays
                .entry(cluster)
                .or_default()
                .insert(id, element.clone());
        }
        owners.push(cluster);
    }

    /// This cluster's view of the element: its overlay copy if it has one, else the root copy.
    pub fn view(&self, cluster: ClusterId, id: ElementId) -> Option<&Element> {
        self.overlays
            .get(&cluster)
            .and_then(|overlay| overlay.get(&id))
            .or_else(|| self.root.get(&id))
    }

    pub fn view_mut(&mut self, cluster: ClusterId, id: ElementId) -> Option<&mut Element> {
        if self.has_overlay(cluster, id) {
            self.overlays
                .get_mut(&cluster)
                .and_then(|overlay| overlay.get_mut(&id))
        } else {
            self.root.get_mut(&id)
        }
    }

    /// Hands `from`'s claim on the element over to `to`.
    /// If `to` already had its own copy, `from`'s copy is dropped.
    pub fn reassign(&mut self, from: ClusterId, to: ClusterId, id: ElementId) {
        let copy = self
            .overlays
            .get_mut(&from)
            .and_then(|overlay| overlay.shift_remove(&id));
        let Some(owners) = self.owners.get_mut(&id) else {
            return;
        };
        owners.retain(|owner| *owner != from);
        if !owners.contains(&to) {
            owners.push(to);
            if let Some(copy) = copy {
                self.overlays.entry(to).or_default().insert(id, copy);
            }
        }
        self.merge_to_root(id);
    }

    /// Once only one cluster refers to the element, its copy becomes the root copy.
    /// Fixed elements keep their root position; their copy is just dropped.
    pub fn merge_to_root(&mut self, id: ElementId) {
        let [owner] = self.owners(id) else {
            return;
        };
        let owner = *owner;
        let Some(copy) = self
            .overlays
            .get_mut(&owner)
            .and_then(|overlay| overlay.shift_remove(&id))
        else {
            return;
        };
        if let Some(root) = self.root.get_mut(&id) {
            if !root.fixed {
                *root = copy;
            }
        }
    }

    /// Folds every singly-owned element back to the root.
    pub fn merge_all_to_root(&mut self) {
        let ids: Vec<ElementId> = self.owners.keys().copied().collect();
        for id in ids {
            self.merge_to_root(id);
        }
    }

    /// Forgets every claim and overlay copy.
    pub fn clear_claims(&mut self) {
        self.overlays.clear();
        self.owners.clear();
    }
}

#[derive(Debug, Default, Clone)]
pub(crate) struct ConstraintRepository {
    constraints: IndexMap<ConstraintId, Constraint>,
    by_element: IndexMap<ElementId, Vec<ConstraintId>>,
    ids: IdGenerator,
}

impl ConstraintRepository {
    pub fn insert(&mut self, kind: ConstraintKind, elements: [ElementId; 2], value: f64) -> ConstraintId {
        let id = ConstraintId(self.ids.next_id());
        self.constraints.insert(
            id,
            Constraint {
                id,
                kind,
                elements,
                value,
                solved: false,
            },
        );
        for element in elements {
            self.by_element.entry(element).or_default().push(id);
        }
        id
    }

    pub fn get(&self, id: ConstraintId) -> Option<&Constraint> {
        self.constraints.get(&id)
    }

    pub fn get_mut(&mut self, id: ConstraintId) -> Option<&mut Constraint> {
        self.constraints.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Constraint> {
        self.constraints.values_mut()
    }

    pub fn ids(&self) -> impl Iterator<Item = ConstraintId> + '_ {
        self.constraints.keys().copied()
    }

    /// Constraints that reference this element.
    pub fn for_element(&self, element: ElementId) -> &[ConstraintId] {
        self.by_element
            .get(&element)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn remove(&mut self, id: ConstraintId) -> Option<Constraint> {
        let constraint = self.constraints.shift_remove(&id)?;
        for element in constraint.elements {
            if let Some(list) = self.by_element.get_mut(&element) {
                list.retain(|c| *c != id);
            }
        }
        Some(constraint)
    }

    /// Points every reference to `from` at `to` instead.
    /// Returns the constraints that ended up relating `to` to itself; they are removed.
    pub fn rewrite_element(&mut self, from: ElementId, to: ElementId) -> Vec<Constraint> {
        let moved = self.by_element.shift_remove(&from).unwrap_or_default();
        let mut dropped = Vec::new();
        for id in moved {
            let Some(constraint) = self.constraints.get_mut(&id) else {
                continue;
            };
            for element in &mut constraint.elements {
                if *element == from {
                    *element = to;
                }
            }
            if constraint.elements[0] == constraint.elements[1] {
                if let Some(removed) = self.remove(id) {
                    dropped.push(removed);
                }
            } else {
                self.by_element.entry(to).or_default().push(id);
            }
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Point;

    fn point(x: f64, y: f64) -> Geometry {
        Geometry::Point(Point::new(x, y))
    }

    #[test]
    fn copy_on_second_claim() {
        let mut elements = ElementRepository::default();
        let p = elements.insert(point(1.0, 2.0), false);
        let (k0, k1) = (ClusterId(0), ClusterId(1));

        elements.claim(k0, p);
        assert!(!elements.has_overlay(k0, p));

        elements.claim(k1, p);
        assert!(elements.has_overlay(k0, p));
        assert!(elements.has_overlay(k1, p));

        // Moving one cluster's copy leaves the other's alone.
        elements.view_mut(k1, p).unwrap().geometry = point(5.0, 5.0);
        assert_eq!(elements.view(k0, p).unwrap().geometry, point(1.0, 2.0));
        assert_eq!(elements.get(p).unwrap().geometry, point(1.0, 2.0));

        // Once k1 hands its claim to k0, k0's copy becomes the root copy.
        elements.view_mut(k0, p).unwrap().geometry = point(3.0, 3.0);
        elements.reassign(k1, k0, p);
        assert_eq!(elements.owners(p), &[k0]);
        assert!(!elements.has_overlay(k0, p));
        assert_eq!(elements.get(p).unwrap().geometry, point(3.0, 3.0));
    }

    #[test]
    fn fixed_elements_keep_their_root_position() {
        let mut elements = ElementRepository::default();
        let o = elements.insert(point(0.0, 0.0), true);
        let k0 = ClusterId(0);
        elements.claim(k0, o);
        assert!(elements.has_overlay(k0, o));
        elements.view_mut(k0, o).unwrap().geometry = point(9.0, 9.0);
        elements.merge_all_to_root();
        assert_eq!(elements.get(o).unwrap().geometry, point(0.0, 0.0));
    }

    #[test]
    fn rewriting_drops_self_references() {
        let mut constraints = ConstraintRepository::default();
        let (a, b, c) = (ElementId(0), ElementId(1), ElementId(2));
        let ab = constraints.insert(ConstraintKind::Distance, [a, b], 0.0);
        let bc = constraints.insert(ConstraintKind::Distance, [b, c], 2.0);
        let dropped = constraints.rewrite_element(b, a);
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].id, ab);
        assert_eq!(constraints.get(bc).unwrap().elements, [a, c]);
        assert_eq!(constraints.for_element(a), &[bc]);
        assert!(constraints.for_element(b).is_empty());
    }
}
