use std::fmt;

/// Raw numeric identity shared by every kind of ID in the graph.
pub type Id = u32;

/// Generates an incrementing sequence of IDs starting from 0.
#[derive(Default, Debug, Clone)]
pub(crate) struct IdGenerator {
    next: Id,
}

impl IdGenerator {
    /// Generates an incrementing sequence of IDs starting from 0.
    pub fn next_id(&mut self) -> Id {
        let out = self.next;
        self.next += 1;
        out
    }
}

/// Identifies a point or line within one [`crate::ConstraintGraph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub(crate) Id);

/// Identifies a constraint within one [`crate::ConstraintGraph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstraintId(pub(crate) Id);

/// Identifies a rigid cluster found by decomposition.
/// Cluster IDs are not reused after the clusters are reset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterId(pub(crate) Id);

impl ElementId {
    /// The raw number behind this ID.
    pub fn raw(self) -> Id {
        self.0
    }
}

impl ConstraintId {
    /// The raw number behind this ID.
    pub fn raw(self) -> Id {
        self.0
    }
}

impl ClusterId {
    /// The raw number behind this ID.
    pub fn raw(self) -> Id {
        self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

impl fmt::Display for ConstraintId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "k{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_count_up_from_zero() {
        let mut ids = IdGenerator::default();
        assert_eq!(ids.next_id(), 0);
        assert_eq!(ids.next_id(), 1);
        assert_eq!(ids.next_id(), 2);
    }

    #[test]
    fn ids_display_with_their_kind() {
        assert_eq!(ElementId(3).to_string(), "e3");
        assert_eq!(ConstraintId(0).to_string(), "c0");
        assert_eq!(ClusterId(12).to_string(), "k12");
    }
}
