use std::fmt;

/// Result of solving a cluster, a merge, or the whole graph.
///
/// When several parts of a solve report different states, the worse one wins:
/// `OverConstrained` > `NonConvergent` > `UnderConstrained` > `Solved` > `None`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(not(feature = "unstable-exhaustive"), non_exhaustive)]
pub enum SolveState {
    /// Nothing has been solved yet.
    #[default]
    None,
    /// Every constraint is satisfied.
    Solved,
    /// Some elements still have freedom left. Everything that was placed is consistent.
    UnderConstrained,
    /// Some constraint could not be met, though the system might be consistent.
    NonConvergent,
    /// The constraints contradict each other.
    OverConstrained,
}

impl SolveState {
    fn severity(self) -> u8 {
        match self {
            SolveState::None => 0,
            SolveState::Solved => 1,
            SolveState::UnderConstrained => 2,
            SolveState::NonConvergent => 3,
            SolveState::OverConstrained => 4,
        }
    }

    /// The worse of the two states.
    pub fn worst(self, other: SolveState) -> SolveState {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }

    /// Solved, with nothing left to complain about.
    pub fn is_solved(self) -> bool {
        self == SolveState::Solved
    }

    /// Either solved or merely underconstrained: nothing failed.
    pub fn is_consistent(self) -> bool {
        matches!(self, SolveState::Solved | SolveState::UnderConstrained)
    }
}

impl fmt::Display for SolveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SolveState::None => "not solved",
            SolveState::Solved => "solved",
            SolveState::UnderConstrained => "underconstrained",
            SolveState::NonConvergent => "did not converge",
            SolveState::OverConstrained => "overconstrained",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worst_state_dominates() {
        use SolveState::*;
        assert_eq!(Solved.worst(UnderConstrained), UnderConstrained);
        assert_eq!(OverConstrained.worst(NonConvergent), OverConstrained);
        assert_eq!(NonConvergent.worst(UnderConstrained), NonConvergent);
        assert_eq!(None.worst(Solved), Solved);
        assert_eq!(Solved.worst(Solved), Solved);
    }
}
