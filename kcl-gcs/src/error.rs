use crate::{ConstraintId, ElementId, constraint::ConstraintKind};

/// Errors from building or editing a [`crate::ConstraintGraph`].
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[cfg_attr(not(feature = "unstable-exhaustive"), non_exhaustive)]
pub enum GcsError {
    /// No element has this ID.
    #[error("Element {0} does not exist")]
    UnknownElement(ElementId),
    /// No constraint has this ID.
    #[error("Constraint {0} does not exist")]
    UnknownConstraint(ConstraintId),
    /// This kind of constraint can't relate these shapes,
    /// e.g. an angle involving a point.
    #[error("A {kind} constraint cannot relate a {first} and a {second}")]
    InvalidConstraint {
        /// Kind of constraint that was requested.
        kind: ConstraintKind,
        /// Shape of the first element.
        first: &'static str,
        /// Shape of the second element.
        second: &'static str,
    },
    /// Both ends of the constraint are the same element.
    #[error("Element {0} cannot be constrained to itself")]
    SelfConstraint(ElementId),
    /// Distances must be finite and non-negative, angles must be finite.
    #[error("{value} is not a valid value for a {kind} constraint")]
    InvalidValue {
        /// Kind of constraint.
        kind: ConstraintKind,
        /// The rejected value.
        value: f64,
    },
    /// `a` and `b` were both zero, or some coefficient wasn't finite.
    #[error("({a}, {b}, {c}) are not the coefficients of a line")]
    DegenerateLine {
        /// Coefficient of x.
        a: f64,
        /// Coefficient of y.
        b: f64,
        /// Constant term.
        c: f64,
    },
    /// Only points can be combined.
    #[error("Element {0} is not a point")]
    NotAPoint(ElementId),
    /// Two fixed points at different positions can't become one point.
    #[error("Fixed points {0} and {1} are at different positions")]
    FixedPointsDisagree(ElementId, ElementId),
}

/// Errors from the numeric fallback solver.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[cfg_attr(not(feature = "unstable-exhaustive"), non_exhaustive)]
pub enum NumericError {
    /// Residuals were still too large after the iteration limit.
    #[error("Did not converge after {iterations} iterations, largest residual was {residual}")]
    DidNotConverge {
        /// How many iterations ran.
        iterations: usize,
        /// Largest absolute residual at the end.
        residual: f64,
    },
    /// Nothing constrains the unknowns.
    #[error("The system has unknowns but no equations")]
    EmptySystem,
    /// The damped normal equations could not be solved.
    #[error("The linearized system was singular")]
    Singular,
}

/// Errors from parsing the textual sketch format.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[cfg_attr(not(feature = "unstable-exhaustive"), non_exhaustive)]
pub enum TextualError {
    /// A line could not be parsed.
    #[error("Line {line}: could not parse `{text}`: {message}")]
    Syntax {
        /// 1-based line number.
        line: usize,
        /// The offending line.
        text: String,
        /// What the parser expected.
        message: String,
    },
    /// You referred to a label that was never declared.
    #[error("Line {line}: `{label}` was never declared")]
    UndefinedLabel {
        /// 1-based line number.
        line: usize,
        /// The undefined label.
        label: String,
    },
    /// The same label was declared twice.
    #[error("Line {line}: `{label}` was already declared")]
    DuplicateLabel {
        /// 1-based line number.
        line: usize,
        /// The repeated label.
        label: String,
    },
    /// The statement parsed, but the graph rejected it.
    #[error("Line {line}: {error}")]
    Graph {
        /// 1-based line number.
        line: usize,
        /// Underlying error.
        error: GcsError,
    },
}
