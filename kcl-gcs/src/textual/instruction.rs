use super::Label;

/// One non-empty, non-comment line of a sketch.
#[derive(Debug, PartialEq)]
pub enum Instruction {
    DeclarePoint(DeclarePoint),
    DeclareLine(DeclareLine),
    Distance(Distance),
    Angle(Angle),
    Coincident(Coincident),
}

#[derive(Debug, PartialEq)]
pub struct DeclarePoint {
    pub label: Label,
    pub fixed: bool,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, PartialEq)]
pub struct DeclareLine {
    pub label: Label,
    pub fixed: bool,
    pub coefficients: [f64; 3],
}

#[derive(Debug, PartialEq)]
pub struct Distance {
    pub label: (Label, Label),
    pub distance: f64,
}

#[derive(Debug, PartialEq)]
pub struct Angle {
    pub label: (Label, Label),
    pub radians: f64,
}

#[derive(Debug, PartialEq)]
pub struct Coincident {
    pub label: (Label, Label),
}
