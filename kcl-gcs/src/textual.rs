//! A small text format for writing sketches by hand.
//!
//! ```text
//! # elements
//! fixed point o (0, 0)
//! fixed line x (0, 1, 0)
//! point p (4, 0.1)
//!
//! # constraints
//! distance(o, p) = 4
//! distance(p, x) = 0
//! ```
//!
//! Lines starting with `#` are comments. Angles are in radians unless they end in `deg`.
mod instruction;
mod parser;

use std::{fmt, str::FromStr};

use indexmap::IndexMap;
use winnow::Parser;

use crate::{
    ConstraintGraph, ElementId, Line, Point, SolveState, TextualError,
    element::Geometry,
};
use instruction::Instruction;

/// Name of an element in a sketch.
#[derive(Debug, Eq, PartialEq, Clone, Hash)]
pub struct Label(String);

impl From<&str> for Label {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A constraint graph whose elements have names.
#[derive(Debug, Default, Clone)]
pub struct Sketch {
    graph: ConstraintGraph,
    labels: IndexMap<Label, ElementId>,
}

impl FromStr for Sketch {
    type Err = TextualError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Sketch {
    /// Builds a sketch from its text.
    pub fn parse(text: &str) -> Result<Self, TextualError> {
        let mut sketch = Self::default();
        for (n, raw) in text.lines().enumerate() {
            let line = n + 1;
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let instruction = parser::instruction
                .parse(trimmed)
                .map_err(|e| TextualError::Syntax {
                    line,
                    text: trimmed.to_owned(),
                    message: e.to_string(),
                })?;
            sketch.execute(instruction, line)?;
        }
        Ok(sketch)
    }

    fn ensure_undeclared(&self, label: &Label, line: usize) -> Result<(), TextualError> {
        if self.labels.contains_key(label) {
            return Err(TextualError::DuplicateLabel {
                line,
                label: label.0.clone(),
            });
        }
        Ok(())
    }

    fn lookup(&self, label: &Label, line: usize) -> Result<ElementId, TextualError> {
        self.labels
            .get(label)
            .copied()
            .ok_or_else(|| TextualError::UndefinedLabel {
                line,
                label: label.0.clone(),
            })
    }

    fn execute(&mut self, instruction: Instruction, line: usize) -> Result<(), TextualError> {
        let graph_error = |error| TextualError::Graph { line, error };
        match instruction {
            Instruction::DeclarePoint(p) => {
                self.ensure_undeclared(&p.label, line)?;
                let id = if p.fixed {
                    self.graph.add_fixed_point(p.x, p.y)
                } else {
                    self.graph.add_point(p.x, p.y)
                };
                self.labels.insert(p.label, id);
                Ok(())
            }
            Instruction::DeclareLine(l) => {
                self.ensure_undeclared(&l.label, line)?;
                let [a, b, c] = l.coefficients;
                let id = if l.fixed {
                    self.graph.add_fixed_line(a, b, c)
                } else {
                    self.graph.add_line(a, b, c)
                }
                .map_err(graph_error)?;
                self.labels.insert(l.label, id);
                Ok(())
            }
            Instruction::Distance(d) => {
                let (e0, e1) = (self.lookup(&d.label.0, line)?, self.lookup(&d.label.1, line)?);
                self.graph.add_distance(e0, e1, d.distance).map_err(graph_error)?;
                Ok(())
            }
            Instruction::Angle(a) => {
                let (e0, e1) = (self.lookup(&a.label.0, line)?, self.lookup(&a.label.1, line)?);
                self.graph.add_angle(e0, e1, a.radians).map_err(graph_error)?;
                Ok(())
            }
            Instruction::Coincident(c) => {
                let (keep, remove) = (self.lookup(&c.label.0, line)?, self.lookup(&c.label.1, line)?);
                let kept = self.graph.combine_points(keep, remove).map_err(graph_error)?;
                for id in self.labels.values_mut() {
                    if *id == remove {
                        *id = kept;
                    }
                }
                Ok(())
            }
        }
    }

    /// The element with this label.
    pub fn id(&self, label: &str) -> Option<ElementId> {
        self.labels.get(&Label::from(label)).copied()
    }

    /// The point with this label, at its current position.
    pub fn point(&self, label: &str) -> Option<Point> {
        self.graph.point(self.id(label)?)
    }

    /// The line with this label, at its current position.
    pub fn line(&self, label: &str) -> Option<Line> {
        self.graph.line(self.id(label)?)
    }

    /// Every label, in declaration order, with the element it names.
    pub fn labels(&self) -> impl Iterator<Item = (&Label, ElementId)> {
        self.labels.iter().map(|(label, id)| (label, *id))
    }

    /// The underlying graph.
    pub fn graph(&self) -> &ConstraintGraph {
        &self.graph
    }

    /// The underlying graph, for edits the text format can't express.
    pub fn graph_mut(&mut self) -> &mut ConstraintGraph {
        &mut self.graph
    }

    /// Solves the underlying graph.
    pub fn solve(&mut self) -> SolveState {
        self.graph.solve()
    }

    fn name_of(&self, id: ElementId) -> String {
        self.labels
            .iter()
            .find(|(_, e)| **e == id)
            .map(|(label, _)| label.0.clone())
            .unwrap_or_else(|| id.to_string())
    }

    /// Renders the sketch at its current positions, in a form [`Sketch::parse`] reads back.
    ///
    /// Labels merged by `coincident` come back as a declaration plus a `coincident` line.
    pub fn to_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Sketch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# elements")?;
        for element in self.graph.elements() {
            let fixed = if element.is_fixed() { "fixed " } else { "" };
            let name = self.name_of(element.id());
            match element.geometry() {
                Geometry::Point(p) => writeln!(f, "{fixed}point {name} ({}, {})", p.x, p.y)?,
                Geometry::Line(l) => writeln!(f, "{fixed}line {name} ({}, {}, {})", l.a(), l.b(), l.c())?,
            }
        }
        let aliases: Vec<(&Label, ElementId)> = self
            .labels()
            .filter(|(label, id)| self.name_of(*id) != label.0)
            .collect();
        for (alias, id) in &aliases {
            if let Some(p) = self.graph.point(*id) {
                writeln!(f, "point {alias} ({}, {})", p.x, p.y)?;
            }
        }

        writeln!(f, "\n# constraints")?;
        for constraint in self.graph.constraints() {
            let [a, b] = constraint.elements();
            let (a, b) = (self.name_of(a), self.name_of(b));
            writeln!(f, "{}({a}, {b}) = {}", constraint.kind(), constraint.value())?;
        }
        for (alias, id) in &aliases {
            writeln!(f, "coincident({}, {alias})", self.name_of(*id))?;
        }
        Ok(())
    }
}
