//! GraphViz rendering of the constraint graph, for debugging decompositions.
use std::fmt;

use crate::{ConstraintGraph, element::Geometry};

impl ConstraintGraph {
    /// Renders the graph as GraphViz DOT text.
    ///
    /// Elements are nodes and constraints are edges. Each cluster is a
    /// `subgraph cluster_N` block. Constraints no cluster used are dashed,
    /// and conflicting ones are red.
    #[mutants::skip]
    pub fn to_graphviz(&self) -> String {
        Dot(self).to_string()
    }
}

struct Dot<'a>(&'a ConstraintGraph);

impl fmt::Display for Dot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let graph = self.0;
        writeln!(f, "graph constraints {{")?;
        for cluster in &graph.clusters {
            writeln!(f, "  subgraph cluster_{} {{", cluster.id().raw())?;
            writeln!(f, "    label=\"{}\";", cluster.id())?;
            for element in cluster.elements() {
                writeln!(f, "    {element};")?;
            }
            writeln!(f, "  }}")?;
        }
        for element in graph.elements() {
            let label = match element.geometry() {
                Geometry::Point(p) => format!("{} point {p}", element.id()),
                Geometry::Line(l) => format!("{} line {l}", element.id()),
            };
            let shape = if element.is_fixed() { "box" } else { "ellipse" };
            writeln!(f, "  {} [label=\"{label}\", shape={shape}];", element.id())?;
        }
        for constraint in graph.constraints() {
            let [a, b] = constraint.elements();
            write!(
                f,
                "  {a} -- {b} [label=\"{} {} {}\"",
                constraint.id(),
                constraint.kind(),
                constraint.value()
            )?;
            if graph.free.contains(&constraint.id()) {
                write!(f, ", style=dashed")?;
            }
            if graph.conflicting.contains(&constraint.id()) {
                write!(f, ", color=red")?;
            }
            writeln!(f, "];")?;
        }
        writeln!(f, "}}")
    }
}
