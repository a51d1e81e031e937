use crate::{ConstraintGraph, ElementId, Line, Point, SolveState};

mod merges;

const NEARLY: f64 = 1e-6;

#[track_caller]
pub fn assert_nearly_eq(actual: f64, expected: f64) {
    let diff = (actual - expected).abs();
    assert!(diff < NEARLY, "expected {expected}, got {actual} (off by {diff})");
}

#[track_caller]
pub fn assert_point_at(graph: &ConstraintGraph, id: ElementId, x: f64, y: f64) {
    let p = graph.point(id).unwrap();
    assert!(
        (p.x - x).abs() < NEARLY && (p.y - y).abs() < NEARLY,
        "expected {id} at ({x}, {y}), got {p}"
    );
}

/// Adds a free line through the two points.
pub fn add_line_through(graph: &mut ConstraintGraph, p: (f64, f64), q: (f64, f64)) -> ElementId {
    let l = Line::through(Point::new(p.0, p.1), Point::new(q.0, q.1)).unwrap();
    graph.add_line(l.a(), l.b(), l.c()).unwrap()
}

pub fn distance(p: (f64, f64), q: (f64, f64)) -> f64 {
    libm::hypot(q.0 - p.0, q.1 - p.1)
}

/// Solves, then checks that every constraint holds.
#[track_caller]
pub fn assert_solves(graph: &mut ConstraintGraph) {
    let state = graph.solve();
    assert_eq!(state, SolveState::Solved, "\n{}", graph.to_graphviz());
    for c in graph.constraints() {
        assert!(c.is_solved(), "{} {} {} does not hold", c.id(), c.kind(), c.value());
    }
    assert_eq!(graph.clusters().len(), 1);
}

/// Regular pentagon with side 4 on the fixed x-axis, with its first vertex at the fixed origin.
/// Four sides have lengths, three corners have angles.
/// Returns the graph and the five vertices.
pub fn pentagon() -> (ConstraintGraph, [ElementId; 5]) {
    let mut g = ConstraintGraph::new();
    let corner = 108f64.to_radians();
    let o = g.add_fixed_point(0.0, 0.0);
    let x = g.add_fixed_line(0.0, 1.0, 0.0).unwrap();
    let p1 = g.add_point(4.0, 0.1);
    let p2 = g.add_point(5.0, 4.0);
    let p3 = g.add_point(2.0, 6.0);
    let p4 = g.add_point(-1.0, 4.0);
    let l1 = add_line_through(&mut g, (4.0, 0.1), (5.0, 4.0));
    let l2 = add_line_through(&mut g, (5.0, 4.0), (2.0, 6.0));
    let l3 = add_line_through(&mut g, (2.0, 6.0), (-1.0, 4.0));
    let l4 = add_line_through(&mut g, (-1.0, 4.0), (0.0, 0.0));

    g.add_distance(o, x, 0.0).unwrap();
    g.add_distance(p1, x, 0.0).unwrap();
    g.add_distance(o, p1, 4.0).unwrap();

    g.add_angle(x, l1, corner).unwrap();
    g.add_distance(p1, l1, 0.0).unwrap();
    g.add_distance(p2, l1, 0.0).unwrap();
    g.add_distance(p1, p2, 4.0).unwrap();

    g.add_angle(l1, l2, corner).unwrap();
    g.add_distance(p2, l2, 0.0).unwrap();
    g.add_distance(p3, l2, 0.0).unwrap();
    g.add_distance(p2, p3, 4.0).unwrap();

    g.add_angle(l2, l3, corner).unwrap();
    g.add_distance(p3, l3, 0.0).unwrap();
    g.add_distance(p4, l3, 0.0).unwrap();
    g.add_distance(p3, p4, 4.0).unwrap();

    g.add_distance(p4, l4, 0.0).unwrap();
    g.add_distance(o, l4, 0.0).unwrap();
    (g, [o, p1, p2, p3, p4])
}

const PRISM_A: [(f64, f64); 3] = [(0.0, 0.0), (4.0, 0.0), (1.0, 3.0)];
const PRISM_B: [(f64, f64); 3] = [(0.5, 5.0), (3.0, 6.0), (1.5, 7.5)];

/// Two different triangles joined corner to corner by three more distances.
/// No pattern merges them, so the graph needs the numeric fallback.
pub fn prism() -> (ConstraintGraph, [ElementId; 6]) {
    let mut g = ConstraintGraph::new();
    let a = PRISM_A.map(|(x, y)| g.add_point(x, y));
    // Start the second triangle off to one side of where it belongs.
    let b = PRISM_B.map(|(x, y)| g.add_point(x + 0.4, y + 0.3));
    for (i, j) in [(0, 1), (1, 2), (2, 0)] {
        g.add_distance(a[i], a[j], distance(PRISM_A[i], PRISM_A[j])).unwrap();
    }
    for (i, j) in [(0, 1), (1, 2), (2, 0)] {
        g.add_distance(b[i], b[j], distance(PRISM_B[i], PRISM_B[j])).unwrap();
    }
    for i in 0..3 {
        g.add_distance(a[i], b[i], distance(PRISM_A[i], PRISM_B[i])).unwrap();
    }
    (g, [a[0], a[1], a[2], b[0], b[1], b[2]])
}
