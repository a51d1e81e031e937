//! Sketches that decompose into several clusters, one per way of joining them.
use std::f64::consts::FRAC_PI_3;

use crate::{
    ConstraintGraph, ElementId,
    tests::{add_line_through, assert_nearly_eq, assert_point_at, assert_solves, distance, prism},
    vector::V,
};

/// Adds points at the given spots, turned by `angle` about `pivot`.
fn points_turned(g: &mut ConstraintGraph, spots: &[(f64, f64)], pivot: (f64, f64), angle: f64) -> Vec<ElementId> {
    spots
        .iter()
        .map(|&(x, y)| {
            let v = V::new(x, y).rotate_about(V::new(pivot.0, pivot.1), angle);
            g.add_point(v.x, v.y)
        })
        .collect()
}

#[test]
fn clusters_sharing_one_point_and_a_link() {
    let spots = [(0.0, 0.0), (4.0, 0.0), (2.0, 3.0), (5.0, 4.0), (4.0, 6.0), (7.0, 6.0)];
    let mut g = ConstraintGraph::new();
    let mut ids = points_turned(&mut g, &spots[..3], (0.0, 0.0), 0.0);
    // The second body starts turned about the shared point.
    ids.extend(points_turned(&mut g, &spots[3..], spots[2], 0.3));
    let [a, b, c, d, e, f] = [0, 1, 2, 3, 4, 5];
    let link = |g: &mut ConstraintGraph, i: usize, j: usize| {
        g.add_distance(ids[i], ids[j], distance(spots[i], spots[j])).unwrap()
    };
    for (i, j) in [(a, b), (b, c), (c, a), (c, d), (c, e), (d, e), (e, f), (d, f)] {
        link(&mut g, i, j);
    }
    let af = link(&mut g, a, f);

    g.build_clusters();
    assert_eq!(g.clusters().len(), 2);
    assert!(g.free.contains(&af));

    assert_solves(&mut g);
    let (pa, pf) = (g.point(ids[a]).unwrap(), g.point(ids[f]).unwrap());
    assert_nearly_eq(pa.distance_to(&pf), distance(spots[a], spots[f]));
}

#[test]
fn three_clusters_close_a_triangle() {
    // Corners shared pairwise, plus two private points per body.
    let corners = [(0.0, 0.0), (4.0, 0.0), (2.0, 3.0)];
    let privates = [[(2.0, -1.0), (1.0, -2.0)], [(4.0, 2.0), (5.0, 2.5)], [(0.5, 2.5), (-0.5, 2.0)]];
    let mut g = ConstraintGraph::new();
    let corner_ids: Vec<ElementId> = corners
        .iter()
        .enumerate()
        .map(|(i, &(x, y))| g.add_point(x + 0.2 * i as f64, y - 0.1))
        .collect();
    for body in 0..3 {
        let (p, q) = (body, (body + 1) % 3);
        let [sa, sb] = privates[body];
        let wiggle = 0.1 * (body + 1) as f64;
        let moved = points_turned(&mut g, &[sa, sb], corners[p], wiggle);
        let (a, b) = (moved[0], moved[1]);
        g.add_distance(corner_ids[p], a, distance(corners[p], sa)).unwrap();
        g.add_distance(corner_ids[q], a, distance(corners[q], sa)).unwrap();
        g.add_distance(a, b, distance(sa, sb)).unwrap();
        g.add_distance(corner_ids[p], b, distance(corners[p], sb)).unwrap();
        g.add_distance(corner_ids[q], b, distance(corners[q], sb)).unwrap();
    }

    g.build_clusters();
    assert_eq!(g.clusters().len(), 3);
    assert!(g.free.is_empty());

    assert_solves(&mut g);
    let p: Vec<_> = corner_ids.iter().map(|id| g.point(*id).unwrap()).collect();
    assert_nearly_eq(p[0].distance_to(&p[1]), 4.0);
    assert_nearly_eq(p[1].distance_to(&p[2]), distance(corners[1], corners[2]));
    assert_nearly_eq(p[2].distance_to(&p[0]), distance(corners[2], corners[0]));
}

#[test]
fn unshared_clusters_joined_by_an_angle_and_a_distance() {
    let mut g = ConstraintGraph::new();
    let a1 = g.add_point(0.0, 0.0);
    let b1 = g.add_point(3.0, 0.2);
    let l1 = add_line_through(&mut g, (0.0, 0.0), (3.0, 0.2));
    let a2 = g.add_point(5.0, 1.0);
    let b2 = g.add_point(6.0, 3.0);
    let l2 = add_line_through(&mut g, (5.0, 1.0), (6.0, 3.0));
    g.add_distance(a1, b1, 3.0).unwrap();
    g.add_distance(a1, l1, 0.0).unwrap();
    g.add_distance(b1, l1, 0.0).unwrap();
    g.add_distance(a2, b2, 2.0).unwrap();
    g.add_distance(a2, l2, 0.0).unwrap();
    g.add_distance(b2, l2, 0.0).unwrap();
    let angle = g.add_angle(l1, l2, FRAC_PI_3).unwrap();
    let span = g.add_distance(a1, a2, 5.0).unwrap();

    g.build_clusters();
    assert_eq!(g.clusters().len(), 2);
    assert!(g.free.contains(&angle) && g.free.contains(&span));

    assert_solves(&mut g);
    let (l1, l2) = (g.line(l1).unwrap(), g.line(l2).unwrap());
    let between = l1.angle_to(&l2).abs();
    assert!(
        (between - FRAC_PI_3).abs() < 1e-6 || (between - 2.0 * FRAC_PI_3).abs() < 1e-6,
        "lines meet at {between}"
    );
    assert_nearly_eq(g.point(a1).unwrap().distance_to(&g.point(a2).unwrap()), 5.0);
}

#[test]
fn prism_falls_back_to_numeric() {
    let (mut g, ids) = prism();
    g.build_clusters();
    assert_eq!(g.clusters().len(), 2);
    assert_eq!(g.free.len(), 3);

    assert_solves(&mut g);
    // Both triangles keep their shape.
    let p: Vec<_> = ids.iter().map(|id| g.point(*id).unwrap()).collect();
    assert_nearly_eq(p[0].distance_to(&p[1]), 4.0);
    assert_nearly_eq(p[3].distance_to(&p[4]), distance((0.5, 5.0), (3.0, 6.0)));
}

#[test]
fn fixed_elements_do_not_move() {
    let mut g = ConstraintGraph::new();
    let o = g.add_fixed_point(0.0, 0.0);
    let x = g.add_fixed_line(0.0, 1.0, 0.0).unwrap();
    let p = g.add_point(3.0, 0.5);
    let q = g.add_point(4.0, 3.0);
    let r = g.add_point(2.0, 4.0);
    g.add_distance(o, x, 0.0).unwrap();
    g.add_distance(p, x, 0.0).unwrap();
    g.add_distance(o, p, 3.0).unwrap();
    g.add_distance(q, r, 2.5).unwrap();
    g.add_distance(p, q, 3.0).unwrap();
    g.add_distance(p, r, 4.0).unwrap();
    g.add_distance(o, r, 5.0).unwrap();

    assert_solves(&mut g);
    assert_point_at(&g, o, 0.0, 0.0);
    let x = g.line(x).unwrap();
    assert_nearly_eq(x.b().abs(), 1.0);
    assert_nearly_eq(x.c(), 0.0);
    assert_point_at(&g, p, 3.0, 0.0);
    assert_point_at(&g, r, 3.0, 4.0);
}
