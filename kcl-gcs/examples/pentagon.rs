//! Parse a sketch of a regular pentagon, solve it, and print where everything ended up.
//! Run with `RUST_LOG=kcl_gcs=debug` to watch the decomposition and merges.
use kcl_gcs::{SolveState, textual::Sketch};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kcl_gcs=info".into()),
        )
        .init();

    let file = include_str!("../test_cases/pentagon/problem.md");
    let mut sketch: Sketch = file.parse().unwrap();

    let state = sketch.solve();
    assert_eq!(state, SolveState::Solved);
    for (label, id) in sketch.labels() {
        if let Some(p) = sketch.point(&label.to_string()) {
            println!("{label} = {p}");
        } else if let Some(l) = sketch.line(&label.to_string()) {
            println!("{label} = {l}");
        } else {
            println!("{label} ({id}) is missing");
        }
    }
    println!(
        "{} clusters, {} degrees of freedom",
        sketch.graph().clusters().len(),
        sketch.graph().degrees_of_freedom()
    );
}
