/// Tolerances and limits for solving.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(not(feature = "unstable-exhaustive"), non_exhaustive)]
pub struct Config {
    /// How far off a constraint may be and still count as satisfied.
    /// Also how closely two copies of a shared element must agree.
    pub tolerance: f64,
    /// The numeric fallback stops once every residual is below this.
    pub numeric_tolerance: f64,
    /// The numeric fallback gives up once steps get this small.
    pub step_tolerance: f64,
    /// How many iterations the numeric fallback may take.
    pub max_iterations: usize,
    /// Starting Levenberg-Marquardt damping.
    pub initial_damping: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            numeric_tolerance: 1e-9,
            step_tolerance: 1e-14,
            max_iterations: 500,
            initial_damping: 1e-3,
        }
    }
}

impl Config {
    /// Use this tolerance when checking constraints.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Let the numeric fallback run for this many iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Target for the numeric fallback's largest residual.
    pub fn with_numeric_tolerance(mut self, numeric_tolerance: f64) -> Self {
        self.numeric_tolerance = numeric_tolerance;
        self
    }

    /// Smallest step the numeric fallback keeps going for.
    pub fn with_step_tolerance(mut self, step_tolerance: f64) -> Self {
        self.step_tolerance = step_tolerance;
        self
    }

    /// Damping the numeric fallback starts from.
    pub fn with_initial_damping(mut self, initial_damping: f64) -> Self {
        self.initial_damping = initial_damping;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_only_touch_their_field() {
        let config = Config::default().with_max_iterations(20).with_initial_damping(0.5);
        assert_eq!(config.max_iterations, 20);
        assert_eq!(config.initial_damping.to_bits(), 0.5f64.to_bits());
        assert_eq!(config.tolerance.to_bits(), Config::default().tolerance.to_bits());
    }
}
