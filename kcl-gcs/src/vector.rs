#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd)]
pub(crate) struct V {
    pub x: f64,
    pub y: f64,
}

impl V {
    #[inline(always)]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[inline(always)]
    pub fn magnitude(&self) -> f64 {
        libm::hypot(self.x, self.y)
    }

    #[inline(always)]
    pub fn magnitude_squared(&self) -> f64 {
        self.x.powi(2) + self.y.powi(2)
    }

    #[inline(always)]
    pub fn dot(&self, rhs: &Self) -> f64 {
        self.x * rhs.x + self.y * rhs.y
    }

    #[inline(always)]
    pub fn euclidean_distance(self, rhs: Self) -> f64 {
        let d = self - rhs;
        d.magnitude()
    }

    /// <https://stackoverflow.com/questions/243945/calculating-a-2d-vectors-cross-product>
    #[inline(always)]
    pub fn cross_2d(&self, rhs: &Self) -> f64 {
        self.x * rhs.y - self.y * rhs.x
    }

    /// Counter-clockwise perpendicular.
    #[inline(always)]
    pub fn perp(self) -> Self {
        Self::new(-self.y, self.x)
    }

    /// Angle of this vector from the positive X axis, in (-π, π].
    #[inline(always)]
    pub fn angle(self) -> f64 {
        libm::atan2(self.y, self.x)
    }

    pub fn unit(angle: f64) -> Self {
        let (sin, cos) = libm::sincos(angle);
        Self::new(cos, sin)
    }

    /// Scaled to length 1, unless it's too short to have a direction.
    pub fn normalized(self) -> Option<Self> {
        let len = self.magnitude();
        if len < crate::EPSILON {
            return None;
        }
        Some(self * (1.0 / len))
    }

    pub fn rotate(self, angle: f64) -> Self {
        let (sin, cos) = libm::sincos(angle);
        Self::new(self.x * cos - self.y * sin, self.x * sin + self.y * cos)
    }

    pub fn rotate_about(self, pivot: Self, angle: f64) -> Self {
        pivot + (self - pivot).rotate(angle)
    }
}

impl std::ops::Sub<Self> for V {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl std::ops::Add<Self> for V {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl std::ops::Neg for V {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self {
            x: -self.x,
            y: -self.y,
        }
    }
}

impl std::ops::Mul<f64> for V {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self::Output {
        Self {
            x: self.x * rhs,
            y: self.y * rhs,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::FRAC_PI_2;

    use super::*;
    use crate::tests::assert_nearly_eq;

    #[test]
    fn rotation_quarter_turn() {
        let v = V::new(2.0, 0.0).rotate(FRAC_PI_2);
        assert_nearly_eq(v.x, 0.0);
        assert_nearly_eq(v.y, 2.0);
    }

    #[test]
    fn rotation_about_pivot() {
        let v = V::new(2.0, 1.0).rotate_about(V::new(1.0, 1.0), FRAC_PI_2);
        assert_nearly_eq(v.x, 1.0);
        assert_nearly_eq(v.y, 2.0);
    }

    #[test]
    fn short_vectors_have_no_direction() {
        assert!(V::new(0.0, 0.0).normalized().is_none());
        let n = V::new(3.0, 4.0).normalized().unwrap();
        assert_nearly_eq(n.x, 0.6);
        assert_nearly_eq(n.y, 0.8);
    }
}
