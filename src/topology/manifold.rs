//! Curved-boundary description for the shell.
//!
//! Refinement asks the manifold where new vertices go. For a
//! [`SphericalManifold`] new points are interpolated in polar coordinates
//! around the centre, so vertices created on a circle stay on that circle.

/// Manifold identifier attached to cells.
pub type ManifoldId = u8;

/// Polar geometry around a fixed centre.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SphericalManifold {
    center: [f64; 2],
}

impl SphericalManifold {
    pub fn new(center: [f64; 2]) -> Self {
        Self { center }
    }

    pub fn center(&self) -> [f64; 2] {
        self.center
    }

    /// Map polar coordinates `(radius, angle)` to a Cartesian point.
    #[inline]
    pub fn push_forward(&self, radius: f64, angle: f64) -> [f64; 2] {
        let (s, c) = angle.sin_cos();
        [self.center[0] + radius * c, self.center[1] + radius * s]
    }

    /// Map a Cartesian point to `(radius, angle)` with `angle` in `(-pi, pi]`.
    pub fn pull_back(&self, point: [f64; 2]) -> (f64, f64) {
        let dx = point[0] - self.center[0];
        let dy = point[1] - self.center[1];
        (dx.hypot(dy), dy.atan2(dx))
    }

    /// Point a fraction `w` of the way from `p` to `q` along the manifold.
    ///
    /// Radius is interpolated linearly and the angle along the shorter arc.
    pub fn intermediate_point(&self, p: [f64; 2], q: [f64; 2], w: f64) -> [f64; 2] {
        let (rp, ap) = self.pull_back(p);
        let (rq, aq) = self.pull_back(q);
        let mut da = aq - ap;
        if da > std::f64::consts::PI {
            da -= 2.0 * std::f64::consts::PI;
        } else if da < -std::f64::consts::PI {
            da += 2.0 * std::f64::consts::PI;
        }
        self.push_forward(rp + w * (rq - rp), ap + w * da)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn midpoint_stays_on_circle() {
        let m = SphericalManifold::new([0.0, 0.0]);
        let p = m.push_forward(2.0, 0.0);
        let q = m.push_forward(2.0, std::f64::consts::FRAC_PI_2);
        let mid = m.intermediate_point(p, q, 0.5);
        let (r, a) = m.pull_back(mid);
        assert!((r - 2.0).abs() < 1e-14);
        assert!((a - std::f64::consts::FRAC_PI_4).abs() < 1e-14);
    }
}
