//! Angular helpers in (η, φ) space.
//!
//! All azimuthal differences are normalized into `[-π, π)` before they are
//! used either as a distance or as a recorded signed difference.

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Physical-unit kinematics shared by every candidate flavor.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Kinematics {
    /// Transverse momentum (GeV)
    pub pt: f64,
    pub eta: f64,
    /// Azimuth (rad)
    pub phi: f64,
}

impl Kinematics {
    pub fn new(pt: f64, eta: f64, phi: f64) -> Self {
        Self { pt, eta, phi }
    }

    /// Signed differences `self - reference`.
    pub fn deltas_to(&self, reference: &Kinematics) -> Deltas {
        Deltas {
            pt: self.pt - reference.pt,
            eta: self.eta - reference.eta,
            phi: delta_phi(self.phi, reference.phi),
        }
    }

    /// Euclidean (η, φ) distance to another object.
    pub fn delta_r(&self, other: &Kinematics) -> f64 {
        delta_r(self.eta, self.phi, other.eta, other.phi)
    }
}

/// Signed differences (candidate - reference).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Deltas {
    pub pt: f64,
    pub eta: f64,
    pub phi: f64,
}

/// Maps an angle into `[-π, π)`.
#[inline]
pub fn normalize_phi(phi: f64) -> f64 {
    (phi + PI).rem_euclid(2.0 * PI) - PI
}

/// Normalized `a - b`.
#[inline]
pub fn delta_phi(a: f64, b: f64) -> f64 {
    normalize_phi(a - b)
}

/// ΔR = sqrt(Δη² + Δφ²) with Δφ normalized.
pub fn delta_r(eta1: f64, phi1: f64, eta2: f64, phi2: f64) -> f64 {
    Vector2::new(eta1 - eta2, delta_phi(phi1, phi2)).norm()
}

/// All `(i, j)` index pairs of `a` x `b` closer than `cut` in ΔR, in
/// row-major order.
pub fn match_within_dr(a: &[Kinematics], b: &[Kinematics], cut: f64) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    for (i, ka) in a.iter().enumerate() {
        for (j, kb) in b.iter().enumerate() {
            if ka.delta_r(kb) < cut {
                pairs.push((i, j));
            }
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_normalize_phi_range() {
        assert_abs_diff_eq!(normalize_phi(0.0), 0.0);
        assert_abs_diff_eq!(normalize_phi(PI), -PI);
        assert_abs_diff_eq!(normalize_phi(-PI), -PI);
        assert_abs_diff_eq!(normalize_phi(3.0 * PI / 2.0), -PI / 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(normalize_phi(-7.0), -7.0 + 2.0 * PI, epsilon = 1e-12);

        for i in -100..100 {
            let phi = normalize_phi(i as f64 * 0.37);
            assert!((-PI..PI).contains(&phi));
        }
    }

    #[test]
    fn test_delta_phi_wraps() {
        // 6.2 rad and 0.1 rad are close across the seam
        let d = delta_phi(0.1, 6.2);
        assert_abs_diff_eq!(d, 0.1 - 6.2 + 2.0 * PI, epsilon = 1e-12);
        assert!(d > 0.0);
    }

    #[test]
    fn test_delta_r() {
        assert_abs_diff_eq!(delta_r(0.0, 0.0, 0.3, 0.4), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(delta_r(1.0, 0.05, 1.0, 2.0 * PI - 0.05), 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_deltas_are_candidate_minus_reference() {
        let reference = Kinematics::new(10.0, 0.5, 1.0);
        let candidate = Kinematics::new(10.2, 0.52, 0.98);
        let d = candidate.deltas_to(&reference);
        assert_abs_diff_eq!(d.pt, 0.2, epsilon = 1e-9);
        assert_abs_diff_eq!(d.eta, 0.02, epsilon = 1e-9);
        assert_abs_diff_eq!(d.phi, -0.02, epsilon = 1e-9);
    }

    #[test]
    fn test_match_within_dr() {
        let a = vec![Kinematics::new(5.0, 0.0, 0.0), Kinematics::new(5.0, 1.0, 1.0)];
        let b = vec![
            Kinematics::new(6.0, 1.05, 1.0),
            Kinematics::new(6.0, 0.01, 0.0),
            Kinematics::new(6.0, -2.0, 3.0),
        ];
        assert_eq!(match_within_dr(&a, &b, 0.1), vec![(0, 1), (1, 0)]);
        assert!(match_within_dr(&a, &b, 0.001).is_empty());
        assert!(match_within_dr(&[], &b, 1.0).is_empty());
    }
}
