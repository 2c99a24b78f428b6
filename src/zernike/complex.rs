//! Complex Zernike polynomials on the unit disk.
//!
//! ```text
//! Z_n^m(ρ, θ) = R_n^|m|(ρ) · e^{i·m·θ}
//! ```
//!
//! with the standard radial polynomial
//!
//! ```text
//! R_n^m(ρ) = Σ_{s=0}^{(n−m)/2} (−1)^s (n−s)! / (s! ((n+m)/2 − s)! ((n−m)/2 − s)!) · ρ^{n−2s}
//! ```
//!
//! Polynomials are addressed by a single index `j` that enumerates the
//! valid `(m, n)` pairs row by row: `n = 0, 1, 2, ...` and within each row
//! `m = −n, −n+2, ..., n`.

use nalgebra::Complex;

use crate::Vec2;

/// `(m, n)` pair of the `j`-th polynomial.
///
/// `n = ⌊(√(8j+1) − 1)/2⌋`, `k = j − n(n+1)/2`, `m = −n + 2k`.
pub fn j_to_mn(j: usize) -> (i32, u32) {
    // Largest n with n(n+1)/2 <= j, in integers to avoid sqrt rounding.
    let mut n = (((8.0 * j as f64 + 1.0).sqrt() - 1.0) / 2.0) as usize;
    while (n + 1) * (n + 2) / 2 <= j {
        n += 1;
    }
    while n * (n + 1) / 2 > j {
        n -= 1;
    }
    let k = j - n * (n + 1) / 2;
    (2 * k as i32 - n as i32, n as u32)
}

/// Inverse of [`j_to_mn`]. `None` if `(m, n)` is not a valid pair.
pub fn mn_to_j(m: i32, n: u32) -> Option<usize> {
    let n_i = n as i32;
    if m.abs() > n_i || (n_i - m) % 2 != 0 {
        return None;
    }
    let k = ((m + n_i) / 2) as usize;
    let n = n as usize;
    Some(n * (n + 1) / 2 + k)
}

fn factorial(k: u32) -> f64 {
    (1..=k).fold(1.0, |acc, i| acc * i as f64)
}

/// Radial polynomial `R_n^m(ρ)` for `m = |m| ≤ n`, `n − m` even.
pub fn radial(n: u32, m: u32, rho: f64) -> f64 {
    if m > n || (n - m) % 2 != 0 {
        return 0.0;
    }
    let half_sum = (n + m) / 2;
    let half_diff = (n - m) / 2;
    (0..=half_diff)
        .map(|s| {
            let sign = if s % 2 == 0 { 1.0 } else { -1.0 };
            let c = factorial(n - s)
                / (factorial(s) * factorial(half_sum - s) * factorial(half_diff - s));
            sign * c * rho.powi((n - 2 * s) as i32)
        })
        .sum()
}

/// `Z_n^m` evaluated at a point of the (normalized) plane.
pub fn zernike(m: i32, n: u32, p: Vec2) -> Complex<f64> {
    let rho = p.norm();
    let theta = p.y.atan2(p.x);
    let r = radial(n, m.unsigned_abs(), rho);
    let phase = m as f64 * theta;
    Complex::new(r * phase.cos(), r * phase.sin())
}

/// Linear combination `Σ a_j Z_j` of complex Zernike polynomials.
#[derive(Debug, Clone, PartialEq)]
pub struct ComplexZernike {
    coefficients: Vec<Complex<f64>>,
    modes: Vec<(i32, u32)>,
}

impl ComplexZernike {
    pub fn new(coefficients: Vec<Complex<f64>>) -> Self {
        let modes = (0..coefficients.len()).map(j_to_mn).collect();
        Self {
            coefficients,
            modes,
        }
    }

    pub fn len(&self) -> usize {
        self.coefficients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coefficients.is_empty()
    }

    pub fn coefficients(&self) -> &[Complex<f64>] {
        &self.coefficients
    }

    /// Value of the combination at `p` (normalized coordinates).
    pub fn eval(&self, p: Vec2) -> Complex<f64> {
        self.coefficients
            .iter()
            .zip(&self.modes)
            .map(|(a, &(m, n))| a * zernike(m, n, p))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_bijection() {
        let expected = [
            (0, 0),
            (-1, 1),
            (1, 1),
            (-2, 2),
            (0, 2),
            (2, 2),
            (-3, 3),
            (-1, 3),
            (1, 3),
            (3, 3),
        ];
        for (j, &(m, n)) in expected.iter().enumerate() {
            assert_eq!(j_to_mn(j), (m, n), "j = {j}");
            assert_eq!(mn_to_j(m, n), Some(j));
        }
        for j in 0..500 {
            let (m, n) = j_to_mn(j);
            assert_eq!(mn_to_j(m, n), Some(j));
        }
        assert_eq!(mn_to_j(1, 2), None);
        assert_eq!(mn_to_j(3, 1), None);
    }

    #[test]
    fn test_radial_polynomials() {
        let rho = 0.7;
        assert!((radial(0, 0, rho) - 1.0).abs() < 1e-15);
        assert!((radial(1, 1, rho) - rho).abs() < 1e-15);
        assert!((radial(2, 0, rho) - (2.0 * rho * rho - 1.0)).abs() < 1e-14);
        let r4 = 6.0 * rho.powi(4) - 6.0 * rho * rho + 1.0;
        assert!((radial(4, 0, rho) - r4).abs() < 1e-14);
        let r31 = 3.0 * rho.powi(3) - 2.0 * rho;
        assert!((radial(3, 1, rho) - r31).abs() < 1e-14);
        // every radial polynomial is 1 on the rim
        for j in 0..28 {
            let (m, n) = j_to_mn(j);
            assert!((radial(n, m.unsigned_abs(), 1.0) - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_tilt_terms() {
        let p = Vec2::new(0.3, -0.4);
        // Z_1^1 = x + iy, Z_1^{-1} = x − iy
        let z = zernike(1, 1, p);
        assert!((z - Complex::new(0.3, -0.4)).norm() < 1e-14);
        let z = zernike(-1, 1, p);
        assert!((z - Complex::new(0.3, 0.4)).norm() < 1e-14);
    }

    #[test]
    fn test_combination() {
        let cz = ComplexZernike::new(vec![
            Complex::new(1.0, 0.0),
            Complex::new(0.0, 0.0),
            Complex::new(0.0, 2.0),
        ]);
        let p = Vec2::new(0.5, 0.25);
        // 1 + 2i (x + iy)
        let expected = Complex::new(1.0 - 2.0 * 0.25, 2.0 * 0.5);
        assert!((cz.eval(p) - expected).norm() < 1e-14);
    }
}
