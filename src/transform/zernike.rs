use nalgebra::Complex;

use super::Transform;
use crate::zernike::ComplexZernike;
use crate::Vec2;

/// Displacement field described by complex Zernike coefficients.
///
/// Coordinates are normalized by `radius` before evaluation and the complex
/// value is read as a displacement `(Re, Im)` in field units:
/// `forward(p) = p + e(p)`, `backward(p) = p − e(p)`.
#[derive(Debug, Clone)]
pub struct ZernikeTransform {
    model: ComplexZernike,
    radius: f64,
}

impl ZernikeTransform {
    pub fn new(coefficients: Vec<Complex<f64>>, radius: f64) -> Self {
        Self {
            model: ComplexZernike::new(coefficients),
            radius,
        }
    }

    pub fn coefficients(&self) -> &[Complex<f64>] {
        self.model.coefficients()
    }

    /// Normalization radius (m).
    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Displacement at field point `p`.
    pub fn displacement(&self, p: Vec2) -> Vec2 {
        let z = self.model.eval(p / self.radius);
        Vec2::new(z.re, z.im)
    }
}

impl Transform for ZernikeTransform {
    fn forward(&self, p: Vec2) -> Vec2 {
        p + self.displacement(p)
    }

    fn backward(&self, p: Vec2) -> Vec2 {
        p - self.displacement(p)
    }

    fn describe(&self) -> String {
        format!("zernike(J={}, R={:.4} m)", self.model.len(), self.radius)
    }
}
