use nalgebra::DMatrix;

use super::Transform;
use crate::error::{PoaError, Result};
use crate::Vec2;

/// Empirical displacement field interpolated bilinearly from a grid.
///
/// Grid node `(i, j)` (column `i`, row `j`) sits at `p0 + (i·dx, j·dy)`.
/// The grids are padded on the high side by repeating the last row and
/// column, so a point whose cell index lies in `[0, cols] × [0, rows]`
/// always has four neighbours. Points outside that range get no
/// displacement.
///
/// `forward(p) = p + e(p)`, `backward(p) = p − e(p)`.
#[derive(Debug, Clone)]
pub struct SampledTransform {
    p0: Vec2,
    delta: Vec2,
    rows: usize,
    cols: usize,
    ex: DMatrix<f64>,
    ey: DMatrix<f64>,
}

impl SampledTransform {
    /// Build from two `rows × cols` displacement grids.
    pub fn new(p0: Vec2, delta: Vec2, ex: &DMatrix<f64>, ey: &DMatrix<f64>) -> Result<Self> {
        if ex.shape() != ey.shape() {
            return Err(PoaError::ShapeMismatch(format!(
                "x displacement grid is {:?} but y grid is {:?}",
                ex.shape(),
                ey.shape()
            )));
        }
        if ex.is_empty() {
            return Err(PoaError::ShapeMismatch("displacement grid is empty".into()));
        }
        if !(delta.x > 0.0 && delta.y > 0.0) {
            return Err(PoaError::ShapeMismatch(format!(
                "grid steps must be positive, got ({}, {})",
                delta.x, delta.y
            )));
        }
        let (rows, cols) = ex.shape();
        Ok(Self {
            p0,
            delta,
            rows,
            cols,
            ex: overscan(ex),
            ey: overscan(ey),
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Interpolated displacement at `p`.
    pub fn displacement(&self, p: Vec2) -> Vec2 {
        let norm = (p - self.p0).component_div(&self.delta);
        let fi = norm.x.floor();
        let fj = norm.y.floor();
        if !(fi >= 0.0 && fj >= 0.0 && fi <= self.cols as f64 && fj <= self.rows as f64) {
            return Vec2::zeros();
        }
        let (i, j) = (fi as usize, fj as usize);
        let alpha = norm.x - fi;
        let beta = norm.y - fj;

        let lerp = |g: &DMatrix<f64>| {
            (1.0 - beta) * ((1.0 - alpha) * g[(j, i)] + alpha * g[(j, i + 1)])
                + beta * ((1.0 - alpha) * g[(j + 1, i)] + alpha * g[(j + 1, i + 1)])
        };
        Vec2::new(lerp(&self.ex), lerp(&self.ey))
    }
}

/// Pad a grid with two extra rows and columns repeating its last ones.
fn overscan(g: &DMatrix<f64>) -> DMatrix<f64> {
    let (rows, cols) = g.shape();
    DMatrix::from_fn(rows + 2, cols + 2, |r, c| g[(r.min(rows - 1), c.min(cols - 1))])
}

impl Transform for SampledTransform {
    fn forward(&self, p: Vec2) -> Vec2 {
        p + self.displacement(p)
    }

    fn backward(&self, p: Vec2) -> Vec2 {
        p - self.displacement(p)
    }

    fn describe(&self) -> String {
        format!("sampled[{}x{}]", self.cols, self.rows)
    }
}
