use nalgebra::DMatrix;

use super::{PlaneSampler, SampleAccumulator, SamplerStats, SamplingGeometry};
use crate::error::Result;
use crate::transform::{read, SharedTransform, DEFAULT_JACOBIAN_STEP};
use crate::Vec2;

/// Pointing error of `transform` at each sample.
///
/// Without an offset the error is `p − backward(p)`; with an offset `o` it is
/// the first-order image of `o` through the transform, `J_backward(p) · o`.
struct PointingError<'a> {
    transform: &'a SharedTransform,
    offset: Option<Vec2>,
}

impl PointingError<'_> {
    fn vectors(&self, samples: &[Vec2]) -> Vec<Vec2> {
        let t = read(self.transform);
        match self.offset {
            Some(o) => samples
                .iter()
                .map(|&p| t.backward_jacobian(p, DEFAULT_JACOBIAN_STEP) * o)
                .collect(),
            None => samples
                .iter()
                .zip(t.backward_batch(samples))
                .map(|(&p, q)| p - q)
                .collect(),
        }
    }
}

impl SampleAccumulator for PointingError<'_> {
    fn accumulate(&self, samples: &[Vec2]) -> Result<Vec<f64>> {
        Ok(self
            .vectors(samples)
            .iter()
            .map(|e| e.norm_squared())
            .collect())
    }
}

/// Samples the squared pointing error of a transform over the field.
#[derive(Debug)]
pub struct ErrorSampler {
    transform: SharedTransform,
    plane: PlaneSampler,
    offset: Option<Vec2>,
    err_vec: Vec<Vec2>,
    err_sq: Vec<f64>,
}

impl ErrorSampler {
    pub fn new(transform: SharedTransform, geometry: SamplingGeometry) -> Self {
        Self {
            transform,
            plane: PlaneSampler::new(geometry),
            offset: None,
            err_vec: Vec::new(),
            err_sq: Vec::new(),
        }
    }

    pub fn set_sampling_properties(
        &mut self,
        cols: usize,
        rows: usize,
        dx: f64,
        dy: f64,
        radius: Option<f64>,
    ) {
        self.plane
            .set_geometry(SamplingGeometry::new(cols, rows, dx, dy, radius));
    }

    pub fn plane(&self) -> &PlaneSampler {
        &self.plane
    }

    pub fn plane_mut(&mut self) -> &mut PlaneSampler {
        &mut self.plane
    }

    pub fn transform(&self) -> &SharedTransform {
        &self.transform
    }

    /// Switch to offset mode (`Some`) or back to direct errors (`None`).
    pub fn set_offset(&mut self, offset: Option<Vec2>) {
        self.offset = offset;
    }

    /// Sample the full field.
    pub fn process(&mut self) -> Result<SamplerStats> {
        let acc = PointingError {
            transform: &self.transform,
            offset: self.offset,
        };
        self.plane.process(&acc)
    }

    /// Measure the error at each point (no oversampling, no radius cut);
    /// returns the error vectors and keeps them, with their squared norms,
    /// for later inspection. The error map is cleared.
    pub fn process_points(&mut self, points: &[Vec2]) -> Result<Vec<Vec2>> {
        let acc = PointingError {
            transform: &self.transform,
            offset: self.offset,
        };
        self.plane.reset();
        self.err_vec = acc.vectors(points);
        self.err_sq = self.err_vec.iter().map(|e| e.norm_squared()).collect();
        Ok(self.err_vec.clone())
    }

    /// Error vectors of the last [`process_points`](Self::process_points).
    pub fn error_vectors(&self) -> &[Vec2] {
        &self.err_vec
    }

    /// Squared errors of the last [`process_points`](Self::process_points).
    pub fn error_sq(&self) -> &[f64] {
        &self.err_sq
    }

    /// Squared error map of the last [`process`](Self::process).
    pub fn error_map(&self) -> &DMatrix<f64> {
        self.plane.map()
    }

    pub fn mean_error_sq(&self) -> f64 {
        self.plane.mean()
    }

    pub fn max_error_sq(&self) -> f64 {
        self.plane.max()
    }

    pub fn rms_error(&self) -> f64 {
        self.mean_error_sq().sqrt()
    }
}
