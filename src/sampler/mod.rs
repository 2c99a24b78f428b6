//! Tiled, oversampled integration over a rectangular field.
//!
//! The field is a grid of `cols × rows` pixels of size `dx × dy`, centered
//! on the origin. Each pixel is sampled on a regular `k × k` sub-grid; a
//! [`SampleAccumulator`] turns every sub-sample position into a value, and the
//! pixel receives the average (weight `1/k²` per sub-sample). Sub-samples
//! outside the optional radius are skipped altogether.
//!
//! Work is split into square tiles of [`TILE_SIZE`] pixels. Tiles own
//! disjoint pixels and sum their samples in a fixed order, so the serial and
//! parallel paths produce bit-identical maps.
//!
//! # Samplers
//!
//! - [`ErrorSampler`]: squared pointing error of a transform
//! - [`ImageSampler`]: flux of the reference mask seen through a transform

mod error_sampler;
mod image_sampler;

pub use error_sampler::ErrorSampler;
pub use image_sampler::{
    DetectorGeometry, ImageSampler, DEFAULT_CCD_FOCAL_LENGTH, DEFAULT_CCD_PIXEL_SIZE,
    DEFAULT_CCD_SIZE,
};

use std::sync::Arc;
use std::time::Instant;

use nalgebra::DMatrix;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

use crate::error::{PoaError, Result};
use crate::Vec2;

/// Tile edge, in pixels.
pub const TILE_SIZE: usize = 128;
/// Width of the worker pool used in parallel mode.
pub const DEFAULT_WORKERS: usize = 20;
/// Default sub-samples per pixel edge.
pub const DEFAULT_OVERSAMPLING: usize = 8;

/// Turns sample positions into values.
pub trait SampleAccumulator: Send + Sync {
    /// One value per position, in the same order.
    fn accumulate(&self, samples: &[Vec2]) -> Result<Vec<f64>>;
}

/// Pixel grid of a sampler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingGeometry {
    pub cols: usize,
    pub rows: usize,
    /// Pixel width (m).
    pub dx: f64,
    /// Pixel height (m).
    pub dy: f64,
    /// Only positions within this distance of the origin are sampled.
    pub radius: Option<f64>,
}

impl SamplingGeometry {
    pub fn new(cols: usize, rows: usize, dx: f64, dy: f64, radius: Option<f64>) -> Self {
        Self {
            cols,
            rows,
            dx,
            dy,
            radius,
        }
    }

    /// Lower-left corner of pixel `(0, 0)`.
    pub fn origin(&self) -> Vec2 {
        Vec2::new(
            -0.5 * self.cols as f64 * self.dx,
            -0.5 * self.rows as f64 * self.dy,
        )
    }

    pub fn xmin(&self) -> f64 {
        self.origin().x
    }

    pub fn xmax(&self) -> f64 {
        self.origin().x + self.cols as f64 * self.dx
    }

    pub fn ymin(&self) -> f64 {
        self.origin().y
    }

    pub fn ymax(&self) -> f64 {
        self.origin().y + self.rows as f64 * self.dy
    }

    fn in_radius(&self, p: Vec2) -> bool {
        self.radius.map_or(true, |r| p.norm() <= r)
    }
}

/// Timing of one [`PlaneSampler::process`] call.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SamplerStats {
    pub tiles: usize,
    pub mean_tile_secs: f64,
    pub std_tile_secs: f64,
    pub total_secs: f64,
}

/// Per-tile partial sums.
struct TileResult {
    i0: usize,
    j0: usize,
    width: usize,
    sums: Vec<f64>,
    weights: Vec<f64>,
    secs: f64,
}

/// Oversampled tile integrator.
///
/// The map is a `cols × rows` matrix indexed `(i, j)`, with `i` growing
/// along x and `j` along y.
pub struct PlaneSampler {
    geometry: SamplingGeometry,
    oversampling: usize,
    offsets: Vec<Vec2>,
    parallel: bool,
    pool: Option<Arc<ThreadPool>>,
    map: DMatrix<f64>,
    weights: DMatrix<f64>,
}

impl std::fmt::Debug for PlaneSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaneSampler")
            .field("geometry", &self.geometry)
            .field("oversampling", &self.oversampling)
            .field("parallel", &self.parallel)
            .finish_non_exhaustive()
    }
}

impl PlaneSampler {
    /// Serial sampler; call [`set_parallel`](Self::set_parallel) to fan out.
    pub fn new(geometry: SamplingGeometry) -> Self {
        let mut sampler = Self {
            geometry,
            oversampling: DEFAULT_OVERSAMPLING,
            offsets: Vec::new(),
            parallel: false,
            pool: None,
            map: DMatrix::zeros(0, 0),
            weights: DMatrix::zeros(0, 0),
        };
        sampler.precalculate();
        sampler
    }

    /// Recompute the sub-sample offsets and clear the map.
    fn precalculate(&mut self) {
        let k = self.oversampling;
        let (odx, ody) = (
            self.geometry.dx / k as f64,
            self.geometry.dy / k as f64,
        );
        self.offsets = (0..k)
            .flat_map(|b| {
                (0..k).map(move |a| Vec2::new((a as f64 + 0.5) * odx, (b as f64 + 0.5) * ody))
            })
            .collect();
        self.reset();
    }

    /// Zero the map.
    pub fn reset(&mut self) {
        self.map = DMatrix::zeros(self.geometry.cols, self.geometry.rows);
        self.weights = DMatrix::zeros(self.geometry.cols, self.geometry.rows);
    }

    pub fn geometry(&self) -> &SamplingGeometry {
        &self.geometry
    }

    pub fn set_geometry(&mut self, geometry: SamplingGeometry) {
        self.geometry = geometry;
        self.precalculate();
    }

    pub fn oversampling(&self) -> usize {
        self.oversampling
    }

    /// Set the sub-samples per pixel edge (at least 1).
    pub fn set_oversampling(&mut self, oversampling: usize) {
        let oversampling = oversampling.max(1);
        if oversampling != self.oversampling {
            self.oversampling = oversampling;
            self.precalculate();
        }
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    /// Enable the worker pool, building it with [`DEFAULT_WORKERS`] threads
    /// on first use.
    pub fn set_parallel(&mut self, parallel: bool) -> Result<()> {
        if parallel && self.pool.is_none() {
            self.set_workers(DEFAULT_WORKERS)?;
        }
        self.parallel = parallel;
        Ok(())
    }

    /// Rebuild the worker pool with `workers` threads.
    pub fn set_workers(&mut self, workers: usize) -> Result<()> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .build()
            .map_err(|e| PoaError::ThreadPool(e.to_string()))?;
        self.pool = Some(Arc::new(pool));
        Ok(())
    }

    /// Accumulated map, `cols × rows`.
    pub fn map(&self) -> &DMatrix<f64> {
        &self.map
    }

    /// Fraction of each pixel's sub-samples that fell inside the radius.
    pub fn coverage(&self) -> &DMatrix<f64> {
        &self.weights
    }

    /// Mean pixel value over the sampled area (coverage-weighted).
    pub fn mean(&self) -> f64 {
        let w = self.weights.sum();
        if w > 0.0 {
            self.map.sum() / w
        } else {
            0.0
        }
    }

    /// Largest per-pixel average among pixels with any coverage.
    pub fn max(&self) -> f64 {
        self.map
            .iter()
            .zip(self.weights.iter())
            .filter(|&(_, &w)| w > 0.0)
            .map(|(&v, &w)| v / w)
            .fold(0.0, f64::max)
    }

    /// Top-left pixel of every tile, row-major.
    fn tiles(&self) -> Vec<(usize, usize)> {
        (0..self.geometry.rows)
            .step_by(TILE_SIZE)
            .flat_map(|j| {
                (0..self.geometry.cols)
                    .step_by(TILE_SIZE)
                    .map(move |i| (i, j))
            })
            .collect()
    }

    fn process_tile(
        &self,
        (i0, j0): (usize, usize),
        accumulator: &dyn SampleAccumulator,
    ) -> Result<TileResult> {
        let start = Instant::now();
        let i1 = (i0 + TILE_SIZE).min(self.geometry.cols);
        let j1 = (j0 + TILE_SIZE).min(self.geometry.rows);
        let width = i1 - i0;
        let cells = width * (j1 - j0);
        let origin = self.geometry.origin();

        let mut cell_of = Vec::new();
        let mut samples = Vec::new();
        for j in j0..j1 {
            for i in i0..i1 {
                let corner =
                    origin + Vec2::new(i as f64 * self.geometry.dx, j as f64 * self.geometry.dy);
                for o in &self.offsets {
                    let p = corner + o;
                    if self.geometry.in_radius(p) {
                        cell_of.push((j - j0) * width + (i - i0));
                        samples.push(p);
                    }
                }
            }
        }

        let mut sums = vec![0.0; cells];
        let mut weights = vec![0.0; cells];
        if !samples.is_empty() {
            let values = accumulator.accumulate(&samples)?;
            if values.len() != samples.len() {
                return Err(PoaError::ShapeMismatch(format!(
                    "accumulator returned {} values for {} samples",
                    values.len(),
                    samples.len()
                )));
            }
            let w = 1.0 / self.offsets.len() as f64;
            for (&c, v) in cell_of.iter().zip(values) {
                sums[c] += w * v;
                weights[c] += w;
            }
        }

        Ok(TileResult {
            i0,
            j0,
            width,
            sums,
            weights,
            secs: start.elapsed().as_secs_f64(),
        })
    }

    fn merge(&mut self, tile: &TileResult) {
        for (c, (&s, &w)) in tile.sums.iter().zip(&tile.weights).enumerate() {
            let i = tile.i0 + c % tile.width;
            let j = tile.j0 + c / tile.width;
            self.map[(i, j)] += s;
            self.weights[(i, j)] += w;
        }
    }

    /// Integrate the whole field. The map is cleared first; on failure it
    /// stays cleared and the first tile error is returned.
    pub fn process(&mut self, accumulator: &dyn SampleAccumulator) -> Result<SamplerStats> {
        self.reset();
        let start = Instant::now();
        let tiles = self.tiles();

        let results: Result<Vec<TileResult>> = match (&self.pool, self.parallel) {
            (Some(pool), true) => pool.install(|| {
                tiles
                    .par_iter()
                    .map(|&t| self.process_tile(t, accumulator))
                    .collect()
            }),
            _ => tiles
                .iter()
                .map(|&t| self.process_tile(t, accumulator))
                .collect(),
        };

        let results = match results {
            Ok(r) => r,
            Err(e) => {
                self.reset();
                return Err(e);
            }
        };
        for tile in &results {
            self.merge(tile);
        }

        let n = results.len();
        let mean = if n > 0 {
            results.iter().map(|t| t.secs).sum::<f64>() / n as f64
        } else {
            0.0
        };
        let var = if n > 0 {
            results.iter().map(|t| (t.secs - mean).powi(2)).sum::<f64>() / n as f64
        } else {
            0.0
        };
        let stats = SamplerStats {
            tiles: n,
            mean_tile_secs: mean,
            std_tile_secs: var.sqrt(),
            total_secs: start.elapsed().as_secs_f64(),
        };
        debug!(
            "Sampled {}x{} px (k={}) in {} tiles, {:.3} s",
            self.geometry.cols, self.geometry.rows, self.oversampling, stats.tiles, stats.total_secs
        );
        Ok(stats)
    }

    /// Evaluate the accumulator at individual points (no oversampling, no
    /// radius cut). The map is cleared.
    pub fn process_points(
        &mut self,
        points: &[Vec2],
        accumulator: &dyn SampleAccumulator,
    ) -> Result<Vec<f64>> {
        self.reset();
        let values = accumulator.accumulate(points)?;
        if values.len() != points.len() {
            return Err(PoaError::ShapeMismatch(format!(
                "accumulator returned {} values for {} points",
                values.len(),
                points.len()
            )));
        }
        Ok(values)
    }
}
