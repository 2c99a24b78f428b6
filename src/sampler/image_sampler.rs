use std::path::Path;

use image::{GrayImage, Luma};
use nalgebra::DMatrix;
use tracing::debug;

use super::{PlaneSampler, SampleAccumulator, SamplerStats, SamplingGeometry};
use crate::config::Configuration;
use crate::error::{PoaError, Result};
use crate::mask::GcuMask;
use crate::quantity::Dimension;
use crate::transform::{read, SharedTransform};
use crate::Vec2;

/// Default detector size (pixels per side).
pub const DEFAULT_CCD_SIZE: i64 = 1024;
/// Default pixel pitch.
pub const DEFAULT_CCD_PIXEL_SIZE: &str = "14 um";
/// Default detector focal length.
pub const DEFAULT_CCD_FOCAL_LENGTH: &str = "1 m";

/// Detector geometry, read from the `ccd` section.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorGeometry {
    pub cols: usize,
    pub rows: usize,
    /// Pixel width (m).
    pub pixel_width: f64,
    /// Pixel height (m).
    pub pixel_height: f64,
    /// Focal length (m); detector coordinates are divided by it.
    pub focal_length: f64,
}

impl DetectorGeometry {
    pub fn defaults(config: &mut Configuration) {
        config.set_default("ccd.width", DEFAULT_CCD_SIZE);
        config.set_default("ccd.height", DEFAULT_CCD_SIZE);
        config.set_default("ccd.pixel_width", DEFAULT_CCD_PIXEL_SIZE);
        config.set_default("ccd.pixel_height", DEFAULT_CCD_PIXEL_SIZE);
        config.set_default("ccd.focal_length", DEFAULT_CCD_FOCAL_LENGTH);
    }

    pub fn from_config(config: &Configuration) -> Result<Self> {
        let length = |key: &str| -> Result<f64> {
            let v = config.get_si_quantity(key, Dimension::Length)?.value();
            if v > 0.0 && v.is_finite() {
                Ok(v)
            } else {
                Err(PoaError::Config(format!(
                    "key `{key}` must be a positive length, got {v}"
                )))
            }
        };
        let size = |key: &str| -> Result<usize> {
            match config.get_usize(key)? {
                0 => Err(PoaError::Config(format!("key `{key}` must be positive"))),
                n => Ok(n),
            }
        };
        Ok(Self {
            cols: size("ccd.width")?,
            rows: size("ccd.height")?,
            pixel_width: length("ccd.pixel_width")?,
            pixel_height: length("ccd.pixel_height")?,
            focal_length: length("ccd.focal_length")?,
        })
    }

    /// Plate scale in arcseconds per millimeter.
    pub fn plate_scale(&self) -> f64 {
        206_264.806_247_096_36e-3 / self.focal_length
    }
}

/// Mask intensity seen through `transform` at detector position `p`:
/// `I(backward(finv · p))`.
struct MaskFlux<'a> {
    transform: &'a SharedTransform,
    mask: &'a GcuMask,
    finv: f64,
}

impl SampleAccumulator for MaskFlux<'_> {
    fn accumulate(&self, samples: &[Vec2]) -> Result<Vec<f64>> {
        let scaled: Vec<Vec2> = samples.iter().map(|p| self.finv * p).collect();
        let t = read(self.transform);
        Ok(t
            .backward_batch(&scaled)
            .into_iter()
            .map(|q| self.mask.intensity_at(q))
            .collect())
    }
}

/// Renders the reference mask onto a detector through a transform.
#[derive(Debug)]
pub struct ImageSampler {
    transform: SharedTransform,
    mask: GcuMask,
    finv: f64,
    plane: PlaneSampler,
}

impl ImageSampler {
    pub fn new(mask: GcuMask, transform: SharedTransform) -> Self {
        Self {
            transform,
            mask,
            finv: 1.0,
            plane: PlaneSampler::new(SamplingGeometry::new(0, 0, 1.0, 1.0, None)),
        }
    }

    /// Detector of `cols × rows` pixels of size `dx × dy`; `finv` is the
    /// plate scale applied to detector coordinates.
    pub fn set_detector_geometry(&mut self, cols: usize, rows: usize, dx: f64, dy: f64, finv: f64) {
        self.finv = finv;
        self.plane
            .set_geometry(SamplingGeometry::new(cols, rows, dx, dy, None));
    }

    /// Apply a [`DetectorGeometry`].
    pub fn set_detector(&mut self, detector: &DetectorGeometry) {
        self.set_detector_geometry(
            detector.cols,
            detector.rows,
            detector.pixel_width,
            detector.pixel_height,
            1.0 / detector.focal_length,
        );
    }

    pub fn plane(&self) -> &PlaneSampler {
        &self.plane
    }

    pub fn plane_mut(&mut self) -> &mut PlaneSampler {
        &mut self.plane
    }

    pub fn mask(&self) -> &GcuMask {
        &self.mask
    }

    /// Integrate the detector.
    pub fn integrate(&mut self) -> Result<SamplerStats> {
        let acc = MaskFlux {
            transform: &self.transform,
            mask: &self.mask,
            finv: self.finv,
        };
        self.plane.process(&acc)
    }

    /// Intensity at individual detector positions.
    pub fn intensity_at_points(&mut self, points: &[Vec2]) -> Result<Vec<f64>> {
        let acc = MaskFlux {
            transform: &self.transform,
            mask: &self.mask,
            finv: self.finv,
        };
        self.plane.process_points(points, &acc)
    }

    /// Accumulated detector image, `cols × rows`.
    pub fn ccd(&self) -> &DMatrix<f64> {
        self.plane.map()
    }

    pub fn total_flux(&self) -> f64 {
        self.plane.map().sum()
    }

    /// 8-bit rendering of the detector, square-root stretched between zero
    /// and the brightest pixel. Row 0 of the image is the top (largest y).
    pub fn to_gray_image(&self) -> Result<GrayImage> {
        let ccd = self.ccd();
        let (cols, rows) = ccd.shape();
        let dim = |n: usize| {
            u32::try_from(n)
                .map_err(|_| PoaError::ShapeMismatch(format!("detector dimension {n} too large")))
        };
        let (width, height) = (dim(cols)?, dim(rows)?);
        let peak = ccd.max();

        let mut img = GrayImage::new(width, height);
        for (i, x) in (0..width).enumerate() {
            for (j, y) in (0..height).rev().enumerate() {
                let normed = if peak > 0.0 {
                    (ccd[(i, j)] / peak).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                img.put_pixel(x, y, Luma([(normed.sqrt() * 255.0).round() as u8]));
            }
        }
        Ok(img)
    }

    /// Save the detector as a PNG file.
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.to_gray_image()?.save(path)?;
        debug!("Detector image saved to {}", path.display());
        Ok(())
    }
}
