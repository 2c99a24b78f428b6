//! Finite-resolution angle encoders of the two arm joints.

use std::f64::consts::TAU;
use std::fmt;

use rand::Rng;

use crate::config::Configuration;
use crate::error::{PoaError, Result};
use crate::quantity::{Dimension, GenerativeQuantity};

/// Default encoder resolution, in bits per turn.
pub const DEFAULT_ENCODER_BITS: i64 = 11;
/// Default quantization offset, in units of one step (LSB).
pub const DEFAULT_QUANTIZATION_ERROR: &str = "0.5 +/- 0.5 dimensionless (flat)";
/// Default reading error.
pub const DEFAULT_ENCODER_ERROR: &str = "0.0 +/- 1 arcsec (flat)";
/// Default per-session zero offset.
pub const DEFAULT_SESSION_OFFSET: &str = "0 rad";

/// The two rotating joints of the pick-off arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// Joint at the field center.
    Theta,
    /// Joint at the elbow.
    Phi,
}

impl Axis {
    pub const ALL: [Axis; 2] = [Axis::Theta, Axis::Phi];

    pub fn name(&self) -> &'static str {
        match self {
            Axis::Theta => "theta",
            Axis::Phi => "phi",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Configuration key of an encoder parameter, e.g. `poa.encoder[phi].bits`.
pub fn encoder_key(axis: Axis, param: &str) -> String {
    format!("poa.encoder[{}].{}", axis.name(), param)
}

/// Digital angle encoder.
///
/// A reading normalizes the angle to `[0, 1)` turns, floors it to one of
/// `2^bits` steps, adds a quantization offset (in steps), then adds the
/// reading error and the session zero offset. With `bits = 0` the angle is
/// not quantized.
#[derive(Debug, Clone)]
pub struct Encoder {
    axis: Axis,
    bits: u32,
    qerr: GenerativeQuantity,
    error: GenerativeQuantity,
    session_offset_q: GenerativeQuantity,
    session_offset: f64,
}

impl Encoder {
    pub fn defaults(config: &mut Configuration, axis: Axis) {
        config.set_default(&encoder_key(axis, "bits"), DEFAULT_ENCODER_BITS);
        config.set_default(&encoder_key(axis, "qerr"), DEFAULT_QUANTIZATION_ERROR);
        config.set_default(&encoder_key(axis, "error"), DEFAULT_ENCODER_ERROR);
        config.set_default(&encoder_key(axis, "session_offset"), DEFAULT_SESSION_OFFSET);
    }

    pub fn from_config(config: &Configuration, axis: Axis) -> Result<Self> {
        let bits_key = encoder_key(axis, "bits");
        let bits = config.get_i64(&bits_key)?;
        let bits = u32::try_from(bits)
            .ok()
            .filter(|b| *b <= 52)
            .ok_or_else(|| {
                PoaError::Config(format!("`{bits_key}` must be in 0..=52, got {bits}"))
            })?;

        let qerr = config.get_quantity(&encoder_key(axis, "qerr"))?;
        if qerr.unit().dimension() != Dimension::Dimensionless {
            return Err(PoaError::Config(format!(
                "`{}` must be dimensionless",
                encoder_key(axis, "qerr")
            )));
        }
        let error = config.get_si_quantity(&encoder_key(axis, "error"), Dimension::Angle)?;
        let session_offset_q =
            config.get_si_quantity(&encoder_key(axis, "session_offset"), Dimension::Angle)?;
        let session_offset = session_offset_q.value();

        Ok(Self {
            axis,
            bits,
            qerr,
            error,
            session_offset_q,
            session_offset,
        })
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Number of steps per turn, or `None` when quantization is disabled.
    pub fn steps(&self) -> Option<f64> {
        (self.bits > 0).then(|| (1u64 << self.bits) as f64)
    }

    /// Current session zero offset, in radians.
    pub fn session_offset(&self) -> f64 {
        self.session_offset
    }

    /// Draw a new session zero offset.
    pub fn start_session<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.session_offset = self.session_offset_q.sample(rng);
    }

    /// Angle (radians) reported by the encoder for a commanded `angle`.
    pub fn read<R: Rng + ?Sized>(&self, angle: f64, rng: &mut R) -> f64 {
        let mut turns = angle / TAU;
        turns -= turns.floor();
        let digital = match self.steps() {
            Some(steps) => ((turns * steps).floor() + self.qerr.sample(rng)) / steps,
            None => turns,
        };
        TAU * digital + self.error.sample(rng) + self.session_offset
    }
}
