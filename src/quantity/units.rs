//! Physical units understood by quantity descriptors.
//!
//! Only the dimensions the pointing model needs are supported: length, plane
//! angle and dimensionless ratios. Each unit carries its scale factor to the
//! SI base unit of its dimension (meter, radian, 1).

use std::f64::consts::PI;
use std::fmt;

use crate::error::{PoaError, Result};

/// Physical dimension of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Length,
    Angle,
    Dimensionless,
}

/// A named unit with its factor to the SI unit of the same dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    name: String,
    dimension: Dimension,
    to_si: f64,
}

const ARCSEC: f64 = PI / (180.0 * 3600.0);

impl Unit {
    /// Resolve a unit symbol (`m`, `mm`, `deg`, `arcsec`, `dimensionless`, ...).
    pub fn parse(symbol: &str) -> Result<Self> {
        let s = symbol.trim();
        let (dimension, to_si) = match s {
            "m" | "meter" | "meters" | "metre" | "metres" => (Dimension::Length, 1.0),
            "cm" | "centimeter" | "centimeters" => (Dimension::Length, 1e-2),
            "mm" | "millimeter" | "millimeters" => (Dimension::Length, 1e-3),
            "um" | "µm" | "micron" | "microns" | "micrometer" | "micrometers" => {
                (Dimension::Length, 1e-6)
            }
            "nm" | "nanometer" | "nanometers" => (Dimension::Length, 1e-9),
            "rad" | "radian" | "radians" => (Dimension::Angle, 1.0),
            "mrad" | "milliradian" | "milliradians" => (Dimension::Angle, 1e-3),
            "deg" | "degree" | "degrees" => (Dimension::Angle, PI / 180.0),
            "arcmin" | "arcminute" | "arcminutes" => (Dimension::Angle, 60.0 * ARCSEC),
            "arcsec" | "arcsecond" | "arcseconds" => (Dimension::Angle, ARCSEC),
            "mas" | "milliarcsecond" | "milliarcseconds" => (Dimension::Angle, 1e-3 * ARCSEC),
            "dimensionless" | "1" | "" => (Dimension::Dimensionless, 1.0),
            _ => return Err(PoaError::UnknownUnit(s.to_string())),
        };
        let name = if s.is_empty() { "dimensionless" } else { s };
        Ok(Self {
            name: name.to_string(),
            dimension,
            to_si,
        })
    }

    pub fn meter() -> Self {
        Self {
            name: "m".into(),
            dimension: Dimension::Length,
            to_si: 1.0,
        }
    }

    pub fn radian() -> Self {
        Self {
            name: "rad".into(),
            dimension: Dimension::Angle,
            to_si: 1.0,
        }
    }

    pub fn dimensionless() -> Self {
        Self {
            name: "dimensionless".into(),
            dimension: Dimension::Dimensionless,
            to_si: 1.0,
        }
    }

    /// SI unit of the same dimension.
    pub fn si_base(&self) -> Self {
        match self.dimension {
            Dimension::Length => Self::meter(),
            Dimension::Angle => Self::radian(),
            Dimension::Dimensionless => Self::dimensionless(),
        }
    }

    /// Factor converting a magnitude in this unit to its SI base unit.
    pub fn to_si(&self) -> f64 {
        self.to_si
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    /// Multiplicative factor converting a magnitude in `self` to `target`.
    pub fn factor_to(&self, target: &Unit) -> Result<f64> {
        if self.dimension != target.dimension {
            return Err(PoaError::IncompatibleUnits {
                from: self.name.clone(),
                to: target.name.clone(),
            });
        }
        Ok(self.to_si / target.to_si)
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
