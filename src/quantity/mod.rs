//! Unit-aware random quantities.
//!
//! A [`GenerativeQuantity`] is a nominal value with an uncertainty, a
//! physical [`Unit`] and a sampling [`Distribution`]. Quantities are usually
//! built from a textual descriptor:
//!
//! ```text
//! 0.2 +/- 1e-6 m (flat)
//! 0.0 +/- 1 arcsec (uniform)
//! 0.5 +- 0.5 dimensionless
//! 0 rad
//! ```
//!
//! Without an error term the quantity is degenerate (every draw returns the
//! nominal value). Without a distribution name it is Gaussian with the error
//! as one standard deviation.
//!
//! Converting a quantity to another unit of the same dimension scales the
//! value and every shape parameter of the distribution by the same factor.

mod arbitrary;
mod distribution;
mod units;

pub use arbitrary::{ArbitraryDistribution, CubicSpline, FWHM_TO_SIGMA, MAX_CANDIDATE_BATCH};
pub use distribution::Distribution;
pub use units::{Dimension, Unit};

use std::fmt;
use std::str::FromStr;

use rand::Rng;

use crate::error::{PoaError, Result};

/// Scalar physical quantity with an uncertainty and a sampling distribution.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerativeQuantity {
    unit: Unit,
    dist: Distribution,
}

impl GenerativeQuantity {
    /// Parse a `value [+/- error] unit [(distribution)]` descriptor.
    pub fn parse(text: &str) -> Result<Self> {
        let bad = || PoaError::ParseQuantity(text.to_string());
        let mut rest = text.trim();

        // Trailing "(name)"
        let mut dist_name = None;
        if let Some(stripped) = rest.strip_suffix(')') {
            let open = stripped.rfind('(').ok_or_else(bad)?;
            dist_name = Some(stripped[open + 1..].trim());
            rest = stripped[..open].trim_end();
        }

        let (value, after) = take_number(rest).ok_or_else(bad)?;
        rest = after.trim_start();

        let mut error = None;
        for sep in ["+/-", "+-", "±"] {
            if let Some(after_sep) = rest.strip_prefix(sep) {
                let (e, after) = take_number(after_sep.trim_start()).ok_or_else(bad)?;
                error = Some(e);
                rest = after.trim_start();
                break;
            }
        }

        let unit_text = rest.trim();
        if let Some(c) = unit_text.chars().next() {
            if !(c.is_alphabetic() || c == '1') {
                return Err(bad());
            }
        }
        let unit = Unit::parse(unit_text)?;

        let dist = match (error, dist_name) {
            (None, Some(name)) => {
                // Validate the family even though the draw is fixed
                Distribution::from_name(name, value, 0.0)?;
                Distribution::Degenerate { value }
            }
            (None, None) => Distribution::Degenerate { value },
            (Some(e), Some(name)) => Distribution::from_name(name, value, e)?,
            (Some(e), None) => Distribution::Gaussian {
                mu: value,
                sigma: e.abs(),
            },
        };

        Ok(Self { unit, dist })
    }

    /// Quantity that always evaluates to `value`.
    pub fn fixed(value: f64, unit: Unit) -> Self {
        Self {
            unit,
            dist: Distribution::Degenerate { value },
        }
    }

    pub fn gaussian(mu: f64, sigma: f64, unit: Unit) -> Self {
        Self {
            unit,
            dist: Distribution::Gaussian {
                mu,
                sigma: sigma.abs(),
            },
        }
    }

    pub fn uniform(mu: f64, half_width: f64, unit: Unit) -> Self {
        Self {
            unit,
            dist: Distribution::Uniform {
                mu,
                half_width: half_width.abs(),
            },
        }
    }

    /// Quantity following a tabulated density `p(x)`, `x` expressed in `unit`.
    pub fn arbitrary(x: Vec<f64>, p: Vec<f64>, unit: Unit) -> Result<Self> {
        Ok(Self {
            unit,
            dist: Distribution::Arbitrary(Box::new(ArbitraryDistribution::new(x, p)?)),
        })
    }

    /// Nominal value, in the quantity's own unit.
    pub fn value(&self) -> f64 {
        self.dist.mu()
    }

    /// Uncertainty parameter, in the quantity's own unit.
    pub fn error(&self) -> f64 {
        self.dist.error()
    }

    /// Standard deviation of the distribution.
    pub fn sd(&self) -> f64 {
        self.dist.sd()
    }

    pub fn unit(&self) -> &Unit {
        &self.unit
    }

    pub fn distribution(&self) -> &Distribution {
        &self.dist
    }

    pub fn is_degenerate(&self) -> bool {
        matches!(self.dist, Distribution::Degenerate { .. })
    }

    pub fn value_in(&self, unit: &str) -> Result<f64> {
        Ok(self.value() * self.unit.factor_to(&Unit::parse(unit)?)?)
    }

    pub fn error_in(&self, unit: &str) -> Result<f64> {
        Ok(self.error() * self.unit.factor_to(&Unit::parse(unit)?)?.abs())
    }

    /// Same quantity expressed in `unit`.
    pub fn to_unit(&self, unit: &str) -> Result<Self> {
        let target = Unit::parse(unit)?;
        let factor = self.unit.factor_to(&target)?;
        Ok(Self {
            dist: self.dist.scaled(factor)?,
            unit: target,
        })
    }

    /// Same quantity expressed in the SI unit of its dimension.
    pub fn to_si(&self) -> Result<Self> {
        let base = self.unit.si_base();
        if base == self.unit {
            return Ok(self.clone());
        }
        Ok(Self {
            dist: self.dist.scaled(self.unit.to_si())?,
            unit: base,
        })
    }

    /// Draw one value in the quantity's own unit.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        self.dist.sample(rng)
    }

    /// Draw `n` values in the quantity's own unit.
    pub fn generate<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<f64> {
        self.dist.generate(n, rng)
    }

    /// Draw `n` values converted to `unit`.
    pub fn generate_in<R: Rng + ?Sized>(
        &self,
        n: usize,
        unit: &str,
        rng: &mut R,
    ) -> Result<Vec<f64>> {
        let factor = self.unit.factor_to(&Unit::parse(unit)?)?;
        Ok(self
            .dist
            .generate(n, rng)
            .into_iter()
            .map(|v| v * factor)
            .collect())
    }

    /// Replace the nominal value, keeping family, error and unit.
    pub fn set_value(&mut self, value: f64) -> Result<()> {
        self.dist = self.dist.with_value(value)?;
        Ok(())
    }

    /// Replace the error, keeping family, value and unit.
    pub fn set_error(&mut self, error: f64) -> Result<()> {
        self.dist = self.dist.with_error(error)?;
        Ok(())
    }

    /// Overwrite this quantity with a copy of `other`.
    pub fn assign(&mut self, other: &GenerativeQuantity) {
        self.unit = other.unit.clone();
        self.dist = other.dist.clone();
    }

    /// Re-parse this quantity from a descriptor. On failure it is unchanged.
    pub fn set_string(&mut self, text: &str) -> Result<()> {
        let parsed = Self::parse(text)?;
        self.assign(&parsed);
        Ok(())
    }
}

impl FromStr for GenerativeQuantity {
    type Err = PoaError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Renders `"<value> +/- <error> <unit> (<distribution>)"`.
///
/// Closed families parse back to an equal quantity; tabulated densities
/// render as `(arbitrary)`, which is informational only.
impl fmt::Display for GenerativeQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} +/- {} {} ({})",
            self.value(),
            self.error(),
            self.unit,
            self.dist.name()
        )
    }
}

/// Longest prefix of `s` that parses as a float, and the remainder.
fn take_number(s: &str) -> Option<(f64, &str)> {
    let end = s
        .char_indices()
        .find(|(_, c)| !matches!(c, '0'..='9' | '+' | '-' | '.' | 'e' | 'E'))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    (1..=end)
        .rev()
        .find_map(|len| s[..len].parse::<f64>().ok().map(|v| (v, &s[len..])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_parse_full_descriptor() {
        let q = GenerativeQuantity::parse("0.2 +/- 1e-6 m (flat)").unwrap();
        assert_eq!(q.unit().name(), "m");
        assert!((q.value() - 0.2).abs() < 1e-15);
        assert!((q.error() - 1e-6).abs() < 1e-18);
        assert_eq!(q.distribution().name(), "uniform");
    }

    #[test]
    fn test_parse_variants() {
        let q: GenerativeQuantity = "0.5+-0.5 dimensionless".parse().unwrap();
        assert_eq!(q.distribution().name(), "normal");
        assert!((q.error() - 0.5).abs() < 1e-15);

        let q = GenerativeQuantity::parse("0.0 ± 1 arcsec (uniform)").unwrap();
        assert_eq!(q.unit().name(), "arcsec");
        assert!((q.error() - 1.0).abs() < 1e-15);

        let q = GenerativeQuantity::parse("0 rad").unwrap();
        assert!(q.is_degenerate());

        let q = GenerativeQuantity::parse("15e-3m").unwrap();
        assert!((q.value() - 15e-3).abs() < 1e-18);
        assert_eq!(q.unit().name(), "m");
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            GenerativeQuantity::parse("abc m"),
            Err(PoaError::ParseQuantity(_))
        ));
        assert!(matches!(
            GenerativeQuantity::parse("1 +/- m"),
            Err(PoaError::ParseQuantity(_))
        ));
        assert!(matches!(
            GenerativeQuantity::parse("1 +/- 2 m (lorentz)"),
            Err(PoaError::UnsupportedDistribution(_))
        ));
        assert!(matches!(
            GenerativeQuantity::parse("1 +/- 2 parsec"),
            Err(PoaError::UnknownUnit(_))
        ));
    }

    #[test]
    fn test_degenerate_draws_nominal() {
        let q = GenerativeQuantity::parse("3.25 mm").unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        assert!(q.generate(1000, &mut rng).iter().all(|&v| v == 3.25));
        let in_m = q.generate_in(10, "m", &mut rng).unwrap();
        assert!(in_m.iter().all(|&v| (v - 3.25e-3).abs() < 1e-18));
    }

    #[test]
    fn test_unit_conversion_scales_distribution() {
        let q = GenerativeQuantity::parse("0.2 +/- 1e-6 m (gauss)").unwrap();
        let mm = q.to_unit("mm").unwrap();
        assert!((mm.value() - 200.0).abs() < 1e-9);
        assert!((mm.error() - 1e-3).abs() < 1e-15);
        assert_eq!(mm.distribution().name(), "normal");
        assert!((q.value_in("mm").unwrap() - 200.0).abs() < 1e-9);
        assert!(matches!(
            q.to_unit("deg"),
            Err(PoaError::IncompatibleUnits { .. })
        ));

        let arc = GenerativeQuantity::parse("1 +/- 1 arcsec (flat)").unwrap();
        let rad = arc.to_si().unwrap();
        assert_eq!(rad.unit().name(), "rad");
        assert!((rad.error() - std::f64::consts::PI / 648_000.0).abs() < 1e-18);
    }

    #[test]
    fn test_string_round_trip() {
        for text in [
            "0.2 +/- 1e-6 m (flat)",
            "0.5 +/- 0.5 dimensionless (flat)",
            "-3 +/- 0.25 deg (normal)",
            "7 mm",
        ] {
            let q = GenerativeQuantity::parse(text).unwrap();
            let back = GenerativeQuantity::parse(&q.to_string()).unwrap();
            assert_eq!(q, back, "round trip of {text} via {q}");
        }
    }

    #[test]
    fn test_reassignment() {
        let mut q = GenerativeQuantity::parse("1 +/- 0.1 m (flat)").unwrap();
        q.set_value(2.0).unwrap();
        q.set_error(0.5).unwrap();
        assert_eq!(q, GenerativeQuantity::uniform(2.0, 0.5, Unit::meter()));

        assert!(q.set_string("nonsense").is_err());
        assert!((q.value() - 2.0).abs() < 1e-15);

        q.set_string("4 arcsec").unwrap();
        assert!(q.is_degenerate());
        assert_eq!(q.unit().name(), "arcsec");

        let other = GenerativeQuantity::gaussian(0.0, 1.0, Unit::radian());
        q.assign(&other);
        assert_eq!(q, other);
    }

    #[test]
    fn test_arbitrary_quantity() {
        let x: Vec<f64> = (0..=100).map(|i| i as f64 * 0.01).collect();
        let p: Vec<f64> = x.iter().map(|v| 1.0 - (2.0 * v - 1.0).abs()).collect();
        let q = GenerativeQuantity::arbitrary(x, p, Unit::parse("mm").unwrap()).unwrap();
        assert!((q.value() - 0.5).abs() < 1e-6);
        let m = q.to_unit("m").unwrap();
        assert!((m.value() - 0.5e-3).abs() < 1e-9);
        let mut rng = StdRng::seed_from_u64(5);
        let draws = q.generate(5000, &mut rng);
        assert!(draws.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }
}
