//! Closed set of sampling distributions used by generative quantities.

use rand::Rng;
use rand_distr::{Distribution as _, StandardNormal, Uniform as UniformRange};

use super::arbitrary::ArbitraryDistribution;
use crate::error::{PoaError, Result};

/// Sampling distribution of a [`GenerativeQuantity`](super::GenerativeQuantity).
#[derive(Debug, Clone, PartialEq)]
pub enum Distribution {
    /// Always returns `value`.
    Degenerate { value: f64 },
    /// Normal distribution; `sigma` is one standard deviation.
    Gaussian { mu: f64, sigma: f64 },
    /// Flat distribution over `[mu - half_width, mu + half_width]`.
    Uniform { mu: f64, half_width: f64 },
    /// Tabulated density, sampled by rejection.
    Arbitrary(Box<ArbitraryDistribution>),
}

impl Distribution {
    /// Resolve a distribution family from its descriptor name and build it
    /// around `value` with the given `error`.
    ///
    /// Accepted names (case-insensitive): `normal`, `gauss`, `gaussian`,
    /// `uniform`, `flat`, `pp`, `diracdelta`, `delta`, `fixed`, `degenerate`.
    pub fn from_name(name: &str, value: f64, error: f64) -> Result<Self> {
        let error = error.abs();
        match name.trim().to_lowercase().as_str() {
            "normal" | "gauss" | "gaussian" => Ok(Distribution::Gaussian {
                mu: value,
                sigma: error,
            }),
            "uniform" | "flat" | "pp" => Ok(Distribution::Uniform {
                mu: value,
                half_width: error,
            }),
            "diracdelta" | "delta" | "fixed" | "degenerate" => {
                Ok(Distribution::Degenerate { value })
            }
            other => Err(PoaError::UnsupportedDistribution(other.to_string())),
        }
    }

    /// Canonical name, as rendered in descriptors.
    pub fn name(&self) -> &'static str {
        match self {
            Distribution::Degenerate { .. } => "diracdelta",
            Distribution::Gaussian { .. } => "normal",
            Distribution::Uniform { .. } => "uniform",
            Distribution::Arbitrary(_) => "arbitrary",
        }
    }

    pub fn mu(&self) -> f64 {
        match self {
            Distribution::Degenerate { value } => *value,
            Distribution::Gaussian { mu, .. } => *mu,
            Distribution::Uniform { mu, .. } => *mu,
            Distribution::Arbitrary(a) => a.mu(),
        }
    }

    /// The family's uncertainty parameter: σ for Gaussian, half-width for
    /// uniform, zero for degenerate and the FWHM-equivalent σ for arbitrary.
    pub fn error(&self) -> f64 {
        match self {
            Distribution::Degenerate { .. } => 0.0,
            Distribution::Gaussian { sigma, .. } => *sigma,
            Distribution::Uniform { half_width, .. } => *half_width,
            Distribution::Arbitrary(a) => a.equivalent_sigma(),
        }
    }

    /// Standard deviation of the distribution.
    pub fn sd(&self) -> f64 {
        match self {
            Distribution::Degenerate { .. } => 0.0,
            Distribution::Gaussian { sigma, .. } => *sigma,
            Distribution::Uniform { half_width, .. } => 2.0 * half_width / 12f64.sqrt(),
            Distribution::Arbitrary(a) => a.sd(),
        }
    }

    /// Full width at half maximum.
    pub fn fwhm(&self) -> f64 {
        match self {
            Distribution::Degenerate { .. } => 0.0,
            Distribution::Gaussian { sigma, .. } => 2.0 * (2.0 * 2f64.ln()).sqrt() * sigma,
            Distribution::Uniform { half_width, .. } => 2.0 * half_width,
            Distribution::Arbitrary(a) => a.fwhm(),
        }
    }

    /// Same family with every shape parameter multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> Result<Self> {
        Ok(match self {
            Distribution::Degenerate { value } => Distribution::Degenerate {
                value: value * factor,
            },
            Distribution::Gaussian { mu, sigma } => Distribution::Gaussian {
                mu: mu * factor,
                sigma: sigma * factor.abs(),
            },
            Distribution::Uniform { mu, half_width } => Distribution::Uniform {
                mu: mu * factor,
                half_width: half_width * factor.abs(),
            },
            Distribution::Arbitrary(a) => {
                Distribution::Arbitrary(Box::new(a.remapped(factor, a.mu() * factor)?))
            }
        })
    }

    /// Same family and error, re-centered on `value`.
    pub fn with_value(&self, value: f64) -> Result<Self> {
        Ok(match self {
            Distribution::Degenerate { .. } => Distribution::Degenerate { value },
            Distribution::Gaussian { sigma, .. } => Distribution::Gaussian {
                mu: value,
                sigma: *sigma,
            },
            Distribution::Uniform { half_width, .. } => Distribution::Uniform {
                mu: value,
                half_width: *half_width,
            },
            Distribution::Arbitrary(a) => Distribution::Arbitrary(Box::new(a.remapped(1.0, value)?)),
        })
    }

    /// Same family and center, with a new error.
    ///
    /// A degenerate distribution stays degenerate; an arbitrary one is
    /// stretched around its mean so its FWHM-equivalent σ equals `error`.
    pub fn with_error(&self, error: f64) -> Result<Self> {
        let error = error.abs();
        Ok(match self {
            Distribution::Degenerate { value } => Distribution::Degenerate { value: *value },
            Distribution::Gaussian { mu, .. } => Distribution::Gaussian {
                mu: *mu,
                sigma: error,
            },
            Distribution::Uniform { mu, .. } => Distribution::Uniform {
                mu: *mu,
                half_width: error,
            },
            Distribution::Arbitrary(a) => {
                let current = a.equivalent_sigma();
                if current <= 0.0 || error <= 0.0 {
                    return Err(PoaError::ShapeMismatch(
                        "cannot rescale a tabulated density to zero width".into(),
                    ));
                }
                Distribution::Arbitrary(Box::new(a.remapped(error / current, a.mu())?))
            }
        })
    }

    /// Draw a single sample.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self {
            Distribution::Degenerate { value } => *value,
            Distribution::Gaussian { mu, sigma } => {
                let z: f64 = StandardNormal.sample(rng);
                mu + sigma * z
            }
            Distribution::Uniform { mu, half_width } => {
                // only non-finite bounds are rejected
                match UniformRange::new_inclusive(mu - half_width, mu + half_width) {
                    Ok(u) => u.sample(rng),
                    Err(_) => *mu,
                }
            }
            Distribution::Arbitrary(a) => a.generate(1, rng)[0],
        }
    }

    /// Draw `n` samples.
    pub fn generate<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<f64> {
        match self {
            Distribution::Degenerate { value } => vec![*value; n],
            Distribution::Arbitrary(a) => a.generate(n, rng),
            _ => (0..n).map(|_| self.sample(rng)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn mean_var(v: &[f64]) -> (f64, f64) {
        let n = v.len() as f64;
        let mean = v.iter().sum::<f64>() / n;
        let var = v.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / n;
        (mean, var)
    }

    #[test]
    fn test_uniform_draws() {
        let d = Distribution::Uniform {
            mu: 2.0,
            half_width: 0.5,
        };
        let mut a = StdRng::seed_from_u64(5);
        let mut b = StdRng::seed_from_u64(5);
        let range = UniformRange::new_inclusive(1.5, 2.5).unwrap();
        for _ in 0..100 {
            let x = d.sample(&mut a);
            assert_eq!(x, range.sample(&mut b));
            assert!((1.5..=2.5).contains(&x));
        }

        let flat = Distribution::Uniform {
            mu: -1.0,
            half_width: 0.0,
        };
        assert_eq!(flat.sample(&mut a), -1.0);
    }

    #[test]
    fn test_names() {
        for name in ["normal", "Gauss", "GAUSSIAN"] {
            assert_eq!(Distribution::from_name(name, 0.0, 1.0).unwrap().name(), "normal");
        }
        for name in ["uniform", "flat", "pp"] {
            assert_eq!(Distribution::from_name(name, 0.0, 1.0).unwrap().name(), "uniform");
        }
        assert_eq!(
            Distribution::from_name("diracdelta", 3.0, 1.0).unwrap(),
            Distribution::Degenerate { value: 3.0 }
        );
        assert!(matches!(
            Distribution::from_name("cauchy", 0.0, 1.0),
            Err(PoaError::UnsupportedDistribution(_))
        ));
    }

    #[test]
    fn test_gaussian_converges() {
        let d = Distribution::Gaussian { mu: 2.0, sigma: 0.5 };
        let mut rng = StdRng::seed_from_u64(1);
        let (mean, var) = mean_var(&d.generate(200_000, &mut rng));
        assert!((mean - 2.0).abs() < 0.01, "mean = {mean}");
        assert!((var.sqrt() - 0.5).abs() < 0.01, "sd = {}", var.sqrt());
    }

    #[test]
    fn test_uniform_converges() {
        let d = Distribution::Uniform { mu: -1.0, half_width: 3.0 };
        let mut rng = StdRng::seed_from_u64(2);
        let samples = d.generate(200_000, &mut rng);
        assert!(samples.iter().all(|&s| (-4.0..2.0).contains(&s)));
        let (mean, var) = mean_var(&samples);
        assert!((mean + 1.0).abs() < 0.02, "mean = {mean}");
        assert!((var.sqrt() - d.sd()).abs() < 0.02, "sd = {}", var.sqrt());
    }

    #[test]
    fn test_scaled_preserves_family() {
        let d = Distribution::Uniform { mu: 0.2, half_width: 1e-6 };
        let mm = d.scaled(1e3).unwrap();
        match mm {
            Distribution::Uniform { mu, half_width } => {
                assert!((mu - 200.0).abs() < 1e-9);
                assert!((half_width - 1e-3).abs() < 1e-15);
            }
            other => panic!("family changed: {other:?}"),
        }
    }

    #[test]
    fn test_fwhm_relations() {
        let g = Distribution::Gaussian { mu: 0.0, sigma: 1.0 };
        assert!((g.fwhm() - 2.354_820_045).abs() < 1e-8);
        let u = Distribution::Uniform { mu: 0.0, half_width: 0.5 };
        assert!((u.fwhm() - 1.0).abs() < 1e-15);
    }
}
