//! Arbitrary-shape distribution built from a tabulated probability density.
//!
//! The tabulated density is normalized to unit area and interpolated with a
//! natural cubic spline that evaluates to zero outside the tabulated
//! interval. Samples are drawn by rejection: candidates `(x, y)` are uniform
//! over the bounding rectangle `[x0, x1] × [0, peak]` and `x` is kept when
//! `y` falls under the interpolated density.

use rand::Rng;

use crate::error::{PoaError, Result};

/// Upper bound on the candidate batch drawn per rejection round.
pub const MAX_CANDIDATE_BATCH: usize = 100_000;

/// Grid steps used to scan the spline for its maximum and half-maximum
/// crossings.
const SCAN_STEPS: usize = 2048;

/// Conversion from full width at half maximum to an equivalent Gaussian σ.
pub const FWHM_TO_SIGMA: f64 = 0.424_660_900_144_009_5; // 1 / (2·sqrt(2·ln 2))

/// Natural cubic spline through `(x_i, y_i)`; zero outside `[x_0, x_n]`.
#[derive(Debug, Clone, PartialEq)]
pub struct CubicSpline {
    x: Vec<f64>,
    y: Vec<f64>,
    /// Second derivatives at the knots.
    m: Vec<f64>,
}

impl CubicSpline {
    /// Build the spline. `x` must be strictly increasing with at least 3 knots.
    pub fn new(x: &[f64], y: &[f64]) -> Result<Self> {
        if x.len() != y.len() {
            return Err(PoaError::ShapeMismatch(format!(
                "spline abscissa has {} samples but ordinate has {}",
                x.len(),
                y.len()
            )));
        }
        let n = x.len();
        if n < 3 {
            return Err(PoaError::ShapeMismatch(format!(
                "spline needs at least 3 knots, got {n}"
            )));
        }
        if x.windows(2).any(|w| w[1] <= w[0]) {
            return Err(PoaError::ShapeMismatch(
                "spline abscissa must be strictly increasing".into(),
            ));
        }

        // Tridiagonal system for the interior second derivatives (Thomas algorithm)
        let mut m = vec![0.0; n];
        let mut c_prime = vec![0.0; n];
        let mut d_prime = vec![0.0; n];
        for i in 1..n - 1 {
            let h0 = x[i] - x[i - 1];
            let h1 = x[i + 1] - x[i];
            let a = h0;
            let b = 2.0 * (h0 + h1);
            let c = h1;
            let d = 6.0 * ((y[i + 1] - y[i]) / h1 - (y[i] - y[i - 1]) / h0);
            let denom = b - a * c_prime[i - 1];
            c_prime[i] = c / denom;
            d_prime[i] = (d - a * d_prime[i - 1]) / denom;
        }
        for i in (1..n - 1).rev() {
            m[i] = d_prime[i] - c_prime[i] * m[i + 1];
        }

        Ok(Self {
            x: x.to_vec(),
            y: y.to_vec(),
            m,
        })
    }

    pub fn eval(&self, t: f64) -> f64 {
        let n = self.x.len();
        if !(t >= self.x[0] && t <= self.x[n - 1]) {
            return 0.0;
        }
        // Index of the interval [x_k, x_{k+1}] containing t
        let k = self.x.partition_point(|&xi| xi <= t).clamp(1, n - 1) - 1;
        let h = self.x[k + 1] - self.x[k];
        let a = (self.x[k + 1] - t) / h;
        let b = (t - self.x[k]) / h;
        a * self.y[k]
            + b * self.y[k + 1]
            + ((a * a * a - a) * self.m[k] + (b * b * b - b) * self.m[k + 1]) * h * h / 6.0
    }
}

/// Trapezoid-rule integral of `y` over `x`.
fn trapz(x: &[f64], y: &[f64]) -> f64 {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xw, yw)| 0.5 * (xw[1] - xw[0]) * (yw[0] + yw[1]))
        .sum()
}

/// Distribution described by a tabulated density.
#[derive(Debug, Clone, PartialEq)]
pub struct ArbitraryDistribution {
    x: Vec<f64>,
    p: Vec<f64>,
    spline: CubicSpline,
    peak: f64,
    acceptance: f64,
    mu: f64,
    sigma: f64,
    fwhm: f64,
}

impl ArbitraryDistribution {
    /// Build a distribution from samples of its (unnormalized) density.
    pub fn new(x: Vec<f64>, p: Vec<f64>) -> Result<Self> {
        if x.len() != p.len() {
            return Err(PoaError::ShapeMismatch(format!(
                "X sample point vector ({}) does not match density ({})",
                x.len(),
                p.len()
            )));
        }
        if p.iter().any(|&v| !(v >= 0.0) || !v.is_finite()) {
            return Err(PoaError::ShapeMismatch(
                "density samples must be finite and non-negative".into(),
            ));
        }
        if x.len() < 3 {
            return Err(PoaError::ShapeMismatch(format!(
                "tabulated density needs at least 3 samples, got {}",
                x.len()
            )));
        }

        let area = trapz(&x, &p);
        if !(area > 0.0) {
            return Err(PoaError::ShapeMismatch(
                "tabulated density has zero area".into(),
            ));
        }
        let p: Vec<f64> = p.iter().map(|v| v / area).collect();
        let spline = CubicSpline::new(&x, &p)?;

        // the spline can overshoot its knots
        let peak = spline_peak(&spline, x[0], x[x.len() - 1])
            .max(p.iter().cloned().fold(0.0_f64, f64::max));
        let width = x[x.len() - 1] - x[0];
        // Normalized area is 1, so acceptance is the density's share of the box
        let acceptance = 1.0 / (width * peak);

        let xp: Vec<f64> = x.iter().zip(&p).map(|(a, b)| a * b).collect();
        let mu = trapz(&x, &xp);
        let var_integrand: Vec<f64> = x
            .iter()
            .zip(&p)
            .map(|(a, b)| (a - mu) * (a - mu) * b)
            .collect();
        let sigma = trapz(&x, &var_integrand).max(0.0).sqrt();

        let fwhm = find_fwhm(&spline, x[0], x[x.len() - 1], peak);

        Ok(Self {
            x,
            p,
            spline,
            peak,
            acceptance,
            mu,
            sigma,
            fwhm,
        })
    }

    pub fn mu(&self) -> f64 {
        self.mu
    }

    /// Standard deviation from the tabulated moments.
    pub fn sd(&self) -> f64 {
        self.sigma
    }

    pub fn fwhm(&self) -> f64 {
        self.fwhm
    }

    /// Standard deviation of a Gaussian with the same FWHM.
    pub fn equivalent_sigma(&self) -> f64 {
        self.fwhm * FWHM_TO_SIGMA
    }

    /// Height of the rejection box: the maximum of the interpolated density.
    pub fn peak(&self) -> f64 {
        self.peak
    }

    /// Fraction of bounding-box candidates expected to be accepted.
    pub fn acceptance_ratio(&self) -> f64 {
        self.acceptance
    }

    /// Interpolated (normalized) density.
    pub fn density(&self, x: f64) -> f64 {
        self.spline.eval(x)
    }

    /// Same shape mapped through `x → offset + scale · (x − mu)`.
    ///
    /// Used for unit conversions (`offset = scale · mu`) and for re-centering.
    pub fn remapped(&self, scale: f64, new_mu: f64) -> Result<Self> {
        let flip = scale < 0.0;
        let mut pairs: Vec<(f64, f64)> = self
            .x
            .iter()
            .zip(&self.p)
            .map(|(&xi, &pi)| (new_mu + scale * (xi - self.mu), pi))
            .collect();
        if flip {
            pairs.reverse();
        }
        let (x, p): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
        Self::new(x, p)
    }

    /// Draw `n` samples by rejection.
    pub fn generate<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<f64> {
        let mut out = Vec::with_capacity(n);
        if n == 0 {
            return out;
        }
        let x0 = self.x[0];
        let width = self.x[self.x.len() - 1] - x0;
        let batch = ((n as f64 / self.acceptance).ceil() as usize).clamp(1, MAX_CANDIDATE_BATCH);

        while out.len() < n {
            for _ in 0..batch {
                let cx = x0 + width * rng.random::<f64>();
                let cy = self.peak * rng.random::<f64>();
                if cy <= self.spline.eval(cx) {
                    out.push(cx);
                    if out.len() == n {
                        break;
                    }
                }
            }
        }
        out
    }
}

/// Largest value of the spline on a uniform grid over `[lo, hi]`.
fn spline_peak(spline: &CubicSpline, lo: f64, hi: f64) -> f64 {
    let step = (hi - lo) / SCAN_STEPS as f64;
    (0..=SCAN_STEPS)
        .map(|i| spline.eval(lo + step * i as f64))
        .fold(0.0_f64, f64::max)
}

/// Width between the outermost half-maximum crossings of the spline.
fn find_fwhm(spline: &CubicSpline, lo: f64, hi: f64, peak: f64) -> f64 {
    let half = 0.5 * peak;
    let f = |t: f64| spline.eval(t) - half;
    let step = (hi - lo) / SCAN_STEPS as f64;

    let mut crossings = Vec::new();
    let mut t_prev = lo;
    let mut f_prev = f(lo);
    for i in 1..=SCAN_STEPS {
        let t = lo + step * i as f64;
        let ft = f(t);
        if (f_prev < 0.0) != (ft < 0.0) {
            crossings.push(bisect(&f, t_prev, t));
        }
        t_prev = t;
        f_prev = ft;
    }

    match (crossings.first(), crossings.last()) {
        (Some(a), Some(b)) if b > a => b - a,
        // Density never drops below half maximum inside the table
        _ => hi - lo,
    }
}

fn bisect<F: Fn(f64) -> f64>(f: &F, mut a: f64, mut b: f64) -> f64 {
    let fa_neg = f(a) < 0.0;
    for _ in 0..60 {
        let mid = 0.5 * (a + b);
        if (f(mid) < 0.0) == fa_neg {
            a = mid;
        } else {
            b = mid;
        }
    }
    0.5 * (a + b)
}
