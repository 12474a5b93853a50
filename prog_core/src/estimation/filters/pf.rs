// prog_core/src/estimation/filters/pf.rs

use nalgebra::{DMatrix, DVector};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::Deserialize;
use std::f64::consts::PI;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{ProgError, Result};
use crate::estimation::resampling::ResamplingStrategy;
use crate::estimation::{samples_in_model_order, step_dt, MeasurementEqn, StateEstimator};
use crate::models::{check_model, PrognosticsModel};
use crate::types::{Input, Output, State};
use crate::uncertain_data::{UncertainData, UnweightedSamples};

/// A standard deviation given once for every output, or once per output.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum NoiseStd {
    Scalar(f64),
    PerOutput(Vec<f64>),
}

impl NoiseStd {
    fn expand(&self, n: usize) -> Result<DVector<f64>> {
        let std = match self {
            Self::Scalar(s) => DVector::from_element(n, *s),
            Self::PerOutput(v) if v.len() == n => DVector::from_column_slice(v),
            Self::PerOutput(v) => {
                return Err(ProgError::DimensionMismatch {
                    context: "particle filter measurement noise",
                    expected: n,
                    actual: v.len(),
                })
            }
        };
        if std.iter().any(|s| !(*s > 0.0)) {
            return Err(ProgError::InvalidConfig(
                "particle filter measurement noise must be positive".into(),
            ));
        }
        Ok(std)
    }
}

/// Settings of the particle filter.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParticleFilterConfig {
    pub num_particles: usize,
    /// Standard deviation of the Gaussian likelihood of each measured output.
    pub measurement_noise: NoiseStd,
    /// Standard deviation used to spread a point-mass initial state.
    pub x0_uncertainty: f64,
    /// Time of the initial state (s).
    pub t0: f64,
    /// Seed of the filter's random generator. Drawn from entropy when absent.
    pub seed: Option<u64>,
    pub resampling: ResamplingStrategy,
}

impl Default for ParticleFilterConfig {
    fn default() -> Self {
        Self {
            num_particles: 20,
            measurement_noise: NoiseStd::Scalar(0.1),
            x0_uncertainty: 0.5,
            t0: 0.0,
            seed: None,
            resampling: ResamplingStrategy::Residual,
        }
    }
}

/// Converts per-particle log-likelihoods into normalized weights.
///
/// The largest log-likelihood is subtracted before exponentiating so extreme
/// but legitimate likelihoods do not all underflow to zero. Non-finite
/// log-likelihoods get zero weight. When no particle has a finite
/// log-likelihood the weights are degenerate.
pub fn normalize_log_weights(log_weights: &[f64]) -> Result<Vec<f64>> {
    let max = log_weights
        .iter()
        .copied()
        .filter(|l| l.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return Err(ProgError::DegenerateWeights);
    }

    let weights: Vec<f64> = log_weights
        .iter()
        .map(|l| if l.is_finite() { (l - max).exp() } else { 0.0 })
        .collect();
    let total: f64 = weights.iter().sum();
    if !(total > 0.0) {
        return Err(ProgError::DegenerateWeights);
    }
    Ok(weights.into_iter().map(|w| w / total).collect())
}

/// A sequential importance resampling particle filter.
///
/// Each step propagates every particle through the model with process noise,
/// weights it by the Gaussian likelihood of the measurement, and resamples.
/// The particle set is replaced wholesale and weights return to uniform.
pub struct ParticleFilter {
    model: Arc<dyn PrognosticsModel>,
    measurement_eqn: Option<MeasurementEqn>,
    noise_std: DVector<f64>,
    resampling: ResamplingStrategy,
    rng: ChaCha8Rng,

    // --- Filter state ---
    /// One column per particle, rows in model state order.
    particles: DMatrix<f64>,
    t: f64,
}

impl ParticleFilter {
    pub fn new(model: Arc<dyn PrognosticsModel>, x0: UncertainData, config: ParticleFilterConfig) -> Result<Self> {
        Self::with_measurement_eqn(model, x0, None, config)
    }

    /// # Arguments
    /// * `model`: The model particles are propagated through.
    /// * `x0`: Initial state. A point mass is spread with `x0_uncertainty`; any
    ///   other distribution is sampled `num_particles` times.
    /// * `measurement_eqn`: Replaces the model's output in the likelihood.
    /// * `config`: Filter settings.
    pub fn with_measurement_eqn(
        model: Arc<dyn PrognosticsModel>,
        x0: UncertainData,
        measurement_eqn: Option<MeasurementEqn>,
        config: ParticleFilterConfig,
    ) -> Result<Self> {
        check_model(model.as_ref())?;
        if config.num_particles == 0 {
            return Err(ProgError::InvalidConfig("num_particles must be at least 1".into()));
        }
        if !(config.x0_uncertainty >= 0.0) {
            return Err(ProgError::InvalidConfig(
                "x0_uncertainty must be non-negative".into(),
            ));
        }
        let mut rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        // --- 1. Draw the initial particles ---
        let n_particles = config.num_particles;
        let particles: Vec<State> = match &x0 {
            UncertainData::Scalar(point) => {
                let mean = point.mean().reorder(model.states())?;
                (0..n_particles)
                    .map(|_| {
                        mean.map(|m| m + config.x0_uncertainty * rng.sample::<f64, _>(StandardNormal))
                    })
                    .collect()
            }
            other => {
                let drawn = other.sample(n_particles, &mut rng)?;
                samples_in_model_order(model.as_ref(), &drawn)?
            }
        };
        let particles = DMatrix::from_columns(&particles);

        // --- 2. Size the likelihood by what is measured ---
        let n_z = match &measurement_eqn {
            Some(measure) => measure(&particles.column(0).into_owned()).nrows(),
            None => model.outputs().len(),
        };
        let noise_std = config.measurement_noise.expand(n_z)?;

        Ok(Self {
            model,
            measurement_eqn,
            noise_std,
            resampling: config.resampling,
            rng,
            particles,
            t: config.t0,
        })
    }

    pub fn num_particles(&self) -> usize {
        self.particles.ncols()
    }

    /// Predicted measurement of every particle, one column per particle.
    fn measure_all(&self) -> DMatrix<f64> {
        match &self.measurement_eqn {
            None => self.model.output_batch(&self.particles),
            Some(measure) => {
                let columns: Vec<DVector<f64>> = self
                    .particles
                    .column_iter()
                    .map(|p| measure(&p.into_owned()))
                    .collect();
                DMatrix::from_columns(&columns)
            }
        }
    }

    /// Sum over outputs of the Gaussian log-density of `z` around each prediction.
    fn log_likelihoods(&self, z_pred: &DMatrix<f64>, z: &Output) -> Vec<f64> {
        z_pred
            .column_iter()
            .map(|zp| {
                zp.iter()
                    .zip(z.iter())
                    .zip(self.noise_std.iter())
                    .map(|((mu, obs), sigma)| {
                        let r = (obs - mu) / sigma;
                        -0.5 * r * r - sigma.ln() - 0.5 * (2.0 * PI).ln()
                    })
                    .sum()
            })
            .collect()
    }
}

impl StateEstimator for ParticleFilter {
    fn estimate(&mut self, t: f64, u: &Input, z: &Output) -> Result<()> {
        let dt = step_dt(self.t, t)?;
        if z.nrows() != self.noise_std.nrows() {
            return Err(ProgError::DimensionMismatch {
                context: "particle filter measurement",
                expected: self.noise_std.nrows(),
                actual: z.nrows(),
            });
        }

        // --- 1. Propagate every particle, with process noise ---
        let propagated = self.model.next_state_batch(&self.particles, u, dt);
        for (i, particle) in propagated.column_iter().enumerate() {
            let noisy = self
                .model
                .apply_process_noise(&particle.into_owned(), dt, &mut self.rng);
            self.particles.set_column(i, &self.model.apply_limits(noisy));
        }

        // --- 2. Weight against the measurement (current step only) ---
        let z_pred = self.measure_all();
        let log_weights = self.log_likelihoods(&z_pred, z);
        let weights = normalize_log_weights(&log_weights)?;
        let ess = 1.0 / weights.iter().map(|w| w * w).sum::<f64>();
        if ess < 2.0 && self.num_particles() > 2 {
            warn!(t, ess, "Particle weights collapsed onto very few particles");
        }

        // --- 3. Resample and replace the particle set ---
        let indexes = self.resampling.resample(&weights, &mut self.rng);
        let resampled: Vec<DVector<f64>> = indexes
            .iter()
            .map(|i| self.particles.column(*i).into_owned())
            .collect();
        self.particles = DMatrix::from_columns(&resampled);
        self.t = t;
        debug!(t, ess, particles = self.num_particles(), "Particle filter step");
        Ok(())
    }

    fn x(&self) -> UncertainData {
        UncertainData::Samples(UnweightedSamples::from_parts_unchecked(
            self.model.states().to_vec(),
            self.particles.column_iter().map(|c| c.into_owned()).collect(),
        ))
    }

    fn t(&self) -> f64 {
        self.t
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ThrownObject, ThrownObjectParams};
    use crate::types::{names, NamedVector};
    use crate::uncertain_data::MultivariateNormalDist;
    use approx::assert_abs_diff_eq;

    fn model() -> Arc<dyn PrognosticsModel> {
        Arc::new(ThrownObject::new(ThrownObjectParams {
            process_noise: 5.0,
            measurement_noise: 1.0,
            ..Default::default()
        }))
    }

    #[test]
    fn test_weights_sum_to_one() {
        let cases: [&[f64]; 4] = [
            &[0.0, -1.0, -2.0],
            &[-1000.0, -1001.0, -5000.0],
            &[f64::NEG_INFINITY, -3.0, 2.0],
            &[700.0, 710.0],
        ];
        for log_w in cases {
            let w = normalize_log_weights(log_w).unwrap();
            assert_abs_diff_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
            assert!(w.iter().all(|x| (0.0..=1.0).contains(x)));
        }
        assert_eq!(
            normalize_log_weights(&[f64::NEG_INFINITY, f64::NAN]),
            Err(ProgError::DegenerateWeights)
        );
    }

    #[test]
    fn test_tracks_thrown_object() {
        let m = model();
        let x0: UncertainData = NamedVector::from_pairs([("x", 1.75), ("v", 38.5)]).into();
        let config = ParticleFilterConfig {
            num_particles: 1000,
            measurement_noise: NoiseStd::Scalar(1.0),
            x0_uncertainty: 2.0,
            seed: Some(7),
            ..Default::default()
        };
        let mut filt = ParticleFilter::new(m.clone(), x0, config).unwrap();
        assert_eq!(filt.num_particles(), 1000);

        let u = DVector::zeros(0);
        let mut x = m.initialize(&u, &DVector::zeros(1));
        let dt = 0.01;
        for i in 0..1250 {
            x = m.next_state(&x, &u, dt);
            filt.estimate((i + 1) as f64 * dt, &u, &m.output(&x)).unwrap();
            // Resampling keeps the particle count.
            assert_eq!(filt.num_particles(), 1000);
        }

        let est = filt.x().mean();
        assert_abs_diff_eq!(est.get("x").unwrap(), x[0], epsilon = 1.0);
        assert_abs_diff_eq!(est.get("v").unwrap(), x[1], epsilon = 1.0);
    }

    #[test]
    fn test_distribution_prior_is_sampled() {
        let prior = MultivariateNormalDist::new(
            names(&["v", "x"]),
            DVector::from_vec(vec![10.0, 2.0]),
            DMatrix::identity(2, 2),
        )
        .unwrap();
        let config = ParticleFilterConfig {
            num_particles: 20_000,
            seed: Some(3),
            ..Default::default()
        };
        let filt = ParticleFilter::new(model(), prior.into(), config).unwrap();
        let x = filt.x();
        assert_eq!(x.keys(), names(&["x", "v"]).as_slice());
        assert_abs_diff_eq!(x.mean().get("x").unwrap(), 2.0, epsilon = 0.05);
        assert_abs_diff_eq!(x.mean().get("v").unwrap(), 10.0, epsilon = 0.05);
        assert_abs_diff_eq!(x.cov(), DMatrix::identity(2, 2), epsilon = 0.05);
    }

    #[test]
    fn test_point_prior_without_uncertainty_is_replicated() {
        let x0: UncertainData = NamedVector::from_pairs([("x", 1.75), ("v", 38.5)]).into();
        let config = ParticleFilterConfig {
            x0_uncertainty: 0.0,
            seed: Some(1),
            ..Default::default()
        };
        let filt = ParticleFilter::new(model(), x0, config).unwrap();
        assert_eq!(filt.x().cov(), DMatrix::zeros(2, 2));
        assert_eq!(filt.x().mean().get("v"), Some(38.5));
    }

    #[test]
    fn test_degenerate_measurement_is_an_error() {
        let x0: UncertainData = NamedVector::from_pairs([("x", 1.75), ("v", 38.5)]).into();
        let config = ParticleFilterConfig {
            seed: Some(1),
            ..Default::default()
        };
        let mut filt = ParticleFilter::new(model(), x0, config).unwrap();
        let u = DVector::zeros(0);
        assert_eq!(
            filt.estimate(0.1, &u, &DVector::from_vec(vec![f64::NAN])),
            Err(ProgError::DegenerateWeights)
        );
    }
}
