// prog_core/src/estimation/resampling.rs

use rand::Rng;
use serde::Deserialize;

/// How the particle filter picks survivors from a weighted particle set.
///
/// Every strategy takes normalized weights and returns exactly as many
/// particle indices as there are weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResamplingStrategy {
    /// Deterministic integer copies of `N * w`, remainder drawn from the residuals.
    #[default]
    Residual,
    /// One uniform offset, `N` evenly spaced positions.
    Systematic,
    /// `N` independent draws proportional to weight.
    Multinomial,
}

impl ResamplingStrategy {
    pub fn resample<R: Rng + ?Sized>(&self, weights: &[f64], rng: &mut R) -> Vec<usize> {
        match self {
            Self::Residual => residual_resample(weights, rng),
            Self::Systematic => systematic_resample(weights, rng),
            Self::Multinomial => multinomial_resample(weights, rng),
        }
    }
}

fn cumulative_sum(weights: &[f64]) -> Vec<f64> {
    let mut cumsum: Vec<f64> = weights
        .iter()
        .scan(0.0, |acc, w| {
            *acc += w;
            Some(*acc)
        })
        .collect();
    // Round-off can leave the total just below 1. Close it at the last
    // positive weight so trailing zero-weight particles stay unreachable.
    if let Some(last) = weights.iter().rposition(|w| *w > 0.0) {
        cumsum[last..].fill(1.0);
    }
    cumsum
}

/// Index of the first cumulative weight strictly above `u`.
fn search_sorted(cumsum: &[f64], u: f64) -> usize {
    cumsum
        .partition_point(|c| *c <= u)
        .min(cumsum.len().saturating_sub(1))
}

pub fn residual_resample<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> Vec<usize> {
    let n = weights.len();
    let mut indexes = Vec::with_capacity(n);

    // --- 1. Deterministic copies ---
    let num_copies: Vec<usize> = weights.iter().map(|w| (n as f64 * w).floor() as usize).collect();
    for (i, copies) in num_copies.iter().enumerate() {
        for _ in 0..*copies {
            if indexes.len() < n {
                indexes.push(i);
            }
        }
    }

    // --- 2. Multinomial draws on the residuals ---
    let remaining = n - indexes.len();
    if remaining > 0 {
        let residual: Vec<f64> = weights
            .iter()
            .zip(&num_copies)
            .map(|(w, c)| n as f64 * w - *c as f64)
            .collect();
        let total: f64 = residual.iter().sum();
        let residual: Vec<f64> = if total > 0.0 {
            residual.iter().map(|r| r / total).collect()
        } else {
            weights.to_vec()
        };
        let cumsum = cumulative_sum(&residual);
        for _ in 0..remaining {
            indexes.push(search_sorted(&cumsum, rng.gen::<f64>()));
        }
    }

    indexes
}

pub fn systematic_resample<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> Vec<usize> {
    let n = weights.len();
    if n == 0 {
        return Vec::new();
    }
    let offset: f64 = rng.gen();
    let cumsum = cumulative_sum(weights);
    let mut indexes = Vec::with_capacity(n);
    let mut j = 0;
    for i in 0..n {
        let position = (offset + i as f64) / n as f64;
        while j < n - 1 && position >= cumsum[j] {
            j += 1;
        }
        indexes.push(j);
    }
    indexes
}

pub fn multinomial_resample<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> Vec<usize> {
    let cumsum = cumulative_sum(weights);
    (0..weights.len())
        .map(|_| search_sorted(&cumsum, rng.gen::<f64>()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    const STRATEGIES: [ResamplingStrategy; 3] = [
        ResamplingStrategy::Residual,
        ResamplingStrategy::Systematic,
        ResamplingStrategy::Multinomial,
    ];

    #[test]
    fn test_count_is_preserved() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let weights = [0.1, 0.2, 0.05, 0.4, 0.25];
        for strategy in STRATEGIES {
            let idx = strategy.resample(&weights, &mut rng);
            assert_eq!(idx.len(), weights.len());
            assert!(idx.iter().all(|i| *i < weights.len()));
        }
    }

    #[test]
    fn test_zero_weight_particles_never_survive() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let weights = [0.0, 0.5, 0.0, 0.5];
        for strategy in STRATEGIES {
            for _ in 0..20 {
                let idx = strategy.resample(&weights, &mut rng);
                assert!(idx.iter().all(|i| *i == 1 || *i == 3));
            }
        }
    }

    #[test]
    fn test_cumulative_sum_closes_at_last_positive_weight() {
        let cumsum = cumulative_sum(&[0.7, 0.2, 0.1, 0.0]);
        assert_eq!(&cumsum[2..], &[1.0, 1.0]);
        // The largest draw below 1 still lands on a weighted particle.
        assert_eq!(search_sorted(&cumsum, 1.0 - f64::EPSILON / 2.0), 2);
        assert_eq!(cumulative_sum(&[0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_residual_assigns_integer_copies() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let idx = residual_resample(&[0.5, 0.25, 0.25, 0.0], &mut rng);
        assert_eq!(idx, vec![0, 0, 1, 2]);
    }
}
