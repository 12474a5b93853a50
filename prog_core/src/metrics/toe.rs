// prog_core/src/metrics/toe.rs

use rand::Rng;
use std::collections::BTreeMap;

use crate::error::{ProgError, Result};
use crate::uncertain_data::UncertainData;

/// Probability that each event has not occurred by `time`.
///
/// Undefined event times (the event was never reached) count as success.
/// Continuous distributions are estimated from `n_samples` draws.
pub fn prob_success<R: Rng + ?Sized>(
    toe: &UncertainData,
    time: f64,
    n_samples: usize,
    rng: &mut R,
) -> Result<BTreeMap<String, f64>> {
    let samples = toe.to_samples(n_samples, rng)?;
    if samples.is_empty() {
        return Err(ProgError::EmptyData("probability of success of an empty distribution"));
    }
    let n = samples.len() as f64;
    Ok(toe
        .keys()
        .iter()
        .enumerate()
        .map(|(i, key)| {
            let survived = samples
                .iter()
                .filter(|s| s[i].is_nan() || s[i] > time)
                .count();
            (key.clone(), survived as f64 / n)
        })
        .collect())
}
