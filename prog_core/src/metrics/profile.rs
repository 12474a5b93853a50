// prog_core/src/metrics/profile.rs

//! Metrics over a [`ToEPredictionProfile`]: how prediction accuracy evolves as
//! the system approaches its events.

use rand::Rng;
use std::collections::BTreeMap;

use crate::error::{ProgError, Result};
use crate::prediction::ToEPredictionProfile;
use crate::types::NamedVector;
use crate::uncertain_data::UncertainData;

/// Alpha-lambda metric.
///
/// Evaluated on the first prediction issued at or after `lambda`: an event
/// passes when at least `beta` of its predicted time-of-event distribution
/// lies within `ground_truth ± alpha * (ground_truth - issue_time)`
/// (inclusive). Returns `None` when no prediction was issued at or after
/// `lambda`.
///
/// # Arguments
/// * `ground_truth`: True event times, keyed by event. Every predicted event
///   needs one.
/// * `alpha`: Allowed relative error on the remaining time (0.2 is 20%).
/// * `beta`: Fraction of the distribution that must be within bounds.
/// * `n_samples`: Draws used for continuous distributions.
pub fn alpha_lambda<R: Rng + ?Sized>(
    profile: &ToEPredictionProfile,
    ground_truth: &NamedVector,
    lambda: f64,
    alpha: f64,
    beta: f64,
    n_samples: usize,
    rng: &mut R,
) -> Result<Option<BTreeMap<String, bool>>> {
    let Some((t_prediction, toe)) = profile.iter().find(|(t, _)| *t >= lambda) else {
        return Ok(None);
    };

    let bounds = toe
        .keys()
        .iter()
        .map(|key| {
            let gt = ground_truth
                .get(key)
                .ok_or_else(|| ProgError::UnknownEvent(key.clone()))?;
            let a = gt - alpha * (gt - t_prediction);
            let b = gt + alpha * (gt - t_prediction);
            Ok((a.min(b), a.max(b)))
        })
        .collect::<Result<Vec<_>>>()?;
    let in_bounds = toe.percentage_in_bounds(&bounds, n_samples, rng)?;

    Ok(Some(
        toe.keys()
            .iter()
            .cloned()
            .zip(in_bounds.into_iter().map(|p| p >= beta))
            .collect(),
    ))
}

/// Prognostic horizon: per event, how long before the true event time the
/// predictions first satisfied `criteria`.
///
/// Entries are scanned in increasing issue time; `criteria(issue_time, toe)`
/// reports which events pass at that entry. The horizon of an event is
/// `ground_truth - issue_time` at its first passing entry, or `None` if it
/// never passes.
pub fn prognostic_horizon<F>(
    profile: &ToEPredictionProfile,
    mut criteria: F,
    ground_truth: &NamedVector,
) -> Result<BTreeMap<String, Option<f64>>>
where
    F: FnMut(f64, &UncertainData) -> Result<BTreeMap<String, bool>>,
{
    let mut result: BTreeMap<String, Option<f64>> =
        ground_truth.keys().iter().map(|k| (k.clone(), None)).collect();

    for (t_prediction, toe) in profile.iter() {
        for (key, passed) in criteria(t_prediction, toe)? {
            if let (true, Some(gt), Some(slot)) = (passed, ground_truth.get(&key), result.get_mut(&key)) {
                if slot.is_none() {
                    *slot = Some(gt - t_prediction);
                }
            }
        }
        if result.values().all(Option::is_some) {
            break;
        }
    }
    Ok(result)
}

/// Cumulative relative accuracy: the mean over every profile entry of
/// `1 - |ground_truth - mean| / ground_truth`, per event.
///
/// Entries whose mean is undefined for an event are left out of that event's
/// average; an event with no defined mean at all reads `None`.
pub fn cumulative_relative_accuracy(
    profile: &ToEPredictionProfile,
    ground_truth: &NamedVector,
) -> Result<BTreeMap<String, Option<f64>>> {
    if profile.is_empty() {
        return Err(ProgError::EmptyData("cumulative relative accuracy of an empty profile"));
    }
    let means: Vec<NamedVector> = profile.values().iter().map(|toe| toe.mean()).collect();

    Ok(ground_truth
        .iter()
        .map(|(key, gt)| {
            let accuracies: Vec<f64> = means
                .iter()
                .filter_map(|mean| mean.get(key))
                .map(|m| 1.0 - (gt - m).abs() / gt)
                .collect();
            let cra = (!accuracies.is_empty())
                .then(|| accuracies.iter().sum::<f64>() / accuracies.len() as f64);
            (key.to_string(), cra)
        })
        .collect())
}

/// Monotonicity: `|sum(sign(mean[i+1] - mean[i]))| / (N - 1)` per event, over
/// the means of consecutive profile entries.
///
/// 1.0 means the predicted time of event moved consistently in one direction.
/// Entries with an undefined mean are left out; an event with fewer than two
/// defined means reads `None`.
pub fn monotonicity(profile: &ToEPredictionProfile) -> Result<BTreeMap<String, Option<f64>>> {
    if profile.len() < 2 {
        return Err(ProgError::EmptyData("monotonicity needs at least two predictions"));
    }
    let means: Vec<NamedVector> = profile.values().iter().map(|toe| toe.mean()).collect();
    let keys = profile.values()[0].keys().to_vec();

    Ok(keys
        .into_iter()
        .map(|key| {
            let series: Vec<f64> = means.iter().filter_map(|m| m.get(&key)).collect();
            let value = (series.len() >= 2).then(|| {
                let signs: f64 = series.windows(2).map(|w| sign(w[1] - w[0])).sum();
                signs.abs() / (series.len() - 1) as f64
            });
            (key, value)
        })
        .collect())
}

fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}
