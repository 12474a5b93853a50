// prog_core/src/prediction/profile.rs

use crate::uncertain_data::UncertainData;

/// Time-of-event predictions collected over operational time, keyed by the
/// time each prediction was issued.
///
/// Iteration is always in increasing issue time, whatever the insertion order.
/// Adding a prediction for an issue time already present replaces it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToEPredictionProfile {
    entries: Vec<(f64, UncertainData)>,
}

impl ToEPredictionProfile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the time-of-event distribution predicted at `time_of_prediction`.
    pub fn add_prediction(&mut self, time_of_prediction: f64, toe: UncertainData) {
        match self
            .entries
            .binary_search_by(|(t, _)| t.total_cmp(&time_of_prediction))
        {
            Ok(i) => self.entries[i].1 = toe,
            Err(i) => self.entries.insert(i, (time_of_prediction, toe)),
        }
    }

    pub fn get(&self, time_of_prediction: f64) -> Option<&UncertainData> {
        self.entries
            .binary_search_by(|(t, _)| t.total_cmp(&time_of_prediction))
            .ok()
            .map(|i| &self.entries[i].1)
    }

    /// `(issue time, distribution)` pairs in increasing issue time.
    pub fn iter(&self) -> impl Iterator<Item = (f64, &UncertainData)> + '_ {
        self.entries.iter().map(|(t, d)| (*t, d))
    }

    pub fn keys(&self) -> Vec<f64> {
        self.entries.iter().map(|(t, _)| *t).collect()
    }

    pub fn values(&self) -> Vec<&UncertainData> {
        self.entries.iter().map(|(_, d)| d).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NamedVector;

    fn toe(value: f64) -> UncertainData {
        NamedVector::from_pairs([("eol", value)]).into()
    }

    #[test]
    fn test_iterates_in_issue_time_order() {
        let mut profile = ToEPredictionProfile::new();
        profile.add_prediction(20.0, toe(95.0));
        profile.add_prediction(0.0, toe(110.0));
        profile.add_prediction(10.0, toe(100.0));

        assert_eq!(profile.keys(), vec![0.0, 10.0, 20.0]);
        let means: Vec<f64> = profile
            .iter()
            .map(|(_, d)| d.mean().get("eol").unwrap())
            .collect();
        assert_eq!(means, vec![110.0, 100.0, 95.0]);
        assert_eq!(profile.values().len(), 3);
    }

    #[test]
    fn test_re_adding_replaces() {
        let mut profile = ToEPredictionProfile::new();
        profile.add_prediction(5.0, toe(1.0));
        profile.add_prediction(5.0, toe(2.0));
        assert_eq!(profile.len(), 1);
        assert_eq!(profile.get(5.0), Some(&toe(2.0)));
        assert!(profile.get(6.0).is_none());
    }
}
