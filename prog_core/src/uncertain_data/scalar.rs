// prog_core/src/uncertain_data/scalar.rs

use nalgebra::DMatrix;

use super::UnweightedSamples;
use crate::error::Result;
use crate::types::NamedVector;

/// Data without uncertainty: a single value per key (a point mass).
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarData {
    value: NamedVector,
}

impl ScalarData {
    pub fn new(value: NamedVector) -> Self {
        Self { value }
    }

    pub fn keys(&self) -> &[String] {
        self.value.keys()
    }

    pub fn mean(&self) -> NamedVector {
        self.value.clone()
    }

    pub fn median(&self) -> NamedVector {
        self.value.clone()
    }

    /// A point mass has no spread: the all-zero matrix.
    pub fn cov(&self) -> DMatrix<f64> {
        DMatrix::zeros(self.value.len(), self.value.len())
    }

    /// Replicates the value `num_samples` times.
    pub fn sample(&self, num_samples: usize) -> UnweightedSamples {
        UnweightedSamples::from_parts_unchecked(
            self.keys().to_vec(),
            vec![self.value.values().clone(); num_samples],
        )
    }

    /// 1.0 for every key whose value lies inside its (inclusive) bounds, 0.0 otherwise.
    pub fn percentage_in_bounds(&self, bounds: &[(f64, f64)]) -> Result<Vec<f64>> {
        let bounds = super::expand_bounds(bounds, self.value.len())?;
        Ok(self
            .value
            .values()
            .iter()
            .zip(bounds.iter())
            .map(|(x, (lo, hi))| if *lo <= *x && *x <= *hi { 1.0 } else { 0.0 })
            .collect())
    }
}
