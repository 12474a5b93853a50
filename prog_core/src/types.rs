// prog_core/src/types.rs

use nalgebra::DVector;
use std::fmt;

use crate::error::{ProgError, Result};

// --- Core Type Aliases ---
// Every value is ordered by the matching name list of the model
// (`states()`, `inputs()`, `outputs()`, `events()`).
pub type State = DVector<f64>;
pub type Input = DVector<f64>;
pub type Output = DVector<f64>;
pub type EventState = DVector<f64>;

/// A future-loading function: the input applied to the system at time `t`,
/// optionally depending on the state at that time.
pub type FutureLoading<'a> = dyn Fn(f64, &State) -> Input + 'a;

/// A vector of values bundled with the ordered names of its entries.
///
/// This is the keyed view handed to callers: means, medians and point-mass
/// initial states. Internally the algorithms work on the bare `DVector`.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedVector {
    keys: Vec<String>,
    values: DVector<f64>,
}

impl NamedVector {
    pub fn new(keys: Vec<String>, values: DVector<f64>) -> Result<Self> {
        if keys.len() != values.nrows() {
            return Err(ProgError::DimensionMismatch {
                context: "NamedVector::new",
                expected: keys.len(),
                actual: values.nrows(),
            });
        }
        Ok(Self { keys, values })
    }

    pub(crate) fn new_unchecked(keys: Vec<String>, values: DVector<f64>) -> Self {
        debug_assert_eq!(keys.len(), values.nrows());
        Self { keys, values }
    }

    /// Builds a vector from `(key, value)` pairs, keeping their order.
    pub fn from_pairs<K: Into<String>>(pairs: impl IntoIterator<Item = (K, f64)>) -> Self {
        let (keys, values): (Vec<String>, Vec<f64>) =
            pairs.into_iter().map(|(k, v)| (k.into(), v)).unzip();
        Self {
            keys,
            values: DVector::from_vec(values),
        }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn values(&self) -> &DVector<f64> {
        &self.values
    }

    pub fn into_values(self) -> DVector<f64> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Value for `key`. Undefined entries (stored as NaN) read as `None`.
    pub fn get(&self, key: &str) -> Option<f64> {
        self.keys
            .iter()
            .position(|k| k == key)
            .map(|i| self.values[i])
            .filter(|v| !v.is_nan())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.keys
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }

    /// Reorders the values to follow `order`. Every key of `order` must be present.
    pub fn reorder(&self, order: &[String]) -> Result<DVector<f64>> {
        let mut out = DVector::zeros(order.len());
        for (i, key) in order.iter().enumerate() {
            let idx = self
                .keys
                .iter()
                .position(|k| k == key)
                .ok_or_else(|| ProgError::MissingState(key.clone()))?;
            out[i] = self.values[idx];
        }
        Ok(out)
    }
}

impl fmt::Display for NamedVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{k}: {v}")?;
        }
        write!(f, "}}")
    }
}

/// Converts a list of names into owned strings.
pub fn names<S: AsRef<str>>(list: &[S]) -> Vec<String> {
    list.iter().map(|s| s.as_ref().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_maps_nan_to_none() {
        let v = NamedVector::from_pairs([("a", 1.0), ("b", f64::NAN)]);
        assert_eq!(v.get("a"), Some(1.0));
        assert_eq!(v.get("b"), None);
        assert_eq!(v.get("c"), None);
    }

    #[test]
    fn test_reorder_follows_requested_order() {
        let v = NamedVector::from_pairs([("a", 1.0), ("b", 2.0)]);
        let r = v.reorder(&names(&["b", "a"])).unwrap();
        assert_eq!(r.as_slice(), &[2.0, 1.0]);
        assert_eq!(
            v.reorder(&names(&["c"])),
            Err(ProgError::MissingState("c".into()))
        );
    }

    #[test]
    fn test_new_rejects_length_mismatch() {
        assert!(NamedVector::new(names(&["a"]), DVector::from_vec(vec![1.0, 2.0])).is_err());
    }
}
