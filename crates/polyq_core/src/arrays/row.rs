use std::fmt;

use serde::{Deserialize, Serialize};

use super::scalar::ScalarValue;

/// A single row of values, addressed positionally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Row {
    pub values: Vec<ScalarValue>,
}

impl Row {
    pub fn new(values: Vec<ScalarValue>) -> Self {
        Row { values }
    }

    /// Create a row of `width` NULL values.
    pub fn nulls(width: usize) -> Self {
        Row {
            values: vec![ScalarValue::Null; width],
        }
    }

    /// Concatenate two rows, left values first.
    pub fn concat(left: &Row, right: &Row) -> Self {
        let mut values = Vec::with_capacity(left.values.len() + right.values.len());
        values.extend_from_slice(&left.values);
        values.extend_from_slice(&right.values);
        Row { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&ScalarValue> {
        self.values.get(idx)
    }

    /// Project the values at `positions` into a new vector.
    pub fn project(&self, positions: &[usize]) -> Vec<ScalarValue> {
        positions
            .iter()
            .map(|&idx| self.values.get(idx).cloned().unwrap_or(ScalarValue::Null))
            .collect()
    }
}

impl FromIterator<ScalarValue> for Row {
    fn from_iter<T: IntoIterator<Item = ScalarValue>>(iter: T) -> Self {
        Row {
            values: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (idx, value) in self.values.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{value}")?;
        }
        write!(f, ")")
    }
}

/// Create a row from a list of values convertible into scalars.
///
/// `row![1_i64, "a", None::<i64>]`
#[macro_export]
macro_rules! row {
    ($($value:expr),* $(,)?) => {
        $crate::arrays::row::Row::new(vec![$($crate::arrays::scalar::ScalarValue::from($value)),*])
    };
}
