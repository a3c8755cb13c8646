use serde::{Deserialize, Serialize};

/// Min-max scaler for a single numeric attribute.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    pub min: f64,
    pub max: f64,
}

impl MinMaxScaler {
    /// Returns `None` when there is nothing to fit on.
    pub fn fit(values: &[f64]) -> Option<Self> {
        let mut iter = values.iter().copied().filter(|v| v.is_finite());
        let first = iter.next()?;
        let (min, max) = iter.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
        Some(Self { min, max })
    }

    /// Maps into [0, 1]. A zero range maps every value to 0.0.
    pub fn transform(&self, value: f64) -> f32 {
        let range = self.max - self.min;
        if range <= 0.0 || !value.is_finite() {
            return 0.0;
        }
        ((value - self.min) / range).clamp(0.0, 1.0) as f32
    }

    pub fn is_consistent(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min <= self.max
    }
}
