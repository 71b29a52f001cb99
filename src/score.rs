/// Highest value on the raw rating scale.
pub const MAX_RATING: f64 = 5.0;

/// Scales a raw rating onto 0–100 relative to the best weighted rating its
/// category allows.
pub fn normalize(raw_value: i64, weight: f64) -> f64 {
    let best = MAX_RATING * weight;
    if best <= 0.0 {
        return 0.0;
    }
    round2(raw_value as f64 * weight / best * 100.0)
}

/// Rounds to 2 decimals, halves away from zero.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Running sums for the weighted overall score.
#[derive(Debug, Default, Clone, Copy)]
pub struct WeightedTotals {
    pub weighted_sum: f64,
    pub weight_sum: f64,
    pub count: usize,
}

impl WeightedTotals {
    pub fn add(&mut self, raw_value: i64, weight: f64) {
        self.weighted_sum += raw_value as f64 * weight;
        self.weight_sum += weight;
        self.count += 1;
    }

    /// `None` when nothing with a positive weight was added.
    pub fn score(&self) -> Option<f64> {
        if self.count == 0 || self.weight_sum <= 0.0 {
            return None;
        }
        Some(round2(self.weighted_sum / self.weight_sum / MAX_RATING * 100.0))
    }
}
