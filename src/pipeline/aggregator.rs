use crate::types::{round4, ProcessingSummary, ResultRecord};

/// Prices are summed in ten-thousandths, the resolution they are reported at.
const PRICE_UNITS: f64 = 10_000.0;

/// Largest price magnitude summed as an exact unit count. Larger prices, and
/// unit sums that would overflow, go to the floating-point spill instead.
const EXACT_PRICE_LIMIT: f64 = 1e30;

/// Running statistics over result records.
///
/// `combine` is associative and commutative. Counts, min and max merge
/// exactly, and so does the price sum while it fits in `i128` ten-thousandths
/// (every price below 1e30), so any chunking of a batch folds to the same
/// totals.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SummaryStats {
    pub total_rows: usize,
    pub successful: usize,
    pub failed: usize,
    sum_units: i128,
    sum_spill: f64,
    min_price: Option<f64>,
    max_price: Option<f64>,
}

impl SummaryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: &[ResultRecord]) -> Self {
        let mut stats = Self::new();
        for record in records {
            stats.observe(record);
        }
        stats
    }

    /// Account for one record. Only error-free rows with a finite price feed
    /// the price statistics.
    pub fn observe(&mut self, record: &ResultRecord) {
        self.total_rows += 1;
        match record.calculated_values.option_price {
            Some(price) if record.is_success() && price.is_finite() => {
                self.successful += 1;
                match to_units(price) {
                    Some(units) => self.add_units(units),
                    None => self.sum_spill += price,
                }
                self.min_price = merge(self.min_price, Some(price), f64::min);
                self.max_price = merge(self.max_price, Some(price), f64::max);
            }
            _ => self.failed += 1,
        }
    }

    /// Count `rows` failures at once (used when a whole chunk is lost).
    pub fn observe_failures(&mut self, rows: usize) {
        self.total_rows += rows;
        self.failed += rows;
    }

    /// Merge two partial summaries. Absent min/max act as +inf/-inf.
    pub fn combine(self, other: Self) -> Self {
        let mut out = Self {
            total_rows: self.total_rows + other.total_rows,
            successful: self.successful + other.successful,
            failed: self.failed + other.failed,
            sum_units: self.sum_units,
            sum_spill: self.sum_spill + other.sum_spill,
            min_price: merge(self.min_price, other.min_price, f64::min),
            max_price: merge(self.max_price, other.max_price, f64::max),
        };
        out.add_units(other.sum_units);
        out
    }

    fn add_units(&mut self, units: i128) {
        match self.sum_units.checked_add(units) {
            Some(sum) => self.sum_units = sum,
            None => self.sum_spill += units as f64 / PRICE_UNITS,
        }
    }

    pub fn sum_price(&self) -> Option<f64> {
        (self.successful > 0).then(|| self.sum_units as f64 / PRICE_UNITS + self.sum_spill)
    }

    pub fn min_price(&self) -> Option<f64> {
        self.min_price
    }

    pub fn max_price(&self) -> Option<f64> {
        self.max_price
    }

    /// Wire summary. Every field is null when no row succeeded.
    pub fn summary(&self) -> ProcessingSummary {
        let Some(sum) = self.sum_price() else {
            return ProcessingSummary::default();
        };
        ProcessingSummary {
            average_option_price: Some(round4(sum / self.successful as f64)),
            min_option_price: self.min_price,
            max_option_price: self.max_price,
            total_option_value: Some(round4(sum)),
        }
    }
}

/// Exact ten-thousandths for a reported price, or `None` past the exact range.
#[inline]
fn to_units(price: f64) -> Option<i128> {
    (price.abs() < EXACT_PRICE_LIMIT).then(|| (price * PRICE_UNITS).round() as i128)
}

#[inline]
fn merge(a: Option<f64>, b: Option<f64>, pick: fn(f64, f64) -> f64) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(pick(a, b)),
        (a, None) => a,
        (None, b) => b,
    }
}
