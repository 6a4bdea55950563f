pub mod black_scholes;

use crate::errors::PipelineResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    Call,
    Put,
}

impl OptionKind {
    /// Case-insensitive `"call"` / `"put"`; anything else is `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("call") {
            Some(Self::Call)
        } else if raw.eq_ignore_ascii_case("put") {
            Some(Self::Put)
        } else {
            None
        }
    }

    #[inline]
    pub fn is_put(self) -> bool {
        matches!(self, Self::Put)
    }
}

/// Structure-of-arrays batch of rows that passed validation.
///
/// All vectors have the same length; index `i` in every field describes the
/// same option.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptionBatch {
    pub spot: Vec<f64>,
    pub strike: Vec<f64>,
    pub expiry: Vec<f64>,
    pub rate: Vec<f64>,
    pub sigma: Vec<f64>,
    pub is_put: Vec<bool>,
}

impl OptionBatch {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            spot: Vec::with_capacity(capacity),
            strike: Vec::with_capacity(capacity),
            expiry: Vec::with_capacity(capacity),
            rate: Vec::with_capacity(capacity),
            sigma: Vec::with_capacity(capacity),
            is_put: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn push(&mut self, spot: f64, strike: f64, expiry: f64, rate: f64, sigma: f64, kind: OptionKind) {
        self.spot.push(spot);
        self.strike.push(strike);
        self.expiry.push(expiry);
        self.rate.push(rate);
        self.sigma.push(sigma);
        self.is_put.push(kind.is_put());
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.spot.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.spot.is_empty()
    }
}

/// Engine output, parallel to the [`OptionBatch`] it was computed from.
/// Values are unrounded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PricedBatch {
    pub price: Vec<f64>,
    pub delta: Vec<f64>,
    pub gamma: Vec<f64>,
    pub theta: Vec<f64>,
    pub vega: Vec<f64>,
    pub rho: Vec<f64>,
}

impl PricedBatch {
    /// Pre-sized to `len`, zero-filled.
    pub fn zeroed(len: usize) -> Self {
        Self {
            price: vec![0.0; len],
            delta: vec![0.0; len],
            gamma: vec![0.0; len],
            theta: vec![0.0; len],
            vega: vec![0.0; len],
            rho: vec![0.0; len],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.price.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.price.is_empty()
    }

    /// True if every output column has `len` entries.
    pub fn is_consistent(&self, len: usize) -> bool {
        [&self.price, &self.delta, &self.gamma, &self.theta, &self.vega, &self.rho]
            .iter()
            .all(|col| col.len() == len)
    }
}

/// Batch pricing engines implement this trait.
/// `price_batch` must be deterministic: identical batches give identical output.
/// Send + Sync required so one engine can serve every chunk worker.
pub trait PricingEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Price every option in `batch`. Inputs have already passed validation,
    /// so the returned batch must have exactly `batch.len()` entries.
    fn price_batch(&self, batch: &OptionBatch) -> PipelineResult<PricedBatch>;
}
