use crate::errors::PipelineResult;
use crate::models::{OptionBatch, PricedBatch, PricingEngine};
use statrs::distribution::{Continuous, ContinuousCDF, Normal};

/// European Black-Scholes price and first-order Greeks, computed over a
/// whole [`OptionBatch`] in one pass.
///
/// d1 = (ln(S/K) + (r + sigma^2/2)*T) / (sigma * sqrt(T))
/// d2 = d1 - sigma * sqrt(T)
///
/// Theta is per year, vega per unit of sigma, rho per unit of r. Puts use
/// N(-d1) and N(-d2) directly rather than 1 - N(.), which keeps deep
/// in-the-money puts accurate.
///
/// T == 0 rows are priced at intrinsic value with limiting Greeks (see
/// [`expiry_values`]). No rounding happens here.
pub struct BlackScholesEngine {
    /// Standard normal distribution (created once, reused)
    normal: Normal,
}

impl BlackScholesEngine {
    pub fn new() -> Self {
        Self {
            normal: Normal::standard(),
        }
    }
}

impl Default for BlackScholesEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Row values at expiry: (price, delta). Gamma, theta, vega and rho are 0.
///
/// A call has delta 1 strictly in the money, a put -1; at or out of the money
/// both are 0.
#[inline]
pub fn expiry_values(spot: f64, strike: f64, is_put: bool) -> (f64, f64) {
    if is_put {
        ((strike - spot).max(0.0), if spot < strike { -1.0 } else { 0.0 })
    } else {
        ((spot - strike).max(0.0), if spot > strike { 1.0 } else { 0.0 })
    }
}

impl PricingEngine for BlackScholesEngine {
    #[inline]
    fn name(&self) -> &'static str {
        "Black-Scholes"
    }

    fn price_batch(&self, batch: &OptionBatch) -> PipelineResult<PricedBatch> {
        let n = batch.len();
        let mut out = PricedBatch::zeroed(n);

        for i in 0..n {
            let s = batch.spot[i];
            let k = batch.strike[i];
            let t = batch.expiry[i];
            let r = batch.rate[i];
            let sigma = batch.sigma[i];
            let is_put = batch.is_put[i];

            if t == 0.0 {
                let (price, delta) = expiry_values(s, k, is_put);
                out.price[i] = price;
                out.delta[i] = delta;
                // remaining Greeks stay at the zero fill
                continue;
            }

            let sqrt_t = t.sqrt();
            let sigma_sqrt_t = sigma * sqrt_t;
            let d1 = ((s / k).ln() + (r + 0.5 * sigma * sigma) * t) / sigma_sqrt_t;
            let d2 = d1 - sigma_sqrt_t;

            let discounted_k = k * (-r * t).exp();
            let pdf_d1 = self.normal.pdf(d1);
            let time_decay = -s * pdf_d1 * sigma / (2.0 * sqrt_t);

            out.gamma[i] = pdf_d1 / (s * sigma_sqrt_t);
            out.vega[i] = s * pdf_d1 * sqrt_t;

            if is_put {
                let n_neg_d1 = self.normal.cdf(-d1);
                let n_neg_d2 = self.normal.cdf(-d2);
                out.price[i] = discounted_k * n_neg_d2 - s * n_neg_d1;
                out.delta[i] = self.normal.cdf(d1) - 1.0;
                out.theta[i] = time_decay + r * discounted_k * n_neg_d2;
                out.rho[i] = -t * discounted_k * n_neg_d2;
            } else {
                let n_d1 = self.normal.cdf(d1);
                let n_d2 = self.normal.cdf(d2);
                out.price[i] = s * n_d1 - discounted_k * n_d2;
                out.delta[i] = n_d1;
                out.theta[i] = time_decay - r * discounted_k * n_d2;
                out.rho[i] = t * discounted_k * n_d2;
            }
        }

        Ok(out)
    }
}
