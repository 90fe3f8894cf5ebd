use crate::model::Span;

use super::EngineError;

/// Long-stay discount rule applied on top of `days * rate`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricingPolicy {
    /// Stays strictly longer than this many billable days get the discount.
    pub long_stay_days: i64,
    /// Fraction taken off the base price, in `[0, 1)`.
    pub long_stay_discount: f64,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            long_stay_days: 7,
            long_stay_discount: 0.10,
        }
    }
}

impl PricingPolicy {
    /// No discount at any length.
    pub fn flat() -> Self {
        Self {
            long_stay_days: i64::MAX,
            long_stay_discount: 0.0,
        }
    }

    pub fn price(&self, span: &Span, rate_per_day: f64) -> Result<f64, EngineError> {
        validate_rate(rate_per_day)?;
        let days = span.duration_days();
        let base = days as f64 * rate_per_day;
        if days > self.long_stay_days {
            Ok(base * (1.0 - self.long_stay_discount))
        } else {
            Ok(base)
        }
    }
}

pub(crate) fn validate_rate(rate_per_day: f64) -> Result<(), EngineError> {
    if rate_per_day.is_finite() && rate_per_day > 0.0 {
        Ok(())
    } else {
        Err(EngineError::InvalidRate(rate_per_day))
    }
}

/// Price `span` under the default policy.
pub fn price(span: &Span, rate_per_day: f64) -> Result<f64, EngineError> {
    PricingPolicy::default().price(span, rate_per_day)
}
