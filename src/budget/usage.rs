//! Usage figures for a single `{budget, spent}` pair.
//!
//! Percentages returned here are data values and may exceed 100. Only the
//! drawing helpers clamp them.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Usage at or above this percentage is shown as a warning.
pub const WARNING_THRESHOLD_PERCENT: i64 = 75;
/// Usage at or above this percentage is shown as danger.
pub const DANGER_THRESHOLD_PERCENT: i64 = 90;
/// Progress bars never draw wider than this percentage.
pub const MAX_BAR_PERCENT: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub remaining: Decimal,
    pub usage_percent: Decimal,
    pub over_budget: bool,
}

impl Usage {
    pub fn severity(&self) -> Severity {
        Severity::for_percent(self.usage_percent)
    }
}

pub fn usage(budget: Decimal, spent: Decimal) -> Usage {
    let remaining = budget - spent;
    Usage {
        remaining,
        usage_percent: usage_percent(budget, spent),
        over_budget: remaining < Decimal::ZERO,
    }
}

/// `spent / budget * 100`, or zero when there is no budget to divide by.
pub fn usage_percent(budget: Decimal, spent: Decimal) -> Decimal {
    if budget <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    spent
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|scaled| scaled.checked_div(budget))
        .unwrap_or(Decimal::ZERO)
}

/// Fill ratio for a progress bar, clamped to `0.0..=1.0`.
pub fn bar_ratio(usage_percent: Decimal) -> f64 {
    let clamped = usage_percent
        .max(Decimal::ZERO)
        .min(Decimal::from(MAX_BAR_PERCENT));
    clamped.to_f64().unwrap_or(0.0) / MAX_BAR_PERCENT as f64
}

/// Visual severity shared by the tree view and the impact widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Success,
    Warning,
    Danger,
}

impl Severity {
    pub fn for_percent(percent: Decimal) -> Self {
        if percent >= Decimal::from(DANGER_THRESHOLD_PERCENT) {
            Self::Danger
        } else if percent >= Decimal::from(WARNING_THRESHOLD_PERCENT) {
            Self::Warning
        } else {
            Self::Success
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Danger => "danger",
        }
    }
}
