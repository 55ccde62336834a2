// src/cli/util.rs
use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::budget::usage::bar_ratio;

pub fn fmt_money(d: &Decimal) -> String {
    format!("{:.2}", d.round_dp(2))
}

pub fn fmt_money_in(d: &Decimal, currency: &str) -> String {
    if currency.is_empty() {
        fmt_money(d)
    } else {
        format!("{} {}", fmt_money(d), currency)
    }
}

pub fn fmt_percent(d: &Decimal) -> String {
    format!("{:.1}%", d.round_dp(1))
}

/// Accepts `1234.5`, `1,234.50` and surrounding spaces.
pub fn parse_money(s: &str) -> Option<Decimal> {
    let cleaned: String = s.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str_exact(&cleaned).ok()
}

pub fn iso(d: &NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

/// Fixed-width text progress bar; the fill is clamped to the width.
pub fn text_bar(usage_percent: &Decimal, width: usize) -> String {
    let filled = (bar_ratio(*usage_percent) * width as f64).round() as usize;
    let filled = filled.min(width);
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_formatting() {
        assert_eq!(fmt_money(&Decimal::new(12345, 1)), "1234.50");
        assert_eq!(fmt_money(&Decimal::from(-100)), "-100.00");
        assert_eq!(fmt_money_in(&Decimal::from(5), "CAD"), "5.00 CAD");
        assert_eq!(fmt_percent(&Decimal::new(1025, 1)), "102.5%");
    }

    #[test]
    fn money_parsing() {
        assert_eq!(parse_money(" 1,250.75 "), Some(Decimal::new(125075, 2)));
        assert_eq!(parse_money("abc"), None);
        assert_eq!(parse_money(""), None);
    }

    #[test]
    fn bar_never_overflows() {
        assert_eq!(text_bar(&Decimal::from(50), 10), "█████░░░░░");
        assert_eq!(text_bar(&Decimal::from(180), 4), "████");
        assert_eq!(text_bar(&Decimal::ZERO, 3), "░░░");
    }
}
