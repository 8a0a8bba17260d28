//! Utility functions for formatting
//!
//! Values are stored and computed at full precision; rounding happens
//! here, at display time only.

use rust_decimal::{Decimal, RoundingStrategy};

/// Round for display, half away from zero (1.96875 -> 1.97).
///
/// # Examples
/// ```
/// use avco::utils::round_display;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(round_display(dec!(305.15625), 2), dec!(305.16));
/// assert_eq!(round_display(dec!(-0.125), 2), dec!(-0.13));
/// ```
pub fn round_display(value: Decimal, decimals: u32) -> Decimal {
    value.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero)
}

/// Core formatting function with full control over output.
///
/// Uses `,` as thousands separator and `.` as decimal separator, always
/// printing exactly `decimals` fractional digits.
///
/// # Arguments
/// * `value` - The decimal value to format
/// * `decimals` - Fractional digits to keep
/// * `width` - Minimum width for padding (0 for no padding, right-aligned)
///
/// # Examples
/// ```
/// use avco::utils::format_decimal_with_width;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(format_decimal_with_width(dec!(1234.5), 2, 0), "1,234.50");
/// assert_eq!(format_decimal_with_width(dec!(315), 2, 10), "    315.00");
/// ```
pub fn format_decimal_with_width(value: Decimal, decimals: u32, width: usize) -> String {
    let rounded = round_display(value, decimals);
    let is_negative = rounded < Decimal::ZERO;

    let formatted = format!("{:.*}", decimals as usize, rounded.abs());
    let (integer_part, decimal_part) = match formatted.split_once('.') {
        Some((int, frac)) => (int, Some(frac)),
        None => (formatted.as_str(), None),
    };

    let digits: Vec<char> = integer_part.chars().collect();
    let mut with_separators = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            with_separators.push(',');
        }
        with_separators.push(*c);
    }

    let sign = if is_negative { "-" } else { "" };
    let result = match decimal_part {
        Some(frac) => format!("{}{}.{}", sign, with_separators, frac),
        None => format!("{}{}", sign, with_separators),
    };

    if width > 0 && result.len() < width {
        format!("{:>width$}", result, width = width)
    } else {
        result
    }
}

/// Format a running quantity, dropping a zero fractional part
///
/// # Examples
/// ```
/// use avco::utils::format_quantity;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(format_quantity(dec!(160)), "160");
/// assert_eq!(format_quantity(dec!(1.50)), "1.5");
/// ```
pub fn format_quantity(value: Decimal) -> String {
    value.normalize().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn two_places(value: Decimal) -> String {
        format_decimal_with_width(value, 2, 0)
    }

    #[test]
    fn test_format_amount_rounds_half_away_from_zero() {
        assert_eq!(two_places(dec!(1.96875)), "1.97");
        assert_eq!(two_places(dec!(295.3125)), "295.31");
        assert_eq!(two_places(dec!(0.005)), "0.01");
    }

    #[test]
    fn test_format_amount_thousands() {
        assert_eq!(two_places(dec!(1234567.891)), "1,234,567.89");
        assert_eq!(two_places(dec!(-1000)), "-1,000.00");
        assert_eq!(two_places(dec!(999)), "999.00");
    }

    #[test]
    fn test_zero_decimals() {
        assert_eq!(format_decimal_with_width(dec!(2.5), 0, 0), "3");
    }

    #[test]
    fn test_negative_zero_after_rounding_has_no_sign() {
        assert_eq!(two_places(dec!(-0.001)), "0.00");
    }
}
