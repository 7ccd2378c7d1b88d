//! Major-unit → minor-unit conversion for deposit orders.
//!
//! Amounts arrive as JSON numbers or numeric strings in major currency units
//! (rupees). They are parsed as decimal text, never through `f64`, and
//! rounded half away from zero to the nearest minor unit (paise).

use serde_json::Value;

/// Minor units per major unit.
pub const MINOR_PER_MAJOR: i64 = 100;

/// Inclusive bounds on a single deposit, in major units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepositLimits {
    pub min_units: i64,
    pub max_units: i64,
}

impl Default for DepositLimits {
    fn default() -> Self {
        Self {
            min_units: 1,
            max_units: 100_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    /// Absent, non-numeric, or not a finite decimal.
    Malformed,
    BelowMinimum { min_units: i64 },
    AboveMaximum { max_units: i64 },
}

impl std::fmt::Display for AmountError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AmountError::Malformed => write!(f, "amount is required and must be a number"),
            AmountError::BelowMinimum { min_units } => {
                write!(f, "amount must be at least {min_units}")
            }
            AmountError::AboveMaximum { max_units } => {
                write!(f, "amount cannot exceed {max_units}")
            }
        }
    }
}

impl std::error::Error for AmountError {}

/// Parse a major-unit amount (number or numeric string) into minor units,
/// enforcing `limits` against the exact (unrounded) value.
pub fn parse_major_units(raw: Option<&Value>, limits: DepositLimits) -> Result<i64, AmountError> {
    let text = match raw {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.trim().to_string(),
        _ => return Err(AmountError::Malformed),
    };

    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(&text)),
    };

    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, f),
        None => (digits, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(AmountError::Malformed);
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit()) || !frac_part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AmountError::Malformed);
    }

    let int_value: i64 = if int_part.is_empty() {
        0
    } else {
        // Anything that overflows i64 is far above any configured maximum.
        match int_part.parse::<i64>() {
            Ok(v) => v,
            Err(_) if !negative => {
                return Err(AmountError::AboveMaximum {
                    max_units: limits.max_units,
                })
            }
            Err(_) => return Err(AmountError::Malformed),
        }
    };
    let frac_nonzero = frac_part.bytes().any(|b| b != b'0');

    if negative && (int_value > 0 || frac_nonzero) {
        return Err(AmountError::BelowMinimum {
            min_units: limits.min_units,
        });
    }
    if int_value < limits.min_units {
        return Err(AmountError::BelowMinimum {
            min_units: limits.min_units,
        });
    }
    if int_value > limits.max_units || (int_value == limits.max_units && frac_nonzero) {
        return Err(AmountError::AboveMaximum {
            max_units: limits.max_units,
        });
    }

    let mut frac_digits = frac_part.bytes().map(|b| i64::from(b - b'0'));
    let tens = frac_digits.next().unwrap_or(0);
    let ones = frac_digits.next().unwrap_or(0);
    let round_up = frac_digits.next().unwrap_or(0) >= 5;

    Ok(int_value * MINOR_PER_MAJOR + tens * 10 + ones + i64::from(round_up))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(v: Value) -> Result<i64, AmountError> {
        parse_major_units(Some(&v), DepositLimits::default())
    }

    #[test]
    fn whole_and_fractional_amounts_convert_exactly() {
        assert_eq!(parse(json!(500)), Ok(50_000));
        assert_eq!(parse(json!("12.34")), Ok(1_234));
        assert_eq!(parse(json!(1.5)), Ok(150));
    }

    #[test]
    fn third_decimal_rounds_half_away_from_zero() {
        assert_eq!(parse(json!("10.005")), Ok(1_001));
        assert_eq!(parse(json!("10.004")), Ok(1_000));
    }

    #[test]
    fn bounds_are_checked_on_exact_value() {
        assert_eq!(
            parse(json!("0.999")),
            Err(AmountError::BelowMinimum { min_units: 1 })
        );
        assert_eq!(parse(json!(100_000)), Ok(10_000_000));
        assert_eq!(
            parse(json!("100000.01")),
            Err(AmountError::AboveMaximum { max_units: 100_000 })
        );
        assert_eq!(
            parse(json!(-5)),
            Err(AmountError::BelowMinimum { min_units: 1 })
        );
    }

    #[test]
    fn non_numeric_input_is_malformed() {
        assert_eq!(parse(json!("abc")), Err(AmountError::Malformed));
        assert_eq!(parse(json!(true)), Err(AmountError::Malformed));
        assert_eq!(parse(json!(".")), Err(AmountError::Malformed));
        assert_eq!(
            parse_major_units(None, DepositLimits::default()),
            Err(AmountError::Malformed)
        );
    }
}
