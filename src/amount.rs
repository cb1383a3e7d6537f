// Amount normalizer - "1,234.50 " → 1234.5

use crate::error::ExtractionError;

/// Parse a numeral that may carry thousands separators and padding.
///
/// Commas and any whitespace are dropped before parsing, so `" 20,000 "`,
/// `"20 000"` and `"20000"` all give `20000.0`.
pub fn normalize(raw: &str) -> Result<f64, ExtractionError> {
    let cleaned: String = raw
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();

    let fail = || ExtractionError::Normalization {
        text: raw.to_string(),
    };

    // f64::from_str accepts "inf" and "NaN", which never appear in an SMS amount
    if cleaned.is_empty() || !cleaned.bytes().any(|b| b.is_ascii_digit()) {
        return Err(fail());
    }

    let value: f64 = cleaned.parse().map_err(|_| fail())?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(fail())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thousands_separator() {
        assert_eq!(normalize("1,234.50").unwrap(), 1234.50);
        assert_eq!(normalize(" 5,000 ").unwrap(), 5000.0);
        assert_eq!(normalize("1,000,000").unwrap(), 1_000_000.0);
    }

    #[test]
    fn test_zero() {
        assert_eq!(normalize("0").unwrap(), 0.0);
    }

    #[test]
    fn test_not_a_number() {
        let err = normalize("abc").unwrap_err();
        assert_eq!(
            err,
            ExtractionError::Normalization {
                text: "abc".to_string()
            }
        );

        assert!(normalize("").is_err());
        assert!(normalize("  ,  ").is_err());
        assert!(normalize("12 RWF").is_err());
        assert!(normalize("inf").is_err());
        assert!(normalize("NaN").is_err());
    }
}
