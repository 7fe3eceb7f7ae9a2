//! Input validation helpers.
//!
//! Thin trait-based checks the service layer runs before touching the
//! store, so bad input is rejected without opening a transaction.

use retos_core::{EngineResult, ValidationError};

/// Validate that a string value is non-empty after trimming.
pub trait ValidateNonEmpty {
    fn validate_non_empty(&self, field: &str) -> EngineResult<()>;
}

impl ValidateNonEmpty for str {
    fn validate_non_empty(&self, field: &str) -> EngineResult<()> {
        if self.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: field.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

impl ValidateNonEmpty for String {
    fn validate_non_empty(&self, field: &str) -> EngineResult<()> {
        self.as_str().validate_non_empty(field)
    }
}

/// Validate that a numeric value lies within an inclusive range.
pub trait ValidateRange {
    fn validate_range(&self, field: &str, min: i64, max: i64) -> EngineResult<()>;

    fn validate_non_negative(&self, field: &str) -> EngineResult<()> {
        self.validate_range(field, 0, i64::MAX)
    }
}

macro_rules! impl_validate_range {
    ($($t:ty),*) => {
        $(
            impl ValidateRange for $t {
                fn validate_range(&self, field: &str, min: i64, max: i64) -> EngineResult<()> {
                    let value = *self as i64;
                    if value < min || value > max {
                        return Err(ValidationError::OutOfRange {
                            field: field.to_string(),
                            min,
                            max,
                            got: value,
                        }
                        .into());
                    }
                    Ok(())
                }
            }
        )*
    };
}

impl_validate_range!(i32, i64);

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use retos_core::EngineError;

    #[test]
    fn test_non_empty_rejects_whitespace() {
        assert!("titulo".validate_non_empty("title").is_ok());
        let err = "   ".validate_non_empty("title").unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::RequiredFieldMissing { .. })
        ));
    }

    #[test]
    fn test_range_bounds_are_inclusive() {
        assert!(0i32.validate_range("progress", 0, 100).is_ok());
        assert!(100i32.validate_range("progress", 0, 100).is_ok());
        let err = 101i32.validate_range("progress", 0, 100).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::OutOfRange { got: 101, .. })
        ));
    }

    #[test]
    fn test_non_negative() {
        assert!(0i64.validate_non_negative("points").is_ok());
        assert!((-1i64).validate_non_negative("points").is_err());
    }
}
