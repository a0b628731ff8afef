//! Scalar validation helpers shared by config loading and the admin surface.

use crate::types::{Error, Result};

/// Validate that a string is not empty.
pub fn validate_non_empty(s: &str, field: &str) -> Result<()> {
    if s.trim().is_empty() {
        return Err(Error::validation(format!("{} cannot be empty", field)));
    }
    Ok(())
}

/// Validate that a value is positive.
pub fn validate_positive(n: u64, field: &str) -> Result<()> {
    if n == 0 {
        return Err(Error::validation(format!("{} must be positive", field)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_empty() {
        assert!(validate_non_empty("claude", "backend").is_ok());
        assert!(validate_non_empty("  ", "backend").is_err());
    }

    #[test]
    fn test_positive() {
        assert!(validate_positive(1, "max_size").is_ok());
        let err = validate_positive(0, "max_size").unwrap_err();
        assert_eq!(err.to_string(), "validation error: max_size must be positive");
    }
}
