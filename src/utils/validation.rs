use crate::error::{EngineError, EngineResult};

pub fn validate_limit(n: usize, max: usize) -> EngineResult<usize> {
    if n < 1 || n > max {
        return Err(EngineError::Validation(format!("n must be between 1 and {}", max)));
    }
    Ok(n)
}

pub fn validate_username(username: &str) -> EngineResult<&str> {
    let trimmed = username.trim();
    if trimmed.is_empty() {
        return Err(EngineError::Validation("username is required".to_string()));
    }
    if trimmed.len() > 255 {
        return Err(EngineError::Validation("username too long (max 255)".to_string()));
    }
    Ok(trimmed)
}

/// Profile and product vectors must be finite and non-negative.
pub fn validate_vector(vector: &[f32]) -> EngineResult<()> {
    if vector.is_empty() {
        return Err(EngineError::Validation("vector cannot be empty".to_string()));
    }
    if vector.iter().any(|v| !v.is_finite() || *v < 0.0) {
        return Err(EngineError::Validation(
            "vector contains negative or non-finite values".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_limit() {
        assert!(validate_limit(0, 50).is_err());
        assert!(validate_limit(51, 50).is_err());
        assert_eq!(validate_limit(10, 50).unwrap(), 10);
    }

    #[test]
    fn test_validate_username() {
        assert!(validate_username("  ").is_err());
        assert_eq!(validate_username(" ana ").unwrap(), "ana");
    }

    #[test]
    fn test_validate_vector() {
        assert!(validate_vector(&[]).is_err());
        assert!(validate_vector(&[0.1, f32::NAN]).is_err());
        assert!(validate_vector(&[0.1, -0.2]).is_err());
        assert!(validate_vector(&[0.0, 1.0]).is_ok());
    }
}
