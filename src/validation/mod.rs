use bigdecimal::BigDecimal;
use std::fmt;

pub const NOTES_MAX_LEN: usize = 500;
pub const PAYMENT_DETAILS_MAX_LEN: usize = 1000;
pub const TOKEN_MAX_LEN: usize = 128;
pub const DEFAULT_PAGE_LIMIT: i64 = 10;
pub const MAX_PAGE_LIMIT: i64 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

/// Collapses whitespace runs (tabs and newlines included) to single spaces and
/// drops any remaining control characters.
pub fn sanitize_string(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| word.chars().filter(|ch| !ch.is_control()).collect::<String>())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Sanitizes optional free text; blank input collapses to `None`.
pub fn sanitize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| sanitize_string(&v))
        .filter(|v| !v.is_empty())
}

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.len() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

pub fn validate_optional_max_len(
    field: &'static str,
    value: Option<&str>,
    max_len: usize,
) -> ValidationResult {
    match value {
        Some(v) => validate_max_len(field, v, max_len),
        None => Ok(()),
    }
}

pub fn validate_positive(field: &'static str, value: &BigDecimal) -> ValidationResult {
    if value <= &BigDecimal::from(0) {
        return Err(ValidationError::new(field, "must be greater than zero"));
    }

    Ok(())
}

pub fn validate_non_negative(field: &'static str, value: &BigDecimal) -> ValidationResult {
    if value < &BigDecimal::from(0) {
        return Err(ValidationError::new(field, "must not be negative"));
    }

    Ok(())
}

pub fn validate_token(token: &str) -> ValidationResult {
    validate_required("token", token)?;
    validate_max_len("token", token, TOKEN_MAX_LEN)?;

    if !token
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-')
    {
        return Err(ValidationError::new(
            "token",
            "must contain only letters, digits and '-'",
        ));
    }

    Ok(())
}

/// Resolves `limit`/`offset` query values to the bounds the list endpoints accept.
pub fn page_bounds(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
    let offset = offset.unwrap_or(0).max(0);
    (limit, offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn validates_required_field() {
        assert!(validate_required("field", "value").is_ok());
        assert!(validate_required("field", "   ").is_err());
    }

    #[test]
    fn validates_max_len() {
        assert!(validate_max_len("field", "abc", 3).is_ok());
        assert!(validate_max_len("field", "abcd", 3).is_err());
        assert!(validate_optional_max_len("field", None, 0).is_ok());
    }

    #[test]
    fn sanitizes_string() {
        assert_eq!(sanitize_string("  hello\tworld  "), "hello world");
        assert_eq!(sanitize_string("single"), "single");
        assert_eq!(sanitize_string(" \n "), "");
        assert_eq!(sanitize_string("ab\u{0000}cd\u{0007}"), "abcd");
        assert_eq!(sanitize_string("kardus\r\nbasah\u{0007}"), "kardus basah");
        assert_eq!(sanitize_string("a \u{0007} b"), "a b");
    }

    #[test]
    fn blank_optional_text_becomes_none() {
        assert_eq!(sanitize_optional(Some("  ".to_string())), None);
        assert_eq!(
            sanitize_optional(Some(" plastik  bersih ".to_string())),
            Some("plastik bersih".to_string())
        );
        assert_eq!(sanitize_optional(None), None);
    }

    #[test]
    fn validates_decimal_signs() {
        let positive = BigDecimal::from_str("1.25").expect("valid decimal");
        let zero = BigDecimal::from(0);
        let negative = BigDecimal::from(-1);

        assert!(validate_positive("weight", &positive).is_ok());
        assert!(validate_positive("weight", &zero).is_err());
        assert!(validate_non_negative("price_per_unit", &zero).is_ok());
        assert!(validate_non_negative("price_per_unit", &negative).is_err());
    }

    #[test]
    fn validates_token_charset() {
        assert!(validate_token("GCB-abc123-1700000000000-deadbeef0000").is_ok());
        assert!(validate_token("").is_err());
        assert!(validate_token("GCB abc").is_err());
        assert!(validate_token(&"A".repeat(TOKEN_MAX_LEN + 1)).is_err());
    }

    #[test]
    fn page_bounds_apply_defaults_and_clamp() {
        assert_eq!(page_bounds(None, None), (10, 0));
        assert_eq!(page_bounds(Some(0), Some(-5)), (1, 0));
        assert_eq!(page_bounds(Some(500), Some(20)), (100, 20));
    }
}
