//! # Validation Module
//!
//! Input validation for configuration values.
//!
//! ## Usage
//! ```rust
//! use healthsync_core::validation::{parse_time_of_day, validate_login};
//!
//! let at = parse_time_of_day("23:57").unwrap();
//! assert_eq!(at.format("%H:%M").to_string(), "23:57");
//!
//! assert!(validate_login("runner", "").is_err());
//! ```

use chrono::NaiveTime;

use crate::error::ValidationError;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Parses an `HH:MM` time-of-day (24h clock).
pub fn parse_time_of_day(value: &str) -> ValidationResult<NaiveTime> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: "time_of_day".to_string(),
        });
    }

    NaiveTime::parse_from_str(value, "%H:%M").map_err(|_| ValidationError::InvalidFormat {
        field: "time_of_day".to_string(),
        reason: format!("expected HH:MM, got '{}'", value),
    })
}

/// Validates login credentials before they are sent anywhere.
///
/// ## Rules
/// - Username must not be empty and at most 254 characters
/// - Password must not be empty
pub fn validate_login(username: &str, password: &str) -> ValidationResult<()> {
    let username = username.trim();

    if username.is_empty() {
        return Err(ValidationError::Required {
            field: "username".to_string(),
        });
    }

    if username.len() > 254 {
        return Err(ValidationError::TooLong {
            field: "username".to_string(),
            max: 254,
        });
    }

    if password.is_empty() {
        return Err(ValidationError::Required {
            field: "password".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
