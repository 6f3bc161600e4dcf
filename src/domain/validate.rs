//! Field validation shared by the application services.
//!
//! Limits mirror the column widths in the schema so invalid input is
//! rejected before it reaches the database.

use crate::domain::error::DomainError;

pub const USERNAME_MIN: usize = 3;
pub const USERNAME_MAX: usize = 50;
pub const EMAIL_MAX: usize = 100;
pub const PASSWORD_MIN: usize = 6;
pub const TITLE_MAX: usize = 200;
pub const SUMMARY_MAX: usize = 500;
pub const NAME_MAX: usize = 50;
pub const DESCRIPTION_MAX: usize = 200;

/// Trims the value and rejects empty input.
pub fn non_empty(value: &str, field: &'static str) -> Result<String, DomainError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

/// Rejects values longer than `max` characters. Empty input is allowed.
pub fn at_most(value: &str, max: usize, field: &'static str) -> Result<(), DomainError> {
    if value.chars().count() > max {
        return Err(DomainError::validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

pub fn username(value: &str) -> Result<String, DomainError> {
    let trimmed = non_empty(value, "username")?;
    let length = trimmed.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&length) {
        return Err(DomainError::validation(format!(
            "username must be between {USERNAME_MIN} and {USERNAME_MAX} characters"
        )));
    }
    Ok(trimmed)
}

/// Light structural check: one `@`, a non-empty local part and a dotted
/// domain. Anything stricter belongs to a confirmation mail flow.
pub fn email(value: &str) -> Result<String, DomainError> {
    let trimmed = non_empty(value, "email")?;
    at_most(&trimmed, EMAIL_MAX, "email")?;

    let invalid = || DomainError::validation("email is not a valid address");
    let (local, host) = trimmed.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || host.is_empty() || host.contains('@') {
        return Err(invalid());
    }
    if !host.contains('.') || host.starts_with('.') || host.ends_with('.') {
        return Err(invalid());
    }
    if trimmed.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    Ok(trimmed)
}

/// Passwords are not trimmed; surrounding whitespace is significant.
pub fn password(value: &str) -> Result<(), DomainError> {
    if value.chars().count() < PASSWORD_MIN {
        return Err(DomainError::validation(format!(
            "password must be at least {PASSWORD_MIN} characters"
        )));
    }
    Ok(())
}

pub fn post_title(value: &str) -> Result<String, DomainError> {
    let trimmed = non_empty(value, "title")?;
    at_most(&trimmed, TITLE_MAX, "title")?;
    Ok(trimmed)
}

pub fn post_summary(value: &str) -> Result<(), DomainError> {
    at_most(value, SUMMARY_MAX, "summary")
}

pub fn taxonomy_name(value: &str, field: &'static str) -> Result<String, DomainError> {
    let trimmed = non_empty(value, field)?;
    at_most(&trimmed, NAME_MAX, field)?;
    Ok(trimmed)
}

/// Trims an optional parameter, dropping it entirely when blank.
pub fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
