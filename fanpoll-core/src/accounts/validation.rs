//! Account input rules

use crate::error::{EngineError, EngineResult};

/// Trim and lowercase; emails are compared in this form
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// `local@domain.tld`: no whitespace, exactly one `@`, and a dot in the
/// domain followed by at least two characters
pub fn validate_email(email: &str) -> EngineResult<()> {
    let invalid = || EngineError::ValidationFailed("Provide a valid email address.".into());

    if email.is_empty() || email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    let dot = domain.char_indices().skip(1).find(|(_, c)| *c == '.').map(|(i, _)| i);
    match dot {
        Some(i) if domain[i + 1..].chars().count() >= 2 => Ok(()),
        _ => Err(invalid()),
    }
}

/// At least 6 characters with a digit, a lowercase and an uppercase letter
pub fn validate_password(password: &str) -> EngineResult<()> {
    let long_enough = password.chars().count() >= 6;
    let digit = password.chars().any(|c| c.is_ascii_digit());
    let lower = password.chars().any(|c| c.is_lowercase());
    let upper = password.chars().any(|c| c.is_uppercase());

    if long_enough && digit && lower && upper {
        Ok(())
    } else {
        Err(EngineError::ValidationFailed(
            "Password must have at least 6 characters and contain at least one number, one \
             lowercase and one uppercase letter."
                .into(),
        ))
    }
}

pub fn require(field: &str, value: &str) -> EngineResult<()> {
    if value.trim().is_empty() {
        Err(EngineError::ValidationFailed(format!("{} is required", field)))
    } else {
        Ok(())
    }
}
