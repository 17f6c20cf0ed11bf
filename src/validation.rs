//! Input checks that run before anything is sent to the backend.

use crate::models::ValidationError;

/// `local@domain` with neither part empty. Anything stricter is the backend's call.
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    let invalid = || ValidationError::Email(email.to_string());
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty()
        || domain.is_empty()
        || domain.contains('@')
        || email.chars().any(char::is_whitespace)
    {
        return Err(invalid());
    }
    Ok(())
}

pub fn validate_new_password(password: &str, confirm: &str) -> Result<(), ValidationError> {
    if password != confirm {
        return Err(ValidationError::PasswordMismatch);
    }
    Ok(())
}
