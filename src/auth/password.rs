//! Password credential material for directory-created accounts
//!
//! Accounts created through the user directory store an Argon2id PHC string.
//! Verification lives with the login collaborator; `verify_password` is kept
//! here so both sides agree on the format.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::types::DoctrackError;

/// Minimum accepted password length
pub const MIN_PASSWORD_LEN: usize = 6;

/// Check a new password against the account policy
pub fn check_password_policy(password: &str) -> Result<(), DoctrackError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(DoctrackError::Validation(format!(
            "Please enter a password with {MIN_PASSWORD_LEN} or more characters"
        )));
    }
    Ok(())
}

/// Apply the policy, then hash with Argon2id into a PHC string
pub fn hash_password(password: &str) -> Result<String, DoctrackError> {
    check_password_policy(password)?;

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| DoctrackError::Internal(format!("Failed to hash password: {e}")))
}

/// Verify a password against a stored PHC string
pub fn verify_password(password: &str, hash: &str) -> Result<bool, DoctrackError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| DoctrackError::Internal(format!("Invalid password hash format: {e}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_round_trip() {
        let hash = hash_password("s3cret-enough").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("s3cret-enough", &hash).unwrap());
        assert!(!verify_password("something-else", &hash).unwrap());
    }

    #[test]
    fn test_short_password_rejected() {
        let err = hash_password("abc").unwrap_err();
        assert!(matches!(err, DoctrackError::Validation(_)));
    }
}
