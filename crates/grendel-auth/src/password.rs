//! Password hashing with Argon2id.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

use crate::error::{AuthError, Result};

/// Hash a password into a PHC string with a fresh random salt.
///
/// # Errors
///
/// Returns `AuthError::Internal` if hashing fails.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AuthError::Internal(e.to_string()))?;
    Ok(hash.to_string())
}

/// Check a password against a stored PHC string.
///
/// # Errors
///
/// Returns `AuthError::InvalidCredentials` if the password does not match,
/// or `AuthError::Internal` if the stored hash cannot be parsed.
pub fn verify_password(password: &str, phc: &str) -> Result<()> {
    let parsed = PasswordHash::new(phc).map_err(|e| AuthError::Internal(e.to_string()))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| AuthError::InvalidCredentials)
}
