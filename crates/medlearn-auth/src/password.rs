//! Password hashing and verification.
//!
//! Hashes are Argon2id PHC strings with default parameters and a random
//! salt from `OsRng`, e.g. `$argon2id$v=19$m=19456,t=2,p=1$...`.
//!
//! # Example
//!
//! ```
//! use medlearn_auth::password::{hash_password, verify_password};
//!
//! let hash = hash_password("correct horse battery").unwrap();
//! assert!(verify_password("correct horse battery", &hash).unwrap());
//! assert!(!verify_password("wrong", &hash).unwrap());
//! ```

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

/// Minimum accepted password length, in characters.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Maximum accepted password length, in characters.
pub const MAX_PASSWORD_LEN: usize = 128;

/// Hash a password for storage using Argon2id.
///
/// # Errors
///
/// Returns `argon2::password_hash::Error` if hashing fails (rare).
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a stored Argon2 hash.
///
/// `Ok(false)` means the password does not match. `Err` is returned only if
/// the stored hash is malformed.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, argon2::password_hash::Error> {
    let parsed_hash = PasswordHash::new(hash)?;
    let result = Argon2::default().verify_password(password.as_bytes(), &parsed_hash);
    Ok(result.is_ok())
}

/// Checks length bounds. Returns a message suitable for a field error.
pub fn check_password_policy(password: &str) -> Result<(), String> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LEN {
        return Err(format!("must be at least {MIN_PASSWORD_LEN} characters"));
    }
    if len > MAX_PASSWORD_LEN {
        return Err(format!("must be at most {MAX_PASSWORD_LEN} characters"));
    }
    if password.trim().is_empty() {
        return Err("must not be blank".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_format() {
        let hash = hash_password("s3cure-passw0rd").unwrap();
        assert!(hash.starts_with("$argon2id$"));
    }

    #[test]
    fn test_same_password_different_salt() {
        let h1 = hash_password("s3cure-passw0rd").unwrap();
        let h2 = hash_password("s3cure-passw0rd").unwrap();
        assert_ne!(h1, h2, "Hashes should differ due to random salts");
        assert!(verify_password("s3cure-passw0rd", &h1).unwrap());
        assert!(verify_password("s3cure-passw0rd", &h2).unwrap());
    }

    #[test]
    fn test_verify_wrong_password() {
        let hash = hash_password("s3cure-passw0rd").unwrap();
        assert!(!verify_password("s3cure-passw0rD", &hash).unwrap());
    }

    #[test]
    fn test_malformed_hash_is_error() {
        assert!(verify_password("x", "not-a-hash").is_err());
    }

    #[test]
    fn test_password_policy() {
        assert!(check_password_policy("short").is_err());
        assert!(check_password_policy("        ").is_err());
        assert!(check_password_policy(&"x".repeat(129)).is_err());
        assert!(check_password_policy("long enough").is_ok());
    }
}
