//! Password hashing and the unusable-password sentinel.
//!
//! Claimable accounts store an Argon2id PHC string. Accounts provisioned
//! from an external identity store a sentinel instead: a `!` followed by
//! random hex. The field is never empty, but no input can ever verify
//! against it.
//!
//! # Example
//!
//! ```
//! use sociallink::password::{hash_password, is_usable_password, make_unusable_password, verify_password};
//!
//! let hash = hash_password("correct horse").unwrap();
//! assert!(is_usable_password(&hash));
//! assert!(verify_password("correct horse", &hash).unwrap());
//!
//! let sentinel = make_unusable_password();
//! assert!(!is_usable_password(&sentinel));
//! assert!(!verify_password("", &sentinel).unwrap());
//! ```

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use rand::Rng;

/// Prefix marking a password field as unusable.
pub const UNUSABLE_PASSWORD_PREFIX: &str = "!";

/// Number of random bytes appended to the unusable-password prefix.
const UNUSABLE_SUFFIX_BYTES: usize = 20;

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

/// Verify a password against a stored hash.
///
/// Unusable sentinels never verify and are not an error.
///
/// # Errors
///
/// Returns `Err` only if a usable-looking hash is not valid PHC.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, argon2::password_hash::Error> {
    if !is_usable_password(hash) {
        return Ok(false);
    }
    let parsed_hash = PasswordHash::new(hash)?;
    let result = Argon2::default().verify_password(password.as_bytes(), &parsed_hash);
    Ok(result.is_ok())
}

/// Generate a fresh unusable-password sentinel.
#[must_use]
pub fn make_unusable_password() -> String {
    let bytes: [u8; UNUSABLE_SUFFIX_BYTES] = rand::thread_rng().r#gen();
    format!("{UNUSABLE_PASSWORD_PREFIX}{}", hex::encode(bytes))
}

/// Returns `true` if the stored value can be used for password login.
#[must_use]
pub fn is_usable_password(hash: &str) -> bool {
    !hash.is_empty() && !hash.starts_with(UNUSABLE_PASSWORD_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("s3cret").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("s3cret", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }

    #[test]
    fn test_hash_produces_different_hashes() {
        let hash1 = hash_password("s3cret").unwrap();
        let hash2 = hash_password("s3cret").unwrap();
        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_unusable_password_format() {
        let sentinel = make_unusable_password();
        assert!(sentinel.starts_with(UNUSABLE_PASSWORD_PREFIX));
        assert_eq!(sentinel.len(), 1 + UNUSABLE_SUFFIX_BYTES * 2);
        assert!(hex::decode(&sentinel[1..]).is_ok());
        assert_ne!(sentinel, make_unusable_password());
    }

    #[test]
    fn test_unusable_password_never_verifies() {
        let sentinel = make_unusable_password();
        assert!(!is_usable_password(&sentinel));
        assert!(!verify_password(&sentinel, &sentinel).unwrap());
        assert!(!verify_password("", &sentinel).unwrap());
    }

    #[test]
    fn test_empty_hash_is_unusable() {
        assert!(!is_usable_password(""));
        assert!(!verify_password("", "").unwrap());
    }

    #[test]
    fn test_verify_invalid_hash_format() {
        assert!(verify_password("x", "invalid_hash_format").is_err());
    }
}
