//! Argon2id password hashing.
//!
//! Hashes are PHC strings (`$argon2id$v=19$...`) carrying their own random
//! salt and parameters, so verification needs nothing but the stored string.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use once_cell::sync::Lazy;

/// Hash compared against when the account does not exist, so a miss costs
/// the same as a wrong password.
static DUMMY_HASH: Lazy<Option<String>> = Lazy::new(|| hash("not-a-real-password").ok());

pub fn hash(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
}

/// `false` for a mismatch and for a stored value that is not a PHC string.
pub fn verify(password: &str, hashword: &str) -> bool {
    PasswordHash::new(hashword)
        .ok()
        .as_ref()
        .map(|hash| {
            Argon2::default()
                .verify_password(password.as_bytes(), hash)
                .is_ok()
        })
        .unwrap_or(false)
}

/// Spend one verification on a throwaway hash. Always `false`.
pub fn verify_against_dummy(password: &str) -> bool {
    if let Some(dummy) = DUMMY_HASH.as_deref() {
        let _ = verify(password, dummy);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_then_verify() {
        let hashword = hash("correct horse battery staple").unwrap();
        assert!(hashword.starts_with("$argon2id$"));
        assert!(verify("correct horse battery staple", &hashword));
        assert!(!verify("Correct horse battery staple", &hashword));
    }

    #[test]
    fn test_same_password_gets_distinct_salts() {
        let a = hash("admin123").unwrap();
        let b = hash("admin123").unwrap();
        assert_ne!(a, b);
        assert!(verify("admin123", &a));
        assert!(verify("admin123", &b));
    }

    #[test]
    fn test_verify_rejects_non_phc_string() {
        assert!(!verify("admin123", "admin123"));
        assert!(!verify("", ""));
    }

    #[test]
    fn test_dummy_never_matches() {
        assert!(!verify_against_dummy("not-a-real-password"));
    }
}
