//! Password hashing (Argon2id, PHC string format).

use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};

use super::{AuthError, AuthResult};

/// Hash a password for storage.
pub fn hash_password(password: &str) -> AuthResult<String> {
    let salt = SaltString::generate(&mut OsRng);

    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AuthError::PasswordHash(e.to_string()))?;

    Ok(hash.to_string())
}

/// Verify a password against its stored hash. A malformed hash never verifies.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("S3nha!Forte").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("S3nha!Forte", &hash));
        assert!(!verify_password("s3nha!forte", &hash));
    }

    #[test]
    fn test_malformed_hash() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }
}
