//! TOTP second factor.
//!
//! RFC 6238 with SHA-1, 6 digits, 30 s step and one step of skew either way,
//! which is what authenticator apps expect. Backup codes are 8 upper-case
//! hex characters, ten per enrollment, each usable once.

use rand::Rng;
use serde::Serialize;
use totp_rs::{Algorithm, Secret, TOTP};

use super::{AuthError, AuthResult};

pub const BACKUP_CODE_COUNT: usize = 10;

/// What the user needs to configure an authenticator app.
#[derive(Debug, Clone, Serialize)]
pub struct Enrollment {
    /// Base32 secret
    pub secret: String,
    /// `otpauth://` URL for QR rendering on the client
    pub provisioning_url: String,
    pub backup_codes: Vec<String>,
}

/// Starts an enrollment. Nothing is enabled until a code is confirmed.
pub fn enroll(issuer: &str, account: &str) -> AuthResult<Enrollment> {
    let secret = Secret::generate_secret().to_encoded().to_string();
    let provisioning_url = build(&secret, issuer, account)?.get_url();

    Ok(Enrollment {
        secret,
        provisioning_url,
        backup_codes: generate_backup_codes(),
    })
}

/// Checks a 6-digit code against the current time window.
pub fn verify_code(secret: &str, code: &str, issuer: &str, account: &str) -> AuthResult<bool> {
    let code = code.trim();
    if code.len() != 6 || !code.chars().all(|c| c.is_ascii_digit()) {
        return Ok(false);
    }

    build(secret, issuer, account)?
        .check_current(code)
        .map_err(|e| AuthError::InvalidToken(e.to_string()))
}

pub fn generate_backup_codes() -> Vec<String> {
    let mut rng = rand::thread_rng();
    (0..BACKUP_CODE_COUNT)
        .map(|_| hex::encode_upper(rng.gen::<[u8; 4]>()))
        .collect()
}

fn build(secret: &str, issuer: &str, account: &str) -> AuthResult<TOTP> {
    let bytes = Secret::Encoded(secret.to_string())
        .to_bytes()
        .map_err(|e| AuthError::InvalidToken(format!("bad TOTP secret: {e:?}")))?;

    TOTP::new(
        Algorithm::SHA1,
        6,
        1,
        30,
        bytes,
        Some(issuer.to_string()),
        account.to_string(),
    )
    .map_err(|e| AuthError::InvalidToken(format!("bad TOTP parameters: {e:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enrollment_shape() {
        let enrollment = enroll("Caixa", "ana@loja.com.br").unwrap();

        assert!(enrollment.provisioning_url.starts_with("otpauth://totp/"));
        assert!(enrollment.provisioning_url.contains("issuer=Caixa"));
        assert_eq!(enrollment.backup_codes.len(), BACKUP_CODE_COUNT);
        for code in &enrollment.backup_codes {
            assert_eq!(code.len(), 8);
            assert!(code.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
        }
    }

    #[test]
    fn test_current_code_verifies() {
        let enrollment = enroll("Caixa", "ana@loja.com.br").unwrap();
        let totp = build(&enrollment.secret, "Caixa", "ana@loja.com.br").unwrap();
        let code = totp.generate_current().unwrap();

        assert!(verify_code(&enrollment.secret, &code, "Caixa", "ana@loja.com.br").unwrap());
    }

    #[test]
    fn test_malformed_codes_fail() {
        let enrollment = enroll("Caixa", "ana@loja.com.br").unwrap();
        for code in ["", "12345", "abcdef", "1234567"] {
            assert!(!verify_code(&enrollment.secret, code, "Caixa", "ana@loja.com.br").unwrap());
        }
    }
}
