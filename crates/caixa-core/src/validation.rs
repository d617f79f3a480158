//! # Validation Module
//!
//! Input validation and formatting utilities.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: HTTP handler                                                 │
//! │  └── Type validation (JSON deserialization)                            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Services                                                      │
//! │  └── THIS MODULE: documents (CPF/CNPJ), contact data, passwords,       │
//! │      names, quantities                                                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── NOT NULL / CHECK (amount_cents > 0)                               │
//! │  └── UNIQUE (username, email, one open session per tenant)             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use caixa_core::validation::{format_cpf_cnpj, is_valid_cpf};
//!
//! assert!(is_valid_cpf("529.982.247-25"));
//! assert_eq!(format_cpf_cnpj("52998224725"), "529.982.247-25");
//! ```

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ValidationError;
use crate::MAX_ITEM_QUANTITY;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("static email pattern")
});

/// Disposable mail providers refused at registration.
const BLOCKED_EMAIL_DOMAINS: [&str; 3] = ["tempmail.com", "10minutemail.com", "guerrillamail.com"];

const COMMON_PASSWORDS: [&str; 10] = [
    "password",
    "123456",
    "123456789",
    "qwerty",
    "abc123",
    "password123",
    "admin",
    "letmein",
    "welcome",
    "monkey",
];

const PASSWORD_SPECIALS: &str = "!@#$%^&*()_+-=[]{}|;':\",./<>?";

fn digits_of(value: &str) -> Vec<u32> {
    value.chars().filter_map(|c| c.to_digit(10)).collect()
}

fn only_digits(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}

// =============================================================================
// Brazilian Documents
// =============================================================================

/// Mod-11 check digit over `digits` with the given weights.
fn check_digit(digits: &[u32], weights: &[u32]) -> u32 {
    let sum: u32 = digits.iter().zip(weights).map(|(d, w)| d * w).sum();
    let remainder = sum % 11;
    if remainder < 2 {
        0
    } else {
        11 - remainder
    }
}

/// Validates a CPF (individual taxpayer id), punctuation ignored.
///
/// ## Rules
/// - Exactly 11 digits
/// - Not all the same digit (`111.111.111-11` passes the checksum but is invalid)
/// - Both mod-11 check digits match
///
/// ## Example
/// ```rust
/// use caixa_core::validation::is_valid_cpf;
///
/// assert!(is_valid_cpf("52998224725"));
/// assert!(!is_valid_cpf("52998224724"));
/// assert!(!is_valid_cpf("11111111111"));
/// ```
pub fn is_valid_cpf(cpf: &str) -> bool {
    let digits = digits_of(cpf);
    if digits.len() != 11 || digits.iter().all(|d| *d == digits[0]) {
        return false;
    }

    let first = check_digit(&digits[..9], &[10, 9, 8, 7, 6, 5, 4, 3, 2]);
    let second = check_digit(&digits[..10], &[11, 10, 9, 8, 7, 6, 5, 4, 3, 2]);
    digits[9] == first && digits[10] == second
}

/// Validates a CNPJ (company taxpayer id), punctuation ignored.
///
/// ```rust
/// use caixa_core::validation::is_valid_cnpj;
///
/// assert!(is_valid_cnpj("11.222.333/0001-81"));
/// assert!(!is_valid_cnpj("11.222.333/0001-82"));
/// ```
pub fn is_valid_cnpj(cnpj: &str) -> bool {
    let digits = digits_of(cnpj);
    if digits.len() != 14 || digits.iter().all(|d| *d == digits[0]) {
        return false;
    }

    let first = check_digit(&digits[..12], &[5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2]);
    let second = check_digit(&digits[..13], &[6, 5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2]);
    digits[12] == first && digits[13] == second
}

/// Formats 11 digits as CPF and 14 digits as CNPJ; anything else is
/// returned unchanged.
pub fn format_cpf_cnpj(document: &str) -> String {
    let d = only_digits(document);
    match d.len() {
        11 => format!("{}.{}.{}-{}", &d[..3], &d[3..6], &d[6..9], &d[9..]),
        14 => format!(
            "{}.{}.{}/{}-{}",
            &d[..2],
            &d[2..5],
            &d[5..8],
            &d[8..12],
            &d[12..]
        ),
        _ => document.to_string(),
    }
}

// =============================================================================
// Contact Data
// =============================================================================

/// Validates an email address.
///
/// ## Rules
/// - At most 254 characters
/// - `local@domain.tld` shape with a 2+ letter TLD
/// - Domain not in the disposable-mail block list
pub fn validate_email(email: &str) -> ValidationResult<()> {
    let email = email.trim();

    if email.is_empty() {
        return Err(ValidationError::required("email"));
    }

    if email.len() > 254 {
        return Err(ValidationError::TooLong {
            field: "email".to_string(),
            max: 254,
        });
    }

    if !EMAIL_RE.is_match(email) {
        return Err(ValidationError::invalid("email", "not a valid email address"));
    }

    let domain = email.rsplit('@').next().unwrap_or_default().to_lowercase();
    if BLOCKED_EMAIL_DOMAINS.contains(&domain.as_str()) {
        return Err(ValidationError::invalid("email", "disposable email domains are not accepted"));
    }

    Ok(())
}

/// Validates a phone number: 10 to 15 digits once punctuation is removed.
pub fn validate_phone(phone: &str) -> ValidationResult<()> {
    let len = only_digits(phone).len();
    if (10..=15).contains(&len) {
        Ok(())
    } else {
        Err(ValidationError::invalid("phone", "must have between 10 and 15 digits"))
    }
}

/// Formats Brazilian phone numbers.
///
/// | digits | output |
/// |--------|--------|
/// | 11 | `(11) 98765-4321` |
/// | 10 | `(11) 8765-4321` |
/// | 9  | `98765-4321` |
/// | 8  | `8765-4321` |
///
/// Other lengths are returned unchanged.
pub fn format_phone(phone: &str) -> String {
    let d = only_digits(phone);
    match d.len() {
        11 => format!("({}) {}-{}", &d[..2], &d[2..7], &d[7..]),
        10 => format!("({}) {}-{}", &d[..2], &d[2..6], &d[6..]),
        9 => format!("{}-{}", &d[..5], &d[5..]),
        8 => format!("{}-{}", &d[..4], &d[4..]),
        _ => phone.to_string(),
    }
}

// =============================================================================
// Accounts
// =============================================================================

/// Validates a username: 3 to 80 characters, no whitespace.
pub fn validate_username(username: &str) -> ValidationResult<()> {
    let username = username.trim();

    if username.is_empty() {
        return Err(ValidationError::required("username"));
    }
    if username.chars().count() < 3 {
        return Err(ValidationError::TooShort {
            field: "username".to_string(),
            min: 3,
        });
    }
    if username.chars().count() > 80 {
        return Err(ValidationError::TooLong {
            field: "username".to_string(),
            max: 80,
        });
    }
    if username.chars().any(char::is_whitespace) {
        return Err(ValidationError::invalid("username", "must not contain spaces"));
    }

    Ok(())
}

/// Checks password strength.
///
/// ## Rules
/// - 8 to 128 characters
/// - At least one upper-case letter, one lower-case letter, one digit and
///   one special character
/// - Not one of the well-known common passwords
/// - At least 4 distinct characters
pub fn validate_password_strength(password: &str) -> ValidationResult<()> {
    let weak = |reason: &str| ValidationError::invalid("password", reason);
    let len = password.chars().count();

    if len < 8 {
        return Err(ValidationError::TooShort {
            field: "password".to_string(),
            min: 8,
        });
    }
    if len > 128 {
        return Err(ValidationError::TooLong {
            field: "password".to_string(),
            max: 128,
        });
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        return Err(weak("must contain an upper-case letter"));
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        return Err(weak("must contain a lower-case letter"));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(weak("must contain a digit"));
    }
    if !password.chars().any(|c| PASSWORD_SPECIALS.contains(c)) {
        return Err(weak("must contain a special character"));
    }
    if COMMON_PASSWORDS.contains(&password.to_lowercase().as_str()) {
        return Err(weak("is too common"));
    }

    let mut distinct: Vec<char> = password.chars().collect();
    distinct.sort_unstable();
    distinct.dedup();
    if distinct.len() < 4 {
        return Err(weak("must use at least 4 different characters"));
    }

    Ok(())
}

// =============================================================================
// Catalogue & Sales
// =============================================================================

/// Validates a product name: 1 to 200 characters after trimming.
pub fn validate_product_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::required("name"));
    }
    if name.chars().count() > 200 {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: 200,
        });
    }

    Ok(())
}

/// Validates a sale quantity: 1 to [`MAX_ITEM_QUANTITY`].
pub fn validate_quantity(quantity: i64) -> ValidationResult<()> {
    if quantity < 1 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }
    if quantity > MAX_ITEM_QUANTITY {
        return Err(ValidationError::invalid(
            "quantity",
            format!("must be at most {}", MAX_ITEM_QUANTITY),
        ));
    }

    Ok(())
}

/// Trims a free-text tag and rejects it when empty.
pub fn require_text(field: &str, value: &str) -> ValidationResult<String> {
    let value = value.trim();
    if value.is_empty() {
        Err(ValidationError::required(field))
    } else {
        Ok(value.to_string())
    }
}

/// Trims optional free text, mapping blank to `None`.
pub fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpf() {
        assert!(is_valid_cpf("529.982.247-25"));
        assert!(is_valid_cpf("11144477735"));
        assert!(!is_valid_cpf("529.982.247-26"));
        assert!(!is_valid_cpf("000.000.000-00"));
        assert!(!is_valid_cpf("1234567890"));
    }

    #[test]
    fn test_cnpj() {
        assert!(is_valid_cnpj("11222333000181"));
        assert!(!is_valid_cnpj("11222333000180"));
        assert!(!is_valid_cnpj("00000000000000"));
        assert!(!is_valid_cnpj("112223330001"));
    }

    #[test]
    fn test_format_documents() {
        assert_eq!(format_cpf_cnpj("11144477735"), "111.444.777-35");
        assert_eq!(format_cpf_cnpj("11222333000181"), "11.222.333/0001-81");
        assert_eq!(format_cpf_cnpj("123"), "123");
    }

    #[test]
    fn test_email() {
        assert!(validate_email("ana@loja.com.br").is_ok());
        assert!(validate_email("ana@loja").is_err());
        assert!(validate_email("").is_err());
        assert!(validate_email("x@tempmail.com").is_err());
        assert!(validate_email(&format!("{}@a.com", "a".repeat(250))).is_err());
    }

    #[test]
    fn test_phone() {
        assert!(validate_phone("(11) 98765-4321").is_ok());
        assert!(validate_phone("987654321").is_err());
        assert_eq!(format_phone("11987654321"), "(11) 98765-4321");
        assert_eq!(format_phone("1187654321"), "(11) 8765-4321");
        assert_eq!(format_phone("987654321"), "98765-4321");
        assert_eq!(format_phone("87654321"), "8765-4321");
        assert_eq!(format_phone("12"), "12");
    }

    #[test]
    fn test_password_strength() {
        assert!(validate_password_strength("Caixa#2024").is_ok());
        assert!(validate_password_strength("Sh0rt!").is_err());
        assert!(validate_password_strength("alllower1!").is_err());
        assert!(validate_password_strength("ALLUPPER1!").is_err());
        assert!(validate_password_strength("NoDigits!!").is_err());
        assert!(validate_password_strength("NoSpecial12").is_err());
        assert!(validate_password_strength(&"Aa1!".repeat(40)).is_err());
    }

    #[test]
    fn test_quantity_and_names() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(MAX_ITEM_QUANTITY + 1).is_err());
        assert!(validate_product_name("  ").is_err());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("ana silva").is_err());
        assert!(validate_username("ana").is_ok());
    }

    #[test]
    fn test_text_helpers() {
        assert_eq!(require_text("origin", "  venda ").unwrap(), "venda");
        assert!(require_text("origin", " ").is_err());
        assert_eq!(optional_text(Some("  ")), None);
        assert_eq!(optional_text(Some(" x ")), Some("x".to_string()));
    }
}
