//! # Login Security Rules
//!
//! Pure decisions taken during login: lockout after repeated failures,
//! device binding, and backup-code consumption. Callers pass `now`.
//!
//! ## Login Pipeline
//! ```text
//! credentials
//!     │
//!     ▼
//! locked? ──yes──► AccountLocked (password is not even checked)
//!     │ no
//!     ▼
//! password ok? ──no──► count failure → maybe lock for 30 min
//!     │ yes
//!     ▼
//! 2FA enabled? ──yes──► challenge (TOTP or backup code)
//!     │
//!     ▼
//! check_device ──Mismatch──► DeviceMismatch { can_unlink }
//!     │ Bind / Match / Rebind
//!     ▼
//! new active session id
//! ```

use chrono::{DateTime, Duration, Utc};

use crate::types::UserRole;

// =============================================================================
// Lockout
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    /// Failed attempts that trigger a lock.
    pub max_attempts: i64,
    pub lock_duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        LockoutPolicy {
            max_attempts: 5,
            lock_duration: Duration::minutes(30),
        }
    }
}

/// Counter state after a failed password or second factor.
///
/// The counter is bumped in one SQL statement by the user repository; this
/// is the row it returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailedLogin {
    pub failed_attempts: i64,
    pub locked_until: Option<DateTime<Utc>>,
}

impl LockoutPolicy {
    pub fn is_locked(&self, locked_until: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        locked_until.is_some_and(|until| until > now)
    }

    /// End of a lock taken at `now`.
    pub fn lock_deadline(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.lock_duration
    }

    /// The lock a failure left behind, if it locked the account.
    ///
    /// A lock that already expired starts a fresh count, so one typo after
    /// the lock window does not relock the account.
    pub fn lock_after(&self, failed: &FailedLogin, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        failed
            .locked_until
            .filter(|until| self.is_locked(Some(*until), now))
    }
}

// =============================================================================
// Device Binding
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCheck {
    /// No device bound yet: bind this one.
    Bind,
    Match,
    /// Admin asked to move the binding to this device.
    Rebind,
    Mismatch { can_unlink: bool },
}

impl DeviceCheck {
    /// Whether the stored binding must be written.
    pub fn needs_write(&self) -> bool {
        matches!(self, DeviceCheck::Bind | DeviceCheck::Rebind)
    }
}

/// Decides what a login from `current` means for an account bound to `bound`.
pub fn check_device(
    bound: Option<&str>,
    current: &str,
    role: UserRole,
    unlink_requested: bool,
) -> DeviceCheck {
    match bound {
        None | Some("") => DeviceCheck::Bind,
        Some(b) if b == current => DeviceCheck::Match,
        Some(_) if role.is_admin() && unlink_requested => DeviceCheck::Rebind,
        Some(_) => DeviceCheck::Mismatch {
            can_unlink: role.is_admin(),
        },
    }
}

// =============================================================================
// Backup Codes
// =============================================================================

pub fn normalize_backup_code(code: &str) -> String {
    code.trim().replace([' ', '-'], "").to_uppercase()
}

/// Removes `candidate` from `codes` when present.
///
/// Returns the remaining codes on a hit; `None` means the code is not valid.
pub fn consume_backup_code(codes: &[String], candidate: &str) -> Option<Vec<String>> {
    let candidate = normalize_backup_code(candidate);
    if candidate.is_empty() {
        return None;
    }

    let position = codes.iter().position(|c| normalize_backup_code(c) == candidate)?;
    let mut remaining = codes.to_vec();
    remaining.remove(position);
    Some(remaining)
}

// =============================================================================
// Unit Tests
// =============================================================================
