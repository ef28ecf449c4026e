//! Secure random refresh token generation.

use base64::Engine;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use rand::RngCore;

use crate::config::DEFAULT_REFRESH_TOKEN_DAYS;
use crate::models::auth::RefreshTokenRecord;

/// Random bytes per refresh token (256 bits).
pub const REFRESH_TOKEN_BYTES: usize = 32;

/// Current time at microsecond precision, the resolution stores keep.
pub fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Produces unguessable opaque refresh tokens.
///
/// No collision check against the store is made; 256 bits from the OS-seeded
/// CSPRNG make a collision negligible.
#[derive(Debug, Clone, Copy)]
pub struct RefreshTokenGenerator {
    validity: Duration,
}

impl Default for RefreshTokenGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_REFRESH_TOKEN_DAYS)
    }
}

impl RefreshTokenGenerator {
    pub fn new(validity_days: i64) -> Self {
        Self {
            validity: Duration::days(validity_days),
        }
    }

    pub fn validity(&self) -> Duration {
        self.validity
    }

    /// Fresh active record: created now, expiring after the validity window.
    pub fn generate(&self) -> RefreshTokenRecord {
        let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        let now = timestamp_now();
        RefreshTokenRecord {
            token: base64::engine::general_purpose::STANDARD.encode(bytes),
            created_at: now,
            expires_at: now + self.validity,
            revoked_at: None,
        }
    }
}
