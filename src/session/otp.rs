use chrono::{DateTime, Utc};
use totp_rs::{Algorithm, Secret, TOTP};

use crate::utils::error::AuthError;

pub const STEP_SECS: u64 = 30;
const DIGITS: usize = 6;

/// A code for one time window, relative to the challenge time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpCandidate {
    pub code: String,
    pub window_offset: i64,
}

/// RFC 6238 code generator for the account's base32 secret.
pub struct OtpGenerator {
    totp: TOTP,
}

impl OtpGenerator {
    pub fn new(secret: &str) -> Result<Self, AuthError> {
        let normalized: String = secret
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_uppercase();

        if normalized.is_empty() {
            return Err(AuthError::InvalidCredentials("OTP secret is empty".to_string()));
        }

        let bytes = Secret::Encoded(normalized)
            .to_bytes()
            .map_err(|e| AuthError::InvalidCredentials(format!("OTP secret is not valid base32: {:?}", e)))?;

        Ok(Self {
            totp: TOTP::new_unchecked(Algorithm::SHA1, DIGITS, 1, STEP_SECS, bytes),
        })
    }

    pub fn code_at(&self, unix_secs: u64) -> String {
        self.totp.generate(unix_secs)
    }

    /// Current window first, then the previous and next to absorb clock skew.
    pub fn candidate_codes(&self, now: DateTime<Utc>) -> Vec<OtpCandidate> {
        let now = u64::try_from(now.timestamp()).unwrap_or(0);
        [0i64, -1, 1]
            .into_iter()
            .map(|offset| {
                let at = if offset < 0 {
                    now.saturating_sub(STEP_SECS)
                } else {
                    now + offset as u64 * STEP_SECS
                };
                OtpCandidate {
                    code: self.code_at(at),
                    window_offset: offset,
                }
            })
            .collect()
    }
}
