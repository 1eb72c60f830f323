use rand::Rng;
use time::{Duration, OffsetDateTime};

use crate::config::MAX_TTL_MINUTES;

pub const OTP_LEN: usize = 6;

/// Six-digit numeric code, never starting with zero.
pub fn generate_otp() -> String {
    rand::thread_rng().gen_range(100_000..=999_999u32).to_string()
}

pub fn is_expired(issued_at: OffsetDateTime, ttl_minutes: i64, now: OffsetDateTime) -> bool {
    now - issued_at > Duration::minutes(ttl_minutes.clamp(0, MAX_TTL_MINUTES))
}

pub fn is_well_formed(otp: &str) -> bool {
    otp.len() == OTP_LEN && otp.bytes().all(|b| b.is_ascii_digit())
}
