//! Time-based one-time codes (RFC 6238, HMAC-SHA1, 30 second step, 6 digits).
//!
//! Secrets are base32 and are often pasted with spaces or in lower case, so
//! whitespace is stripped and the secret is case-folded before decoding.
//! A secret that cannot be decoded yields an empty string instead of an
//! error; callers treat an empty code as "no code available".

use hmac::{Hmac, Mac};
use sha1::Sha1;

/// Length of one time step in seconds
pub const TIME_STEP_SECS: u64 = 30;

/// Number of digits in a generated code
pub const CODE_DIGITS: u32 = 6;

/// Generate the code for the current wall-clock time.
pub fn generate(secret: &str) -> String {
    let now = chrono::Utc::now().timestamp().max(0) as u64;
    generate_at(secret, now)
}

/// Generate the code for the time step containing `unix_secs`.
pub fn generate_at(secret: &str, unix_secs: u64) -> String {
    match decode_secret(secret) {
        Some(key) => hotp(&key, unix_secs / TIME_STEP_SECS).unwrap_or_default(),
        None => {
            tracing::error!("shared secret is not valid base32");
            String::new()
        }
    }
}

/// Index of the time step containing `unix_secs`
pub fn time_step(unix_secs: u64) -> u64 {
    unix_secs / TIME_STEP_SECS
}

fn decode_secret(secret: &str) -> Option<Vec<u8>> {
    let cleaned: String = secret
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    let cleaned = cleaned.trim_end_matches('=');
    if cleaned.is_empty() {
        return None;
    }
    base32::decode(base32::Alphabet::Rfc4648 { padding: false }, cleaned).filter(|key| !key.is_empty())
}

fn hotp(key: &[u8], counter: u64) -> Option<String> {
    let mut mac = Hmac::<Sha1>::new_from_slice(key).ok()?;
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    // dynamic truncation
    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let binary = u32::from_be_bytes([
        digest[offset] & 0x7f,
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ]);
    let code = binary % 10u32.pow(CODE_DIGITS);
    Some(format!("{:0width$}", code, width = CODE_DIGITS as usize))
}
