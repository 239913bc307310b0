//! Request signing for the ASR endpoint (`signType=v2`).
//!
//! ```text
//! sign = HEX_UPPER(SHA-256(appKey + truncate(q) + salt + curtime + appSecret))
//! ```
//!
//! `truncate(q)` keeps `q` verbatim when it is at most 20 characters long,
//! otherwise it is the first 10 characters, the decimal length of `q`, and the
//! last 10 characters.

use std::borrow::Cow;
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

/// Signature scheme version sent as `signType`.
pub const SIGNATURE_VERSION: &str = "v2";

/// Inputs up to this many characters are signed verbatim.
const TRUNCATE_THRESHOLD: usize = 20;

/// Characters kept from each end of a long input.
const TRUNCATE_EDGE: usize = 10;

/// Reduce the payload to the form that enters the signature.
pub fn truncate_input(q: &str) -> Cow<'_, str> {
    let len = q.chars().count();
    if len <= TRUNCATE_THRESHOLD {
        return Cow::Borrowed(q);
    }

    let head: String = q.chars().take(TRUNCATE_EDGE).collect();
    let tail: String = q.chars().skip(len - TRUNCATE_EDGE).collect();
    Cow::Owned(format!("{head}{len}{tail}"))
}

/// Compute the uppercase hex SHA-256 signature for one request.
pub fn compute_signature(
    app_key: &str,
    q: &str,
    salt: &str,
    curtime: &str,
    app_secret: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(app_key.as_bytes());
    hasher.update(truncate_input(q).as_bytes());
    hasher.update(salt.as_bytes());
    hasher.update(curtime.as_bytes());
    hasher.update(app_secret.as_bytes());
    hex::encode_upper(hasher.finalize())
}

/// Fresh per-request nonce.
pub fn generate_salt() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Current Unix time in whole seconds, as sent in `curtime`.
pub fn current_timestamp() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
        .to_string()
}
