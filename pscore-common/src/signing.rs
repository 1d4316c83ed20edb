//! Attachment URL signing
//!
//! Download links for appeal attachments carry an expiry (Unix epoch seconds)
//! and a SHA-256 signature over `path`, `expiry` and a server-side secret.
//!
//! # Pure Functions
//!
//! This module contains ONLY pure functions and database operations.
//! No HTTP framework dependencies - URL assembly and serving live in the server.

use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tracing::info;

use crate::Result;

/// Settings key holding the attachment signing secret
pub const SIGNING_SECRET_KEY: &str = "attachment_signing_secret";

/// Reasons a signed link is rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// Link expiry is in the past
    Expired { expires: i64, now: i64 },

    /// Signature does not match the calculated value
    Mismatch,
}

impl std::fmt::Display for SignatureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignatureError::Expired { expires, now } => {
                write!(f, "Link expired at {} (now {})", expires, now)
            }
            SignatureError::Mismatch => write!(f, "Signature mismatch"),
        }
    }
}

impl std::error::Error for SignatureError {}

/// Calculate the signature for a stored attachment path
///
/// SHA-256 of `"{path}\n{expires}\n{secret}"`, as 64 lowercase hex characters.
pub fn sign(secret: &str, path: &str, expires: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    hasher.update(b"\n");
    hasher.update(expires.to_string().as_bytes());
    hasher.update(b"\n");
    hasher.update(secret.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Verify a signature and expiry against `now` (epoch seconds)
pub fn verify(
    secret: &str,
    path: &str,
    expires: i64,
    signature: &str,
    now: i64,
) -> std::result::Result<(), SignatureError> {
    if expires < now {
        return Err(SignatureError::Expired { expires, now });
    }

    let calculated = sign(secret, path, expires);
    if !constant_time_eq(calculated.as_bytes(), signature.as_bytes()) {
        return Err(SignatureError::Mismatch);
    }

    Ok(())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Load the signing secret from the settings table, generating one if absent
pub async fn load_or_init_secret(db: &SqlitePool) -> Result<String> {
    let existing: Option<String> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(SIGNING_SECRET_KEY)
            .fetch_optional(db)
            .await?;

    if let Some(secret) = existing.filter(|s| !s.is_empty()) {
        return Ok(secret);
    }

    let secret = generate_secret();
    sqlx::query("INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)")
        .bind(SIGNING_SECRET_KEY)
        .bind(&secret)
        .execute(db)
        .await?;

    info!("Generated new attachment signing secret");
    Ok(secret)
}

/// Random 256-bit secret as hex
fn generate_secret() -> String {
    use rand::RngCore;

    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_is_64_hex_chars() {
        let sig = sign("secret", "appeals/a.pdf", 1_700_000_000);
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_sign_depends_on_every_input() {
        let base = sign("secret", "appeals/a.pdf", 100);
        assert_ne!(base, sign("other", "appeals/a.pdf", 100));
        assert_ne!(base, sign("secret", "appeals/b.pdf", 100));
        assert_ne!(base, sign("secret", "appeals/a.pdf", 101));
    }

    #[test]
    fn test_verify_accepts_valid_signature() {
        let sig = sign("secret", "p", 200);
        assert_eq!(verify("secret", "p", 200, &sig, 150), Ok(()));
    }

    #[test]
    fn test_verify_rejects_expired() {
        let sig = sign("secret", "p", 100);
        assert_eq!(
            verify("secret", "p", 100, &sig, 101),
            Err(SignatureError::Expired { expires: 100, now: 101 })
        );
    }

    #[test]
    fn test_verify_rejects_tampered_path() {
        let sig = sign("secret", "p", 200);
        assert_eq!(
            verify("secret", "q", 200, &sig, 150),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_generated_secret_is_random() {
        let a = generate_secret();
        assert_eq!(a.len(), 64);
        assert_ne!(a, generate_secret());
    }
}
