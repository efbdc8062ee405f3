//! Slack request signing: `v0=` HMAC-SHA256 over `v0:{timestamp}:{body}`.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
pub const SIGNATURE_HEADER: &str = "x-slack-signature";
pub const MAX_REQUEST_AGE_SECS: i64 = 5 * 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing request timestamp")]
    MissingTimestamp,
    #[error("missing request signature")]
    MissingSignature,
    #[error("request timestamp is {age_secs}s old")]
    Stale { age_secs: i64 },
    #[error("signature is not v0 hex")]
    Encoding,
    #[error("signature does not match")]
    Mismatch,
    #[error("signing secret rejected by hmac")]
    Key,
}

#[derive(Clone)]
pub struct SignatureVerifier {
    secret: SecretString,
    tolerance_secs: i64,
}

impl SignatureVerifier {
    pub fn new(secret: SecretString) -> Self {
        Self { secret, tolerance_secs: MAX_REQUEST_AGE_SECS }
    }

    pub fn verify(
        &self,
        timestamp: Option<&str>,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<(), SignatureError> {
        self.verify_at(timestamp, signature, body, chrono::Utc::now().timestamp())
    }

    pub fn verify_at(
        &self,
        timestamp: Option<&str>,
        signature: Option<&str>,
        body: &[u8],
        now_secs: i64,
    ) -> Result<(), SignatureError> {
        let timestamp = timestamp.map(str::trim).ok_or(SignatureError::MissingTimestamp)?;
        let signature = signature.map(str::trim).ok_or(SignatureError::MissingSignature)?;
        let issued: i64 = timestamp.parse().map_err(|_| SignatureError::MissingTimestamp)?;

        let age_secs = (now_secs - issued).abs();
        if age_secs > self.tolerance_secs {
            return Err(SignatureError::Stale { age_secs });
        }

        let expected = signature
            .strip_prefix("v0=")
            .and_then(|digest| hex::decode(digest).ok())
            .ok_or(SignatureError::Encoding)?;

        mac(&self.secret, timestamp, body)?
            .verify_slice(&expected)
            .map_err(|_| SignatureError::Mismatch)
    }
}

/// The `X-Slack-Signature` value Slack would send for `body`.
pub fn sign(secret: &SecretString, timestamp: &str, body: &[u8]) -> Result<String, SignatureError> {
    let digest = mac(secret, timestamp, body)?.finalize().into_bytes();
    Ok(format!("v0={}", hex::encode(digest)))
}

fn mac(secret: &SecretString, timestamp: &str, body: &[u8]) -> Result<HmacSha256, SignatureError> {
    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|_| SignatureError::Key)?;
    mac.update(b"v0:");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);
    Ok(mac)
}
