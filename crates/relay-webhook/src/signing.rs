// SPDX-FileCopyrightText: 2026 Relay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HMAC-SHA256 signing of nudge requests and receiver-side verification.
//!
//! The signed string is `"{timestamp}.{nonce}.{body}"`; the signature is
//! lowercase hex. Receivers check freshness of the timestamp and reject a
//! nonce they have already seen inside the freshness window.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use thiserror::Error;

use relay_core::RelayError;

pub const TIMESTAMP_HEADER: &str = "X-Relay-Timestamp";
pub const NONCE_HEADER: &str = "X-Relay-Nonce";
pub const SIGNATURE_HEADER: &str = "X-Relay-Signature";

/// Default freshness window for [`NudgeVerifier`].
pub const DEFAULT_MAX_AGE_SECS: i64 = 300;

type HmacSha256 = Hmac<Sha256>;

#[derive(Serialize)]
struct NudgeBody<'a> {
    event: &'static str,
    backend_bot_id: &'a str,
    sent_at: String,
}

/// A ready-to-send nudge request body with its signing headers.
#[derive(Debug, Clone)]
pub struct SignedNudge {
    pub timestamp: String,
    pub nonce: String,
    pub signature: String,
    pub body: Vec<u8>,
}

impl SignedNudge {
    /// Builds and signs the nudge body for `backend_bot_id` at `now`.
    pub fn new(backend_bot_id: &str, secret: &[u8], now: DateTime<Utc>) -> Result<Self, RelayError> {
        let body = serde_json::to_vec(&NudgeBody {
            event: "messages_available",
            backend_bot_id,
            sent_at: now.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        })
        .map_err(|e| RelayError::Internal(format!("failed to encode nudge body: {e}")))?;

        let timestamp = now.timestamp().to_string();
        let nonce = uuid::Uuid::new_v4().to_string();
        let signature = sign(secret, &timestamp, &nonce, &body)?;

        Ok(Self {
            timestamp,
            nonce,
            signature,
            body,
        })
    }

    /// Header name/value pairs to attach to the request.
    pub fn headers(&self) -> [(&'static str, &str); 3] {
        [
            (TIMESTAMP_HEADER, self.timestamp.as_str()),
            (NONCE_HEADER, self.nonce.as_str()),
            (SIGNATURE_HEADER, self.signature.as_str()),
        ]
    }
}

fn mac_for(secret: &[u8], timestamp: &str, nonce: &str, body: &[u8]) -> Result<HmacSha256, RelayError> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| RelayError::Internal(format!("invalid hmac key: {e}")))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(nonce.as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(mac)
}

/// Hex HMAC-SHA256 over `"{timestamp}.{nonce}.{body}"`.
pub fn sign(secret: &[u8], timestamp: &str, nonce: &str, body: &[u8]) -> Result<String, RelayError> {
    let mac = mac_for(secret, timestamp, nonce, body)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a hex signature.
pub fn verify_signature(
    secret: &[u8],
    timestamp: &str,
    nonce: &str,
    body: &[u8],
    signature_hex: &str,
) -> bool {
    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };
    match mac_for(secret, timestamp, nonce, body) {
        Ok(mac) => mac.verify_slice(&signature).is_ok(),
        Err(_) => false,
    }
}

/// Why a received nudge was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    #[error("missing header {0}")]
    MissingHeader(&'static str),
    #[error("timestamp is not a unix time in seconds")]
    InvalidTimestamp,
    #[error("timestamp outside the accepted window")]
    StaleTimestamp,
    #[error("signature does not match")]
    InvalidSignature,
    #[error("nonce already used")]
    ReplayedNonce,
}

/// Receiver-side verification with replay protection.
///
/// Holds the nonces it accepted in the last `max_age_secs` seconds.
#[derive(Debug)]
pub struct NudgeVerifier {
    secret: Vec<u8>,
    max_age_secs: i64,
    seen: Mutex<HashMap<String, i64>>,
}

impl NudgeVerifier {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self::with_max_age(secret, DEFAULT_MAX_AGE_SECS)
    }

    pub fn with_max_age(secret: impl Into<Vec<u8>>, max_age_secs: i64) -> Self {
        Self {
            secret: secret.into(),
            max_age_secs,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Verifies a request given its headers (case-insensitive names) and raw body.
    pub fn verify_headers<'a, I>(
        &self,
        headers: I,
        body: &[u8],
        now_secs: i64,
    ) -> Result<(), VerificationError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut timestamp = None;
        let mut nonce = None;
        let mut signature = None;
        for (name, value) in headers {
            if name.eq_ignore_ascii_case(TIMESTAMP_HEADER) {
                timestamp = Some(value);
            } else if name.eq_ignore_ascii_case(NONCE_HEADER) {
                nonce = Some(value);
            } else if name.eq_ignore_ascii_case(SIGNATURE_HEADER) {
                signature = Some(value);
            }
        }

        self.verify(
            timestamp.ok_or(VerificationError::MissingHeader(TIMESTAMP_HEADER))?,
            nonce.ok_or(VerificationError::MissingHeader(NONCE_HEADER))?,
            signature.ok_or(VerificationError::MissingHeader(SIGNATURE_HEADER))?,
            body,
            now_secs,
        )
    }

    /// Verifies one request. A nonce is only remembered once the signature checks out.
    pub fn verify(
        &self,
        timestamp: &str,
        nonce: &str,
        signature: &str,
        body: &[u8],
        now_secs: i64,
    ) -> Result<(), VerificationError> {
        let ts: i64 = timestamp
            .parse()
            .map_err(|_| VerificationError::InvalidTimestamp)?;
        if now_secs.abs_diff(ts) > self.max_age_secs.unsigned_abs() {
            return Err(VerificationError::StaleTimestamp);
        }
        if !verify_signature(&self.secret, timestamp, nonce, body, signature) {
            return Err(VerificationError::InvalidSignature);
        }

        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        seen.retain(|_, at| now_secs.abs_diff(*at) <= self.max_age_secs.unsigned_abs());
        if seen.contains_key(nonce) {
            return Err(VerificationError::ReplayedNonce);
        }
        seen.insert(nonce.to_string(), ts);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn signed_nudge_verifies() {
        let nudge = SignedNudge::new("support", b"s3cret", now()).unwrap();
        let verifier = NudgeVerifier::new("s3cret");
        assert_eq!(
            verifier.verify_headers(nudge.headers(), &nudge.body, now().timestamp()),
            Ok(())
        );
    }

    #[test]
    fn body_carries_no_message_payload() {
        let nudge = SignedNudge::new("support", b"s3cret", now()).unwrap();
        let body: serde_json::Value = serde_json::from_slice(&nudge.body).unwrap();
        assert_eq!(body["event"], "messages_available");
        assert_eq!(body["backend_bot_id"], "support");
        assert_eq!(body.as_object().unwrap().len(), 3);
    }

    #[test]
    fn replayed_nonce_is_rejected() {
        let nudge = SignedNudge::new("support", b"s3cret", now()).unwrap();
        let verifier = NudgeVerifier::new("s3cret");
        let t = now().timestamp();
        verifier.verify_headers(nudge.headers(), &nudge.body, t).unwrap();
        assert_eq!(
            verifier.verify_headers(nudge.headers(), &nudge.body, t + 1),
            Err(VerificationError::ReplayedNonce)
        );
    }

    #[test]
    fn extreme_timestamps_are_stale() {
        let verifier = NudgeVerifier::new("s3cret");
        let t = now().timestamp();
        for ts in [i64::MIN, i64::MAX] {
            assert_eq!(
                verifier.verify(&ts.to_string(), "n1", "00", b"", t),
                Err(VerificationError::StaleTimestamp)
            );
        }
        assert_eq!(
            verifier.verify("0", "n1", "00", b"", i64::MIN),
            Err(VerificationError::StaleTimestamp)
        );
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let nudge = SignedNudge::new("support", b"s3cret", now()).unwrap();
        let verifier = NudgeVerifier::new("s3cret");
        assert_eq!(
            verifier.verify_headers(nudge.headers(), &nudge.body, now().timestamp() + 301),
            Err(VerificationError::StaleTimestamp)
        );
    }

    #[test]
    fn wrong_secret_or_tampered_body_is_rejected() {
        let nudge = SignedNudge::new("support", b"s3cret", now()).unwrap();
        let t = now().timestamp();
        assert_eq!(
            NudgeVerifier::new("other").verify_headers(nudge.headers(), &nudge.body, t),
            Err(VerificationError::InvalidSignature)
        );
        assert_eq!(
            NudgeVerifier::new("s3cret").verify_headers(nudge.headers(), b"{}", t),
            Err(VerificationError::InvalidSignature)
        );
    }

    #[test]
    fn missing_header_is_named() {
        let verifier = NudgeVerifier::new("s3cret");
        let err = verifier
            .verify_headers([("x-relay-timestamp", "1")], b"", 1)
            .unwrap_err();
        assert_eq!(err, VerificationError::MissingHeader(NONCE_HEADER));
    }

    #[test]
    fn signature_covers_timestamp_and_nonce() {
        let a = sign(b"k", "1", "n1", b"body").unwrap();
        let b = sign(b"k", "1", "n2", b"body").unwrap();
        let c = sign(b"k", "2", "n1", b"body").unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert!(verify_signature(b"k", "1", "n1", b"body", &a));
    }
}
