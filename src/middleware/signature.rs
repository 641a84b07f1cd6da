use std::sync::Arc;

use axum::{
    body::{Body, to_bytes},
    extract::State,
    http::{HeaderMap, Request, header::CONTENT_TYPE},
    middleware::Next,
    response::Response,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::{config::Config, error::AppError};

type HmacSha256 = Hmac<Sha256>;

pub const TIMESTAMP_HEADER: &str = "x-timestamp";
pub const SIGNATURE_HEADER: &str = "x-signature";

const MAX_SIGNED_BODY_BYTES: usize = 1024 * 1024;

/// Checks `x-signature = hex(HMAC-SHA256(JSON.stringify(body) + x-timestamp))`.
pub struct SignatureVerifier {
    secret: Vec<u8>,
    max_age_ms: i64,
    max_skew_ms: i64,
}

impl SignatureVerifier {
    pub fn new(config: &Config) -> Self {
        Self::with_window(
            &config.hmac_secret,
            config.signature_max_age_secs,
            config.signature_max_skew_secs,
        )
    }

    pub fn with_window(secret: &str, max_age_secs: i64, max_skew_secs: i64) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            max_age_ms: max_age_secs.saturating_mul(1000),
            max_skew_ms: max_skew_secs.saturating_mul(1000),
        }
    }

    pub fn sign(&self, payload: &str, timestamp: i64) -> Result<String, AppError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| AppError::Internal(format!("invalid signing secret: {}", e)))?;
        mac.update(payload.as_bytes());
        mac.update(timestamp.to_string().as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    pub fn verify(
        &self,
        body: &[u8],
        timestamp: Option<&str>,
        signature: Option<&str>,
        now_ms: i64,
    ) -> Result<(), AppError> {
        let (Some(timestamp), Some(signature)) = (timestamp, signature) else {
            return Err(AppError::InvalidSignature("missing signature or timestamp headers"));
        };

        let sent_at: i64 = timestamp
            .trim()
            .parse()
            .map_err(|_| AppError::InvalidSignature("request expired"))?;
        let fresh = now_ms
            .checked_sub(sent_at)
            .is_some_and(|age| age <= self.max_age_ms && age >= -self.max_skew_ms);
        if !fresh {
            return Err(AppError::InvalidSignature("request expired"));
        }

        let expected = self.sign(&canonical_payload(body)?, sent_at)?;
        let provided = signature.trim().as_bytes();
        if provided.len() != expected.len() || !bool::from(provided.ct_eq(expected.as_bytes())) {
            return Err(AppError::InvalidSignature("signature mismatch"));
        }

        Ok(())
    }
}

/// Body re-serialised the way the browser's `JSON.stringify` produces it.
/// Key order is kept as sent; an absent body signs as `{}`.
pub fn canonical_payload(body: &[u8]) -> Result<String, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok("{}".to_string());
    }
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| AppError::InvalidInput(format!("malformed JSON body: {}", e)))?;
    serde_json::to_string(&value).map_err(|e| AppError::Internal(e.to_string()))
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn is_upload(headers: &HeaderMap) -> bool {
    header(headers, CONTENT_TYPE.as_str())
        .map(|ct| ct.starts_with("multipart/form-data"))
        .unwrap_or(false)
}

pub async fn verify_signature(
    State(verifier): State<Arc<SignatureVerifier>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    if is_upload(req.headers()) {
        return Ok(next.run(req).await);
    }

    let (parts, body) = req.into_parts();
    let bytes = to_bytes(body, MAX_SIGNED_BODY_BYTES)
        .await
        .map_err(|e| AppError::InvalidInput(format!("unreadable request body: {}", e)))?;

    let now_ms = chrono::Utc::now().timestamp_millis();
    if let Err(e) = verifier.verify(
        &bytes,
        header(&parts.headers, TIMESTAMP_HEADER),
        header(&parts.headers, SIGNATURE_HEADER),
        now_ms,
    ) {
        tracing::debug!("{} {} rejected: {}", parts.method, parts.uri.path(), e);
        return Err(e);
    }

    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_767_225_600_000;

    fn verifier() -> SignatureVerifier {
        SignatureVerifier::with_window("super_secret_hmac_key_change_me", 120, 5)
    }

    fn signed(body: &str, timestamp: i64) -> String {
        verifier()
            .sign(&canonical_payload(body.as_bytes()).unwrap(), timestamp)
            .unwrap()
    }

    #[test]
    fn accepts_fresh_valid_signature() {
        let body = r#"{"recipientId":"b","content":"新年快乐"}"#;
        let sig = signed(body, NOW);
        let ts = NOW.to_string();
        assert!(verifier().verify(body.as_bytes(), Some(&ts), Some(&sig), NOW + 1000).is_ok());
    }

    #[test]
    fn key_order_is_preserved() {
        assert_eq!(
            canonical_payload(br#"{ "z": 1, "a": [true, null] }"#).unwrap(),
            r#"{"z":1,"a":[true,null]}"#
        );
    }

    #[test]
    fn empty_body_signs_as_empty_object() {
        assert_eq!(canonical_payload(b"").unwrap(), "{}");
        let sig = signed("", NOW);
        let ts = NOW.to_string();
        assert!(verifier().verify(b"", Some(&ts), Some(&sig), NOW).is_ok());
    }

    #[test]
    fn rejects_missing_headers() {
        let err = verifier().verify(b"{}", None, Some("abc"), NOW).unwrap_err();
        assert!(matches!(err, AppError::InvalidSignature(_)));
        let err = verifier().verify(b"{}", Some("1"), None, NOW).unwrap_err();
        assert!(matches!(err, AppError::InvalidSignature(_)));
    }

    #[test]
    fn rejects_stale_and_future_timestamps() {
        let v = verifier();
        let stale = NOW - 120_001;
        let sig = signed("{}", stale);
        assert!(v.verify(b"{}", Some(&stale.to_string()), Some(&sig), NOW).is_err());

        let edge = NOW - 120_000;
        let sig = signed("{}", edge);
        assert!(v.verify(b"{}", Some(&edge.to_string()), Some(&sig), NOW).is_ok());

        let future = NOW + 5_001;
        let sig = signed("{}", future);
        assert!(v.verify(b"{}", Some(&future.to_string()), Some(&sig), NOW).is_err());

        let slight = NOW + 4_000;
        let sig = signed("{}", slight);
        assert!(v.verify(b"{}", Some(&slight.to_string()), Some(&sig), NOW).is_ok());
    }

    #[test]
    fn rejects_non_numeric_timestamp() {
        let err = verifier().verify(b"{}", Some("yesterday"), Some("00"), NOW).unwrap_err();
        assert!(matches!(err, AppError::InvalidSignature(_)));
    }

    #[test]
    fn extreme_timestamps_are_expired_not_overflowed() {
        for ts in [i64::MIN, i64::MAX] {
            let err = verifier()
                .verify(b"{}", Some(&ts.to_string()), Some("00"), NOW)
                .unwrap_err();
            assert!(matches!(err, AppError::InvalidSignature("request expired")));
        }
        let err = verifier()
            .verify(b"{}", Some("-9223372036854775808"), Some("00"), -NOW)
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidSignature("request expired")));
    }

    #[test]
    fn rejects_tampered_body() {
        let sig = signed(r#"{"content":"hi"}"#, NOW);
        let ts = NOW.to_string();
        let err = verifier()
            .verify(br#"{"content":"bye"}"#, Some(&ts), Some(&sig), NOW)
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidSignature("signature mismatch")));
    }

    #[test]
    fn rejects_truncated_signature() {
        let sig = signed("{}", NOW);
        let ts = NOW.to_string();
        assert!(verifier().verify(b"{}", Some(&ts), Some(&sig[..10]), NOW).is_err());
    }
}
