//! Decoding and checking the `exp` claim of bearer tokens.
//!
//! Tokens are `header.payload.signature` with base64url segments. Only the
//! payload is decoded; the signature is the API server's business.

use crate::error::{Error, Result};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};

/// Extract the `exp` claim (Unix seconds) from a token.
pub fn decode_expiry(token: &str) -> Result<i64> {
    let segments: Vec<&str> = token.trim().split('.').collect();
    if segments.len() != 3 {
        return Err(Error::MalformedToken(format!(
            "expected 3 segments, found {}",
            segments.len()
        )));
    }

    let payload = URL_SAFE_NO_PAD
        .decode(segments[1].trim_end_matches('='))
        .map_err(|e| Error::MalformedToken(format!("payload is not base64url: {}", e)))?;

    let claims: serde_json::Value = serde_json::from_slice(&payload)
        .map_err(|e| Error::MalformedToken(format!("payload is not JSON: {}", e)))?;
    let claims = claims
        .as_object()
        .ok_or_else(|| Error::MalformedToken("payload is not a JSON object".into()))?;

    claims
        .get("exp")
        .ok_or_else(|| Error::MalformedToken("missing exp claim".into()))?
        .as_i64()
        .ok_or_else(|| Error::MalformedToken("exp claim is not an integer".into()))
}

/// Expiry of a token as a timestamp.
pub fn expiry_time(token: &str) -> Result<DateTime<Utc>> {
    let exp = decode_expiry(token)?;
    DateTime::from_timestamp(exp, 0)
        .ok_or_else(|| Error::MalformedToken(format!("exp claim {} is out of range", exp)))
}

/// Check that a token expires within `tolerance_secs` of `expected`.
pub fn verify(token: &str, expected: DateTime<Utc>, tolerance_secs: i64) -> Result<DateTime<Utc>> {
    let actual = expiry_time(token)?;
    if (actual.timestamp() - expected.timestamp()).abs() > tolerance_secs {
        return Err(Error::TokenIntegrityMismatch { expected, actual });
    }
    Ok(actual)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_with_payload(payload: &str) -> String {
        format!(
            "{}.{}.{}",
            URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256"}"#),
            URL_SAFE_NO_PAD.encode(payload),
            URL_SAFE_NO_PAD.encode("sig")
        )
    }

    #[test]
    fn test_decode_expiry() {
        let token = token_with_payload(r#"{"sub":"x","exp":1700000000}"#);
        assert_eq!(decode_expiry(&token).unwrap(), 1_700_000_000);
    }

    #[test]
    fn test_padded_payload_is_accepted() {
        let payload = base64::engine::general_purpose::URL_SAFE.encode(r#"{"exp":42}"#);
        let token = format!("e30.{}.c2ln", payload);
        assert_eq!(decode_expiry(&token).unwrap(), 42);
    }

    #[test]
    fn test_rejects_wrong_segment_count() {
        for token in ["", "abc", "a.b", "a.b.c.d"] {
            assert!(matches!(decode_expiry(token), Err(Error::MalformedToken(_))));
        }
    }

    #[test]
    fn test_rejects_bad_payloads() {
        let cases = [
            "e30.!!!.c2ln".to_string(),
            token_with_payload("not json"),
            token_with_payload("[1,2]"),
            token_with_payload(r#"{"sub":"x"}"#),
            token_with_payload(r#"{"exp":"soon"}"#),
            token_with_payload(r#"{"exp":1.5}"#),
        ];
        for token in &cases {
            let err = decode_expiry(token).unwrap_err();
            assert!(matches!(err, Error::MalformedToken(_)), "{}", token);
        }
        assert!(
            decode_expiry(&cases[3])
                .unwrap_err()
                .to_string()
                .contains("missing exp")
        );
    }

    #[test]
    fn test_verify_tolerance() {
        let expected = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

        let within = token_with_payload(r#"{"exp":1700000060}"#);
        assert!(verify(&within, expected, 60).is_ok());

        let early = token_with_payload(r#"{"exp":1699999940}"#);
        assert!(verify(&early, expected, 60).is_ok());

        let beyond = token_with_payload(r#"{"exp":1700000061}"#);
        match verify(&beyond, expected, 60) {
            Err(Error::TokenIntegrityMismatch { expected: e, actual }) => {
                assert_eq!(e, expected);
                assert_eq!(actual.timestamp(), 1_700_000_061);
            }
            other => panic!("expected mismatch, got {:?}", other),
        }
    }
}
