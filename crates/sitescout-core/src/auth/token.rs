//! Structural decoding of session tokens.
//!
//! Tokens are JWTs (`header.payload.signature`). The header must be a JWT
//! header and the claims a JSON object. The signature segment must be present
//! but is never checked: the backend is the trust anchor, and a token that
//! decodes is believed as-is until the backend rejects it.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};
use serde::Deserialize;

use super::{AuthError, DecodeError};
use crate::models::UserIdentity;

/// Claims read from the token payload. Anything else is ignored.
#[derive(Debug, Deserialize)]
struct Claims {
    sub: Option<String>,
    username: Option<String>,
    role: Option<String>,
    email: Option<String>,
    exp: Option<f64>,
}

/// Identity and expiry carried by a structurally valid token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedToken {
    pub identity: UserIdentity,
    pub expires_at: DateTime<Utc>,
}

impl DecodedToken {
    /// A token expiring exactly at `now` is already expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

pub struct IdentityDecoder;

impl IdentityDecoder {
    /// Decode a token into its identity and expiry instant.
    pub fn decode(token: &str) -> Result<DecodedToken, DecodeError> {
        let token = token.trim();
        let segments: Vec<&str> = token.split('.').collect();
        if segments.len() != 3 {
            return Err(DecodeError::SegmentCount(segments.len()));
        }
        if segments[2].is_empty() {
            return Err(DecodeError::MissingSignature);
        }

        decode_header(token).map_err(|e| DecodeError::Header(e.to_string()))?;
        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(&[]),
            &Self::structural_validation(),
        )
        .map_err(|e| DecodeError::Claims(e.to_string()))?
        .claims;

        let username = claims
            .username
            .filter(|u| !u.is_empty())
            .or(claims.sub.filter(|s| !s.is_empty()))
            .ok_or(DecodeError::MissingClaim("sub"))?;
        let role = claims.role.ok_or(DecodeError::MissingClaim("role"))?;
        let exp = claims.exp.ok_or(DecodeError::MissingClaim("exp"))?;

        if !exp.is_finite() {
            return Err(DecodeError::InvalidExpiry);
        }
        let expires_at = DateTime::from_timestamp_millis((exp * 1000.0).round() as i64)
            .ok_or(DecodeError::InvalidExpiry)?;

        Ok(DecodedToken {
            identity: UserIdentity {
                username,
                role,
                email: claims.email,
            },
            expires_at,
        })
    }

    /// Decode and reject tokens that have expired by `now`.
    pub fn validate(token: &str, now: DateTime<Utc>) -> Result<DecodedToken, AuthError> {
        let decoded = Self::decode(token)?;
        if decoded.is_expired_at(now) {
            return Err(AuthError::ExpiredSession {
                expired_at: decoded.expires_at,
            });
        }
        Ok(decoded)
    }

    /// Envelope checks only. Expiry is compared against our own clock in
    /// `validate`, and the signature belongs to the backend.
    fn structural_validation() -> Validation {
        let mut validation = Validation::default();
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();
        validation
    }
}

/// Sign a claims object with a throwaway key. Test helper shared across modules.
#[cfg(test)]
pub(crate) fn encode_test_token(claims: &serde_json::Value) -> String {
    use jsonwebtoken::{encode, EncodingKey, Header};
    encode(&Header::default(), claims, &EncodingKey::from_secret(b"test-secret")).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_decode_prefers_username_over_sub() {
        let token = encode_test_token(&json!({
            "sub": "u-123",
            "username": "alice",
            "role": "Planner",
            "email": "alice@example.com",
            "exp": 4_102_444_800u64,
        }));
        let decoded = IdentityDecoder::decode(&token).unwrap();
        assert_eq!(decoded.identity.username, "alice");
        assert_eq!(decoded.identity.role, "Planner");
        assert_eq!(decoded.identity.email.as_deref(), Some("alice@example.com"));
        assert_eq!(decoded.expires_at.timestamp(), 4_102_444_800);
    }

    #[test]
    fn test_decode_falls_back_to_sub() {
        let token = encode_test_token(&json!({"sub": "alice", "role": "Planner", "exp": 4_102_444_800u64}));
        let decoded = IdentityDecoder::decode(&token).unwrap();
        assert_eq!(decoded.identity.username, "alice");
        assert_eq!(decoded.identity.email, None);

        // Empty username claim does not shadow sub
        let token = encode_test_token(&json!({"sub": "bob", "username": "", "role": "Developer", "exp": 4_102_444_800u64}));
        assert_eq!(IdentityDecoder::decode(&token).unwrap().identity.username, "bob");
    }

    #[test]
    fn test_decode_null_email() {
        let token = encode_test_token(&json!({"username": "a", "role": "r", "email": null, "exp": 4_102_444_800u64}));
        assert_eq!(IdentityDecoder::decode(&token).unwrap().identity.email, None);
    }

    #[test]
    fn test_decode_rejects_wrong_segment_count() {
        assert_eq!(IdentityDecoder::decode(""), Err(DecodeError::SegmentCount(1)));
        assert_eq!(IdentityDecoder::decode("a.b"), Err(DecodeError::SegmentCount(2)));
        assert_eq!(IdentityDecoder::decode("a.b.c.d"), Err(DecodeError::SegmentCount(4)));
    }

    /// `{"sub":"a","role":"r","exp":4102444800}` as an unpadded base64url segment
    const VALID_PAYLOAD: &str = "eyJzdWIiOiAiYSIsICJyb2xlIjogInIiLCAiZXhwIjogNDEwMjQ0NDgwMH0";

    /// `{"alg":"HS256","typ":"JWT"}`
    const JWT_HEADER: &str = "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9";

    #[test]
    fn test_decode_rejects_undecodable_segments() {
        assert!(matches!(
            IdentityDecoder::decode(&format!("!!!.{}.sig", VALID_PAYLOAD)),
            Err(DecodeError::Header(_))
        ));
        assert!(matches!(
            IdentityDecoder::decode(&format!("{}.@@@.sig", JWT_HEADER)),
            Err(DecodeError::Claims(_))
        ));
    }

    #[test]
    fn test_decode_requires_jwt_header() {
        // `{}` decodes as JSON but names no algorithm
        let token = format!("e30.{}.sig", VALID_PAYLOAD);
        assert!(matches!(IdentityDecoder::decode(&token), Err(DecodeError::Header(_))));

        let token = format!("{}.{}.sig", JWT_HEADER, VALID_PAYLOAD);
        assert_eq!(IdentityDecoder::decode(&token).unwrap().identity.username, "a");
    }

    #[test]
    fn test_decode_requires_signature_segment() {
        let token = format!("{}.{}.", JWT_HEADER, VALID_PAYLOAD);
        assert_eq!(IdentityDecoder::decode(&token), Err(DecodeError::MissingSignature));

        let token = format!("e30.{}.", VALID_PAYLOAD);
        assert!(IdentityDecoder::decode(&token).is_err());
    }

    #[test]
    fn test_decode_rejects_non_object_payload() {
        // `[1,2,3]`
        let err = IdentityDecoder::decode(&format!("{}.WzEsMiwzXQ.sig", JWT_HEADER)).unwrap_err();
        assert!(matches!(err, DecodeError::Claims(_)));
    }

    #[test]
    fn test_decode_requires_claims() {
        let no_role = encode_test_token(&json!({"sub": "a", "exp": 4_102_444_800u64}));
        assert_eq!(IdentityDecoder::decode(&no_role), Err(DecodeError::MissingClaim("role")));

        let no_exp = encode_test_token(&json!({"sub": "a", "role": "r"}));
        assert_eq!(IdentityDecoder::decode(&no_exp), Err(DecodeError::MissingClaim("exp")));

        let no_subject = encode_test_token(&json!({"role": "r", "exp": 4_102_444_800u64}));
        assert_eq!(IdentityDecoder::decode(&no_subject), Err(DecodeError::MissingClaim("sub")));
    }

    #[test]
    fn test_decode_rejects_mistyped_claim() {
        let token = encode_test_token(&json!({"sub": "a", "role": "r", "exp": "tomorrow"}));
        assert!(matches!(IdentityDecoder::decode(&token), Err(DecodeError::Claims(_))));
    }

    #[test]
    fn test_decode_ignores_signature() {
        let token = encode_test_token(&json!({"sub": "a", "role": "r", "exp": 4_102_444_800u64}));
        let tampered = format!("{}.not-a-real-signature", token.rsplit_once('.').unwrap().0);
        assert!(IdentityDecoder::decode(&tampered).is_ok());
    }

    #[test]
    fn test_validate_expiry_boundary() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let at_now = encode_test_token(&json!({"sub": "a", "role": "r", "exp": 1_700_000_000u64}));
        assert!(matches!(
            IdentityDecoder::validate(&at_now, now),
            Err(AuthError::ExpiredSession { .. })
        ));

        let one_second_later = encode_test_token(&json!({"sub": "a", "role": "r", "exp": 1_700_000_001u64}));
        assert!(IdentityDecoder::validate(&one_second_later, now).is_ok());

        let past = encode_test_token(&json!({"sub": "a", "role": "r", "exp": (now - Duration::hours(1)).timestamp()}));
        assert!(IdentityDecoder::validate(&past, now).is_err());
    }

    #[test]
    fn test_validate_passes_decode_errors_through() {
        let err = IdentityDecoder::validate("garbage", Utc::now()).unwrap_err();
        assert!(matches!(err, AuthError::Decode(DecodeError::SegmentCount(1))));
    }
}
