//! Access token issuance and verification (HMAC-signed JWT).
//!
//! Expiry is checked here rather than by `jsonwebtoken` so that a token is
//! rejected at exactly `exp`, with no leeway.

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Username of the authenticated user.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,

    #[error("invalid token: {0}")]
    Invalid(#[source] jsonwebtoken::errors::Error),

    #[error("token encoding failed: {0}")]
    Encode(#[source] jsonwebtoken::errors::Error),

    #[error("token lifetime overflows the calendar")]
    ExpiryOutOfRange,
}

/// A freshly signed token and its lifetime.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// Seconds until expiry at issue time.
    pub expires_in: i64,
}

pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    algorithm: Algorithm,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &[u8], algorithm: Algorithm, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            algorithm,
            ttl,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.secret_key.as_bytes(), cfg.algorithm, cfg.token_ttl())
    }

    pub fn issue(&self, subject: &str, now: DateTime<Utc>) -> Result<AccessToken, TokenError> {
        let expires_at = now
            .checked_add_signed(self.ttl)
            .ok_or(TokenError::ExpiryOutOfRange)?;
        let claims = Claims {
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = jsonwebtoken::encode(&Header::new(self.algorithm), &claims, &self.encoding)
            .map_err(TokenError::Encode)?;
        Ok(AccessToken {
            token,
            expires_at,
            expires_in: self.ttl.num_seconds(),
        })
    }

    /// Checks signature, algorithm and expiry against `now`.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let claims = jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation)
            .map_err(TokenError::Invalid)?
            .claims;

        if now.timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }
}

impl Claims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0).single()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer(secret: &str) -> TokenIssuer {
        TokenIssuer::new(secret.as_bytes(), Algorithm::HS256, Duration::minutes(30))
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_issue_then_verify() {
        let tokens = issuer("secret");
        let issued = tokens.issue("tech1", t0()).unwrap();
        assert_eq!(issued.expires_in, 1800);
        assert_eq!(issued.expires_at, t0() + Duration::minutes(30));

        let claims = tokens.verify(&issued.token, t0()).unwrap();
        assert_eq!(claims.sub, "tech1");
        assert_eq!(claims.iat, t0().timestamp());
        assert_eq!(claims.exp, (t0() + Duration::minutes(30)).timestamp());
        assert_eq!(claims.expires_at(), Some(issued.expires_at));
    }

    #[test]
    fn test_expiry_boundary_is_exclusive() {
        let tokens = issuer("secret");
        let issued = tokens.issue("tech1", t0()).unwrap();
        let deadline = t0() + Duration::minutes(30);

        assert!(tokens.verify(&issued.token, deadline - Duration::seconds(1)).is_ok());
        assert!(matches!(
            tokens.verify(&issued.token, deadline),
            Err(TokenError::Expired)
        ));
        assert!(matches!(
            tokens.verify(&issued.token, deadline + Duration::hours(1)),
            Err(TokenError::Expired)
        ));
    }

    #[test]
    fn test_overflowing_lifetime_is_an_error() {
        let tokens = TokenIssuer::new(b"secret", Algorithm::HS256, Duration::days(365));
        assert!(matches!(
            tokens.issue("tech1", DateTime::<Utc>::MAX_UTC),
            Err(TokenError::ExpiryOutOfRange)
        ));
    }

    #[test]
    fn test_other_secret_is_rejected() {
        let issued = issuer("secret-a").issue("admin", t0()).unwrap();
        assert!(matches!(
            issuer("secret-b").verify(&issued.token, t0()),
            Err(TokenError::Invalid(_))
        ));
    }

    #[test]
    fn test_algorithm_mismatch_is_rejected() {
        let hs256 = issuer("secret");
        let hs512 = TokenIssuer::new(b"secret", Algorithm::HS512, Duration::minutes(30));
        let issued = hs256.issue("admin", t0()).unwrap();
        assert!(matches!(
            hs512.verify(&issued.token, t0()),
            Err(TokenError::Invalid(_))
        ));
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let tokens = issuer("secret");
        let issued = tokens.issue("tech1", t0()).unwrap();
        let forged = issuer("secret").issue("admin", t0()).unwrap();

        // Splice admin's payload onto tech1's signature.
        let mut parts: Vec<&str> = issued.token.split('.').collect();
        let forged_parts: Vec<&str> = forged.token.split('.').collect();
        parts[1] = forged_parts[1];
        let spliced = parts.join(".");
        assert!(matches!(
            tokens.verify(&spliced, t0()),
            Err(TokenError::Invalid(_))
        ));
    }

    #[test]
    fn test_garbage_is_rejected() {
        let tokens = issuer("secret");
        assert!(tokens.verify("", t0()).is_err());
        assert!(tokens.verify("token_admin_1", t0()).is_err());
        assert!(tokens.verify("a.b.c", t0()).is_err());
    }
}
