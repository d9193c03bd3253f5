//! HS256 access tokens.

use std::fmt;
use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::AuthError;

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub user_id: i64,
    /// User's email address
    pub email: String,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

/// Issues and validates access tokens with a shared HMAC key.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer").field("ttl", &self.ttl).finish()
    }
}

impl TokenIssuer {
    /// Create an issuer signing with `key`; tokens live for `ttl`.
    pub fn new(key: &[u8], ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(key),
            decoding: DecodingKey::from_secret(key),
            validation: Validation::new(Algorithm::HS256),
            ttl,
        }
    }

    /// Issue a token for a user.
    pub fn issue(&self, user_id: i64, email: &str) -> Result<String, AuthError> {
        let claims = Claims {
            user_id,
            email: email.to_string(),
            exp: Utc::now().timestamp() + self.ttl.as_secs() as i64,
        };
        self.sign(&claims)
    }

    /// Validate a token's signature, algorithm and expiry, returning its claims.
    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)?;
        Ok(data.claims)
    }

    fn sign(&self, claims: &Claims) -> Result<String, AuthError> {
        Ok(encode(&Header::new(Algorithm::HS256), claims, &self.encoding)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(b"test-signing-key", Duration::from_secs(7200))
    }

    #[test]
    fn test_issue_and_validate() {
        let issuer = issuer();
        let token = issuer.issue(42, "a@x.com").unwrap();

        let claims = issuer.validate(&token).unwrap();
        assert_eq!(claims.user_id, 42);
        assert_eq!(claims.email, "a@x.com");

        let remaining = claims.exp - Utc::now().timestamp();
        assert!(remaining > 7100 && remaining <= 7200);
    }

    #[test]
    fn test_wrong_key_rejected() {
        let token = issuer().issue(1, "a@x.com").unwrap();
        let other = TokenIssuer::new(b"another-key", Duration::from_secs(7200));

        assert!(matches!(other.validate(&token), Err(AuthError::JwtError(_))));
    }

    #[test]
    fn test_expired_token_rejected() {
        let issuer = issuer();
        let token = issuer
            .sign(&Claims {
                user_id: 1,
                email: "a@x.com".to_string(),
                exp: Utc::now().timestamp() - 3600,
            })
            .unwrap();

        assert!(matches!(issuer.validate(&token), Err(AuthError::TokenExpired)));
    }

    #[test]
    fn test_wrong_algorithm_rejected() {
        let claims = Claims {
            user_id: 1,
            email: "a@x.com".to_string(),
            exp: Utc::now().timestamp() + 600,
        };
        let token = encode(
            &Header::new(Algorithm::HS384),
            &claims,
            &EncodingKey::from_secret(b"test-signing-key"),
        )
        .unwrap();

        assert!(issuer().validate(&token).is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(issuer().validate("not.a.token").is_err());
        assert!(issuer().validate("").is_err());
    }
}
