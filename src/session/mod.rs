//! Session issuer: bearer tokens bound to an identity id and role.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::{Identity, Role};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Identity id
    pub sub: String,
    pub email: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to sign session token: {0}")]
    Signing(jsonwebtoken::errors::Error),
    #[error("invalid session token")]
    Invalid,
}

pub struct SessionIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl SessionIssuer {
    pub fn new(secret: &str, ttl_days: i64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 30;
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl: Duration::days(ttl_days.max(1)),
        }
    }

    /// Issue a token for a freshly authenticated identity
    pub fn issue(&self, identity: &Identity) -> Result<String, SessionError> {
        let now = Utc::now();
        let claims = Claims {
            sub: identity.id.clone(),
            email: identity.email.clone(),
            role: identity.role(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(SessionError::Signing)
    }

    /// Validate signature and expiry
    pub fn verify(&self, token: &str) -> Result<Claims, SessionError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|_| SessionError::Invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Profile;

    fn identity() -> Identity {
        Identity {
            id: "alumni-1".to_string(),
            email: "meera@example.com".to_string(),
            name: "Meera".to_string(),
            password_hash: "digest".to_string(),
            profile: Profile::Alumni { graduation_year: Some("2015".to_string()) },
            created_at: Utc::now().to_rfc3339(),
        }
    }

    #[test]
    fn test_issue_and_verify() {
        let issuer = SessionIssuer::new("secret", 7);
        let token = issuer.issue(&identity()).unwrap();
        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.sub, "alumni-1");
        assert_eq!(claims.role, Role::Alumni);
        assert_eq!(claims.exp - claims.iat, 7 * 24 * 3600);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = SessionIssuer::new("secret", 7).issue(&identity()).unwrap();
        let other = SessionIssuer::new("different", 7);
        assert!(matches!(other.verify(&token), Err(SessionError::Invalid)));
        assert!(other.verify("not.a.token").is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let issuer = SessionIssuer::new("secret", 7);
        let claims = Claims {
            sub: "x".to_string(),
            email: "x@example.com".to_string(),
            role: Role::Student,
            iat: 0,
            exp: 1000,
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(b"secret")).unwrap();
        assert!(issuer.verify(&token).is_err());
    }
}
