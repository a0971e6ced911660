use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use shared::{
    domain::{UserId, UserRole},
    error::{ApiError, ErrorCode},
};

/// HS256 signing keys for session tokens. The token is the whole identity
/// capability; there are no stored credentials behind it.
#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionIdentity {
    pub user_id: UserId,
    pub role: UserRole,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: i64,
    role: UserRole,
    iat: i64,
    exp: i64,
}

impl SessionKeys {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn mint(
        &self,
        user_id: UserId,
        role: UserRole,
        ttl_seconds: i64,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.0,
            role,
            iat: now.timestamp(),
            exp: (now + Duration::seconds(ttl_seconds)).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding)
    }

    pub fn verify(&self, token: &str) -> Result<SessionIdentity, ApiError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default()).map_err(
            |_| ApiError::new(ErrorCode::Unauthorized, "invalid or expired session token"),
        )?;
        Ok(SessionIdentity {
            user_id: UserId(data.claims.sub),
            role: data.claims.role,
        })
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
