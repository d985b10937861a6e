use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::User;

/// Fixed token lifetime. Rotation and multi-key verification are out of
/// scope; one key signs and verifies for the whole process lifetime.
pub const TOKEN_TTL_HOURS: i64 = 24;

/// Process-wide signing key material, built once at startup from
/// configuration and held in Rocket managed state.
pub struct AuthKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl AuthKeys {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub id: i64,
    pub username: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

pub fn issue_token(keys: &AuthKeys, user: &User) -> Result<String, AppError> {
    let now = Utc::now();
    let claims = Claims {
        id: user.id,
        username: user.username.clone(),
        role: user.role.clone(),
        iat: now.timestamp(),
        exp: (now + Duration::hours(TOKEN_TTL_HOURS)).timestamp(),
    };

    jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)
        .map_err(|e| AppError::Internal(format!("Failed to sign token: {}", e)))
}

/// Signature and expiry are checked together; any failure maps to the same
/// invalid-token outcome.
pub fn verify_token(keys: &AuthKeys, token: &str) -> Result<Claims, AppError> {
    let data = jsonwebtoken::decode::<Claims>(
        token,
        &keys.decoding,
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| AppError::Authorization(format!("Invalid or expired token: {}", e)))?;

    Ok(data.claims)
}
