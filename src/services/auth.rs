use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::errors::{AppError, AppResult};
use crate::models::User;
use crate::services::Database;

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
const DEFAULT_EXPIRE_MINUTES: i64 = 15;

/// Claims carried by an access token. `sub` is the username.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
}

/// Signs and verifies access tokens with one shared secret.
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    algorithm: Algorithm,
}

impl TokenKeys {
    pub fn new(secret: &str, algorithm: &str) -> AppResult<Self> {
        let algorithm = Algorithm::from_str(algorithm)?;
        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            algorithm,
        })
    }

    pub fn create_access_token(
        &self,
        subject: &str,
        expires_in: Option<Duration>,
    ) -> AppResult<String> {
        let now = Utc::now();
        let expire = now + expires_in.unwrap_or_else(|| Duration::minutes(DEFAULT_EXPIRE_MINUTES));
        let claims = Claims {
            sub: subject.to_string(),
            exp: expire.timestamp(),
            iat: now.timestamp(),
        };
        Ok(encode(&Header::new(self.algorithm), &claims, &self.encoding)?)
    }

    /// Accepts the raw token or the `Bearer <token>` form stored in the cookie.
    pub fn decode_access_token(&self, token: &str) -> AppResult<Claims> {
        let token = token.strip_prefix("Bearer ").unwrap_or(token).trim();
        if token.is_empty() {
            return Err(AppError::Auth("Could not validate credentials".into()));
        }
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        if data.claims.sub.is_empty() {
            return Err(AppError::Auth("Could not validate credentials".into()));
        }
        Ok(data.claims)
    }
}

pub async fn hash_password(password: &str, cost: u32) -> AppResult<String> {
    let password = password.to_string();
    // bcrypt blocks; run it on the blocking pool
    let hashed = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AppError::Internal(format!("hashing task failed: {}", e)))??;
    Ok(hashed)
}

pub async fn verify_password(password: &str, hashed: &str) -> AppResult<bool> {
    let password = password.to_string();
    let hashed = hashed.to_string();
    let ok = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hashed))
        .await
        .map_err(|e| AppError::Internal(format!("verification task failed: {}", e)))??;
    Ok(ok)
}

/// Looks the user up and checks the password. `None` for either failure.
pub async fn authenticate(db: &Database, username: &str, password: &str) -> AppResult<Option<User>> {
    let Some(user) = db.get_user_by_username(username).await? else {
        return Ok(None);
    };
    match verify_password(password, &user.hashed_password).await {
        Ok(true) => Ok(Some(user)),
        Ok(false) => Ok(None),
        Err(AppError::Hash(e)) => {
            tracing::warn!("Stored hash for user {} is unusable: {}", username, e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
