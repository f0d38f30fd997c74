//! Authentication
//!
//! Operator accounts with salted SHA-256 password digests and HMAC-signed
//! expiring bearer tokens. A token is `base64(payload).base64(signature)`
//! where the payload is `username:expiry_unix`; no session state is kept.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, instrument};

use crate::storage::{Store, StoreError};

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_ADMIN_USERNAME: &str = "admin";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("invalid token")]
    InvalidToken,

    #[error("token expired")]
    TokenExpired,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A freshly issued bearer token.
#[derive(Debug, Clone, serde::Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub struct AuthService {
    store: Arc<dyn Store>,
    secret: Vec<u8>,
    token_ttl: chrono::Duration,
}

impl AuthService {
    pub fn new(store: Arc<dyn Store>, secret: &str, expire_hours: i64) -> Self {
        Self {
            store,
            secret: secret.as_bytes().to_vec(),
            token_ttl: chrono::Duration::hours(expire_hours.max(1)),
        }
    }

    /// Salted digest in the form `base64(salt)$base64(sha256(salt || pw))`.
    pub fn hash_password(password: &str) -> String {
        let mut salt = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt);
        let digest = Self::digest(&salt, password);
        format!(
            "{}${}",
            URL_SAFE_NO_PAD.encode(salt),
            URL_SAFE_NO_PAD.encode(digest)
        )
    }

    fn digest(salt: &[u8], password: &str) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(salt);
        hasher.update(password.as_bytes());
        hasher.finalize().into()
    }

    pub fn verify_password(password: &str, stored: &str) -> bool {
        let Some((salt_b64, digest_b64)) = stored.split_once('$') else {
            return false;
        };
        let (Ok(salt), Ok(expected)) = (
            URL_SAFE_NO_PAD.decode(salt_b64),
            URL_SAFE_NO_PAD.decode(digest_b64),
        ) else {
            return false;
        };
        Self::digest(&salt, password).as_slice() == expected.as_slice()
    }

    /// Exchange credentials for a bearer token.
    #[instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> Result<IssuedToken, AuthError> {
        let user = self
            .store
            .get_user(username)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !Self::verify_password(password, &user.password_hash) {
            return Err(AuthError::InvalidCredentials);
        }

        Ok(self.issue_token(username))
    }

    pub fn issue_token(&self, username: &str) -> IssuedToken {
        let expires_at = Utc::now() + self.token_ttl;
        let payload = format!("{username}:{}", expires_at.timestamp());

        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key size");
        mac.update(payload.as_bytes());
        let signature = mac.finalize().into_bytes();

        IssuedToken {
            token: format!(
                "{}.{}",
                URL_SAFE_NO_PAD.encode(payload),
                URL_SAFE_NO_PAD.encode(signature)
            ),
            expires_at,
        }
    }

    /// Validate a bearer token; returns the username it was issued for.
    pub fn verify_token(&self, token: &str) -> Result<String, AuthError> {
        let (payload_b64, signature_b64) =
            token.split_once('.').ok_or(AuthError::InvalidToken)?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| AuthError::InvalidToken)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| AuthError::InvalidToken)?;

        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key size");
        mac.update(&payload);
        mac.verify_slice(&signature)
            .map_err(|_| AuthError::InvalidToken)?;

        let payload = String::from_utf8(payload).map_err(|_| AuthError::InvalidToken)?;
        let (username, expiry) = payload.rsplit_once(':').ok_or(AuthError::InvalidToken)?;
        let expiry: i64 = expiry.parse().map_err(|_| AuthError::InvalidToken)?;

        if Utc::now().timestamp() >= expiry {
            return Err(AuthError::TokenExpired);
        }

        Ok(username.to_string())
    }

    /// Create the default admin account if no such user exists yet.
    pub async fn bootstrap_admin(&self, password: &str) -> Result<(), AuthError> {
        if self.store.get_user(DEFAULT_ADMIN_USERNAME).await?.is_some() {
            return Ok(());
        }

        self.store
            .create_user(DEFAULT_ADMIN_USERNAME, &Self::hash_password(password))
            .await?;
        info!("default admin account created");
        Ok(())
    }
}
