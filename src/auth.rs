//! Bearer-token identity and generated credentials.
//!
//! Tokens are opaque: a random value handed to the client, stored only as
//! a SHA-256 digest. Guest accounts get an argon2-hashed random credential
//! they can later reset through the account flows.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHasher};
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::User;
use crate::http::AppState;
use crate::store::Store;
use crate::{Error, Result};

/// Digest stored in place of the raw bearer token.
pub fn token_digest(token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
}

/// Mints a fresh opaque token for the user and persists its digest.
pub async fn issue_token(store: &dyn Store, user_id: Uuid) -> Result<String> {
    let mut secret = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut secret);
    let token = format!(
        "{}.{}",
        Uuid::now_v7().simple(),
        URL_SAFE_NO_PAD.encode(secret)
    );
    store.insert_token(&token_digest(&token), user_id).await?;
    Ok(token)
}

pub fn hash_password(plain: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {e}"))?;
    Ok(hash.to_string())
}

/// Random credential for lazily created guest accounts.
pub fn generate_credential() -> String {
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(16)
        .map(char::from)
        .collect()
}

/// Attaches the user when a valid bearer token is present, otherwise
/// continues as guest.
pub struct OptionalIdentity(pub Option<User>);

/// Requires a valid bearer token.
pub struct Identity(pub User);

/// Requires a valid bearer token belonging to an admin.
pub struct AdminIdentity(pub User);

#[async_trait]
impl FromRequestParts<AppState> for OptionalIdentity {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let Some(token) = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
        else {
            return Ok(Self(None));
        };
        let Some(user_id) = state.store.user_for_token(&token_digest(token)).await? else {
            return Ok(Self(None));
        };
        Ok(Self(state.store.user(user_id).await?))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Identity {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let OptionalIdentity(user) = OptionalIdentity::from_request_parts(parts, state).await?;
        user.map(Self).ok_or(Error::Unauthorized)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminIdentity {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let Identity(user) = Identity::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(Error::Forbidden);
        }
        Ok(Self(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_digest_is_stable_and_opaque() {
        let a = token_digest("token-1");
        let b = token_digest("token-1");
        assert_eq!(a, b);
        assert_ne!(a, token_digest("token-2"));
        assert!(!a.contains("token"));
    }

    #[test]
    fn test_generated_credential_shape() {
        let cred = generate_credential();
        assert_eq!(cred.len(), 16);
        assert_ne!(cred, generate_credential());
    }

    #[test]
    fn test_password_hash_is_argon2() {
        let hash = hash_password("s3cret").unwrap();
        assert!(hash.starts_with("$argon2"));
    }
}
