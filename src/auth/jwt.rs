//! JWT issuance and validation
//!
//! Tokens are HS256-signed with a process-wide secret that is supplied by
//! configuration or generated once and kept in the data directory.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{AuthError, Identity, IdentityResolver};

const SECRET_FILE: &str = "jwt_secret";
const SECRET_LEN: usize = 32;

/// Token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    /// Display name at issuance time
    pub username: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and validates bearer tokens
pub struct JwtAuthority {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    ttl: Duration,
}

impl JwtAuthority {
    pub fn new(secret: &[u8], issuer: impl Into<String>, ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            issuer: issuer.into(),
            ttl: Duration::hours(ttl_hours),
        }
    }

    /// Issue a token for an identity
    pub fn issue(&self, identity: &Identity) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: identity.id.clone(),
            username: identity.display_name.clone(),
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }

    /// Validate a token and return its claims
    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.issuer.as_str()]);

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidToken(e.to_string()),
            }
        })?;

        Ok(data.claims)
    }
}

impl IdentityResolver for JwtAuthority {
    fn resolve(&self, credential: &str) -> Result<Identity, AuthError> {
        let token = credential.strip_prefix("Bearer ").unwrap_or(credential).trim();
        if token.is_empty() {
            return Err(AuthError::MissingCredential);
        }

        let claims = self.validate(token)?;
        if claims.sub.is_empty() || claims.username.is_empty() {
            return Err(AuthError::MissingClaims);
        }

        Ok(Identity::new(claims.sub, claims.username))
    }
}

/// Load the signing key from `data_dir`, generating and persisting a random
/// one if none exists or the stored key has the wrong size.
pub fn load_or_generate_secret(data_dir: &Path) -> Result<Vec<u8>, AuthError> {
    let key_path = data_dir.join(SECRET_FILE);

    if key_path.exists() {
        let key = std::fs::read(&key_path)?;
        if key.len() == SECRET_LEN {
            tracing::info!(path = %key_path.display(), "JWT signing key loaded");
            return Ok(key);
        }
        tracing::warn!(size = key.len(), "JWT key file has wrong size, regenerating");
    }

    std::fs::create_dir_all(data_dir)?;
    let key: [u8; SECRET_LEN] = rand::random();
    std::fs::write(&key_path, key)?;
    tracing::info!(path = %key_path.display(), "JWT signing key generated");
    Ok(key.to_vec())
}
