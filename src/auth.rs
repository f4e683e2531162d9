//! Caller authorization for exports.
//!
//! Verification is behind the [`Authorizer`] trait so the transport can be exercised with a
//! stub. [`JwtAuthorizer`] verifies HS256 bearer tokens issued with the shared secret.

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Why a caller was turned away.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing bearer credential")]
    MissingCredentials,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token expired")]
    ExpiredToken,

    #[error("role `{role}` is not allowed to export attendance")]
    Forbidden { role: String },

    #[error("failed to issue token: {0}")]
    Issue(String),
}

/// The verified identity behind a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject: String,
    pub role: String,
}

/// Verifies an opaque bearer credential.
pub trait Authorizer: Send + Sync {
    fn verify(&self, token: &str) -> Result<Principal, AuthError>;
}

/// Extracts the token from an `Authorization: Bearer <token>` header value. The scheme is
/// matched case-insensitively.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header.ok_or(AuthError::MissingCredentials)?;
    let token = header
        .split_once(' ')
        .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
        .map(|(_, token)| token.trim())
        .ok_or_else(|| AuthError::InvalidToken("invalid authorization header".into()))?;
    if token.is_empty() {
        return Err(AuthError::MissingCredentials);
    }
    Ok(token)
}

/// Verifies the caller behind `header` and checks their role against `allowed_roles`.
pub fn authorize(
    authorizer: &dyn Authorizer,
    header: Option<&str>,
    allowed_roles: &[String],
) -> Result<Principal, AuthError> {
    let principal = bearer_token(header).and_then(|token| authorizer.verify(token));
    let principal = match principal {
        Ok(principal) => principal,
        Err(err) => {
            warn!(target: "security", error = %err, "export request rejected");
            return Err(err);
        }
    };

    if !allowed_roles.iter().any(|role| role == &principal.role) {
        warn!(
            target: "security",
            subject = %principal.subject,
            role = %principal.role,
            "export forbidden for role"
        );
        return Err(AuthError::Forbidden {
            role: principal.role,
        });
    }
    Ok(principal)
}

/// Claims carried by an export token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
}

/// HS256 JWT verification (and issuance, for operators) with a shared secret.
#[derive(Clone)]
pub struct JwtAuthorizer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    token_minutes: i64,
}

impl JwtAuthorizer {
    pub fn new(secret: &str, issuer: impl Into<String>, token_minutes: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.into(),
            token_minutes,
        }
    }

    /// Mints a token for `subject` with `role`, valid for the configured lifetime.
    pub fn issue(&self, subject: &str, role: &str) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_string(),
            role: role.to_string(),
            exp: (now + Duration::minutes(self.token_minutes)).timestamp(),
            iat: now.timestamp(),
            iss: self.issuer.clone(),
        };
        self.sign(&claims)
    }

    fn sign(&self, claims: &Claims) -> Result<String, AuthError> {
        encode(&Header::default(), claims, &self.encoding_key)
            .map_err(|e| AuthError::Issue(e.to_string()))
    }
}

impl Authorizer for JwtAuthorizer {
    fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["sub", "exp", "iss"]);

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                _ => AuthError::InvalidToken(e.to_string()),
            }
        })?;

        Ok(Principal {
            subject: data.claims.sub,
            role: data.claims.role,
        })
    }
}
