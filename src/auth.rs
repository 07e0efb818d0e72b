// =============================================================================
// AUTH MODULE
// =============================================================================
// Bearer token extraction. Tokens are issued by the identity provider after
// the phone/OTP exchange; this service only verifies them.
//
// AXUM EXTRACTORS:
// - AuthUser:  any valid token, yields { user_id, role }
// - AdminUser: valid token with role "admin"
// =============================================================================

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const ADMIN_ROLE: &str = "admin";

/// Token payload as issued by the identity provider.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub role: String,
    pub exp: usize,
}

/// Caller identity for the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: String,
    pub role: String,
}

impl AuthUser {
    pub fn new(user_id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: role.into(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }
}

/// Caller identity that passed the admin check.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

// -----------------------------------------------------------------------------
// TOKEN VERIFIER
// -----------------------------------------------------------------------------
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Resolve an `Authorization` header value to a caller.
    pub fn verify_header(&self, header: Option<&str>) -> Result<AuthUser, AppError> {
        let header =
            header.ok_or_else(|| AppError::Unauthorized("Missing Authorization header".into()))?;

        let token = header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AppError::Unauthorized("Token missing".into()))?;

        let claims = decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "Rejected bearer token");
                AppError::Unauthorized("Invalid/Expired Token".into())
            })?
            .claims;

        Ok(AuthUser {
            user_id: claims.user_id,
            role: claims.role,
        })
    }
}

// -----------------------------------------------------------------------------
// EXTRACTORS
// -----------------------------------------------------------------------------
#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    Arc<TokenVerifier>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let verifier = Arc::<TokenVerifier>::from_ref(state);
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        verifier.verify_header(header)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    Arc<TokenVerifier>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(AppError::Forbidden("Admin access required".into()));
        }
        Ok(AdminUser(user))
    }
}
