use axum::{extract::FromRequestParts, http::header};
use jsonwebtoken::{DecodingKey, Validation, decode};
use uuid::Uuid;

use crate::{dto::auth::Claims, error::AppError};

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_VENDOR: &str = "vendor";
pub const ROLE_USER: &str = "user";

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }

    pub fn is_vendor(&self) -> bool {
        self.role == ROLE_VENDOR
    }
}

pub fn ensure_role(user: &AuthUser, role: &str) -> Result<(), AppError> {
    if user.role != role {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

pub fn ensure_admin(user: &AuthUser) -> Result<(), AppError> {
    ensure_role(user, ROLE_ADMIN)
}

pub fn ensure_vendor_or_admin(user: &AuthUser) -> Result<(), AppError> {
    if user.is_admin() || user.is_vendor() {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;
    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".into()))?;

        let auth_str = auth_header
            .to_str()
            .map_err(|_| AppError::Unauthorized("Invalid Authorization header".into()))?;

        if !auth_str.starts_with("Bearer ") {
            return Err(AppError::Unauthorized("Invalid Authorization scheme".into()));
        }
        let token = auth_str.trim_start_matches("Bearer ").trim();

        let secret = std::env::var("JWT_SECRET")
            .map_err(|_| AppError::Internal(anyhow::anyhow!("JWT_SECRET is not set")))?;

        let decoded = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| AppError::Unauthorized("Invalid or expired token".into()))?;

        let user_id = Uuid::parse_str(&decoded.claims.sub)
            .map_err(|_| AppError::Unauthorized("Invalid user id in token".into()))?;

        Ok(AuthUser {
            user_id,
            role: decoded.claims.role.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: &str) -> AuthUser {
        AuthUser {
            user_id: Uuid::new_v4(),
            role: role.to_string(),
        }
    }

    #[test]
    fn vendor_or_admin_guard() {
        assert!(ensure_vendor_or_admin(&user(ROLE_ADMIN)).is_ok());
        assert!(ensure_vendor_or_admin(&user(ROLE_VENDOR)).is_ok());
        assert!(matches!(
            ensure_vendor_or_admin(&user(ROLE_USER)),
            Err(AppError::Forbidden)
        ));
    }

    #[test]
    fn admin_guard_rejects_vendor() {
        assert!(ensure_admin(&user(ROLE_VENDOR)).is_err());
    }
}
