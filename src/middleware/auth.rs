use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::AppState;

pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub role: Option<String>,
}

impl Claims {
    /// The caller's user id, carried in `sub`.
    pub fn user_id(&self) -> Result<Uuid> {
        Uuid::parse_str(&self.sub)
            .map_err(|_| Error::Unauthorized("Token subject is not a user id".to_string()))
    }

    pub fn is_admin(&self) -> bool {
        self.role
            .as_deref()
            .map(|r| r.eq_ignore_ascii_case(ADMIN_ROLE))
            .unwrap_or(false)
    }
}

fn authenticate(req: &Request, secret: &str) -> Result<Claims> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .ok_or_else(|| Error::Unauthorized("Missing authorization header".to_string()))?;
    let value = header
        .to_str()
        .map_err(|_| Error::Unauthorized("Malformed authorization header".to_string()))?;
    let token = value
        .strip_prefix("Bearer ")
        .ok_or_else(|| Error::Unauthorized("Unsupported authorization scheme".to_string()))?;

    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| {
        tracing::debug!(error = %e, "bearer token rejected");
        Error::Unauthorized("Invalid or expired token".to_string())
    })?;
    Ok(data.claims)
}

pub async fn require_bearer_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    match authenticate(&req, &state.jwt_secret) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(err) => err.into_response(),
    }
}

pub async fn require_admin(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let claims = match authenticate(&req, &state.jwt_secret) {
        Ok(claims) => claims,
        Err(err) => return err.into_response(),
    };
    if !claims.is_admin() {
        tracing::warn!(sub = %claims.sub, "non-admin caller refused");
        return Error::Forbidden("Administrator role required".to_string()).into_response();
    }
    req.extensions_mut().insert(claims);
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(role: Option<&str>) -> Claims {
        Claims {
            sub: Uuid::new_v4().to_string(),
            exp: 0,
            role: role.map(str::to_string),
        }
    }

    #[test]
    fn admin_role_is_case_insensitive() {
        assert!(claims(Some("Admin")).is_admin());
        assert!(!claims(Some("student")).is_admin());
        assert!(!claims(None).is_admin());
    }

    #[test]
    fn subject_must_be_uuid() {
        let mut c = claims(None);
        assert!(c.user_id().is_ok());
        c.sub = "alice".to_string();
        assert!(matches!(c.user_id(), Err(Error::Unauthorized(_))));
    }
}
