use axum::{
    extract::Request,
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use fieldops_core::types::{UserProfile, UserRole};
use fieldops_core::CoreError;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing;

use crate::error::ApiError;
use crate::state::ApiState;

/// JWT claims. `sid` ties the token to a server-side session so signing
/// out revokes it.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub sid: String,
    pub role: UserRole,
    pub exp: usize,
}

#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: UserProfile,
    pub session_id: String,
}

impl AuthenticatedUser {
    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.user.role == UserRole::Admin {
            Ok(())
        } else {
            Err(CoreError::Forbidden("Admin access required".to_string()).into())
        }
    }
}

fn extract_token(auth_header: Option<&str>) -> Option<String> {
    auth_header?
        .strip_prefix("Bearer ")
        .map(|s| s.trim().to_string())
}

pub fn generate_token(
    user_id: &str,
    session_id: &str,
    role: UserRole,
    secret: &str,
    expires_in_days: u64,
) -> Result<String, ApiError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| CoreError::Storage(e.to_string()))?
        .as_secs() as usize;

    let claims = Claims {
        sub: user_id.to_string(),
        sid: session_id.to_string(),
        role,
        exp: now + (expires_in_days * 24 * 60 * 60) as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )
    .map_err(|e| {
        tracing::error!("Failed to generate JWT token: {}", e);
        ApiError(CoreError::Storage(e.to_string()))
    })
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, ApiError> {
    let decoding_key = DecodingKey::from_secret(secret.as_ref());
    match decode::<Claims>(token, &decoding_key, &Validation::default()) {
        Ok(data) => Ok(data.claims),
        Err(e) => {
            tracing::debug!("JWT verification failed: {}", e);
            Err(CoreError::Unauthorized.into())
        }
    }
}

/// Resolves a raw token to a live session and an active user.
pub async fn authenticate(state: &ApiState, token: &str) -> Result<AuthenticatedUser, ApiError> {
    let claims = verify_token(token, &state.ctx.config.server.jwt_secret)?;
    let session = state.sessions.validate(&claims.sid).await?;
    if session.user_id != claims.sub {
        return Err(CoreError::Unauthorized.into());
    }

    let user = state
        .users
        .get_user(&claims.sub)
        .await
        .map_err(|_| ApiError(CoreError::Unauthorized))?;
    if !user.is_active {
        return Err(CoreError::Unauthorized.into());
    }

    Ok(AuthenticatedUser {
        user,
        session_id: session.id,
    })
}

fn is_public(path: &str) -> bool {
    path == "/health" || path.starts_with("/ws") || path == "/api/signup" || path == "/api/signin"
}

pub async fn auth_middleware(mut req: Request, next: Next) -> Result<Response, ApiError> {
    if is_public(req.uri().path()) {
        return Ok(next.run(req).await);
    }

    let auth_header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());
    let token = match extract_token(auth_header) {
        Some(t) => t,
        None => {
            tracing::debug!("Missing Authorization header");
            return Err(CoreError::Unauthorized.into());
        }
    };

    let state = req
        .extensions()
        .get::<ApiState>()
        .cloned()
        .ok_or_else(|| ApiError(CoreError::Storage("API state missing".to_string())))?;

    let authenticated = authenticate(&state, &token).await?;
    tracing::debug!(user_id = %authenticated.user.id, "Authenticated request");
    req.extensions_mut().insert(authenticated);

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip_and_rejection() {
        let token = generate_token("u-1", "s-1", UserRole::Supervisor, "secret", 7).unwrap();
        let claims = verify_token(&token, "secret").unwrap();
        assert_eq!(claims.sub, "u-1");
        assert_eq!(claims.sid, "s-1");
        assert_eq!(claims.role, UserRole::Supervisor);

        assert!(verify_token(&token, "other-secret").is_err());
        assert!(verify_token("garbage", "secret").is_err());
    }

    #[test]
    fn bearer_prefix_is_required() {
        assert_eq!(extract_token(Some("Bearer abc")), Some("abc".to_string()));
        assert_eq!(extract_token(Some("abc")), None);
        assert_eq!(extract_token(None), None);
    }
}
