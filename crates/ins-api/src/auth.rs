//! Bearer token issuance and the authenticated-caller extractor

use crate::error::ApiError;
use crate::AppState;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::{Duration, Utc};
use ins_core::{Account, Caller, Role};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

pub fn create_token(
    account: &Account,
    secret: &str,
    ttl_hours: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let claims = Claims {
        sub: account.id,
        role: account.role,
        iat: now.timestamp(),
        exp: (now + Duration::hours(ttl_hours)).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

pub fn decode_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
}

/// The caller behind a valid `Authorization: Bearer` header.
pub struct AuthUser(pub Caller);

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ApiError::Unauthorized("No token, authorization denied".to_string()))?;

        let secret = state
            .config
            .jwt_secret
            .as_deref()
            .ok_or_else(ApiError::configuration)?;

        let claims = decode_token(token, secret).map_err(|e| {
            tracing::debug!("Rejected token: {}", e);
            ApiError::Unauthorized("Token is not valid".to_string())
        })?;

        Ok(AuthUser(Caller::new(claims.sub, claims.role)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(role: Role) -> Account {
        Account {
            id: Uuid::new_v4(),
            user_name: "Agent A".to_string(),
            email: "agent@example.com".to_string(),
            password_hash: String::new(),
            role,
            cin: "12345678".to_string(),
            adresse: "Tunis".to_string(),
            phone: "22334455".to_string(),
            image_url: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_token_round_trip() {
        let account = account(Role::Agent);
        let token = create_token(&account, "secret", 1).unwrap();
        let claims = decode_token(&token, "secret").unwrap();
        assert_eq!(claims.sub, account.id);
        assert_eq!(claims.role, Role::Agent);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = create_token(&account(Role::Client), "secret", 1).unwrap();
        assert!(decode_token(&token, "other").is_err());
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let token = create_token(&account(Role::Client), "secret", -2).unwrap();
        assert!(decode_token(&token, "secret").is_err());
    }
}
