use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderValue, header};
use ng_auth_core::JwtConfig;

use crate::error::BillingError;

/// Authenticated caller, extracted from the `Authorization: Bearer` header.
pub struct AuthUser(pub ng_auth_core::Claims);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = BillingError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let jwt_config = parts.extensions.get::<Arc<JwtConfig>>().ok_or_else(|| {
            BillingError::Internal(anyhow::anyhow!("JwtConfig not found in extensions"))
        })?;

        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .ok_or_else(|| {
                BillingError::Unauthorized("Missing authorization header".to_string())
            })?;

        let token = bearer_token(header)?;
        let claims = jwt_config
            .validate_access_token(token)
            .map_err(|e| BillingError::Unauthorized(e.to_string()))?;

        Ok(AuthUser(claims))
    }
}

fn bearer_token(header: &HeaderValue) -> Result<&str, BillingError> {
    let value = header.to_str().map_err(|_| {
        BillingError::Unauthorized("Authorization header contains invalid characters".to_string())
    })?;

    value
        .strip_prefix("Bearer ")
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            BillingError::Unauthorized("Authorization header must carry a bearer token".to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_strips_scheme() {
        let header = HeaderValue::from_static("Bearer abc.def.ghi");
        assert_eq!(bearer_token(&header).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn rejects_missing_scheme_and_empty_token() {
        assert!(bearer_token(&HeaderValue::from_static("abc.def.ghi")).is_err());
        assert!(bearer_token(&HeaderValue::from_static("Basic dXNlcjpwdw==")).is_err());
        assert!(bearer_token(&HeaderValue::from_static("Bearer ")).is_err());
    }

    #[test]
    fn rejects_non_utf8_header() {
        let header = HeaderValue::from_bytes(b"Bearer \xff\xfe").unwrap();
        assert!(bearer_token(&header).is_err());
    }
}
