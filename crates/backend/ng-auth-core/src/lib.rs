use anyhow::{Result, anyhow};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Claims carried by NailGenie access tokens.
///
/// The identity provider is the source of truth for `sub` and `email`;
/// the billing service trusts them fully once the signature checks out.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub exp: i64,
    pub iat: i64,
    pub token_type: String,
}

impl Claims {
    pub fn user_id(&self) -> Result<Uuid> {
        Uuid::parse_str(&self.sub).map_err(|e| anyhow!("Invalid subject in token: {}", e))
    }
}

#[derive(Clone)]
pub struct JwtConfig {
    pub access_token_encoding_key: EncodingKey,
    pub access_token_decoding_key: DecodingKey,
    pub access_token_expiry_hours: i64,
    pub algorithm: Algorithm,
    pub validation: Validation,
}

impl JwtConfig {
    /// Production configuration: ES256 keys from the environment.
    pub fn from_env() -> Result<Self> {
        let private = std::env::var("JWT_ACCESS_PRIVATE_KEY")
            .map_err(|_| anyhow!("JWT_ACCESS_PRIVATE_KEY must be set (PEM-encoded EC key)"))?;
        let public = std::env::var("JWT_ACCESS_PUBLIC_KEY")
            .map_err(|_| anyhow!("JWT_ACCESS_PUBLIC_KEY must be set (PEM-encoded EC key)"))?;

        Ok(Self {
            access_token_encoding_key: EncodingKey::from_ec_pem(private.as_bytes())
                .map_err(|e| anyhow!("JWT_ACCESS_PRIVATE_KEY is not a valid EC PEM key: {}", e))?,
            access_token_decoding_key: DecodingKey::from_ec_pem(public.as_bytes())
                .map_err(|e| anyhow!("JWT_ACCESS_PUBLIC_KEY is not a valid EC PEM key: {}", e))?,
            access_token_expiry_hours: 1,
            algorithm: Algorithm::ES256,
            validation: Validation::new(Algorithm::ES256),
        })
    }

    /// Symmetric configuration, used by tests and local development.
    pub fn from_hs256_secret(secret: &[u8]) -> Self {
        Self {
            access_token_encoding_key: EncodingKey::from_secret(secret),
            access_token_decoding_key: DecodingKey::from_secret(secret),
            access_token_expiry_hours: 1,
            algorithm: Algorithm::HS256,
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn generate_access_token(&self, user_id: Uuid, email: &str) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            iat: now.timestamp(),
            exp: (now + chrono::Duration::hours(self.access_token_expiry_hours)).timestamp(),
            token_type: "access".to_string(),
        };

        let header = jsonwebtoken::Header::new(self.algorithm);
        encode(&header, &claims, &self.access_token_encoding_key)
            .map_err(|e| anyhow!("Failed to encode token: {}", e))
    }

    pub fn validate_access_token(&self, token: &str) -> Result<Claims> {
        let token_data = decode::<Claims>(token, &self.access_token_decoding_key, &self.validation)
            .map_err(|e| anyhow!("Invalid token: {}", e))?;

        if token_data.claims.token_type != "access" {
            return Err(anyhow!("Invalid token type: expected access token"));
        }

        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_token_round_trip() {
        let config = JwtConfig::from_hs256_secret(b"test-secret");
        let user_id = Uuid::new_v4();

        let token = config
            .generate_access_token(user_id, "nails@example.com")
            .unwrap();
        let claims = config.validate_access_token(&token).unwrap();

        assert_eq!(claims.user_id().unwrap(), user_id);
        assert_eq!(claims.email, "nails@example.com");
        assert_eq!(claims.token_type, "access");
    }

    #[test]
    fn rejects_token_signed_with_other_secret() {
        let config = JwtConfig::from_hs256_secret(b"secret-a");
        let other = JwtConfig::from_hs256_secret(b"secret-b");

        let token = other
            .generate_access_token(Uuid::new_v4(), "nails@example.com")
            .unwrap();
        assert!(config.validate_access_token(&token).is_err());
    }

    #[test]
    fn rejects_garbage_token() {
        let config = JwtConfig::from_hs256_secret(b"test-secret");
        assert!(config.validate_access_token("not-a-jwt").is_err());
    }
}
