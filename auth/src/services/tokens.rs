use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use ring::rand::{SecureRandom, SystemRandom};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use strategyforge_config::AuthConfig;
use strategyforge_models::{AccessClaims, RefreshClaims, ACCESS_TOKEN_ISSUER, REFRESH_TOKEN_ISSUER};
use strategyforge_observability::log_security;

use crate::errors::{AuthError, AuthResult};

const MAGIC_TOKEN_BYTES: usize = 32;

struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

/// Issues and validates HS256 access/refresh tokens and mints magic-link
/// tokens.
pub struct TokenService {
    keys: Option<SigningKeys>,
    access_token_ttl: Duration,
    refresh_token_ttl: Duration,
    rng: SystemRandom,
}

impl TokenService {
    pub fn new(config: &AuthConfig) -> Self {
        let keys = config.jwt_secret.as_deref().map(|secret| SigningKeys {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        });

        if keys.is_none() {
            tracing::warn!("JWT_SECRET is not set; token operations will fail");
        }

        Self {
            keys,
            access_token_ttl: config.access_token_ttl,
            refresh_token_ttl: config.refresh_token_ttl,
            rng: SystemRandom::new(),
        }
    }

    fn keys(&self) -> AuthResult<&SigningKeys> {
        self.keys
            .as_ref()
            .ok_or_else(|| AuthError::Config("JWT secret not configured".to_string()))
    }

    pub fn issue_access_token(&self, account_id: &str, email: &str, is_pro: bool) -> AuthResult<String> {
        let keys = self.keys()?;
        let now = Utc::now().timestamp();

        let claims = AccessClaims {
            user_id: account_id.to_string(),
            email: email.to_string(),
            is_pro,
            iss: ACCESS_TOKEN_ISSUER.to_string(),
            iat: now,
            nbf: now,
            exp: expires_at(now, self.access_token_ttl)?,
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)
            .map_err(|e| AuthError::Config(format!("failed to sign access token: {}", e)))
    }

    pub fn issue_refresh_token(&self, account_id: &str) -> AuthResult<String> {
        let keys = self.keys()?;
        let now = Utc::now().timestamp();

        let claims = RefreshClaims {
            sub: account_id.to_string(),
            iss: REFRESH_TOKEN_ISSUER.to_string(),
            iat: now,
            exp: expires_at(now, self.refresh_token_ttl)?,
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)
            .map_err(|e| AuthError::Config(format!("failed to sign refresh token: {}", e)))
    }

    pub fn validate_access_token(&self, token: &str) -> AuthResult<AccessClaims> {
        let mut validation = Self::validation(ACCESS_TOKEN_ISSUER);
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp", "iss", "nbf"]);
        self.decode_with(token, &validation)
    }

    /// Refresh tokens carry a different issuer, so an access token never
    /// passes here and vice versa.
    pub fn validate_refresh_token(&self, token: &str) -> AuthResult<RefreshClaims> {
        let mut validation = Self::validation(REFRESH_TOKEN_ISSUER);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        self.decode_with(token, &validation)
    }

    fn validation(issuer: &str) -> Validation {
        // Validation::new pins the allow-list to exactly this algorithm.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer]);
        validation.leeway = 0;
        validation
    }

    fn decode_with<T: DeserializeOwned>(&self, token: &str, validation: &Validation) -> AuthResult<T> {
        let keys = self.keys()?;
        decode::<T>(token, &keys.decoding, validation)
            .map(|data| data.claims)
            .map_err(|e| {
                log_security!("token_rejected", reason = e.kind());
                AuthError::InvalidToken
            })
    }

    /// 32 bytes from the OS CSPRNG, base64url without padding.
    pub fn issue_magic_link_token(&self) -> AuthResult<String> {
        let mut bytes = [0u8; MAGIC_TOKEN_BYTES];
        self.rng.fill(&mut bytes).map_err(|_| AuthError::RandomSource)?;
        Ok(general_purpose::URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Validate an `Authorization` header of the form `Bearer <token>`.
    pub fn authenticate_bearer(&self, header_value: &str) -> AuthResult<AccessClaims> {
        let parts: Vec<&str> = header_value.split(' ').collect();
        if parts.len() != 2 || parts[0] != "Bearer" || parts[1].is_empty() {
            return Err(AuthError::MissingBearer);
        }
        self.validate_access_token(parts[1])
    }

    pub fn require_pro(&self, claims: &AccessClaims) -> AuthResult<()> {
        if claims.is_pro {
            Ok(())
        } else {
            Err(AuthError::ProRequired)
        }
    }
}

/// `now + ttl` in epoch seconds; a TTL that overflows is a configuration error.
fn expires_at(now: i64, ttl: Duration) -> AuthResult<i64> {
    i64::try_from(ttl.as_secs())
        .ok()
        .and_then(|ttl| now.checked_add(ttl))
        .ok_or_else(|| AuthError::Config(format!("token lifetime {:?} is out of range", ttl)))
}
