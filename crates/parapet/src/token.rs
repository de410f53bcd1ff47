//! Bearer token issuing and verification.

use std::str::FromStr;
use std::time::Duration;

use jsonwebtoken::{
    decode, encode, errors::ErrorKind, get_current_timestamp, Algorithm, DecodingKey, EncodingKey,
    Header, Validation,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use parapet_telemetry::log_token_rejected;

use crate::config::ApiConfig;
use crate::error::ApiException;

/// Tokens expire after one day unless told otherwise.
pub const DEFAULT_TOKEN_EXPIRY: Duration = Duration::from_secs(24 * 60 * 60);

/// Token payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub exp: u64,
    pub iat: u64,
    /// Caller-supplied subject mapping.
    pub sub: Map<String, Value>,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("unsupported token algorithm '{0}' (expected HS256, HS384 or HS512)")]
    UnsupportedAlgorithm(String),

    #[error("token has expired")]
    Expired,

    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("failed to sign token: {0}")]
    Encode(String),
}

impl From<TokenError> for ApiException {
    fn from(err: TokenError) -> Self {
        let name = match err {
            TokenError::Expired => "token_expired",
            _ => "invalid_token",
        };
        ApiException::unauthorized(err.to_string()).with_error_name(name)
    }
}

/// Signs and verifies HMAC bearer tokens.
#[derive(Clone)]
pub struct TokenCodec {
    algorithm: Algorithm,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(secret: &str, algorithm: &str) -> Result<Self, TokenError> {
        let algorithm = Algorithm::from_str(algorithm)
            .ok()
            .filter(|a| matches!(a, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512))
            .ok_or_else(|| TokenError::UnsupportedAlgorithm(algorithm.to_string()))?;

        Ok(Self {
            algorithm,
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        })
    }

    pub fn from_config(config: &ApiConfig) -> Result<Self, TokenError> {
        Self::new(&config.secret_key, &config.token_algorithm)
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Issue a token carrying `subjects`.
    pub fn encode(
        &self,
        subjects: Map<String, Value>,
        expiry: Option<Duration>,
    ) -> Result<String, TokenError> {
        let iat = get_current_timestamp();
        let claims = Claims {
            exp: iat + expiry.unwrap_or(DEFAULT_TOKEN_EXPIRY).as_secs(),
            iat,
            sub: subjects,
        };
        encode(&Header::new(self.algorithm), &claims, &self.encoding)
            .map_err(|e| TokenError::Encode(e.to_string()))
    }

    /// Verify signature and expiry.
    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(self.algorithm);
        validation.set_required_spec_claims(&["exp"]);

        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                let err = match e.kind() {
                    ErrorKind::ExpiredSignature => TokenError::Expired,
                    _ => TokenError::Invalid(e.to_string()),
                };
                log_token_rejected!(reason = %err, "bearer token rejected");
                err
            })
    }
}
