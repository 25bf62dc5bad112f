//! JWT token generation and validation
//!
//! Access tokens carry `sub`, `exp`, `iat` and a random `jti`. Keys are
//! pre-computed once at startup. Expiry is checked against the injected
//! [`Clock`](crate::clock::Clock), separately from and in addition to the
//! signature check, so a correctly signed old token is still rejected.
//!
//! There is no revocation list: a token stays valid until `exp`.

use crate::clock::SharedClock;
use crate::config::JwtConfig;
use anyhow::Result;
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use user_management_shared::TokenError;
use uuid::Uuid;

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Unique token ID, reserved for replay detection
    pub jti: String,
}

/// A freshly issued token and what it asserts
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub subject: String,
    pub jti: String,
    pub expires_at: DateTime<Utc>,
}

/// Pre-computed JWT keys for efficient token operations
/// These are expensive to create, so we cache them in AppState
#[derive(Clone)]
pub struct JwtKeys {
    encoding: Arc<EncodingKey>,
    decoding: Arc<DecodingKey>,
}

impl JwtKeys {
    /// Create new JWT keys from secret
    /// This should be called once at startup
    pub fn new(secret: &SecretString) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        Self {
            encoding: Arc::new(EncodingKey::from_secret(bytes)),
            decoding: Arc::new(DecodingKey::from_secret(bytes)),
        }
    }

    pub fn encoding(&self) -> &EncodingKey {
        &self.encoding
    }

    pub fn decoding(&self) -> &DecodingKey {
        &self.decoding
    }
}

/// Parse a configured algorithm name, accepting only HMAC variants
pub fn parse_algorithm(name: &str) -> Result<Algorithm> {
    let algorithm = Algorithm::from_str(name)
        .map_err(|_| anyhow::anyhow!("Unknown JWT algorithm: {}", name))?;
    match algorithm {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(algorithm),
        other => anyhow::bail!("JWT algorithm {:?} needs an asymmetric key; use HS256/HS384/HS512", other),
    }
}

/// JWT service for token operations
///
/// Uses pre-computed keys wrapped in Arc, so cloning is cheap.
#[derive(Clone)]
pub struct JwtService {
    keys: JwtKeys,
    algorithm: Algorithm,
    validation: Arc<Validation>,
    access_token_ttl: Duration,
    clock: SharedClock,
}

impl JwtService {
    /// Create a new JWT service with pre-computed keys
    ///
    /// Call this once at application startup and store in AppState.
    pub fn new(
        secret: &SecretString,
        algorithm: &str,
        access_token_ttl: Duration,
        clock: SharedClock,
    ) -> Result<Self> {
        let algorithm = parse_algorithm(algorithm)?;
        if access_token_ttl < Duration::seconds(1) {
            anyhow::bail!("Access token TTL must be at least one second");
        }

        let mut validation = Validation::new(algorithm);
        // Expiry is checked against our own clock in `decode_claims`
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            keys: JwtKeys::new(secret),
            algorithm,
            validation: Arc::new(validation),
            access_token_ttl,
            clock,
        })
    }

    /// Create from configuration
    pub fn from_config(config: &JwtConfig, clock: SharedClock) -> Result<Self> {
        Self::new(
            &config.secret,
            &config.algorithm,
            Duration::minutes(config.access_token_expire_minutes),
            clock,
        )
    }

    /// Issue an access token for a user with the default TTL
    #[inline]
    pub fn issue_access_token(&self, user_id: Uuid) -> Result<AccessToken, TokenError> {
        self.issue(&user_id.to_string(), self.access_token_ttl)
    }

    /// Issue a token for `subject` that expires `ttl` from now
    ///
    /// `exp` is a whole-second NumericDate truncated from `now + ttl`, so a
    /// token issued mid-second stops validating up to one second before
    /// the exact instant. `AccessToken::expires_at` reports the truncated time.
    pub fn issue(&self, subject: &str, ttl: Duration) -> Result<AccessToken, TokenError> {
        if ttl < Duration::seconds(1) {
            return Err(TokenError::Issue("TTL must be at least one second".to_string()));
        }

        let now = self.clock.now();
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| TokenError::Issue("expiry out of range".to_string()))?;
        let claims = Claims {
            sub: subject.to_string(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(self.algorithm), &claims, self.keys.encoding())
            .map_err(|e| TokenError::Issue(e.to_string()))?;

        Ok(AccessToken {
            token,
            subject: claims.sub,
            jti: claims.jti,
            expires_at: Utc
                .timestamp_opt(claims.exp, 0)
                .single()
                .unwrap_or(expires_at),
        })
    }

    /// Validate a token and return its subject
    #[inline]
    pub fn validate(&self, token: &str) -> Result<String, TokenError> {
        self.decode_claims(token).map(|claims| claims.sub)
    }

    /// Validate a token and return all claims
    pub fn decode_claims(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = decode::<Claims>(token, self.keys.decoding(), &self.validation)
            .map_err(classify)?
            .claims;

        if claims.sub.is_empty() {
            return Err(TokenError::Malformed("empty subject".to_string()));
        }
        if claims.jti.is_empty() {
            return Err(TokenError::Malformed("empty jti".to_string()));
        }
        if self.clock.now().timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    /// Default access token lifetime
    #[inline]
    pub fn access_token_ttl(&self) -> Duration {
        self.access_token_ttl
    }

    /// Get the pre-computed keys (for sharing)
    pub fn keys(&self) -> &JwtKeys {
        &self.keys
    }
}

fn classify(err: jsonwebtoken::errors::Error) -> TokenError {
    match err.kind() {
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => TokenError::InvalidSignature,
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::MissingRequiredClaim(claim) => {
            TokenError::Malformed(format!("missing claim: {}", claim))
        }
        _ => TokenError::Malformed(err.to_string()),
    }
}
