//! JWKS-backed ID token signature verification.
//!
//! This module provides [`JwksVerifier`], the packaged implementation of
//! [`SignatureVerifier`](crate::jwt::SignatureVerifier). It fetches the
//! IdP's JSON Web Key Set, caches it with a TTL, resolves the signing key
//! by `kid`, and verifies the token signature and registered claims.
//!
//! # Security Considerations
//!
//! - Only HTTPS JWKS endpoints are allowed unless `allow_http` is set
//!   (testing only)
//! - HTTP timeouts prevent hanging on slow endpoints
//! - The cache TTL bounds how long a rotated-out key is still accepted

use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::{Jwk, JwkSet, KeyAlgorithm};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use tokio::sync::RwLock;
use url::Url;

use crate::jwt::{IdToken, SignatureVerifier, TokenError};

/// Configuration for the JWKS verifier.
#[derive(Debug, Clone)]
pub struct JwksVerifierConfig {
    /// The JWKS endpoint published by the IdP.
    pub jwks_uri: Url,

    /// The audience (our client ID) tokens must be issued to.
    pub expected_audience: String,

    /// The issuer tokens must come from; skipped when `None`.
    pub expected_issuer: Option<String>,

    /// How long a fetched key set is reused (default: 1 hour).
    pub cache_ttl: Duration,

    /// HTTP request timeout (default: 10 seconds).
    pub request_timeout: Duration,

    /// Clock skew tolerance (default: 60 seconds).
    pub leeway: Duration,

    /// Whether to allow HTTP (non-HTTPS) JWKS URIs. Testing only.
    pub allow_http: bool,
}

impl JwksVerifierConfig {
    /// Creates a configuration with the JWKS endpoint and expected audience.
    #[must_use]
    pub fn new(jwks_uri: Url, expected_audience: impl Into<String>) -> Self {
        Self {
            jwks_uri,
            expected_audience: expected_audience.into(),
            expected_issuer: None,
            cache_ttl: Duration::from_secs(3600),
            request_timeout: Duration::from_secs(10),
            leeway: Duration::from_secs(60),
            allow_http: false,
        }
    }

    /// Sets the expected issuer.
    #[must_use]
    pub fn with_expected_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.expected_issuer = Some(issuer.into());
        self
    }

    /// Sets the key-set cache TTL.
    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Sets the HTTP request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the clock skew tolerance.
    #[must_use]
    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    /// Allows HTTP (non-HTTPS) JWKS URIs.
    ///
    /// # Warning
    ///
    /// This should only be used for testing.
    #[must_use]
    pub fn with_allow_http(mut self, allow: bool) -> Self {
        self.allow_http = allow;
        self
    }
}

/// Cached key set with its expiry.
struct CachedJwks {
    jwks: JwkSet,
    expires_at: Instant,
}

/// Verifies ID token signatures against the IdP's published key set.
pub struct JwksVerifier {
    http_client: reqwest::Client,
    cache: RwLock<Option<CachedJwks>>,
    config: JwksVerifierConfig,
}

impl JwksVerifier {
    /// Creates a new verifier.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created (should not happen in
    /// practice).
    #[must_use]
    pub fn new(config: JwksVerifierConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http_client,
            cache: RwLock::new(None),
            config,
        }
    }

    /// Drops the cached key set, forcing a refetch on the next verification.
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    /// Looks up a decoding key by `kid`, fetching the key set when the
    /// cache is cold or stale.
    async fn get_key(&self, kid: &str) -> Result<(DecodingKey, Option<Algorithm>), TokenError> {
        if let Some(found) = self.get_cached_key(kid).await? {
            return Ok(found);
        }

        let jwks = self.fetch_jwks().await?;
        let found = find_key(&jwks, kid)?;

        let mut cache = self.cache.write().await;
        *cache = Some(CachedJwks {
            jwks,
            expires_at: Instant::now() + self.config.cache_ttl,
        });

        Ok(found)
    }

    async fn get_cached_key(
        &self,
        kid: &str,
    ) -> Result<Option<(DecodingKey, Option<Algorithm>)>, TokenError> {
        let cache = self.cache.read().await;
        let Some(cached) = cache.as_ref() else {
            return Ok(None);
        };
        if Instant::now() >= cached.expires_at {
            return Ok(None);
        }

        // A fresh key set that lacks the kid is authoritative until it
        // expires; refetching on every unknown kid would let a forged
        // token drive request volume against the IdP.
        find_key(&cached.jwks, kid).map(Some)
    }

    async fn fetch_jwks(&self) -> Result<JwkSet, TokenError> {
        if !self.config.allow_http && self.config.jwks_uri.scheme() != "https" {
            return Err(TokenError::KeyRetrieval(
                "only HTTPS JWKS endpoints are allowed".to_string(),
            ));
        }

        tracing::debug!("Fetching IdP key set from {}", self.config.jwks_uri);

        let response = self
            .http_client
            .get(self.config.jwks_uri.as_str())
            .send()
            .await
            .map_err(|e| TokenError::KeyRetrieval(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(TokenError::KeyRetrieval(format!(
                "HTTP {} from JWKS endpoint",
                response.status()
            )));
        }

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| TokenError::KeyRetrieval(format!("invalid JWKS document: {e}")))
    }
}

#[async_trait]
impl SignatureVerifier for JwksVerifier {
    async fn verify(&self, raw_token: &str) -> Result<(), TokenError> {
        let header = decode_header(raw_token)
            .map_err(|e| TokenError::Malformed(format!("invalid token header: {e}")))?;
        let kid = header.kid.ok_or_else(|| {
            TokenError::SignatureInvalid("token header has no key ID (kid)".to_string())
        })?;

        let (decoding_key, key_alg) = self.get_key(&kid).await?;

        // Prefer the key's declared algorithm over the attacker-controlled
        // token header.
        let alg = key_alg.unwrap_or(header.alg);

        let mut validation = Validation::new(alg);
        validation.set_audience(&[&self.config.expected_audience]);
        if let Some(issuer) = &self.config.expected_issuer {
            validation.set_issuer(&[issuer.trim_end_matches('/')]);
        }
        validation.leeway = self.config.leeway.as_secs();

        decode::<serde_json::Value>(raw_token, &decoding_key, &validation)
            .map(|_| ())
            .map_err(|e| map_jwt_error(&e, raw_token, self.config.expected_issuer.as_deref()))
    }
}

fn find_key(jwks: &JwkSet, kid: &str) -> Result<(DecodingKey, Option<Algorithm>), TokenError> {
    let jwk = jwks
        .keys
        .iter()
        .find(|k| k.common.key_id.as_deref() == Some(kid))
        .ok_or_else(|| TokenError::KeyRetrieval(format!("key {kid} not found in IdP key set")))?;

    let decoding_key = DecodingKey::from_jwk(jwk)
        .map_err(|e| TokenError::SignatureInvalid(format!("unusable key {kid}: {e}")))?;

    Ok((decoding_key, jwk_algorithm(jwk)))
}

/// Extracts the algorithm declared on a JWK, if any.
fn jwk_algorithm(jwk: &Jwk) -> Option<Algorithm> {
    jwk.common.key_algorithm.as_ref().and_then(|alg| match alg {
        KeyAlgorithm::HS256 => Some(Algorithm::HS256),
        KeyAlgorithm::HS384 => Some(Algorithm::HS384),
        KeyAlgorithm::HS512 => Some(Algorithm::HS512),
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        _ => None,
    })
}

fn map_jwt_error(
    error: &jsonwebtoken::errors::Error,
    raw_token: &str,
    expected_issuer: Option<&str>,
) -> TokenError {
    use jsonwebtoken::errors::ErrorKind;

    match error.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::ImmatureSignature => TokenError::NotYetValid,
        ErrorKind::InvalidAudience => TokenError::AudienceMismatch,
        ErrorKind::InvalidIssuer => TokenError::IssuerMismatch {
            expected: expected_issuer.unwrap_or_default().to_string(),
            actual: IdToken::parse(raw_token)
                .ok()
                .and_then(|t| t.issuer().map(String::from))
                .unwrap_or_default(),
        },
        _ => TokenError::SignatureInvalid(error.to_string()),
    }
}
