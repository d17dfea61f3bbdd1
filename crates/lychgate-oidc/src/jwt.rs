//! ID token parsing and structural validation.
//!
//! This module provides [`IdToken`], the parsed form of the compact JWT
//! returned by the IdP, plus the [`SignatureVerifier`] seam used to plug in
//! cryptographic verification (see [`crate::jwks`] for the JWKS-backed
//! implementation).
//!
//! Parsing is purely structural: split into three segments, base64url
//! decode, decode the payload into a claims map. Whether signatures are
//! checked is the caller's choice via the verifier seam; expiry and
//! audience checks live in [`IdToken::validate`].

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Map, Value};
use time::OffsetDateTime;

/// Errors that can occur while parsing or validating an ID token.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// The compact representation is not a well-formed JWT.
    #[error("Malformed token: {0}")]
    Malformed(String),

    /// A claim required for validation is absent.
    #[error("Missing required claim: {0}")]
    MissingClaim(&'static str),

    /// The token has expired.
    #[error("ID token has expired")]
    Expired,

    /// The token is not yet valid (issued in the future).
    #[error("ID token is not yet valid")]
    NotYetValid,

    /// The audience does not include our client ID.
    #[error("Audience mismatch: ID token audience does not include our client ID")]
    AudienceMismatch,

    /// The issuer does not match the expected issuer.
    #[error("Issuer mismatch: expected {expected}, got {actual}")]
    IssuerMismatch {
        /// The expected issuer.
        expected: String,
        /// The actual issuer from the token.
        actual: String,
    },

    /// The nonce does not match the value stored at flow initiation.
    #[error("Nonce mismatch: ID token nonce does not match expected nonce")]
    NonceMismatch,

    /// The signature did not verify against the IdP's keys.
    #[error("Signature verification failed: {0}")]
    SignatureInvalid(String),

    /// The IdP key set could not be retrieved.
    #[error("Failed to retrieve IdP keys: {0}")]
    KeyRetrieval(String),
}

impl TokenError {
    /// Returns `true` for errors caused by the token's own content rather
    /// than by key retrieval or configuration.
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        !matches!(self, Self::KeyRetrieval(_))
    }
}

/// Pluggable signature verification for raw ID tokens.
///
/// Implementations verify the compact token's signature against the IdP's
/// published keys. When no verifier is configured the flow accepts tokens
/// on the strength of the direct TLS channel to the token endpoint, which
/// matches the OIDC code-flow baseline.
#[async_trait]
pub trait SignatureVerifier: Send + Sync {
    /// Verifies the signature of the raw compact token.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::SignatureInvalid`] on mismatch and
    /// [`TokenError::KeyRetrieval`] when the key set is unavailable.
    async fn verify(&self, raw_token: &str) -> Result<(), TokenError>;
}

/// A parsed OIDC identity token.
///
/// Immutable once parsed. The raw compact form is retained so it can be
/// persisted inside the token store record and re-verified later.
#[derive(Debug, Clone)]
pub struct IdToken {
    raw: String,
    header: Map<String, Value>,
    claims: Map<String, Value>,
}

impl IdToken {
    /// Parses a compact JWT into its header and claims.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Malformed`] if the segment count is not 3, a
    /// segment is not valid base64url, or the payload is not a JSON object.
    /// Never returns a partially parsed token.
    pub fn parse(raw: &str) -> Result<Self, TokenError> {
        let segments: Vec<&str> = raw.split('.').collect();
        if segments.len() != 3 {
            return Err(TokenError::Malformed(format!(
                "expected 3 segments, found {}",
                segments.len()
            )));
        }

        let header = decode_json_segment(segments[0], "header")?;
        let claims = decode_json_segment(segments[1], "payload")?;

        Ok(Self {
            raw: raw.to_string(),
            header,
            claims,
        })
    }

    /// The raw compact representation this token was parsed from.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Looks up a claim by name. Pure lookup, no side effects.
    #[must_use]
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    /// Looks up a string claim by name.
    #[must_use]
    pub fn claim_str(&self, name: &str) -> Option<&str> {
        self.claim(name).and_then(Value::as_str)
    }

    /// Looks up a claim expected to be a sequence of strings.
    ///
    /// Returns `None` when the claim is absent or not an array; non-string
    /// elements within an array are skipped.
    #[must_use]
    pub fn claim_str_list(&self, name: &str) -> Option<Vec<&str>> {
        self.claim(name)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
    }

    /// A header parameter by name (e.g. `alg`, `kid`).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&Value> {
        self.header.get(name)
    }

    /// The `iss` claim.
    #[must_use]
    pub fn issuer(&self) -> Option<&str> {
        self.claim_str("iss")
    }

    /// The `sub` claim.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.claim_str("sub")
    }

    /// The `aud` claim, normalized to a list (it may be a single string or
    /// an array per the OIDC spec).
    #[must_use]
    pub fn audience(&self) -> Vec<&str> {
        match self.claim("aud") {
            Some(Value::String(s)) => vec![s.as_str()],
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// The `exp` claim as a timestamp.
    #[must_use]
    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        self.timestamp_claim("exp")
    }

    /// The `iat` claim as a timestamp.
    #[must_use]
    pub fn issued_at(&self) -> Option<OffsetDateTime> {
        self.timestamp_claim("iat")
    }

    /// The `nonce` claim.
    #[must_use]
    pub fn nonce(&self) -> Option<&str> {
        self.claim_str("nonce")
    }

    fn timestamp_claim(&self, name: &str) -> Option<OffsetDateTime> {
        self.claim(name)
            .and_then(Value::as_i64)
            .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
    }

    /// Checks expiry and audience against the relying party's client ID.
    ///
    /// `leeway` absorbs clock skew between us and the IdP in both
    /// directions.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::MissingClaim`] when `exp` is absent,
    /// [`TokenError::Expired`] / [`TokenError::NotYetValid`] on timing
    /// failures, and [`TokenError::AudienceMismatch`] when `aud` does not
    /// include `expected_audience`.
    pub fn validate(&self, expected_audience: &str, leeway: Duration) -> Result<(), TokenError> {
        let now = OffsetDateTime::now_utc();

        let expires_at = self.expires_at().ok_or(TokenError::MissingClaim("exp"))?;
        if expires_at + leeway < now {
            return Err(TokenError::Expired);
        }

        if let Some(issued_at) = self.issued_at() {
            if issued_at - leeway > now {
                return Err(TokenError::NotYetValid);
            }
        }

        if !self.audience().contains(&expected_audience) {
            return Err(TokenError::AudienceMismatch);
        }

        Ok(())
    }

    /// Checks the `nonce` claim against the value stored at flow
    /// initiation.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::NonceMismatch`] when the claim is absent or
    /// differs. A nonce is always sent with the authorization request, so
    /// its absence in the token is a failure.
    pub fn validate_nonce(&self, expected_nonce: &str) -> Result<(), TokenError> {
        match self.nonce() {
            Some(nonce) if nonce == expected_nonce => Ok(()),
            _ => Err(TokenError::NonceMismatch),
        }
    }
}

fn decode_json_segment(segment: &str, what: &str) -> Result<Map<String, Value>, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| TokenError::Malformed(format!("{what} is not valid base64url: {e}")))?;

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(TokenError::Malformed(format!(
            "{what} is not a JSON object"
        ))),
        Err(e) => Err(TokenError::Malformed(format!(
            "{what} is not valid JSON: {e}"
        ))),
    }
}
