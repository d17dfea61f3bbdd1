//! The authorization code login flow.
//!
//! # Overview
//!
//! This is the standard confidential-client OIDC flow:
//!
//! 1. [`initiate`](AuthorizationCodeFlow::initiate) stores a single-use
//!    state record and returns the authorization redirect
//! 2. The IdP authenticates the user and calls back with `code` and
//!    `state`
//! 3. [`login`](AuthorizationCodeFlow::login) consumes the state,
//!    exchanges the code at the token endpoint, validates the ID token,
//!    resolves a local user, persists the tokens, and syncs roles
//!
//! # Security Considerations
//!
//! - State and nonce are 32 random bytes each, base64url encoded
//! - The state record is consumed atomically; a replayed callback fails
//! - Role changes are applied only after the token record is persisted,
//!   so a failed login never alters assignments

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use serde::Deserialize;
use time::OffsetDateTime;
use url::Url;

use super::{
    AuthorizationRedirect, FlowServices, InitiateRequest, LoginFlow, LoginFlowError, LoginOutcome,
};
use crate::config::{LoginFlowConfig, ProvisioningPolicy};
use crate::events::LoginEvent;
use crate::jwt::{IdToken, TokenError};
use crate::roles::sync_roles;
use crate::storage::{AuthState, LocalUser, OidcToken, TokenUpdate, UserProfile};

/// Successful response from the token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// The access token for the configured resource.
    pub access_token: String,

    /// Token type, normally `Bearer`.
    #[serde(default)]
    pub token_type: Option<String>,

    /// Access token lifetime in seconds. Some IdPs send this as a string.
    #[serde(default, deserialize_with = "deserialize_expires_in")]
    pub expires_in: Option<u64>,

    /// Optional refresh token.
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// The ID token asserting the user's identity.
    pub id_token: String,

    /// Granted scopes.
    #[serde(default)]
    pub scope: Option<String>,
}

/// Error response body from the token endpoint.
#[derive(Debug, Clone, Deserialize)]
struct OAuthErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

fn deserialize_expires_in<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Number(n)) => Some(n),
        Some(Raw::Text(s)) => s.parse().ok(),
        None => None,
    })
}

/// The authorization code flow.
pub struct AuthorizationCodeFlow {
    config: Arc<LoginFlowConfig>,
    services: FlowServices,
    http_client: reqwest::Client,
}

impl AuthorizationCodeFlow {
    /// The name this flow registers under.
    pub const KIND: &'static str = "authcode";

    /// Creates the flow from its configuration and collaborators.
    #[must_use]
    pub fn new(config: Arc<LoginFlowConfig>, services: FlowServices) -> Self {
        Self {
            config,
            services,
            http_client: reqwest::Client::new(),
        }
    }

    /// Builds the authorization URL for a stored state record.
    fn authorization_url(
        &self,
        state: &str,
        nonce: &str,
        login_hint: Option<&str>,
    ) -> Result<Url, LoginFlowError> {
        let mut url = self.config.auth_endpoint.clone();

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.config.client_id)
                .append_pair("response_type", "code")
                .append_pair("redirect_uri", self.config.redirect_uri.as_str())
                .append_pair("scope", &self.config.scope_string())
                .append_pair("state", state)
                .append_pair("nonce", nonce);

            if let Some(resource) = &self.config.resource {
                query.append_pair("resource", resource);
            }
            if let Some(domain_hint) = &self.config.domain_hint {
                query.append_pair("domain_hint", domain_hint);
            }
            if let Some(hint) = login_hint {
                query.append_pair("login_hint", &self.config.apply_auto_append(hint));
            }
        }

        Ok(url)
    }

    /// Exchanges an authorization code for tokens.
    async fn exchange_code(&self, code: &str) -> Result<TokenResponse, LoginFlowError> {
        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
        ];
        if let Some(secret) = &self.config.client_secret {
            params.push(("client_secret", secret.as_str()));
        }

        let response = self
            .http_client
            .post(self.config.token_endpoint.clone())
            .timeout(self.config.request_timeout)
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            if let Ok(oauth) = serde_json::from_str::<OAuthErrorResponse>(&body) {
                tracing::warn!(
                    error = %oauth.error,
                    description = ?oauth.error_description,
                    "Token endpoint rejected the code exchange"
                );
                return Err(LoginFlowError::OAuth {
                    error: oauth.error,
                    description: oauth.error_description,
                });
            }
            return Err(LoginFlowError::TokenExchange(format!(
                "token endpoint returned {status}"
            )));
        }

        serde_json::from_str(&body).map_err(|e| {
            LoginFlowError::TokenExchange(format!("unexpected token response body: {e}"))
        })
    }

    /// Parses and validates the ID token against this attempt's state.
    async fn validate_id_token(
        &self,
        raw: &str,
        auth_state: &AuthState,
    ) -> Result<IdToken, LoginFlowError> {
        let token = IdToken::parse(raw)?;

        if let Some(verifier) = &self.services.verifier {
            verifier.verify(raw).await?;
        }

        token.validate(&self.config.client_id, self.config.clock_skew_tolerance)?;
        token.validate_nonce(&auth_state.nonce)?;

        Ok(token)
    }

    /// Resolves the local user for a validated ID token.
    ///
    /// Resolution order: the user already linked to this username's token
    /// record, then a directory lookup by username, then provisioning if
    /// the policy allows it.
    async fn resolve_user(
        &self,
        username: &str,
        token: &IdToken,
    ) -> Result<LocalUser, LoginFlowError> {
        if let Some(record) = self.services.tokens.find_by_username(username).await? {
            if let Some(user_id) = &record.user_id {
                if let Some(user) = self.services.directory.find_by_id(user_id).await? {
                    return Ok(user);
                }
                tracing::warn!(
                    username = %username,
                    user_id = %user_id,
                    "Token record links to a user the directory no longer knows"
                );
            }
        }

        if let Some(user) = self.services.directory.find_by_username(username).await? {
            return Ok(user);
        }

        match self.config.provisioning {
            ProvisioningPolicy::AutoProvision => {
                let profile = UserProfile {
                    username: username.to_string(),
                    subject: token.subject().unwrap_or_default().to_string(),
                    email: token.claim_str("email").map(String::from),
                    given_name: token.claim_str("given_name").map(String::from),
                    family_name: token.claim_str("family_name").map(String::from),
                };
                let user = self.services.directory.provision(&profile).await?;
                tracing::info!(username = %user.username, user_id = %user.id, "Provisioned new user");
                Ok(user)
            }
            ProvisioningPolicy::RequireExisting => {
                Err(LoginFlowError::UnknownUser(username.to_string()))
            }
        }
    }

    /// Persists tokens, syncs roles, and emits the login event.
    ///
    /// The token record is keyed by the IdP-side username so the next
    /// login's linkage lookup finds it even when the local account uses a
    /// different username.
    async fn complete_login(
        &self,
        user: LocalUser,
        username: &str,
        token: &IdToken,
        response: &TokenResponse,
        auth_state: AuthState,
    ) -> Result<LoginOutcome, LoginFlowError> {
        let expires_at = response
            .expires_in
            .map(|secs| OffsetDateTime::now_utc() + std::time::Duration::from_secs(secs));

        let update = TokenUpdate {
            user_id: Some(user.id.clone()),
            id_token: token.raw().to_string(),
            access_token: response.access_token.clone(),
            refresh_token: response.refresh_token.clone(),
            expires_at,
            scope: response.scope.clone(),
        };
        self.services
            .tokens
            .upsert_by_username(username, update)
            .await?;

        let local_roles = self.services.roles.local_roles(&user.id).await?;
        let role_diff = sync_roles(token, &local_roles, &self.config.role_claim_name);
        if !role_diff.is_empty() {
            self.services.roles.apply(&user.id, &role_diff).await?;
        }

        self.services
            .events
            .user_logged_in(&LoginEvent::now(&user.id, &user.username))
            .await;

        tracing::info!(
            username = %user.username,
            user_id = %user.id,
            assigned = role_diff.assign.len(),
            unassigned = role_diff.unassign.len(),
            "Login completed"
        );

        Ok(LoginOutcome {
            user,
            wants_url: auth_state.wants_url,
            role_diff,
        })
    }

    /// Removes the token record for a user, disconnecting them from the
    /// IdP. Subsequent logins re-resolve from scratch.
    ///
    /// # Errors
    ///
    /// Returns an error if the token store fails.
    pub async fn disconnect(&self, user_id: &str) -> Result<(), LoginFlowError> {
        if let Some(record) = self.services.tokens.find_by_user_id(user_id).await? {
            self.services
                .tokens
                .delete_by_username(&record.username)
                .await?;
            tracing::info!(user_id = %user_id, username = %record.username, "User disconnected");
        }
        Ok(())
    }

    /// Moves the token record when a local account is renamed so the IdP
    /// linkage follows.
    ///
    /// # Errors
    ///
    /// Returns an error when no record exists for `old_username` or one
    /// already exists for `new_username`.
    pub async fn handle_username_change(
        &self,
        old_username: &str,
        new_username: &str,
    ) -> Result<OidcToken, LoginFlowError> {
        let record = self
            .services
            .tokens
            .rename_username(old_username, new_username)
            .await?;
        tracing::debug!(
            old = %old_username,
            new = %new_username,
            "Token record moved to renamed account"
        );
        Ok(record)
    }
}

/// Resolves the username claim from a validated ID token.
///
/// Preference order follows the common Azure AD layout:
/// `preferred_username`, then `upn`, then the subject.
fn resolve_username(token: &IdToken) -> Result<String, TokenError> {
    token
        .claim_str("preferred_username")
        .or_else(|| token.claim_str("upn"))
        .or_else(|| token.subject())
        .map(String::from)
        .ok_or(TokenError::MissingClaim("sub"))
}

fn random_urlsafe() -> String {
    let bytes: [u8; 32] = rand::thread_rng().r#gen();
    URL_SAFE_NO_PAD.encode(bytes)
}

#[async_trait]
impl LoginFlow for AuthorizationCodeFlow {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    async fn initiate(
        &self,
        request: InitiateRequest,
    ) -> Result<AuthorizationRedirect, LoginFlowError> {
        self.config.validate()?;

        let state = random_urlsafe();
        let nonce = random_urlsafe();

        let record = AuthState::new(&state, &nonce, request.wants_url, self.config.state_ttl);
        self.services.states.create(&record).await?;

        let url = self.authorization_url(&state, &nonce, request.login_hint.as_deref())?;

        tracing::debug!(state = %state, "Login initiated");

        Ok(AuthorizationRedirect { url, state, nonce })
    }

    async fn login(&self, code: &str, state: &str) -> Result<LoginOutcome, LoginFlowError> {
        let auth_state = self
            .services
            .states
            .consume(state)
            .await?
            .ok_or(LoginFlowError::StateMismatch)?;

        let response = self.exchange_code(code).await?;
        let token = self.validate_id_token(&response.id_token, &auth_state).await?;

        let username = resolve_username(&token)?;
        if !self.config.user_restrictions.allows(&username) {
            tracing::warn!(username = %username, "Login blocked by sign-in restrictions");
            return Err(LoginFlowError::RestrictedUser(username));
        }

        let user = self.resolve_user(&username, &token).await?;

        self.complete_login(user, &username, &token, &response, auth_state)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::testing::token_with_claims;
    use serde_json::json;

    #[test]
    fn test_token_response_expires_in_forms() {
        let numeric: TokenResponse = serde_json::from_value(json!({
            "access_token": "at",
            "id_token": "it",
            "expires_in": 3600,
        }))
        .unwrap();
        assert_eq!(numeric.expires_in, Some(3600));

        let text: TokenResponse = serde_json::from_value(json!({
            "access_token": "at",
            "id_token": "it",
            "expires_in": "3600",
        }))
        .unwrap();
        assert_eq!(text.expires_in, Some(3600));

        let absent: TokenResponse = serde_json::from_value(json!({
            "access_token": "at",
            "id_token": "it",
        }))
        .unwrap();
        assert_eq!(absent.expires_in, None);
    }

    #[test]
    fn test_resolve_username_preference_order() {
        let token = IdToken::parse(&token_with_claims(&json!({
            "preferred_username": "alice@contoso.com",
            "upn": "upn-alice",
            "sub": "sub-1",
        })))
        .unwrap();
        assert_eq!(resolve_username(&token).unwrap(), "alice@contoso.com");

        let token = IdToken::parse(&token_with_claims(&json!({
            "upn": "upn-alice",
            "sub": "sub-1",
        })))
        .unwrap();
        assert_eq!(resolve_username(&token).unwrap(), "upn-alice");

        let token = IdToken::parse(&token_with_claims(&json!({"sub": "sub-1"}))).unwrap();
        assert_eq!(resolve_username(&token).unwrap(), "sub-1");

        let token = IdToken::parse(&token_with_claims(&json!({}))).unwrap();
        assert!(matches!(
            resolve_username(&token),
            Err(TokenError::MissingClaim("sub"))
        ));
    }

    #[test]
    fn test_random_urlsafe_is_unguessable_length() {
        let a = random_urlsafe();
        let b = random_urlsafe();

        // 32 bytes base64url without padding is 43 characters.
        assert_eq!(a.len(), 43);
        assert_ne!(a, b);
        assert!(!a.contains('=') && !a.contains('+') && !a.contains('/'));
    }
}
