//! End-to-end authorization code flow tests over the in-memory backends,
//! with a mock token endpoint.
//!
//! Tokens are unsigned (no verifier is wired in), which exercises the
//! structural validation path: audience, expiry, and nonce checks.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lychgate_oidc::config::{LoginFlowConfig, ProvisioningPolicy, UserRestrictions};
use lychgate_oidc::jwt::TokenError;
use lychgate_oidc::loginflow::{
    AuthorizationCodeFlow, FlowServices, InitiateRequest, LoginFlow, LoginFlowError,
};
use lychgate_oidc::storage::{LocalUser, StoreError, TokenStorage, UserDirectory};
use lychgate_store_memory::{
    MemoryRoleAssignments, MemoryStateStorage, MemoryTokenStorage, MemoryUserDirectory,
    RecordingEventSink,
};

const CLIENT_ID: &str = "client-123";

fn unsigned_token(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&json!({"alg": "none"})).unwrap());
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap());
    format!("{header}.{payload}.c2ln")
}

fn future_exp() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp() + 3600
}

struct Harness {
    server: MockServer,
    tokens: Arc<MemoryTokenStorage>,
    directory: Arc<MemoryUserDirectory>,
    roles: Arc<MemoryRoleAssignments>,
    events: Arc<RecordingEventSink>,
    flow: AuthorizationCodeFlow,
}

impl Harness {
    async fn new(configure: impl FnOnce(LoginFlowConfig) -> LoginFlowConfig) -> Self {
        let server = MockServer::start().await;

        let config = LoginFlowConfig::new(
            CLIENT_ID,
            Url::parse("https://app.example.com/auth/callback").unwrap(),
        )
        .with_client_secret("shhh")
        .with_token_endpoint(Url::parse(&format!("{}/token", server.uri())).unwrap());
        let config = Arc::new(configure(config));

        let tokens = Arc::new(MemoryTokenStorage::new());
        let states = Arc::new(MemoryStateStorage::new());
        let directory = Arc::new(MemoryUserDirectory::new());
        let roles = Arc::new(MemoryRoleAssignments::new(vec!["Teacher", "Student"]));
        let events = Arc::new(RecordingEventSink::new());

        let services = FlowServices {
            tokens: tokens.clone(),
            states: states.clone(),
            directory: directory.clone(),
            roles: roles.clone(),
            events: events.clone(),
            verifier: None,
        };
        let flow = AuthorizationCodeFlow::new(config, services);

        Self {
            server,
            tokens,
            directory,
            roles,
            events,
            flow,
        }
    }

    /// Mounts a successful token response carrying the given ID token.
    async fn mount_token_response(&self, id_token: &str) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "access-xyz",
                "token_type": "Bearer",
                "expires_in": 3600,
                "refresh_token": "refresh-xyz",
                "id_token": id_token,
                "scope": "openid profile email",
            })))
            .mount(&self.server)
            .await;
    }

    fn token_claims(&self, nonce: &str, username: &str, groups: &[&str]) -> serde_json::Value {
        json!({
            "iss": "https://idp.example.com",
            "sub": "sub-1",
            "aud": CLIENT_ID,
            "exp": future_exp(),
            "nonce": nonce,
            "preferred_username": username,
            "group": groups,
        })
    }
}

#[tokio::test]
async fn full_login_links_user_and_syncs_roles() {
    let harness = Harness::new(|c| c).await;
    harness
        .directory
        .insert(LocalUser::new("u1", "alice@contoso.com"))
        .await;

    let redirect = harness
        .flow
        .initiate(InitiateRequest {
            wants_url: Some("/course/view?id=2".to_string()),
            login_hint: None,
        })
        .await
        .unwrap();

    // The redirect carries everything the IdP needs.
    let query: Vec<(String, String)> = redirect
        .url
        .query_pairs()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    assert!(query.contains(&("client_id".to_string(), CLIENT_ID.to_string())));
    assert!(query.contains(&("response_type".to_string(), "code".to_string())));
    assert!(query.contains(&("state".to_string(), redirect.state.clone())));
    assert!(query.contains(&("nonce".to_string(), redirect.nonce.clone())));

    let id_token = unsigned_token(&harness.token_claims(
        &redirect.nonce,
        "alice@contoso.com",
        &["Teacher"],
    ));
    harness.mount_token_response(&id_token).await;

    let outcome = harness.flow.login("code-abc", &redirect.state).await.unwrap();

    assert_eq!(outcome.user.id, "u1");
    assert_eq!(outcome.wants_url, Some("/course/view?id=2".to_string()));
    assert_eq!(outcome.role_diff.assign, vec!["Teacher"]);

    let record = harness
        .tokens
        .find_by_username("alice@contoso.com")
        .await
        .unwrap()
        .expect("token record stored");
    assert_eq!(record.user_id, Some("u1".to_string()));
    assert_eq!(record.access_token, "access-xyz");
    assert_eq!(record.id_token, id_token);

    assert_eq!(harness.roles.assigned_roles("u1").await, vec!["Teacher"]);

    let events = harness.events.events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].username, "alice@contoso.com");
}

#[tokio::test]
async fn second_login_drops_roles_no_longer_claimed() {
    let harness = Harness::new(|c| c).await;
    harness
        .directory
        .insert(LocalUser::new("u1", "alice@contoso.com"))
        .await;

    let redirect = harness.flow.initiate(InitiateRequest::default()).await.unwrap();
    let id_token = unsigned_token(&harness.token_claims(
        &redirect.nonce,
        "alice@contoso.com",
        &["Teacher"],
    ));
    harness.mount_token_response(&id_token).await;
    harness.flow.login("code-1", &redirect.state).await.unwrap();
    assert_eq!(harness.roles.assigned_roles("u1").await, vec!["Teacher"]);

    harness.server.reset().await;
    let redirect = harness.flow.initiate(InitiateRequest::default()).await.unwrap();
    let id_token = unsigned_token(&harness.token_claims(
        &redirect.nonce,
        "alice@contoso.com",
        &["Student"],
    ));
    harness.mount_token_response(&id_token).await;
    let outcome = harness.flow.login("code-2", &redirect.state).await.unwrap();

    assert_eq!(outcome.role_diff.assign, vec!["Student"]);
    assert_eq!(outcome.role_diff.unassign, vec!["Teacher"]);
    assert_eq!(harness.roles.assigned_roles("u1").await, vec!["Student"]);
}

#[tokio::test]
async fn replayed_state_is_rejected() {
    let harness = Harness::new(|c| c).await;
    harness
        .directory
        .insert(LocalUser::new("u1", "alice@contoso.com"))
        .await;

    let redirect = harness.flow.initiate(InitiateRequest::default()).await.unwrap();
    let id_token = unsigned_token(&harness.token_claims(
        &redirect.nonce,
        "alice@contoso.com",
        &["Teacher"],
    ));
    harness.mount_token_response(&id_token).await;

    harness.flow.login("code-abc", &redirect.state).await.unwrap();

    let err = harness.flow.login("code-abc", &redirect.state).await.unwrap_err();
    assert!(matches!(err, LoginFlowError::StateMismatch), "{err}");
}

#[tokio::test]
async fn unknown_state_is_rejected_before_any_exchange() {
    let harness = Harness::new(|c| c).await;

    // No token endpoint mock is mounted; reaching it would 404 and fail
    // differently.
    let err = harness.flow.login("code-abc", "never-issued").await.unwrap_err();
    assert!(matches!(err, LoginFlowError::StateMismatch), "{err}");
}

#[tokio::test]
async fn nonce_mismatch_is_rejected() {
    let harness = Harness::new(|c| c).await;

    let redirect = harness.flow.initiate(InitiateRequest::default()).await.unwrap();
    let id_token =
        unsigned_token(&harness.token_claims("other-nonce", "alice@contoso.com", &["Teacher"]));
    harness.mount_token_response(&id_token).await;

    let err = harness.flow.login("code-abc", &redirect.state).await.unwrap_err();
    assert!(
        matches!(err, LoginFlowError::Token(TokenError::NonceMismatch)),
        "{err}"
    );
}

#[tokio::test]
async fn oauth_error_body_is_surfaced() {
    let harness = Harness::new(|c| c).await;
    let redirect = harness.flow.initiate(InitiateRequest::default()).await.unwrap();

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "the code has expired",
        })))
        .mount(&harness.server)
        .await;

    let err = harness.flow.login("code-abc", &redirect.state).await.unwrap_err();
    match err {
        LoginFlowError::OAuth { error, description } => {
            assert_eq!(error, "invalid_grant");
            assert_eq!(description.as_deref(), Some("the code has expired"));
        }
        other => panic!("expected an OAuth error, got {other}"),
    }
}

#[tokio::test]
async fn restricted_username_is_blocked_after_validation() {
    let harness = Harness::new(|c| {
        c.with_user_restrictions(UserRestrictions::new(vec![r".*@contoso\.com$"]))
    })
    .await;

    let redirect = harness.flow.initiate(InitiateRequest::default()).await.unwrap();
    let id_token =
        unsigned_token(&harness.token_claims(&redirect.nonce, "mallory@evil.example", &[]));
    harness.mount_token_response(&id_token).await;

    let err = harness.flow.login("code-abc", &redirect.state).await.unwrap_err();
    assert!(matches!(err, LoginFlowError::RestrictedUser(_)), "{err}");
    assert!(harness.tokens.is_empty().await);
    assert!(harness.events.is_empty().await);
}

#[tokio::test]
async fn unknown_user_is_rejected_when_provisioning_requires_existing() {
    let harness = Harness::new(|c| c).await;

    let redirect = harness.flow.initiate(InitiateRequest::default()).await.unwrap();
    let id_token = unsigned_token(&harness.token_claims(
        &redirect.nonce,
        "newcomer@contoso.com",
        &["Teacher"],
    ));
    harness.mount_token_response(&id_token).await;

    let err = harness.flow.login("code-abc", &redirect.state).await.unwrap_err();
    assert!(matches!(err, LoginFlowError::UnknownUser(_)), "{err}");

    // A failed login leaves no trace.
    assert!(harness.tokens.is_empty().await);
    assert!(harness.events.is_empty().await);
}

#[tokio::test]
async fn auto_provision_creates_the_account() {
    let harness =
        Harness::new(|c| c.with_provisioning(ProvisioningPolicy::AutoProvision)).await;

    let redirect = harness.flow.initiate(InitiateRequest::default()).await.unwrap();
    let mut claims = harness.token_claims(&redirect.nonce, "newcomer@contoso.com", &["Student"]);
    claims["email"] = json!("newcomer@contoso.com");
    harness.mount_token_response(&unsigned_token(&claims)).await;

    let outcome = harness.flow.login("code-abc", &redirect.state).await.unwrap();

    assert_eq!(outcome.user.username, "newcomer@contoso.com");
    assert_eq!(outcome.user.email, Some("newcomer@contoso.com".to_string()));

    let provisioned = harness
        .directory
        .find_by_username("newcomer@contoso.com")
        .await
        .unwrap();
    assert!(provisioned.is_some());

    let record = harness
        .tokens
        .find_by_user_id(&outcome.user.id)
        .await
        .unwrap();
    assert!(record.is_some());
}

#[tokio::test]
async fn expired_id_token_is_rejected() {
    let harness = Harness::new(|c| c).await;

    let redirect = harness.flow.initiate(InitiateRequest::default()).await.unwrap();
    let mut claims = harness.token_claims(&redirect.nonce, "alice@contoso.com", &[]);
    claims["exp"] = json!(time::OffsetDateTime::now_utc().unix_timestamp() - 7200);
    harness.mount_token_response(&unsigned_token(&claims)).await;

    let err = harness.flow.login("code-abc", &redirect.state).await.unwrap_err();
    assert!(
        matches!(err, LoginFlowError::Token(TokenError::Expired)),
        "{err}"
    );
}

#[tokio::test]
async fn disconnect_removes_the_token_record() {
    let harness = Harness::new(|c| c).await;
    harness
        .directory
        .insert(LocalUser::new("u1", "alice@contoso.com"))
        .await;

    let redirect = harness.flow.initiate(InitiateRequest::default()).await.unwrap();
    let id_token =
        unsigned_token(&harness.token_claims(&redirect.nonce, "alice@contoso.com", &["Teacher"]));
    harness.mount_token_response(&id_token).await;
    harness.flow.login("code-abc", &redirect.state).await.unwrap();

    harness.flow.disconnect("u1").await.unwrap();
    assert!(harness.tokens.is_empty().await);

    // Disconnecting an already-disconnected user is a no-op.
    harness.flow.disconnect("u1").await.unwrap();
}

#[tokio::test]
async fn username_change_moves_the_token_record() {
    let harness = Harness::new(|c| c).await;
    harness
        .directory
        .insert(LocalUser::new("u1", "alice@contoso.com"))
        .await;

    let redirect = harness.flow.initiate(InitiateRequest::default()).await.unwrap();
    let id_token =
        unsigned_token(&harness.token_claims(&redirect.nonce, "alice@contoso.com", &["Teacher"]));
    harness.mount_token_response(&id_token).await;
    harness.flow.login("code-abc", &redirect.state).await.unwrap();

    let record = harness
        .flow
        .handle_username_change("alice@contoso.com", "alice.smith@contoso.com")
        .await
        .unwrap();
    assert_eq!(record.username, "alice.smith@contoso.com");
    assert_eq!(record.user_id, Some("u1".to_string()));

    let err = harness
        .flow
        .handle_username_change("alice@contoso.com", "whatever")
        .await
        .unwrap_err();
    assert!(
        matches!(err, LoginFlowError::Store(StoreError::NotFound(_))),
        "{err}"
    );
}

#[tokio::test]
async fn login_hint_is_forwarded_with_auto_append() {
    let harness = Harness::new(|c| c.with_auto_append("@contoso.com")).await;

    let redirect = harness
        .flow
        .initiate(InitiateRequest {
            wants_url: None,
            login_hint: Some("alice".to_string()),
        })
        .await
        .unwrap();

    let hint = redirect
        .url
        .query_pairs()
        .find(|(k, _)| k == "login_hint")
        .map(|(_, v)| v.to_string());
    assert_eq!(hint.as_deref(), Some("alice@contoso.com"));
}
