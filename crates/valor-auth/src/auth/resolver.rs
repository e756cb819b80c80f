use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use url::Url;

use super::callback::ValidatedCode;
use super::pkce;
use super::provider::{ProviderConfig, ProviderExtras};
use super::session::AuthUser;
use super::AuthError;

const DEFAULT_USER_AGENT: &str = "valor-auth/0.1.0";

/// Token material and identity produced by resolving an authorization code.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub access_token: String,
    pub id_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub user: AuthUser,
}

/// Turns a validated authorization code into token material.
///
/// A public client cannot perform the confidential code-for-token exchange
/// itself without shipping a client secret, so the exchange step is
/// injectable: deployments without backend infrastructure run
/// [`StaticProfileResolver`], deployments with a trusted broker run
/// [`BrokerTokenResolver`].
#[async_trait]
pub trait TokenResolver: Send + Sync {
    async fn resolve(
        &self,
        config: &ProviderConfig,
        validated: &ValidatedCode,
    ) -> Result<Resolution, AuthError>;
}

/// Stand-in resolver that mints a fixed per-provider profile instead of
/// exchanging the code.
pub struct StaticProfileResolver {
    session_ttl: Duration,
}

impl StaticProfileResolver {
    pub fn new() -> Self {
        Self {
            session_ttl: Duration::hours(1),
        }
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }
}

impl Default for StaticProfileResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenResolver for StaticProfileResolver {
    async fn resolve(
        &self,
        config: &ProviderConfig,
        _validated: &ValidatedCode,
    ) -> Result<Resolution, AuthError> {
        let now = Utc::now();
        let user = match &config.extras {
            ProviderExtras::IdMe { acr_values, .. } => AuthUser {
                subject: format!("{}|demo-veteran", config.id),
                email: "veteran@example.com".into(),
                given_name: "Jordan".into(),
                family_name: "Reyes".into(),
                avatar_url: None,
                veteran_verified: true,
                verified_by: Some(config.id.clone()),
                assurance: Some(acr_values.clone()),
                created_at: now,
                last_login: now,
            },
            _ => AuthUser {
                subject: format!("{}|demo-user", config.id),
                email: "member@example.com".into(),
                given_name: "Alex".into(),
                family_name: "Morgan".into(),
                avatar_url: None,
                veteran_verified: false,
                verified_by: None,
                assurance: None,
                created_at: now,
                last_login: now,
            },
        };
        Ok(Resolution {
            access_token: pkce::random_urlsafe(32),
            id_token: None,
            refresh_token: None,
            expires_at: now + self.session_ttl,
            user,
        })
    }
}

/// Broker-mediated resolver: posts the code and verifier to a trusted backend
/// that holds the client secret and performs the real exchange.
pub struct BrokerTokenResolver {
    http: reqwest::Client,
    exchange_url: Url,
}

impl BrokerTokenResolver {
    pub fn new(exchange_url: Url) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .build()?;
        Ok(Self { http, exchange_url })
    }
}

#[async_trait]
impl TokenResolver for BrokerTokenResolver {
    async fn resolve(
        &self,
        config: &ProviderConfig,
        validated: &ValidatedCode,
    ) -> Result<Resolution, AuthError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("provider", config.id.as_str()),
            ("code", validated.code.as_str()),
            ("code_verifier", validated.code_verifier.as_str()),
            ("nonce", validated.nonce.as_str()),
            ("client_id", config.client_id.as_str()),
            ("redirect_uri", config.redirect_uri.as_str()),
        ];

        let response = self
            .http
            .post(self.exchange_url.clone())
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let received_at = Utc::now();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "".into());
            return Err(AuthError::Broker { status, body });
        }

        let payload: BrokerResponse = response.json().await?;
        Ok(payload.into_resolution(&config.id, received_at))
    }
}

#[derive(Debug, Deserialize)]
struct BrokerResponse {
    access_token: String,
    id_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: i64,
    user: BrokerUser,
}

#[derive(Debug, Deserialize)]
struct BrokerUser {
    sub: String,
    email: String,
    given_name: String,
    family_name: String,
    picture: Option<String>,
    #[serde(default)]
    veteran_verified: bool,
    assurance: Option<String>,
}

impl BrokerResponse {
    fn into_resolution(self, provider: &str, received_at: DateTime<Utc>) -> Resolution {
        let verified_by = self
            .user
            .veteran_verified
            .then(|| provider.to_owned());
        Resolution {
            access_token: self.access_token,
            id_token: self.id_token,
            refresh_token: self.refresh_token,
            expires_at: received_at + Duration::seconds(self.expires_in),
            user: AuthUser {
                subject: self.user.sub,
                email: self.user.email,
                given_name: self.user.given_name,
                family_name: self.user.family_name,
                avatar_url: self.user.picture,
                veteran_verified: self.user.veteran_verified,
                verified_by,
                assurance: self.user.assurance,
                created_at: received_at,
                last_login: received_at,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::provider::{google_config, idme_config};
    use httpmock::prelude::*;

    fn validated() -> ValidatedCode {
        ValidatedCode {
            code: "abc123".into(),
            code_verifier: "verifier".into(),
            nonce: "nonce".into(),
        }
    }

    #[tokio::test]
    async fn static_resolver_verifies_idme_users() {
        let resolver = StaticProfileResolver::new();
        let resolution = resolver.resolve(&idme_config(), &validated()).await.unwrap();
        assert!(resolution.user.veteran_verified);
        assert_eq!(resolution.user.verified_by.as_deref(), Some("idme"));
        assert!(resolution.user.assurance.unwrap().contains("loa/3"));
        assert!(resolution.expires_at > Utc::now());
    }

    #[tokio::test]
    async fn static_resolver_leaves_google_users_unverified() {
        let resolver = StaticProfileResolver::new();
        let resolution = resolver
            .resolve(&google_config(), &validated())
            .await
            .unwrap();
        assert!(!resolution.user.veteran_verified);
        assert!(resolution.user.verified_by.is_none());
    }

    #[tokio::test]
    async fn static_resolver_mints_fresh_tokens() {
        let resolver = StaticProfileResolver::new();
        let first = resolver.resolve(&idme_config(), &validated()).await.unwrap();
        let second = resolver.resolve(&idme_config(), &validated()).await.unwrap();
        assert_ne!(first.access_token, second.access_token);
    }

    #[tokio::test]
    async fn broker_exchange_success() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/exchange")
                .header("content-type", "application/x-www-form-urlencoded")
                .body_contains("grant_type=authorization_code")
                .body_contains("code=abc123")
                .body_contains("code_verifier=verifier")
                .body_contains("provider=idme");
            then.status(200).json_body_obj(&serde_json::json!({
                "access_token": "broker-access",
                "id_token": "broker-id",
                "refresh_token": "broker-refresh",
                "expires_in": 3600,
                "user": {
                    "sub": "idme|8c6c",
                    "email": "vet@example.com",
                    "given_name": "Sam",
                    "family_name": "Ortiz",
                    "picture": "https://cdn.example.com/avatar.png",
                    "veteran_verified": true,
                    "assurance": "http://idmanagement.gov/ns/assurance/loa/3"
                }
            }));
        });

        let resolver =
            BrokerTokenResolver::new(Url::parse(&format!("{}/exchange", server.base_url())).unwrap())
                .unwrap();
        let resolution = resolver.resolve(&idme_config(), &validated()).await.unwrap();
        mock.assert();
        assert_eq!(resolution.access_token, "broker-access");
        assert_eq!(resolution.id_token.as_deref(), Some("broker-id"));
        assert_eq!(resolution.refresh_token.as_deref(), Some("broker-refresh"));
        assert!(resolution.user.veteran_verified);
        assert_eq!(resolution.user.verified_by.as_deref(), Some("idme"));
        assert!(resolution.expires_at > Utc::now());
    }

    #[tokio::test]
    async fn broker_failure_surfaces_status_and_body() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/exchange");
            then.status(400).body("invalid_grant");
        });

        let resolver =
            BrokerTokenResolver::new(Url::parse(&format!("{}/exchange", server.base_url())).unwrap())
                .unwrap();
        let err = resolver
            .resolve(&idme_config(), &validated())
            .await
            .unwrap_err();
        mock.assert();
        match err {
            AuthError::Broker { status, body } => {
                assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);
                assert_eq!(body, "invalid_grant");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn broker_unverified_user_has_no_verification_source() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/exchange");
            then.status(200).json_body_obj(&serde_json::json!({
                "access_token": "a",
                "expires_in": 600,
                "user": {
                    "sub": "google|123",
                    "email": "user@example.com",
                    "given_name": "Alex",
                    "family_name": "Morgan"
                }
            }));
        });

        let resolver =
            BrokerTokenResolver::new(Url::parse(&format!("{}/exchange", server.base_url())).unwrap())
                .unwrap();
        let resolution = resolver
            .resolve(&google_config(), &validated())
            .await
            .unwrap();
        assert!(!resolution.user.veteran_verified);
        assert!(resolution.user.verified_by.is_none());
        assert!(resolution.id_token.is_none());
    }
}
