use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use url::Url;

use crate::storage::{FileStorage, MemoryStorage, StorageArea};

use super::callback::{self, CallbackParams};
use super::navigate::{Navigator, SystemBrowserNavigator};
use super::pkce::PkceArtifacts;
use super::provider::ProviderRegistry;
use super::resolver::{StaticProfileResolver, TokenResolver};
use super::session::{AuthUser, Session, StoredProfile, StoredTokens};
use super::vault::EncryptedVault;
use super::AuthError;

/// Session-storage slot for the single in-flight artifact set.
const ARTIFACT_SLOT: &str = "valor.auth.pkce";
/// Persistent slot for encrypted token material.
const TOKEN_SLOT: &str = "valor.auth.tokens";
/// Persistent slot for the plain user profile.
const PROFILE_SLOT: &str = "valor.auth.profile";

/// Lifecycle phase of the authentication state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    Anonymous,
    Initiating,
    AwaitingCallback,
    Authenticated,
    Failed,
}

enum AuthState {
    Anonymous,
    Initiating { provider: String },
    AwaitingCallback { provider: String },
    Authenticated(Session),
    Failed(String),
}

/// Public state snapshot delivered to subscribers. Never carries tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSnapshot {
    pub phase: AuthPhase,
    pub authenticated: bool,
    pub user: Option<AuthUser>,
    pub provider: Option<String>,
    pub error: Option<String>,
}

impl AuthSnapshot {
    fn of(state: &AuthState) -> Self {
        match state {
            AuthState::Anonymous => Self {
                phase: AuthPhase::Anonymous,
                authenticated: false,
                user: None,
                provider: None,
                error: None,
            },
            AuthState::Initiating { provider } => Self {
                phase: AuthPhase::Initiating,
                authenticated: false,
                user: None,
                provider: Some(provider.clone()),
                error: None,
            },
            AuthState::AwaitingCallback { provider } => Self {
                phase: AuthPhase::AwaitingCallback,
                authenticated: false,
                user: None,
                provider: Some(provider.clone()),
                error: None,
            },
            AuthState::Authenticated(session) => Self {
                phase: AuthPhase::Authenticated,
                authenticated: true,
                user: Some(session.user.clone()),
                provider: Some(session.provider.clone()),
                error: None,
            },
            AuthState::Failed(message) => Self {
                phase: AuthPhase::Failed,
                authenticated: false,
                user: None,
                provider: None,
                error: Some(message.clone()),
            },
        }
    }
}

pub type SubscriptionId = u64;

type Listener = Box<dyn Fn(&AuthSnapshot) + Send + Sync>;

/// Owns the authentication state machine and coordinates the provider
/// registry, artifact generation, vault, and callback validation.
///
/// Instantiated once and passed by reference to consumers. The manager is the
/// sole writer of the single-slot artifact store and the current session;
/// two login attempts in the same tab collapse last-write-wins.
pub struct AuthSessionManager {
    registry: ProviderRegistry,
    session_area: Arc<dyn StorageArea>,
    persistent_area: Arc<dyn StorageArea>,
    vault: EncryptedVault,
    resolver: Arc<dyn TokenResolver>,
    navigator: Arc<dyn Navigator>,
    state: Mutex<AuthState>,
    listeners: Mutex<Vec<(SubscriptionId, Listener)>>,
    next_subscription: AtomicU64,
}

impl AuthSessionManager {
    /// Wire the orchestrator from its collaborators. The vault shares the
    /// session storage area so its key lives and dies with the browsing
    /// session.
    pub fn new(
        registry: ProviderRegistry,
        session_area: Arc<dyn StorageArea>,
        persistent_area: Arc<dyn StorageArea>,
        resolver: Arc<dyn TokenResolver>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let vault = EncryptedVault::new(session_area.clone());
        Self {
            registry,
            session_area,
            persistent_area,
            vault,
            resolver,
            navigator,
            state: Mutex::new(AuthState::Anonymous),
            listeners: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(0),
        }
    }

    /// Default native wiring: volatile session area, per-user file storage,
    /// placeholder token resolution, system-browser hand-off.
    pub fn with_defaults() -> Result<Self, AuthError> {
        Ok(Self::new(
            ProviderRegistry::with_defaults(),
            Arc::new(MemoryStorage::new()),
            Arc::new(FileStorage::in_user_data_dir()?),
            Arc::new(StaticProfileResolver::new()),
            Arc::new(SystemBrowserNavigator),
        ))
    }

    /// Begin a login attempt against the given provider.
    ///
    /// The encrypted artifact slot is persisted strictly before navigation;
    /// starting a second attempt in the same tab overwrites the first. This
    /// call does not return a completed session — control leaves the
    /// application with the redirect.
    pub fn login(&self, provider_id: &str) -> Result<(), AuthError> {
        match self.start_login(provider_id) {
            Ok(()) => Ok(()),
            Err(err) => {
                let _ = self.session_area.remove(ARTIFACT_SLOT);
                self.set_state(AuthState::Failed(err.to_string()));
                Err(err)
            }
        }
    }

    fn start_login(&self, provider_id: &str) -> Result<(), AuthError> {
        let config = self.registry.get(provider_id)?;
        self.set_state(AuthState::Initiating {
            provider: config.id.clone(),
        });

        let artifacts = PkceArtifacts::generate(config.id.as_str(), config.challenge_method);
        let blob = self.vault.encrypt(&serde_json::to_string(&artifacts)?)?;
        // The artifact slot must be durable before control leaves the
        // application; the return leg has nothing else to resume from.
        self.session_area.set(ARTIFACT_SLOT, &blob)?;

        let url = config.authorization_url(&artifacts);
        self.set_state(AuthState::AwaitingCallback {
            provider: config.id.clone(),
        });
        tracing::debug!("redirecting to {} authorization endpoint", config.id);
        self.navigator.navigate(&url)
    }

    /// Complete the return leg of the flow.
    ///
    /// The artifact slot is consumed exactly once: it is cleared whatever the
    /// outcome. On success the session is persisted (tokens encrypted,
    /// profile plain) and subscribers are notified; on failure the originating
    /// error is re-raised after the machine reaches `Failed`.
    pub async fn handle_callback(
        &self,
        provider_id: &str,
        return_url: &Url,
    ) -> Result<Session, AuthError> {
        let result = self.complete_callback(provider_id, return_url).await;
        let _ = self.session_area.remove(ARTIFACT_SLOT);
        match result {
            Ok(session) => {
                tracing::debug!("authenticated via {}", session.provider);
                self.set_state(AuthState::Authenticated(session.clone()));
                Ok(session)
            }
            Err(err) => {
                self.set_state(AuthState::Failed(err.to_string()));
                Err(err)
            }
        }
    }

    async fn complete_callback(
        &self,
        provider_id: &str,
        return_url: &Url,
    ) -> Result<Session, AuthError> {
        let config = self.registry.get(provider_id)?;
        let artifacts = self.load_artifacts()?;
        if artifacts.provider != config.id {
            tracing::warn!(
                "callback for {} but artifacts were issued for {}",
                config.id,
                artifacts.provider
            );
            return Err(AuthError::StateMismatch);
        }

        let params = CallbackParams::from_url(return_url);
        let validated = callback::validate(&params, &artifacts)?;
        let resolution = self.resolver.resolve(config, &validated).await?;

        let session = Session {
            access_token: resolution.access_token,
            id_token: resolution.id_token,
            refresh_token: resolution.refresh_token,
            expires_at: resolution.expires_at,
            provider: config.id.clone(),
            user: resolution.user,
        };
        self.persist_session(&session)?;
        Ok(session)
    }

    /// Clear all persisted authentication state and return to anonymous.
    ///
    /// Destroying the vault key permanently invalidates anything it ever
    /// encrypted.
    pub fn logout(&self) -> Result<(), AuthError> {
        self.session_area.remove(ARTIFACT_SLOT)?;
        self.persistent_area.remove(TOKEN_SLOT)?;
        self.persistent_area.remove(PROFILE_SLOT)?;
        self.vault.clear_key()?;
        self.set_state(AuthState::Anonymous);
        Ok(())
    }

    /// Attempt to restore a persisted session at startup.
    ///
    /// A still-valid session authenticates without any network round trip; an
    /// expired or unreadable one resolves to a clean logout rather than a
    /// partially restored state.
    pub fn restore_session(&self) -> Result<(), AuthError> {
        let Some(token_blob) = self.persistent_area.get(TOKEN_SLOT)? else {
            self.set_state(AuthState::Anonymous);
            return Ok(());
        };

        let tokens: StoredTokens = match self.decrypt_record(&token_blob) {
            Ok(tokens) => tokens,
            Err(err) => {
                tracing::warn!("persisted session is unreadable ({err}), clearing");
                return self.logout();
            }
        };

        let profile: StoredProfile = match self.persistent_area.get(PROFILE_SLOT)? {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(profile) => profile,
                Err(err) => {
                    tracing::warn!("persisted profile is unreadable ({err}), clearing");
                    return self.logout();
                }
            },
            None => return self.logout(),
        };

        let session = Session::from_records(tokens, profile);
        if session.is_expired() {
            tracing::debug!("persisted session already expired, clearing");
            return self.logout();
        }

        self.set_state(AuthState::Authenticated(session));
        Ok(())
    }

    /// Current session, if still valid.
    ///
    /// Detecting an expired session clears all storage and drops back to
    /// anonymous; expiry is routine and never surfaced as an error.
    pub fn current_session(&self) -> Option<Session> {
        {
            let state = self.state.lock().unwrap();
            match &*state {
                AuthState::Authenticated(session) if !session.is_expired() => {
                    return Some(session.clone());
                }
                AuthState::Authenticated(_) => {}
                _ => return None,
            }
        }
        tracing::debug!("session expired, returning to anonymous");
        if let Err(err) = self.logout() {
            tracing::warn!("cleanup after session expiry failed: {err}");
        }
        None
    }

    pub fn is_authenticated(&self) -> bool {
        self.current_session().is_some()
    }

    /// Public state of the machine, safe to hand to presentation code.
    pub fn snapshot(&self) -> AuthSnapshot {
        AuthSnapshot::of(&self.state.lock().unwrap())
    }

    /// Register an observer invoked with a fresh snapshot on every state
    /// transition.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&AuthSnapshot) + Send + Sync + 'static,
    {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().unwrap().push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.listeners
            .lock()
            .unwrap()
            .retain(|(existing, _)| *existing != id);
    }

    fn load_artifacts(&self) -> Result<PkceArtifacts, AuthError> {
        let blob = self
            .session_area
            .get(ARTIFACT_SLOT)?
            .ok_or(AuthError::MissingArtifacts)?;
        let payload = self.vault.decrypt(&blob).map_err(|err| {
            tracing::warn!("stored artifacts are unreadable: {err}");
            AuthError::MissingArtifacts
        })?;
        let artifacts: PkceArtifacts =
            serde_json::from_str(&payload).map_err(|_| AuthError::MissingArtifacts)?;
        if artifacts.is_stale() {
            tracing::warn!("stored artifacts exceeded the freshness window");
            return Err(AuthError::MissingArtifacts);
        }
        Ok(artifacts)
    }

    fn persist_session(&self, session: &Session) -> Result<(), AuthError> {
        let (tokens, profile) = session.to_records();
        let blob = self.vault.encrypt(&serde_json::to_string(&tokens)?)?;
        self.persistent_area.set(TOKEN_SLOT, &blob)?;
        self.persistent_area
            .set(PROFILE_SLOT, &serde_json::to_string(&profile)?)?;
        Ok(())
    }

    fn decrypt_record<T: serde::de::DeserializeOwned>(&self, blob: &str) -> Result<T, AuthError> {
        let payload = self.vault.decrypt(blob)?;
        Ok(serde_json::from_str(&payload)?)
    }

    fn set_state(&self, next: AuthState) {
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            *state = next;
            AuthSnapshot::of(&state)
        };
        let listeners = self.listeners.lock().unwrap();
        for (_, listener) in listeners.iter() {
            listener(&snapshot);
        }
    }
}
