mod callback;
mod error;
mod navigate;
mod orchestrator;
mod pkce;
mod provider;
mod resolver;
mod session;
mod vault;

pub use callback::{validate, CallbackParams, ValidatedCode};
pub use error::AuthError;
pub use navigate::{Navigator, SystemBrowserNavigator};
pub use orchestrator::{AuthPhase, AuthSessionManager, AuthSnapshot, SubscriptionId};
pub use pkce::{derive_challenge, PkceArtifacts};
pub use provider::{
    google_config, idme_config, ChallengeMethod, ProviderConfig, ProviderExtras, ProviderRegistry,
    ResponseMode,
};
pub use resolver::{BrokerTokenResolver, Resolution, StaticProfileResolver, TokenResolver};
pub use session::{AuthUser, Session};
pub use vault::EncryptedVault;
