use std::collections::HashMap;
use std::env;

use url::Url;

use super::pkce::PkceArtifacts;
use super::AuthError;

const IDME_CLIENT_ID_ENV: &str = "VALOR_IDME_CLIENT_ID";
const GOOGLE_CLIENT_ID_ENV: &str = "VALOR_GOOGLE_CLIENT_ID";

const DEFAULT_REDIRECT_URI: &str = "https://app.valorbenefits.example/auth/callback";

/// Hash method applied to the PKCE code verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeMethod {
    S256,
    Plain,
}

impl ChallengeMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeMethod::S256 => "S256",
            ChallengeMethod::Plain => "plain",
        }
    }
}

/// Where a provider delivers its callback parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    Query,
    Fragment,
}

impl ResponseMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseMode::Query => "query",
            ResponseMode::Fragment => "fragment",
        }
    }
}

/// Authorization parameters specific to one provider.
///
/// Each variant carries only the fields that provider actually uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderExtras {
    None,
    /// Google: always show the account chooser.
    Google { prompt: String },
    /// ID.me: minimum assurance level and the verification group to attest.
    IdMe {
        acr_values: String,
        verification_group: String,
    },
}

/// Static description of one identity provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub id: String,
    pub display_name: String,
    pub client_id: String,
    pub redirect_uri: Url,
    pub scope: String,
    pub response_type: String,
    pub response_mode: ResponseMode,
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
    pub userinfo_endpoint: Url,
    pub pkce_required: bool,
    pub challenge_method: ChallengeMethod,
    pub extras: ProviderExtras,
}

impl ProviderConfig {
    /// Build the authorization request URL for a freshly issued artifact set.
    pub fn authorization_url(&self, artifacts: &PkceArtifacts) -> Url {
        let mut url = self.authorization_endpoint.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("client_id", &self.client_id);
            pairs.append_pair("redirect_uri", self.redirect_uri.as_str());
            pairs.append_pair("response_type", &self.response_type);
            pairs.append_pair("scope", &self.scope);
            pairs.append_pair("state", &artifacts.state);
            pairs.append_pair("nonce", &artifacts.nonce);
            pairs.append_pair("code_challenge", &artifacts.code_challenge);
            pairs.append_pair("code_challenge_method", self.challenge_method.as_str());
            if self.response_mode == ResponseMode::Fragment {
                pairs.append_pair("response_mode", self.response_mode.as_str());
            }
            match &self.extras {
                ProviderExtras::None => {}
                ProviderExtras::Google { prompt } => {
                    pairs.append_pair("prompt", prompt);
                }
                ProviderExtras::IdMe { acr_values, .. } => {
                    pairs.append_pair("acr_values", acr_values);
                }
            }
        }
        url
    }
}

/// Read-only lookup of the enabled identity providers.
///
/// Disabling a provider removes it from the registry entirely; lookups for it
/// fail as [`AuthError::UnknownProvider`] rather than a soft unavailable
/// state.
pub struct ProviderRegistry {
    providers: HashMap<String, ProviderConfig>,
}

impl ProviderRegistry {
    pub fn new<I>(providers: I) -> Self
    where
        I: IntoIterator<Item = ProviderConfig>,
    {
        Self {
            providers: providers
                .into_iter()
                .map(|config| (config.id.clone(), config))
                .collect(),
        }
    }

    /// Assemble the default registry from the static provider definitions
    /// plus environment-supplied client identifiers.
    pub fn with_defaults() -> Self {
        Self::new([idme_config(), google_config()])
    }

    pub fn get(&self, provider_id: &str) -> Result<&ProviderConfig, AuthError> {
        self.providers
            .get(provider_id)
            .ok_or_else(|| AuthError::UnknownProvider(provider_id.to_owned()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }
}

/// ID.me: the veteran-verification provider.
pub fn idme_config() -> ProviderConfig {
    ProviderConfig {
        id: "idme".to_owned(),
        display_name: "ID.me".to_owned(),
        client_id: client_id_from_env(IDME_CLIENT_ID_ENV, "valor-idme-public"),
        redirect_uri: Url::parse(DEFAULT_REDIRECT_URI).unwrap(),
        scope: "openid military".to_owned(),
        response_type: "code".to_owned(),
        response_mode: ResponseMode::Query,
        authorization_endpoint: Url::parse("https://api.id.me/oauth/authorize").unwrap(),
        token_endpoint: Url::parse("https://api.id.me/oauth/token").unwrap(),
        userinfo_endpoint: Url::parse("https://api.id.me/api/public/v3/attributes.json").unwrap(),
        pkce_required: true,
        challenge_method: ChallengeMethod::S256,
        extras: ProviderExtras::IdMe {
            acr_values: "http://idmanagement.gov/ns/assurance/loa/3".to_owned(),
            verification_group: "military".to_owned(),
        },
    }
}

/// Google: plain sign-in, no veteran verification.
pub fn google_config() -> ProviderConfig {
    ProviderConfig {
        id: "google".to_owned(),
        display_name: "Google".to_owned(),
        client_id: client_id_from_env(GOOGLE_CLIENT_ID_ENV, "valor-google-public"),
        redirect_uri: Url::parse(DEFAULT_REDIRECT_URI).unwrap(),
        scope: "openid email profile".to_owned(),
        response_type: "code".to_owned(),
        response_mode: ResponseMode::Query,
        authorization_endpoint: Url::parse("https://accounts.google.com/o/oauth2/v2/auth").unwrap(),
        token_endpoint: Url::parse("https://oauth2.googleapis.com/token").unwrap(),
        userinfo_endpoint: Url::parse("https://openidconnect.googleapis.com/v1/userinfo").unwrap(),
        pkce_required: true,
        challenge_method: ChallengeMethod::S256,
        extras: ProviderExtras::Google {
            prompt: "select_account".to_owned(),
        },
    }
}

fn client_id_from_env(var: &str, fallback: &str) -> String {
    env::var(var)
        .ok()
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| fallback.to_owned())
}
