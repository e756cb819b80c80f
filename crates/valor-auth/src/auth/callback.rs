use url::Url;

use super::pkce::PkceArtifacts;
use super::AuthError;

/// Parameters extracted from a provider redirect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Extract callback parameters from a return URL.
    ///
    /// Providers deliver parameters in the query string or the URL fragment
    /// depending on their response mode; both are read and merged, with query
    /// values winning on conflict.
    pub fn from_url(url: &Url) -> Self {
        let mut params = Self::default();
        if let Some(fragment) = url.fragment() {
            for (key, value) in url::form_urlencoded::parse(fragment.as_bytes()) {
                params.assign(&key, value.into_owned());
            }
        }
        for (key, value) in url.query_pairs() {
            params.assign(&key, value.into_owned());
        }
        params
    }

    fn assign(&mut self, key: &str, value: String) {
        match key {
            "code" => self.code = Some(value),
            "state" => self.state = Some(value),
            "error" => self.error = Some(value),
            "error_description" => self.error_description = Some(value),
            _ => {}
        }
    }
}

/// Authorization code cleared for exchange, paired with its PKCE material.
#[derive(Debug, Clone)]
pub struct ValidatedCode {
    pub code: String,
    pub code_verifier: String,
    pub nonce: String,
}

/// Check a provider redirect against the artifacts issued at login.
///
/// A provider-reported error wins over everything else, since it implies no
/// valid code exists. A state mismatch is a suspected CSRF attempt and is
/// never retried.
pub fn validate(
    params: &CallbackParams,
    artifacts: &PkceArtifacts,
) -> Result<ValidatedCode, AuthError> {
    if let Some(code) = &params.error {
        return Err(AuthError::Provider {
            code: code.clone(),
            description: params.error_description.clone(),
        });
    }

    let code = params.code.as_ref().ok_or(AuthError::MissingCode)?;

    if params.state.as_deref() != Some(artifacts.state.as_str()) {
        tracing::warn!(
            "state mismatch on {} callback, rejecting as suspected CSRF",
            artifacts.provider
        );
        return Err(AuthError::StateMismatch);
    }

    Ok(ValidatedCode {
        code: code.clone(),
        code_verifier: artifacts.code_verifier.clone(),
        nonce: artifacts.nonce.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::provider::ChallengeMethod;

    fn artifacts() -> PkceArtifacts {
        PkceArtifacts::generate("idme", ChallengeMethod::S256)
    }

    fn callback_url(query: &str) -> Url {
        Url::parse(&format!(
            "https://app.valorbenefits.example/auth/callback?{query}"
        ))
        .unwrap()
    }

    #[test]
    fn parses_query_parameters() {
        let url = callback_url("code=abc123&state=xyz");
        let params = CallbackParams::from_url(&url);
        assert_eq!(params.code.as_deref(), Some("abc123"));
        assert_eq!(params.state.as_deref(), Some("xyz"));
        assert!(params.error.is_none());
    }

    #[test]
    fn parses_fragment_parameters() {
        let url =
            Url::parse("https://app.valorbenefits.example/auth/callback#code=abc&state=xyz")
                .unwrap();
        let params = CallbackParams::from_url(&url);
        assert_eq!(params.code.as_deref(), Some("abc"));
        assert_eq!(params.state.as_deref(), Some("xyz"));
    }

    #[test]
    fn query_wins_over_fragment_on_conflict() {
        let url = Url::parse(
            "https://app.valorbenefits.example/auth/callback?code=from-query#code=from-fragment",
        )
        .unwrap();
        let params = CallbackParams::from_url(&url);
        assert_eq!(params.code.as_deref(), Some("from-query"));
    }

    #[test]
    fn unknown_parameters_are_ignored() {
        let url = callback_url("code=abc&state=s&session_state=noise");
        let params = CallbackParams::from_url(&url);
        assert_eq!(params.code.as_deref(), Some("abc"));
    }

    #[test]
    fn valid_callback_returns_code_and_verifier() {
        let artifacts = artifacts();
        let url = callback_url(&format!("code=abc123&state={}", artifacts.state));
        let validated = validate(&CallbackParams::from_url(&url), &artifacts).unwrap();
        assert_eq!(validated.code, "abc123");
        assert_eq!(validated.code_verifier, artifacts.code_verifier);
        assert_eq!(validated.nonce, artifacts.nonce);
    }

    #[test]
    fn state_mismatch_rejected_despite_valid_code() {
        let artifacts = artifacts();
        let url = callback_url("code=abc123&state=forged");
        let err = validate(&CallbackParams::from_url(&url), &artifacts).unwrap_err();
        assert!(matches!(err, AuthError::StateMismatch));
    }

    #[test]
    fn missing_state_is_a_mismatch() {
        let artifacts = artifacts();
        let url = callback_url("code=abc123");
        let err = validate(&CallbackParams::from_url(&url), &artifacts).unwrap_err();
        assert!(matches!(err, AuthError::StateMismatch));
    }

    #[test]
    fn missing_code_rejected() {
        let artifacts = artifacts();
        let url = callback_url(&format!("state={}", artifacts.state));
        let err = validate(&CallbackParams::from_url(&url), &artifacts).unwrap_err();
        assert!(matches!(err, AuthError::MissingCode));
    }

    #[test]
    fn provider_error_wins_over_spurious_code() {
        let artifacts = artifacts();
        let url = callback_url(&format!(
            "error=access_denied&error_description=user%20cancelled&code=abc123&state={}",
            artifacts.state
        ));
        let err = validate(&CallbackParams::from_url(&url), &artifacts).unwrap_err();
        match err {
            AuthError::Provider { code, description } => {
                assert_eq!(code, "access_denied");
                assert_eq!(description.as_deref(), Some("user cancelled"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn provider_error_checked_before_state() {
        // Even a forged state does not mask the provider's own error report.
        let artifacts = artifacts();
        let url = callback_url("error=temporarily_unavailable&state=forged");
        let err = validate(&CallbackParams::from_url(&url), &artifacts).unwrap_err();
        assert!(matches!(err, AuthError::Provider { .. }));
    }
}
