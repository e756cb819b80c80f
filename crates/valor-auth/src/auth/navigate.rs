use url::Url;

use super::AuthError;

/// Hands control to the identity provider.
///
/// `login` persists its artifacts before calling this; once navigation starts
/// the current execution context may never resume, so durable storage is the
/// only state that survives to the return leg.
pub trait Navigator: Send + Sync {
    fn navigate(&self, url: &Url) -> Result<(), AuthError>;
}

/// Opens the authorization URL in the system browser.
pub struct SystemBrowserNavigator;

impl Navigator for SystemBrowserNavigator {
    fn navigate(&self, url: &Url) -> Result<(), AuthError> {
        open::that(url.as_str()).map_err(|err| AuthError::BrowserLaunch(err.to_string()))
    }
}
