use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub(crate) const RECORD_VERSION: u32 = 1;

/// Resolved identity of the signed-in user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub subject: String,
    pub email: String,
    pub given_name: String,
    pub family_name: String,
    pub avatar_url: Option<String>,
    pub veteran_verified: bool,
    /// Provider that attested the veteran verification, when verified.
    pub verified_by: Option<String>,
    /// Assurance level the provider asserted for this identity.
    pub assurance: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_login: DateTime<Utc>,
}

impl AuthUser {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.given_name, self.family_name)
            .trim()
            .to_owned()
    }
}

/// An authenticated session produced by a successful callback.
///
/// Never mutated in place; a new login produces a new session.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub access_token: String,
    pub id_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub provider: String,
    pub user: AuthUser,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Split into the two persisted records: encrypted token material and the
    /// low-sensitivity plain profile.
    pub(crate) fn to_records(&self) -> (StoredTokens, StoredProfile) {
        (
            StoredTokens {
                version: RECORD_VERSION,
                access_token: self.access_token.clone(),
                id_token: self.id_token.clone(),
                refresh_token: self.refresh_token.clone(),
                expires_at: self.expires_at,
                provider: self.provider.clone(),
            },
            StoredProfile {
                version: RECORD_VERSION,
                provider: self.provider.clone(),
                user: self.user.clone(),
            },
        )
    }

    pub(crate) fn from_records(tokens: StoredTokens, profile: StoredProfile) -> Self {
        Self {
            access_token: tokens.access_token,
            id_token: tokens.id_token,
            refresh_token: tokens.refresh_token,
            expires_at: tokens.expires_at,
            provider: tokens.provider,
            user: profile.user,
        }
    }
}

/// Encrypted persisted record: token material only.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct StoredTokens {
    pub version: u32,
    pub access_token: String,
    pub id_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub provider: String,
}

/// Unencrypted persisted record: contains no secrets.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct StoredProfile {
    pub version: u32,
    pub provider: String,
    pub user: AuthUser,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_user() -> AuthUser {
        AuthUser {
            subject: "idme|veteran-1".into(),
            email: "jordan@example.com".into(),
            given_name: "Jordan".into(),
            family_name: "Reyes".into(),
            avatar_url: None,
            veteran_verified: true,
            verified_by: Some("idme".into()),
            assurance: Some("http://idmanagement.gov/ns/assurance/loa/3".into()),
            created_at: Utc::now(),
            last_login: Utc::now(),
        }
    }

    fn sample_session(expires_at: DateTime<Utc>) -> Session {
        Session {
            access_token: "token".into(),
            id_token: Some("id-token".into()),
            refresh_token: None,
            expires_at,
            provider: "idme".into(),
            user: sample_user(),
        }
    }

    #[test]
    fn expiry_detection() {
        assert!(!sample_session(Utc::now() + Duration::minutes(5)).is_expired());
        assert!(sample_session(Utc::now() - Duration::seconds(1)).is_expired());
    }

    #[test]
    fn records_round_trip() {
        let session = sample_session(Utc::now() + Duration::hours(1));
        let (tokens, profile) = session.to_records();
        assert_eq!(tokens.version, RECORD_VERSION);
        assert_eq!(profile.version, RECORD_VERSION);
        let rebuilt = Session::from_records(tokens, profile);
        assert_eq!(rebuilt, session);
    }

    #[test]
    fn profile_record_carries_no_tokens() {
        let session = sample_session(Utc::now() + Duration::hours(1));
        let (_, profile) = session.to_records();
        let serialized = serde_json::to_string(&profile).unwrap();
        assert!(!serialized.contains("token"));
    }

    #[test]
    fn display_name_joins_parts() {
        assert_eq!(sample_user().display_name(), "Jordan Reyes");
    }
}
