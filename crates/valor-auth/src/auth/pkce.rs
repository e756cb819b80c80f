use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::provider::ChallengeMethod;

/// How long an issued artifact set stays redeemable, in minutes. Abandoned
/// logins leave stale artifacts behind; anything older than this is ignored.
const ARTIFACT_TTL_MINUTES: i64 = 10;

/// One-shot PKCE artifact set binding a login attempt to its return leg.
///
/// Persisted encrypted in a single slot: issuing a new set overwrites the
/// previous one, and the callback leg consumes it exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PkceArtifacts {
    pub code_verifier: String,
    pub code_challenge: String,
    pub state: String,
    pub nonce: String,
    pub provider: String,
    pub issued_at: DateTime<Utc>,
}

impl PkceArtifacts {
    /// Issue a fresh artifact set following RFC 7636 recommendations.
    ///
    /// Each call draws wholly independent randomness for the verifier, state,
    /// and nonce.
    pub fn generate(provider: impl Into<String>, method: ChallengeMethod) -> Self {
        let code_verifier = random_urlsafe(32);
        let code_challenge = derive_challenge(&code_verifier, method);
        Self {
            code_verifier,
            code_challenge,
            state: random_urlsafe(16),
            nonce: random_urlsafe(16),
            provider: provider.into(),
            issued_at: Utc::now(),
        }
    }

    /// Whether this artifact set is too old to redeem.
    pub fn is_stale(&self) -> bool {
        Utc::now() - self.issued_at > Duration::minutes(ARTIFACT_TTL_MINUTES)
    }
}

/// Derive the challenge for a verifier under the given method.
pub fn derive_challenge(verifier: &str, method: ChallengeMethod) -> String {
    match method {
        ChallengeMethod::S256 => {
            let digest = Sha256::digest(verifier.as_bytes());
            URL_SAFE_NO_PAD.encode(digest)
        }
        // Only for providers that forbid hashing; S256 wherever permitted.
        ChallengeMethod::Plain => verifier.to_owned(),
    }
}

pub(crate) fn random_urlsafe(byte_len: usize) -> String {
    let mut bytes = vec![0u8; byte_len];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
