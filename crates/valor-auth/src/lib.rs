//! Client-side OAuth 2.0 Authorization-Code-with-PKCE core for the Valor
//! benefits app.
//!
//! There is no confidential backend: the whole flow runs in the client, so
//! this crate guards the redirect round trip (state/nonce checks, a
//! single-slot one-shot PKCE artifact store) and keeps persisted credentials
//! encrypted at rest under a session-scoped vault key. The code-for-token
//! exchange itself is an injectable seam — see [`auth::TokenResolver`].

pub mod auth;
pub mod storage;

pub use auth::{AuthError, AuthSessionManager};
pub use storage::{FileStorage, MemoryStorage, StorageArea, StorageError};
