//! Client side of the auth flow: an injectable session context, its
//! persistence, a cancellable expiry watcher and a typed HTTP client.

use thiserror::Error;

pub mod api;
pub mod session;
pub mod watcher;

pub use api::ApiClient;
pub use session::{FileSessionStore, MemorySessionStore, Session, SessionContext, SessionStore, SessionUser};
pub use watcher::{SessionEvent, SessionWatcher};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("not signed in")]
    NotAuthenticated,

    #[error("session expired")]
    SessionExpired,

    #[error("malformed token")]
    MalformedToken,

    #[error("session store: {0}")]
    Store(#[from] anyhow::Error),
}
