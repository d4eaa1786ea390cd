//! Identity Provider session events.

use std::fmt;

use tokio::sync::watch;

/// An authenticated session as emitted by the Identity Provider.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    /// Stable user id; also the key of the user's profile document
    pub uid: String,
    /// Bearer token for services that authenticate per user
    pub token: String,
}

impl Identity {
    pub fn new(uid: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            token: token.into(),
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("uid", &self.uid)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Sending side of the session-change stream; `None` means signed out.
pub type IdentitySender = watch::Sender<Option<Identity>>;
pub type IdentityEvents = watch::Receiver<Option<Identity>>;

/// Create a session-change stream that starts signed out.
pub fn identity_channel() -> (IdentitySender, IdentityEvents) {
    watch::channel(None)
}
