//! Session resolution: Identity Provider events to a live user record.
//!
//! ```text
//! Unresolved -> Resolving -> Ready(User)
//!                        \-> Anonymous
//! ```
//!
//! Every identity change takes a new generation number. A resolution only
//! lands if its generation is still current when the read completes, so a slow
//! lookup for a previous identity can never overwrite a newer session.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::identity::{Identity, IdentityEvents};
use crate::models::{Registration, User};
use crate::store::{fetch, put, RemoteGateway};
use crate::{Error, Result};

/// Where the current session stands.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SessionState {
    /// Signed out
    #[default]
    Unresolved,
    /// Profile read in flight, or failed with `error` and waiting for a retry
    Resolving { uid: String, error: Option<String> },
    Ready(User),
    /// Signed in but no profile document exists
    Anonymous { uid: String, notice: String },
}

impl SessionState {
    /// Identity of the signed-in user, whether or not a profile resolved.
    pub fn uid(&self) -> Option<&str> {
        match self {
            Self::Unresolved => None,
            Self::Resolving { uid, .. } | Self::Anonymous { uid, .. } => Some(uid),
            Self::Ready(user) => Some(&user.uid),
        }
    }

    pub const fn user(&self) -> Option<&User> {
        match self {
            Self::Ready(user) => Some(user),
            _ => None,
        }
    }
}

/// Read-only view of the session shared with every store.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    state: watch::Receiver<SessionState>,
}

impl SessionHandle {
    pub fn current(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn uid(&self) -> Option<String> {
        self.state.borrow().uid().map(ToString::to_string)
    }

    pub fn current_user(&self) -> Option<User> {
        self.state.borrow().user().cloned()
    }

    /// The resolved user, or [`Error::NotAuthenticated`].
    pub fn require_user(&self) -> Result<User> {
        self.current_user().ok_or(Error::NotAuthenticated)
    }

    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }
}

#[derive(Default)]
struct Generation {
    number: u64,
    identity: Option<Identity>,
}

/// A resolution started for one identity change.
#[derive(Debug)]
struct Ticket {
    generation: u64,
    uid: String,
}

pub struct SessionResolver {
    gateway: Arc<dyn RemoteGateway>,
    state: watch::Sender<SessionState>,
    generation: Mutex<Generation>,
}

impl SessionResolver {
    pub fn new(gateway: Arc<dyn RemoteGateway>) -> Self {
        let (state, _) = watch::channel(SessionState::Unresolved);
        Self {
            gateway,
            state,
            generation: Mutex::new(Generation::default()),
        }
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            state: self.state.subscribe(),
        }
    }

    pub fn current(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Identity the session currently resolves for.
    pub fn identity(&self) -> Option<Identity> {
        self.generation.lock().identity.clone()
    }

    /// Apply one session-change event and wait for its resolution.
    pub async fn on_session_change(&self, identity: Option<Identity>) -> SessionState {
        match self.begin(identity) {
            Some(ticket) => self.finish(ticket).await,
            None => self.current(),
        }
    }

    /// Resolve every event from the Identity Provider stream.
    ///
    /// Transitions are taken in event order; each lookup runs on its own task
    /// so a slow read never delays a newer identity.
    pub fn spawn_listener(self: &Arc<Self>, mut identities: IdentityEvents) -> JoinHandle<()> {
        let resolver = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let identity = identities.borrow_and_update().clone();
                if let Some(ticket) = resolver.begin(identity) {
                    let task_resolver = Arc::clone(&resolver);
                    tokio::spawn(async move {
                        task_resolver.finish(ticket).await;
                    });
                }
                if identities.changed().await.is_err() {
                    tracing::debug!("Identity stream closed");
                    break;
                }
            }
        })
    }

    /// Re-run resolution for the current identity after a failed or empty read.
    pub async fn retry(&self) -> Result<SessionState> {
        let identity = self.identity().ok_or(Error::NotAuthenticated)?;
        Ok(self.on_session_change(Some(identity)).await)
    }

    /// Create the profile document for a freshly signed-up identity.
    ///
    /// Supersedes any resolution in flight for the same sign-in.
    pub async fn register(&self, identity: &Identity, registration: Registration) -> Result<User> {
        let user = User::register(identity.uid.clone(), registration, Utc::now())?;
        let ticket = {
            let mut generation = self.generation.lock();
            generation.number += 1;
            generation.identity = Some(identity.clone());
            self.state.send_replace(SessionState::Resolving {
                uid: identity.uid.clone(),
                error: None,
            });
            Ticket {
                generation: generation.number,
                uid: identity.uid.clone(),
            }
        };

        let written = put(self.gateway.as_ref(), &user.uid, &user).await;
        let generation = self.generation.lock();
        if generation.number != ticket.generation {
            tracing::debug!("Discarding registration result for stale session {}", ticket.uid);
            return written.map(|()| user);
        }
        match written {
            Ok(()) => {
                tracing::info!("Registered profile for {}", user.uid);
                self.state.send_replace(SessionState::Ready(user.clone()));
                Ok(user)
            }
            Err(error) => {
                tracing::warn!("Registration for {} failed: {}", ticket.uid, error);
                self.state.send_replace(SessionState::Anonymous {
                    uid: ticket.uid,
                    notice: error.to_string(),
                });
                Err(error)
            }
        }
    }

    /// Replace the ready user with a newer confirmed profile.
    ///
    /// Ignored unless the session is `Ready` for the same uid.
    pub fn refresh_user(&self, user: User) -> bool {
        let _generation = self.generation.lock();
        self.state.send_if_modified(|state| match state {
            SessionState::Ready(current) if current.uid == user.uid && *current != user => {
                *current = user;
                true
            }
            _ => false,
        })
    }

    fn begin(&self, identity: Option<Identity>) -> Option<Ticket> {
        let mut generation = self.generation.lock();
        generation.number += 1;
        generation.identity.clone_from(&identity);
        match identity {
            None => {
                tracing::info!("Session signed out");
                self.state.send_replace(SessionState::Unresolved);
                None
            }
            Some(identity) => {
                tracing::info!("Resolving session for {}", identity.uid);
                self.state.send_replace(SessionState::Resolving {
                    uid: identity.uid.clone(),
                    error: None,
                });
                Some(Ticket {
                    generation: generation.number,
                    uid: identity.uid,
                })
            }
        }
    }

    async fn finish(&self, ticket: Ticket) -> SessionState {
        let resolved = fetch::<User, _>(self.gateway.as_ref(), &ticket.uid).await;

        let generation = self.generation.lock();
        if generation.number != ticket.generation {
            tracing::debug!("Discarding stale resolution for {}", ticket.uid);
            return self.current();
        }
        let next = match resolved {
            Ok(user) => {
                tracing::info!("Session ready for {}", user.uid);
                SessionState::Ready(user)
            }
            Err(error) if error.is_not_found() => {
                tracing::warn!("No profile document for {}", ticket.uid);
                SessionState::Anonymous {
                    uid: ticket.uid,
                    notice: "Profile not found. Complete registration to continue.".to_string(),
                }
            }
            Err(error) => {
                tracing::warn!("Session resolution for {} failed: {}", ticket.uid, error);
                SessionState::Resolving {
                    uid: ticket.uid,
                    error: Some(error.to_string()),
                }
            }
        };
        self.state.send_replace(next.clone());
        drop(generation);
        next
    }
}
