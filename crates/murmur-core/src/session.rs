//! Session state and its reconciliation against durable credentials.
//!
//! The durable credential store is the source of truth. It can change behind
//! our back (another process logs out, someone deletes the token file), so the
//! in-memory session is re-derived from it on every navigation instead of
//! being trusted once at startup.

use murmur_protocol::UserId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Store key holding the auth token.
pub const TOKEN_KEY: &str = "token";

/// Store key holding the serialized [`UserProfile`].
pub const PROFILE_KEY: &str = "user";

/// Credential store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying storage failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Refused to persist credentials missing a required part.
    #[error("Incomplete credentials: {0}")]
    Incomplete(&'static str),
}

/// Durable key-value storage for credentials.
pub trait CredentialStore: Send {
    /// Read a value.
    fn get(&self, key: &str) -> Option<String>;

    /// Write a value.
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Delete a value. Deleting a missing key is not an error.
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;
}

/// Credential store that lives only as long as the process.
#[derive(Debug, Default, Clone)]
pub struct MemoryCredentialStore {
    entries: HashMap<String, String>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Profile blob persisted next to the token.
///
/// Older writers used `userID` or `id` for the identifier, sometimes next to
/// `userId`; all of them read into the canonical `userId`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StoredProfile")]
pub struct UserProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    pub username: String,
}

/// Every identifier spelling seen in stored profiles.
#[derive(Deserialize)]
struct StoredProfile {
    #[serde(default, rename = "userId")]
    user_id: Option<UserId>,
    #[serde(default, rename = "userID")]
    user_id_upper: Option<UserId>,
    #[serde(default)]
    id: Option<UserId>,
    #[serde(default)]
    username: String,
}

impl From<StoredProfile> for UserProfile {
    fn from(stored: StoredProfile) -> Self {
        Self {
            user_id: stored.user_id.or(stored.user_id_upper).or(stored.id),
            username: stored.username,
        }
    }
}

impl UserProfile {
    #[must_use]
    pub fn new(user_id: impl Into<UserId>, username: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            username: username.into(),
        }
    }

    fn is_usable(&self) -> bool {
        !self.username.trim().is_empty()
    }
}

/// A fully resolved local identity, required for private sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub username: String,
}

/// Authenticated identity and token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub token: Option<String>,
    pub user_id: Option<UserId>,
    pub username: String,
    pub is_logged_in: bool,
}

impl Session {
    /// The empty, logged-out session.
    #[must_use]
    pub fn logged_out() -> Self {
        Self::default()
    }

    fn logged_in(token: String, profile: UserProfile) -> Self {
        Self {
            token: Some(token),
            user_id: profile.user_id.filter(|id| !id.is_empty()),
            username: profile.username,
            is_logged_in: true,
        }
    }

    /// Identity usable as a message sender, if both id and name are known.
    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        match &self.user_id {
            Some(id) if self.is_logged_in && !self.username.trim().is_empty() => Some(Identity {
                user_id: id.clone(),
                username: self.username.clone(),
            }),
            _ => None,
        }
    }

    /// Token prefix safe to put in logs.
    #[must_use]
    pub fn token_hint(&self) -> String {
        self.token
            .as_deref()
            .map(|t| format!("{}...", t.chars().take(6).collect::<String>()))
            .unwrap_or_else(|| "<none>".to_string())
    }

    fn same_login(&self, other: &Session) -> bool {
        self.is_logged_in
            && other.is_logged_in
            && self.token == other.token
            && self.user_id == other.user_id
            && self.username == other.username
    }
}

/// What the caller must do after a reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Memory already matches the store.
    None,
    /// Adopt the session read from the store.
    CommitLogin,
    /// Drop the in-memory session and everything tied to it.
    CommitLogout,
}

/// Navigation target being checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Route {
    /// Whether the route needs a logged-in session.
    pub requires_auth: bool,
}

impl Route {
    #[must_use]
    pub fn public() -> Self {
        Self {
            requires_auth: false,
        }
    }

    #[must_use]
    pub fn guarded() -> Self {
        Self {
            requires_auth: true,
        }
    }
}

/// Whether navigation may proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Granted,
    RedirectToLogin,
}

/// Outcome of [`reconcile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// The corrected, authoritative session.
    pub session: Session,
    pub directive: Directive,
    pub access: Access,
}

/// Resolve the in-memory session against the durable store.
///
/// Partial credentials (a token without a usable profile, or a profile
/// without a token) are treated as invalid: the store is cleared and the
/// session logged out.
pub fn reconcile(
    current: &Session,
    store: &mut dyn CredentialStore,
    route: Route,
) -> Reconciliation {
    let token = store.get(TOKEN_KEY).filter(|t| !t.trim().is_empty());
    let raw_profile = store.get(PROFILE_KEY);
    let profile = raw_profile
        .as_deref()
        .and_then(|raw| match serde_json::from_str::<UserProfile>(raw) {
            Ok(profile) => Some(profile),
            Err(e) => {
                warn!(error = %e, "Stored profile is not valid JSON");
                None
            }
        })
        .filter(UserProfile::is_usable);

    let (session, directive) = match (token, profile) {
        (Some(token), Some(profile)) => {
            let durable = Session::logged_in(token, profile);
            if current.same_login(&durable) {
                (durable, Directive::None)
            } else {
                info!(user = %durable.username, "Adopting login from credential store");
                (durable, Directive::CommitLogin)
            }
        }
        (None, None) if raw_profile.is_none() => {
            if current.is_logged_in {
                info!(user = %current.username, "Credentials gone from store, logging out");
                (Session::logged_out(), Directive::CommitLogout)
            } else {
                (Session::logged_out(), Directive::None)
            }
        }
        _ => {
            warn!("Partial credentials in store, clearing");
            clear_credentials(store);
            (Session::logged_out(), Directive::CommitLogout)
        }
    };

    let access = if route.requires_auth && !session.is_logged_in {
        Access::RedirectToLogin
    } else {
        Access::Granted
    };

    debug!(?directive, ?access, logged_in = session.is_logged_in, "Reconciled session");

    Reconciliation {
        session,
        directive,
        access,
    }
}

/// Persist credentials and return the resulting session.
///
/// # Errors
///
/// Returns an error if the token or username is empty, or the store fails.
pub fn login(
    store: &mut dyn CredentialStore,
    token: &str,
    profile: UserProfile,
) -> Result<Session, StoreError> {
    if token.trim().is_empty() {
        return Err(StoreError::Incomplete("empty token"));
    }
    if !profile.is_usable() {
        return Err(StoreError::Incomplete("empty username"));
    }

    let blob = serde_json::to_string(&profile)?;
    store.set(TOKEN_KEY, token)?;
    store.set(PROFILE_KEY, &blob)?;

    let session = Session::logged_in(token.to_string(), profile);
    info!(user = %session.username, token = %session.token_hint(), "Logged in");
    Ok(session)
}

/// Remove credentials and return the empty session.
///
/// # Errors
///
/// Returns an error if the store fails to delete a key.
pub fn logout(store: &mut dyn CredentialStore) -> Result<Session, StoreError> {
    store.remove(TOKEN_KEY)?;
    store.remove(PROFILE_KEY)?;
    info!("Logged out");
    Ok(Session::logged_out())
}

fn clear_credentials(store: &mut dyn CredentialStore) {
    for key in [TOKEN_KEY, PROFILE_KEY] {
        if let Err(e) = store.remove(key) {
            warn!(key, error = %e, "Failed to clear credential");
        }
    }
}
