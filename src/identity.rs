//! Host identity.
//!
//! The chat host hands the embedded client an opaque, signed init-data
//! string once its own runtime has started. The core never issues or
//! verifies it; it only forwards it to the remote service. Outside the host
//! the credential may never arrive at all.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

/// Opaque per-session credential (the host's URL-encoded init data).
#[derive(Clone)]
pub struct Credential(Arc<SecretString>);

impl Credential {
    /// Wrap raw init data. Returns `None` for blank input, which the host
    /// emits when launched outside a chat.
    pub fn new(init_data: impl Into<String>) -> Option<Self> {
        let raw: String = init_data.into();
        if raw.trim().is_empty() {
            return None;
        }
        Some(Self(Arc::new(SecretString::new(raw))))
    }

    /// The raw init data, for the auth header only.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// Decode the unsigned `user` field for log context. Never use this for
    /// authorization; the remote service checks the signature.
    pub fn user(&self) -> Option<HostUser> {
        self.expose().split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            if key != "user" {
                return None;
            }
            let json = urlencoding::decode(value).ok()?;
            serde_json::from_str(&json).ok()
        })
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential([REDACTED])")
    }
}

/// The user the host claims is signed in.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HostUser {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl HostUser {
    /// Best human-readable handle for logs.
    pub fn handle(&self) -> String {
        match (&self.username, &self.first_name) {
            (Some(u), _) => format!("@{}", u.trim_start_matches('@')),
            (None, Some(first)) => first.clone(),
            (None, None) => format!("id:{}", self.id),
        }
    }
}

// ---------------------------------------------------------------------------
// IdentitySource
// ---------------------------------------------------------------------------

/// Supplies the session credential once the host has initialised.
#[async_trait]
pub trait IdentitySource: Send + Sync {
    /// The credential, if the host has supplied one yet.
    fn current(&self) -> Option<Credential>;

    /// Resolve once a credential is available. May never resolve.
    async fn arrived(&self) -> Credential;
}

/// `IdentitySource` fed by the host adapter through [`HostIdentity::publish`].
pub struct HostIdentity {
    tx: watch::Sender<Option<Credential>>,
}

impl HostIdentity {
    /// A source with no credential yet.
    pub fn pending() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// A source that already holds `credential`.
    pub fn ready(credential: Credential) -> Self {
        let (tx, _rx) = watch::channel(Some(credential));
        Self { tx }
    }

    /// Called by the host adapter when init data becomes available.
    pub fn publish(&self, credential: Credential) {
        if let Some(user) = credential.user() {
            info!(user = %user.handle(), "Host identity published");
        } else {
            info!("Host identity published (no user field)");
        }
        self.tx.send_replace(Some(credential));
    }
}

#[async_trait]
impl IdentitySource for HostIdentity {
    fn current(&self) -> Option<Credential> {
        self.tx.borrow().clone()
    }

    async fn arrived(&self) -> Credential {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(credential) = rx.borrow_and_update().clone() {
                return credential;
            }
            if rx.changed().await.is_err() {
                // Sender lives in `self`, so this only happens mid-teardown.
                debug!("Identity channel closed while waiting");
                std::future::pending::<()>().await;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
