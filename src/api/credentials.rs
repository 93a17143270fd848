//! Bearer credential storage.

use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Source of the bearer token attached to submissions.
pub trait CredentialSource: Send + Sync {
    /// Current token, if one has been obtained.
    ///
    /// Each call returns a snapshot that later refreshes do not alter.
    fn token(&self) -> Option<Arc<str>>;
}

/// A token shared between one writer and any number of readers.
///
/// Clones share the same slot. Assignments are last-write-wins.
#[derive(Clone, Default)]
pub struct SharedToken {
    inner: Arc<RwLock<Option<Arc<str>>>>,
}

impl SharedToken {
    /// Create an empty token slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a slot holding `token`.
    pub fn with_token(token: impl Into<String>) -> Self {
        let shared = Self::new();
        shared.set(token);
        shared
    }

    /// Replace the stored token.
    pub fn set(&self, token: impl Into<String>) {
        let token: Arc<str> = Arc::from(token.into());
        *self.inner.write() = Some(token);
    }

    /// Forget the stored token.
    pub fn clear(&self) {
        *self.inner.write() = None;
    }

    /// Whether a token is stored.
    pub fn is_set(&self) -> bool {
        self.inner.read().is_some()
    }
}

impl CredentialSource for SharedToken {
    fn token(&self) -> Option<Arc<str>> {
        self.inner.read().clone()
    }
}

impl fmt::Debug for SharedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedToken")
            .field("set", &self.is_set())
            .finish()
    }
}
