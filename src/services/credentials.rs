// src/services/credentials.rs
use async_trait::async_trait;
use std::fmt;
use std::sync::RwLock;

#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Returns `None` for blank input.
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into();
        let trimmed = key.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Where the orchestrator looks for a credential before a session starts.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn current(&self) -> Option<ApiKey>;
}

/// Invoked when no credential is available, e.g. to run an interactive key
/// picker. Returning `None` means the user declined.
#[async_trait]
pub trait CredentialSelector: Send + Sync {
    async fn select(&self) -> Option<ApiKey>;
}

/// Process-wide key slot, seeded from the environment and replaceable at runtime.
#[derive(Default)]
pub struct CredentialStore {
    key: RwLock<Option<ApiKey>>,
}

impl CredentialStore {
    pub fn new(initial: Option<ApiKey>) -> Self {
        Self {
            key: RwLock::new(initial),
        }
    }

    pub fn set(&self, key: ApiKey) {
        let mut slot = self.key.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(key);
    }

    pub fn clear(&self) {
        let mut slot = self.key.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = None;
    }

    pub fn get(&self) -> Option<ApiKey> {
        self.key
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl CredentialSource for CredentialStore {
    async fn current(&self) -> Option<ApiKey> {
        self.get()
    }
}
