//! Authorization subject derived from a federated login.

use serde::{Deserialize, Serialize};

/// Namespaced identity, `<prefix><provider-user-id>`.
///
/// The same value names the caller's storage account; it is immutable once
/// derived.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn from_provider_id(prefix: &str, provider_user_id: &str) -> Self {
        Self(format!("{prefix}{provider_user_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this identity owns the named account. Exact match: each
    /// account belongs to exactly one identity.
    pub fn owns_account(&self, account: &str) -> bool {
        self.0 == account
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
