//! Wire-level names shared across the gateway.

/// Session cookie presented to browsers.
pub const SESSION_COOKIE: &str = "session";

/// Path prefix owned by the federated login flow.
pub const LOGIN_PATH: &str = "/login/oauth/";

/// Path prefix for shared-container mutations.
pub const SHARE_PATH: &str = "/share/";
/// Share operation recording a container as shared.
pub const SHARE_ADD: &str = "load";
/// Share operation withdrawing a shared container.
pub const SHARE_REMOVE: &str = "drop";

/// A `code` query parameter containing this marker is a logout request,
/// not an authorization code.
pub const LOGOUT_MARKER: &str = "logout";

/// ACL entry granting access to any identity.
pub const ACL_WILDCARD: &str = "*";

pub const X_AUTH_TOKEN: &str = "x-auth-token";
pub const X_STORAGE_TOKEN: &str = "x-storage-token";
pub const X_STORAGE_URL: &str = "x-storage-url";
pub const X_REMOTE_USER: &str = "x-remote-user";
/// Present on POSTs that trigger privileged in-account job execution.
pub const X_EXECUTE_JOB: &str = "x-execute-job";
/// Set on forwarded requests when the caller holds owner privileges.
pub const X_STORAGE_OWNER: &str = "x-storage-owner";

pub const ACCOUNT_META_PREFIX: &str = "x-account-meta-";
pub const SHARED_META_HEADER: &str = "x-account-meta-shared";
pub const USERDATA_META_HEADER: &str = "x-account-meta-userdata";
/// Container read ACL, as the storage layer records it.
pub const CONTAINER_READ_ACL: &str = "x-container-read";

/// Cache TTL applied when the provider omits `expires_in`.
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;
