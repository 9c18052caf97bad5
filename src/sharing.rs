//! Shared-container document and its mutation protocol.

use std::collections::BTreeMap;
use std::sync::Arc;

use http::{HeaderMap, HeaderName, HeaderValue, Response};
use http_body_util::Full;
use hyper::body::Bytes;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{SHARE_ADD, SHARE_REMOVE, SHARED_META_HEADER};
use crate::error::GatewayError;
use crate::identity::Identity;
use crate::storage::StorageClient;

/// Composite `<account>/<container>` key of a shared-container entry.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ShareKey {
    pub account: String,
    pub container: String,
}

impl From<ShareKey> for String {
    fn from(key: ShareKey) -> String {
        format!("{}/{}", key.account, key.container)
    }
}

impl TryFrom<String> for ShareKey {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        let (account, container) = raw
            .split_once('/')
            .ok_or_else(|| format!("share key without separator: {raw}"))?;
        if account.is_empty() || container.is_empty() {
            return Err(format!("share key with empty segment: {raw}"));
        }
        Ok(Self {
            account: account.to_string(),
            container: container.to_string(),
        })
    }
}

/// Sharing state recorded for a container.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShareState {
    Shared,
}

/// Per-account document recording which containers have been shared with
/// others, stored as one JSON metadata value on the account.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SharedAclDocument(BTreeMap<ShareKey, ShareState>);

impl SharedAclDocument {
    /// Absent or undecodable metadata yields an empty document; corrupt
    /// state is self-healing, never fatal.
    pub fn from_metadata(headers: &HeaderMap) -> Self {
        headers
            .get(SHARED_META_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default()
    }

    pub fn add(&mut self, account: &str, container: &str) {
        self.0.insert(
            ShareKey {
                account: account.to_string(),
                container: container.to_string(),
            },
            ShareState::Shared,
        );
    }

    /// Removing an absent key is a no-op.
    pub fn remove(&mut self, account: &str, container: &str) {
        self.0.remove(&ShareKey {
            account: account.to_string(),
            container: container.to_string(),
        });
    }

    pub fn contains(&self, account: &str, container: &str) -> bool {
        self.0.contains_key(&ShareKey {
            account: account.to_string(),
            container: container.to_string(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json(&self) -> Result<String, GatewayError> {
        serde_json::to_string(self).map_err(GatewayError::from)
    }
}

/// Mutation requested against the shared-container document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShareOp {
    Add,
    Remove,
}

impl ShareOp {
    fn parse(op: &str) -> Option<Self> {
        match op {
            SHARE_ADD => Some(Self::Add),
            SHARE_REMOVE => Some(Self::Remove),
            _ => None,
        }
    }
}

/// Applies shared-container mutations to the caller's own account
/// document.
pub struct ShareManager {
    storage: Arc<dyn StorageClient>,
}

impl ShareManager {
    pub fn new(storage: Arc<dyn StorageClient>) -> Self {
        Self { storage }
    }

    /// `rest` is the share path with its prefix stripped:
    /// `<op>/<account>/<container>`.
    pub fn parse_share_path(rest: &str) -> Result<(ShareOp, String, String), GatewayError> {
        let invalid = || GatewayError::NotFound(format!("invalid share path: {rest}"));
        let mut segments = rest.trim_matches('/').splitn(3, '/');
        let op = segments
            .next()
            .and_then(ShareOp::parse)
            .ok_or_else(invalid)?;
        let account = segments
            .next()
            .filter(|segment| !segment.is_empty())
            .ok_or_else(invalid)?;
        let container = segments
            .next()
            .filter(|segment| !segment.is_empty())
            .ok_or_else(invalid)?;
        Ok((op, account.to_string(), container.to_string()))
    }

    /// Read-modify-write on the whole document, with no transactional
    /// guarantee: two concurrent mutations on one account race and the
    /// last whole-document write wins.
    pub async fn handle(
        &self,
        caller: &Identity,
        rest: &str,
    ) -> Result<Response<Full<Bytes>>, GatewayError> {
        let (op, account, container) = Self::parse_share_path(rest)?;
        let metadata = self.storage.head_account(caller.as_str()).await?;
        if !metadata.status.is_success() {
            return Err(GatewayError::NotFound(format!(
                "account metadata unavailable for {caller}"
            )));
        }
        let mut document = SharedAclDocument::from_metadata(&metadata.headers);
        match op {
            ShareOp::Add => document.add(&account, &container),
            ShareOp::Remove => document.remove(&account, &container),
        }
        let mut headers = metadata.account_meta();
        headers.insert(
            HeaderName::from_static(SHARED_META_HEADER),
            HeaderValue::from_str(&document.to_json()?)?,
        );
        debug!(caller = %caller, account = %account, container = %container, op = ?op, "Updating shared-container document");
        self.storage.post_account(caller.as_str(), headers).await
    }
}
