//! Authorization decision engine: owner-or-listed-or-wildcard over
//! namespaced accounts.

use std::sync::Arc;

use http::Method;

use crate::constants::ACL_WILDCARD;
use crate::error::GatewayError;
use crate::identity::Identity;

/// Reason a request was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DenialReason {
    /// No caller identity was established.
    Unauthenticated,
    /// The caller is known but not permitted.
    Forbidden,
}

/// Outcome of an authorization decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// `owner` grants full in-account privileges downstream, bypassing
    /// container-level ACL checks there.
    Granted { owner: bool },
    Denied(DenialReason),
}

/// Parsed `/<version>/<account>[/<container>[/<object>]]` request path.
/// The object segment keeps any embedded slashes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestTarget {
    pub version: String,
    pub account: Option<String>,
    pub container: Option<String>,
    pub object: Option<String>,
}

impl RequestTarget {
    pub fn parse(path: &str) -> Result<Self, GatewayError> {
        let invalid = || GatewayError::NotFound(format!("invalid object path: {path}"));
        let rest = path.strip_prefix('/').ok_or_else(invalid)?;
        let mut segments = rest.splitn(4, '/');
        let version = segments
            .next()
            .filter(|segment| !segment.is_empty())
            .ok_or_else(invalid)?;
        let account = segments.next().map(str::to_string).filter(|s| !s.is_empty());
        let container = segments.next().map(str::to_string).filter(|s| !s.is_empty());
        let object = segments.next().map(str::to_string).filter(|s| !s.is_empty());
        // An empty middle segment with a populated later one is malformed.
        if (account.is_none() && container.is_some())
            || (container.is_none() && object.is_some())
        {
            return Err(invalid());
        }
        Ok(Self {
            version: version.to_string(),
            account,
            container,
            object,
        })
    }
}

/// Everything the engine consults for one request.
#[derive(Clone, Debug)]
pub struct AuthorizationContext {
    /// Requested account; empty when the path named none.
    pub account: String,
    pub container: Option<String>,
    pub object: Option<String>,
    pub method: Method,
    pub identity: Option<Identity>,
    /// Read ACL attached by the storage layer: identities and/or `*`.
    pub acl: Vec<String>,
    /// Whether the privileged job-execution header was present.
    pub execute_trigger: bool,
}

pub struct DecisionEngine {
    account_prefix: String,
}

impl DecisionEngine {
    pub fn new(account_prefix: &str) -> Self {
        Self {
            account_prefix: account_prefix.to_string(),
        }
    }

    /// Rules in order, first match wins.
    pub fn decide(&self, ctx: &AuthorizationContext) -> Decision {
        if ctx.account.is_empty() || !ctx.account.starts_with(&self.account_prefix) {
            return denied(ctx);
        }
        let owns = ctx
            .identity
            .as_ref()
            .map(|identity| identity.owns_account(&ctx.account))
            .unwrap_or(false);
        // Privileged execute: granted without owner elevation.
        if ctx.method == Method::POST && ctx.execute_trigger && owns {
            return Decision::Granted { owner: false };
        }
        // Ownership elevates, but top-level mutations of the account
        // itself stay reserved to the storage layer's own controls.
        let mutating = matches!(ctx.method.as_str(), "DELETE" | "PUT" | "POST");
        if owns && (!mutating || ctx.container.is_some()) {
            return Decision::Granted { owner: true };
        }
        if ctx.container.is_some() {
            let listed = ctx.acl.iter().any(|entry| {
                entry == ACL_WILDCARD
                    || ctx
                        .identity
                        .as_ref()
                        .is_some_and(|identity| identity.as_str() == entry)
            });
            if listed {
                return Decision::Granted { owner: false };
            }
        }
        denied(ctx)
    }
}

fn denied(ctx: &AuthorizationContext) -> Decision {
    match &ctx.identity {
        Some(_) => Decision::Denied(DenialReason::Forbidden),
        None => Decision::Denied(DenialReason::Unauthenticated),
    }
}

/// The authorization hook handed to the storage layer alongside each
/// forwarded request; the storage side attaches the resource ACL and
/// invokes it.
#[derive(Clone)]
pub struct Authorizer {
    engine: Arc<DecisionEngine>,
    identity: Option<Identity>,
}

impl Authorizer {
    pub fn new(engine: Arc<DecisionEngine>, identity: Option<Identity>) -> Self {
        Self { engine, identity }
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn authorize(
        &self,
        target: &RequestTarget,
        method: &Method,
        acl: Vec<String>,
        execute_trigger: bool,
    ) -> Decision {
        self.engine.decide(&AuthorizationContext {
            account: target.account.clone().unwrap_or_default(),
            container: target.container.clone(),
            object: target.object.clone(),
            method: method.clone(),
            identity: self.identity.clone(),
            acl,
            execute_trigger,
        })
    }
}
