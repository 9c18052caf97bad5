//! Per-request dispatch: login flow, share mutations, downstream
//! forwarding.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use http::{HeaderName, HeaderValue, Response};
use http_body_util::{BodyExt, Full};
use hyper::Request;
use hyper::body::Bytes;
use tracing::{debug, instrument};

use crate::authz::{Authorizer, DecisionEngine};
use crate::cache::TokenCache;
use crate::constants::{LOGIN_PATH, SHARE_PATH, X_AUTH_TOKEN, X_REMOTE_USER, X_STORAGE_TOKEN};
use crate::cookie::extract_session_token;
use crate::error::GatewayError;
use crate::oauth::LoginCoordinator;
use crate::sharing::ShareManager;
use crate::storage::StorageClient;

/// Entry point for every inbound request. All collaborators are injected
/// at construction.
pub struct Gateway {
    coordinator: LoginCoordinator,
    cache: TokenCache,
    engine: Arc<DecisionEngine>,
    share: ShareManager,
    storage: Arc<dyn StorageClient>,
}

impl Gateway {
    pub fn new(
        coordinator: LoginCoordinator,
        cache: TokenCache,
        engine: Arc<DecisionEngine>,
        share: ShareManager,
        storage: Arc<dyn StorageClient>,
    ) -> Self {
        Self {
            coordinator,
            cache,
            engine,
            share,
            storage,
        }
    }

    #[instrument(
        level = "info",
        skip_all,
        fields(method = %req.method(), uri = %req.uri(), status_code)
    )]
    pub async fn handle_request<B>(
        &self,
        req: Request<B>,
    ) -> Result<Response<Full<Bytes>>, Infallible>
    where
        B: hyper::body::Body<Data = Bytes> + Send,
        B::Error: std::fmt::Display,
    {
        let response = match self.dispatch(req).await {
            Ok(response) => response,
            Err(err) => {
                debug!(error = %err, "Request refused");
                err.into()
            }
        };
        tracing::Span::current().record("status_code", response.status().as_u16());
        Ok(response)
    }

    async fn dispatch<B>(&self, req: Request<B>) -> Result<Response<Full<Bytes>>, GatewayError>
    where
        B: hyper::body::Body<Data = Bytes> + Send,
        B::Error: std::fmt::Display,
    {
        let path = req.uri().path().to_string();

        if path.starts_with(LOGIN_PATH) {
            let params: HashMap<String, String> =
                form_urlencoded::parse(req.uri().query().unwrap_or("").as_bytes())
                    .into_owned()
                    .collect();
            let state = params.get("state").map(String::as_str);
            return match params.get("code") {
                Some(code) => {
                    self.coordinator
                        .complete_login(req.headers(), code, state)
                        .await
                }
                None => self.coordinator.begin_login(state),
            };
        }

        let token = extract_session_token(req.headers());
        let (mut parts, body) = req.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|err| GatewayError::Hyper(err.to_string()))?
            .to_bytes();

        // The effective remote user is asserted by this gateway, never by
        // the client.
        parts.headers.remove(X_REMOTE_USER);

        let identity = match &token {
            None => None,
            Some(token) => match self.cache.get(token).await? {
                // A token the cache cannot vouch for is rejected rather
                // than downgraded to anonymous.
                None => return Err(GatewayError::Unauthenticated),
                Some(identity) => Some(identity),
            },
        };

        if let Some(identity) = &identity {
            if let Some(rest) = path.strip_prefix(SHARE_PATH) {
                return self.share.handle(identity, rest).await;
            }
        }

        if let (Some(token), Some(identity)) = (&token, &identity) {
            parts.headers.insert(
                HeaderName::from_static(X_REMOTE_USER),
                HeaderValue::from_str(identity.as_str())?,
            );
            // Downstream layers recover both halves from this pair.
            parts.headers.insert(
                HeaderName::from_static(X_AUTH_TOKEN),
                HeaderValue::from_str(&format!("{identity},{token}"))?,
            );
            parts.headers.insert(
                HeaderName::from_static(X_STORAGE_TOKEN),
                HeaderValue::from_str(token)?,
            );
        }

        let authorizer = Authorizer::new(self.engine.clone(), identity);
        self.storage.forward(parts, body, authorizer).await
    }
}
