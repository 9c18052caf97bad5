//! Unit tests for the gateway's subsystems.
//!
//! Collaborators are stubbed at their interface boundaries: the storage
//! service as a recording `StorageClient`, the identity provider as a
//! real HTTP server on an ephemeral port serving canned JSON.

pub(crate) mod sharing_tests;

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use http::header::CONTENT_TYPE;
use http::{HeaderMap, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use crate::authz::{Authorizer, Decision, DecisionEngine, DenialReason, RequestTarget};
use crate::cache::{MemoryCache, TokenCache};
use crate::constants::X_EXECUTE_JOB;
use crate::error::GatewayError;
use crate::gateway::Gateway;
use crate::oauth::{LoginCoordinator, ProviderClient, ProviderConfig, ServiceSettings};
use crate::sharing::ShareManager;
use crate::storage::{AccountMetadata, StorageClient};

pub(crate) const TEST_PREFIX: &str = "g_";
pub(crate) const TEST_ENDPOINT: &str = "https://objects.example.test";

/// One request the mock storage saw on its forwarding path.
pub(crate) struct ForwardRecord {
    pub method: http::Method,
    pub path: String,
    pub headers: HeaderMap,
    pub decision: Decision,
}

/// Storage stub recording metadata posts and forwarded requests.
///
/// Its `forward` attaches the configured container ACL and invokes the
/// authorization hook, the same protocol the HTTP client follows.
pub(crate) struct MockStorage {
    pub head_status: StatusCode,
    pub head_headers: HeaderMap,
    pub container_acls: HashMap<(String, String), Vec<String>>,
    pub posted: Mutex<Vec<(String, HeaderMap)>>,
    pub forwarded: Mutex<Vec<ForwardRecord>>,
}

impl MockStorage {
    pub fn with_account() -> Self {
        Self {
            head_status: StatusCode::NO_CONTENT,
            head_headers: HeaderMap::new(),
            container_acls: HashMap::new(),
            posted: Mutex::new(Vec::new()),
            forwarded: Mutex::new(Vec::new()),
        }
    }

    pub fn missing_account() -> Self {
        Self {
            head_status: StatusCode::NOT_FOUND,
            ..Self::with_account()
        }
    }

    pub fn with_acl(account: &str, container: &str, acl: &[&str]) -> Self {
        let mut storage = Self::with_account();
        storage.container_acls.insert(
            (account.to_string(), container.to_string()),
            acl.iter().map(|entry| entry.to_string()).collect(),
        );
        storage
    }
}

#[async_trait::async_trait]
impl StorageClient for MockStorage {
    async fn head_account(&self, _account: &str) -> Result<AccountMetadata, GatewayError> {
        Ok(AccountMetadata {
            status: self.head_status,
            headers: self.head_headers.clone(),
        })
    }

    async fn post_account(
        &self,
        account: &str,
        headers: HeaderMap,
    ) -> Result<Response<Full<Bytes>>, GatewayError> {
        self.posted.lock().await.push((account.to_string(), headers));
        let mut response = Response::new(Full::new(Bytes::from("metadata updated")));
        *response.status_mut() = StatusCode::ACCEPTED;
        Ok(response)
    }

    async fn container_acl(
        &self,
        account: &str,
        container: &str,
    ) -> Result<Vec<String>, GatewayError> {
        Ok(self
            .container_acls
            .get(&(account.to_string(), container.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn forward(
        &self,
        parts: http::request::Parts,
        _body: Bytes,
        authorizer: Authorizer,
    ) -> Result<Response<Full<Bytes>>, GatewayError> {
        let target = RequestTarget::parse(parts.uri.path())?;
        let acl = match (&target.account, &target.container) {
            (Some(account), Some(container)) => self.container_acl(account, container).await?,
            _ => Vec::new(),
        };
        let execute_trigger = parts.headers.contains_key(X_EXECUTE_JOB);
        let decision = authorizer.authorize(&target, &parts.method, acl, execute_trigger);
        self.forwarded.lock().await.push(ForwardRecord {
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            headers: parts.headers.clone(),
            decision,
        });
        match decision {
            Decision::Denied(DenialReason::Unauthenticated) => Err(GatewayError::Unauthenticated),
            Decision::Denied(DenialReason::Forbidden) => Err(GatewayError::Forbidden),
            Decision::Granted { .. } => Ok(Response::new(Full::new(Bytes::from("downstream ok")))),
        }
    }
}

/// Identity-provider stub serving canned token and userinfo payloads.
pub(crate) struct StubProvider {
    pub base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl Drop for StubProvider {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub(crate) async fn start_stub_provider(
    code_grant: serde_json::Value,
    refresh_grant: Option<serde_json::Value>,
    userinfo: serde_json::Value,
) -> StubProvider {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind stub provider");
    let port = listener
        .local_addr()
        .expect("Failed to read stub provider address")
        .port();
    let code_grant = Arc::new(code_grant);
    let refresh_grant = Arc::new(refresh_grant);
    let userinfo = Arc::new(userinfo);

    let handle = tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let code_grant = code_grant.clone();
            let refresh_grant = refresh_grant.clone();
            let userinfo = userinfo.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let code_grant = code_grant.clone();
                    let refresh_grant = refresh_grant.clone();
                    let userinfo = userinfo.clone();
                    async move {
                        let path = req.uri().path().to_string();
                        let payload = match path.as_str() {
                            "/token" => {
                                let body = req
                                    .into_body()
                                    .collect()
                                    .await
                                    .expect("Failed to read token request body")
                                    .to_bytes();
                                let form: HashMap<String, String> =
                                    form_urlencoded::parse(&body).into_owned().collect();
                                if form.get("grant_type").map(String::as_str)
                                    == Some("refresh_token")
                                {
                                    refresh_grant.as_ref().clone().unwrap_or_else(|| json!({}))
                                } else {
                                    code_grant.as_ref().clone()
                                }
                            }
                            "/userinfo" => userinfo.as_ref().clone(),
                            _ => {
                                let mut response =
                                    Response::new(Full::new(Bytes::from("not found")));
                                *response.status_mut() = StatusCode::NOT_FOUND;
                                return Ok::<_, Infallible>(response);
                            }
                        };
                        let body = serde_json::to_vec(&payload).expect("Failed to encode payload");
                        let response = Response::builder()
                            .header(CONTENT_TYPE, "application/json")
                            .body(Full::new(Bytes::from(body)))
                            .expect("Failed to build stub response");
                        Ok::<_, Infallible>(response)
                    }
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    StubProvider {
        base_url: format!("http://127.0.0.1:{port}"),
        handle,
    }
}

pub(crate) fn test_settings() -> ServiceSettings {
    ServiceSettings {
        endpoint: TEST_ENDPOINT.to_string(),
        domain: "objects.example.test".to_string(),
        version: "v1".to_string(),
        account_prefix: TEST_PREFIX.to_string(),
    }
}

pub(crate) fn test_cache() -> TokenCache {
    TokenCache::new(Some(Arc::new(MemoryCache::default())), TEST_PREFIX)
        .expect("Failed to build token cache")
}

pub(crate) fn test_provider(base_url: &str) -> ProviderClient {
    ProviderClient::new(ProviderConfig {
        auth_endpoint: format!("{base_url}/auth"),
        token_endpoint: format!("{base_url}/token"),
        userinfo_endpoint: format!("{base_url}/userinfo"),
        client_id: "gateway-client".to_string(),
        client_secret: "gateway-secret".to_string(),
        scope: vec!["openid".to_string(), "email".to_string()],
        redirect_uri: format!("{TEST_ENDPOINT}/login/oauth/"),
    })
}

pub(crate) fn make_coordinator(
    provider_base: &str,
    storage: Arc<MockStorage>,
    cache: TokenCache,
) -> LoginCoordinator {
    let storage: Arc<dyn StorageClient> = storage;
    LoginCoordinator::new(test_provider(provider_base), cache, storage, test_settings())
}

pub(crate) fn make_gateway(storage: Arc<MockStorage>, cache: TokenCache) -> Gateway {
    let storage: Arc<dyn StorageClient> = storage;
    let engine = Arc::new(DecisionEngine::new(TEST_PREFIX));
    let coordinator = LoginCoordinator::new(
        test_provider("http://127.0.0.1:9"),
        cache.clone(),
        storage.clone(),
        test_settings(),
    );
    let share = ShareManager::new(storage.clone());
    Gateway::new(coordinator, cache, engine, share, storage)
}
