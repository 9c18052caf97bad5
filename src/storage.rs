//! Storage-service collaborator: account metadata and request forwarding.

use http::{HeaderMap, HeaderName, HeaderValue, Method, Response, StatusCode, header};
use http_body_util::Full;
use hyper::body::Bytes;
use tracing::debug;

use crate::authz::{Authorizer, Decision, DenialReason, RequestTarget};
use crate::constants::{ACCOUNT_META_PREFIX, CONTAINER_READ_ACL, X_EXECUTE_JOB, X_STORAGE_OWNER};
use crate::error::GatewayError;

/// Status and headers from an account-metadata `HEAD`.
pub struct AccountMetadata {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl AccountMetadata {
    /// The account's `x-account-meta-*` headers, copied verbatim so a
    /// metadata `POST` carries them forward.
    pub fn account_meta(&self) -> HeaderMap {
        let mut copied = HeaderMap::new();
        for (name, value) in self.headers.iter() {
            if name.as_str().starts_with(ACCOUNT_META_PREFIX) {
                copied.insert(name.clone(), value.clone());
            }
        }
        copied
    }

    pub fn has_meta(&self, name: &str) -> bool {
        self.headers.contains_key(name)
    }
}

/// Parses a comma-separated read ACL into its entries.
pub fn parse_acl(raw: Option<&str>) -> Vec<String> {
    raw.map(|value| {
        value
            .split(',')
            .map(|entry| entry.trim().to_string())
            .filter(|entry| !entry.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

/// The downstream object store, consumed at its metadata and forwarding
/// boundary.
#[async_trait::async_trait]
pub trait StorageClient: Send + Sync {
    /// `HEAD /<version>/<account>`.
    async fn head_account(&self, account: &str) -> Result<AccountMetadata, GatewayError>;

    /// `POST /<version>/<account>` with the given headers; the storage
    /// response is handed back to the caller unchanged.
    async fn post_account(
        &self,
        account: &str,
        headers: HeaderMap,
    ) -> Result<Response<Full<Bytes>>, GatewayError>;

    /// Read ACL of a container; an unknown container yields an empty list.
    async fn container_acl(
        &self,
        account: &str,
        container: &str,
    ) -> Result<Vec<String>, GatewayError>;

    /// Forward a request downstream, invoking `authorizer` once the
    /// resource ACL is attached.
    async fn forward(
        &self,
        parts: http::request::Parts,
        body: Bytes,
        authorizer: Authorizer,
    ) -> Result<Response<Full<Bytes>>, GatewayError>;
}

/// Storage client proxying to the service over HTTP.
pub struct HttpStorageClient {
    base_url: String,
    version: String,
    http: reqwest::Client,
}

impl HttpStorageClient {
    pub fn new(base_url: &str, version: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            version: version.to_string(),
            http: reqwest::Client::new(),
        }
    }

    fn account_url(&self, account: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.version, account)
    }

    async fn proxy(
        &self,
        method: Method,
        url: String,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<Response<Full<Bytes>>, GatewayError> {
        let upstream = self
            .http
            .request(method, url)
            .headers(headers)
            .body(body)
            .send()
            .await?;
        let status = upstream.status();
        let mut response_headers = upstream.headers().clone();
        strip_framing_headers(&mut response_headers);
        let payload = upstream.bytes().await?;
        let mut response = Response::new(Full::new(payload));
        *response.status_mut() = status;
        *response.headers_mut() = response_headers;
        Ok(response)
    }
}

#[async_trait::async_trait]
impl StorageClient for HttpStorageClient {
    async fn head_account(&self, account: &str) -> Result<AccountMetadata, GatewayError> {
        let response = self.http.head(self.account_url(account)).send().await?;
        Ok(AccountMetadata {
            status: response.status(),
            headers: response.headers().clone(),
        })
    }

    async fn post_account(
        &self,
        account: &str,
        headers: HeaderMap,
    ) -> Result<Response<Full<Bytes>>, GatewayError> {
        self.proxy(
            Method::POST,
            self.account_url(account),
            headers,
            Bytes::new(),
        )
        .await
    }

    async fn container_acl(
        &self,
        account: &str,
        container: &str,
    ) -> Result<Vec<String>, GatewayError> {
        let url = format!("{}/{}/{}/{}", self.base_url, self.version, account, container);
        let response = self.http.head(url).send().await?;
        if !response.status().is_success() {
            return Ok(Vec::new());
        }
        Ok(parse_acl(
            response
                .headers()
                .get(CONTAINER_READ_ACL)
                .and_then(|value| value.to_str().ok()),
        ))
    }

    async fn forward(
        &self,
        parts: http::request::Parts,
        body: Bytes,
        authorizer: Authorizer,
    ) -> Result<Response<Full<Bytes>>, GatewayError> {
        let target = RequestTarget::parse(parts.uri.path())?;
        let acl = match (&target.account, &target.container) {
            (Some(account), Some(container)) => self.container_acl(account, container).await?,
            _ => Vec::new(),
        };
        let execute_trigger = parts.headers.contains_key(X_EXECUTE_JOB);
        match authorizer.authorize(&target, &parts.method, acl, execute_trigger) {
            Decision::Denied(DenialReason::Unauthenticated) => Err(GatewayError::Unauthenticated),
            Decision::Denied(DenialReason::Forbidden) => Err(GatewayError::Forbidden),
            Decision::Granted { owner } => {
                let mut headers = parts.headers.clone();
                strip_hop_headers(&mut headers);
                if owner {
                    headers.insert(
                        HeaderName::from_static(X_STORAGE_OWNER),
                        HeaderValue::from_static("true"),
                    );
                }
                let mut url = format!("{}{}", self.base_url, parts.uri.path());
                if let Some(query) = parts.uri.query() {
                    url.push('?');
                    url.push_str(query);
                }
                debug!(method = %parts.method, url = %url, owner, "Forwarding request downstream");
                self.proxy(parts.method.clone(), url, headers, body).await
            }
        }
    }
}

/// reqwest supplies its own framing; a stale `Host` or length would fight
/// with it.
fn strip_hop_headers(headers: &mut HeaderMap) {
    headers.remove(header::HOST);
    headers.remove(header::CONTENT_LENGTH);
    headers.remove(header::CONNECTION);
}

fn strip_framing_headers(headers: &mut HeaderMap) {
    headers.remove(header::TRANSFER_ENCODING);
    headers.remove(header::CONTENT_LENGTH);
    headers.remove(header::CONNECTION);
}
