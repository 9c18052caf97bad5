//! Federated login: authorization-code and refresh exchanges with the
//! identity provider, and the session-minting flow built on them.

use std::sync::Arc;

use http::header::{LOCATION, SET_COOKIE};
use http::{HeaderMap, HeaderName, HeaderValue, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Bytes;
use serde::Deserialize;
use tracing::{info, warn};

use crate::cache::TokenCache;
use crate::constants::{
    DEFAULT_TOKEN_TTL_SECS, LOGOUT_MARKER, USERDATA_META_HEADER, X_AUTH_TOKEN, X_STORAGE_TOKEN,
    X_STORAGE_URL,
};
use crate::cookie::{SessionCookie, extract_session_token};
use crate::error::GatewayError;
use crate::identity::Identity;
use crate::storage::{AccountMetadata, StorageClient};

/// Identity-provider endpoints and client credentials.
#[derive(Clone, Debug)]
pub struct ProviderConfig {
    pub auth_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub client_id: String,
    pub client_secret: String,
    pub scope: Vec<String>,
    pub redirect_uri: String,
}

/// Token-endpoint response; fields a provider may omit stay optional.
#[derive(Debug, Deserialize)]
pub struct TokenGrant {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
}

/// OAuth2 client for the configured identity provider.
pub struct ProviderClient {
    config: ProviderConfig,
    http: reqwest::Client,
}

impl ProviderClient {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Authorization-endpoint URL the browser is sent to.
    ///
    /// `access_type=offline` asks the provider for a refresh token.
    pub fn authorize_url(&self, state: Option<&str>) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        query
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("scope", &self.config.scope.join(" "))
            .append_pair("access_type", "offline");
        if let Some(state) = state {
            query.append_pair("state", state);
        }
        format!("{}?{}", self.config.auth_endpoint, query.finish())
    }

    pub async fn exchange_code(&self, code: &str) -> Result<TokenGrant, GatewayError> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ])
        .await
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, GatewayError> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenGrant, GatewayError> {
        let mut form: Vec<(&str, &str)> = vec![
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        form.extend_from_slice(params);
        let response = self
            .http
            .post(&self.config.token_endpoint)
            .form(&form)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(GatewayError::Provider(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }

    /// Provider's profile payload for the bearer token.
    pub async fn userinfo(&self, access_token: &str) -> Result<serde_json::Value, GatewayError> {
        let response = self
            .http
            .get(&self.config.userinfo_endpoint)
            .bearer_auth(access_token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(GatewayError::Provider(format!(
                "userinfo endpoint returned {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }
}

/// Service-level settings the login flow needs beyond the provider.
#[derive(Clone, Debug)]
pub struct ServiceSettings {
    /// Public base URL of the service, no trailing slash.
    pub endpoint: String,
    /// Cookie domain; loopback-style values suppress the attribute.
    pub domain: String,
    /// Storage API version segment.
    pub version: String,
    /// Identity namespace prefix, e.g. `g_`.
    pub account_prefix: String,
}

/// Drives the code/refresh exchanges against the provider and mints the
/// session: cache entry, cookie, and redirect.
pub struct LoginCoordinator {
    provider: ProviderClient,
    cache: TokenCache,
    storage: Arc<dyn StorageClient>,
    settings: ServiceSettings,
}

impl LoginCoordinator {
    pub fn new(
        provider: ProviderClient,
        cache: TokenCache,
        storage: Arc<dyn StorageClient>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            provider,
            cache,
            storage,
            settings,
        }
    }

    /// First leg: send the browser to the provider, echoing `state` back
    /// through the round trip.
    pub fn begin_login(&self, state: Option<&str>) -> Result<Response<Full<Bytes>>, GatewayError> {
        redirect(&self.provider.authorize_url(state), Vec::new(), None)
    }

    /// Second leg: the provider called back with `code`, or the caller
    /// asked to log out.
    pub async fn complete_login(
        &self,
        request_headers: &HeaderMap,
        code: &str,
        state: Option<&str>,
    ) -> Result<Response<Full<Bytes>>, GatewayError> {
        if code.contains(LOGOUT_MARKER) {
            return self.logout(request_headers, state).await;
        }
        let grant = match self.provider.exchange_code(code).await {
            Ok(grant) => grant,
            Err(err) => {
                warn!(error = %err, "Authorization-code exchange failed");
                return Err(GatewayError::Unauthenticated);
            }
        };
        // A refresh grant means the provider handed out a short-lived
        // pair; the refreshed access token is the canonical one and the
        // initial one is discarded.
        let grant = match grant.refresh_token.as_deref() {
            Some(refresh_token) => match self.provider.refresh(refresh_token).await {
                Ok(grant) => grant,
                Err(err) => {
                    warn!(error = %err, "Refresh-token exchange failed");
                    return Err(GatewayError::Unauthenticated);
                }
            },
            None => grant,
        };
        let Some(token) = grant.access_token else {
            return Err(GatewayError::Unauthenticated);
        };

        let profile = match self.provider.userinfo(&token).await {
            Ok(profile) => profile,
            Err(err) => {
                warn!(error = %err, "Userinfo lookup failed");
                return Err(GatewayError::Forbidden);
            }
        };
        let Some(provider_user_id) = provider_user_id(&profile) else {
            return Err(GatewayError::Forbidden);
        };
        let identity =
            Identity::from_provider_id(&self.settings.account_prefix, &provider_user_id);

        let ttl = grant.expires_in.unwrap_or(DEFAULT_TOKEN_TTL_SECS);
        self.cache.put(&token, &identity, ttl).await?;

        // Provisioning happens out-of-band; the flow only verifies the
        // account exists.
        let metadata = match self.storage.head_account(identity.as_str()).await {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!(identity = %identity, error = %err, "Account check failed");
                return Err(GatewayError::NotFound(format!("no account for {identity}")));
            }
        };
        if !metadata.status.is_success() {
            return Err(GatewayError::NotFound(format!("no account for {identity}")));
        }
        if !metadata.has_meta(USERDATA_META_HEADER) {
            // One-time enrichment; failure never blocks the login.
            if let Err(err) = self.enroll_userdata(&identity, &metadata, &profile).await {
                warn!(identity = %identity, error = %err, "Account userdata enrichment failed");
            }
        }

        let cookie = SessionCookie::establish(&token, &self.settings.domain, ttl);
        let location = format!(
            "{}{}?account={}",
            self.settings.endpoint,
            state.unwrap_or("/"),
            identity,
        );
        let storage_url = format!(
            "{}/{}/{}",
            self.settings.endpoint, self.settings.version, identity
        );
        info!(identity = %identity, "Login established");
        redirect(
            &location,
            vec![
                (HeaderName::from_static(X_AUTH_TOKEN), token.clone()),
                (HeaderName::from_static(X_STORAGE_TOKEN), token),
                (HeaderName::from_static(X_STORAGE_URL), storage_url),
            ],
            Some(cookie),
        )
    }

    async fn logout(
        &self,
        request_headers: &HeaderMap,
        state: Option<&str>,
    ) -> Result<Response<Full<Bytes>>, GatewayError> {
        if let Some(token) = extract_session_token(request_headers) {
            self.cache.delete(&token).await?;
        }
        let location = format!(
            "{}{}?account=logout",
            self.settings.endpoint,
            state.unwrap_or("/"),
        );
        info!("Session cleared");
        redirect(
            &location,
            Vec::new(),
            Some(SessionCookie::clear(&self.settings.domain)),
        )
    }

    async fn enroll_userdata(
        &self,
        identity: &Identity,
        metadata: &AccountMetadata,
        profile: &serde_json::Value,
    ) -> Result<(), GatewayError> {
        let mut headers = metadata.account_meta();
        headers.insert(
            HeaderName::from_static(USERDATA_META_HEADER),
            HeaderValue::from_str(&serde_json::to_string(profile)?)?,
        );
        self.storage.post_account(identity.as_str(), headers).await?;
        Ok(())
    }
}

/// Providers report the user id as a string or a bare number.
fn provider_user_id(profile: &serde_json::Value) -> Option<String> {
    match profile.get("id")? {
        serde_json::Value::String(id) => Some(id.clone()),
        serde_json::Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

fn redirect(
    location: &str,
    headers: Vec<(HeaderName, String)>,
    cookie: Option<SessionCookie>,
) -> Result<Response<Full<Bytes>>, GatewayError> {
    let mut builder = Response::builder()
        .status(StatusCode::FOUND)
        .header(LOCATION, location);
    for (name, value) in headers {
        builder = builder.header(name, value);
    }
    if let Some(cookie) = cookie {
        builder = builder.header(SET_COOKIE, cookie.header_value());
    }
    builder
        .body(Full::new(Bytes::new()))
        .map_err(GatewayError::from)
}
