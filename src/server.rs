//! HTTP server setup and lifecycle management.
//!
//! Wires the gateway's collaborators together from the CLI configuration
//! and runs the accept loop. TLS termination belongs to the deployment's
//! edge, not this process.

use std::net::SocketAddr;
use std::sync::Arc;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::authz::DecisionEngine;
use crate::cache::{CacheClient, MemoryCache, TokenCache};
use crate::cli::Cli;
use crate::constants::LOGIN_PATH;
use crate::error::GatewayError;
use crate::gateway::Gateway;
use crate::oauth::{LoginCoordinator, ProviderClient, ProviderConfig, ServiceSettings};
use crate::sharing::ShareManager;
use crate::storage::{HttpStorageClient, StorageClient};

pub struct Server {
    cli: Cli,
}

impl Server {
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Server bound to an ephemeral local port, for tests.
    pub async fn test_mode(mut cli: Cli) -> Result<(Self, u16), GatewayError> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        drop(listener);
        cli.host = "127.0.0.1".to_string();
        cli.port = port;
        Ok((Self::new(cli), port))
    }

    fn build_gateway(
        &self,
        storage: Arc<dyn StorageClient>,
        cache_backend: Option<Arc<dyn CacheClient>>,
    ) -> Result<Gateway, GatewayError> {
        let cache = TokenCache::new(cache_backend, &self.cli.account_prefix)?;
        let endpoint = self
            .cli
            .service_endpoint
            .clone()
            .unwrap_or_else(|| format!("https://{}", self.cli.service_domain))
            .trim_end_matches('/')
            .to_string();

        let provider = ProviderClient::new(ProviderConfig {
            auth_endpoint: self.cli.provider_auth_endpoint.clone(),
            token_endpoint: self.cli.provider_token_endpoint.clone(),
            userinfo_endpoint: self.cli.provider_userinfo_endpoint.clone(),
            client_id: self.cli.client_id.clone(),
            client_secret: self.cli.client_secret.clone(),
            scope: self
                .cli
                .scope
                .split(',')
                .map(|scope| scope.trim().to_string())
                .filter(|scope| !scope.is_empty())
                .collect(),
            redirect_uri: format!("{endpoint}{LOGIN_PATH}"),
        });
        let settings = ServiceSettings {
            endpoint,
            domain: self.cli.service_domain.clone(),
            version: self.cli.storage_version.clone(),
            account_prefix: self.cli.account_prefix.clone(),
        };

        let engine = Arc::new(DecisionEngine::new(&self.cli.account_prefix));
        let coordinator =
            LoginCoordinator::new(provider, cache.clone(), storage.clone(), settings);
        let share = ShareManager::new(storage.clone());
        Ok(Gateway::new(coordinator, cache, engine, share, storage))
    }

    pub async fn run(self) -> Result<(), GatewayError> {
        let addr = format!("{}:{}", self.cli.host, self.cli.port);
        let addr: SocketAddr = addr.parse().map_err(|err| {
            GatewayError::Configuration(format!("Failed to parse address '{addr}': {err}"))
        })?;

        let storage: Arc<dyn StorageClient> = Arc::new(HttpStorageClient::new(
            &self.cli.storage_url,
            &self.cli.storage_version,
        ));
        let backend: Arc<dyn CacheClient> = Arc::new(MemoryCache::default());
        let gateway = Arc::new(self.build_gateway(storage, Some(backend))?);

        let listener = TcpListener::bind(addr).await?;
        info!(
            address = %addr,
            storage_url = %self.cli.storage_url,
            service_domain = %self.cli.service_domain,
            "Starting portcullis..."
        );

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            debug!(remote_addr = %remote_addr, "Accepted new connection");

            let io = TokioIo::new(stream);
            let gateway = gateway.clone();

            tokio::task::spawn(async move {
                if let Err(err) = http1::Builder::new()
                    .serve_connection(
                        io,
                        service_fn(move |req| {
                            let gateway = Arc::clone(&gateway);
                            async move { gateway.handle_request(req).await }
                        }),
                    )
                    .await
                {
                    debug!(error = %err, remote_addr = %remote_addr, "Error serving connection");
                }
            });
        }
    }
}
