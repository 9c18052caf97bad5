use clap::Parser;

#[derive(Parser, Debug, Clone)]
pub struct Cli {
    #[clap(long, default_value = "127.0.0.1", env = "PORTCULLIS_HOST")]
    pub host: String,

    #[clap(short, long, default_value = "8085", env = "PORTCULLIS_PORT")]
    pub port: u16,

    /// Public domain the session cookie is scoped to.
    #[clap(long, env = "PORTCULLIS_SERVICE_DOMAIN")]
    pub service_domain: String,

    /// Public base URL; defaults to https://<service-domain>.
    #[clap(long, env = "PORTCULLIS_SERVICE_ENDPOINT")]
    pub service_endpoint: Option<String>,

    /// Base URL of the fronted object-storage service.
    #[clap(long, env = "PORTCULLIS_STORAGE_URL")]
    pub storage_url: String,

    #[clap(long, default_value = "v1", env = "PORTCULLIS_STORAGE_VERSION")]
    pub storage_version: String,

    /// Namespace prefix carried by identities and their accounts.
    #[clap(long, default_value = "g_", env = "PORTCULLIS_ACCOUNT_PREFIX")]
    pub account_prefix: String,

    #[clap(long, env = "PORTCULLIS_CLIENT_ID")]
    pub client_id: String,

    #[clap(long, env = "PORTCULLIS_CLIENT_SECRET")]
    pub client_secret: String,

    /// Comma-separated scopes requested at login.
    #[clap(long, default_value = "openid,email", env = "PORTCULLIS_SCOPE")]
    pub scope: String,

    #[clap(long, env = "PORTCULLIS_PROVIDER_AUTH_ENDPOINT")]
    pub provider_auth_endpoint: String,

    #[clap(long, env = "PORTCULLIS_PROVIDER_TOKEN_ENDPOINT")]
    pub provider_token_endpoint: String,

    #[clap(long, env = "PORTCULLIS_PROVIDER_USERINFO_ENDPOINT")]
    pub provider_userinfo_endpoint: String,
}
