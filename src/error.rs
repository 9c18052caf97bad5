//! Centralized error types for the portcullis gateway.

use std::error::Error;

use http::{
    HeaderValue, Response, StatusCode,
    header::{CONTENT_TYPE, InvalidHeaderValue},
};
use http_body_util::Full;
use hyper::body::Bytes;
use serde::Serialize;
use serde_with::{DisplayFromStr, serde_as};

#[serde_as]
#[derive(Serialize, Debug)]
pub enum GatewayError {
    /// Deployment fault: surfaced at startup, never mapped to a client
    /// status.
    Configuration(String),
    Forbidden,
    HttpResponse(String),
    Hyper(String),
    Io(#[serde_as(as = "DisplayFromStr")] std::io::Error),
    NotFound(String),
    Provider(String),
    Reqwest(String),
    SerdeJson(#[serde_as(as = "DisplayFromStr")] serde_json::Error),
    Unauthenticated,
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayError::Configuration(msg) => write!(f, "Configuration Error: {}", msg),
            GatewayError::Forbidden => f.write_str("Forbidden"),
            GatewayError::HttpResponse(msg) => write!(f, "HTTP Response Error: {}", msg),
            GatewayError::Hyper(msg) => write!(f, "Hyper HTTP Error: {}", msg),
            GatewayError::Io(e) => write!(f, "IO Error: {:?}", e),
            GatewayError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            GatewayError::Provider(msg) => write!(f, "Identity Provider Error: {}", msg),
            GatewayError::Reqwest(msg) => write!(f, "Reqwest HTTP Error: {}", msg),
            GatewayError::SerdeJson(e) => write!(f, "Serde-JSON Error: {}", e),
            GatewayError::Unauthenticated => f.write_str("Unauthenticated"),
        }
    }
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Unauthenticated => StatusCode::UNAUTHORIZED,
            GatewayError::Forbidden => StatusCode::FORBIDDEN,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Provider(_) | GatewayError::Reqwest(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<InvalidHeaderValue> for GatewayError {
    fn from(err: InvalidHeaderValue) -> Self {
        GatewayError::HttpResponse(err.to_string())
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Reqwest(err.to_string())
    }
}

impl From<hyper::Error> for GatewayError {
    fn from(err: hyper::Error) -> Self {
        GatewayError::Hyper(err.to_string())
    }
}

impl From<http::Error> for GatewayError {
    fn from(err: http::Error) -> Self {
        GatewayError::HttpResponse(err.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::SerdeJson(err)
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        GatewayError::Io(err)
    }
}

impl From<GatewayError> for Box<dyn Error + Send + Sync> {
    fn from(val: GatewayError) -> Self {
        Box::new(std::io::Error::other(val.to_string()))
    }
}

impl From<GatewayError> for Response<Full<Bytes>> {
    fn from(err: GatewayError) -> Response<Full<Bytes>> {
        let mut res = Response::new(Full::new(Bytes::from(err.to_string())));
        *res.status_mut() = err.status();
        (*res.headers_mut()).append(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        res
    }
}
