//! Client identity extractor used to key the upload rate limiter.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;

use crate::error::AppError;
use crate::state::AppState;

const FORWARDED_FOR: &str = "x-forwarded-for";
const UNKNOWN_CLIENT: &str = "unknown";

/// Identity of the calling client.
///
/// The first `X-Forwarded-For` hop when the server is configured to trust
/// it, otherwise the peer IP. Requests with neither share the `unknown`
/// identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientId(pub String);

impl ClientId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromRequestParts<AppState> for ClientId {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(resolve(parts, state.config.trust_forwarded_for))
    }
}

fn resolve(parts: &Parts, trust_forwarded_for: bool) -> ClientId {
    if trust_forwarded_for {
        let forwarded = parts
            .headers
            .get(FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(client) = forwarded {
            return ClientId(client.to_string());
        }
    }

    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| ClientId(addr.ip().to_string()))
        .unwrap_or_else(|| ClientId(UNKNOWN_CLIENT.to_string()))
}
