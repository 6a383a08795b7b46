//! Handler helper functions and extractors
//!
//! This module contains shared utilities used by multiple handlers.

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};
use serde::Deserialize;
use std::convert::Infallible;
use std::net::SocketAddr;

use crate::catalog::AccessContext;
use crate::user_auth::Claims;

// ============================================================================
// Client address
// ============================================================================

/// Caller address: first `X-Forwarded-For` hop, then `X-Real-IP`, then the
/// socket peer. `None` when none of them is available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub Option<String>);

impl ClientIp {
    /// Limiter key; callers without a known address share one bucket
    pub fn key(&self) -> &str {
        self.0.as_deref().unwrap_or("unknown")
    }
}

fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    forwarded.or(real).map(str::to_string)
}

impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip = forwarded_ip(&parts.headers).or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        });
        Ok(ClientIp(ip))
    }
}

// ============================================================================
// Optional caller
// ============================================================================

/// Claims injected by `optional_auth_middleware`, if any
#[derive(Debug, Clone)]
pub struct MaybeClaims(pub Option<Claims>);

impl MaybeClaims {
    pub fn user_id(&self) -> Option<uuid::Uuid> {
        self.0.as_ref().map(Claims::user_id)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for MaybeClaims {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeClaims(parts.extensions.get::<Claims>().cloned()))
    }
}

/// IP and user agent recorded with a download
pub fn access_context(ip: ClientIp, headers: &HeaderMap) -> AccessContext {
    AccessContext {
        ip_address: ip.0,
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    }
}

// ============================================================================
// Query strings
// ============================================================================

/// `?limit=` for the showcase endpoints
#[derive(Debug, Default, Deserialize)]
pub struct LimitParams {
    pub limit: Option<i64>,
}

impl LimitParams {
    pub fn limit_or(&self, default: i64) -> i64 {
        self.limit
            .filter(|l| *l > 0)
            .map(|l| l.min(crate::pagination::MAX_LIMIT))
            .unwrap_or(default)
    }
}
