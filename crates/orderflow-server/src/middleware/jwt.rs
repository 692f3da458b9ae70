//! Bearer-token authentication.
//!
//! Validates an HS256 JWT from the `Authorization` header, turns its claims
//! into an [`Actor`] carrying the caller's IP and user agent, and inserts it
//! as a request extension for the handlers.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::Response;
use axum::Extension;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use orderflow_core::error::OrderFlowError;
use orderflow_core::principal::{Actor, JwtClaims, RequestMeta};

use crate::error::AppError;

#[derive(Clone)]
pub struct JwtConfig {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtConfig {
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn decode(&self, token: &str) -> Result<JwtClaims, OrderFlowError> {
        decode::<JwtClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| OrderFlowError::Unauthorized(format!("invalid token: {e}")))
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, OrderFlowError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| OrderFlowError::Unauthorized("missing Authorization header".into()))?
        .to_str()
        .map_err(|_| OrderFlowError::Unauthorized("malformed Authorization header".into()))?;
    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| OrderFlowError::Unauthorized("expected a Bearer token".into()))
}

/// Caller address: first `X-Forwarded-For` hop, else the socket peer.
fn client_ip(req: &Request) -> Option<String> {
    req.headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
}

pub async fn jwt_auth(
    Extension(config): Extension<JwtConfig>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = config.decode(bearer_token(req.headers())?)?;
    let meta = RequestMeta {
        ip: client_ip(&req),
        user_agent: req
            .headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    };
    let actor = Actor::from_jwt_claims(&claims)?.with_request(meta);
    tracing::debug!(user_id = %actor.user_id, role = %actor.role, "authenticated");
    req.extensions_mut().insert(actor);
    Ok(next.run(req).await)
}
