use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::warn;

use konubu_types::api::Claims;

use crate::routes::AppStateInner;

/// Header carrying the shared secret of the event delivery collaborator.
pub const TRIGGER_SECRET_HEADER: &str = "x-trigger-secret";

/// Extract and validate JWT from Authorization header.
pub async fn require_auth<P>(
    State(state): State<Arc<AppStateInner<P>>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| StatusCode::UNAUTHORIZED)?;

    req.extensions_mut().insert(token_data.claims);
    Ok(next.run(req).await)
}

/// Only the event delivery collaborator may post lifecycle events.
pub async fn require_trigger_secret<P>(
    State(state): State<Arc<AppStateInner<P>>>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let presented = req
        .headers()
        .get(TRIGGER_SECRET_HEADER)
        .and_then(|v| v.to_str().ok());

    if presented != Some(state.trigger_secret.as_str()) {
        warn!("Rejected trigger delivery with missing or wrong secret");
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}
