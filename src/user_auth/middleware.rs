use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, header},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use super::models::Claims;
use crate::account::Role;
use crate::error::{LibraryError, LibraryResult};
use crate::gateway::state::AppState;

fn bearer_token(headers: &HeaderMap) -> LibraryResult<Option<&str>> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| LibraryError::Unauthorized("Invalid token format".to_string()))?;
    match value.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(Some(token.trim())),
        _ => Err(LibraryError::Unauthorized("Invalid token format".to_string())),
    }
}

/// Require a valid access token and inject its `Claims`
pub async fn jwt_auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, LibraryError> {
    let token = bearer_token(request.headers())?
        .ok_or_else(|| LibraryError::Unauthorized("Missing Authorization header".to_string()))?;
    let claims = state.auth.verify_access_token(token)?;
    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

/// Inject `Claims` when a valid bearer is present; anonymous otherwise
pub async fn optional_auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let claims = bearer_token(request.headers())
        .ok()
        .flatten()
        .and_then(|token| state.auth.verify_access_token(token).ok());
    if let Some(claims) = claims {
        request.extensions_mut().insert(claims);
    }
    next.run(request).await
}

/// Role guard for handlers behind `jwt_auth_middleware`
pub fn require_role(claims: &Claims, allowed: &[Role]) -> LibraryResult<()> {
    if allowed.contains(&claims.role) {
        Ok(())
    } else {
        Err(LibraryError::Forbidden(
            "You do not have permission to perform this action".to_string(),
        ))
    }
}

/// Route-level ADMIN guard; must run after `jwt_auth_middleware`
pub async fn require_admin(request: Request<Body>, next: Next) -> Result<Response, LibraryError> {
    let claims = request
        .extensions()
        .get::<Claims>()
        .ok_or_else(|| LibraryError::Unauthorized("Authentication required".to_string()))?;
    require_role(claims, &[Role::Admin])?;
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_bearer_parsing() {
        assert_eq!(bearer_token(&HeaderMap::new()).unwrap(), None);
        assert_eq!(bearer_token(&headers("Bearer abc")).unwrap(), Some("abc"));
        assert!(bearer_token(&headers("Basic abc")).is_err());
        assert!(bearer_token(&headers("Bearer ")).is_err());
    }

    #[test]
    fn test_require_role() {
        let claims = Claims {
            sub: uuid::Uuid::new_v4(),
            role: Role::Staff,
            typ: super::super::models::TokenKind::Access,
            jti: uuid::Uuid::new_v4(),
            iat: 0,
            exp: 0,
        };
        assert!(require_role(&claims, &[Role::Staff, Role::Admin]).is_ok());
        let err = require_role(&claims, &[Role::Admin]).unwrap_err();
        assert!(matches!(err, LibraryError::Forbidden(_)));
    }
}
