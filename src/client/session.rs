//! Login response normalization
//!
//! Accepted shapes, bare or under `data`:
//! `{tokens: {accessToken, refreshToken}, user}`,
//! `{accessToken, refreshToken, user}` and `{access_token, refresh_token, user}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::error::GatewayError;
use crate::account::Role;
use crate::user_auth::TokenPair;

#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// The signed-in user as far as the client cares
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SessionUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct LoginSession {
    pub user: SessionUser,
    pub tokens: TokenPair,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LoginPayload {
    Nested {
        tokens: TokenPair,
        user: SessionUser,
    },
    CamelCase {
        #[serde(rename = "accessToken")]
        access_token: String,
        #[serde(rename = "refreshToken")]
        refresh_token: String,
        user: SessionUser,
    },
    SnakeCase {
        access_token: String,
        refresh_token: String,
        user: SessionUser,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LoginEnvelope {
    Wrapped { data: LoginPayload },
    Bare(LoginPayload),
}

impl From<LoginPayload> for LoginSession {
    fn from(payload: LoginPayload) -> Self {
        match payload {
            LoginPayload::Nested { tokens, user } => LoginSession { user, tokens },
            LoginPayload::CamelCase {
                access_token,
                refresh_token,
                user,
            }
            | LoginPayload::SnakeCase {
                access_token,
                refresh_token,
                user,
            } => LoginSession {
                user,
                tokens: TokenPair {
                    access_token,
                    refresh_token,
                },
            },
        }
    }
}

pub fn normalize_login(body: Value) -> Result<LoginSession, GatewayError> {
    let envelope: LoginEnvelope = serde_json::from_value(body)
        .map_err(|_| GatewayError::Decode("Unrecognized login response shape".to_string()))?;
    Ok(match envelope {
        LoginEnvelope::Wrapped { data } | LoginEnvelope::Bare(data) => data.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user() -> Value {
        json!({
            "id": "6f1c0a52-0d43-4f7f-9a1c-7d7b5b0c2e11",
            "email": "ada@uni.edu",
            "name": "Ada",
            "role": "STUDENT",
            "createdAt": "2026-01-01T00:00:00Z"
        })
    }

    #[test]
    fn test_server_envelope() {
        let body = json!({
            "code": 0,
            "msg": "ok",
            "data": { "user": user(), "tokens": { "accessToken": "a", "refreshToken": "r" } }
        });
        let session = normalize_login(body).unwrap();
        assert_eq!(session.tokens.access_token, "a");
        assert_eq!(session.tokens.refresh_token, "r");
        assert_eq!(session.user.role, Role::Student);
    }

    #[test]
    fn test_flat_shapes() {
        let camel = json!({ "accessToken": "a1", "refreshToken": "r1", "user": user() });
        assert_eq!(normalize_login(camel).unwrap().tokens.access_token, "a1");

        let snake = json!({ "data": { "access_token": "a2", "refresh_token": "r2", "user": user() } });
        let session = normalize_login(snake).unwrap();
        assert_eq!(session.tokens.refresh_token, "r2");
        assert_eq!(session.user.email, "ada@uni.edu");
    }

    #[test]
    fn test_unknown_shape_fails() {
        let body = json!({ "data": { "token": "a", "user": user() } });
        assert!(matches!(normalize_login(body), Err(GatewayError::Decode(_))));

        let no_user = json!({ "accessToken": "a", "refreshToken": "r" });
        assert!(normalize_login(no_user).is_err());
    }
}
