use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::account::{Actor, Role, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub typ: TokenKind,
    /// Token id; refresh tokens are tracked by it
    pub jti: Uuid,
    pub iat: usize,
    pub exp: usize,
}

impl Claims {
    pub fn user_id(&self) -> Uuid {
        self.sub
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn actor(&self) -> Actor {
        Actor::new(self.sub, self.role)
    }
}

/// Persisted refresh-token row
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshTokenRecord {
    pub jti: Uuid,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    #[schema(example = "Ada Lovelace")]
    pub name: String,
    #[schema(example = "ada@example.edu")]
    pub email: String,
    #[schema(example = "password123")]
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "ada@example.edu")]
    pub email: String,
    #[schema(example = "password123")]
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Login / register result
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthSession {
    pub user: User,
    pub tokens: TokenPair,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_wire_shape() {
        let now = Utc::now();
        let session = AuthSession {
            user: User {
                id: Uuid::new_v4(),
                email: "ada@example.edu".into(),
                name: "Ada".into(),
                role: Role::Student,
                email_verified: false,
                created_at: now,
                updated_at: now,
            },
            tokens: TokenPair {
                access_token: "a".into(),
                refresh_token: "r".into(),
            },
        };
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["tokens"]["accessToken"], "a");
        assert_eq!(json["tokens"]["refreshToken"], "r");
        assert_eq!(json["user"]["role"], "STUDENT");
        assert_eq!(json["user"]["emailVerified"], false);
    }
}
