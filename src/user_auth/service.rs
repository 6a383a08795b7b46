use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use std::sync::Arc;
use uuid::Uuid;

use super::models::{
    AuthSession, Claims, LoginRequest, RefreshTokenRecord, RegisterRequest, TokenKind, TokenPair,
};
use crate::account::{DisplayName, EmailAddress, NewUser, Role, User, check_password};
use crate::config::AuthConfig;
use crate::db::LibraryStore;
use crate::error::{LibraryError, LibraryResult};

const INVALID_CREDENTIALS: &str = "Invalid email or password";
const INVALID_REFRESH: &str = "Invalid or expired refresh token";

pub struct UserAuthService {
    store: Arc<dyn LibraryStore>,
    config: AuthConfig,
}

impl UserAuthService {
    pub fn new(store: Arc<dyn LibraryStore>, config: AuthConfig) -> Self {
        Self { store, config }
    }

    /// Register a new STUDENT account and open a session for it
    pub async fn register(&self, req: RegisterRequest) -> LibraryResult<AuthSession> {
        let email = EmailAddress::new(&req.email)?;
        let name = DisplayName::new(&req.name)?;
        check_password(&req.password)?;

        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(req.password.as_bytes(), &salt)
            .map_err(|e| LibraryError::Internal(format!("Hashing failed: {}", e)))?
            .to_string();

        let user = self
            .store
            .insert_user(&NewUser {
                id: Uuid::new_v4(),
                email: email.into_inner(),
                name: name.into_inner(),
                password_hash,
                role: Role::Student,
            })
            .await
            .map_err(|e| match e {
                LibraryError::Conflict(_) => {
                    LibraryError::Conflict("Email already registered".to_string())
                }
                other => other,
            })?;

        tracing::info!(user_id = %user.id, "User registered");
        let tokens = self.issue_tokens(&user).await?;
        Ok(AuthSession { user, tokens })
    }

    /// Login user and issue an access/refresh pair
    pub async fn login(&self, req: LoginRequest) -> LibraryResult<AuthSession> {
        let unauthorized = || LibraryError::Unauthorized(INVALID_CREDENTIALS.to_string());

        let email = EmailAddress::new(&req.email).map_err(|_| unauthorized())?;
        let creds = self
            .store
            .find_credentials(email.as_str())
            .await?
            .ok_or_else(unauthorized)?;

        let parsed_hash = PasswordHash::new(&creds.password_hash)
            .map_err(|e| LibraryError::Internal(format!("Invalid hash format: {}", e)))?;
        Argon2::default()
            .verify_password(req.password.as_bytes(), &parsed_hash)
            .map_err(|_| unauthorized())?;

        tracing::info!(user_id = %creds.user.id, "User logged in");
        let tokens = self.issue_tokens(&creds.user).await?;
        Ok(AuthSession {
            user: creds.user,
            tokens,
        })
    }

    /// Rotate a refresh token. The presented `jti` is revoked and a new one
    /// stored in the same step, so a token can be redeemed at most once.
    pub async fn refresh(&self, refresh_token: &str) -> LibraryResult<TokenPair> {
        let claims = self
            .decode(refresh_token, TokenKind::Refresh)
            .map_err(|_| LibraryError::Unauthorized(INVALID_REFRESH.to_string()))?;

        // Role may have changed since the token was minted
        let user = self
            .store
            .find_user(claims.sub)
            .await?
            .ok_or_else(|| LibraryError::Unauthorized(INVALID_REFRESH.to_string()))?;

        let (refresh_token, next) = self.mint_refresh(&user)?;
        if !self.store.rotate_refresh_token(claims.jti, &next).await? {
            tracing::warn!(user_id = %user.id, jti = %claims.jti, "Refresh token reuse rejected");
            return Err(LibraryError::Unauthorized(
                "Refresh token has been revoked".to_string(),
            ));
        }

        tracing::debug!(user_id = %user.id, "Session refreshed");
        Ok(TokenPair {
            access_token: self.mint_access(&user)?,
            refresh_token,
        })
    }

    /// Revoke every refresh token of the caller. Best effort: a store
    /// failure is logged, never surfaced.
    pub async fn logout(&self, user_id: Uuid) -> LibraryResult<()> {
        match self.store.revoke_user_refresh_tokens(user_id).await {
            Ok(revoked) => tracing::info!(user_id = %user_id, revoked, "User logged out"),
            Err(e) => tracing::warn!(user_id = %user_id, "Failed to revoke refresh tokens: {}", e),
        }
        Ok(())
    }

    pub async fn me(&self, user_id: Uuid) -> LibraryResult<User> {
        self.store
            .find_user(user_id)
            .await?
            .ok_or_else(|| LibraryError::not_found("User"))
    }

    /// Verify an access token presented as a bearer credential
    pub fn verify_access_token(&self, token: &str) -> LibraryResult<Claims> {
        self.decode(token, TokenKind::Access)
            .map_err(|_| LibraryError::Unauthorized("Invalid or expired token".to_string()))
    }

    fn decode(&self, token: &str, kind: TokenKind) -> Result<Claims, jsonwebtoken::errors::Error> {
        let decoding_key = DecodingKey::from_secret(self.config.jwt_secret.as_bytes());
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        let claims = decode::<Claims>(token, &decoding_key, &validation)?.claims;
        if claims.typ != kind {
            return Err(jsonwebtoken::errors::ErrorKind::InvalidToken.into());
        }
        Ok(claims)
    }

    fn sign(&self, user: &User, kind: TokenKind, ttl_secs: i64) -> LibraryResult<(String, Claims)> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id,
            role: user.role,
            typ: kind,
            jti: Uuid::new_v4(),
            iat: now.timestamp() as usize,
            exp: (now + Duration::seconds(ttl_secs)).timestamp() as usize,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| LibraryError::Internal(format!("Failed to generate token: {}", e)))?;
        Ok((token, claims))
    }

    fn mint_access(&self, user: &User) -> LibraryResult<String> {
        self.sign(user, TokenKind::Access, self.config.access_ttl_secs)
            .map(|(token, _)| token)
    }

    fn mint_refresh(&self, user: &User) -> LibraryResult<(String, RefreshTokenRecord)> {
        let (token, claims) = self.sign(user, TokenKind::Refresh, self.config.refresh_ttl_secs)?;
        let record = RefreshTokenRecord {
            jti: claims.jti,
            user_id: user.id,
            expires_at: Utc::now() + Duration::seconds(self.config.refresh_ttl_secs),
        };
        Ok((token, record))
    }

    async fn issue_tokens(&self, user: &User) -> LibraryResult<TokenPair> {
        let (refresh_token, record) = self.mint_refresh(user)?;
        self.store.insert_refresh_token(&record).await?;
        Ok(TokenPair {
            access_token: self.mint_access(user)?,
            refresh_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, UserStore};

    fn service() -> (Arc<MemoryStore>, UserAuthService) {
        let store = Arc::new(MemoryStore::new());
        let config = AuthConfig {
            jwt_secret: "test-secret".into(),
            access_ttl_secs: 60,
            refresh_ttl_secs: 3600,
        };
        (store.clone(), UserAuthService::new(store, config))
    }

    fn register_req(email: &str) -> RegisterRequest {
        RegisterRequest {
            name: "Ada Lovelace".into(),
            email: email.into(),
            password: "password123".into(),
        }
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let (_, auth) = service();
        let session = auth.register(register_req("Ada@Example.edu")).await.unwrap();
        assert_eq!(session.user.email, "ada@example.edu");
        assert_eq!(session.user.role, Role::Student);

        let claims = auth.verify_access_token(&session.tokens.access_token).unwrap();
        assert_eq!(claims.sub, session.user.id);
        assert_eq!(claims.typ, TokenKind::Access);

        let login = auth
            .login(LoginRequest {
                email: "ada@example.edu".into(),
                password: "password123".into(),
            })
            .await
            .unwrap();
        assert_eq!(login.user.id, session.user.id);

        let err = auth
            .login(LoginRequest {
                email: "ada@example.edu".into(),
                password: "wrong-password".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), INVALID_CREDENTIALS);
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let (_, auth) = service();
        auth.register(register_req("ada@example.edu")).await.unwrap();
        let err = auth.register(register_req("ADA@example.edu")).await.unwrap_err();
        assert!(matches!(err, LibraryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_refresh_rotates_once() {
        let (_, auth) = service();
        let session = auth.register(register_req("ada@example.edu")).await.unwrap();

        let rotated = auth.refresh(&session.tokens.refresh_token).await.unwrap();
        assert_ne!(rotated.refresh_token, session.tokens.refresh_token);

        // The old token is spent
        let err = auth.refresh(&session.tokens.refresh_token).await.unwrap_err();
        assert!(matches!(err, LibraryError::Unauthorized(_)));

        // The new one works exactly once as well
        auth.refresh(&rotated.refresh_token).await.unwrap();
        assert!(auth.refresh(&rotated.refresh_token).await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_refresh_with_same_token_has_one_winner() {
        let (_, auth) = service();
        let auth = Arc::new(auth);
        let session = auth.register(register_req("ada@example.edu")).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let auth = auth.clone();
            let token = session.tokens.refresh_token.clone();
            handles.push(tokio::spawn(async move { auth.refresh(&token).await }));
        }
        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn test_access_token_is_not_a_refresh_token() {
        let (_, auth) = service();
        let session = auth.register(register_req("ada@example.edu")).await.unwrap();
        assert!(auth.refresh(&session.tokens.access_token).await.is_err());
        assert!(auth.verify_access_token(&session.tokens.refresh_token).is_err());
        assert!(auth.verify_access_token("not-a-jwt").is_err());
    }

    #[tokio::test]
    async fn test_logout_revokes_refresh_token() {
        let (_, auth) = service();
        let session = auth.register(register_req("ada@example.edu")).await.unwrap();

        // A second device holds a rotated pair of the same user
        let other = auth.refresh(&session.tokens.refresh_token).await.unwrap();
        let user_id = auth.verify_access_token(&other.access_token).unwrap().user_id();

        auth.logout(user_id).await.unwrap();
        assert!(auth.refresh(&other.refresh_token).await.is_err());

        // Nothing left to revoke is still fine
        auth.logout(user_id).await.unwrap();
        auth.logout(Uuid::new_v4()).await.unwrap();
    }

    #[tokio::test]
    async fn test_refresh_picks_up_role_change() {
        let (store, auth) = service();
        let session = auth.register(register_req("ada@example.edu")).await.unwrap();
        let audit = crate::audit::AuditEntry::new(
            crate::audit::AuditEntity::User,
            session.user.id,
            crate::audit::AuditAction::UpdateRole,
            session.user.id,
            serde_json::json!({}),
        );
        store
            .update_user_role(session.user.id, Role::Staff, &audit)
            .await
            .unwrap();

        let pair = auth.refresh(&session.tokens.refresh_token).await.unwrap();
        let claims = auth.verify_access_token(&pair.access_token).unwrap();
        assert_eq!(claims.role, Role::Staff);
        assert_eq!(auth.me(session.user.id).await.unwrap().role, Role::Staff);
    }
}
