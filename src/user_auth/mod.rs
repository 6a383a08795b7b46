//! Stateless sessions: argon2 password hashes, HS256 access tokens and
//! rotating refresh tokens tracked by `jti`.

pub mod handlers;
pub mod middleware;
pub mod models;
pub mod service;

pub use middleware::{jwt_auth_middleware, optional_auth_middleware, require_admin, require_role};
pub use models::{
    AuthSession, Claims, LoginRequest, RefreshRequest, RefreshTokenRecord,
    RegisterRequest, TokenKind, TokenPair,
};
pub use service::UserAuthService;
