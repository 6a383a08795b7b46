//! API client with transparent token refresh

pub mod error;
pub mod gateway;
pub mod session;
pub mod token_store;
pub mod transport;

pub use error::{FORBIDDEN_MESSAGE, GatewayError, SERVER_ERROR_MESSAGE, login_redirect};
pub use gateway::AuthenticatedGateway;
pub use session::{Credentials, LoginSession, SessionUser, normalize_login};
pub use token_store::{CookieJar, FileCookieJar, MemoryCookieJar, TokenStore};
pub use transport::{ApiReply, ApiRequest, ReqwestTransport, Transport};
