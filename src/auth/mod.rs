//! Authentication Module
//! Mission: Login, lockout, tokens and the dual-tier session lifecycle

pub mod credentials;
pub mod middleware;
pub mod models;
pub mod service;
pub mod session;
pub mod token;

pub use credentials::CredentialVerifier;
pub use middleware::auth_middleware;
pub use service::AuthService;
pub use session::{SessionMirror, SessionStore};
pub use token::TokenCodec;
