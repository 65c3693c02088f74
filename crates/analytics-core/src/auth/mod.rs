//! API-key based authentication and authorization: hashing/generation lives
//! in `domain::api_key`, persistence here in `store`, and the actix
//! middleware plus the `AuthContext` extractor it populates in
//! `middleware`/`context`.

pub mod context;
pub mod middleware;
pub mod store;

pub use context::AuthContext;
pub use middleware::AuthMiddleware;
pub use store::{ApiKeyStore, ApiKeyUpdate, InMemoryApiKeyStore, PostgresApiKeyStore};
