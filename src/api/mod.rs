//! API client module for SchoolDesk.
//!
//! Provides the authenticated HTTP client with single-flight session
//! refresh, token storage, typed entity resources, and the request/response
//! types of the auth routes.

pub mod auth;
pub mod client;
pub mod error;
pub mod refresh;
pub mod resources;
pub mod transport;
pub mod types;

pub use auth::{KeychainTokenStore, MemoryTokenStore, TokenKind, TokenStore, TokenStoreError};
pub use client::{ApiClient, AuthFailureHook, RequestOptions};
pub use error::ApiError;
pub use refresh::{RefreshGate, RefreshState};
pub use transport::{ApiRequest, HttpTransport, RawResponse, ReqwestTransport};
pub use types::{LoginRequest, SessionTokens};
