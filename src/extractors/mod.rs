//! Request extractors.

pub mod auth;
pub use auth::{AuthConfig, AuthUser, ROLE_USER};
