//! Shared application state for all routes.

use crate::broker::Producer;
use crate::extractors::AuthConfig;
use crate::model::Model;
use axum::extract::FromRef;
use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub model: Model,
    pub producer: Producer,
    pub auth: AuthConfig,
}

impl FromRef<AppState> for AuthConfig {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}
