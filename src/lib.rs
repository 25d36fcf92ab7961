//! Invoicing API: model-driven REST backend for customers, invoices,
//! payments, and products, with a broker bridge for lifecycle events.

pub mod broker;
pub mod case;
pub mod config;
pub mod dto;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod migration;
pub mod model;
pub mod query;
pub mod response;
pub mod routes;
pub mod service;
pub mod sql;
pub mod state;

pub use config::AppConfig;
pub use error::AppError;
pub use migration::apply_migrations;
pub use model::Model;
pub use routes::{common_routes, entity_routes};
pub use service::EntityService;
pub use state::AppState;
