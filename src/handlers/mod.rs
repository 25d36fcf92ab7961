//! HTTP handlers for entity CRUD and relation management.

pub mod entity;
pub mod relation;
