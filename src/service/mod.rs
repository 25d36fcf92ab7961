//! EntityService: generic CRUD and relation management using the safe SQL builder.

mod crud;
pub mod relations;
pub mod validation;
pub use crud::EntityService;
