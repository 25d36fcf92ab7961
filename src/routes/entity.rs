//! Entity and relation routes. Paths are fully parameterized; handlers
//! resolve the entity (and relation) from the segment, so one route table
//! serves every entity in the model. The static `/meta` segment takes
//! precedence over the `:id` parameter.

use crate::handlers::{entity, relation};
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn entity_routes(state: AppState) -> Router {
    Router::new()
        .route("/:entity", get(entity::list).post(entity::create))
        .route("/:entity/meta", post(entity::meta))
        .route(
            "/:entity/:id",
            get(entity::get_one)
                .patch(entity::update)
                .delete(entity::delete_one),
        )
        .route(
            "/:entity/:id/:relation",
            get(relation::get)
                .post(relation::connect)
                .delete(relation::disconnect)
                .patch(relation::update),
        )
        .with_state(state)
}
