// Web layer - HTML form handlers and the application router

pub mod handlers;
pub mod views;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

pub fn create_eav_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::home))
        // Entity types
        .route(
            "/entity-types",
            get(handlers::list_entity_types).post(handlers::create_entity_type),
        )
        .route("/delete-entity-type/{id}", get(handlers::delete_entity_type))
        // Attributes
        .route(
            "/attributes/{entity_type_id}",
            get(handlers::list_attributes).post(handlers::create_attribute),
        )
        .route(
            "/delete-attribute/{id}/{entity_type_id}",
            get(handlers::delete_attribute),
        )
        // Records
        .route(
            "/records/{entity_type_id}",
            get(handlers::new_record_form).post(handlers::create_record),
        )
        .route(
            "/edit-record/{entity_id}/{entity_type_id}",
            get(handlers::edit_record_form).post(handlers::update_record),
        )
        .route(
            "/records-list/{entity_type_id}",
            get(handlers::list_records).post(handlers::filter_records),
        )
        .route(
            "/delete-record/{entity_id}/{entity_type_id}",
            get(handlers::delete_record),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
