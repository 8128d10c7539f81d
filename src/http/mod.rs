//! # REST surface
//!
//! An axum router over a shared [`Ontology`]. All routes except `/health`
//! live under the configured prefix (`/api/v1` by default):
//!
//! - `GET/POST /concepts`, `GET/PATCH/DELETE /concepts/{id}`
//! - `GET /concepts/category/{name}`, `GET /concepts/subcategory/{name}`
//! - `GET/POST /concepts/{id}/classification`,
//!   `DELETE /concepts/{id}/classification/{subcategory}`
//! - `GET /concepts/{id}/causal-chain|hierarchy|membership|properties|interactions|temporal|spatial|relationships`
//! - `GET/POST /relationships`, `GET/PATCH/DELETE /relationships/{id}`
//! - `GET /categories`, `GET /categories/{name}`, `GET /subcategories/{name}`;
//!   write verbs on categories answer 405
//!
//! Every error renders as `{"detail": ...}`; a validation failure carries
//! the full violation list.

mod error;
mod handlers;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::storage::StorageBackend;
use crate::Ontology;

use handlers as h;

/// Build the application router for `db`, honouring its `http` config.
pub fn router<B: StorageBackend>(db: Arc<Ontology<B>>) -> Router {
    let http = db.config().http.clone();

    let api = Router::new()
        .route("/concepts", get(h::list_concepts::<B>).post(h::create_concept::<B>))
        .route(
            "/concepts/{id}",
            get(h::get_concept::<B>).patch(h::update_concept::<B>).delete(h::delete_concept::<B>),
        )
        .route("/concepts/category/{name}", get(h::concepts_by_category::<B>))
        .route("/concepts/subcategory/{name}", get(h::concepts_by_subcategory::<B>))
        .route(
            "/concepts/{id}/classification",
            get(h::get_classification::<B>).post(h::classify::<B>),
        )
        .route(
            "/concepts/{id}/classification/{subcategory}",
            axum::routing::delete(h::declassify::<B>),
        )
        .route("/concepts/{id}/causal-chain", get(h::causal_chain::<B>))
        .route("/concepts/{id}/hierarchy", get(h::hierarchy::<B>))
        .route("/concepts/{id}/membership", get(h::membership::<B>))
        .route("/concepts/{id}/properties", get(h::properties::<B>))
        .route("/concepts/{id}/interactions", get(h::interactions::<B>))
        .route("/concepts/{id}/temporal", get(h::temporal::<B>))
        .route("/concepts/{id}/spatial", get(h::spatial::<B>))
        .route("/concepts/{id}/relationships", get(h::related::<B>))
        .route(
            "/relationships",
            get(h::list_relationships::<B>).post(h::create_relationship::<B>),
        )
        .route(
            "/relationships/{id}",
            get(h::get_relationship::<B>)
                .patch(h::update_relationship::<B>)
                .delete(h::delete_relationship::<B>),
        )
        .route("/categories", get(h::list_categories::<B>).post(h::create_category::<B>))
        .route(
            "/categories/{name}",
            get(h::get_category::<B>)
                .put(h::update_category::<B>)
                .patch(h::update_category::<B>)
                .delete(h::delete_category::<B>),
        )
        .route("/subcategories/{name}", get(h::get_subcategory::<B>));

    let prefix = http.prefix.trim_end_matches('/');
    let app = if prefix.is_empty() {
        api
    } else {
        Router::new().nest(prefix, api)
    };
    let app = app.route("/health", get(h::health::<B>)).with_state(db);

    tracing::debug!(prefix = %http.prefix, cors = http.enable_cors, "router built");
    if http.enable_cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}
