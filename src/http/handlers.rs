//! Route handlers. Each one parses the request, calls one service
//! operation and renders the record; status mapping lives in `error`.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use crate::identity::{
    CategoryRecord, ConceptRecord, NeighborRecord, PathRecord, RelationshipRecord, SubcategoryRecord,
};
use crate::model::{props_from_json, PropertyMap};
use crate::service::{ConceptQuery, NewRelationship, RelationshipQuery, TraversalBounds};
use crate::storage::StorageBackend;
use crate::validation::{Violation, Violations};
use crate::{Error, Ontology, Result};

pub(crate) type Db<B> = State<Arc<Ontology<B>>>;

type Reply<T> = Result<Json<T>>;
type Created<T> = Result<(StatusCode, Json<T>)>;

// ── Body parsing ─────────────────────────────────────────────────────────

fn not_an_object() -> Error {
    Error::ValidationFailed(Violation::new("body", "type", "request body must be a JSON object").into())
}

fn object(body: &JsonValue) -> Result<PropertyMap> {
    props_from_json(body).ok_or_else(not_an_object)
}

fn text_field(obj: &Map<String, JsonValue>, names: &[&str], violations: &mut Violations) -> String {
    match names.iter().find_map(|n| obj.get(*n)) {
        Some(JsonValue::String(s)) => s.clone(),
        Some(_) => {
            violations.push(Violation::new(names[0], "type", format!("'{}' must be a string", names[0])));
            String::new()
        }
        None => {
            violations.push(Violation::new(names[0], "required", format!("'{}' is required", names[0])));
            String::new()
        }
    }
}

/// `{type, start_id, end_id, properties}`; `source_id`/`target_id` are
/// accepted for the endpoints.
fn new_relationship(body: &JsonValue) -> Result<NewRelationship> {
    let obj = body.as_object().ok_or_else(not_an_object)?;
    let mut violations = Violations::new();
    let rel_type = text_field(obj, &["type"], &mut violations);
    let start_id = text_field(obj, &["start_id", "source_id"], &mut violations);
    let end_id = text_field(obj, &["end_id", "target_id"], &mut violations);
    let properties = match obj.get("properties") {
        None | Some(JsonValue::Null) => PropertyMap::new(),
        Some(p) => props_from_json(p).unwrap_or_else(|| {
            violations.push(Violation::new("properties", "type", "'properties' must be an object"));
            PropertyMap::new()
        }),
    };
    violations.into_result()?;
    Ok(NewRelationship::new(rel_type, start_id, end_id, properties))
}

/// A relationship patch may be the bare delta or `{"properties": {...}}`.
fn relationship_delta(body: &JsonValue) -> Result<PropertyMap> {
    match body.as_object() {
        Some(obj) if obj.len() == 1 && obj.get("properties").is_some_and(JsonValue::is_object) => {
            object(&obj["properties"])
        }
        _ => object(body),
    }
}

// ── Health ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
    version: &'static str,
    categories: usize,
}

pub(crate) async fn health<B: StorageBackend>(State(db): Db<B>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        categories: db.registry().categories().len(),
    })
}

// ── Concepts ─────────────────────────────────────────────────────────────

pub(crate) async fn list_concepts<B: StorageBackend>(
    State(db): Db<B>,
    Query(query): Query<ConceptQuery>,
) -> Reply<Vec<ConceptRecord>> {
    Ok(Json(db.concepts().list(&query).await?))
}

pub(crate) async fn create_concept<B: StorageBackend>(
    State(db): Db<B>,
    Json(body): Json<JsonValue>,
) -> Created<ConceptRecord> {
    let record = db.concepts().create(object(&body)?).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub(crate) async fn get_concept<B: StorageBackend>(State(db): Db<B>, Path(id): Path<String>) -> Reply<ConceptRecord> {
    Ok(Json(db.concepts().get(&id).await?))
}

pub(crate) async fn update_concept<B: StorageBackend>(
    State(db): Db<B>,
    Path(id): Path<String>,
    Json(body): Json<JsonValue>,
) -> Reply<ConceptRecord> {
    Ok(Json(db.concepts().update(&id, object(&body)?).await?))
}

pub(crate) async fn delete_concept<B: StorageBackend>(State(db): Db<B>, Path(id): Path<String>) -> Result<StatusCode> {
    db.concepts().delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `/concepts/category/{name}`: listing with only the category filter set.
pub(crate) async fn concepts_by_category<B: StorageBackend>(
    State(db): Db<B>,
    Path(name): Path<String>,
    Query(query): Query<ConceptQuery>,
) -> Reply<Vec<ConceptRecord>> {
    let query = ConceptQuery { category: Some(name), ..query };
    Ok(Json(db.concepts().list(&query).await?))
}

pub(crate) async fn concepts_by_subcategory<B: StorageBackend>(
    State(db): Db<B>,
    Path(name): Path<String>,
    Query(query): Query<ConceptQuery>,
) -> Reply<Vec<ConceptRecord>> {
    let query = ConceptQuery { subcategory: Some(name), ..query };
    Ok(Json(db.concepts().list(&query).await?))
}

// ── Classification ───────────────────────────────────────────────────────

pub(crate) async fn get_classification<B: StorageBackend>(
    State(db): Db<B>,
    Path(id): Path<String>,
) -> Reply<Vec<SubcategoryRecord>> {
    Ok(Json(db.concepts().classification(&id).await?))
}

/// Body: `{"subcategory": "Causality"}`.
pub(crate) async fn classify<B: StorageBackend>(
    State(db): Db<B>,
    Path(id): Path<String>,
    Json(body): Json<JsonValue>,
) -> Reply<Vec<SubcategoryRecord>> {
    let obj = body.as_object().ok_or_else(not_an_object)?;
    let mut violations = Violations::new();
    let subcategory = text_field(obj, &["subcategory"], &mut violations);
    violations.into_result()?;
    Ok(Json(db.concepts().classify(&id, &subcategory).await?))
}

pub(crate) async fn declassify<B: StorageBackend>(
    State(db): Db<B>,
    Path((id, subcategory)): Path<(String, String)>,
) -> Reply<Vec<SubcategoryRecord>> {
    Ok(Json(db.concepts().declassify(&id, &subcategory).await?))
}

// ── Traversals ───────────────────────────────────────────────────────────

macro_rules! traversal_handler {
    ($name:ident, $op:ident, $out:ty) => {
        pub(crate) async fn $name<B: StorageBackend>(
            State(db): Db<B>,
            Path(id): Path<String>,
            Query(bounds): Query<TraversalBounds>,
        ) -> Reply<Vec<$out>> {
            Ok(Json(db.traversals().$op(&id, bounds).await?))
        }
    };
}

traversal_handler!(causal_chain, causal_chain, PathRecord);
traversal_handler!(hierarchy, containment_hierarchy, PathRecord);
traversal_handler!(membership, membership, PathRecord);
traversal_handler!(properties, properties_of, NeighborRecord);
traversal_handler!(interactions, interacting, NeighborRecord);
traversal_handler!(temporal, temporal_neighbors, NeighborRecord);
traversal_handler!(spatial, spatial_neighbors, NeighborRecord);
traversal_handler!(related, related, NeighborRecord);

// ── Relationships ────────────────────────────────────────────────────────

pub(crate) async fn list_relationships<B: StorageBackend>(
    State(db): Db<B>,
    Query(query): Query<RelationshipQuery>,
) -> Reply<Vec<RelationshipRecord>> {
    Ok(Json(db.relationships().list(&query).await?))
}

pub(crate) async fn create_relationship<B: StorageBackend>(
    State(db): Db<B>,
    Json(body): Json<JsonValue>,
) -> Created<RelationshipRecord> {
    let record = db.relationships().create(new_relationship(&body)?).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub(crate) async fn get_relationship<B: StorageBackend>(
    State(db): Db<B>,
    Path(id): Path<String>,
) -> Reply<RelationshipRecord> {
    Ok(Json(db.relationships().get(&id).await?))
}

pub(crate) async fn update_relationship<B: StorageBackend>(
    State(db): Db<B>,
    Path(id): Path<String>,
    Json(body): Json<JsonValue>,
) -> Reply<RelationshipRecord> {
    Ok(Json(db.relationships().update(&id, relationship_delta(&body)?).await?))
}

pub(crate) async fn delete_relationship<B: StorageBackend>(
    State(db): Db<B>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    db.relationships().delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Categories ───────────────────────────────────────────────────────────

pub(crate) async fn list_categories<B: StorageBackend>(State(db): Db<B>) -> Json<Vec<CategoryRecord>> {
    Json(db.categories().list())
}

pub(crate) async fn get_category<B: StorageBackend>(State(db): Db<B>, Path(name): Path<String>) -> Reply<CategoryRecord> {
    Ok(Json(db.categories().get_by_name(&name)?))
}

pub(crate) async fn get_subcategory<B: StorageBackend>(
    State(db): Db<B>,
    Path(name): Path<String>,
) -> Reply<SubcategoryRecord> {
    Ok(Json(db.categories().get_subcategory(&name)?))
}

pub(crate) async fn create_category<B: StorageBackend>(State(db): Db<B>) -> Reply<CategoryRecord> {
    Ok(Json(db.categories().create(&PropertyMap::new())?))
}

pub(crate) async fn update_category<B: StorageBackend>(State(db): Db<B>, Path(name): Path<String>) -> Reply<CategoryRecord> {
    Ok(Json(db.categories().update(&name, &PropertyMap::new())?))
}

pub(crate) async fn delete_category<B: StorageBackend>(State(db): Db<B>, Path(name): Path<String>) -> Result<StatusCode> {
    db.categories().delete(&name)?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn db() -> Db<crate::MemoryBackend> {
        State(Arc::new(Ontology::open_memory().await.unwrap()))
    }

    fn clone<B: StorageBackend>(state: &Db<B>) -> Db<B> {
        State(Arc::clone(&state.0))
    }

    #[test]
    fn test_relationship_body_aliases() {
        let new = new_relationship(&json!({
            "type": "cause",
            "source_id": "4:mem:1",
            "target_id": "4:mem:2",
            "properties": {"confidence_score": 0.9}
        }))
        .unwrap();
        assert_eq!((new.start_id.as_str(), new.end_id.as_str()), ("4:mem:1", "4:mem:2"));
        assert_eq!(new.properties.len(), 1);

        let Err(Error::ValidationFailed(v)) = new_relationship(&json!({"type": 7, "properties": []})) else {
            panic!("expected validation failure");
        };
        assert!(v.has("type", "type"));
        assert!(v.has("start_id", "required"));
        assert!(v.has("end_id", "required"));
        assert!(v.has("properties", "type"));
    }

    #[test]
    fn test_relationship_delta_unwraps_properties() {
        let delta = relationship_delta(&json!({"properties": {"confidence_score": 0.5}})).unwrap();
        assert!(delta.contains_key("confidence_score"));
        let delta = relationship_delta(&json!({"confidence_score": 0.5})).unwrap();
        assert!(delta.contains_key("confidence_score"));
        assert!(relationship_delta(&json!([1, 2])).is_err());
    }

    #[tokio::test]
    async fn test_concept_lifecycle_statuses() {
        let state = db().await;
        let (status, Json(heat)) = create_concept(clone(&state), Json(json!({"name": "Heat"}))).await.unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let Json(fetched) = get_concept(clone(&state), Path(heat.element_id.clone())).await.unwrap();
        assert_eq!(fetched, heat);

        let status = delete_concept(clone(&state), Path(heat.element_id.clone())).await.unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        let err = get_concept(clone(&state), Path(heat.element_id)).await.unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn test_category_writes_are_refused() {
        let state = db().await;
        let err = create_category(clone(&state)).await.unwrap_err();
        assert_eq!(err.status_code(), 405);
        let err = delete_category(clone(&state), Path("Quality".into())).await.unwrap_err();
        assert_eq!(err.status_code(), 405);

        let Json(by_sub) = get_category(clone(&state), Path("Unity".into())).await.unwrap();
        assert_eq!(by_sub.name, "Quantity");
    }

    #[tokio::test]
    async fn test_concepts_by_category_route() {
        let state = db().await;
        create_concept(clone(&state), Json(json!({"name": "Heat", "quality": "Reality"}))).await.unwrap();
        create_concept(clone(&state), Json(json!({"name": "Cold"}))).await.unwrap();
        let Json(found) =
            concepts_by_category(clone(&state), Path("Quality".into()), Query(ConceptQuery::default()))
                .await
                .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Heat");
    }
}
