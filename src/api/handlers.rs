use std::collections::BTreeMap;

use axum::{
    extract::{Multipart, Path, Query, Request, State},
    body::Bytes,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::http::AppState;
use super::input::{form_or_json, parse_id_list, PersonInput, RelationshipInput};
use crate::error::{RelgraphError, Result};
use crate::graph::GraphSnapshot;
use crate::store::{parse_position_entries, GroupUpdate, Person};

/// Multipart field carrying the uploaded image
const IMAGE_FIELD: &str = "imagen";

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "relgraph",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

pub async fn graph(State(state): State<AppState>) -> Result<Json<GraphSnapshot>> {
    let persons = state.store.list_persons().await?;
    let relationships = state.store.list_relationships_with_names().await?;
    let snapshot = state.graph.build(&persons, &relationships);
    log::debug!(
        "Graph snapshot: {} nodes, {} edges",
        snapshot.nodes.len(),
        snapshot.edges.len()
    );
    Ok(Json(snapshot))
}

#[derive(Debug, Deserialize)]
pub struct PositionsQuery {
    #[serde(default)]
    ids: Option<String>,
}

pub async fn get_positions(
    State(state): State<AppState>,
    Query(query): Query<PositionsQuery>,
) -> Result<Json<Value>> {
    let filter = match query.ids.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => {
            let ids = parse_id_list(raw);
            if ids.is_empty() {
                return Ok(Json(json!({ "posiciones": {} })));
            }
            Some(ids)
        }
        None => None,
    };

    let positions: BTreeMap<i64, Value> = state
        .store
        .list_positions(filter)
        .await?
        .into_iter()
        .map(|(id, (x, y))| (id, json!({ "x": x, "y": y })))
        .collect();
    Ok(Json(json!({ "posiciones": positions })))
}

pub async fn save_positions(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>> {
    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| RelgraphError::Validation(format!("invalid JSON: {}", e)))?;
    let raw = payload
        .get("posiciones")
        .and_then(Value::as_object)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| RelgraphError::Validation("posiciones must be a non-empty object".to_string()))?;

    let entries = parse_position_entries(raw);
    if entries.is_empty() {
        return Err(RelgraphError::Validation("no valid positions to save".to_string()));
    }
    let saved = state.store.update_person_positions(entries).await?;
    Ok(Json(json!({ "success": true, "guardadas": saved })))
}

pub async fn get_groups(State(state): State<AppState>) -> Result<Json<Value>> {
    let groups: BTreeMap<i64, Value> = state
        .store
        .list_persons()
        .await?
        .into_iter()
        .map(|p| (p.id, json!({ "nombre": p.name, "grupo": p.group })))
        .collect();
    Ok(Json(json!({ "success": true, "grupos": groups })))
}

pub async fn update_groups(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>> {
    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| RelgraphError::Validation(format!("invalid JSON: {}", e)))?;
    let updates = payload
        .get("updates")
        .and_then(Value::as_array)
        .ok_or_else(|| RelgraphError::Validation("updates must be a list".to_string()))?;

    // malformed entries are skipped like entries without an id
    let updates: Vec<GroupUpdate> = updates
        .iter()
        .filter_map(|u| serde_json::from_value(u.clone()).ok())
        .collect();
    let updated = state.store.update_person_groups(updates).await?;

    Ok(Json(json!({
        "success": true,
        "message": format!("{} groups updated", updated),
        "actualizados": updated
    })))
}

pub async fn list_images(State(state): State<AppState>) -> Result<Json<Value>> {
    let images: BTreeMap<i64, Value> = state
        .store
        .list_persons()
        .await?
        .into_iter()
        .filter_map(|p| {
            let url = p.image_url.filter(|u| !u.is_empty())?;
            Some((p.id, json!({ "nombre": p.name, "imagen_url": url })))
        })
        .collect();
    Ok(Json(json!({ "success": true, "imagenes": images })))
}

pub async fn list_persons(State(state): State<AppState>) -> Result<Json<Value>> {
    let persons = state.store.list_persons().await?;
    Ok(Json(json!({ "success": true, "personas": persons })))
}

pub async fn create_person(State(state): State<AppState>, request: Request) -> Result<Json<Value>> {
    let input: PersonInput = form_or_json(request).await?;
    let new = input.into_new_person()?;
    let name = new.name.trim().to_string();
    let id = state.store.create_person(new).await?;

    Ok(Json(json!({
        "success": true,
        "message": format!("Person \"{}\" created", name),
        "persona_id": id
    })))
}

async fn require_person(state: &AppState, id: i64) -> Result<Person> {
    state
        .store
        .get_person(id)
        .await?
        .ok_or_else(|| RelgraphError::NotFound(format!("person {}", id)))
}

pub async fn get_person(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Value>> {
    let person = require_person(&state, id).await?;
    Ok(Json(json!({ "success": true, "persona": person })))
}

pub async fn update_person(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<Value>> {
    let input: PersonInput = form_or_json(request).await?;
    let person = state.store.update_person(id, input.into_patch()?).await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("Person \"{}\" updated", person.name),
        "persona": person
    })))
}

pub async fn delete_person(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Value>> {
    let person = state
        .store
        .delete_person(id)
        .await?
        .ok_or_else(|| RelgraphError::NotFound(format!("person {}", id)))?;

    // rows are gone; the file is cleaned up best-effort
    if let Some(image) = person.image_url.as_deref() {
        state.images.delete(image);
    }

    Ok(Json(json!({
        "success": true,
        "message": format!("Person \"{}\" deleted", person.name),
        "persona_id": id
    })))
}

pub async fn upload_image(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> Result<Json<Value>> {
    let person = require_person(&state, id).await?;

    let mut upload: Option<(String, Bytes)> = None;
    loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|e| RelgraphError::ImageProcessing(format!("invalid upload: {}", e.body_text())))?;
        let Some(field) = field else { break };
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| RelgraphError::ImageProcessing(format!("invalid upload: {}", e.body_text())))?;
        upload = Some((file_name, data));
        break;
    }
    let (file_name, data) = upload
        .ok_or_else(|| RelgraphError::Validation(format!("no file sent in field '{}'", IMAGE_FIELD)))?;

    let images = state.images.clone();
    let reference = tokio::task::spawn_blocking(move || images.save(id, &file_name, &data))
        .await
        .map_err(|e| RelgraphError::Internal(format!("image task failed: {}", e)))??;

    // the file exists now; undo it if the reference cannot be recorded
    match state.store.set_person_image(id, Some(reference.clone())).await {
        Ok(true) => {}
        Ok(false) => {
            state.images.delete(&reference);
            return Err(RelgraphError::NotFound(format!("person {}", id)));
        }
        Err(e) => {
            state.images.delete(&reference);
            return Err(e);
        }
    }

    if let Some(previous) = person.image_url.as_deref().filter(|p| *p != reference) {
        state.images.delete(previous);
    }

    Ok(Json(json!({
        "success": true,
        "message": "Image uploaded",
        "imagen_url": reference,
        "persona_id": id
    })))
}

pub async fn delete_image(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Value>> {
    let person = require_person(&state, id).await?;
    if !state.store.set_person_image(id, None).await? {
        return Err(RelgraphError::NotFound(format!("person {}", id)));
    }
    if let Some(previous) = person.image_url.as_deref() {
        state.images.delete(previous);
    }

    Ok(Json(json!({
        "success": true,
        "message": "Image removed",
        "persona_id": id
    })))
}

pub async fn list_relationships(State(state): State<AppState>) -> Result<Json<Value>> {
    let relationships = state.store.list_relationships_with_names().await?;
    Ok(Json(json!({ "success": true, "relaciones": relationships })))
}

pub async fn create_relationship(State(state): State<AppState>, request: Request) -> Result<Json<Value>> {
    let input: RelationshipInput = form_or_json(request).await?;
    let id = state.store.create_relationship(input.into_new_relationship()?).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Relationship created",
        "relacion_id": id
    })))
}

pub async fn delete_relationship(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    if !state.store.delete_relationship(id).await? {
        return Err(RelgraphError::NotFound(format!("relationship {}", id)));
    }
    Ok(Json(json!({
        "success": true,
        "message": "Relationship deleted",
        "relacion_id": id
    })))
}

pub async fn debug(State(state): State<AppState>) -> Result<Json<Value>> {
    let persons = state.store.list_persons().await?;
    let relationships = state.store.list_relationships_with_names().await?;
    Ok(Json(json!({
        "personas_count": persons.len(),
        "relaciones_count": relationships.len(),
        "database": state.store.db().path().display().to_string(),
        "personas": persons,
        "relaciones": relationships
    })))
}
