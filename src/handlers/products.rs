use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde_json::{json, Value};
use validator::Validate;

use crate::{
    dto::product::{CreateProductRequest, UpdateProductRequest},
    errors::AppError,
    models::product::{ProductDoc, ProductPatch, ProductPublic},
    state::AppState,
};

fn parse_id(id: &str) -> Result<ObjectId, AppError> {
    ObjectId::parse_str(id).map_err(|_| AppError::Validation("invalid product id".into()))
}

pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<ProductPublic>>, AppError> {
    let products = state.stores.products.list().await?;
    Ok(Json(products.into_iter().map(Into::into).collect()))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ProductPublic>), AppError> {
    req.validate()?;
    let now = BsonDateTime::now();
    let product = ProductDoc {
        id: ObjectId::new(),
        name: req.name.trim().to_string(),
        description: req.description,
        price: req.price,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };
    state.stores.products.insert(&product).await?;
    tracing::info!(product_id = %product.id, "product created");
    Ok((StatusCode::CREATED, Json(product.into())))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ProductPublic>, AppError> {
    let product = state
        .stores
        .products
        .find(&parse_id(&id)?)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(product.into()))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateProductRequest>,
) -> Result<Json<ProductPublic>, AppError> {
    let id = parse_id(&id)?;
    req.validate()?;
    let patch = ProductPatch::from(req);
    if patch.is_empty() {
        return Err(AppError::Validation("no fields to update".into()));
    }

    let product = state
        .stores
        .products
        .update(&id, &patch)
        .await?
        .ok_or(AppError::NotFound)?;
    tracing::info!(product_id = %id, "product updated");
    Ok(Json(product.into()))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let id = parse_id(&id)?;
    if !state.stores.products.soft_delete(&id).await? {
        return Err(AppError::NotFound);
    }
    tracing::info!(product_id = %id, "product deleted");
    Ok(Json(json!({ "message": "product deleted" })))
}
