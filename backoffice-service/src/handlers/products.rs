use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use mongodb::bson::doc;
use serde::Deserialize;
use service_core::{error::AppError, query::ListQuery, utils::ValidatedJson};

use super::{find_by_id, read_image, save_versioned};
use crate::dtos::{
    products::{CreateProductRequest, ProductView, UpdateProductRequest, PRODUCT_QUERY},
    ApiResponse, Empty,
};
use crate::middleware::CurrentUser;
use crate::models::Product;
use crate::services::{blob_key, delete_blob_detached, StatsService};
use crate::startup::AppState;

const DUPLICATE_PRODUCT: &str = "A product with these details already exists";

pub async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<impl IntoResponse, AppError> {
    let query = ListQuery::parse(&params, &PRODUCT_QUERY)?;
    let page = query.fetch(&state.db.products()).await?;
    Ok(Json(page.into_response(&query, ProductView::from)?))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let product = find_by_id(&state.db.products(), &id, "Product").await?;
    Ok(Json(ApiResponse::ok(ProductView::from(product))))
}

pub async fn create_product(
    State(state): State<AppState>,
    user: CurrentUser,
    ValidatedJson(req): ValidatedJson<CreateProductRequest>,
) -> Result<impl IntoResponse, AppError> {
    user.require_admin()?;

    let product = Product::new(req.into(), user.id.clone());
    product.check()?;

    state.db.products().insert_one(&product, None).await?;

    tracing::info!(product_id = %product.id, created_by = %user.id, "Product created");
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(ProductView::from(product))),
    ))
}

pub async fn update_product(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateProductRequest>,
) -> Result<impl IntoResponse, AppError> {
    let products = state.db.products();
    let mut product = find_by_id(&products, &id, "Product").await?;
    user.ensure_owner_or_admin(&product.created_by)?;

    let loaded_version = product.version;
    req.merge_into(&mut product);
    product.check()?;
    product.version = loaded_version + 1;
    product.updated_at = Utc::now();

    save_versioned(&products, &id, loaded_version, &product, "product", DUPLICATE_PRODUCT).await?;

    tracing::info!(product_id = %id, updated_by = %user.id, "Product updated");
    Ok(Json(ApiResponse::ok(ProductView::from(product))))
}

pub async fn delete_product(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let products = state.db.products();
    let product = find_by_id(&products, &id, "Product").await?;
    user.ensure_owner_or_admin(&product.created_by)?;

    let result = products.delete_one(doc! { "_id": &id }, None).await?;
    if result.deleted_count == 0 {
        return Err(AppError::not_found("Product not found"));
    }

    if let Some(image) = product.image {
        delete_blob_detached(state.storage.clone(), image);
    }

    tracing::info!(product_id = %id, deleted_by = %user.id, "Product deleted");
    Ok(Json(ApiResponse::ok(Empty {})))
}

pub async fn product_stats(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    user.require_staff()?;
    let stats = StatsService::new(&state.db).products_by_category().await?;
    Ok(Json(ApiResponse::collection(stats)))
}

#[derive(Debug, Deserialize)]
pub struct LowStockParams {
    pub threshold: Option<i64>,
}

pub async fn low_stock_products(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(params): Query<LowStockParams>,
) -> Result<impl IntoResponse, AppError> {
    user.require_staff()?;

    let threshold = params
        .threshold
        .unwrap_or(state.config.inventory.low_stock_threshold);
    if threshold < 0 {
        return Err(AppError::bad_request("Threshold cannot be negative"));
    }

    let products = StatsService::new(&state.db).low_stock(threshold).await?;
    let views: Vec<ProductView> = products.into_iter().map(ProductView::from).collect();
    Ok(Json(ApiResponse::collection(views)))
}

pub async fn upload_product_image(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let products = state.db.products();
    let mut product = find_by_id(&products, &id, "Product").await?;
    user.ensure_owner_or_admin(&product.created_by)?;

    let upload = read_image(&mut multipart, state.config.storage.max_upload_bytes).await?;
    let key = blob_key("products", &product.id, upload.file_name.as_deref());
    state.storage.upload(&key, upload.data).await?;

    let loaded_version = product.version;
    let previous = product.image.replace(key.clone());
    product.version = loaded_version + 1;
    product.updated_at = Utc::now();

    if let Err(e) =
        save_versioned(&products, &id, loaded_version, &product, "product", DUPLICATE_PRODUCT).await
    {
        delete_blob_detached(state.storage.clone(), key);
        return Err(e);
    }

    if let Some(previous) = previous {
        delete_blob_detached(state.storage.clone(), previous);
    }

    tracing::info!(product_id = %id, "Product image replaced");
    Ok(Json(ApiResponse::ok(ProductView::from(product))))
}
