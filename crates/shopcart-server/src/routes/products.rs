use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::db;
use crate::error::AppResult;
use crate::models::{AuthUser, Product};
use crate::routes::extract::AppJson;
use crate::routes::AppState;
use crate::services::catalog::{self, NewProduct};

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateProductRequest {
    #[serde(alias = "name")]
    pub product_name: String,
    pub image: String,
    pub price: Option<f64>,
    pub title: String,
    pub category: String,
    pub description: String,
}

impl From<CreateProductRequest> for NewProduct {
    fn from(body: CreateProductRequest) -> Self {
        Self {
            name: body.product_name,
            image: body.image,
            price: body.price,
            title: body.title,
            category: body.category,
            description: body.description,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProductCreated {
    pub message: &'static str,
    pub product: Product,
}

pub async fn list(State(state): State<AppState>) -> AppResult<Json<Vec<Product>>> {
    let products = db::call(&state.db, state.config.store_timeout, |conn| {
        catalog::list_products(conn)
    })
    .await?;
    Ok(Json(products))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Product>> {
    let product = db::call(&state.db, state.config.store_timeout, move |conn| {
        catalog::get_product(conn, &id)
    })
    .await?;
    Ok(Json(product))
}

pub async fn by_category(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> AppResult<Json<Vec<Product>>> {
    let products = db::call(&state.db, state.config.store_timeout, move |conn| {
        catalog::list_by_category(conn, &category)
    })
    .await?;
    Ok(Json(products))
}

pub async fn create_public(
    State(state): State<AppState>,
    AppJson(body): AppJson<CreateProductRequest>,
) -> AppResult<(StatusCode, Json<ProductCreated>)> {
    let product = db::call(&state.db, state.config.store_timeout, move |conn| {
        catalog::create_product(conn, body.into(), None)
    })
    .await?;
    Ok(created(product))
}

pub async fn create_owned(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    AppJson(body): AppJson<CreateProductRequest>,
) -> AppResult<(StatusCode, Json<ProductCreated>)> {
    let product = db::call(&state.db, state.config.store_timeout, move |conn| {
        catalog::create_product(conn, body.into(), Some(user.id.as_str()))
    })
    .await?;
    Ok(created(product))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    db::call(&state.db, state.config.store_timeout, move |conn| {
        catalog::delete_public_product(conn, &id)
    })
    .await?;
    Ok(Json(json!({ "message": "Product deleted successfully" })))
}

fn created(product: Product) -> (StatusCode, Json<ProductCreated>) {
    (
        StatusCode::CREATED,
        Json(ProductCreated {
            message: "Product added successfully",
            product,
        }),
    )
}
