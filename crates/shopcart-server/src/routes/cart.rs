use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db;
use crate::error::{AppError, AppResult};
use crate::models::{AuthUser, Cart, CartItem};
use crate::routes::extract::AppJson;
use crate::routes::AppState;
use crate::services::cart;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartRequest {
    #[serde(default)]
    pub product_id: String,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
}

fn default_quantity() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ItemsResponse {
    pub items: Vec<CartItem>,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct CartMessage {
    pub message: &'static str,
    pub cart: Cart,
}

pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<Json<ItemsResponse>> {
    let items = db::call(&state.db, state.config.store_timeout, move |conn| {
        cart::list_items(conn, &user.id)
    })
    .await?;

    Ok(Json(ItemsResponse { items }))
}

pub async fn add(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    AppJson(body): AppJson<AddToCartRequest>,
) -> AppResult<(StatusCode, Json<Cart>)> {
    let product_id = Uuid::parse_str(body.product_id.trim())
        .map_err(|_| AppError::BadRequest("Invalid product ID".into()))?
        .to_string();
    let quantity = body.quantity;

    let outcome = db::call(&state.db, state.config.store_timeout, move |conn| {
        cart::add_item(conn, &user.id, &product_id, quantity)
    })
    .await?;

    let status = if outcome.is_created() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome.into_cart())))
}

pub async fn total_items(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<Json<CountResponse>> {
    let count = db::call(&state.db, state.config.store_timeout, move |conn| {
        cart::count_unique_items(conn, &user.id)
    })
    .await?;

    Ok(Json(CountResponse { count }))
}

pub async fn remove(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(product_id): Path<String>,
) -> AppResult<Json<CartMessage>> {
    let product_id = normalize_product_id(&product_id);
    let cart = db::call(&state.db, state.config.store_timeout, move |conn| {
        cart::remove_item(conn, &user.id, &product_id)
    })
    .await?;

    Ok(Json(CartMessage {
        message: "Product removed from cart",
        cart,
    }))
}

pub async fn update_quantity(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(product_id): Path<String>,
    AppJson(body): AppJson<UpdateQuantityRequest>,
) -> AppResult<Json<CartMessage>> {
    let quantity = body
        .quantity
        .ok_or_else(|| AppError::BadRequest("Quantity is required".into()))?;
    let product_id = normalize_product_id(&product_id);

    let cart = db::call(&state.db, state.config.store_timeout, move |conn| {
        cart::set_quantity(conn, &user.id, &product_id, quantity)
    })
    .await?;

    Ok(Json(CartMessage {
        message: "Product quantity updated",
        cart,
    }))
}

/// Stored ids are lowercase hyphenated UUIDs. Other spellings of the same
/// UUID map onto that form; anything else passes through and will not match.
fn normalize_product_id(raw: &str) -> String {
    Uuid::parse_str(raw.trim())
        .map(|id| id.to_string())
        .unwrap_or_else(|_| raw.to_string())
}
