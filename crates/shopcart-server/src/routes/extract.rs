use axum::extract::FromRequest;

use crate::error::AppError;

/// `axum::Json` whose rejections render as `{"error": ...}` with status 400.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);
