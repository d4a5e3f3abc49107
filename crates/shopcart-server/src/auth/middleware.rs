use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};

use crate::auth::token::TokenError;
use crate::error::AppError;
use crate::models::AuthUser;
use crate::routes::AppState;

/// Verifies the `Authorization: Bearer` token and attaches [`AuthUser`] to
/// the request extensions. No store access.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !request.headers().contains_key(AUTHORIZATION) {
        return Err(TokenError::Missing.into());
    }
    // Present but not a bearer credential.
    let bearer = request
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or(TokenError::Malformed)?;

    let claims = state.tokens.verify(bearer.token()).map_err(|e| {
        tracing::debug!("Rejected bearer token: {e}");
        e
    })?;

    request.extensions_mut().insert(AuthUser { id: claims.sub });
    Ok(next.run(request).await)
}
