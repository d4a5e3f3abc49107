use axum::{extract::State, http::StatusCode, Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db;
use crate::error::AppResult;
use crate::models::{AuthUser, UserPublic};
use crate::routes::extract::AppJson;
use crate::routes::AppState;
use crate::services::accounts::{self, NewUser};

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SignupRequest {
    pub fullname: String,
    #[serde(alias = "username")]
    pub handle: String,
    pub password: String,
    pub mobile_number: String,
    pub date_of_birth: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct LoginRequest {
    #[serde(alias = "username", alias = "mobileNumber")]
    pub handle: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupResponse {
    pub message: &'static str,
    pub user_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub user_id: String,
    pub issued_at: DateTime<Utc>,
}

pub async fn signup(
    State(state): State<AppState>,
    AppJson(body): AppJson<SignupRequest>,
) -> AppResult<(StatusCode, Json<SignupResponse>)> {
    let new_user = NewUser {
        fullname: body.fullname,
        handle: body.handle,
        password: body.password,
        mobile_number: body.mobile_number,
        date_of_birth: body.date_of_birth,
    };

    let user_id = db::call(&state.db, state.config.store_timeout, move |conn| {
        accounts::signup(conn, new_user)
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            message: "User created successfully",
            user_id,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    AppJson(body): AppJson<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let tokens = state.tokens.clone();
    let issued = db::call(&state.db, state.config.store_timeout, move |conn| {
        accounts::login(conn, &tokens, &body.handle, &body.password)
    })
    .await?;

    Ok(Json(LoginResponse {
        token: issued.token,
        user_id: issued.user_id,
        issued_at: issued.issued_at,
    }))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<Json<UserPublic>> {
    let user = db::call(&state.db, state.config.store_timeout, move |conn| {
        accounts::get_user(conn, &user.id)
    })
    .await?;

    Ok(Json(user.into()))
}
