use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::app::AppState;
use crate::authz::Caller;
use crate::errors::AppResult;
use crate::models::user::{AuthResponse, LoginRequest, User};
use crate::services::users;

pub fn routes() -> Router<AppState> {
    Router::new().route("/login", post(login)).route("/me", get(me))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(State(state): State<AppState>, Json(payload): Json<LoginRequest>) -> AppResult<Json<AuthResponse>> {
    let (token, user) = users::authenticate(&state, payload.username.trim(), &payload.password).await?;
    Ok(Json(AuthResponse { token, user }))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Auth",
    responses(
        (status = 200, description = "Current user", body = User),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer_auth" = []))
)]
pub async fn me(State(state): State<AppState>, caller: Caller) -> AppResult<Json<User>> {
    Ok(Json(users::profile(&state, &caller).await?))
}
