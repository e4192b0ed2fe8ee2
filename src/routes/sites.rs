use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};

use crate::app::AppState;
use crate::authz::Caller;
use crate::errors::AppResult;
use crate::models::site::{Site, SiteCreateRequest, SiteUpdateRequest};
use crate::services::sites;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_sites).post(create_site))
        .route("/:id", get(get_site).put(update_site).delete(delete_site))
}

#[utoipa::path(
    get,
    path = "/sites",
    tag = "Sites",
    responses((status = 200, description = "Sites visible to the caller", body = [Site])),
    security(("bearer_auth" = []))
)]
pub async fn list_sites(State(state): State<AppState>, caller: Caller) -> AppResult<Json<Vec<Site>>> {
    Ok(Json(sites::list_sites(&state, &caller).await?))
}

#[utoipa::path(
    post,
    path = "/sites",
    tag = "Sites",
    request_body = SiteCreateRequest,
    responses(
        (status = 201, description = "Site created", body = Site),
        (status = 403, description = "Role not allowed or organization limit reached"),
        (status = 409, description = "Prefix already in use")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_site(
    State(state): State<AppState>,
    caller: Caller,
    Json(payload): Json<SiteCreateRequest>,
) -> AppResult<(StatusCode, Json<Site>)> {
    let site = sites::create_site(&state, &caller, payload).await?;
    Ok((StatusCode::CREATED, Json(site)))
}

#[utoipa::path(
    get,
    path = "/sites/{id}",
    tag = "Sites",
    params(("id" = i64, Path, description = "Site id")),
    responses(
        (status = 200, description = "Site detail", body = Site),
        (status = 403, description = "Site belongs to another organization"),
        (status = 404, description = "Site not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_site(State(state): State<AppState>, caller: Caller, Path(id): Path<i64>) -> AppResult<Json<Site>> {
    Ok(Json(sites::get_site(&state, &caller, id).await?))
}

#[utoipa::path(
    put,
    path = "/sites/{id}",
    tag = "Sites",
    params(("id" = i64, Path, description = "Site id")),
    request_body = SiteUpdateRequest,
    responses((status = 200, description = "Site updated", body = Site)),
    security(("bearer_auth" = []))
)]
pub async fn update_site(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
    Json(payload): Json<SiteUpdateRequest>,
) -> AppResult<Json<Site>> {
    Ok(Json(sites::update_site(&state, &caller, id, payload).await?))
}

#[utoipa::path(
    delete,
    path = "/sites/{id}",
    tag = "Sites",
    params(("id" = i64, Path, description = "Site id")),
    responses((status = 204, description = "Site deleted")),
    security(("bearer_auth" = []))
)]
pub async fn delete_site(State(state): State<AppState>, caller: Caller, Path(id): Path<i64>) -> AppResult<StatusCode> {
    sites::delete_site(&state, &caller, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
