use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};

use crate::app::AppState;
use crate::authz::Caller;
use crate::errors::AppResult;
use crate::models::contractor::{Contractor, ContractorCreateRequest};
use crate::services::contractors;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_contractors).post(create_contractor))
        .route("/:id", get(get_contractor).delete(delete_contractor))
}

#[utoipa::path(
    get,
    path = "/contractors",
    tag = "Contractors",
    responses((status = 200, description = "Contractors of the caller's organization", body = [Contractor])),
    security(("bearer_auth" = []))
)]
pub async fn list_contractors(State(state): State<AppState>, caller: Caller) -> AppResult<Json<Vec<Contractor>>> {
    Ok(Json(contractors::list_contractors(&state, &caller).await?))
}

#[utoipa::path(
    post,
    path = "/contractors",
    tag = "Contractors",
    request_body = ContractorCreateRequest,
    responses((status = 201, description = "Contractor created", body = Contractor)),
    security(("bearer_auth" = []))
)]
pub async fn create_contractor(
    State(state): State<AppState>,
    caller: Caller,
    Json(payload): Json<ContractorCreateRequest>,
) -> AppResult<(StatusCode, Json<Contractor>)> {
    let contractor = contractors::create_contractor(&state, &caller, payload).await?;
    Ok((StatusCode::CREATED, Json(contractor)))
}

#[utoipa::path(
    get,
    path = "/contractors/{id}",
    tag = "Contractors",
    params(("id" = i64, Path, description = "Contractor id")),
    responses((status = 200, description = "Contractor detail", body = Contractor)),
    security(("bearer_auth" = []))
)]
pub async fn get_contractor(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> AppResult<Json<Contractor>> {
    Ok(Json(contractors::get_contractor(&state, &caller, id).await?))
}

#[utoipa::path(
    delete,
    path = "/contractors/{id}",
    tag = "Contractors",
    params(("id" = i64, Path, description = "Contractor id")),
    responses(
        (status = 204, description = "Contractor deleted"),
        (status = 409, description = "Contractor still referenced by work logs")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_contractor(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    contractors::delete_contractor(&state, &caller, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
