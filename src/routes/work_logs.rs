use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use utoipa::ToSchema;

use crate::app::AppState;
use crate::authz::Caller;
use crate::errors::AppResult;
use crate::models::work_log::{
    EvidenceBatch, EvidenceCategory, EvidenceDeletion, EvidenceUpload, WorkLog, WorkLogCreateRequest,
    WorkLogUpdateRequest,
};
use crate::routes::form::{parse_id_list, MultipartForm};
use crate::routes::work_orders::SiteFilter;
use crate::services::work_logs::{self, parse_gps_metadata};

const INITIAL_FILES: &str = "initial_evidence";
const FOLLOW_UP_FILES: &str = "follow_up_evidence";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_work_logs).post(create_work_log))
        .route("/:id", get(get_work_log).put(update_work_log).delete(delete_work_log))
}

/// `multipart/form-data` body for work-log creation and update.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct WorkLogForm {
    /// JSON encoded create or update payload.
    data: String,
    #[schema(value_type = Vec<String>, format = Binary)]
    initial_evidence: Vec<Vec<u8>>,
    #[schema(value_type = Vec<String>, format = Binary)]
    follow_up_evidence: Vec<Vec<u8>>,
    /// JSON array of `{latitude, longitude}` (or null), one per initial file.
    initial_metadata: Option<String>,
    /// JSON array of `{latitude, longitude}` (or null), one per follow-up file.
    follow_up_metadata: Option<String>,
    /// Update only: initial evidence ids to remove, JSON array or comma separated.
    delete_initial_ids: Option<String>,
    /// Update only: follow-up evidence ids to remove.
    delete_follow_up_ids: Option<String>,
}

fn evidence_from(form: &mut MultipartForm) -> EvidenceBatch {
    let mut files = Vec::new();
    for (field, category) in [
        (INITIAL_FILES, EvidenceCategory::Inicial),
        (FOLLOW_UP_FILES, EvidenceCategory::Seguimiento),
    ] {
        files.extend(form.take_files(field).into_iter().map(|part| EvidenceUpload {
            category,
            bytes: part.bytes,
            filename: part.filename,
        }));
    }

    EvidenceBatch {
        files,
        initial_metadata: parse_gps_metadata(form.text("initial_metadata")),
        follow_up_metadata: parse_gps_metadata(form.text("follow_up_metadata")),
    }
}

#[utoipa::path(
    get,
    path = "/work-logs",
    tag = "Work logs",
    params(SiteFilter),
    responses((status = 200, description = "Work logs visible to the caller", body = [WorkLog])),
    security(("bearer_auth" = []))
)]
pub async fn list_work_logs(
    State(state): State<AppState>,
    caller: Caller,
    Query(filter): Query<SiteFilter>,
) -> AppResult<Json<Vec<WorkLog>>> {
    Ok(Json(work_logs::list_work_logs(&state, &caller, filter.site_id).await?))
}

#[utoipa::path(
    post,
    path = "/work-logs",
    tag = "Work logs",
    request_body(content = WorkLogForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Work log created with a generated code", body = WorkLog),
        (status = 403, description = "Site belongs to another organization"),
        (status = 404, description = "Referenced site or catalogue entry not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_work_log(
    State(state): State<AppState>,
    caller: Caller,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<WorkLog>)> {
    let mut form = MultipartForm::read(multipart).await?;
    let payload: WorkLogCreateRequest = form.data()?;
    let evidence = evidence_from(&mut form);

    let work_log = work_logs::create_work_log(&state, &caller, payload, evidence).await?;
    Ok((StatusCode::CREATED, Json(work_log)))
}

#[utoipa::path(
    get,
    path = "/work-logs/{id}",
    tag = "Work logs",
    params(("id" = i64, Path, description = "Work log id")),
    responses(
        (status = 200, description = "Work log with both evidence collections", body = WorkLog),
        (status = 403, description = "Work log belongs to another organization"),
        (status = 404, description = "Work log not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_work_log(State(state): State<AppState>, caller: Caller, Path(id): Path<i64>) -> AppResult<Json<WorkLog>> {
    Ok(Json(work_logs::get_work_log(&state, &caller, id).await?))
}

#[utoipa::path(
    put,
    path = "/work-logs/{id}",
    tag = "Work logs",
    params(("id" = i64, Path, description = "Work log id")),
    request_body(content = WorkLogForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Fields updated, listed evidence removed, new evidence added", body = WorkLog),
        (status = 400, description = "Malformed payload or id list")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_work_log(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> AppResult<Json<WorkLog>> {
    let mut form = MultipartForm::read(multipart).await?;
    let payload: WorkLogUpdateRequest = form.data_or_default()?;
    let deletion = EvidenceDeletion {
        initial_ids: parse_id_list(form.text("delete_initial_ids"))?,
        follow_up_ids: parse_id_list(form.text("delete_follow_up_ids"))?,
    };
    let evidence = evidence_from(&mut form);

    Ok(Json(
        work_logs::update_work_log(&state, &caller, id, payload, deletion, evidence).await?,
    ))
}

#[utoipa::path(
    delete,
    path = "/work-logs/{id}",
    tag = "Work logs",
    params(("id" = i64, Path, description = "Work log id")),
    responses((status = 204, description = "Work log and its evidence deleted")),
    security(("bearer_auth" = []))
)]
pub async fn delete_work_log(State(state): State<AppState>, caller: Caller, Path(id): Path<i64>) -> AppResult<StatusCode> {
    work_logs::delete_work_log(&state, &caller, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
