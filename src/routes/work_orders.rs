use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::app::AppState;
use crate::authz::Caller;
use crate::errors::AppResult;
use crate::models::work_order::{WorkOrder, WorkOrderCreateRequest, WorkOrderSummary};
use crate::routes::form::MultipartForm;
use crate::services::work_orders;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders).post(create_order))
        .route("/:id", get(get_order).delete(delete_order))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SiteFilter {
    /// Restrict results to one site.
    pub site_id: Option<i64>,
}

/// `multipart/form-data` body for order creation.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct WorkOrderForm {
    /// JSON encoded [`WorkOrderCreateRequest`].
    #[schema(value_type = WorkOrderCreateRequest)]
    data: String,
    /// Optional photo for the activity.
    #[schema(value_type = Option<String>, format = Binary)]
    file: Option<Vec<u8>>,
}

#[utoipa::path(
    get,
    path = "/work-orders",
    tag = "Work orders",
    params(SiteFilter),
    responses((status = 200, description = "Orders visible to the caller", body = [WorkOrderSummary])),
    security(("bearer_auth" = []))
)]
pub async fn list_orders(
    State(state): State<AppState>,
    caller: Caller,
    Query(filter): Query<SiteFilter>,
) -> AppResult<Json<Vec<WorkOrderSummary>>> {
    Ok(Json(work_orders::list_orders(&state, &caller, filter.site_id).await?))
}

#[utoipa::path(
    post,
    path = "/work-orders",
    tag = "Work orders",
    request_body(content = WorkOrderForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Order created with its folder, activity and evaluation", body = WorkOrder),
        (status = 400, description = "Malformed payload or site id"),
        (status = 403, description = "Site belongs to another organization"),
        (status = 500, description = "Attachment upload failed; nothing was stored")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_order(
    State(state): State<AppState>,
    caller: Caller,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<WorkOrder>)> {
    let mut form = MultipartForm::read(multipart).await?;
    let payload: WorkOrderCreateRequest = form.data()?;
    let attachment = form.take_file("file");

    let order = work_orders::create_order(&state, &caller, payload, attachment).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

#[utoipa::path(
    get,
    path = "/work-orders/{id}",
    tag = "Work orders",
    params(("id" = i64, Path, description = "Work order id")),
    responses(
        (status = 200, description = "Order with its full hierarchy", body = WorkOrder),
        (status = 403, description = "Order belongs to another organization"),
        (status = 404, description = "Order not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_order(State(state): State<AppState>, caller: Caller, Path(id): Path<i64>) -> AppResult<Json<WorkOrder>> {
    Ok(Json(work_orders::get_order(&state, &caller, id).await?))
}

#[utoipa::path(
    delete,
    path = "/work-orders/{id}",
    tag = "Work orders",
    params(("id" = i64, Path, description = "Work order id")),
    responses((status = 204, description = "Order deleted")),
    security(("bearer_auth" = []))
)]
pub async fn delete_order(State(state): State<AppState>, caller: Caller, Path(id): Path<i64>) -> AppResult<StatusCode> {
    work_orders::delete_order(&state, &caller, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
