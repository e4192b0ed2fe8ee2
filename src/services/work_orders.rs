//! Work-order hierarchy engine.
//!
//! An order is created together with exactly one folder, one activity, one
//! evaluation and at most one media row, in a single transaction. The
//! attachment is uploaded after the site check and before the transaction
//! opens, so a failed upload writes nothing and a slow one holds no lock.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use validator::Validate;

use crate::app::AppState;
use crate::authz::{
    authorize_access, effective_tenant_id, require, resolve_scope, Caller, EntityType, Operation,
};
use crate::db;
use crate::errors::{AppError, AppResult};
use crate::models::site::Site;
use crate::models::work_order::{
    Activity, ActivityMedia, DbActivity, DbFolder, DbWorkOrder, Evaluation, Folder, WorkOrder,
    WorkOrderCreateRequest, WorkOrderStatus, WorkOrderSummary,
};
use crate::services::sites::fetch_site;
use crate::upload::FilePart;
use crate::utils::{non_blank, utc_now};

const ORDER_COLUMNS: &str = "o.id, o.site_id, o.responsible_id, o.identifier, o.objective, o.work_type, o.status, \
     o.scheduled_date, o.created_at";

/// Join the free-text notes onto the selected reason.
pub fn compose_observation(reason: Option<&str>, notes: Option<&str>) -> Option<String> {
    match (non_blank(reason), non_blank(notes)) {
        (Some(reason), Some(notes)) => Some(format!("{reason}: {notes}")),
        (Some(reason), None) => Some(reason.to_string()),
        (None, Some(notes)) => Some(notes.to_string()),
        (None, None) => None,
    }
}

pub fn default_identifier(now: DateTime<Utc>) -> String {
    format!("OT-{}", now.format("%Y%m%d%H%M%S%3f"))
}

/// Orders are attributed by tenant only; being a site responsible does not
/// let a user from another organization open orders on it.
fn may_create_on(caller: &Caller, site: &Site) -> bool {
    if caller.is_admin() {
        return true;
    }
    match effective_tenant_id(caller) {
        Some(tenant_id) => site.director_id == Some(tenant_id),
        None => false,
    }
}

fn ensure_may_create_on(caller: &Caller, site: &Site) -> AppResult<()> {
    if may_create_on(caller, site) {
        return Ok(());
    }
    tracing::warn!(
        user_id = caller.user_id,
        role = %caller.role,
        site_id = site.id,
        "work order denied: site belongs to another organization"
    );
    Err(AppError::forbidden("site belongs to another organization"))
}

pub async fn create_order(
    state: &AppState,
    caller: &Caller,
    req: WorkOrderCreateRequest,
    attachment: Option<FilePart>,
) -> AppResult<WorkOrder> {
    require(caller, EntityType::WorkOrder, Operation::Create)?;
    let site_id = req.site_id.parse("site_id")?;
    req.validate()?;

    {
        let mut conn = state.pool.acquire().await?;
        let site = fetch_site(&mut conn, site_id).await?;
        ensure_may_create_on(caller, &site)?;
    }

    let uploaded = match attachment {
        Some(file) => {
            let object = state
                .uploader
                .upload(file.bytes, file.filename.as_deref())
                .await
                .map_err(|err| {
                    tracing::error!(site_id, error = %err, "work order attachment upload failed");
                    err
                })?;
            Some(object.url)
        }
        None => None,
    };

    let mut tx = db::begin_write(&state.pool).await?;
    // the site may have been removed while the upload ran
    let site = fetch_site(&mut tx, site_id).await?;
    ensure_may_create_on(caller, &site)?;

    let now = utc_now();
    let identifier = non_blank(req.identifier.as_deref())
        .map(str::to_string)
        .unwrap_or_else(|| default_identifier(now));

    let order_id = sqlx::query(
        "INSERT INTO work_orders (site_id, responsible_id, identifier, objective, work_type, status, scheduled_date, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(site_id)
    .bind(caller.user_id)
    .bind(&identifier)
    .bind(req.objective.trim())
    .bind(req.work_type.trim())
    .bind(WorkOrderStatus::default())
    .bind(req.date)
    .bind(now)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    let folder_id = sqlx::query("INSERT INTO folders (work_order_id, position, name, created_at) VALUES (?, 1, ?, ?)")
        .bind(order_id)
        .bind(req.folder.trim())
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

    let activity_id = sqlx::query("INSERT INTO activities (folder_id, position, name, created_at) VALUES (?, 1, ?, ?)")
        .bind(folder_id)
        .bind(req.activity.trim())
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

    let observation = compose_observation(req.reason_selector.as_deref(), req.notes.as_deref());
    sqlx::query("INSERT INTO activity_evaluations (activity_id, outcome, observation, created_at) VALUES (?, ?, ?, ?)")
        .bind(activity_id)
        .bind(req.outcome)
        .bind(observation)
        .bind(now)
        .execute(&mut *tx)
        .await?;

    if let Some(url) = uploaded {
        sqlx::query("INSERT INTO activity_media (activity_id, url, created_at) VALUES (?, ?, ?)")
            .bind(activity_id)
            .bind(url)
            .bind(now)
            .execute(&mut *tx)
            .await?;
    }

    let order = load_tree(&mut tx, order_id).await?;
    tx.commit().await?;

    tracing::info!(order_id, site_id, identifier = %identifier, "work order created");
    Ok(order)
}

async fn fetch_order_row(conn: &mut SqliteConnection, order_id: i64) -> AppResult<DbWorkOrder> {
    sqlx::query_as::<_, DbWorkOrder>(&format!(
        "SELECT {ORDER_COLUMNS}, s.director_id AS site_director_id \
         FROM work_orders o JOIN sites s ON s.id = o.site_id WHERE o.id = ?"
    ))
    .bind(order_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found("work order not found"))
}

async fn load_tree(conn: &mut SqliteConnection, order_id: i64) -> AppResult<WorkOrder> {
    let row = fetch_order_row(conn, order_id).await?;
    assemble(conn, row).await
}

async fn assemble(conn: &mut SqliteConnection, row: DbWorkOrder) -> AppResult<WorkOrder> {
    let folders = sqlx::query_as::<_, DbFolder>(
        "SELECT id, work_order_id, position, name FROM folders WHERE work_order_id = ? ORDER BY position, id",
    )
    .bind(row.id)
    .fetch_all(&mut *conn)
    .await?;

    let activities = sqlx::query_as::<_, DbActivity>(
        "SELECT a.id, a.folder_id, a.position, a.name FROM activities a \
         JOIN folders f ON f.id = a.folder_id WHERE f.work_order_id = ? ORDER BY a.position, a.id",
    )
    .bind(row.id)
    .fetch_all(&mut *conn)
    .await?;

    let evaluations = sqlx::query_as::<_, Evaluation>(
        "SELECT e.id, e.activity_id, e.outcome, e.observation FROM activity_evaluations e \
         JOIN activities a ON a.id = e.activity_id JOIN folders f ON f.id = a.folder_id \
         WHERE f.work_order_id = ?",
    )
    .bind(row.id)
    .fetch_all(&mut *conn)
    .await?;

    let media = sqlx::query_as::<_, ActivityMedia>(
        "SELECT m.id, m.activity_id, m.url FROM activity_media m \
         JOIN activities a ON a.id = m.activity_id JOIN folders f ON f.id = a.folder_id \
         WHERE f.work_order_id = ? ORDER BY m.id",
    )
    .bind(row.id)
    .fetch_all(&mut *conn)
    .await?;

    let mut evaluation_by_activity: HashMap<i64, Evaluation> =
        evaluations.into_iter().map(|e| (e.activity_id, e)).collect();
    let mut media_by_activity: HashMap<i64, Vec<ActivityMedia>> = HashMap::new();
    for item in media {
        media_by_activity.entry(item.activity_id).or_default().push(item);
    }
    let mut activities_by_folder: HashMap<i64, Vec<Activity>> = HashMap::new();
    for activity in activities {
        activities_by_folder.entry(activity.folder_id).or_default().push(Activity {
            evaluation: evaluation_by_activity.remove(&activity.id),
            media: media_by_activity.remove(&activity.id).unwrap_or_default(),
            id: activity.id,
            folder_id: activity.folder_id,
            position: activity.position,
            name: activity.name,
        });
    }

    let folders = folders
        .into_iter()
        .map(|folder| Folder {
            activities: activities_by_folder.remove(&folder.id).unwrap_or_default(),
            id: folder.id,
            work_order_id: folder.work_order_id,
            position: folder.position,
            name: folder.name,
        })
        .collect();

    Ok(WorkOrder {
        id: row.id,
        site_id: row.site_id,
        responsible_id: row.responsible_id,
        identifier: row.identifier,
        objective: row.objective,
        work_type: row.work_type,
        status: row.status,
        scheduled_date: row.scheduled_date,
        created_at: row.created_at,
        folders,
    })
}

pub async fn list_orders(state: &AppState, caller: &Caller, site_id: Option<i64>) -> AppResult<Vec<WorkOrderSummary>> {
    require(caller, EntityType::WorkOrder, Operation::Read)?;

    let mut qb = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {ORDER_COLUMNS} FROM work_orders o JOIN sites s ON s.id = o.site_id WHERE 1 = 1"
    ));
    if let Some(site_id) = site_id {
        qb.push(" AND o.site_id = ");
        qb.push_bind(site_id);
    }
    resolve_scope(caller, EntityType::WorkOrder).push_filter(&mut qb, EntityType::WorkOrder);
    qb.push(" ORDER BY o.id DESC");

    Ok(qb.build_query_as::<WorkOrderSummary>().fetch_all(&state.pool).await?)
}

pub async fn get_order(state: &AppState, caller: &Caller, order_id: i64) -> AppResult<WorkOrder> {
    require(caller, EntityType::WorkOrder, Operation::Read)?;

    let mut conn = state.pool.acquire().await?;
    let row = fetch_order_row(&mut conn, order_id).await?;
    authorize_access(caller, &row, EntityType::WorkOrder).into_result()?;
    assemble(&mut conn, row).await
}

pub async fn delete_order(state: &AppState, caller: &Caller, order_id: i64) -> AppResult<()> {
    require(caller, EntityType::WorkOrder, Operation::Delete)?;

    let mut tx = db::begin_write(&state.pool).await?;
    let row = fetch_order_row(&mut tx, order_id).await?;
    authorize_access(caller, &row, EntityType::WorkOrder).into_result()?;

    sqlx::query("DELETE FROM work_orders WHERE id = ?")
        .bind(order_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}
