//! Work-log (bitácora) lifecycle.
//!
//! Codes are `{site prefix}-{NN}` and are assigned once, inside the insert
//! transaction, while holding the site's sequence lock. Evidence updates run
//! in three ordered phases (fields, deletions, additions); all uploads finish
//! before the transaction opens, and the three phases commit together.

use std::collections::HashMap;

use chrono::NaiveDate;
use futures::future::try_join_all;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use validator::Validate;

use crate::app::AppState;
use crate::authz::{authorize_access, require, resolve_scope, Caller, EntityType, Operation};
use crate::db;
use crate::errors::{AppError, AppResult};
use crate::locks::LockKey;
use crate::models::site::Site;
use crate::models::work_log::{
    DbWorkLog, EvidenceBatch, EvidenceCategory, EvidenceDeletion, GpsMetadata, WorkLog, WorkLogCreateRequest,
    WorkLogMedia, WorkLogStatus, WorkLogUpdateRequest,
};
use crate::models::Patch;
use crate::services::contractors::fetch_contractor;
use crate::services::sites::fetch_site;
use crate::services::{ensure_exists, Reference};
use crate::upload::Uploader;
use crate::utils::{non_blank, utc_now};

const LOG_COLUMNS: &str = "w.id, w.site_id, w.responsible_id, w.contractor_id, w.variable_id, w.measurement_id, \
     w.unit_id, w.status, w.code, w.creation_date, w.location, w.notes, w.follow_up, w.commitment_date, \
     w.execution_date, w.latitude, w.longitude, w.created_at, w.updated_at, s.director_id AS site_director_id";

const MEDIA_COLUMNS: &str = "id, work_log_id, category, url, latitude, longitude, created_at";

pub fn format_code(prefix: &str, sequence: i64) -> String {
    format!("{prefix}-{sequence:02}")
}

/// Parse the per-photo GPS list sent alongside evidence files. Malformed input
/// is logged and treated as "no metadata".
pub fn parse_gps_metadata(raw: Option<&str>) -> Vec<Option<GpsMetadata>> {
    let Some(raw) = non_blank(raw) else {
        return Vec::new();
    };
    match serde_json::from_str::<Vec<Option<GpsMetadata>>>(raw) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!(error = %err, "ignoring malformed evidence metadata");
            Vec::new()
        }
    }
}

/// An uploaded file waiting for its media row.
#[derive(Debug)]
struct StagedMedia {
    category: EvidenceCategory,
    url: String,
    gps: GpsMetadata,
}

async fn upload_evidence(uploader: &dyn Uploader, batch: EvidenceBatch) -> AppResult<Vec<StagedMedia>> {
    if batch.is_empty() {
        return Ok(Vec::new());
    }

    let uploads = batch.paired().into_iter().map(move |(file, gps)| async move {
        let object = uploader.upload(file.bytes, file.filename.as_deref()).await?;
        Ok::<_, AppError>(StagedMedia {
            category: file.category,
            url: object.url,
            gps,
        })
    });

    try_join_all(uploads).await.map_err(|err| {
        tracing::error!(error = %err, "evidence upload failed");
        err
    })
}

async fn insert_media(conn: &mut SqliteConnection, work_log_id: i64, staged: &[StagedMedia]) -> AppResult<()> {
    let now = utc_now();
    for item in staged {
        sqlx::query(
            "INSERT INTO work_log_media (work_log_id, category, url, latitude, longitude, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(work_log_id)
        .bind(item.category)
        .bind(&item.url)
        .bind(item.gps.latitude)
        .bind(item.gps.longitude)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Delete the listed ids of one category, but only those attached to `work_log_id`.
async fn delete_media(
    conn: &mut SqliteConnection,
    work_log_id: i64,
    category: EvidenceCategory,
    ids: &[i64],
) -> AppResult<u64> {
    if ids.is_empty() {
        return Ok(0);
    }

    let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM work_log_media WHERE work_log_id = ");
    qb.push_bind(work_log_id);
    qb.push(" AND category = ");
    qb.push_bind(category);
    qb.push(" AND id IN (");
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");

    let removed = qb.build().execute(&mut *conn).await?.rows_affected();
    if removed < ids.len() as u64 {
        tracing::debug!(
            work_log_id,
            requested = ids.len(),
            removed,
            "some evidence ids did not belong to the work log"
        );
    }
    Ok(removed)
}

async fn fetch_log_row(conn: &mut SqliteConnection, work_log_id: i64) -> AppResult<DbWorkLog> {
    sqlx::query_as::<_, DbWorkLog>(&format!(
        "SELECT {LOG_COLUMNS} FROM work_logs w JOIN sites s ON s.id = w.site_id WHERE w.id = ?"
    ))
    .bind(work_log_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found("work log not found"))
}

async fn load_media(conn: &mut SqliteConnection, log_ids: &[i64]) -> AppResult<HashMap<i64, Vec<WorkLogMedia>>> {
    let mut by_log: HashMap<i64, Vec<WorkLogMedia>> = HashMap::new();
    if log_ids.is_empty() {
        return Ok(by_log);
    }

    let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {MEDIA_COLUMNS} FROM work_log_media WHERE work_log_id IN ("));
    let mut separated = qb.separated(", ");
    for id in log_ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(") ORDER BY id");

    for media in qb.build_query_as::<WorkLogMedia>().fetch_all(&mut *conn).await? {
        by_log.entry(media.work_log_id).or_default().push(media);
    }
    Ok(by_log)
}

async fn load_work_log(conn: &mut SqliteConnection, row: DbWorkLog) -> AppResult<WorkLog> {
    let mut media = load_media(conn, &[row.id]).await?;
    let items = media.remove(&row.id).unwrap_or_default();
    Ok(row.into_work_log(items))
}

/// Referenced catalogue rows must exist; a contractor must also be
/// unattributed or belong to the site's organization.
async fn check_references(
    conn: &mut SqliteConnection,
    site: &Site,
    variable_id: Option<i64>,
    contractor_id: Option<i64>,
    measurement_id: Option<i64>,
    unit_id: Option<i64>,
) -> AppResult<()> {
    if let Some(id) = variable_id {
        ensure_exists(conn, Reference::Variable, id).await?;
    }
    if let Some(id) = measurement_id {
        ensure_exists(conn, Reference::Measurement, id).await?;
    }
    if let Some(id) = unit_id {
        ensure_exists(conn, Reference::Unit, id).await?;
    }
    if let Some(id) = contractor_id {
        let contractor = fetch_contractor(conn, id).await?;
        if contractor.director_id.is_some() && contractor.director_id != site.director_id {
            return Err(AppError::forbidden(format!(
                "contractor {id} belongs to another organization"
            )));
        }
    }
    Ok(())
}

fn check_coordinates(latitude: Option<f64>, longitude: Option<f64>) -> AppResult<()> {
    if latitude.is_some_and(|lat| !(-90.0..=90.0).contains(&lat)) {
        return Err(AppError::bad_request("latitude must be between -90 and 90"));
    }
    if longitude.is_some_and(|lon| !(-180.0..=180.0).contains(&lon)) {
        return Err(AppError::bad_request("longitude must be between -180 and 180"));
    }
    Ok(())
}

/// Next free code for the site. Must run under the site's sequence lock and
/// inside the insert transaction.
async fn next_code(conn: &mut SqliteConnection, site: &Site) -> AppResult<String> {
    let existing: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM work_logs WHERE site_id = ?")
        .bind(site.id)
        .fetch_one(&mut *conn)
        .await?;

    // deletions leave gaps, so skip codes still in use
    let mut sequence = existing + 1;
    loop {
        let code = format_code(&site.prefix, sequence);
        let taken: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM work_logs WHERE site_id = ? AND code = ?")
            .bind(site.id)
            .bind(&code)
            .fetch_one(&mut *conn)
            .await?;
        if taken == 0 {
            return Ok(code);
        }
        sequence += 1;
    }
}

pub async fn create_work_log(
    state: &AppState,
    caller: &Caller,
    req: WorkLogCreateRequest,
    evidence: EvidenceBatch,
) -> AppResult<WorkLog> {
    require(caller, EntityType::WorkLog, Operation::Create)?;
    req.validate()?;

    {
        let mut conn = state.pool.acquire().await?;
        let site = fetch_site(&mut conn, req.site_id).await?;
        authorize_access(caller, &site, EntityType::WorkLog).into_result()?;
        check_references(
            &mut conn,
            &site,
            Some(req.variable_id),
            req.contractor_id,
            req.measurement_id,
            req.unit_id,
        )
        .await?;
    }

    let staged = upload_evidence(state.uploader.as_ref(), evidence).await?;

    let _sequence = state.locks.acquire(LockKey::SiteSequence(req.site_id)).await;
    let mut tx = db::begin_write(&state.pool).await?;
    let site = fetch_site(&mut tx, req.site_id).await?;
    let code = next_code(&mut tx, &site).await?;
    let now = utc_now();

    let work_log_id = sqlx::query(
        "INSERT INTO work_logs (site_id, responsible_id, contractor_id, variable_id, measurement_id, unit_id, status, code, \
         creation_date, location, notes, follow_up, commitment_date, execution_date, latitude, longitude, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(site.id)
    .bind(caller.user_id)
    .bind(req.contractor_id)
    .bind(req.variable_id)
    .bind(req.measurement_id)
    .bind(req.unit_id)
    .bind(req.status)
    .bind(&code)
    .bind(req.creation_date)
    .bind(req.location.trim())
    .bind(non_blank(req.notes.as_deref()))
    .bind(non_blank(req.follow_up.as_deref()))
    .bind(req.commitment_date)
    .bind(req.execution_date)
    .bind(req.latitude)
    .bind(req.longitude)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    insert_media(&mut tx, work_log_id, &staged).await?;

    let row = fetch_log_row(&mut tx, work_log_id).await?;
    let work_log = load_work_log(&mut tx, row).await?;
    tx.commit().await?;

    tracing::info!(work_log_id, site_id = site.id, code = %code, evidence = staged.len(), "work log created");
    Ok(work_log)
}

/// Column values of a work log after applying an update to the stored row.
struct MergedFields {
    contractor_id: Option<i64>,
    variable_id: i64,
    measurement_id: Option<i64>,
    unit_id: Option<i64>,
    status: WorkLogStatus,
    creation_date: NaiveDate,
    location: String,
    notes: Option<String>,
    follow_up: Option<String>,
    commitment_date: Option<NaiveDate>,
    execution_date: Option<NaiveDate>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

fn merge_fields(req: &WorkLogUpdateRequest, current: &DbWorkLog) -> AppResult<MergedFields> {
    let location = match non_blank(req.location.as_deref()) {
        Some(location) => location.to_string(),
        None if req.location.is_some() => return Err(AppError::bad_request("location cannot be empty")),
        None => current.location.clone(),
    };
    let latitude = req.latitude.clone().apply(current.latitude);
    let longitude = req.longitude.clone().apply(current.longitude);
    check_coordinates(latitude, longitude)?;

    Ok(MergedFields {
        contractor_id: req.contractor_id.clone().apply(current.contractor_id),
        variable_id: req.variable_id.unwrap_or(current.variable_id),
        measurement_id: req.measurement_id.clone().apply(current.measurement_id),
        unit_id: req.unit_id.clone().apply(current.unit_id),
        status: req.status.unwrap_or(current.status),
        creation_date: req.creation_date.unwrap_or(current.creation_date),
        location,
        notes: req.notes.clone().apply(current.notes.clone()),
        follow_up: req.follow_up.clone().apply(current.follow_up.clone()),
        commitment_date: req.commitment_date.clone().apply(current.commitment_date),
        execution_date: req.execution_date.clone().apply(current.execution_date),
        latitude,
        longitude,
    })
}

pub async fn update_work_log(
    state: &AppState,
    caller: &Caller,
    work_log_id: i64,
    req: WorkLogUpdateRequest,
    deletion: EvidenceDeletion,
    evidence: EvidenceBatch,
) -> AppResult<WorkLog> {
    require(caller, EntityType::WorkLog, Operation::Update)?;

    let site = {
        let mut conn = state.pool.acquire().await?;
        let snapshot = fetch_log_row(&mut conn, work_log_id).await?;
        authorize_access(caller, &snapshot, EntityType::WorkLog).into_result()?;
        let site = fetch_site(&mut conn, snapshot.site_id).await?;

        let set = |patch: &Patch<i64>| match patch {
            Patch::Set(id) => Some(*id),
            _ => None,
        };
        check_references(
            &mut conn,
            &site,
            req.variable_id,
            set(&req.contractor_id),
            set(&req.measurement_id),
            set(&req.unit_id),
        )
        .await?;
        // reject bad input before anything is uploaded
        merge_fields(&req, &snapshot)?;
        site
    };

    let staged = upload_evidence(state.uploader.as_ref(), evidence).await?;

    let mut tx = db::begin_write(&state.pool).await?;
    let current = fetch_log_row(&mut tx, work_log_id).await?;
    let fields = merge_fields(&req, &current)?;

    // phase 1: fields
    sqlx::query(
        "UPDATE work_logs SET contractor_id = ?, variable_id = ?, measurement_id = ?, unit_id = ?, status = ?, \
         creation_date = ?, location = ?, notes = ?, follow_up = ?, commitment_date = ?, execution_date = ?, \
         latitude = ?, longitude = ?, updated_at = ? WHERE id = ?",
    )
    .bind(fields.contractor_id)
    .bind(fields.variable_id)
    .bind(fields.measurement_id)
    .bind(fields.unit_id)
    .bind(fields.status)
    .bind(fields.creation_date)
    .bind(fields.location)
    .bind(fields.notes)
    .bind(fields.follow_up)
    .bind(fields.commitment_date)
    .bind(fields.execution_date)
    .bind(fields.latitude)
    .bind(fields.longitude)
    .bind(utc_now())
    .bind(work_log_id)
    .execute(&mut *tx)
    .await?;

    // phase 2: deletions, scoped to this work log
    let removed_initial = delete_media(&mut tx, work_log_id, EvidenceCategory::Inicial, &deletion.initial_ids).await?;
    let removed_follow_up =
        delete_media(&mut tx, work_log_id, EvidenceCategory::Seguimiento, &deletion.follow_up_ids).await?;

    // phase 3: additions
    insert_media(&mut tx, work_log_id, &staged).await?;

    let row = fetch_log_row(&mut tx, work_log_id).await?;
    let work_log = load_work_log(&mut tx, row).await?;
    tx.commit().await?;

    tracing::info!(
        work_log_id,
        site_id = site.id,
        removed = removed_initial + removed_follow_up,
        added = staged.len(),
        "work log updated"
    );
    Ok(work_log)
}

pub async fn list_work_logs(state: &AppState, caller: &Caller, site_id: Option<i64>) -> AppResult<Vec<WorkLog>> {
    require(caller, EntityType::WorkLog, Operation::Read)?;

    let mut qb = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {LOG_COLUMNS} FROM work_logs w JOIN sites s ON s.id = w.site_id WHERE 1 = 1"
    ));
    if let Some(site_id) = site_id {
        qb.push(" AND w.site_id = ");
        qb.push_bind(site_id);
    }
    resolve_scope(caller, EntityType::WorkLog).push_filter(&mut qb, EntityType::WorkLog);
    qb.push(" ORDER BY w.id");

    let mut conn = state.pool.acquire().await?;
    let rows = qb.build_query_as::<DbWorkLog>().fetch_all(&mut *conn).await?;
    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let mut media = load_media(&mut conn, &ids).await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let items = media.remove(&row.id).unwrap_or_default();
            row.into_work_log(items)
        })
        .collect())
}

pub async fn get_work_log(state: &AppState, caller: &Caller, work_log_id: i64) -> AppResult<WorkLog> {
    require(caller, EntityType::WorkLog, Operation::Read)?;

    let mut conn = state.pool.acquire().await?;
    let row = fetch_log_row(&mut conn, work_log_id).await?;
    authorize_access(caller, &row, EntityType::WorkLog).into_result()?;
    load_work_log(&mut conn, row).await
}

pub async fn delete_work_log(state: &AppState, caller: &Caller, work_log_id: i64) -> AppResult<()> {
    require(caller, EntityType::WorkLog, Operation::Delete)?;

    let mut tx = db::begin_write(&state.pool).await?;
    let row = fetch_log_row(&mut tx, work_log_id).await?;
    authorize_access(caller, &row, EntityType::WorkLog).into_result()?;

    sqlx::query("DELETE FROM work_logs WHERE id = ?")
        .bind(work_log_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(work_log_id, code = %row.code, "work log deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_zero_padded_to_two_digits() {
        assert_eq!(format_code("AD24", 1), "AD24-01");
        assert_eq!(format_code("AD24", 12), "AD24-12");
        assert_eq!(format_code("X", 123), "X-123");
    }

    #[test]
    fn metadata_with_gaps_is_kept_positionally() {
        let parsed = parse_gps_metadata(Some(r#"[{"latitude": -33.4, "longitude": -70.6}, null, {}]"#));
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0].and_then(|g| g.latitude), Some(-33.4));
        assert!(parsed[1].is_none());
        assert_eq!(parsed[2], Some(GpsMetadata::default()));
    }

    #[test]
    fn malformed_metadata_degrades_to_nothing() {
        assert!(parse_gps_metadata(Some("{not json")).is_empty());
        assert!(parse_gps_metadata(Some("   ")).is_empty());
        assert!(parse_gps_metadata(None).is_empty());
    }

    #[test]
    fn coordinates_are_range_checked() {
        assert!(check_coordinates(Some(-33.4), Some(-70.6)).is_ok());
        assert!(check_coordinates(None, None).is_ok());
        assert!(matches!(check_coordinates(Some(91.0), None), Err(AppError::BadRequest(_))));
        assert!(matches!(check_coordinates(None, Some(-181.0)), Err(AppError::BadRequest(_))));
    }
}
