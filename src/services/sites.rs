use std::collections::{HashMap, HashSet};

use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use validator::Validate;

use crate::app::AppState;
use crate::authz::{authorize_access, effective_tenant_id, require, resolve_scope, Caller, EntityType, Operation, Role};
use crate::db;
use crate::errors::{AppError, AppResult};
use crate::models::site::{DbSite, Site, SiteCreateRequest, SiteUpdateRequest};
use crate::quota::ResourceKind;
use crate::services::users::fetch_user;
use crate::utils::{non_blank, utc_now};

const SITE_COLUMNS: &str = "s.id, s.prefix, s.name, s.observations, s.creator_id, s.director_id, s.status, s.created_at, s.updated_at";

async fn load_responsibles(conn: &mut SqliteConnection, site_ids: &[i64]) -> AppResult<HashMap<i64, Vec<i64>>> {
    let mut by_site: HashMap<i64, Vec<i64>> = HashMap::new();
    if site_ids.is_empty() {
        return Ok(by_site);
    }

    let mut qb = QueryBuilder::<Sqlite>::new("SELECT site_id, user_id FROM site_responsibles WHERE site_id IN (");
    let mut separated = qb.separated(", ");
    for id in site_ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(") ORDER BY site_id, user_id");

    let rows: Vec<(i64, i64)> = qb.build_query_as().fetch_all(&mut *conn).await?;
    for (site_id, user_id) in rows {
        by_site.entry(site_id).or_default().push(user_id);
    }
    Ok(by_site)
}

/// Site with its responsibles, unchecked.
pub async fn fetch_site(conn: &mut SqliteConnection, site_id: i64) -> AppResult<Site> {
    let row = sqlx::query_as::<_, DbSite>(&format!("SELECT {SITE_COLUMNS} FROM sites s WHERE s.id = ?"))
        .bind(site_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::not_found("site not found"))?;

    let mut responsibles = load_responsibles(conn, &[row.id]).await?;
    let ids = responsibles.remove(&row.id).unwrap_or_default();
    Ok(row.with_responsibles(ids))
}

/// Responsibles must be distinct active users; a DIRECTOR may only assign
/// people from their own organization.
async fn check_responsibles(conn: &mut SqliteConnection, caller: &Caller, ids: &[i64]) -> AppResult<()> {
    if ids.is_empty() {
        return Err(AppError::bad_request("at least one responsible user is required"));
    }
    let mut seen = HashSet::with_capacity(ids.len());
    if let Some(dup) = ids.iter().find(|id| !seen.insert(**id)) {
        return Err(AppError::bad_request(format!("responsible user {dup} listed twice")));
    }

    for id in ids {
        let user = fetch_user(conn, *id)
            .await
            .map_err(|err| match err {
                AppError::NotFound(_) => AppError::not_found(format!("responsible user {id} not found")),
                other => other,
            })?;
        if !user.active {
            return Err(AppError::bad_request(format!("responsible user {id} is disabled")));
        }
        if caller.role == Role::Director && user.id != caller.user_id && user.owner_director_id != Some(caller.user_id) {
            return Err(AppError::forbidden(format!(
                "responsible user {id} belongs to another organization"
            )));
        }
    }
    Ok(())
}

async fn replace_responsibles(conn: &mut SqliteConnection, site_id: i64, ids: &[i64]) -> AppResult<()> {
    sqlx::query("DELETE FROM site_responsibles WHERE site_id = ?")
        .bind(site_id)
        .execute(&mut *conn)
        .await?;
    for user_id in ids {
        sqlx::query("INSERT INTO site_responsibles (site_id, user_id) VALUES (?, ?)")
            .bind(site_id)
            .bind(user_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

pub async fn list_sites(state: &AppState, caller: &Caller) -> AppResult<Vec<Site>> {
    require(caller, EntityType::Site, Operation::Read)?;

    let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {SITE_COLUMNS} FROM sites s WHERE 1 = 1"));
    resolve_scope(caller, EntityType::Site).push_filter(&mut qb, EntityType::Site);
    qb.push(" ORDER BY s.id");

    let mut conn = state.pool.acquire().await?;
    let rows = qb.build_query_as::<DbSite>().fetch_all(&mut *conn).await?;
    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let mut responsibles = load_responsibles(&mut conn, &ids).await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let ids = responsibles.remove(&row.id).unwrap_or_default();
            row.with_responsibles(ids)
        })
        .collect())
}

pub async fn get_site(state: &AppState, caller: &Caller, site_id: i64) -> AppResult<Site> {
    require(caller, EntityType::Site, Operation::Read)?;

    let mut conn = state.pool.acquire().await?;
    let site = fetch_site(&mut conn, site_id).await?;
    authorize_access(caller, &site, EntityType::Site).into_result()?;
    Ok(site)
}

pub async fn create_site(state: &AppState, caller: &Caller, req: SiteCreateRequest) -> AppResult<Site> {
    require(caller, EntityType::Site, Operation::Create)?;
    req.validate()?;

    let prefix = req.prefix.trim().to_uppercase();
    if prefix.is_empty() {
        return Err(AppError::bad_request("prefix is required"));
    }
    let director_id = effective_tenant_id(caller);

    let mut tx = db::begin_write(&state.pool).await?;

    let _permit = if caller.is_director() {
        Some(
            state
                .quota
                .check_and_reserve(&mut tx, caller.user_id, ResourceKind::Sites, caller.max_obras)
                .await?,
        )
    } else {
        None
    };

    check_responsibles(&mut tx, caller, &req.responsible_ids).await?;

    let now = utc_now();
    let site_id = sqlx::query(
        "INSERT INTO sites (prefix, name, observations, creator_id, director_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&prefix)
    .bind(req.name.trim())
    .bind(non_blank(req.observations.as_deref()))
    .bind(caller.user_id)
    .bind(director_id)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    replace_responsibles(&mut tx, site_id, &req.responsible_ids).await?;
    let site = fetch_site(&mut tx, site_id).await?;
    tx.commit().await?;

    tracing::info!(site_id, prefix = %site.prefix, director_id = ?director_id, "site created");
    Ok(site)
}

pub async fn update_site(state: &AppState, caller: &Caller, site_id: i64, req: SiteUpdateRequest) -> AppResult<Site> {
    require(caller, EntityType::Site, Operation::Update)?;

    let mut tx = db::begin_write(&state.pool).await?;
    let current = fetch_site(&mut tx, site_id).await?;
    authorize_access(caller, &current, EntityType::Site).into_result()?;

    let name = match req.name.as_deref().map(str::trim) {
        Some("") => return Err(AppError::bad_request("name cannot be empty")),
        Some(name) => name.to_string(),
        None => current.name.clone(),
    };
    let observations = req
        .observations
        .apply(current.observations.clone())
        .filter(|text| !text.trim().is_empty());
    let status = req.status.unwrap_or(current.status);

    sqlx::query("UPDATE sites SET name = ?, observations = ?, status = ?, updated_at = ? WHERE id = ?")
        .bind(name)
        .bind(observations)
        .bind(status)
        .bind(utc_now())
        .bind(site_id)
        .execute(&mut *tx)
        .await?;

    if let Some(ids) = req.responsible_ids.as_deref() {
        check_responsibles(&mut tx, caller, ids).await?;
        replace_responsibles(&mut tx, site_id, ids).await?;
    }

    let site = fetch_site(&mut tx, site_id).await?;
    tx.commit().await?;
    Ok(site)
}

pub async fn delete_site(state: &AppState, caller: &Caller, site_id: i64) -> AppResult<()> {
    require(caller, EntityType::Site, Operation::Delete)?;

    let mut tx = db::begin_write(&state.pool).await?;
    let site = fetch_site(&mut tx, site_id).await?;
    authorize_access(caller, &site, EntityType::Site).into_result()?;

    sqlx::query("DELETE FROM sites WHERE id = ?")
        .bind(site_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(site_id, deleted_by = caller.user_id, "site deleted");
    Ok(())
}
