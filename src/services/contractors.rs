use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use validator::Validate;

use crate::app::AppState;
use crate::authz::{authorize_access, effective_tenant_id, require, resolve_scope, Caller, EntityType, Operation};
use crate::db;
use crate::errors::{AppError, AppResult};
use crate::models::contractor::{Contractor, ContractorCreateRequest};
use crate::utils::{non_blank, utc_now};

const CONTRACTOR_COLUMNS: &str = "c.id, c.name, c.tax_id, c.director_id, c.created_at";

pub async fn fetch_contractor(conn: &mut SqliteConnection, contractor_id: i64) -> AppResult<Contractor> {
    sqlx::query_as::<_, Contractor>(&format!(
        "SELECT {CONTRACTOR_COLUMNS} FROM contractors c WHERE c.id = ?"
    ))
    .bind(contractor_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found(format!("contractor {contractor_id} not found")))
}

pub async fn list_contractors(state: &AppState, caller: &Caller) -> AppResult<Vec<Contractor>> {
    require(caller, EntityType::Contractor, Operation::Read)?;

    let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {CONTRACTOR_COLUMNS} FROM contractors c WHERE 1 = 1"));
    resolve_scope(caller, EntityType::Contractor).push_filter(&mut qb, EntityType::Contractor);
    qb.push(" ORDER BY c.name, c.id");

    Ok(qb.build_query_as::<Contractor>().fetch_all(&state.pool).await?)
}

pub async fn get_contractor(state: &AppState, caller: &Caller, contractor_id: i64) -> AppResult<Contractor> {
    require(caller, EntityType::Contractor, Operation::Read)?;

    let mut conn = state.pool.acquire().await?;
    let contractor = fetch_contractor(&mut conn, contractor_id).await?;
    authorize_access(caller, &contractor, EntityType::Contractor).into_result()?;
    Ok(contractor)
}

pub async fn create_contractor(state: &AppState, caller: &Caller, req: ContractorCreateRequest) -> AppResult<Contractor> {
    require(caller, EntityType::Contractor, Operation::Create)?;
    req.validate()?;

    let director_id = effective_tenant_id(caller);
    if director_id.is_none() && !caller.is_admin() {
        return Err(AppError::forbidden("caller does not belong to an organization"));
    }

    let mut conn = state.pool.acquire().await?;
    let id = sqlx::query("INSERT INTO contractors (name, tax_id, director_id, created_at) VALUES (?, ?, ?, ?)")
        .bind(req.name.trim())
        .bind(non_blank(req.tax_id.as_deref()))
        .bind(director_id)
        .bind(utc_now())
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();

    fetch_contractor(&mut conn, id).await
}

pub async fn delete_contractor(state: &AppState, caller: &Caller, contractor_id: i64) -> AppResult<()> {
    require(caller, EntityType::Contractor, Operation::Delete)?;

    let mut tx = db::begin_write(&state.pool).await?;
    let contractor = fetch_contractor(&mut tx, contractor_id).await?;
    authorize_access(caller, &contractor, EntityType::Contractor).into_result()?;

    let in_use: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM work_logs WHERE contractor_id = ?")
        .bind(contractor_id)
        .fetch_one(&mut *tx)
        .await?;
    if in_use > 0 {
        return Err(AppError::conflict(format!(
            "contractor {contractor_id} is referenced by {in_use} work logs"
        )));
    }

    sqlx::query("DELETE FROM contractors WHERE id = ?")
        .bind(contractor_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}
