use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use validator::Validate;

use crate::app::AppState;
use crate::authz::{authorize_access, require, resolve_scope, Caller, EntityType, Operation, Role};
use crate::db;
use crate::errors::{AppError, AppResult};
use crate::models::user::{DbUser, User, UserCreateRequest, UserUpdateRequest};
use crate::models::Patch;
use crate::quota::ResourceKind;
use crate::utils::{hash_password, utc_now, verify_password};

const USER_COLUMNS: &str = "u.id, u.username, u.full_name, u.password_hash, u.role, u.owner_director_id, \
     u.max_users, u.max_obras, u.active, u.created_at, u.updated_at";

pub async fn fetch_user(conn: &mut SqliteConnection, user_id: i64) -> AppResult<DbUser> {
    sqlx::query_as::<_, DbUser>(&format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = ?"))
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))
}

/// Identity for a verified token subject; unknown or inactive users are unauthorized.
pub async fn load_caller(pool: &SqlitePool, user_id: i64) -> AppResult<Caller> {
    let mut conn = pool.acquire().await?;
    match fetch_user(&mut conn, user_id).await {
        Ok(user) if user.active => Ok(user.to_caller()),
        Ok(_) => Err(AppError::unauthorized("account is disabled")),
        Err(AppError::NotFound(_)) => Err(AppError::unauthorized("unknown account")),
        Err(err) => Err(err),
    }
}

pub async fn authenticate(state: &AppState, username: &str, password: &str) -> AppResult<(String, User)> {
    let user = sqlx::query_as::<_, DbUser>(&format!("SELECT {USER_COLUMNS} FROM users u WHERE u.username = ?"))
        .bind(username)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::unauthorized("invalid credentials"))?;

    if !user.active || !verify_password(password, &user.password_hash)? {
        return Err(AppError::unauthorized("invalid credentials"));
    }

    let token = state.jwt.encode(user.id)?;
    Ok((token, user.try_into()?))
}

/// The caller's own account; not subject to the policy table.
pub async fn profile(state: &AppState, caller: &Caller) -> AppResult<User> {
    let mut conn = state.pool.acquire().await?;
    fetch_user(&mut conn, caller.user_id).await?.try_into()
}

/// Resolve the owner DIRECTOR for a new account.
async fn resolve_owner(conn: &mut SqliteConnection, caller: &Caller, req: &UserCreateRequest) -> AppResult<Option<i64>> {
    if req.role.is_tenant_root() {
        return Ok(None);
    }

    match caller.role {
        Role::Director => Ok(Some(caller.user_id)),
        Role::Admin => {
            let owner_id = req
                .owner_director_id
                .ok_or_else(|| AppError::bad_request(format!("{} accounts need an owner_director_id", req.role)))?;
            let owner = fetch_user(conn, owner_id).await?;
            if owner.role != Role::Director || !owner.active {
                return Err(AppError::bad_request("owner_director_id must reference an active DIRECTOR"));
            }
            Ok(Some(owner_id))
        }
        _ => Err(AppError::forbidden("only ADMIN or DIRECTOR may create accounts")),
    }
}

pub async fn create_user(state: &AppState, caller: &Caller, req: UserCreateRequest) -> AppResult<User> {
    require(caller, EntityType::User, Operation::Create)?;

    // checked before the quota so the answer does not depend on usage
    if req.role.is_tenant_root() && !caller.is_admin() {
        return Err(AppError::forbidden("only ADMIN may create ADMIN or DIRECTOR accounts"));
    }

    req.validate()?;
    let password_hash = hash_password(&req.password)?;

    let (max_users, max_obras) = if req.role == Role::Director {
        (req.max_users, req.max_obras)
    } else {
        (None, None)
    };

    let mut tx = db::begin_write(&state.pool).await?;

    let _permit = if caller.is_director() {
        Some(
            state
                .quota
                .check_and_reserve(&mut tx, caller.user_id, ResourceKind::Users, caller.max_users)
                .await?,
        )
    } else {
        None
    };

    let owner_director_id = resolve_owner(&mut tx, caller, &req).await?;
    let now = utc_now();

    let user_id = sqlx::query(
        "INSERT INTO users (username, full_name, password_hash, role, owner_director_id, max_users, max_obras, active, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?, ?)",
    )
    .bind(req.username.trim())
    .bind(req.full_name.trim())
    .bind(password_hash)
    .bind(req.role)
    .bind(owner_director_id)
    .bind(max_users)
    .bind(max_obras)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    let user = fetch_user(&mut tx, user_id).await?;
    tx.commit().await?;

    tracing::info!(user_id, created_by = caller.user_id, role = %req.role, "user created");
    user.try_into()
}

pub async fn list_users(state: &AppState, caller: &Caller) -> AppResult<Vec<User>> {
    require(caller, EntityType::User, Operation::Read)?;

    let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {USER_COLUMNS} FROM users u WHERE 1 = 1"));
    resolve_scope(caller, EntityType::User).push_filter(&mut qb, EntityType::User);
    qb.push(" ORDER BY u.id");

    let rows = qb.build_query_as::<DbUser>().fetch_all(&state.pool).await?;
    rows.into_iter().map(User::try_from).collect()
}

pub async fn get_user(state: &AppState, caller: &Caller, user_id: i64) -> AppResult<User> {
    require(caller, EntityType::User, Operation::Read)?;

    let mut conn = state.pool.acquire().await?;
    let user: User = fetch_user(&mut conn, user_id).await?.try_into()?;
    authorize_access(caller, &user, EntityType::User).into_result()?;
    Ok(user)
}

pub async fn update_user(state: &AppState, caller: &Caller, user_id: i64, req: UserUpdateRequest) -> AppResult<User> {
    require(caller, EntityType::User, Operation::Update)?;

    let mut tx = db::begin_write(&state.pool).await?;
    let current = fetch_user(&mut tx, user_id).await?;
    let current_view: User = current.clone().try_into()?;
    authorize_access(caller, &current_view, EntityType::User).into_result()?;

    if current.role.is_tenant_root() && !caller.is_admin() {
        return Err(AppError::forbidden("only ADMIN may alter ADMIN or DIRECTOR accounts"));
    }

    let touches_limits = !req.max_users.is_unchanged() || !req.max_obras.is_unchanged();
    if touches_limits {
        if !caller.is_admin() {
            return Err(AppError::forbidden("only ADMIN may change organization limits"));
        }
        if current.role != Role::Director {
            return Err(AppError::bad_request("limits only apply to DIRECTOR accounts"));
        }
    }

    for (patch, kind) in [(&req.max_users, ResourceKind::Users), (&req.max_obras, ResourceKind::Sites)] {
        let new_ceiling = match patch {
            Patch::Unchanged => continue,
            Patch::Set(value) if *value < 0 => {
                return Err(AppError::bad_request("limits cannot be negative"));
            }
            Patch::Set(value) => *value,
            Patch::Cleared => kind.default_ceiling(),
        };
        state
            .quota
            .ensure_ceiling_covers(&mut tx, current.id, kind, new_ceiling)
            .await?;
    }

    let full_name = match req.full_name.as_deref().map(str::trim) {
        Some("") => return Err(AppError::bad_request("full name cannot be empty")),
        Some(name) => name.to_string(),
        None => current.full_name.clone(),
    };
    let password_hash = match req.password.as_deref() {
        Some(password) => hash_password(password)?,
        None => current.password_hash.clone(),
    };
    let active = req.active.unwrap_or(current.active);
    let max_users = req.max_users.apply(current.max_users);
    let max_obras = req.max_obras.apply(current.max_obras);

    sqlx::query(
        "UPDATE users SET full_name = ?, password_hash = ?, active = ?, max_users = ?, max_obras = ?, updated_at = ? WHERE id = ?",
    )
    .bind(full_name)
    .bind(password_hash)
    .bind(active)
    .bind(max_users)
    .bind(max_obras)
    .bind(utc_now())
    .bind(current.id)
    .execute(&mut *tx)
    .await?;

    let updated = fetch_user(&mut tx, current.id).await?;
    tx.commit().await?;
    updated.try_into()
}

/// Bootstrap path for the CLI; bypasses the policy table.
pub async fn create_admin(pool: &SqlitePool, username: &str, password: &str) -> AppResult<i64> {
    let password_hash = hash_password(password)?;
    let now = utc_now();
    let id = sqlx::query(
        "INSERT INTO users (username, full_name, password_hash, role, active, created_at, updated_at) VALUES (?, ?, ?, ?, 1, ?, ?)",
    )
    .bind(username)
    .bind(username)
    .bind(password_hash)
    .bind(Role::Admin)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?
    .last_insert_rowid();
    Ok(id)
}
