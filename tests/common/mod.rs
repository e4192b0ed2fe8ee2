#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;

use site_supervision::authz::{Caller, Role};
use site_supervision::errors::{AppError, AppResult};
use site_supervision::jwt::JwtConfig;
use site_supervision::services::users;
use site_supervision::upload::{UploadedObject, Uploader};
use site_supervision::{db, AppState};

pub const JWT_SECRET: &str = "test-secret";

/// Keeps the temp dir alive for as long as the pool is used.
pub struct TestDb {
    _dir: TempDir,
    pub pool: SqlitePool,
}

pub async fn setup_db() -> Result<TestDb> {
    let dir = tempfile::tempdir().context("failed to create tempdir")?;
    let url = format!("sqlite://{}", dir.path().join("test.db").display());
    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(db::connect_options(&url)?)
        .await?;

    let migrator = sqlx::migrate::Migrator::new(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"))
        .await?;
    migrator.run(&pool).await?;

    Ok(TestDb { _dir: dir, pool })
}

pub fn state_with(pool: &SqlitePool, uploader: Arc<dyn Uploader>) -> AppState {
    AppState::new(pool.clone(), JwtConfig::new(JWT_SECRET.as_bytes().to_vec(), 1), uploader)
}

pub fn state(pool: &SqlitePool) -> AppState {
    state_with(pool, Arc::new(MemoryUploader::default()))
}

/// Records uploads in memory and hands out sequential URLs.
#[derive(Debug, Default)]
pub struct MemoryUploader {
    stored: AtomicUsize,
}

impl MemoryUploader {
    pub fn stored(&self) -> usize {
        self.stored.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Uploader for MemoryUploader {
    async fn upload(&self, bytes: Vec<u8>, _filename_hint: Option<&str>) -> AppResult<UploadedObject> {
        if bytes.is_empty() {
            return Err(AppError::upload("refusing to store an empty file"));
        }
        let n = self.stored.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(UploadedObject {
            url: format!("mem://evidence/{n}"),
        })
    }
}

/// Storage that is always down.
#[derive(Debug, Default)]
pub struct FailingUploader;

#[async_trait]
impl Uploader for FailingUploader {
    async fn upload(&self, _bytes: Vec<u8>, _filename_hint: Option<&str>) -> AppResult<UploadedObject> {
        Err(AppError::upload("object storage unavailable"))
    }
}

pub struct NewUser<'a> {
    pub username: &'a str,
    pub role: Role,
    pub owner: Option<i64>,
    pub max_users: Option<i64>,
    pub max_obras: Option<i64>,
    pub password_hash: Option<String>,
}

impl<'a> NewUser<'a> {
    pub fn new(username: &'a str, role: Role) -> Self {
        Self {
            username,
            role,
            owner: None,
            max_users: None,
            max_obras: None,
            password_hash: None,
        }
    }

    pub fn owned_by(mut self, director_id: i64) -> Self {
        self.owner = Some(director_id);
        self
    }

    pub fn limits(mut self, max_users: Option<i64>, max_obras: Option<i64>) -> Self {
        self.max_users = max_users;
        self.max_obras = max_obras;
        self
    }

    pub fn password(mut self, password: &str) -> Result<Self> {
        self.password_hash = Some(site_supervision::utils::hash_password(password)?);
        Ok(self)
    }
}

/// Insert a user directly, bypassing policy and quota.
pub async fn seed_user(pool: &SqlitePool, user: NewUser<'_>) -> Result<i64> {
    let now = chrono::Utc::now();
    let id = sqlx::query(
        "INSERT INTO users (username, full_name, password_hash, role, owner_director_id, max_users, max_obras, active, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?, ?)",
    )
    .bind(user.username)
    .bind(user.username)
    .bind(user.password_hash.unwrap_or_else(|| "not-a-real-hash".to_string()))
    .bind(user.role)
    .bind(user.owner)
    .bind(user.max_users)
    .bind(user.max_obras)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?
    .last_insert_rowid();
    Ok(id)
}

pub async fn caller(pool: &SqlitePool, user_id: i64) -> Result<Caller> {
    Ok(users::load_caller(pool, user_id).await?)
}

/// Insert a site directly with the given responsibles.
pub async fn seed_site(
    pool: &SqlitePool,
    prefix: &str,
    creator_id: i64,
    director_id: Option<i64>,
    responsibles: &[i64],
) -> Result<i64> {
    let now = chrono::Utc::now();
    let id = sqlx::query(
        "INSERT INTO sites (prefix, name, creator_id, director_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(prefix)
    .bind(format!("Obra {prefix}"))
    .bind(creator_id)
    .bind(director_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?
    .last_insert_rowid();

    for user_id in responsibles {
        sqlx::query("INSERT INTO site_responsibles (site_id, user_id) VALUES (?, ?)")
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .await?;
    }
    Ok(id)
}

pub async fn seed_variable(pool: &SqlitePool, name: &str) -> Result<i64> {
    Ok(sqlx::query("INSERT INTO variables (name) VALUES (?)")
        .bind(name)
        .execute(pool)
        .await?
        .last_insert_rowid())
}

pub async fn count(pool: &SqlitePool, table: &str) -> Result<i64> {
    Ok(sqlx::query_scalar(&format!("SELECT COUNT(1) FROM {table}"))
        .fetch_one(pool)
        .await?)
}

/// A DIRECTOR with one supervisor and one site where the supervisor is responsible.
pub struct Tenant {
    pub director_id: i64,
    pub supervisor_id: i64,
    pub site_id: i64,
}

pub async fn seed_tenant(pool: &SqlitePool, name: &str, prefix: &str) -> Result<Tenant> {
    let director_id = seed_user(pool, NewUser::new(&format!("{name}-dir"), Role::Director)).await?;
    let supervisor_id = seed_user(
        pool,
        NewUser::new(&format!("{name}-sup"), Role::Supervisor).owned_by(director_id),
    )
    .await?;
    let site_id = seed_site(pool, prefix, director_id, Some(director_id), &[supervisor_id]).await?;
    Ok(Tenant {
        director_id,
        supervisor_id,
        site_id,
    })
}
