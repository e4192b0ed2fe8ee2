//! Per-tenant resource ceilings.
//!
//! A DIRECTOR may own at most `max_users` accounts and `max_obras` sites.
//! Unset ceilings fall back to the defaults below; a ceiling of `0` disables
//! the check. The count and the insert that follows it run under a per-tenant
//! lock so concurrent creations cannot both pass the check.

use std::sync::Arc;

use sqlx::SqliteConnection;
use tokio::sync::OwnedMutexGuard;

use crate::errors::{AppError, AppResult};
use crate::locks::{KeyedLocks, LockKey};

pub const DEFAULT_MAX_USERS: i64 = 3;
pub const DEFAULT_MAX_SITES: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Users,
    Sites,
}

impl ResourceKind {
    pub fn default_ceiling(&self) -> i64 {
        match self {
            ResourceKind::Users => DEFAULT_MAX_USERS,
            ResourceKind::Sites => DEFAULT_MAX_SITES,
        }
    }

    pub fn resolve_ceiling(&self, configured: Option<i64>) -> i64 {
        configured.unwrap_or_else(|| self.default_ceiling())
    }

    fn label(&self) -> &'static str {
        match self {
            ResourceKind::Users => "users",
            ResourceKind::Sites => "sites",
        }
    }

    fn count_sql(&self) -> &'static str {
        match self {
            ResourceKind::Users => "SELECT COUNT(1) FROM users WHERE owner_director_id = ?",
            ResourceKind::Sites => "SELECT COUNT(1) FROM sites WHERE director_id = ?",
        }
    }
}

/// Pure ceiling comparison.
pub fn within_ceiling(count: i64, ceiling: i64) -> bool {
    ceiling <= 0 || count < ceiling
}

/// Proof that a creation fits the tenant's ceiling. Keep it alive until the
/// insert is committed; dropping it lets the next creation for the tenant run.
#[derive(Debug)]
pub struct QuotaPermit {
    _guard: OwnedMutexGuard<()>,
}

#[derive(Debug, Clone)]
pub struct QuotaEnforcer {
    locks: Arc<KeyedLocks>,
}

impl QuotaEnforcer {
    pub fn new(locks: Arc<KeyedLocks>) -> Self {
        Self { locks }
    }

    pub async fn check_and_reserve(
        &self,
        conn: &mut SqliteConnection,
        tenant_id: i64,
        kind: ResourceKind,
        configured_ceiling: Option<i64>,
    ) -> AppResult<QuotaPermit> {
        let guard = self.locks.acquire(LockKey::TenantQuota(tenant_id)).await;
        let ceiling = kind.resolve_ceiling(configured_ceiling);
        let usage = current_usage(conn, tenant_id, kind).await?;

        if !within_ceiling(usage, ceiling) {
            tracing::warn!(tenant_id, kind = kind.label(), usage, ceiling, "quota exceeded");
            return Err(AppError::quota_exceeded(format!(
                "organization limit reached: at most {ceiling} {}",
                kind.label()
            )));
        }

        tracing::debug!(tenant_id, kind = kind.label(), usage, ceiling, "quota reserved");
        Ok(QuotaPermit { _guard: guard })
    }

    /// Reject a new ceiling that the tenant already exceeds.
    pub async fn ensure_ceiling_covers(
        &self,
        conn: &mut SqliteConnection,
        tenant_id: i64,
        kind: ResourceKind,
        new_ceiling: i64,
    ) -> AppResult<()> {
        let _guard = self.locks.acquire(LockKey::TenantQuota(tenant_id)).await;
        let usage = current_usage(conn, tenant_id, kind).await?;
        if new_ceiling > 0 && usage > new_ceiling {
            return Err(AppError::quota_exceeded(format!(
                "organization already has {usage} {}, cannot lower limit to {new_ceiling}",
                kind.label()
            )));
        }
        Ok(())
    }
}

pub async fn current_usage(conn: &mut SqliteConnection, tenant_id: i64, kind: ResourceKind) -> AppResult<i64> {
    let count: i64 = sqlx::query_scalar(kind.count_sql())
        .bind(tenant_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}
