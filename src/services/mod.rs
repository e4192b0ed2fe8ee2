//! Domain operations. Handlers in `routes` only decode transport input and
//! delegate here; every function takes the authenticated [`Caller`] and runs
//! the policy gate and tenant scope before touching rows.
//!
//! [`Caller`]: crate::authz::Caller

pub mod contractors;
pub mod sites;
pub mod users;
pub mod work_logs;
pub mod work_orders;

use sqlx::SqliteConnection;

use crate::errors::{AppError, AppResult};

/// Tables that other records reference by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reference {
    Variable,
    Measurement,
    Unit,
    Contractor,
    User,
}

impl Reference {
    fn exists_sql(&self) -> &'static str {
        match self {
            Reference::Variable => "SELECT COUNT(1) FROM variables WHERE id = ?",
            Reference::Measurement => "SELECT COUNT(1) FROM measurements WHERE id = ?",
            Reference::Unit => "SELECT COUNT(1) FROM units WHERE id = ?",
            Reference::Contractor => "SELECT COUNT(1) FROM contractors WHERE id = ?",
            Reference::User => "SELECT COUNT(1) FROM users WHERE id = ? AND active = 1",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Reference::Variable => "variable",
            Reference::Measurement => "measurement",
            Reference::Unit => "unit",
            Reference::Contractor => "contractor",
            Reference::User => "user",
        }
    }
}

pub async fn ensure_exists(conn: &mut SqliteConnection, reference: Reference, id: i64) -> AppResult<()> {
    let count: i64 = sqlx::query_scalar(reference.exists_sql())
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;
    if count == 0 {
        return Err(AppError::not_found(format!("{} {id} not found", reference.label())));
    }
    Ok(())
}
