use super::policy::EntityType;
use super::principal::Caller;
use super::scope::{resolve_scope, TenantOwned};
use crate::errors::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Allow,
    Deny(String),
}

impl Access {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Access::Allow)
    }

    pub fn into_result(self) -> AppResult<()> {
        match self {
            Access::Allow => Ok(()),
            Access::Deny(reason) => Err(AppError::forbidden(reason)),
        }
    }
}

/// Post-fetch ownership check for a single record.
///
/// Existence is not hidden: callers fetch first, answer 404 for a missing row,
/// then run this and answer 403 for a row outside the caller's scope.
pub fn authorize_access<T: TenantOwned + ?Sized>(caller: &Caller, record: &T, entity: EntityType) -> Access {
    if resolve_scope(caller, entity).admits(record) {
        return Access::Allow;
    }

    tracing::warn!(
        user_id = caller.user_id,
        role = %caller.role,
        entity = entity.as_str(),
        record_director_id = ?record.tenant_director_id(),
        "ownership check denied"
    );
    Access::Deny(format!("{} belongs to another organization", entity.as_str()))
}
