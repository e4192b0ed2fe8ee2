use serde::Serialize;

use super::principal::{Caller, Role};
use crate::errors::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    User,
    Site,
    Contractor,
    WorkOrder,
    WorkLog,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::User => "user",
            EntityType::Site => "site",
            EntityType::Contractor => "contractor",
            EntityType::WorkOrder => "work_order",
            EntityType::WorkLog => "work_log",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Read,
    Create,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Read => "read",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

const EVERYONE: &[Role] = &[
    Role::Admin,
    Role::Director,
    Role::Supervisor,
    Role::Residente,
    Role::Visitante,
];
const MANAGERS: &[Role] = &[Role::Admin, Role::Director];
const FIELD_STAFF: &[Role] = &[Role::Admin, Role::Director, Role::Supervisor, Role::Residente];
const SUPERVISORS: &[Role] = &[Role::Admin, Role::Director, Role::Supervisor];

/// Allowed roles per (entity, operation). Anything not listed is denied.
static POLICY: &[(EntityType, Operation, &[Role])] = &[
    (EntityType::User, Operation::Read, MANAGERS),
    (EntityType::User, Operation::Create, MANAGERS),
    (EntityType::User, Operation::Update, MANAGERS),
    (EntityType::User, Operation::Delete, MANAGERS),
    (EntityType::Site, Operation::Read, EVERYONE),
    (EntityType::Site, Operation::Create, MANAGERS),
    (EntityType::Site, Operation::Update, MANAGERS),
    (EntityType::Site, Operation::Delete, MANAGERS),
    (EntityType::Contractor, Operation::Read, EVERYONE),
    (EntityType::Contractor, Operation::Create, SUPERVISORS),
    (EntityType::Contractor, Operation::Update, SUPERVISORS),
    (EntityType::Contractor, Operation::Delete, MANAGERS),
    (EntityType::WorkOrder, Operation::Read, EVERYONE),
    (EntityType::WorkOrder, Operation::Create, FIELD_STAFF),
    (EntityType::WorkOrder, Operation::Update, FIELD_STAFF),
    (EntityType::WorkOrder, Operation::Delete, MANAGERS),
    (EntityType::WorkLog, Operation::Read, EVERYONE),
    (EntityType::WorkLog, Operation::Create, FIELD_STAFF),
    (EntityType::WorkLog, Operation::Update, FIELD_STAFF),
    (EntityType::WorkLog, Operation::Delete, MANAGERS),
];

pub fn allowed_roles(entity: EntityType, operation: Operation) -> &'static [Role] {
    POLICY
        .iter()
        .find(|(e, op, _)| *e == entity && *op == operation)
        .map(|(_, _, roles)| *roles)
        .unwrap_or(&[])
}

pub fn can(role: Role, entity: EntityType, operation: Operation) -> bool {
    allowed_roles(entity, operation).contains(&role)
}

/// Role gate run before any row-level check.
pub fn require(caller: &Caller, entity: EntityType, operation: Operation) -> AppResult<()> {
    if can(caller.role, entity, operation) {
        return Ok(());
    }

    tracing::debug!(
        user_id = caller.user_id,
        role = %caller.role,
        entity = entity.as_str(),
        operation = operation.as_str(),
        "role not allowed by policy"
    );
    Err(AppError::forbidden(format!(
        "role {} may not {} {}",
        caller.role,
        operation.as_str(),
        entity.as_str()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENTITIES: [EntityType; 5] = [
        EntityType::User,
        EntityType::Site,
        EntityType::Contractor,
        EntityType::WorkOrder,
        EntityType::WorkLog,
    ];
    const OPERATIONS: [Operation; 4] = [
        Operation::Read,
        Operation::Create,
        Operation::Update,
        Operation::Delete,
    ];

    #[test]
    fn every_pair_has_an_entry() {
        for entity in ENTITIES {
            for op in OPERATIONS {
                assert!(
                    !allowed_roles(entity, op).is_empty(),
                    "missing policy for {:?}/{:?}",
                    entity,
                    op
                );
            }
        }
    }

    #[test]
    fn admin_is_allowed_everywhere() {
        for entity in ENTITIES {
            for op in OPERATIONS {
                assert!(can(Role::Admin, entity, op));
            }
        }
    }

    #[test]
    fn allowed_sets_are_upward_closed() {
        // if a role may do something, every more privileged role may as well
        for entity in ENTITIES {
            for op in OPERATIONS {
                for low in Role::ALL {
                    for high in Role::ALL.iter().copied().filter(|r| *r > low) {
                        if can(low, entity, op) {
                            assert!(can(high, entity, op), "{high} lacks {:?}/{:?}", entity, op);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn visitors_are_read_only() {
        for entity in ENTITIES {
            assert!(!can(Role::Visitante, entity, Operation::Create));
            assert!(!can(Role::Visitante, entity, Operation::Delete));
        }
    }

    #[test]
    fn require_reports_forbidden() {
        let caller = Caller::new(4, Role::Residente).with_owner(1);
        let err = require(&caller, EntityType::Site, Operation::Create).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert!(require(&caller, EntityType::WorkLog, Operation::Create).is_ok());
    }
}
