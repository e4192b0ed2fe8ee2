//! Tenant scope resolution.
//!
//! The tenant boundary is derived, never stored per row: a site belongs to the
//! DIRECTOR in `sites.director_id`, a user to the DIRECTOR in
//! `users.owner_director_id`, and work orders / work logs inherit the tenant of
//! their site. The same [`ScopePredicate`] drives both list queries (as a SQL
//! filter) and single-record checks (evaluated against a fetched row), so the
//! two paths cannot drift apart.
//!
//! List queries must use these table aliases: `u` users, `s` sites (joined for
//! work orders and work logs), `c` contractors, `o` work orders, `w` work logs.

use sqlx::{QueryBuilder, Sqlite};

use super::policy::EntityType;
use super::principal::{Caller, Role};

/// Ownership facts of a fetched record, consumed by the single-record guard.
pub trait TenantOwned {
    /// The DIRECTOR that owns the tenant this record belongs to.
    fn tenant_director_id(&self) -> Option<i64>;

    /// Whether the user is explicitly assigned to this record.
    fn is_assigned_to(&self, _user_id: i64) -> bool {
        false
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopePredicate {
    /// No restriction.
    All,
    /// Rows in `tenant_id`'s tenant, or rows explicitly assigned to `assignee_id`.
    Restricted {
        tenant_id: Option<i64>,
        assignee_id: Option<i64>,
    },
}

impl EntityType {
    fn tenant_column(&self) -> Option<&'static str> {
        match self {
            EntityType::User => Some("u.owner_director_id"),
            EntityType::Site | EntityType::WorkOrder | EntityType::WorkLog => Some("s.director_id"),
            EntityType::Contractor => Some("c.director_id"),
        }
    }

    fn has_assignment(&self) -> bool {
        !matches!(self, EntityType::Contractor)
    }

    fn push_assignment(&self, qb: &mut QueryBuilder<'_, Sqlite>, user_id: i64) {
        match self {
            EntityType::Site => {
                qb.push("EXISTS (SELECT 1 FROM site_responsibles sr WHERE sr.site_id = s.id AND sr.user_id = ");
                qb.push_bind(user_id);
                qb.push(")");
            }
            EntityType::WorkLog => {
                qb.push("w.responsible_id = ");
                qb.push_bind(user_id);
            }
            EntityType::WorkOrder => {
                qb.push("o.responsible_id = ");
                qb.push_bind(user_id);
            }
            EntityType::User => {
                qb.push("u.id = ");
                qb.push_bind(user_id);
            }
            EntityType::Contractor => {
                qb.push("0 = 1");
            }
        }
    }
}

/// Compute which rows of `entity` the caller may see or mutate.
pub fn resolve_scope(caller: &Caller, entity: EntityType) -> ScopePredicate {
    match caller.role {
        Role::Admin => ScopePredicate::All,
        Role::Director => ScopePredicate::Restricted {
            tenant_id: Some(caller.user_id),
            assignee_id: None,
        },
        Role::Supervisor | Role::Residente | Role::Visitante => ScopePredicate::Restricted {
            tenant_id: caller.owner_director_id,
            assignee_id: entity.has_assignment().then_some(caller.user_id),
        },
    }
}

/// Tenant to stamp on a row the caller creates. ADMIN-created rows stay
/// unattributed.
pub fn effective_tenant_id(caller: &Caller) -> Option<i64> {
    match caller.role {
        Role::Admin => None,
        Role::Director => Some(caller.user_id),
        Role::Supervisor | Role::Residente | Role::Visitante => caller.owner_director_id,
    }
}

impl ScopePredicate {
    /// Append ` AND (<predicate>)` to a query that already has a WHERE clause.
    pub fn push_filter(&self, qb: &mut QueryBuilder<'_, Sqlite>, entity: EntityType) {
        let (tenant_id, assignee_id) = match self {
            ScopePredicate::All => return,
            ScopePredicate::Restricted {
                tenant_id,
                assignee_id,
            } => (*tenant_id, *assignee_id),
        };

        qb.push(" AND (");
        let mut wrote = false;

        if let (Some(tenant_id), Some(column)) = (tenant_id, entity.tenant_column()) {
            qb.push(column);
            qb.push(" = ");
            qb.push_bind(tenant_id);
            wrote = true;
        }

        if let Some(user_id) = assignee_id {
            if wrote {
                qb.push(" OR ");
            }
            entity.push_assignment(qb, user_id);
            wrote = true;
        }

        if !wrote {
            qb.push("0 = 1");
        }
        qb.push(")");
    }

    /// In-memory counterpart of [`push_filter`](Self::push_filter).
    pub fn admits<T: TenantOwned + ?Sized>(&self, record: &T) -> bool {
        match self {
            ScopePredicate::All => true,
            ScopePredicate::Restricted {
                tenant_id,
                assignee_id,
            } => {
                let tenant_match = tenant_id.is_some() && record.tenant_director_id() == *tenant_id;
                let assigned = assignee_id.map(|uid| record.is_assigned_to(uid)).unwrap_or(false);
                tenant_match || assigned
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Row {
        director_id: Option<i64>,
        responsibles: Vec<i64>,
    }

    impl TenantOwned for Row {
        fn tenant_director_id(&self) -> Option<i64> {
            self.director_id
        }

        fn is_assigned_to(&self, user_id: i64) -> bool {
            self.responsibles.contains(&user_id)
        }
    }

    fn sql_for(scope: &ScopePredicate, entity: EntityType) -> String {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT s.id FROM sites s WHERE 1 = 1");
        scope.push_filter(&mut qb, entity);
        qb.sql().to_string()
    }

    #[test]
    fn admin_is_unrestricted() {
        let scope = resolve_scope(&Caller::new(1, Role::Admin), EntityType::Site);
        assert_eq!(scope, ScopePredicate::All);
        assert_eq!(sql_for(&scope, EntityType::Site), "SELECT s.id FROM sites s WHERE 1 = 1");
    }

    #[test]
    fn director_is_the_tenant_root() {
        let scope = resolve_scope(&Caller::new(10, Role::Director), EntityType::Site);
        assert_eq!(
            scope,
            ScopePredicate::Restricted {
                tenant_id: Some(10),
                assignee_id: None
            }
        );
        assert!(sql_for(&scope, EntityType::Site).ends_with("AND (s.director_id = ?)"));
    }

    #[test]
    fn staff_see_owner_tenant_or_assignment() {
        let caller = Caller::new(20, Role::Supervisor).with_owner(10);
        let scope = resolve_scope(&caller, EntityType::Site);
        let sql = sql_for(&scope, EntityType::Site);
        assert!(sql.contains("s.director_id = ? OR EXISTS (SELECT 1 FROM site_responsibles"));

        let foreign_but_assigned = Row {
            director_id: Some(11),
            responsibles: vec![20],
        };
        let own_tenant = Row {
            director_id: Some(10),
            responsibles: vec![],
        };
        let foreign = Row {
            director_id: Some(11),
            responsibles: vec![21],
        };
        assert!(scope.admits(&foreign_but_assigned));
        assert!(scope.admits(&own_tenant));
        assert!(!scope.admits(&foreign));
    }

    #[test]
    fn contractors_have_no_assignment_relation() {
        let caller = Caller::new(20, Role::Residente).with_owner(10);
        let scope = resolve_scope(&caller, EntityType::Contractor);
        assert_eq!(
            scope,
            ScopePredicate::Restricted {
                tenant_id: Some(10),
                assignee_id: None
            }
        );
    }

    #[test]
    fn orphaned_staff_without_assignment_sees_nothing() {
        let caller = Caller::new(30, Role::Visitante);
        let scope = resolve_scope(&caller, EntityType::Contractor);
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT c.id FROM contractors c WHERE 1 = 1");
        scope.push_filter(&mut qb, EntityType::Contractor);
        assert!(qb.sql().ends_with("AND (0 = 1)"));
    }

    #[test]
    fn unattributed_rows_only_visible_to_admin_or_assignees() {
        let admin_site = Row {
            director_id: None,
            responsibles: vec![5],
        };
        let director = resolve_scope(&Caller::new(10, Role::Director), EntityType::Site);
        let assignee = resolve_scope(&Caller::new(5, Role::Residente), EntityType::Site);
        assert!(!director.admits(&admin_site));
        assert!(assignee.admits(&admin_site));
        assert!(ScopePredicate::All.admits(&admin_site));
    }

    #[test]
    fn scope_is_monotone_in_privilege_within_a_tenant() {
        let rows = [
            Row { director_id: Some(10), responsibles: vec![] },
            Row { director_id: Some(10), responsibles: vec![20] },
            Row { director_id: Some(11), responsibles: vec![] },
            Row { director_id: None, responsibles: vec![] },
        ];
        let admin = resolve_scope(&Caller::new(1, Role::Admin), EntityType::WorkOrder);
        let director = resolve_scope(&Caller::new(10, Role::Director), EntityType::WorkOrder);
        let supervisor = resolve_scope(&Caller::new(20, Role::Supervisor).with_owner(10), EntityType::WorkOrder);
        let visitor = resolve_scope(&Caller::new(40, Role::Visitante).with_owner(10), EntityType::WorkOrder);

        for row in &rows {
            if visitor.admits(row) {
                assert!(supervisor.admits(row));
            }
            if supervisor.admits(row) && row.director_id == Some(10) {
                assert!(director.admits(row));
            }
            if director.admits(row) {
                assert!(admin.admits(row));
            }
        }
    }

    #[test]
    fn new_rows_are_attributed_to_the_tenant_root() {
        assert_eq!(effective_tenant_id(&Caller::new(1, Role::Admin)), None);
        assert_eq!(effective_tenant_id(&Caller::new(10, Role::Director)), Some(10));
        assert_eq!(
            effective_tenant_id(&Caller::new(20, Role::Supervisor).with_owner(10)),
            Some(10)
        );
    }
}
