//! Authorization: role model, policy table, tenant scope resolution and
//! single-record ownership guards.
//!
//! Every service call runs two checks in order:
//! 1. [`policy::require`] - may this role perform this operation on this entity type at all?
//! 2. the tenant scope - a SQL filter for lists, or [`authorize_access`] on a fetched record.

mod guard;
mod policy;
mod principal;
mod scope;

pub use guard::{authorize_access, Access};
pub use policy::{allowed_roles, can, require, EntityType, Operation};
pub use principal::{Caller, Role};
pub use scope::{effective_tenant_id, resolve_scope, ScopePredicate, TenantOwned};
