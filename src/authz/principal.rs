use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Account roles, declared from least to most privileged so that the derived
/// ordering is the privilege order (`Admin > Director > ... > Visitante`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema, sqlx::Type,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Visitante,
    Residente,
    Supervisor,
    Director,
    Admin,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Admin,
        Role::Director,
        Role::Supervisor,
        Role::Residente,
        Role::Visitante,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Director => "DIRECTOR",
            Role::Supervisor => "SUPERVISOR",
            Role::Residente => "RESIDENTE",
            Role::Visitante => "VISITANTE",
        }
    }

    /// ADMIN and DIRECTOR rows sit at the top of a tenant and carry no owner.
    pub fn is_tenant_root(&self) -> bool {
        matches!(self, Role::Admin | Role::Director)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated caller, rebuilt from the users table on every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Caller {
    pub user_id: i64,
    pub username: String,
    pub role: Role,
    pub owner_director_id: Option<i64>,
    pub max_users: Option<i64>,
    pub max_obras: Option<i64>,
}

impl Caller {
    pub fn new(user_id: i64, role: Role) -> Self {
        Self {
            user_id,
            username: format!("user-{user_id}"),
            role,
            owner_director_id: None,
            max_users: None,
            max_obras: None,
        }
    }

    pub fn with_owner(mut self, director_id: i64) -> Self {
        self.owner_director_id = Some(director_id);
        self
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_director(&self) -> bool {
        self.role == Role::Director
    }
}
