use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use crate::authz::{Caller, Role, TenantOwned};
use crate::errors::AppError;
use crate::models::Patch;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    pub role: Role,
    pub owner_director_id: Option<i64>,
    pub max_users: Option<i64>,
    pub max_obras: Option<i64>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TenantOwned for User {
    fn tenant_director_id(&self) -> Option<i64> {
        self.owner_director_id
    }

    fn is_assigned_to(&self, user_id: i64) -> bool {
        self.id == user_id
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbUser {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    pub password_hash: String,
    pub role: Role,
    pub owner_director_id: Option<i64>,
    pub max_users: Option<i64>,
    pub max_obras: Option<i64>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbUser {
    pub fn to_caller(&self) -> Caller {
        Caller {
            user_id: self.id,
            username: self.username.clone(),
            role: self.role,
            owner_director_id: self.owner_director_id,
            max_users: self.max_users,
            max_obras: self.max_obras,
        }
    }
}

impl TryFrom<DbUser> for User {
    type Error = AppError;

    fn try_from(value: DbUser) -> Result<Self, Self::Error> {
        Ok(User {
            id: value.id,
            username: value.username,
            full_name: value.full_name,
            role: value.role,
            owner_director_id: value.owner_director_id,
            max_users: value.max_users,
            max_obras: value.max_obras,
            active: value.active,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UserCreateRequest {
    #[validate(length(min = 3, max = 50, message = "username must be 3-50 characters"))]
    #[schema(example = "jperez")]
    pub username: String,
    #[validate(length(min = 1, max = 120, message = "full name is required"))]
    #[schema(example = "Juan Pérez")]
    pub full_name: String,
    #[schema(example = "S3cureP@ssw0rd")]
    pub password: String,
    pub role: Role,
    /// Required when an ADMIN creates a SUPERVISOR, RESIDENTE or VISITANTE.
    pub owner_director_id: Option<i64>,
    /// Only honoured for DIRECTOR accounts.
    #[validate(range(min = 0))]
    pub max_users: Option<i64>,
    #[validate(range(min = 0))]
    pub max_obras: Option<i64>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UserUpdateRequest {
    pub full_name: Option<String>,
    pub password: Option<String>,
    pub active: Option<bool>,
    #[serde(default)]
    #[schema(value_type = Option<i64>)]
    pub max_users: Patch<i64>,
    #[serde(default)]
    #[schema(value_type = Option<i64>)]
    pub max_obras: Patch<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "jperez")]
    pub username: String,
    #[schema(example = "S3cureP@ssw0rd")]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}
