use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use crate::authz::TenantOwned;
use crate::models::Patch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SiteStatus {
    #[default]
    Pendiente,
    EnProgreso,
    Finalizada,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Site {
    pub id: i64,
    pub prefix: String,
    pub name: String,
    pub observations: Option<String>,
    pub creator_id: i64,
    pub director_id: Option<i64>,
    pub status: SiteStatus,
    pub responsible_ids: Vec<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TenantOwned for Site {
    fn tenant_director_id(&self) -> Option<i64> {
        self.director_id
    }

    fn is_assigned_to(&self, user_id: i64) -> bool {
        self.responsible_ids.contains(&user_id)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbSite {
    pub id: i64,
    pub prefix: String,
    pub name: String,
    pub observations: Option<String>,
    pub creator_id: i64,
    pub director_id: Option<i64>,
    pub status: SiteStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbSite {
    pub fn with_responsibles(self, responsible_ids: Vec<i64>) -> Site {
        Site {
            id: self.id,
            prefix: self.prefix,
            name: self.name,
            observations: self.observations,
            creator_id: self.creator_id,
            director_id: self.director_id,
            status: self.status,
            responsible_ids,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SiteCreateRequest {
    #[validate(length(min = 1, max = 10, message = "prefix must be 1-10 characters"))]
    #[schema(example = "AD24")]
    pub prefix: String,
    #[validate(length(min = 1, max = 200, message = "name is required"))]
    #[schema(example = "Edificio Andes")]
    pub name: String,
    pub observations: Option<String>,
    #[validate(length(min = 1, message = "at least one responsible user is required"))]
    pub responsible_ids: Vec<i64>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct SiteUpdateRequest {
    pub name: Option<String>,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub observations: Patch<String>,
    pub status: Option<SiteStatus>,
    pub responsible_ids: Option<Vec<i64>>,
}
