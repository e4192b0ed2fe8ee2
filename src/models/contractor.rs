use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use crate::authz::TenantOwned;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Contractor {
    pub id: i64,
    pub name: String,
    pub tax_id: Option<String>,
    pub director_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl TenantOwned for Contractor {
    fn tenant_director_id(&self) -> Option<i64> {
        self.director_id
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ContractorCreateRequest {
    #[validate(length(min = 1, max = 200, message = "name is required"))]
    #[schema(example = "Constructora Sur")]
    pub name: String,
    #[validate(length(max = 20))]
    pub tax_id: Option<String>,
}
