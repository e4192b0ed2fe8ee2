use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use crate::authz::TenantOwned;
use crate::models::RawId;

/// Orders are always created `EnProceso`; the other states are reached by
/// review workflows outside the creation path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkOrderStatus {
    #[default]
    EnProceso,
    Aprobada,
    Finalizada,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvaluationOutcome {
    Cumple,
    NoCumple,
    NoAplica,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WorkOrder {
    pub id: i64,
    pub site_id: i64,
    pub responsible_id: i64,
    pub identifier: String,
    pub objective: String,
    pub work_type: String,
    pub status: WorkOrderStatus,
    pub scheduled_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub folders: Vec<Folder>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Folder {
    pub id: i64,
    pub work_order_id: i64,
    pub position: i64,
    pub name: String,
    pub activities: Vec<Activity>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Activity {
    pub id: i64,
    pub folder_id: i64,
    pub position: i64,
    pub name: String,
    pub evaluation: Option<Evaluation>,
    pub media: Vec<ActivityMedia>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Evaluation {
    pub id: i64,
    pub activity_id: i64,
    pub outcome: EvaluationOutcome,
    pub observation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ActivityMedia {
    pub id: i64,
    pub activity_id: i64,
    pub url: String,
}

/// Order row joined with its site's tenant.
#[derive(Debug, Clone, FromRow)]
pub struct DbWorkOrder {
    pub id: i64,
    pub site_id: i64,
    pub responsible_id: i64,
    pub identifier: String,
    pub objective: String,
    pub work_type: String,
    pub status: WorkOrderStatus,
    pub scheduled_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub site_director_id: Option<i64>,
}

impl TenantOwned for DbWorkOrder {
    fn tenant_director_id(&self) -> Option<i64> {
        self.site_director_id
    }

    fn is_assigned_to(&self, user_id: i64) -> bool {
        self.responsible_id == user_id
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbFolder {
    pub id: i64,
    pub work_order_id: i64,
    pub position: i64,
    pub name: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbActivity {
    pub id: i64,
    pub folder_id: i64,
    pub position: i64,
    pub name: String,
}

/// Summary row returned by list endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct WorkOrderSummary {
    pub id: i64,
    pub site_id: i64,
    pub responsible_id: i64,
    pub identifier: String,
    pub objective: String,
    pub work_type: String,
    pub status: WorkOrderStatus,
    pub scheduled_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct WorkOrderCreateRequest {
    #[schema(value_type = String, example = "12")]
    pub site_id: RawId,
    #[validate(length(min = 10, max = 500, message = "objective must be 10-500 characters"))]
    #[schema(example = "Verificar armado de losa nivel 3")]
    pub objective: String,
    #[validate(length(min = 1, max = 120, message = "work type is required"))]
    pub work_type: String,
    #[validate(length(min = 1, max = 200, message = "folder is required"))]
    pub folder: String,
    #[validate(length(min = 1, max = 200, message = "activity is required"))]
    pub activity: String,
    pub date: NaiveDate,
    pub outcome: EvaluationOutcome,
    pub reason_selector: Option<String>,
    #[validate(length(max = 500, message = "notes must be at most 500 characters"))]
    pub notes: Option<String>,
    /// Human identifier; generated from the clock when omitted.
    pub identifier: Option<String>,
}
