use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use crate::authz::TenantOwned;
use crate::models::Patch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkLogStatus {
    #[default]
    Abierta,
    Cerrada,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvidenceCategory {
    /// Evidence captured when the observation is raised.
    Inicial,
    /// Evidence captured while following the observation up.
    Seguimiento,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WorkLog {
    pub id: i64,
    pub site_id: i64,
    pub responsible_id: i64,
    pub contractor_id: Option<i64>,
    pub variable_id: i64,
    pub measurement_id: Option<i64>,
    pub unit_id: Option<i64>,
    pub status: WorkLogStatus,
    pub code: String,
    pub creation_date: NaiveDate,
    pub location: String,
    pub notes: Option<String>,
    pub follow_up: Option<String>,
    pub commitment_date: Option<NaiveDate>,
    pub execution_date: Option<NaiveDate>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub initial_evidence: Vec<WorkLogMedia>,
    pub follow_up_evidence: Vec<WorkLogMedia>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct WorkLogMedia {
    pub id: i64,
    pub work_log_id: i64,
    pub category: EvidenceCategory,
    pub url: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Work-log row joined with its site's tenant.
#[derive(Debug, Clone, FromRow)]
pub struct DbWorkLog {
    pub id: i64,
    pub site_id: i64,
    pub responsible_id: i64,
    pub contractor_id: Option<i64>,
    pub variable_id: i64,
    pub measurement_id: Option<i64>,
    pub unit_id: Option<i64>,
    pub status: WorkLogStatus,
    pub code: String,
    pub creation_date: NaiveDate,
    pub location: String,
    pub notes: Option<String>,
    pub follow_up: Option<String>,
    pub commitment_date: Option<NaiveDate>,
    pub execution_date: Option<NaiveDate>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub site_director_id: Option<i64>,
}

impl TenantOwned for DbWorkLog {
    fn tenant_director_id(&self) -> Option<i64> {
        self.site_director_id
    }

    fn is_assigned_to(&self, user_id: i64) -> bool {
        self.responsible_id == user_id
    }
}

impl DbWorkLog {
    pub fn into_work_log(self, media: Vec<WorkLogMedia>) -> WorkLog {
        let (initial_evidence, follow_up_evidence) = media
            .into_iter()
            .partition(|m| m.category == EvidenceCategory::Inicial);

        WorkLog {
            id: self.id,
            site_id: self.site_id,
            responsible_id: self.responsible_id,
            contractor_id: self.contractor_id,
            variable_id: self.variable_id,
            measurement_id: self.measurement_id,
            unit_id: self.unit_id,
            status: self.status,
            code: self.code,
            creation_date: self.creation_date,
            location: self.location,
            notes: self.notes,
            follow_up: self.follow_up,
            commitment_date: self.commitment_date,
            execution_date: self.execution_date,
            latitude: self.latitude,
            longitude: self.longitude,
            created_at: self.created_at,
            updated_at: self.updated_at,
            initial_evidence,
            follow_up_evidence,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct WorkLogCreateRequest {
    pub site_id: i64,
    pub variable_id: i64,
    pub contractor_id: Option<i64>,
    #[serde(default)]
    pub status: WorkLogStatus,
    pub creation_date: NaiveDate,
    #[validate(length(min = 1, max = 300, message = "location is required"))]
    pub location: String,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    #[validate(length(max = 2000))]
    pub follow_up: Option<String>,
    pub commitment_date: Option<NaiveDate>,
    pub execution_date: Option<NaiveDate>,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: Option<f64>,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: Option<f64>,
    pub measurement_id: Option<i64>,
    pub unit_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct WorkLogUpdateRequest {
    pub variable_id: Option<i64>,
    pub status: Option<WorkLogStatus>,
    pub creation_date: Option<NaiveDate>,
    pub location: Option<String>,
    #[serde(default)]
    #[schema(value_type = Option<i64>)]
    pub contractor_id: Patch<i64>,
    #[serde(default)]
    #[schema(value_type = Option<i64>)]
    pub measurement_id: Patch<i64>,
    #[serde(default)]
    #[schema(value_type = Option<i64>)]
    pub unit_id: Patch<i64>,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub notes: Patch<String>,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub follow_up: Patch<String>,
    #[serde(default)]
    #[schema(value_type = Option<NaiveDate>)]
    pub commitment_date: Patch<NaiveDate>,
    #[serde(default)]
    #[schema(value_type = Option<NaiveDate>)]
    pub execution_date: Patch<NaiveDate>,
    #[serde(default)]
    #[schema(value_type = Option<f64>)]
    pub latitude: Patch<f64>,
    #[serde(default)]
    #[schema(value_type = Option<f64>)]
    pub longitude: Patch<f64>,
}

/// Evidence ids to remove, one list per category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, ToSchema)]
pub struct EvidenceDeletion {
    #[serde(default)]
    pub initial_ids: Vec<i64>,
    #[serde(default)]
    pub follow_up_ids: Vec<i64>,
}

/// GPS fix attached to one uploaded photo.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, ToSchema)]
pub struct GpsMetadata {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// One incoming evidence file, already tagged with its category.
#[derive(Debug, Clone)]
pub struct EvidenceUpload {
    pub category: EvidenceCategory,
    pub bytes: Vec<u8>,
    pub filename: Option<String>,
}

impl EvidenceUpload {
    pub fn new(category: EvidenceCategory, bytes: Vec<u8>) -> Self {
        Self {
            category,
            bytes,
            filename: None,
        }
    }
}

/// Files plus per-category GPS metadata, paired by index within a category.
#[derive(Debug, Clone, Default)]
pub struct EvidenceBatch {
    pub files: Vec<EvidenceUpload>,
    pub initial_metadata: Vec<Option<GpsMetadata>>,
    pub follow_up_metadata: Vec<Option<GpsMetadata>>,
}

impl EvidenceBatch {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Pair every file with the metadata at the same index of its category.
    /// Missing entries yield empty coordinates.
    pub fn paired(self) -> Vec<(EvidenceUpload, GpsMetadata)> {
        let EvidenceBatch {
            files,
            initial_metadata,
            follow_up_metadata,
        } = self;
        let mut seen_initial = 0usize;
        let mut seen_follow_up = 0usize;
        let mut out = Vec::with_capacity(files.len());

        for file in files {
            let (index, metadata) = match file.category {
                EvidenceCategory::Inicial => (&mut seen_initial, &initial_metadata),
                EvidenceCategory::Seguimiento => (&mut seen_follow_up, &follow_up_metadata),
            };
            let gps = metadata.get(*index).copied().flatten().unwrap_or_default();
            *index += 1;
            out.push((file, gps));
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gps(lat: f64, lon: f64) -> Option<GpsMetadata> {
        Some(GpsMetadata {
            latitude: Some(lat),
            longitude: Some(lon),
        })
    }

    #[test]
    fn metadata_pairs_by_index_within_category() {
        let batch = EvidenceBatch {
            files: vec![
                EvidenceUpload::new(EvidenceCategory::Inicial, vec![1]),
                EvidenceUpload::new(EvidenceCategory::Seguimiento, vec![2]),
                EvidenceUpload::new(EvidenceCategory::Inicial, vec![3]),
            ],
            initial_metadata: vec![gps(1.0, 2.0), gps(3.0, 4.0)],
            follow_up_metadata: vec![gps(5.0, 6.0)],
        };

        let paired = batch.paired();
        assert_eq!(paired[0].1.latitude, Some(1.0));
        assert_eq!(paired[1].1.latitude, Some(5.0));
        assert_eq!(paired[2].1.longitude, Some(4.0));
    }

    #[test]
    fn missing_metadata_defaults_to_no_coordinates() {
        let batch = EvidenceBatch {
            files: vec![
                EvidenceUpload::new(EvidenceCategory::Inicial, vec![1]),
                EvidenceUpload::new(EvidenceCategory::Inicial, vec![2]),
            ],
            initial_metadata: vec![None],
            follow_up_metadata: vec![],
        };

        let paired = batch.paired();
        assert_eq!(paired.len(), 2);
        assert!(paired.iter().all(|(_, g)| g.latitude.is_none() && g.longitude.is_none()));
    }

    #[test]
    fn media_is_split_by_category() {
        let now = Utc::now();
        let media = |id, category| WorkLogMedia {
            id,
            work_log_id: 1,
            category,
            url: format!("/u/{id}"),
            latitude: None,
            longitude: None,
            created_at: now,
        };
        let row = DbWorkLog {
            id: 1,
            site_id: 1,
            responsible_id: 1,
            contractor_id: None,
            variable_id: 1,
            measurement_id: None,
            unit_id: None,
            status: WorkLogStatus::Abierta,
            code: "AD24-01".into(),
            creation_date: now.date_naive(),
            location: "Torre A".into(),
            notes: None,
            follow_up: None,
            commitment_date: None,
            execution_date: None,
            latitude: None,
            longitude: None,
            created_at: now,
            updated_at: now,
            site_director_id: None,
        };
        let log = row.into_work_log(vec![
            media(1, EvidenceCategory::Inicial),
            media(2, EvidenceCategory::Seguimiento),
            media(3, EvidenceCategory::Inicial),
        ]);
        assert_eq!(log.initial_evidence.iter().map(|m| m.id).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(log.follow_up_evidence.len(), 1);
    }
}
