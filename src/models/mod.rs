pub mod contractor;
pub mod patch;
pub mod site;
pub mod user;
pub mod work_log;
pub mod work_order;

use serde::Deserialize;

use crate::errors::{AppError, AppResult};

pub use patch::Patch;

/// An id as submitted by a client: JSON number or form text.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Number(i64),
    Text(String),
}

impl RawId {
    pub fn parse(&self, field: &str) -> AppResult<i64> {
        let id = match self {
            RawId::Number(n) => *n,
            RawId::Text(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| AppError::bad_request(format!("{field} must be a numeric id")))?,
        };
        if id <= 0 {
            return Err(AppError::bad_request(format!("{field} must be a positive id")));
        }
        Ok(id)
    }
}
