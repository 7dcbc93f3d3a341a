//! API handlers module

pub mod achievements;
pub mod attachments;
pub mod health;
pub mod lecturers;
pub mod students;

use achievo_common::errors::{AppError, Result};
use validator::Validate;

/// Run derive-based request validation, reporting the first offending field
pub(crate) fn validate_request<T: Validate>(request: &T) -> Result<()> {
    request.validate().map_err(|e| AppError::Validation {
        field: e.field_errors().keys().next().map(|k| k.to_string()),
        message: e.to_string(),
    })
}
