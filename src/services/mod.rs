use std::collections::BTreeMap;

use thiserror::Error;

use crate::store::StoreError;

pub mod booking;
pub mod certificates;
pub mod dashboard;
pub mod details;
pub mod navigation;
pub mod queue;
pub mod statistics;
pub mod status;
pub mod timing;

pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Outcome kinds of the workflow services. `NoneAvailable` is not here: an
/// empty queue is a successful navigation result.
#[derive(Debug, Error)]
pub enum ClinicError {
    #[error("{message}")]
    Validation { message: String, errors: FieldErrors },

    #[error("{0}")]
    NotFound(String),

    /// Business rule rejection, not retryable.
    #[error("a patient is already in consultation (appointment {blocking_id}); finish it first")]
    ConsultationLimitExceeded { blocking_id: i64 },

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl ClinicError {
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Validator::default();
        errors.reject(field, message);
        ClinicError::Validation {
            message: "Validation failed".into(),
            errors: errors.errors,
        }
    }

    pub fn not_found(what: &str, id: i64) -> Self {
        ClinicError::NotFound(format!("{what} {id} not found"))
    }
}

/// Collects field-level failures so a request reports all of them at once.
#[derive(Debug, Default)]
pub struct Validator {
    errors: FieldErrors,
}

impl Validator {
    pub fn reject(&mut self, field: &str, message: impl Into<String>) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn range(&mut self, field: &str, value: Option<f64>, min: Option<f64>, max: f64) {
        let Some(v) = value else { return };
        if !v.is_finite() {
            self.reject(field, format!("{field} must be a number"));
            return;
        }
        if let Some(min) = min.filter(|min| v < *min) {
            self.reject(field, format!("{field} must be at least {min}"));
        }
        if v > max {
            self.reject(field, format!("{field} may not be greater than {max}"));
        }
    }

    pub fn max_len(&mut self, field: &str, value: Option<&str>, max: usize) {
        if value.is_some_and(|v| v.chars().count() > max) {
            self.reject(field, format!("{field} may not be longer than {max} characters"));
        }
    }

    pub fn finish(self) -> Result<(), ClinicError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ClinicError::Validation {
                message: "Validation failed".into(),
                errors: self.errors,
            })
        }
    }
}
