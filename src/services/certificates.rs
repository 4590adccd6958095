// src/services/certificates.rs

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::info;

use super::{ClinicError, Validator};
use crate::{
    clock::Clock,
    models::{Certificate, NewCertificate},
    store::{RecordStore, StoreError},
};

/// Longest span a single certificate may cover, counted as `end - start`.
pub const MAX_CERTIFICATE_DAYS: i64 = 20;

#[derive(Debug, Clone, Deserialize)]
pub struct CertificateRequest {
    #[serde(alias = "ID_patient")]
    pub patient_id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub content: String,
}

pub fn span_days(start: NaiveDate, end: NaiveDate) -> i64 {
    (end - start).num_days()
}

impl CertificateRequest {
    pub fn validate(&self) -> Result<(), ClinicError> {
        let mut v = Validator::default();
        if self.end_date < self.start_date {
            v.reject("end_date", "end_date must be on or after start_date");
        } else if span_days(self.start_date, self.end_date) > MAX_CERTIFICATE_DAYS {
            v.reject(
                "end_date",
                format!("a certificate may not cover more than {MAX_CERTIFICATE_DAYS} days"),
            );
        }
        if self.content.trim().is_empty() {
            v.reject("content", "content is required");
        }
        v.finish()
    }
}

pub async fn create_certificate<S>(
    store: &S,
    clock: &dyn Clock,
    request: CertificateRequest,
) -> Result<Certificate, ClinicError>
where
    S: RecordStore + ?Sized,
{
    request.validate()?;

    let new = NewCertificate {
        patient_id: request.patient_id,
        start_date: request.start_date,
        end_date: request.end_date,
        content: request.content,
    };
    let certificate = match store.insert_certificate(&new, clock.now()).await {
        Ok(c) => c,
        Err(StoreError::UnknownReference { kind: "patient", id }) => {
            return Err(ClinicError::not_found("patient", id));
        }
        Err(err) => return Err(err.into()),
    };

    info!(
        certificate_id = certificate.id,
        patient_id = certificate.patient_id,
        days = span_days(certificate.start_date, certificate.end_date),
        "certificate created"
    );
    Ok(certificate)
}

pub async fn certificates_for_patient<S>(
    store: &S,
    patient_id: i64,
) -> Result<Vec<Certificate>, ClinicError>
where
    S: RecordStore + ?Sized,
{
    if store.find_patient(patient_id).await?.is_none() {
        return Err(ClinicError::not_found("patient", patient_id));
    }
    Ok(store.certificates_for_patient(patient_id).await?)
}
