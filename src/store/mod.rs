//! Persistence seam for the queue workflow.
//!
//! Everything the services need from the relational store goes through the
//! traits below. `PgStore` is the production implementation; `MemoryStore`
//! keeps the same contracts in process for tests and local runs.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::models::{
    AnalysisRequest, Appointment, AppointmentDetails, AppointmentStatus, CaseDescription,
    Certificate, NewAppointment, NewCertificate, Patient, PaymentMethod, PrescriptionLine,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("row decode error: {0}")]
    Decode(String),

    #[error("unknown {kind} id {id}")]
    UnknownReference { kind: &'static str, id: i64 },

    #[error("unsupported store operation: {0}")]
    Unsupported(&'static str),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of the guarded move into Consulting.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsultationEntry {
    Entered(Appointment),
    /// Another appointment dated the guarded day is already Consulting.
    LimitReached { blocking_id: i64 },
    /// The appointment is no longer in one of the expected source statuses.
    Moved { status: AppointmentStatus },
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DayBucket {
    pub day: NaiveDate,
    pub count: i64,
    pub revenue_cents: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MonthBucket {
    pub year: i32,
    pub month: u32,
    pub count: i64,
    pub revenue_cents: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct YearBucket {
    pub year: i32,
    pub count: i64,
}

#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn find_appointment(&self, id: i64) -> StoreResult<Option<Appointment>>;

    /// Appointments dated `day`, most recently created first.
    async fn appointments_on(&self, day: NaiveDate) -> StoreResult<Vec<Appointment>>;

    /// Appointments dated strictly after `day`, earliest first.
    async fn appointments_after(&self, day: NaiveDate, limit: i64) -> StoreResult<Vec<Appointment>>;

    /// Sets any status other than Consulting. Completed stamps the end time
    /// when it is still empty.
    async fn update_status(
        &self,
        id: i64,
        status: AppointmentStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Appointment>>;

    /// Count-then-write for the single active consultation of `day`, executed
    /// atomically. When `from` is not empty the appointment must currently be
    /// in one of those statuses. On success the start time is set if empty
    /// and the end time is cleared.
    async fn enter_consultation(
        &self,
        id: i64,
        day: NaiveDate,
        from: &[AppointmentStatus],
        now: DateTime<Utc>,
    ) -> StoreResult<ConsultationEntry>;

    async fn toggle_insurance(&self, id: i64, now: DateTime<Utc>) -> StoreResult<Option<Appointment>>;

    /// A `None` method keeps the one already recorded.
    async fn update_payment(
        &self,
        id: i64,
        payment_cents: i64,
        method: Option<PaymentMethod>,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Appointment>>;

    /// Diagnostic, case description and both link sets in one transaction.
    /// Returns `false` when the appointment does not exist.
    async fn save_details(
        &self,
        id: i64,
        details: &AppointmentDetails,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Latest appointment of `patient_id` by date, ignoring `exclude_id`.
    async fn latest_for_patient(
        &self,
        patient_id: i64,
        exclude_id: i64,
    ) -> StoreResult<Option<Appointment>>;

    async fn case_description(&self, appointment_id: i64) -> StoreResult<Option<CaseDescription>>;

    async fn prescription(&self, appointment_id: i64) -> StoreResult<Vec<PrescriptionLine>>;

    async fn analyses(&self, appointment_id: i64) -> StoreResult<Vec<AnalysisRequest>>;

    async fn insert_appointment(
        &self,
        new: &NewAppointment,
        now: DateTime<Utc>,
    ) -> StoreResult<Appointment>;

    /// Per-day appointment counts for one month; empty days are absent.
    async fn daily_counts(&self, year: i32, month: u32) -> StoreResult<Vec<(NaiveDate, i64)>>;
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn count_patients(&self) -> StoreResult<i64>;

    async fn count_appointments(&self) -> StoreResult<i64>;

    /// Inclusive date range.
    async fn count_appointments_between(&self, from: NaiveDate, to: NaiveDate) -> StoreResult<i64>;

    /// One grouped query over the inclusive range; only non-empty days.
    async fn day_buckets(&self, from: NaiveDate, to: NaiveDate) -> StoreResult<Vec<DayBucket>>;

    /// One grouped query over the inclusive range; only non-empty months.
    async fn month_buckets(&self, from: NaiveDate, to: NaiveDate) -> StoreResult<Vec<MonthBucket>>;

    async fn year_buckets(&self, from_year: i32, to_year: i32) -> StoreResult<Vec<YearBucket>>;

    /// `(age, patients)` for every patient with a birth date.
    async fn patient_ages(&self, today: NaiveDate) -> StoreResult<Vec<(i32, i64)>>;

    /// Earliest and latest appointment dates.
    async fn appointment_date_range(&self) -> StoreResult<Option<(NaiveDate, NaiveDate)>>;
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find_patient(&self, id: i64) -> StoreResult<Option<Patient>>;

    async fn insert_certificate(
        &self,
        new: &NewCertificate,
        now: DateTime<Utc>,
    ) -> StoreResult<Certificate>;

    async fn certificates_for_patient(&self, patient_id: i64) -> StoreResult<Vec<Certificate>>;
}

pub trait ClinicStore: AppointmentStore + ReportStore + RecordStore {}

impl<T: AppointmentStore + ReportStore + RecordStore> ClinicStore for T {}
