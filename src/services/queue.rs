// src/services/queue.rs

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use tracing::warn;

use super::ClinicError;
use crate::{
    clock::Clock,
    models::{Appointment, AppointmentStatus},
    store::AppointmentStore,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueueBuckets {
    pub scheduled: Vec<Appointment>,
    pub waiting: Vec<Appointment>,
    pub preparing: Vec<Appointment>,
    pub consulting: Vec<Appointment>,
    pub completed: Vec<Appointment>,
    pub canceled: Vec<Appointment>,
}

impl QueueBuckets {
    fn bucket_mut(&mut self, status: AppointmentStatus) -> &mut Vec<Appointment> {
        match status {
            AppointmentStatus::Scheduled => &mut self.scheduled,
            AppointmentStatus::Waiting => &mut self.waiting,
            AppointmentStatus::Preparing => &mut self.preparing,
            AppointmentStatus::Consulting => &mut self.consulting,
            AppointmentStatus::Completed => &mut self.completed,
            AppointmentStatus::Canceled => &mut self.canceled,
        }
    }

    pub fn bucket(&self, status: AppointmentStatus) -> &[Appointment] {
        match status {
            AppointmentStatus::Scheduled => &self.scheduled,
            AppointmentStatus::Waiting => &self.waiting,
            AppointmentStatus::Preparing => &self.preparing,
            AppointmentStatus::Consulting => &self.consulting,
            AppointmentStatus::Completed => &self.completed,
            AppointmentStatus::Canceled => &self.canceled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueView {
    pub date: NaiveDate,
    pub appointments: Vec<Appointment>,
    pub buckets: QueueBuckets,
    pub counts: BTreeMap<&'static str, usize>,
    pub total: usize,
}

/// Missing input means today. Garbage also means today, with a warning.
pub fn resolve_date(raw: Option<&str>, today: NaiveDate) -> NaiveDate {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => today,
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap_or_else(|err| {
            warn!(input = s, error = %err, "unparseable queue date, using today");
            today
        }),
    }
}

/// Partitions `appointments` (already in base order) by status. Each bucket
/// keeps the relative order of the input.
pub fn project(date: NaiveDate, appointments: Vec<Appointment>) -> QueueView {
    let mut buckets = QueueBuckets::default();
    for appointment in &appointments {
        buckets.bucket_mut(appointment.status).push(appointment.clone());
    }

    let counts = AppointmentStatus::ALL
        .into_iter()
        .map(|status| (status.as_str(), buckets.bucket(status).len()))
        .collect();

    QueueView {
        date,
        total: appointments.len(),
        appointments,
        buckets,
        counts,
    }
}

pub async fn queue_for_date<S>(
    store: &S,
    clock: &dyn Clock,
    raw_date: Option<&str>,
) -> Result<QueueView, ClinicError>
where
    S: AppointmentStore + ?Sized,
{
    let date = resolve_date(raw_date, clock.today());
    let appointments = store.appointments_on(date).await?;
    Ok(project(date, appointments))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyCounts {
    pub month: String,
    /// Keyed by `YYYY-MM-DD`; days without appointments are absent.
    pub counts: BTreeMap<String, i64>,
}

pub fn parse_month(raw: &str) -> Result<(i32, u32), ClinicError> {
    let invalid = || ClinicError::invalid("month", "month must be formatted as YYYY-MM");
    let first = NaiveDate::parse_from_str(&format!("{}-01", raw.trim()), "%Y-%m-%d")
        .map_err(|_| invalid())?;
    Ok((first.year(), first.month()))
}

pub async fn monthly_counts<S>(store: &S, raw_month: &str) -> Result<MonthlyCounts, ClinicError>
where
    S: AppointmentStore + ?Sized,
{
    let (year, month) = parse_month(raw_month)?;
    let rows = store.daily_counts(year, month).await?;
    Ok(MonthlyCounts {
        month: format!("{year:04}-{month:02}"),
        counts: rows
            .into_iter()
            .map(|(day, count)| (day.format("%Y-%m-%d").to_string(), count))
            .collect(),
    })
}
