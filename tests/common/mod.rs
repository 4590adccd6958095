#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};

use clinic_queue::{
    cache::TtlCache,
    clock::FixedClock,
    models::{AppState, Appointment, AppointmentStatus, AppointmentType, Patient},
    store::MemoryStore,
};

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 15).unwrap()
}

pub fn morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 15, 8, 0, 0).unwrap()
}

/// Clinic day 2026-10-15, wall clock at 10:00.
pub fn clock() -> FixedClock {
    FixedClock::at(Utc.with_ymd_and_hms(2026, 10, 15, 10, 0, 0).unwrap())
}

pub fn at_nine(day: NaiveDate) -> NaiveDateTime {
    day.and_hms_opt(9, 0, 0).unwrap()
}

pub fn patient(id: i64, plan: Option<&str>, birth: Option<NaiveDate>) -> Patient {
    Patient {
        id,
        first_name: format!("First{id}"),
        last_name: format!("Last{id}"),
        birth_date: birth,
        insurance: plan.map(str::to_string),
        archived: false,
    }
}

/// Appointment on `day`, created `created_min` minutes after 08:00 today and
/// last updated at the same instant.
pub fn appointment(id: i64, status: AppointmentStatus, day: NaiveDate, created_min: i64) -> Appointment {
    let created = morning() + Duration::minutes(created_min);
    Appointment {
        id,
        patient_id: 1,
        patient_name: "First1 Last1".into(),
        appointment_date: at_nine(day),
        appointment_type: Some(AppointmentType::Consultation),
        notes: None,
        status,
        consultation_started_at: None,
        consultation_ended_at: None,
        payment_cents: 30_000,
        payment_method: None,
        has_insurance_coverage: false,
        diagnostic: None,
        created_at: created,
        updated_at: created,
    }
}

pub async fn store_with_patient() -> MemoryStore {
    let store = MemoryStore::new();
    store.seed_patient(patient(1, None, None)).await;
    store
}

pub async fn seed_all(store: &MemoryStore, rows: Vec<Appointment>) {
    for row in rows {
        store.seed_appointment(row).await;
    }
}

pub fn app_state(store: Arc<MemoryStore>) -> AppState {
    AppState {
        store,
        clock: Arc::new(clock()),
        stats_cache: TtlCache::new(16, StdDuration::from_secs(1800)),
    }
}
