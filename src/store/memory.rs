// src/store/memory.rs

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use tokio::sync::Mutex;

use super::{
    AppointmentStore, ConsultationEntry, DayBucket, MonthBucket, RecordStore, ReportStore,
    StoreError, StoreResult, YearBucket,
};
use crate::models::{
    AnalysisRequest, Appointment, AppointmentDetails, AppointmentStatus, CaseDescription,
    Certificate, MedicamentLink, NewAppointment, NewCertificate, Patient, PaymentMethod,
    PrescriptionLine, age_on,
};

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    patients: BTreeMap<i64, Patient>,
    appointments: BTreeMap<i64, Appointment>,
    cases: BTreeMap<i64, CaseDescription>,
    medicaments: BTreeMap<i64, String>,
    analyses: BTreeMap<i64, String>,
    medicament_links: BTreeMap<i64, Vec<MedicamentLink>>,
    analysis_links: BTreeMap<i64, Vec<i64>>,
    certificates: BTreeMap<i64, Certificate>,
}

impl MemoryState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn on_day(&self, day: NaiveDate) -> impl Iterator<Item = &Appointment> {
        self.appointments.values().filter(move |a| a.day() == day)
    }
}

/// In-process store with the same contracts as `PgStore`. One mutex guards
/// all tables, so every trait call is atomic.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a patient as-is; its id must be unique.
    pub async fn seed_patient(&self, patient: Patient) {
        let mut state = self.state.lock().await;
        state.next_id = state.next_id.max(patient.id);
        state.patients.insert(patient.id, patient);
    }

    /// Inserts an appointment with caller-chosen timestamps and status.
    pub async fn seed_appointment(&self, appointment: Appointment) {
        let mut state = self.state.lock().await;
        state.next_id = state.next_id.max(appointment.id);
        state.appointments.insert(appointment.id, appointment);
    }

    pub async fn seed_medicament(&self, id: i64, name: &str) {
        let mut state = self.state.lock().await;
        state.next_id = state.next_id.max(id);
        state.medicaments.insert(id, name.to_string());
    }

    pub async fn seed_analysis(&self, id: i64, name: &str) {
        let mut state = self.state.lock().await;
        state.next_id = state.next_id.max(id);
        state.analyses.insert(id, name.to_string());
    }

    pub async fn all_appointments(&self) -> Vec<Appointment> {
        self.state.lock().await.appointments.values().cloned().collect()
    }

    async fn mutate<F>(&self, id: i64, now: DateTime<Utc>, f: F) -> StoreResult<Option<Appointment>>
    where
        F: FnOnce(&mut Appointment) + Send,
    {
        let mut state = self.state.lock().await;
        Ok(state.appointments.get_mut(&id).map(|a| {
            f(a);
            a.updated_at = now;
            a.clone()
        }))
    }
}

#[async_trait]
impl AppointmentStore for MemoryStore {
    async fn find_appointment(&self, id: i64) -> StoreResult<Option<Appointment>> {
        Ok(self.state.lock().await.appointments.get(&id).cloned())
    }

    async fn appointments_on(&self, day: NaiveDate) -> StoreResult<Vec<Appointment>> {
        let state = self.state.lock().await;
        let mut rows: Vec<Appointment> = state.on_day(day).cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn appointments_after(&self, day: NaiveDate, limit: i64) -> StoreResult<Vec<Appointment>> {
        let state = self.state.lock().await;
        let mut rows: Vec<Appointment> = state
            .appointments
            .values()
            .filter(|a| a.day() > day)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.appointment_date.cmp(&b.appointment_date).then(a.id.cmp(&b.id)));
        rows.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(rows)
    }

    async fn update_status(
        &self,
        id: i64,
        status: AppointmentStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Appointment>> {
        if status == AppointmentStatus::Consulting {
            return Err(StoreError::Unsupported(
                "consulting is only reachable through enter_consultation",
            ));
        }
        self.mutate(id, now, |a| {
            a.status = status;
            if status == AppointmentStatus::Completed && a.consultation_ended_at.is_none() {
                a.consultation_ended_at = Some(now);
            }
        })
        .await
    }

    async fn enter_consultation(
        &self,
        id: i64,
        day: NaiveDate,
        from: &[AppointmentStatus],
        now: DateTime<Utc>,
    ) -> StoreResult<ConsultationEntry> {
        let mut state = self.state.lock().await;

        let Some(current) = state.appointments.get(&id).map(|a| a.status) else {
            return Ok(ConsultationEntry::NotFound);
        };
        if !from.is_empty() && !from.contains(&current) {
            return Ok(ConsultationEntry::Moved { status: current });
        }

        let blocking = state
            .on_day(day)
            .filter(|a| a.status == AppointmentStatus::Consulting && a.id != id)
            .max_by_key(|a| a.created_at)
            .map(|a| a.id);
        if let Some(blocking_id) = blocking {
            return Ok(ConsultationEntry::LimitReached { blocking_id });
        }

        let Some(appointment) = state.appointments.get_mut(&id) else {
            return Ok(ConsultationEntry::NotFound);
        };
        appointment.status = AppointmentStatus::Consulting;
        appointment.consultation_started_at.get_or_insert(now);
        appointment.consultation_ended_at = None;
        appointment.updated_at = now;
        Ok(ConsultationEntry::Entered(appointment.clone()))
    }

    async fn toggle_insurance(&self, id: i64, now: DateTime<Utc>) -> StoreResult<Option<Appointment>> {
        self.mutate(id, now, |a| a.has_insurance_coverage = !a.has_insurance_coverage)
            .await
    }

    async fn update_payment(
        &self,
        id: i64,
        payment_cents: i64,
        method: Option<PaymentMethod>,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Appointment>> {
        self.mutate(id, now, |a| {
            a.payment_cents = payment_cents;
            if method.is_some() {
                a.payment_method = method;
            }
        })
        .await
    }

    async fn save_details(
        &self,
        id: i64,
        details: &AppointmentDetails,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut state = self.state.lock().await;

        if !state.appointments.contains_key(&id) {
            return Ok(false);
        }
        // validate every reference before the first write
        if let Some(link) = details
            .medicaments
            .iter()
            .find(|m| !state.medicaments.contains_key(&m.medicament_id))
        {
            return Err(StoreError::UnknownReference {
                kind: "medicament",
                id: link.medicament_id,
            });
        }
        if let Some(missing) = details
            .analysis_ids
            .iter()
            .find(|a| !state.analyses.contains_key(a))
        {
            return Err(StoreError::UnknownReference {
                kind: "analysis",
                id: *missing,
            });
        }

        if let Some(appointment) = state.appointments.get_mut(&id) {
            appointment.diagnostic = details.diagnostic.clone();
            appointment.updated_at = now;
        }

        if !details.case.is_empty() {
            state.cases.entry(id).or_default().merge(&details.case);
        }

        let mut links: Vec<MedicamentLink> = Vec::new();
        for link in &details.medicaments {
            links.retain(|l| l.medicament_id != link.medicament_id);
            links.push(link.clone());
        }
        state.medicament_links.insert(id, links);

        let mut analysis_ids = details.analysis_ids.clone();
        analysis_ids.sort_unstable();
        analysis_ids.dedup();
        state.analysis_links.insert(id, analysis_ids);

        Ok(true)
    }

    async fn latest_for_patient(
        &self,
        patient_id: i64,
        exclude_id: i64,
    ) -> StoreResult<Option<Appointment>> {
        let state = self.state.lock().await;
        Ok(state
            .appointments
            .values()
            .filter(|a| a.patient_id == patient_id && a.id != exclude_id)
            .max_by(|a, b| a.appointment_date.cmp(&b.appointment_date).then(a.id.cmp(&b.id)))
            .cloned())
    }

    async fn case_description(&self, appointment_id: i64) -> StoreResult<Option<CaseDescription>> {
        Ok(self.state.lock().await.cases.get(&appointment_id).cloned())
    }

    async fn prescription(&self, appointment_id: i64) -> StoreResult<Vec<PrescriptionLine>> {
        let state = self.state.lock().await;
        let links = state
            .medicament_links
            .get(&appointment_id)
            .cloned()
            .unwrap_or_default();
        Ok(links
            .into_iter()
            .map(|l| PrescriptionLine {
                name: state
                    .medicaments
                    .get(&l.medicament_id)
                    .cloned()
                    .unwrap_or_default(),
                medicament_id: l.medicament_id,
                dosage: l.dosage,
                frequency: l.frequency,
                duration: l.duration,
            })
            .collect())
    }

    async fn analyses(&self, appointment_id: i64) -> StoreResult<Vec<AnalysisRequest>> {
        let state = self.state.lock().await;
        let mut rows: Vec<AnalysisRequest> = state
            .analysis_links
            .get(&appointment_id)
            .map(|ids| {
                ids.iter()
                    .map(|id| AnalysisRequest {
                        analysis_id: *id,
                        name: state.analyses.get(id).cloned().unwrap_or_default(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn insert_appointment(
        &self,
        new: &NewAppointment,
        now: DateTime<Utc>,
    ) -> StoreResult<Appointment> {
        let mut state = self.state.lock().await;
        let patient_name = state
            .patients
            .get(&new.patient_id)
            .map(Patient::display_name)
            .ok_or(StoreError::UnknownReference {
                kind: "patient",
                id: new.patient_id,
            })?;
        let id = state.allocate_id();
        let appointment = Appointment {
            id,
            patient_id: new.patient_id,
            patient_name,
            appointment_date: new.appointment_date,
            appointment_type: Some(new.appointment_type),
            notes: new.notes.clone(),
            status: AppointmentStatus::Scheduled,
            consultation_started_at: None,
            consultation_ended_at: None,
            payment_cents: new.payment_cents,
            payment_method: None,
            has_insurance_coverage: new.has_insurance_coverage,
            diagnostic: None,
            created_at: now,
            updated_at: now,
        };
        state.appointments.insert(id, appointment.clone());
        Ok(appointment)
    }

    async fn daily_counts(&self, year: i32, month: u32) -> StoreResult<Vec<(NaiveDate, i64)>> {
        let state = self.state.lock().await;
        let mut counts: BTreeMap<NaiveDate, i64> = BTreeMap::new();
        for a in state.appointments.values() {
            let day = a.day();
            if day.year() == year && day.month() == month {
                *counts.entry(day).or_default() += 1;
            }
        }
        Ok(counts.into_iter().collect())
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn count_patients(&self) -> StoreResult<i64> {
        Ok(self.state.lock().await.patients.len() as i64)
    }

    async fn count_appointments(&self) -> StoreResult<i64> {
        Ok(self.state.lock().await.appointments.len() as i64)
    }

    async fn count_appointments_between(&self, from: NaiveDate, to: NaiveDate) -> StoreResult<i64> {
        let state = self.state.lock().await;
        Ok(state
            .appointments
            .values()
            .filter(|a| (from..=to).contains(&a.day()))
            .count() as i64)
    }

    async fn day_buckets(&self, from: NaiveDate, to: NaiveDate) -> StoreResult<Vec<DayBucket>> {
        let state = self.state.lock().await;
        let mut buckets: BTreeMap<NaiveDate, DayBucket> = BTreeMap::new();
        for a in state.appointments.values().filter(|a| (from..=to).contains(&a.day())) {
            let bucket = buckets.entry(a.day()).or_insert(DayBucket {
                day: a.day(),
                count: 0,
                revenue_cents: 0,
            });
            bucket.count += 1;
            bucket.revenue_cents += a.payment_cents;
        }
        Ok(buckets.into_values().collect())
    }

    async fn month_buckets(&self, from: NaiveDate, to: NaiveDate) -> StoreResult<Vec<MonthBucket>> {
        let state = self.state.lock().await;
        let mut buckets: BTreeMap<(i32, u32), MonthBucket> = BTreeMap::new();
        for a in state.appointments.values().filter(|a| (from..=to).contains(&a.day())) {
            let (year, month) = (a.day().year(), a.day().month());
            let bucket = buckets.entry((year, month)).or_insert(MonthBucket {
                year,
                month,
                count: 0,
                revenue_cents: 0,
            });
            bucket.count += 1;
            bucket.revenue_cents += a.payment_cents;
        }
        Ok(buckets.into_values().collect())
    }

    async fn year_buckets(&self, from_year: i32, to_year: i32) -> StoreResult<Vec<YearBucket>> {
        let state = self.state.lock().await;
        let mut counts: BTreeMap<i32, i64> = BTreeMap::new();
        for a in state.appointments.values() {
            let year = a.day().year();
            if (from_year..=to_year).contains(&year) {
                *counts.entry(year).or_default() += 1;
            }
        }
        Ok(counts
            .into_iter()
            .map(|(year, count)| YearBucket { year, count })
            .collect())
    }

    async fn patient_ages(&self, today: NaiveDate) -> StoreResult<Vec<(i32, i64)>> {
        let state = self.state.lock().await;
        let mut ages: BTreeMap<i32, i64> = BTreeMap::new();
        for birth in state.patients.values().filter_map(|p| p.birth_date) {
            *ages.entry(age_on(birth, today)).or_default() += 1;
        }
        Ok(ages.into_iter().collect())
    }

    async fn appointment_date_range(&self) -> StoreResult<Option<(NaiveDate, NaiveDate)>> {
        let state = self.state.lock().await;
        let min = state.appointments.values().map(Appointment::day).min();
        let max = state.appointments.values().map(Appointment::day).max();
        Ok(min.zip(max))
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn find_patient(&self, id: i64) -> StoreResult<Option<Patient>> {
        Ok(self.state.lock().await.patients.get(&id).cloned())
    }

    async fn insert_certificate(
        &self,
        new: &NewCertificate,
        now: DateTime<Utc>,
    ) -> StoreResult<Certificate> {
        let mut state = self.state.lock().await;
        if !state.patients.contains_key(&new.patient_id) {
            return Err(StoreError::UnknownReference {
                kind: "patient",
                id: new.patient_id,
            });
        }
        let id = state.allocate_id();
        let certificate = Certificate {
            id,
            patient_id: new.patient_id,
            start_date: new.start_date,
            end_date: new.end_date,
            content: new.content.clone(),
            created_at: now,
        };
        state.certificates.insert(id, certificate.clone());
        Ok(certificate)
    }

    async fn certificates_for_patient(&self, patient_id: i64) -> StoreResult<Vec<Certificate>> {
        let state = self.state.lock().await;
        let mut rows: Vec<Certificate> = state
            .certificates
            .values()
            .filter(|c| c.patient_id == patient_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.start_date.cmp(&a.start_date).then(b.id.cmp(&a.id)));
        Ok(rows)
    }
}
