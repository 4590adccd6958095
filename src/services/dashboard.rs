//! Physician dashboard: today's queue, the current patient and revenue.
//!
//! Amounts are integer cents. `daily_revenue_cents` and
//! `completed_revenue_cents` are the same figure; clients read both names.

use std::collections::BTreeMap;

use serde::Serialize;

use super::{ClinicError, timing::average_duration};
use crate::{
    clock::Clock,
    models::{Appointment, AppointmentStatus, PaymentMethod},
    store::{AppointmentStore, ReportStore},
};

pub const UPCOMING_LIMIT: i64 = 10;
pub const UNTYPED_BUCKET: &str = "Other";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PaymentBreakdown {
    pub cash: i64,
    pub card: i64,
    pub check: i64,
    pub insurance: i64,
    pub pending: i64,
}

impl PaymentBreakdown {
    pub fn total(&self) -> i64 {
        self.cash + self.card + self.check + self.insurance + self.pending
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeRevenue {
    pub appointment_type: String,
    pub total_cents: i64,
    pub count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RevenueSummary {
    pub daily_revenue_cents: i64,
    pub completed_revenue_cents: i64,
    pub pending_revenue_cents: i64,
    pub payment_breakdown: PaymentBreakdown,
    pub revenue_by_type: Vec<TypeRevenue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSnapshot {
    pub total_patients: i64,
    pub today_appointments: usize,
    pub active_appointments: usize,
    pub current_patient: Option<Appointment>,
    pub waiting: Vec<Appointment>,
    pub preparing: Vec<Appointment>,
    pub completed: Vec<Appointment>,
    pub canceled: Vec<Appointment>,
    pub upcoming: Vec<Appointment>,
    pub average_consultation_minutes: i64,
    pub revenue: RevenueSummary,
}

fn with_status(rows: &[Appointment], status: AppointmentStatus) -> Vec<Appointment> {
    rows.iter().filter(|a| a.status == status).cloned().collect()
}

/// Recorded payment method, else insurance when the visit is covered.
pub fn settled_by(appointment: &Appointment) -> Option<PaymentMethod> {
    appointment
        .payment_method
        .or(appointment
            .has_insurance_coverage
            .then_some(PaymentMethod::Insurance))
}

pub fn revenue_summary(today: &[Appointment]) -> RevenueSummary {
    let completed: Vec<&Appointment> = today
        .iter()
        .filter(|a| a.status == AppointmentStatus::Completed)
        .collect();

    let completed_revenue: i64 = completed.iter().map(|a| a.payment_cents).sum();
    let pending_revenue: i64 = today
        .iter()
        .filter(|a| a.status.is_active())
        .map(|a| a.payment_cents)
        .sum();

    let mut breakdown = PaymentBreakdown {
        pending: pending_revenue,
        ..Default::default()
    };
    let mut by_type: BTreeMap<String, (i64, i64)> = BTreeMap::new();

    for a in &completed {
        // no method and no coverage: counted in the total only
        match settled_by(a) {
            Some(PaymentMethod::Cash) => breakdown.cash += a.payment_cents,
            Some(PaymentMethod::Card) => breakdown.card += a.payment_cents,
            Some(PaymentMethod::Check) => breakdown.check += a.payment_cents,
            Some(PaymentMethod::Insurance) => breakdown.insurance += a.payment_cents,
            None => {}
        }

        let key = a
            .appointment_type
            .map_or(UNTYPED_BUCKET, |t| t.as_str())
            .to_string();
        let entry = by_type.entry(key).or_default();
        entry.0 += a.payment_cents;
        entry.1 += 1;
    }

    RevenueSummary {
        daily_revenue_cents: completed_revenue,
        completed_revenue_cents: completed_revenue,
        pending_revenue_cents: pending_revenue,
        payment_breakdown: breakdown,
        revenue_by_type: by_type
            .into_iter()
            .map(|(appointment_type, (total_cents, count))| TypeRevenue {
                appointment_type,
                total_cents,
                count,
            })
            .collect(),
    }
}

/// Builds the snapshot from today's rows and the upcoming list.
pub fn build_snapshot(
    total_patients: i64,
    today: Vec<Appointment>,
    upcoming: Vec<Appointment>,
) -> DashboardSnapshot {
    let current_patient = today
        .iter()
        .filter(|a| a.status == AppointmentStatus::Consulting)
        .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
        .cloned();

    let mut waiting = with_status(&today, AppointmentStatus::Waiting);
    waiting.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

    let mut preparing = with_status(&today, AppointmentStatus::Preparing);
    preparing.sort_by(|a, b| a.updated_at.cmp(&b.updated_at).then(a.id.cmp(&b.id)));

    let mut completed = with_status(&today, AppointmentStatus::Completed);
    completed.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));

    let mut canceled = with_status(&today, AppointmentStatus::Canceled);
    canceled.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));

    DashboardSnapshot {
        total_patients,
        today_appointments: today.len(),
        active_appointments: today.iter().filter(|a| a.status.is_active()).count(),
        current_patient,
        average_consultation_minutes: average_duration(&completed),
        revenue: revenue_summary(&today),
        waiting,
        preparing,
        completed,
        canceled,
        upcoming,
    }
}

pub async fn snapshot<S>(store: &S, clock: &dyn Clock) -> Result<DashboardSnapshot, ClinicError>
where
    S: AppointmentStore + ReportStore + ?Sized,
{
    let today = clock.today();
    let total_patients = store.count_patients().await?;
    let rows = store.appointments_on(today).await?;
    let upcoming = store.appointments_after(today, UPCOMING_LIMIT).await?;
    Ok(build_snapshot(total_patients, rows, upcoming))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AppointmentType;
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    fn appt(
        id: i64,
        status: AppointmentStatus,
        cents: i64,
        method: Option<PaymentMethod>,
        kind: Option<AppointmentType>,
    ) -> Appointment {
        let base = Utc.with_ymd_and_hms(2026, 10, 15, 8, 0, 0).unwrap();
        Appointment {
            id,
            patient_id: id,
            patient_name: format!("Patient {id}"),
            appointment_date: NaiveDate::from_ymd_opt(2026, 10, 15)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
            appointment_type: kind,
            notes: None,
            status,
            consultation_started_at: None,
            consultation_ended_at: None,
            payment_cents: cents,
            payment_method: method,
            has_insurance_coverage: false,
            diagnostic: None,
            created_at: base + Duration::minutes(id),
            updated_at: base + Duration::minutes(100 - id),
        }
    }

    #[test]
    fn breakdown_reconciles_when_every_method_is_known() {
        use AppointmentStatus::*;
        let rows = vec![
            appt(1, Completed, 30000, Some(PaymentMethod::Cash), Some(AppointmentType::Consultation)),
            appt(2, Completed, 25000, Some(PaymentMethod::Card), Some(AppointmentType::Consultation)),
            appt(3, Completed, 5000, Some(PaymentMethod::Insurance), None),
            appt(4, Completed, 0, Some(PaymentMethod::Check), Some(AppointmentType::Control)),
            appt(5, Waiting, 30000, None, None),
            appt(6, Consulting, 25000, None, None),
            appt(7, Canceled, 30000, Some(PaymentMethod::Cash), None),
            appt(8, Scheduled, 30000, None, None),
        ];
        let revenue = revenue_summary(&rows);

        assert_eq!(revenue.daily_revenue_cents, revenue.completed_revenue_cents);
        assert_eq!(revenue.completed_revenue_cents, 60000);
        assert_eq!(revenue.pending_revenue_cents, 55000);
        assert_eq!(
            revenue.payment_breakdown.total(),
            revenue.completed_revenue_cents + revenue.pending_revenue_cents
        );

        let other = revenue
            .revenue_by_type
            .iter()
            .find(|t| t.appointment_type == UNTYPED_BUCKET)
            .unwrap();
        assert_eq!((other.total_cents, other.count), (5000, 1));
    }

    #[test]
    fn unknown_method_stays_out_of_breakdown() {
        let rows = vec![appt(1, AppointmentStatus::Completed, 30000, None, None)];
        let revenue = revenue_summary(&rows);
        assert_eq!(revenue.completed_revenue_cents, 30000);
        assert_eq!(revenue.payment_breakdown.total(), 0);
    }

    #[test]
    fn covered_visit_without_method_counts_as_insurance() {
        let mut covered = appt(1, AppointmentStatus::Completed, 5000, None, None);
        covered.has_insurance_coverage = true;
        let mut paid_cash = appt(2, AppointmentStatus::Completed, 5000, Some(PaymentMethod::Cash), None);
        paid_cash.has_insurance_coverage = true;

        let revenue = revenue_summary(&[covered, paid_cash]);
        assert_eq!(revenue.payment_breakdown.insurance, 5000);
        assert_eq!(revenue.payment_breakdown.cash, 5000);
        assert_eq!(revenue.payment_breakdown.total(), revenue.completed_revenue_cents);
    }

    #[test]
    fn bucket_orders_and_current_patient() {
        use AppointmentStatus::*;
        let rows = vec![
            appt(1, Waiting, 0, None, None),
            appt(2, Waiting, 0, None, None),
            appt(3, Completed, 0, None, None),
            appt(4, Completed, 0, None, None),
            appt(5, Consulting, 0, None, None),
        ];
        let snap = build_snapshot(3, rows, Vec::new());

        assert_eq!(snap.today_appointments, 5);
        assert_eq!(snap.active_appointments, 3);
        assert_eq!(snap.current_patient.map(|a| a.id), Some(5));
        assert_eq!(snap.waiting.iter().map(|a| a.id).collect::<Vec<_>>(), vec![1, 2]);
        // updated_at shrinks as id grows, so 3 is the latest update
        assert_eq!(snap.completed.iter().map(|a| a.id).collect::<Vec<_>>(), vec![3, 4]);
    }
}
