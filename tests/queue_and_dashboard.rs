mod common;

use std::collections::BTreeSet;

use assert_matches::assert_matches;
use chrono::{Duration, NaiveDate};

use clinic_queue::{
    models::{AppointmentStatus::*, AppointmentType, PaymentMethod},
    services::{ClinicError, dashboard, queue},
};
use common::{appointment, clock, patient, seed_all, store_with_patient, today};

#[tokio::test]
async fn buckets_partition_the_day_exactly() {
    let store = store_with_patient().await;
    let tomorrow = today().succ_opt().unwrap();
    let statuses = [Scheduled, Waiting, Preparing, Consulting, Completed, Canceled, Waiting, Completed];
    let mut rows: Vec<_> = statuses
        .iter()
        .enumerate()
        .map(|(i, s)| appointment(10 + i as i64, *s, today(), i as i64))
        .collect();
    rows.push(appointment(50, Waiting, tomorrow, 0));
    seed_all(&store, rows).await;

    let view = queue::queue_for_date(&store, &clock(), Some("2026-10-15")).await.unwrap();

    let mut seen = Vec::new();
    for status in clinic_queue::models::AppointmentStatus::ALL {
        let bucket = view.buckets.bucket(status);
        assert!(bucket.iter().all(|a| a.status == status));
        assert_eq!(view.counts[status.as_str()], bucket.len());
        seen.extend(bucket.iter().map(|a| a.id));
    }
    let unique: BTreeSet<i64> = seen.iter().copied().collect();
    assert_eq!(seen.len(), unique.len());
    assert_eq!(unique, (10..18).collect::<BTreeSet<i64>>());
    assert_eq!(view.total, 8);

    // most recently created first, in the flat list and inside buckets
    assert_eq!(view.appointments.first().map(|a| a.id), Some(17));
    let waiting: Vec<i64> = view.buckets.waiting.iter().map(|a| a.id).collect();
    assert_eq!(waiting, vec![16, 11]);
}

#[tokio::test]
async fn unparseable_date_falls_back_to_today() {
    let store = store_with_patient().await;
    seed_all(&store, vec![appointment(10, Waiting, today(), 0)]).await;

    let view = queue::queue_for_date(&store, &clock(), Some("not-a-date")).await.unwrap();
    assert_eq!(view.date, today());
    assert_eq!(view.total, 1);

    let empty = queue::queue_for_date(&store, &clock(), Some("2020-01-01")).await.unwrap();
    assert_eq!(empty.total, 0);
    assert!(empty.buckets.waiting.is_empty());
}

#[tokio::test]
async fn monthly_counts_skip_empty_days() {
    let store = store_with_patient().await;
    let other_month = NaiveDate::from_ymd_opt(2026, 9, 30).unwrap();
    seed_all(
        &store,
        vec![
            appointment(10, Waiting, today(), 0),
            appointment(11, Completed, today(), 1),
            appointment(12, Scheduled, today().succ_opt().unwrap(), 2),
            appointment(13, Scheduled, other_month, 3),
        ],
    )
    .await;

    let counts = queue::monthly_counts(&store, "2026-10").await.unwrap();
    assert_eq!(counts.counts.len(), 2);
    assert_eq!(counts.counts["2026-10-15"], 2);
    assert_eq!(counts.counts["2026-10-16"], 1);

    assert_matches!(
        queue::monthly_counts(&store, "2026/10").await,
        Err(ClinicError::Validation { .. })
    );
}

#[tokio::test]
async fn dashboard_snapshot_reconciles_revenue() {
    let store = store_with_patient().await;
    store.seed_patient(patient(2, Some("ONE"), None)).await;

    let mut cash = appointment(10, Completed, today(), 0);
    cash.payment_method = Some(PaymentMethod::Cash);
    let mut card = appointment(11, Completed, today(), 1);
    card.payment_method = Some(PaymentMethod::Card);
    card.payment_cents = 25_000;
    let mut control = appointment(12, Completed, today(), 2);
    control.payment_method = Some(PaymentMethod::Check);
    control.payment_cents = 0;
    control.appointment_type = Some(AppointmentType::Control);
    let mut insured = appointment(13, Completed, today(), 3);
    insured.payment_method = Some(PaymentMethod::Insurance);
    insured.payment_cents = 5_000;
    insured.appointment_type = None;

    let mut current = appointment(14, Consulting, today(), 4);
    current.payment_cents = 25_000;
    let waiting = appointment(15, Waiting, today(), 5);
    let canceled = appointment(16, Canceled, today(), 6);
    let future = appointment(17, Scheduled, today() + Duration::days(3), 7);

    seed_all(
        &store,
        vec![cash, card, control, insured, current, waiting, canceled, future],
    )
    .await;

    let snap = dashboard::snapshot(&store, &clock()).await.unwrap();
    let revenue = &snap.revenue;

    assert_eq!(snap.total_patients, 2);
    assert_eq!(snap.today_appointments, 7);
    assert_eq!(snap.active_appointments, 2);
    assert_eq!(snap.current_patient.as_ref().map(|a| a.id), Some(14));
    assert_eq!(snap.upcoming.iter().map(|a| a.id).collect::<Vec<_>>(), vec![17]);

    assert_eq!(revenue.daily_revenue_cents, revenue.completed_revenue_cents);
    assert_eq!(revenue.completed_revenue_cents, 60_000);
    assert_eq!(revenue.pending_revenue_cents, 55_000);
    assert_eq!(revenue.payment_breakdown.cash, 30_000);
    assert_eq!(revenue.payment_breakdown.pending, 55_000);
    assert_eq!(
        revenue.payment_breakdown.total(),
        revenue.completed_revenue_cents + revenue.pending_revenue_cents
    );

    let types: Vec<(&str, i64, i64)> = revenue
        .revenue_by_type
        .iter()
        .map(|t| (t.appointment_type.as_str(), t.total_cents, t.count))
        .collect();
    assert_eq!(
        types,
        vec![("Consultation", 55_000, 2), ("Control", 0, 1), ("Other", 5_000, 1)]
    );
}

#[tokio::test]
async fn dashboard_average_uses_completed_consultations() {
    let store = store_with_patient().await;
    let start = common::morning();

    let mut short = appointment(10, Completed, today(), 0);
    short.consultation_started_at = Some(start);
    short.consultation_ended_at = Some(start + Duration::minutes(10));
    let mut runaway = appointment(11, Completed, today(), 1);
    runaway.consultation_started_at = Some(start);
    runaway.consultation_ended_at = Some(start + Duration::minutes(300));
    runaway.updated_at = runaway.created_at + Duration::minutes(301);
    seed_all(&store, vec![short, runaway]).await;

    let snap = dashboard::snapshot(&store, &clock()).await.unwrap();
    assert_eq!(snap.average_consultation_minutes, 10);
}
