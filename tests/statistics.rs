mod common;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use assert_matches::assert_matches;
use chrono::{Duration, NaiveDate};

use clinic_queue::{
    cache::TtlCache,
    models::AppointmentStatus::*,
    services::{ClinicError, statistics},
    store::MemoryStore,
};
use common::{appointment, clock, patient, seed_all, store_with_patient, today};

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[tokio::test]
async fn daily_trend_is_gap_filled_over_thirty_days() {
    let store = store_with_patient().await;
    let first_day = today() - Duration::days(29);
    seed_all(
        &store,
        vec![
            appointment(10, Completed, first_day, 0),
            appointment(11, Completed, today(), 0),
            // outside the window
            appointment(12, Completed, first_day - Duration::days(1), 0),
        ],
    )
    .await;

    let snapshot = statistics::compute_snapshot(&store, today()).await.unwrap();
    let daily = &snapshot.trends.daily;

    assert_eq!(daily.len(), 30);
    assert_eq!(daily[0].count, 1);
    assert_eq!(daily[29].count, 1);
    assert!(daily[1..29].iter().all(|p| p.count == 0));
    assert_eq!(snapshot.revenue.daily[0].value_cents, 30_000);
    assert_eq!(snapshot.revenue.daily.len(), 30);
}

#[tokio::test]
async fn snapshot_kpis_bands_and_windows() {
    let store = MemoryStore::new();
    store.seed_patient(patient(1, None, Some(day(2010, 1, 1)))).await;
    store.seed_patient(patient(2, None, Some(day(1995, 6, 1)))).await;
    store.seed_patient(patient(3, None, Some(day(1960, 6, 1)))).await;
    store.seed_patient(patient(4, None, None)).await;
    seed_all(
        &store,
        vec![
            appointment(10, Completed, today(), 0),
            appointment(11, Scheduled, day(2026, 10, 30), 1),
            appointment(12, Completed, day(2026, 3, 2), 2),
            appointment(13, Completed, day(2023, 5, 5), 3),
        ],
    )
    .await;

    let snap = statistics::compute_snapshot(&store, today()).await.unwrap();

    assert_eq!(snap.kpi.total_patients, 4);
    assert_eq!(snap.kpi.total_appointments, 4);
    assert_eq!(snap.kpi.appointments_today, 1);
    assert_eq!(snap.kpi.appointments_month, 2);

    let bands: Vec<(&str, i64)> = snap.demographics.iter().map(|b| (b.name, b.value)).collect();
    assert_eq!(bands, vec![("0-18", 1), ("19-35", 1), ("36-50", 0), ("50+", 1)]);

    assert_eq!(snap.trends.monthly.len(), 12);
    assert_eq!(snap.trends.monthly[11].date, "Oct 2026");
    // the future appointment of this month is in the window too
    assert_eq!(snap.trends.monthly[11].count, 2);
    assert_eq!(snap.trends.monthly[4].date, "Mar 2026");
    assert_eq!(snap.trends.monthly[4].count, 1);

    let yearly: Vec<(&str, i64)> = snap
        .trends
        .yearly
        .iter()
        .map(|p| (p.date.as_str(), p.count))
        .collect();
    assert_eq!(
        yearly,
        vec![("2022", 0), ("2023", 1), ("2024", 0), ("2025", 0), ("2026", 3)]
    );

    // 2 this month against 4 / 12 overall
    assert_eq!(snap.insights[1].kind, "growth");
}

#[tokio::test]
async fn cached_trends_stay_stale_until_expiry() {
    let store = store_with_patient().await;
    seed_all(&store, vec![appointment(10, Completed, today(), 0)]).await;
    let cache = TtlCache::new(4, StdDuration::from_millis(200));
    let clock = clock();

    let first = statistics::trends(&store, &cache, &clock).await.unwrap();
    assert_eq!(first.kpi.total_appointments, 1);

    seed_all(&store, vec![appointment(11, Completed, today(), 1)]).await;
    let cached = statistics::trends(&store, &cache, &clock).await.unwrap();
    assert!(Arc::ptr_eq(&first, &cached));
    assert_eq!(cached.kpi.total_appointments, 1);

    tokio::time::sleep(StdDuration::from_millis(400)).await;
    let fresh = statistics::trends(&store, &cache, &clock).await.unwrap();
    assert_eq!(fresh.kpi.total_appointments, 2);
}

#[tokio::test]
async fn available_range_defaults_to_current_year() {
    let store = store_with_patient().await;
    let empty = statistics::available_range(&store, &clock()).await.unwrap();
    assert_eq!((empty.min_year, empty.max_year), (2026, 2026));

    seed_all(
        &store,
        vec![
            appointment(10, Completed, day(2021, 2, 1), 0),
            appointment(11, Scheduled, day(2027, 1, 4), 0),
        ],
    )
    .await;
    let range = statistics::available_range(&store, &clock()).await.unwrap();
    assert_eq!((range.min_year, range.max_year), (2021, 2027));
}

#[tokio::test]
async fn chart_points_for_year_and_month() {
    let store = store_with_patient().await;
    seed_all(
        &store,
        vec![
            appointment(10, Completed, day(2026, 2, 3), 0),
            appointment(11, Completed, day(2026, 2, 28), 0),
            appointment(12, Completed, day(2026, 7, 1), 0),
        ],
    )
    .await;

    let year = statistics::chart(&store, "year", "2026").await.unwrap();
    assert_eq!(year.len(), 12);
    assert_eq!(year[1].date, "Feb");
    assert_eq!((year[1].count, year[1].revenue_cents), (2, 60_000));
    assert_eq!(year[6].count, 1);

    let month = statistics::chart(&store, "month", "2026-02").await.unwrap();
    assert_eq!(month.len(), 28);
    assert_eq!(month[2].date, "03");
    assert_eq!(month[2].count, 1);
    assert_eq!(month[27].count, 1);

    assert_matches!(
        statistics::chart(&store, "week", "2026").await,
        Err(ClinicError::Validation { errors, .. }) if errors.contains_key("view")
    );
    assert_matches!(
        statistics::chart(&store, "month", "2026").await,
        Err(ClinicError::Validation { errors, .. }) if errors.contains_key("target")
    );
}
