//! Runs against a real database when `DATABASE_URL` is set; every test is a
//! no-op otherwise. Rows are dated on a day nobody else uses so reruns and
//! parallel tests do not see each other's consultations.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use assert_matches::assert_matches;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use sqlx::PgPool;

use clinic_queue::{
    db,
    models::{
        AppointmentDetails, AppointmentStatus::*, AppointmentType, CaseDescription,
        MedicamentLink, NewAppointment, PaymentMethod,
    },
    store::{AppointmentStore, ConsultationEntry, PgStore, StoreError},
};

static NEXT_DAY: AtomicI64 = AtomicI64::new(0);

async fn connect() -> Option<(PgStore, PgPool)> {
    dotenvy::dotenv().ok();
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = db::connect_pg(&url, 4).await.unwrap();
    Some((PgStore::new(pool.clone()), pool))
}

/// A day far in the future, distinct per test and per run.
fn unused_day() -> NaiveDate {
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64;
    let offset = (seed % 20_000) * 8 + NEXT_DAY.fetch_add(1, Ordering::SeqCst);
    NaiveDate::from_ymd_opt(2200, 1, 1).unwrap() + Duration::days(offset)
}

fn noon(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_hms_opt(12, 0, 0).unwrap())
}

async fn insert_patient(pool: &PgPool) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO patient (first_name, last_name) VALUES ('Store', 'Test') RETURNING patient_id",
    )
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn insert_medicament(pool: &PgPool, name: &str) -> i64 {
    sqlx::query_scalar("INSERT INTO medicament (name) VALUES ($1) RETURNING medicament_id")
        .bind(name)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn book(store: &PgStore, patient_id: i64, day: NaiveDate) -> i64 {
    store
        .insert_appointment(
            &NewAppointment {
                patient_id,
                appointment_date: day.and_hms_opt(9, 0, 0).unwrap(),
                appointment_type: AppointmentType::Consultation,
                notes: None,
                payment_cents: 30_000,
                has_insurance_coverage: false,
            },
            noon(day),
        )
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn consultation_guard_holds_in_postgres() {
    let Some((store, pool)) = connect().await else {
        return;
    };
    let day = unused_day();
    let now = noon(day);
    let patient = insert_patient(&pool).await;
    let first = book(&store, patient, day).await;
    let second = book(&store, patient, day).await;

    let entered = store.enter_consultation(first, day, &[], now).await.unwrap();
    assert_matches!(entered, ConsultationEntry::Entered(a) if a.status == Consulting);

    let refused = store.enter_consultation(second, day, &[], now).await.unwrap();
    assert_eq!(refused, ConsultationEntry::LimitReached { blocking_id: first });
    let untouched = store.find_appointment(second).await.unwrap().unwrap();
    assert_eq!(untouched.status, Scheduled);

    let moved = store
        .enter_consultation(second, day, &[Waiting, Preparing], now)
        .await
        .unwrap();
    assert_eq!(moved, ConsultationEntry::Moved { status: Scheduled });

    // re-entry keeps the first start time and reopens the end
    store.update_status(first, Completed, now + Duration::minutes(15)).await.unwrap();
    let reopened = store
        .enter_consultation(first, day, &[Completed], now + Duration::minutes(20))
        .await
        .unwrap();
    assert_matches!(
        reopened,
        ConsultationEntry::Entered(a)
            if a.consultation_started_at == Some(now) && a.consultation_ended_at.is_none()
    );

    assert_eq!(
        store.enter_consultation(-1, day, &[], now).await.unwrap(),
        ConsultationEntry::NotFound
    );
}

#[tokio::test]
async fn concurrent_entries_admit_one_in_postgres() {
    let Some((store, pool)) = connect().await else {
        return;
    };
    let day = unused_day();
    let patient = insert_patient(&pool).await;
    let mut ids = Vec::new();
    for _ in 0..6 {
        ids.push(book(&store, patient, day).await);
    }

    let handles: Vec<_> = ids
        .iter()
        .map(|id| {
            let store = store.clone();
            let id = *id;
            tokio::spawn(async move { store.enter_consultation(id, day, &[], noon(day)).await })
        })
        .collect();

    let mut admitted = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            ConsultationEntry::Entered(_) => admitted += 1,
            other => assert_matches!(other, ConsultationEntry::LimitReached { .. }),
        }
    }
    assert_eq!(admitted, 1);
    assert_eq!(
        store
            .appointments_on(day)
            .await
            .unwrap()
            .iter()
            .filter(|a| a.status == Consulting)
            .count(),
        1
    );
}

#[tokio::test]
async fn details_edit_rolls_back_on_unknown_reference() {
    let Some((store, pool)) = connect().await else {
        return;
    };
    let day = unused_day();
    let patient = insert_patient(&pool).await;
    let id = book(&store, patient, day).await;
    let medicament = insert_medicament(&pool, "Amoxicilline").await;

    let details = AppointmentDetails {
        diagnostic: Some("Angine".into()),
        case: CaseDescription {
            weight: Some(70.0),
            ..Default::default()
        },
        medicaments: vec![MedicamentLink {
            medicament_id: medicament,
            dosage: Some("1g".into()),
            frequency: None,
            duration: None,
        }],
        analysis_ids: vec![-1],
    };

    let result = store.save_details(id, &details, noon(day)).await;
    assert_matches!(result, Err(StoreError::UnknownReference { kind: "analysis", id: -1 }));

    let row = store.find_appointment(id).await.unwrap().unwrap();
    assert_eq!(row.diagnostic, None);
    assert!(store.case_description(id).await.unwrap().is_none());
    assert!(store.prescription(id).await.unwrap().is_empty());

    let saved = AppointmentDetails {
        analysis_ids: Vec::new(),
        ..details
    };
    assert!(store.save_details(id, &saved, noon(day)).await.unwrap());
    assert_eq!(store.prescription(id).await.unwrap()[0].name, "Amoxicilline");
    assert!(!store.save_details(-1, &saved, noon(day)).await.unwrap());
}

#[tokio::test]
async fn payment_method_is_persisted() {
    let Some((store, pool)) = connect().await else {
        return;
    };
    let day = unused_day();
    let patient = insert_patient(&pool).await;
    let id = book(&store, patient, day).await;

    let paid = store
        .update_payment(id, 25_000, Some(PaymentMethod::Check), noon(day))
        .await
        .unwrap()
        .unwrap();
    assert_eq!((paid.payment_cents, paid.payment_method), (25_000, Some(PaymentMethod::Check)));

    let kept = store.update_payment(id, 20_000, None, noon(day)).await.unwrap().unwrap();
    assert_eq!(kept.payment_method, Some(PaymentMethod::Check));
    assert!(store.update_payment(-1, 0, None, noon(day)).await.unwrap().is_none());
}
