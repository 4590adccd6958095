// src/store/postgres.rs

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Days, Months, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};

use super::{
    AppointmentStore, ConsultationEntry, DayBucket, MonthBucket, RecordStore, ReportStore,
    StoreError, StoreResult, YearBucket,
};
use crate::models::{
    AnalysisRequest, Appointment, AppointmentDetails, AppointmentStatus, AppointmentType,
    CaseDescription, Certificate, NewAppointment, NewCertificate, Patient, PaymentMethod,
    PrescriptionLine,
};

/// High half of the advisory lock key for the per-day consultation guard.
const CONSULTATION_LOCK_NAMESPACE: i64 = 0x434f_4e53 << 32;

/// Shared projection; every appointment query joins the patient for its name.
const APPOINTMENT_SELECT: &str = r#"
    SELECT
      a.appointment_id,
      a.patient_id,
      p.first_name AS p_first,
      p.last_name  AS p_last,
      a.appointment_date,
      a.appointment_type,
      a.notes,
      a.status,
      a.consultation_started_at,
      a.consultation_ended_at,
      a.payment_cents,
      a.payment_method,
      a.has_insurance_coverage,
      a.diagnostic,
      a.created_at,
      a.updated_at
"#;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs `UPDATE ... RETURNING *` wrapped in a CTE so the patient name can
    /// be joined back in the same statement.
    async fn update_returning<'e, E>(
        executor: E,
        set_clause: &str,
        id: i64,
        bind_now: DateTime<Utc>,
    ) -> StoreResult<Option<Appointment>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let sql = format!(
            r#"
            WITH a AS (
              UPDATE appointment
              SET {set_clause}, updated_at = $2
              WHERE appointment_id = $1
              RETURNING *
            )
            {APPOINTMENT_SELECT}
            FROM a
            JOIN patient p ON p.patient_id = a.patient_id
            "#
        );

        let row = sqlx::query(&sql)
            .bind(id)
            .bind(bind_now)
            .fetch_optional(executor)
            .await?;
        row.as_ref().map(appointment_from_row).transpose()
    }
}

fn day_start(day: NaiveDate) -> NaiveDateTime {
    day.and_time(NaiveTime::MIN)
}

fn next_day_start(day: NaiveDate) -> NaiveDateTime {
    day_start(day + Days::new(1))
}

fn consultation_lock_key(day: NaiveDate) -> i64 {
    CONSULTATION_LOCK_NAMESPACE | i64::from(day.num_days_from_ce())
}

fn decode(e: sqlx::Error) -> StoreError {
    StoreError::Decode(e.to_string())
}

/// Maps a foreign key violation on insert to the referenced row being absent.
fn missing_reference(kind: &'static str, id: i64) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |e| {
        let fk = e
            .as_database_error()
            .is_some_and(|db| db.is_foreign_key_violation());
        if fk {
            StoreError::UnknownReference { kind, id }
        } else {
            StoreError::Database(e)
        }
    }
}

fn nonblank(s: &Option<String>) -> Option<&str> {
    s.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn appointment_from_row(r: &PgRow) -> StoreResult<Appointment> {
    let status: String = r.try_get("status").map_err(decode)?;
    let status = status
        .parse::<AppointmentStatus>()
        .map_err(|e| StoreError::Decode(e.to_string()))?;
    let appointment_type: Option<String> = r.try_get("appointment_type").map_err(decode)?;
    let payment_method: Option<String> = r.try_get("payment_method").map_err(decode)?;
    let first: String = r.try_get("p_first").map_err(decode)?;
    let last: String = r.try_get("p_last").map_err(decode)?;

    Ok(Appointment {
        id: r.try_get("appointment_id").map_err(decode)?,
        patient_id: r.try_get("patient_id").map_err(decode)?,
        patient_name: format!("{first} {last}").trim().to_string(),
        appointment_date: r.try_get("appointment_date").map_err(decode)?,
        appointment_type: appointment_type.as_deref().and_then(AppointmentType::parse),
        notes: r.try_get("notes").map_err(decode)?,
        status,
        consultation_started_at: r.try_get("consultation_started_at").map_err(decode)?,
        consultation_ended_at: r.try_get("consultation_ended_at").map_err(decode)?,
        payment_cents: r.try_get("payment_cents").map_err(decode)?,
        payment_method: payment_method.as_deref().and_then(PaymentMethod::from_legacy),
        has_insurance_coverage: r.try_get("has_insurance_coverage").map_err(decode)?,
        diagnostic: r.try_get("diagnostic").map_err(decode)?,
        created_at: r.try_get("created_at").map_err(decode)?,
        updated_at: r.try_get("updated_at").map_err(decode)?,
    })
}

fn certificate_from_row(r: &PgRow) -> StoreResult<Certificate> {
    Ok(Certificate {
        id: r.try_get("certificate_id").map_err(decode)?,
        patient_id: r.try_get("patient_id").map_err(decode)?,
        start_date: r.try_get("start_date").map_err(decode)?,
        end_date: r.try_get("end_date").map_err(decode)?,
        content: r.try_get("content").map_err(decode)?,
        created_at: r.try_get("created_at").map_err(decode)?,
    })
}

#[async_trait]
impl AppointmentStore for PgStore {
    async fn find_appointment(&self, id: i64) -> StoreResult<Option<Appointment>> {
        let sql = format!(
            r#"
            {APPOINTMENT_SELECT}
            FROM appointment a
            JOIN patient p ON p.patient_id = a.patient_id
            WHERE a.appointment_id = $1
            "#
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(appointment_from_row).transpose()
    }

    async fn appointments_on(&self, day: NaiveDate) -> StoreResult<Vec<Appointment>> {
        let sql = format!(
            r#"
            {APPOINTMENT_SELECT}
            FROM appointment a
            JOIN patient p ON p.patient_id = a.patient_id
            WHERE a.appointment_date >= $1
              AND a.appointment_date <  $2
            ORDER BY a.created_at DESC, a.appointment_id DESC
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(day_start(day))
            .bind(next_day_start(day))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(appointment_from_row).collect()
    }

    async fn appointments_after(&self, day: NaiveDate, limit: i64) -> StoreResult<Vec<Appointment>> {
        let sql = format!(
            r#"
            {APPOINTMENT_SELECT}
            FROM appointment a
            JOIN patient p ON p.patient_id = a.patient_id
            WHERE a.appointment_date >= $1
            ORDER BY a.appointment_date ASC, a.appointment_id ASC
            LIMIT $2
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(next_day_start(day))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(appointment_from_row).collect()
    }

    async fn update_status(
        &self,
        id: i64,
        status: AppointmentStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Appointment>> {
        let set_clause = match status {
            AppointmentStatus::Completed => {
                "status = 'completed', consultation_ended_at = COALESCE(consultation_ended_at, $2)"
            }
            AppointmentStatus::Scheduled => "status = 'scheduled'",
            AppointmentStatus::Waiting => "status = 'waiting'",
            AppointmentStatus::Preparing => "status = 'preparing'",
            AppointmentStatus::Canceled => "status = 'canceled'",
            AppointmentStatus::Consulting => {
                return Err(StoreError::Unsupported(
                    "consulting is only reachable through enter_consultation",
                ));
            }
        };
        Self::update_returning(&self.pool, set_clause, id, now).await
    }

    async fn enter_consultation(
        &self,
        id: i64,
        day: NaiveDate,
        from: &[AppointmentStatus],
        now: DateTime<Utc>,
    ) -> StoreResult<ConsultationEntry> {
        let mut tx = self.pool.begin().await?;

        // serializes every consultation entry for the same day
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(consultation_lock_key(day))
            .execute(&mut *tx)
            .await?;

        let target: Option<String> = sqlx::query_scalar(
            r#"
            SELECT status
            FROM appointment
            WHERE appointment_id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(current) = target else {
            return Ok(ConsultationEntry::NotFound);
        };
        let current = current
            .parse::<AppointmentStatus>()
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        if !from.is_empty() && !from.contains(&current) {
            return Ok(ConsultationEntry::Moved { status: current });
        }

        let blocking: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT appointment_id
            FROM appointment
            WHERE status = 'consulting'
              AND appointment_date >= $1
              AND appointment_date <  $2
              AND appointment_id <> $3
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(day_start(day))
        .bind(next_day_start(day))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(blocking_id) = blocking {
            return Ok(ConsultationEntry::LimitReached { blocking_id });
        }

        let updated = Self::update_returning(
            &mut *tx,
            "status = 'consulting', \
             consultation_started_at = COALESCE(consultation_started_at, $2), \
             consultation_ended_at = NULL",
            id,
            now,
        )
        .await?;

        tx.commit().await?;

        Ok(match updated {
            Some(appointment) => ConsultationEntry::Entered(appointment),
            None => ConsultationEntry::NotFound,
        })
    }

    async fn toggle_insurance(&self, id: i64, now: DateTime<Utc>) -> StoreResult<Option<Appointment>> {
        Self::update_returning(
            &self.pool,
            "has_insurance_coverage = NOT has_insurance_coverage",
            id,
            now,
        )
        .await
    }

    async fn update_payment(
        &self,
        id: i64,
        payment_cents: i64,
        method: Option<PaymentMethod>,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Appointment>> {
        let sql = format!(
            r#"
            WITH a AS (
              UPDATE appointment
              SET payment_cents = $3,
                  payment_method = COALESCE($4, payment_method),
                  updated_at = $2
              WHERE appointment_id = $1
              RETURNING *
            )
            {APPOINTMENT_SELECT}
            FROM a
            JOIN patient p ON p.patient_id = a.patient_id
            "#
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(now)
            .bind(payment_cents)
            .bind(method.map(PaymentMethod::as_str))
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(appointment_from_row).transpose()
    }

    async fn save_details(
        &self,
        id: i64,
        details: &AppointmentDetails,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE appointment
            SET diagnostic = $2, updated_at = $3
            WHERE appointment_id = $1
            "#,
        )
        .bind(id)
        .bind(details.diagnostic.as_deref())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Ok(false);
        }

        let case = &details.case;
        if !case.is_empty() {
            sqlx::query(
                r#"
                INSERT INTO case_description (
                  appointment_id, case_description, weight, pulse, temperature,
                  blood_pressure, height, spo2, blood_group, glycemia, notes,
                  created_at, updated_at
                )
                VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$12)
                ON CONFLICT (appointment_id) DO UPDATE SET
                  case_description = COALESCE(EXCLUDED.case_description, case_description.case_description),
                  weight           = COALESCE(EXCLUDED.weight, case_description.weight),
                  pulse            = COALESCE(EXCLUDED.pulse, case_description.pulse),
                  temperature      = COALESCE(EXCLUDED.temperature, case_description.temperature),
                  blood_pressure   = COALESCE(EXCLUDED.blood_pressure, case_description.blood_pressure),
                  height           = COALESCE(EXCLUDED.height, case_description.height),
                  spo2             = COALESCE(EXCLUDED.spo2, case_description.spo2),
                  blood_group      = COALESCE(EXCLUDED.blood_group, case_description.blood_group),
                  glycemia         = COALESCE(EXCLUDED.glycemia, case_description.glycemia),
                  notes            = COALESCE(EXCLUDED.notes, case_description.notes),
                  updated_at       = EXCLUDED.updated_at
                "#,
            )
            .bind(id)
            .bind(nonblank(&case.case_description))
            .bind(case.weight)
            .bind(case.pulse)
            .bind(case.temperature)
            .bind(nonblank(&case.blood_pressure))
            .bind(case.height)
            .bind(case.spo2)
            .bind(nonblank(&case.blood_group))
            .bind(case.glycemia)
            .bind(nonblank(&case.notes))
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        // medicament links (replace all)
        let medicament_ids: Vec<i64> = details.medicaments.iter().map(|m| m.medicament_id).collect();
        let known: Vec<i64> =
            sqlx::query_scalar("SELECT medicament_id FROM medicament WHERE medicament_id = ANY($1)")
                .bind(&medicament_ids)
                .fetch_all(&mut *tx)
                .await?;
        if let Some(missing) = medicament_ids.iter().find(|id| !known.contains(id)) {
            return Err(StoreError::UnknownReference {
                kind: "medicament",
                id: *missing,
            });
        }

        sqlx::query("DELETE FROM appointment_medicament WHERE appointment_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        for link in &details.medicaments {
            sqlx::query(
                r#"
                INSERT INTO appointment_medicament (appointment_id, medicament_id, dosage, frequency, duration, created_at)
                VALUES ($1,$2,$3,$4,$5,$6)
                ON CONFLICT (appointment_id, medicament_id) DO UPDATE SET
                  dosage = EXCLUDED.dosage,
                  frequency = EXCLUDED.frequency,
                  duration = EXCLUDED.duration
                "#,
            )
            .bind(id)
            .bind(link.medicament_id)
            .bind(link.dosage.as_deref())
            .bind(link.frequency.as_deref())
            .bind(link.duration.as_deref())
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        // analysis links (replace all)
        let known: Vec<i64> =
            sqlx::query_scalar("SELECT analysis_id FROM analysis WHERE analysis_id = ANY($1)")
                .bind(&details.analysis_ids)
                .fetch_all(&mut *tx)
                .await?;
        if let Some(missing) = details.analysis_ids.iter().find(|id| !known.contains(id)) {
            return Err(StoreError::UnknownReference {
                kind: "analysis",
                id: *missing,
            });
        }

        sqlx::query("DELETE FROM appointment_analysis WHERE appointment_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        for analysis_id in &details.analysis_ids {
            sqlx::query(
                r#"
                INSERT INTO appointment_analysis (appointment_id, analysis_id, created_at)
                VALUES ($1,$2,$3)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(id)
            .bind(analysis_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn latest_for_patient(
        &self,
        patient_id: i64,
        exclude_id: i64,
    ) -> StoreResult<Option<Appointment>> {
        let sql = format!(
            r#"
            {APPOINTMENT_SELECT}
            FROM appointment a
            JOIN patient p ON p.patient_id = a.patient_id
            WHERE a.patient_id = $1
              AND a.appointment_id <> $2
            ORDER BY a.appointment_date DESC, a.appointment_id DESC
            LIMIT 1
            "#
        );
        let row = sqlx::query(&sql)
            .bind(patient_id)
            .bind(exclude_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(appointment_from_row).transpose()
    }

    async fn case_description(&self, appointment_id: i64) -> StoreResult<Option<CaseDescription>> {
        let row = sqlx::query(
            r#"
            SELECT case_description, weight, pulse, temperature, blood_pressure,
                   height, spo2, blood_group, glycemia, notes
            FROM case_description
            WHERE appointment_id = $1
            "#,
        )
        .bind(appointment_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(r) = row else {
            return Ok(None);
        };

        Ok(Some(CaseDescription {
            case_description: r.try_get("case_description").map_err(decode)?,
            weight: r.try_get("weight").map_err(decode)?,
            pulse: r.try_get("pulse").map_err(decode)?,
            temperature: r.try_get("temperature").map_err(decode)?,
            blood_pressure: r.try_get("blood_pressure").map_err(decode)?,
            height: r.try_get("height").map_err(decode)?,
            spo2: r.try_get("spo2").map_err(decode)?,
            blood_group: r.try_get("blood_group").map_err(decode)?,
            glycemia: r.try_get("glycemia").map_err(decode)?,
            notes: r.try_get("notes").map_err(decode)?,
        }))
    }

    async fn prescription(&self, appointment_id: i64) -> StoreResult<Vec<PrescriptionLine>> {
        let rows = sqlx::query(
            r#"
            SELECT am.medicament_id, m.name, am.dosage, am.frequency, am.duration
            FROM appointment_medicament am
            JOIN medicament m ON m.medicament_id = am.medicament_id
            WHERE am.appointment_id = $1
            ORDER BY am.created_at DESC, m.name ASC
            "#,
        )
        .bind(appointment_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                Ok(PrescriptionLine {
                    medicament_id: r.try_get("medicament_id").map_err(decode)?,
                    name: r.try_get("name").map_err(decode)?,
                    dosage: r.try_get("dosage").map_err(decode)?,
                    frequency: r.try_get("frequency").map_err(decode)?,
                    duration: r.try_get("duration").map_err(decode)?,
                })
            })
            .collect()
    }

    async fn analyses(&self, appointment_id: i64) -> StoreResult<Vec<AnalysisRequest>> {
        let rows = sqlx::query(
            r#"
            SELECT aa.analysis_id, an.name
            FROM appointment_analysis aa
            JOIN analysis an ON an.analysis_id = aa.analysis_id
            WHERE aa.appointment_id = $1
            ORDER BY an.name ASC
            "#,
        )
        .bind(appointment_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                Ok(AnalysisRequest {
                    analysis_id: r.try_get("analysis_id").map_err(decode)?,
                    name: r.try_get("name").map_err(decode)?,
                })
            })
            .collect()
    }

    async fn insert_appointment(
        &self,
        new: &NewAppointment,
        now: DateTime<Utc>,
    ) -> StoreResult<Appointment> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO appointment (
              patient_id,
              appointment_date,
              appointment_type,
              notes,
              status,
              payment_cents,
              has_insurance_coverage,
              created_at,
              updated_at
            )
            VALUES ($1,$2,$3,$4,'scheduled',$5,$6,$7,$7)
            RETURNING appointment_id
            "#,
        )
        .bind(new.patient_id)
        .bind(new.appointment_date)
        .bind(new.appointment_type.as_str())
        .bind(new.notes.as_deref())
        .bind(new.payment_cents)
        .bind(new.has_insurance_coverage)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(missing_reference("patient", new.patient_id))?;

        self.find_appointment(id)
            .await?
            .ok_or_else(|| StoreError::Decode(format!("appointment {id} vanished after insert")))
    }

    async fn daily_counts(&self, year: i32, month: u32) -> StoreResult<Vec<(NaiveDate, i64)>> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| StoreError::Decode(format!("invalid month {year}-{month}")))?;
        let next = first + Months::new(1);

        let rows = sqlx::query(
            r#"
            SELECT CAST(appointment_date AS DATE) AS day, COUNT(*) AS count
            FROM appointment
            WHERE appointment_date >= $1
              AND appointment_date <  $2
            GROUP BY 1
            ORDER BY 1
            "#,
        )
        .bind(day_start(first))
        .bind(day_start(next))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| Ok((r.try_get("day").map_err(decode)?, r.try_get("count").map_err(decode)?)))
            .collect()
    }
}

#[async_trait]
impl ReportStore for PgStore {
    async fn count_patients(&self) -> StoreResult<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM patient")
            .fetch_one(&self.pool)
            .await?)
    }

    async fn count_appointments(&self) -> StoreResult<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM appointment")
            .fetch_one(&self.pool)
            .await?)
    }

    async fn count_appointments_between(&self, from: NaiveDate, to: NaiveDate) -> StoreResult<i64> {
        Ok(sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM appointment
            WHERE appointment_date >= $1
              AND appointment_date <  $2
            "#,
        )
        .bind(day_start(from))
        .bind(next_day_start(to))
        .fetch_one(&self.pool)
        .await?)
    }

    async fn day_buckets(&self, from: NaiveDate, to: NaiveDate) -> StoreResult<Vec<DayBucket>> {
        let rows = sqlx::query(
            r#"
            SELECT
              CAST(appointment_date AS DATE) AS day,
              COUNT(*) AS count,
              COALESCE(SUM(payment_cents), 0)::BIGINT AS revenue_cents
            FROM appointment
            WHERE appointment_date >= $1
              AND appointment_date <  $2
            GROUP BY 1
            ORDER BY 1
            "#,
        )
        .bind(day_start(from))
        .bind(next_day_start(to))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                Ok(DayBucket {
                    day: r.try_get("day").map_err(decode)?,
                    count: r.try_get("count").map_err(decode)?,
                    revenue_cents: r.try_get("revenue_cents").map_err(decode)?,
                })
            })
            .collect()
    }

    async fn month_buckets(&self, from: NaiveDate, to: NaiveDate) -> StoreResult<Vec<MonthBucket>> {
        let rows = sqlx::query(
            r#"
            SELECT
              EXTRACT(YEAR FROM appointment_date)::INT  AS year,
              EXTRACT(MONTH FROM appointment_date)::INT AS month,
              COUNT(*) AS count,
              COALESCE(SUM(payment_cents), 0)::BIGINT AS revenue_cents
            FROM appointment
            WHERE appointment_date >= $1
              AND appointment_date <  $2
            GROUP BY 1, 2
            ORDER BY 1, 2
            "#,
        )
        .bind(day_start(from))
        .bind(next_day_start(to))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                let month: i32 = r.try_get("month").map_err(decode)?;
                Ok(MonthBucket {
                    year: r.try_get("year").map_err(decode)?,
                    month: month as u32,
                    count: r.try_get("count").map_err(decode)?,
                    revenue_cents: r.try_get("revenue_cents").map_err(decode)?,
                })
            })
            .collect()
    }

    async fn year_buckets(&self, from_year: i32, to_year: i32) -> StoreResult<Vec<YearBucket>> {
        let (Some(from), Some(to)) = (
            NaiveDate::from_ymd_opt(from_year, 1, 1),
            NaiveDate::from_ymd_opt(to_year + 1, 1, 1),
        ) else {
            return Err(StoreError::Decode(format!("invalid years {from_year}..{to_year}")));
        };

        let rows = sqlx::query(
            r#"
            SELECT EXTRACT(YEAR FROM appointment_date)::INT AS year, COUNT(*) AS count
            FROM appointment
            WHERE appointment_date >= $1
              AND appointment_date <  $2
            GROUP BY 1
            ORDER BY 1
            "#,
        )
        .bind(day_start(from))
        .bind(day_start(to))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                Ok(YearBucket {
                    year: r.try_get("year").map_err(decode)?,
                    count: r.try_get("count").map_err(decode)?,
                })
            })
            .collect()
    }

    async fn patient_ages(&self, today: NaiveDate) -> StoreResult<Vec<(i32, i64)>> {
        let rows = sqlx::query(
            r#"
            SELECT date_part('year', age($1::date, birth_date))::INT AS age, COUNT(*) AS count
            FROM patient
            WHERE birth_date IS NOT NULL
            GROUP BY 1
            "#,
        )
        .bind(today)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| Ok((r.try_get("age").map_err(decode)?, r.try_get("count").map_err(decode)?)))
            .collect()
    }

    async fn appointment_date_range(&self) -> StoreResult<Option<(NaiveDate, NaiveDate)>> {
        let row = sqlx::query(
            r#"
            SELECT
              MIN(appointment_date)::date AS min_day,
              MAX(appointment_date)::date AS max_day
            FROM appointment
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let min_day: Option<NaiveDate> = row.try_get("min_day").map_err(decode)?;
        let max_day: Option<NaiveDate> = row.try_get("max_day").map_err(decode)?;
        Ok(min_day.zip(max_day))
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn find_patient(&self, id: i64) -> StoreResult<Option<Patient>> {
        let row = sqlx::query(
            r#"
            SELECT patient_id, first_name, last_name, birth_date, insurance, archived
            FROM patient
            WHERE patient_id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(r) = row else {
            return Ok(None);
        };

        Ok(Some(Patient {
            id: r.try_get("patient_id").map_err(decode)?,
            first_name: r.try_get("first_name").map_err(decode)?,
            last_name: r.try_get("last_name").map_err(decode)?,
            birth_date: r.try_get("birth_date").map_err(decode)?,
            insurance: r.try_get("insurance").map_err(decode)?,
            archived: r.try_get("archived").map_err(decode)?,
        }))
    }

    async fn insert_certificate(
        &self,
        new: &NewCertificate,
        now: DateTime<Utc>,
    ) -> StoreResult<Certificate> {
        let row = sqlx::query(
            r#"
            INSERT INTO certificate (patient_id, start_date, end_date, content, created_at)
            VALUES ($1,$2,$3,$4,$5)
            RETURNING certificate_id, patient_id, start_date, end_date, content, created_at
            "#,
        )
        .bind(new.patient_id)
        .bind(new.start_date)
        .bind(new.end_date)
        .bind(&new.content)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(missing_reference("patient", new.patient_id))?;

        certificate_from_row(&row)
    }

    async fn certificates_for_patient(&self, patient_id: i64) -> StoreResult<Vec<Certificate>> {
        let rows = sqlx::query(
            r#"
            SELECT certificate_id, patient_id, start_date, end_date, content, created_at
            FROM certificate
            WHERE patient_id = $1
            ORDER BY start_date DESC, certificate_id DESC
            "#,
        )
        .bind(patient_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(certificate_from_row).collect()
    }
}
