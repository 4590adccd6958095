//! Consultation durations.
//!
//! Start and end stamps are written by the status workflow; this module only
//! reads them. The average is a heuristic kept compatible with historical
//! figures: explicit stamps first, audit timestamps as a fallback, and any
//! sample outside the open interval (0, 240) minutes is discarded.

use chrono::{DateTime, Utc};

use crate::models::Appointment;

/// Samples at or beyond this many minutes are treated as bad data.
pub const MAX_PLAUSIBLE_MINUTES: i64 = 240;

/// Whole minutes elapsed; a partial minute is dropped.
fn minutes_between(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_minutes()
}

fn plausible(minutes: i64) -> Option<i64> {
    (minutes > 0 && minutes < MAX_PLAUSIBLE_MINUTES).then_some(minutes)
}

/// Duration of one consultation, or `None` when neither source is usable.
pub fn consultation_minutes(appointment: &Appointment) -> Option<i64> {
    let stamped = appointment
        .consultation_started_at
        .zip(appointment.consultation_ended_at)
        .and_then(|(start, end)| plausible(minutes_between(start, end)));

    stamped.or_else(|| plausible(minutes_between(appointment.created_at, appointment.updated_at)))
}

/// Rounded mean over the usable samples; 0 when there are none.
pub fn average_duration(completed: &[Appointment]) -> i64 {
    let samples: Vec<i64> = completed.iter().filter_map(consultation_minutes).collect();
    if samples.is_empty() {
        return 0;
    }
    (samples.iter().sum::<i64>() as f64 / samples.len() as f64).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AppointmentStatus;
    use chrono::{Duration, NaiveDate, TimeZone};

    fn completed(started: Option<i64>, ended: Option<i64>, audit_minutes: i64) -> Appointment {
        let base = Utc.with_ymd_and_hms(2026, 10, 15, 9, 0, 0).unwrap();
        Appointment {
            id: 1,
            patient_id: 1,
            patient_name: "Test Patient".into(),
            appointment_date: NaiveDate::from_ymd_opt(2026, 10, 15)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
            appointment_type: None,
            notes: None,
            status: AppointmentStatus::Completed,
            consultation_started_at: started.map(|m| base + Duration::minutes(m)),
            consultation_ended_at: ended.map(|m| base + Duration::minutes(m)),
            payment_cents: 0,
            payment_method: None,
            has_insurance_coverage: false,
            diagnostic: None,
            created_at: base,
            updated_at: base + Duration::minutes(audit_minutes),
        }
    }

    #[test]
    fn long_consultations_are_excluded_not_clamped() {
        // audit fallback is also out of bounds for the 300 minute one
        let sample = vec![
            completed(Some(0), Some(10), 0),
            completed(Some(0), Some(300), 300),
        ];
        assert_eq!(average_duration(&sample), 10);
    }

    #[test]
    fn falls_back_to_audit_timestamps() {
        let sample = vec![completed(None, None, 20), completed(Some(5), Some(5), 30)];
        // zero-length stamps are rejected, so the second one uses 30
        assert_eq!(average_duration(&sample), 25);
    }

    #[test]
    fn empty_or_unusable_sample_is_zero() {
        assert_eq!(average_duration(&[]), 0);
        assert_eq!(average_duration(&[completed(None, None, 0)]), 0);
        assert_eq!(average_duration(&[completed(None, None, 500)]), 0);
    }

    #[test]
    fn average_rounds_to_nearest_minute() {
        let sample = vec![
            completed(Some(0), Some(10), 0),
            completed(Some(0), Some(11), 0),
        ];
        // 10.5 rounds away from zero
        assert_eq!(average_duration(&sample), 11);
    }

    #[test]
    fn partial_minutes_are_truncated() {
        let base = Utc.with_ymd_and_hms(2026, 10, 15, 9, 0, 0).unwrap();
        let mut short = completed(None, None, 0);
        short.consultation_started_at = Some(base);
        short.consultation_ended_at = Some(base + Duration::seconds(30));
        assert_eq!(consultation_minutes(&short), None);

        let mut longer = completed(None, None, 0);
        longer.consultation_started_at = Some(base);
        longer.consultation_ended_at = Some(base + Duration::seconds(12 * 60 + 59));
        assert_eq!(consultation_minutes(&longer), Some(12));
    }
}
