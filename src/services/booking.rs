// src/services/booking.rs

use chrono::{Datelike, Days, Months, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::Deserialize;
use tracing::info;

use super::{ClinicError, Validator};
use crate::{
    clock::Clock,
    models::{Appointment, AppointmentType, NewAppointment, Patient},
    store::{AppointmentStore, RecordStore},
};

pub const CONSULTATION_PRICE_CENTS: i64 = 30_000;
pub const UNINSURED_PRICE_CENTS: i64 = 25_000;
pub const INSURED_PRICE_CENTS: i64 = 5_000;
pub const NOTES_MAX_LEN: usize = 1000;

#[derive(Debug, Clone, Deserialize)]
pub struct BookingRequest {
    pub patient_id: i64,
    #[serde(rename = "type")]
    pub appointment_type: String,
    pub appointment_date: String,
    pub notes: Option<String>,
}

/// Date-only bookings land at noon.
fn default_time() -> NaiveTime {
    NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN)
}

pub fn parse_booking_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(default_time()))
        })
}

/// Returns `(payment_cents, has_insurance_coverage)` for a new booking.
pub fn price_for(kind: AppointmentType, patient: &Patient) -> (i64, bool) {
    if kind == AppointmentType::Control {
        return (0, false);
    }
    let plan = patient
        .insurance
        .as_deref()
        .map(|p| p.trim().to_uppercase())
        .unwrap_or_default();
    match plan.as_str() {
        "ONE" => (INSURED_PRICE_CENTS, true),
        "AUCUN" => (UNINSURED_PRICE_CENTS, false),
        _ => (CONSULTATION_PRICE_CENTS, false),
    }
}

/// Follow-up date: three months ahead minus ten days, never on a Sunday.
pub fn control_date(today: NaiveDate) -> NaiveDate {
    let date = today
        .checked_add_months(Months::new(3))
        .and_then(|d| d.checked_sub_days(Days::new(10)))
        .unwrap_or(today);
    if date.weekday() == Weekday::Sun {
        date.succ_opt().unwrap_or(date)
    } else {
        date
    }
}

pub async fn book<S>(
    store: &S,
    clock: &dyn Clock,
    request: BookingRequest,
) -> Result<Appointment, ClinicError>
where
    S: AppointmentStore + RecordStore + ?Sized,
{
    let mut v = Validator::default();
    let kind = AppointmentType::parse(&request.appointment_type);
    if kind.is_none() {
        v.reject("type", "type must be Consultation or Control");
    }
    let date = parse_booking_date(&request.appointment_date);
    match date {
        None => v.reject("appointment_date", "appointment_date is not a valid date"),
        Some(d) if d.date() < clock.today() => {
            v.reject("appointment_date", "appointment_date must be today or later")
        }
        Some(_) => {}
    }
    v.max_len("notes", request.notes.as_deref(), NOTES_MAX_LEN);
    v.finish()?;

    let (Some(kind), Some(appointment_date)) = (kind, date) else {
        return Err(ClinicError::invalid("appointment_date", "invalid booking"));
    };

    let patient = store
        .find_patient(request.patient_id)
        .await?
        .filter(|p| !p.archived)
        .ok_or_else(|| {
            ClinicError::NotFound(format!("patient {} not found or archived", request.patient_id))
        })?;

    let (payment_cents, has_insurance_coverage) = price_for(kind, &patient);
    let appointment = store
        .insert_appointment(
            &NewAppointment {
                patient_id: patient.id,
                appointment_date,
                appointment_type: kind,
                notes: request.notes.filter(|n| !n.trim().is_empty()),
                payment_cents,
                has_insurance_coverage,
            },
            clock.now(),
        )
        .await?;

    info!(
        appointment_id = appointment.id,
        patient_id = patient.id,
        kind = kind.as_str(),
        "appointment booked"
    );
    Ok(appointment)
}

pub async fn add_control<S>(
    store: &S,
    clock: &dyn Clock,
    patient_id: i64,
) -> Result<Appointment, ClinicError>
where
    S: AppointmentStore + RecordStore + ?Sized,
{
    let patient = store
        .find_patient(patient_id)
        .await?
        .ok_or_else(|| ClinicError::not_found("patient", patient_id))?;

    let date = control_date(clock.today());
    let appointment = store
        .insert_appointment(
            &NewAppointment {
                patient_id: patient.id,
                appointment_date: date.and_time(default_time()),
                appointment_type: AppointmentType::Control,
                notes: None,
                payment_cents: 0,
                has_insurance_coverage: false,
            },
            clock.now(),
        )
        .await?;

    info!(appointment_id = appointment.id, patient_id, %date, "control appointment added");
    Ok(appointment)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patient(plan: Option<&str>) -> Patient {
        Patient {
            id: 1,
            first_name: "Amina".into(),
            last_name: "Benali".into(),
            birth_date: None,
            insurance: plan.map(str::to_string),
            archived: false,
        }
    }

    #[test]
    fn pricing_by_plan() {
        let c = AppointmentType::Consultation;
        assert_eq!(price_for(c, &patient(Some("one"))), (5_000, true));
        assert_eq!(price_for(c, &patient(Some("AUCUN"))), (25_000, false));
        assert_eq!(price_for(c, &patient(Some("CNSS"))), (30_000, false));
        assert_eq!(price_for(c, &patient(None)), (30_000, false));
        assert_eq!(price_for(AppointmentType::Control, &patient(Some("ONE"))), (0, false));
    }

    #[test]
    fn control_date_skips_sunday() {
        // 2026-10-15 + 3 months = 2027-01-15, minus 10 days = 2027-01-05 (Tuesday)
        let d = NaiveDate::from_ymd_opt(2026, 10, 15).unwrap();
        assert_eq!(control_date(d), NaiveDate::from_ymd_opt(2027, 1, 5).unwrap());

        // 2026-10-13 + 3 months - 10 days = 2027-01-03, a Sunday
        let d = NaiveDate::from_ymd_opt(2026, 10, 13).unwrap();
        assert_eq!(control_date(d), NaiveDate::from_ymd_opt(2027, 1, 4).unwrap());
    }

    #[test]
    fn date_only_bookings_are_at_noon() {
        let parsed = parse_booking_date("2026-10-20").unwrap();
        assert_eq!(parsed.time(), NaiveTime::from_hms_opt(12, 0, 0).unwrap());
        assert_eq!(
            parse_booking_date("2026-10-20T09:30").unwrap().time(),
            NaiveTime::from_hms_opt(9, 30, 0).unwrap()
        );
        assert!(parse_booking_date("20/10/2026").is_none());
    }
}
