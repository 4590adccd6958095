// src/services/status.rs

use serde::Serialize;
use tracing::{info, warn};

use super::ClinicError;
use crate::{
    clock::Clock,
    models::{Appointment, AppointmentStatus, StatusStyle},
    store::{AppointmentStore, ConsultationEntry},
};

#[derive(Debug, Clone, Serialize)]
pub struct StatusChange {
    pub appointment: Appointment,
    pub status: AppointmentStatus,
    pub colors: StatusStyle,
}

pub fn parse_status(raw: &str) -> Result<AppointmentStatus, ClinicError> {
    raw.parse::<AppointmentStatus>().map_err(|_| {
        ClinicError::invalid(
            "status",
            "status must be one of scheduled, waiting, preparing, consulting, completed, canceled",
        )
    })
}

/// The only way into Consulting. The store counts today's consultations and
/// writes the new status under one lock, so two concurrent callers cannot
/// both pass the check. Start time is kept when already set.
pub async fn try_enter_consultation<S>(
    store: &S,
    clock: &dyn Clock,
    appointment_id: i64,
) -> Result<Appointment, ClinicError>
where
    S: AppointmentStore + ?Sized,
{
    // an empty source list never reports a move
    enter_from(store, clock, appointment_id, &[])
        .await?
        .ok_or_else(|| ClinicError::not_found("appointment", appointment_id))
}

/// Guarded entry that also requires the appointment to still be in one of
/// `from` when the lock is taken. `Ok(None)` means it moved elsewhere.
pub async fn enter_from<S>(
    store: &S,
    clock: &dyn Clock,
    appointment_id: i64,
    from: &[AppointmentStatus],
) -> Result<Option<Appointment>, ClinicError>
where
    S: AppointmentStore + ?Sized,
{
    let today = clock.today();
    match store
        .enter_consultation(appointment_id, today, from, clock.now())
        .await?
    {
        ConsultationEntry::Entered(appointment) => {
            info!(appointment_id, %today, "appointment entered consultation");
            Ok(Some(appointment))
        }
        ConsultationEntry::LimitReached { blocking_id } => {
            warn!(
                appointment_id,
                blocking_id, "consultation refused, another patient is in consultation"
            );
            Err(ClinicError::ConsultationLimitExceeded { blocking_id })
        }
        ConsultationEntry::Moved { status } => {
            info!(appointment_id, %status, "appointment left the expected status");
            Ok(None)
        }
        ConsultationEntry::NotFound => Err(ClinicError::not_found("appointment", appointment_id)),
    }
}

/// Direct status setter. Any status may follow any other here; only the
/// move into Consulting is guarded.
pub async fn set_status<S>(
    store: &S,
    clock: &dyn Clock,
    appointment_id: i64,
    raw_status: &str,
) -> Result<StatusChange, ClinicError>
where
    S: AppointmentStore + ?Sized,
{
    let status = parse_status(raw_status)?;

    let appointment = if status == AppointmentStatus::Consulting {
        try_enter_consultation(store, clock, appointment_id).await?
    } else {
        store
            .update_status(appointment_id, status, clock.now())
            .await?
            .ok_or_else(|| ClinicError::not_found("appointment", appointment_id))?
    };

    info!(appointment_id, %status, "appointment status updated");

    Ok(StatusChange {
        status: appointment.status,
        colors: appointment.status.style(),
        appointment,
    })
}
