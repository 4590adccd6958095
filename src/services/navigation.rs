// src/services/navigation.rs

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{
    ClinicError,
    status::{enter_from, try_enter_consultation},
};
use crate::{
    clock::Clock,
    models::{Appointment, AppointmentStatus},
    store::AppointmentStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Next,
    Previous,
}

/// An empty queue is a normal answer, not an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "appointment", rename_all = "snake_case")]
pub enum NavigationOutcome {
    Advanced(Appointment),
    NoneAvailable,
}

/// Oldest-created Waiting, else oldest-created Preparing.
pub fn next_candidate(today: &[Appointment]) -> Option<&Appointment> {
    let oldest = |status: AppointmentStatus| {
        today
            .iter()
            .filter(|a| a.status == status)
            .min_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
    };
    oldest(AppointmentStatus::Waiting).or_else(|| oldest(AppointmentStatus::Preparing))
}

/// Most recently updated Completed appointment.
pub fn previous_candidate(today: &[Appointment]) -> Option<&Appointment> {
    today
        .iter()
        .filter(|a| a.status == AppointmentStatus::Completed)
        .max_by(|a, b| a.updated_at.cmp(&b.updated_at).then(a.id.cmp(&b.id)))
}

/// Reads of today's queue before a candidate changes under us.
const NAVIGATION_ATTEMPTS: usize = 3;

/// Pulls the next (or last completed) patient of today into consultation.
/// The current Consulting appointment is left untouched, so advancing while
/// one is open is refused by the consultation guard. A candidate that left
/// its source status before the lock was taken is skipped and the queue is
/// read again.
pub async fn advance<S>(
    store: &S,
    clock: &dyn Clock,
    direction: Direction,
) -> Result<NavigationOutcome, ClinicError>
where
    S: AppointmentStore + ?Sized,
{
    let from: &[AppointmentStatus] = match direction {
        Direction::Next => &[AppointmentStatus::Waiting, AppointmentStatus::Preparing],
        Direction::Previous => &[AppointmentStatus::Completed],
    };

    for _ in 0..NAVIGATION_ATTEMPTS {
        let today = store.appointments_on(clock.today()).await?;
        let candidate = match direction {
            Direction::Next => next_candidate(&today),
            Direction::Previous => previous_candidate(&today),
        };

        let Some(candidate) = candidate else {
            info!(?direction, "no appointment available for navigation");
            return Ok(NavigationOutcome::NoneAvailable);
        };

        if let Some(appointment) = enter_from(store, clock, candidate.id, from).await? {
            return Ok(NavigationOutcome::Advanced(appointment));
        }
    }

    warn!(?direction, "queue kept changing, giving up navigation");
    Ok(NavigationOutcome::NoneAvailable)
}

/// Reopens a specific appointment. An existing start time is kept.
pub async fn return_to_consultation<S>(
    store: &S,
    clock: &dyn Clock,
    appointment_id: i64,
) -> Result<Appointment, ClinicError>
where
    S: AppointmentStore + ?Sized,
{
    try_enter_consultation(store, clock, appointment_id).await
}
