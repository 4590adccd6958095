// src/routes/medecin_routes.rs

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    routing::{get, post},
};
use serde::Deserialize;

use super::{ApiOk, appointment_routes::{AppointmentRef, StatusBody}};
use crate::{
    error::ApiError,
    models::{AppState, Appointment},
    services::{
        dashboard::{self, DashboardSnapshot},
        navigation::{self, Direction, NavigationOutcome},
        status::{self, StatusChange},
    },
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(get_dashboard))
        .route("/update-status", post(update_status))
        .route("/navigate-patient", post(navigate_patient))
        .route("/return-to-consultation", post(return_to_consultation))
}

#[derive(Debug, Deserialize)]
pub struct NavigateBody {
    pub direction: Direction,
}

pub async fn get_dashboard(
    State(state): State<AppState>,
) -> Result<Json<ApiOk<DashboardSnapshot>>, ApiError> {
    let snapshot = dashboard::snapshot(state.store.as_ref(), state.clock.as_ref()).await?;
    Ok(Json(ApiOk::new(snapshot)))
}

pub async fn update_status(
    State(state): State<AppState>,
    payload: Result<Json<StatusBody>, JsonRejection>,
) -> Result<Json<ApiOk<StatusChange>>, ApiError> {
    let Json(body) = payload?;
    let change = status::set_status(
        state.store.as_ref(),
        state.clock.as_ref(),
        body.appointment_id,
        &body.status,
    )
    .await?;
    Ok(Json(ApiOk::with_message(change, "Status updated")))
}

pub async fn navigate_patient(
    State(state): State<AppState>,
    payload: Result<Json<NavigateBody>, JsonRejection>,
) -> Result<Json<ApiOk<NavigationOutcome>>, ApiError> {
    let Json(body) = payload?;
    let outcome =
        navigation::advance(state.store.as_ref(), state.clock.as_ref(), body.direction).await?;
    let message = match &outcome {
        NavigationOutcome::Advanced(a) => format!("{} is now in consultation", a.patient_name),
        NavigationOutcome::NoneAvailable => "No patient available".to_string(),
    };
    Ok(Json(ApiOk::with_message(outcome, message)))
}

pub async fn return_to_consultation(
    State(state): State<AppState>,
    payload: Result<Json<AppointmentRef>, JsonRejection>,
) -> Result<Json<ApiOk<Appointment>>, ApiError> {
    let Json(body) = payload?;
    let appointment = navigation::return_to_consultation(
        state.store.as_ref(),
        state.clock.as_ref(),
        body.appointment_id,
    )
    .await?;
    Ok(Json(ApiOk::with_message(appointment, "Patient returned to consultation")))
}
