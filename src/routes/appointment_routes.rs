// src/routes/appointment_routes.rs

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    routing::{get, post, put},
};
use serde::Deserialize;

use super::ApiOk;
use crate::{
    error::ApiError,
    models::{AppState, Appointment},
    services::{
        booking::{self, BookingRequest},
        details::{self, DetailsRequest, PreviousVisit},
        queue::{self, MonthlyCounts, QueueView},
        status::{self, StatusChange},
    },
};

// One parameter name per path segment: the router rejects `{date}` and
// `{id}` side by side, so `/appointments/{id}` also carries the queue date.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/appointments", get(get_today_queue).post(book_appointment))
        .route("/appointments/{id}", get(get_queue_for_date))
        .route("/appointments/monthly-counts/{month}", get(get_monthly_counts))
        .route("/appointments/update-status", post(update_status))
        .route("/appointments/toggle-mutuelle", post(toggle_mutuelle))
        .route("/appointments/update-price", post(update_price))
        .route("/appointments/{id}/add-control", post(add_control))
        .route("/appointments/{id}/details", put(edit_details))
        .route("/appointments/{id}/last-info", get(get_last_info))
}

/* ============================================================
   Request bodies
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub appointment_id: i64,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct AppointmentRef {
    pub appointment_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct PriceBody {
    pub appointment_id: i64,
    pub price: f64,
    #[serde(default)]
    pub payment_method: Option<String>,
}

/* ============================================================
   Queue
   ============================================================ */

pub async fn get_today_queue(
    State(state): State<AppState>,
) -> Result<Json<ApiOk<QueueView>>, ApiError> {
    let view = queue::queue_for_date(state.store.as_ref(), state.clock.as_ref(), None).await?;
    Ok(Json(ApiOk::new(view)))
}

pub async fn get_queue_for_date(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<Json<ApiOk<QueueView>>, ApiError> {
    let view =
        queue::queue_for_date(state.store.as_ref(), state.clock.as_ref(), Some(&date)).await?;
    Ok(Json(ApiOk::new(view)))
}

pub async fn get_monthly_counts(
    State(state): State<AppState>,
    Path(month): Path<String>,
) -> Result<Json<ApiOk<MonthlyCounts>>, ApiError> {
    let counts = queue::monthly_counts(state.store.as_ref(), &month).await?;
    Ok(Json(ApiOk::new(counts)))
}

/* ============================================================
   Booking
   ============================================================ */

pub async fn book_appointment(
    State(state): State<AppState>,
    payload: Result<Json<BookingRequest>, JsonRejection>,
) -> Result<Json<ApiOk<Appointment>>, ApiError> {
    let Json(body) = payload?;
    let appointment = booking::book(state.store.as_ref(), state.clock.as_ref(), body).await?;
    Ok(Json(ApiOk::with_message(appointment, "Appointment created")))
}

pub async fn add_control(
    State(state): State<AppState>,
    Path(patient_id): Path<i64>,
) -> Result<Json<ApiOk<Appointment>>, ApiError> {
    let appointment =
        booking::add_control(state.store.as_ref(), state.clock.as_ref(), patient_id).await?;
    let message = format!(
        "Control appointment added for {}",
        appointment.appointment_date.format("%d/%m/%Y")
    );
    Ok(Json(ApiOk::with_message(appointment, message)))
}

/* ============================================================
   Status & edits
   ============================================================ */

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

pub async fn toggle_mutuelle(
    State(state): State<AppState>,
    payload: Result<Json<AppointmentRef>, JsonRejection>,
) -> Result<Json<ApiOk<Appointment>>, ApiError> {
    let Json(body) = payload?;
    let appointment =
        details::toggle_insurance(state.store.as_ref(), state.clock.as_ref(), body.appointment_id)
            .await?;
    Ok(Json(ApiOk::new(appointment)))
}

pub async fn update_price(
    State(state): State<AppState>,
    payload: Result<Json<PriceBody>, JsonRejection>,
) -> Result<Json<ApiOk<Appointment>>, ApiError> {
    let Json(body) = payload?;
    let appointment = details::update_price(
        state.store.as_ref(),
        state.clock.as_ref(),
        body.appointment_id,
        body.price,
        body.payment_method.as_deref(),
    )
    .await?;
    Ok(Json(ApiOk::with_message(appointment, "Price updated")))
}

pub async fn edit_details(
    State(state): State<AppState>,
    Path(appointment_id): Path<i64>,
    payload: Result<Json<DetailsRequest>, JsonRejection>,
) -> Result<Json<ApiOk<()>>, ApiError> {
    let Json(body) = payload?;
    details::edit_details(state.store.as_ref(), state.clock.as_ref(), appointment_id, body)
        .await?;
    Ok(Json(ApiOk::with_message((), "Appointment details updated")))
}

pub async fn get_last_info(
    State(state): State<AppState>,
    Path(appointment_id): Path<i64>,
) -> Result<Json<ApiOk<PreviousVisit>>, ApiError> {
    let visit = details::last_info(state.store.as_ref(), appointment_id).await?;
    Ok(Json(ApiOk::new(visit)))
}
