// src/routes/certificate_routes.rs

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    routing::{get, post},
};

use super::ApiOk;
use crate::{
    error::ApiError,
    models::{AppState, Certificate},
    services::certificates::{self, CertificateRequest},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/certificates", post(create_certificate))
        .route("/patients/{patient_id}/certificates", get(list_certificates))
}

pub async fn create_certificate(
    State(state): State<AppState>,
    payload: Result<Json<CertificateRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiOk<Certificate>>), ApiError> {
    let Json(body) = payload?;
    let certificate =
        certificates::create_certificate(state.store.as_ref(), state.clock.as_ref(), body).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiOk::with_message(certificate, "Certificate created")),
    ))
}

pub async fn list_certificates(
    State(state): State<AppState>,
    Path(patient_id): Path<i64>,
) -> Result<Json<ApiOk<Vec<Certificate>>>, ApiError> {
    let rows = certificates::certificates_for_patient(state.store.as_ref(), patient_id).await?;
    Ok(Json(ApiOk::new(rows)))
}
