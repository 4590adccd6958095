use axum::Router;
use serde::Serialize;

use crate::models::AppState;

pub mod appointment_routes;
pub mod certificate_routes;
pub mod health_routes;
pub mod medecin_routes;
pub mod statistics_routes;

/// Success side of the `{success, data, message}` envelope.
#[derive(Debug, Serialize)]
pub struct ApiOk<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiOk<T> {
    pub fn new(data: T) -> Self {
        ApiOk {
            success: true,
            data,
            message: None,
        }
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        ApiOk {
            success: true,
            data,
            message: Some(message.into()),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api", appointment_routes::router())
        .nest("/api/medecin", medecin_routes::router())
        .nest("/api/statistics", statistics_routes::router())
        .nest("/api", certificate_routes::router())
        .merge(health_routes::router())
        .with_state(state)
}
