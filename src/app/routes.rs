use crate::app::DynEngine;
use crate::domain::model::{deserialize_numeric, Coordinate, ExistenceResult, SubUnit};
use crate::utils::error::AppError;
use crate::utils::validation::is_valid_email;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

pub const MSG_EMAIL_SENT: &str = "Email enviado con éxito";
pub const MSG_EXISTS: &str = "La partida existe";
pub const MSG_DOES_NOT_EXIST: &str = "La partida no existe";
pub const MSG_INDETERMINATE: &str = "No se pudo determinar si la partida existe";

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<DynEngine>,
}

#[derive(Debug, Deserialize)]
pub struct FetchAblRequest {
    #[serde(deserialize_with = "deserialize_numeric")]
    pub lat: f64,
    #[serde(deserialize_with = "deserialize_numeric")]
    pub lng: f64,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct VerificationResponse {
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdamatriz: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phs: Option<Vec<SubUnit>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<ExistenceResult> for VerificationResponse {
    fn from(result: ExistenceResult) -> Self {
        match result {
            ExistenceResult::Exists {
                matrix_parcel_id,
                sub_units,
            } => Self {
                message: MSG_EXISTS,
                pdamatriz: matrix_parcel_id,
                phs: sub_units,
                reason: None,
            },
            ExistenceResult::DoesNotExist => Self {
                message: MSG_DOES_NOT_EXIST,
                pdamatriz: None,
                phs: None,
                reason: None,
            },
            ExistenceResult::Indeterminate { reason } => Self {
                message: MSG_INDETERMINATE,
                pdamatriz: None,
                phs: None,
                reason: Some(reason),
            },
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(healthcheck))
        .route("/fetch-abl-data", post(fetch_abl_data))
        .route("/verification", post(verification))
        .with_state(state)
}

async fn healthcheck() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

fn invalid_body(rejection: JsonRejection) -> AppError {
    AppError::InvalidRequest {
        message: rejection.body_text(),
    }
}

fn log_failure(route: &str, err: &AppError) {
    tracing::error!(
        "{} failed: {} (category: {:?}, severity: {:?})",
        route,
        err,
        err.category(),
        err.severity()
    );
    tracing::debug!("Recovery suggestion: {}", err.recovery_suggestion());
}

async fn fetch_abl_data(
    State(state): State<AppState>,
    payload: Result<Json<FetchAblRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(request) = payload.map_err(invalid_body)?;

    // The recipient is checked before any upstream call.
    let email = request
        .email
        .as_deref()
        .map(str::trim)
        .filter(|email| is_valid_email(email))
        .ok_or_else(|| AppError::InvalidRequest {
            message: "se requiere un email válido".to_string(),
        })?;

    let coord = Coordinate::new(request.lat, request.lng);
    match state.engine.resolve_and_notify(coord, email).await {
        Ok(resolved) => Ok(Json(json!({
            "message": MSG_EMAIL_SENT,
            "pdamatriz": resolved,
        }))),
        Err(err) => {
            let err = AppError::from(err);
            log_failure("/fetch-abl-data", &err);
            Err(err)
        }
    }
}

async fn verification(
    State(state): State<AppState>,
    payload: Result<Json<Coordinate>, JsonRejection>,
) -> Result<Json<VerificationResponse>, AppError> {
    let Json(coord) = payload.map_err(invalid_body)?;

    match state.engine.verify(coord).await {
        Ok(result) => Ok(Json(result.into())),
        Err(err) => {
            let err = AppError::from(err);
            log_failure("/verification", &err);
            Err(err)
        }
    }
}
