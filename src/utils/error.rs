use crate::domain::model::ResolutionResult;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Failure of a single upstream fetch after the retry policy gave up.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("fetch of {url} failed after {attempts} attempt(s): {kind}")]
pub struct TransportError {
    pub url: String,
    pub attempts: u32,
    pub kind: TransportErrorKind,
}

impl TransportError {
    pub fn new(url: impl Into<String>, attempts: u32, kind: TransportErrorKind) -> Self {
        Self {
            url: url.into(),
            attempts,
            kind,
        }
    }

    pub fn is_deadline(&self) -> bool {
        self.kind == TransportErrorKind::DeadlineExceeded
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportErrorKind {
    #[error("attempt timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("upstream answered with status {0}")]
    Status(u16),

    #[error("reading the response body failed: {0}")]
    Body(String),

    #[error("page rendering failed: {0}")]
    Render(String),

    #[error("request deadline exceeded")]
    DeadlineExceeded,

    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

impl TransportErrorKind {
    /// 4xx statuses are domain answers and are never retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportErrorKind::Timeout
            | TransportErrorKind::Connect(_)
            | TransportErrorKind::Body(_)
            | TransportErrorKind::Render(_) => true,
            TransportErrorKind::Status(status) => *status >= 500,
            TransportErrorKind::DeadlineExceeded | TransportErrorKind::InvalidUrl(_) => false,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("cadastral service returned an empty or malformed response")]
    EmptyResponse,

    #[error("cadastral record carries neither a matrix parcel id nor sub-units")]
    NoData,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("cadastral service returned an empty or malformed response")]
    EmptyResponse,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("debt probe for partida {matrix_parcel_id} failed: {source}")]
    Probe {
        matrix_parcel_id: String,
        #[source]
        source: TransportError,
    },

    #[error("debt probe for partida {matrix_parcel_id} answered with unclassified status {status}")]
    UnclassifiedProbe { matrix_parcel_id: String, status: u16 },
}

impl VerificationError {
    fn transport(&self) -> Option<&TransportError> {
        match self {
            VerificationError::Transport(err) | VerificationError::Probe { source: err, .. } => {
                Some(err)
            }
            _ => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotificationError {
    #[error("email provider credentials are not configured")]
    MissingCredentials,

    #[error("email provider rejected the message with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("email delivery failed: {0}")]
    Delivery(String),
}

/// Outcome of the resolve-and-notify sequence when it does not complete.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("partida resolved but notification failed: {source}")]
    Notification {
        resolved: ResolutionResult,
        #[source]
        source: NotificationError,
    },
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid configuration value for {field} ({value}): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error("Server error: {message}")]
    ServerError { message: String },
}

impl From<ResolutionError> for AppError {
    fn from(value: ResolutionError) -> Self {
        AppError::Workflow(WorkflowError::Resolution(value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Request,
    /// Upstream reachable but the parcel could not be resolved.
    NotFound,
    /// Upstream unreachable, timed out or answered with an unusable status.
    Upstream,
    Notification,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AppError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            AppError::ConfigError { .. }
            | AppError::MissingConfigError { .. }
            | AppError::InvalidConfigValueError { .. } => ErrorCategory::Configuration,
            AppError::InvalidRequest { .. } => ErrorCategory::Request,
            AppError::Workflow(WorkflowError::Resolution(ResolutionError::Transport(_))) => {
                ErrorCategory::Upstream
            }
            AppError::Workflow(WorkflowError::Resolution(_)) => ErrorCategory::NotFound,
            AppError::Workflow(WorkflowError::Notification { .. }) => ErrorCategory::Notification,
            AppError::Verification(VerificationError::EmptyResponse) => ErrorCategory::NotFound,
            AppError::Verification(_) => ErrorCategory::Upstream,
            AppError::IoError(_) | AppError::ServerError { .. } => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Request | ErrorCategory::NotFound => ErrorSeverity::Low,
            ErrorCategory::Upstream | ErrorCategory::Notification => ErrorSeverity::Medium,
            ErrorCategory::Configuration => ErrorSeverity::High,
            ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    fn deadline_exceeded(&self) -> bool {
        match self {
            AppError::Workflow(WorkflowError::Resolution(ResolutionError::Transport(err))) => {
                err.is_deadline()
            }
            AppError::Verification(err) => err.transport().is_some_and(TransportError::is_deadline),
            _ => false,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        if self.deadline_exceeded() {
            return StatusCode::GATEWAY_TIMEOUT;
        }
        match self.category() {
            ErrorCategory::Request => StatusCode::BAD_REQUEST,
            ErrorCategory::NotFound => StatusCode::NOT_FOUND,
            ErrorCategory::Upstream | ErrorCategory::Notification => StatusCode::BAD_GATEWAY,
            ErrorCategory::Configuration | ErrorCategory::System => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message shown to the person who made the request.
    pub fn user_friendly_message(&self) -> String {
        match self {
            AppError::InvalidRequest { message } => format!("Solicitud inválida: {}", message),
            AppError::Workflow(WorkflowError::Resolution(ResolutionError::Transport(_))) => {
                "Error procesando la solicitud".to_string()
            }
            AppError::Workflow(WorkflowError::Resolution(_)) => {
                "No se pudo obtener el número de partida matriz o datos de propiedad horizontal."
                    .to_string()
            }
            AppError::Workflow(WorkflowError::Notification { .. }) => {
                "Se obtuvo la partida pero no se pudo enviar el email".to_string()
            }
            AppError::Verification(_) => {
                "Error verificando la existencia de la partida".to_string()
            }
            AppError::ConfigError { .. }
            | AppError::MissingConfigError { .. }
            | AppError::InvalidConfigValueError { .. } => {
                format!("Configuración inválida: {}", self)
            }
            AppError::IoError(_) | AppError::ServerError { .. } => {
                "Error interno del servicio".to_string()
            }
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Configuration => {
                "Check the TOML file and the environment overrides, then restart the service"
            }
            ErrorCategory::Request => "Send numeric lat/lng values and a valid email address",
            ErrorCategory::NotFound => {
                "Confirm the coordinates fall inside a registered parcel of the city"
            }
            ErrorCategory::Upstream => {
                "The cadastral or debt service is unreachable; retry later or switch transport.kind"
            }
            ErrorCategory::Notification => {
                "Verify BREVO_API_KEY and the sender address registered with the provider"
            }
            ErrorCategory::System => "Inspect the service logs for the underlying failure",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut body = json!({ "error": self.user_friendly_message() });

        if let AppError::Workflow(WorkflowError::Notification { resolved, .. }) = &self {
            body["pdamatriz"] = json!(resolved);
        }

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
