#[cfg(feature = "cli")]
pub mod cli;
pub mod toml_config;

use crate::core::endpoints::UpstreamEndpoints;
use crate::utils::error::{AppError, Result};
use crate::utils::validation::{
    validate_email, validate_non_empty_string, validate_range, validate_url, Validate,
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Placeholder the debt probe template substitutes with the matrix id.
pub const PARTIDA_PLACEHOLDER: &str = "{partida}";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub transport: TransportConfig,
    pub probe: ProbeConfig,
    pub email: EmailConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|e| AppError::InvalidConfigValueError {
                field: "server.host".to_string(),
                value: self.host.clone(),
                reason: format!("must be an IPv4 or IPv6 address: {}", e),
            })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Cadastral parcel lookup, queried with `lng`/`lat` (and `ph` for sub-units).
    pub cadastre_url: String,
    /// Debt statement endpoint; `{partida}` is replaced with the matrix id.
    pub debt_url_template: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            cadastre_url: "https://epok.buenosaires.gob.ar/catastro/parcela/".to_string(),
            debt_url_template: "https://lb.agip.gob.ar/ConsultaABL/comprobante/ESTADO-DEUDA-ABL-734456.pdf?boletasSeleccionadas=&identificadorPDF={partida}&dvPDF=4&fechaInicioPDF=".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    #[default]
    Http,
    Browser,
}

impl std::str::FromStr for TransportKind {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(TransportKind::Http),
            "browser" | "rendered" => Ok(TransportKind::Browser),
            other => Err(AppError::InvalidConfigValueError {
                field: "transport.kind".to_string(),
                value: other.to_string(),
                reason: "expected 'http' or 'browser'".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub kind: TransportKind,
    pub max_attempts: u32,
    pub attempt_timeout_secs: u64,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// End-to-end budget for one resolve or verify call; `None` disables it.
    pub request_deadline_secs: Option<u64>,
    pub user_agent: String,
    pub browser: BrowserSettings,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::Http,
            max_attempts: 3,
            attempt_timeout_secs: 15,
            initial_backoff_ms: 500,
            max_backoff_ms: 4_000,
            request_deadline_secs: Some(45),
            user_agent: concat!("partida-service/", env!("CARGO_PKG_VERSION")).to_string(),
            browser: BrowserSettings::default(),
        }
    }
}

impl TransportConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn request_deadline(&self) -> Option<Duration> {
        self.request_deadline_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub executable: Option<String>,
    pub no_sandbox: bool,
    /// Sub-resources never loaded while rendering an upstream page.
    pub blocked_url_patterns: Vec<String>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            executable: None,
            no_sandbox: true,
            blocked_url_patterns: [
                "*.png",
                "*.jpg",
                "*.jpeg",
                "*.gif",
                "*.svg",
                "*.ico",
                "*.css",
                "*.woff",
                "*.woff2",
                "*.ttf",
                "*google-analytics.com*",
                "*googletagmanager.com*",
            ]
            .iter()
            .map(|pattern| pattern.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Status the debt service reserves for an unknown partida.
    pub not_found_status: u16,
    /// JSON key the debt service embeds its own status code under.
    pub embedded_status_field: String,
    /// Case-insensitive fragments meaning the partida was deactivated.
    pub not_found_markers: Vec<String>,
    /// When no rule matches a successful probe, report `Exists` (true)
    /// or `Indeterminate` (false).
    pub assume_exists_on_unrecognized: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            not_found_status: 402,
            embedded_status_field: "statusCode".to_string(),
            not_found_markers: vec![
                "partida inexistente".to_string(),
                "partida dada de baja".to_string(),
            ],
            assume_exists_on_unrecognized: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub api_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub sender_name: String,
    pub sender_email: String,
    /// Operations mailbox blind-copied on every message.
    pub bcc: Option<String>,
    pub subject: String,
    pub timeout_secs: u64,
    pub logo_url: String,
    pub follow_up_url: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.brevo.com/v3/smtp/email".to_string(),
            api_key: None,
            sender_name: "PROPROP".to_string(),
            sender_email: "info@proprop.com.ar".to_string(),
            bcc: Some("info@proprop.com.ar".to_string()),
            subject: "Consulta de ABL".to_string(),
            timeout_secs: 15,
            logo_url: "https://proprop.com.ar/wp-content/uploads/2024/06/Logo-email.jpg"
                .to_string(),
            follow_up_url: "https://lb.agip.gob.ar/ConsultaABL/".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// `EnvFilter` directives; `RUST_LOG` still wins when set.
    pub filter: Option<String>,
}

impl AppConfig {
    /// Defaults, then the optional TOML file, then `.env` / process
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("APP_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("APP_PORT") {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|_| AppError::InvalidConfigValueError {
                    field: "APP_PORT".to_string(),
                    value: port.clone(),
                    reason: "must be a valid u16".to_string(),
                })?;
        }
        if let Some(kind) = lookup("PARTIDA_TRANSPORT") {
            self.transport.kind = kind.parse()?;
        }
        if let Some(executable) = lookup("CHROME_EXECUTABLE") {
            self.transport.browser.executable = Some(executable);
        }
        if let Some(api_key) = lookup("BREVO_API_KEY") {
            self.email.api_key = Some(api_key);
        }
        if let Some(sender) = lookup("BREVO_SENDER_EMAIL") {
            self.email.sender_email = sender;
        }
        if let Some(bcc) = lookup("BREVO_BCC") {
            self.email.bcc = Some(bcc).filter(|value| !value.trim().is_empty());
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            self.logging.format = match format.trim().to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                _ => LogFormat::Compact,
            };
        }
        Ok(())
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        validate_non_empty_string("server.host", &self.server.host)?;
        self.server.socket_addr()?;

        validate_url("upstream.cadastre_url", &self.upstream.cadastre_url)?;
        UpstreamEndpoints::from_config(&self.upstream)?;

        validate_range("transport.max_attempts", self.transport.max_attempts, 1, 5)?;
        validate_range(
            "transport.attempt_timeout_secs",
            self.transport.attempt_timeout_secs,
            1,
            60,
        )?;
        if self.transport.initial_backoff_ms > self.transport.max_backoff_ms {
            return Err(AppError::InvalidConfigValueError {
                field: "transport.initial_backoff_ms".to_string(),
                value: self.transport.initial_backoff_ms.to_string(),
                reason: "cannot exceed transport.max_backoff_ms".to_string(),
            });
        }
        if let Some(deadline) = self.transport.request_deadline_secs {
            validate_range("transport.request_deadline_secs", deadline, 1, 600)?;
        }

        validate_range("probe.not_found_status", self.probe.not_found_status, 100, 599)?;
        validate_non_empty_string("probe.embedded_status_field", &self.probe.embedded_status_field)?;

        validate_url("email.api_url", &self.email.api_url)?;
        validate_email("email.sender_email", &self.email.sender_email)?;
        if let Some(bcc) = &self.email.bcc {
            validate_email("email.bcc", bcc)?;
        }
        validate_non_empty_string("email.subject", &self.email.subject)?;

        Ok(())
    }
}
