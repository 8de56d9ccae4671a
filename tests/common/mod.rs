#![allow(dead_code)]

use httpmock::MockServer;
use partida_service::config::AppConfig;
use std::io::Write;
use tempfile::NamedTempFile;

pub const LAT: &str = "-34.6037";
pub const LNG: &str = "-58.3816";
pub const CADASTRE_PATH: &str = "/catastro/parcela/";
pub const DEBT_PATH: &str = "/ConsultaABL/comprobante/deuda.pdf";
pub const BREVO_PATH: &str = "/v3/smtp/email";

/// Writes a TOML config pointing every upstream at `server` and loads it
/// the same way the binary does.
pub fn config_for(server: &MockServer) -> AppConfig {
    let toml = format!(
        r#"
[upstream]
cadastre_url = "{cadastre}"
debt_url_template = "{debt}?identificadorPDF={{partida}}&dvPDF=4"

[transport]
kind = "http"
max_attempts = 3
attempt_timeout_secs = 5
initial_backoff_ms = 10
max_backoff_ms = 40
request_deadline_secs = 30

[email]
api_url = "{brevo}"
api_key = "xkeysib-test"
bcc = "info@proprop.com.ar"
"#,
        cadastre = server.url(CADASTRE_PATH),
        debt = server.url(DEBT_PATH),
        brevo = server.url(BREVO_PATH),
    );

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(toml.as_bytes()).unwrap();
    AppConfig::from_file(file.path()).unwrap()
}
