use crate::config::AppConfig;
use crate::utils::error::{AppError, Result};
use regex::{Captures, Regex};
use std::path::Path;

impl AppConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(AppError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = substitute_env_vars(content, |name| std::env::var(name).ok())?;

        toml::from_str(&processed_content).map_err(|e| AppError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }
}

/// Replaces `${VAR}` references; unknown variables are left untouched.
pub fn substitute_env_vars<F>(content: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| AppError::ConfigError {
        message: format!("invalid substitution pattern: {}", e),
    })?;

    let result = re.replace_all(content, |caps: &Captures| {
        let var_name = &caps[1];
        lookup(var_name).unwrap_or_else(|| format!("${{{}}}", var_name))
    });

    Ok(result.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportKind;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_substitute_env_vars() {
        let lookup = |name: &str| (name == "BREVO_KEY").then(|| "secret".to_string());
        let result = substitute_env_vars("api_key = \"${BREVO_KEY}\"\nx = \"${MISSING}\"", lookup)
            .unwrap();
        assert_eq!(result, "api_key = \"secret\"\nx = \"${MISSING}\"");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
[server]
port = 8081

[transport]
kind = "browser"
max_attempts = 5

[probe]
assume_exists_on_unrecognized = false
not_found_markers = ["dada de baja"]
"#,
        )
        .unwrap();

        assert_eq!(config.server.port, 8081);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.transport.kind, TransportKind::Browser);
        assert_eq!(config.transport.max_attempts, 5);
        assert_eq!(config.transport.attempt_timeout_secs, 15);
        assert!(!config.probe.assume_exists_on_unrecognized);
        assert_eq!(config.probe.not_found_markers, vec!["dada de baja".to_string()]);
        assert_eq!(config.probe.not_found_status, 402);
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[upstream]\ncadastre_url = \"http://127.0.0.1:9000/catastro/parcela/\""
        )
        .unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(
            config.upstream.cadastre_url,
            "http://127.0.0.1:9000/catastro/parcela/"
        );
    }

    #[test]
    fn test_invalid_toml_is_a_config_error() {
        let result = AppConfig::from_toml_str("[server\nport = 1");
        assert!(matches!(result, Err(AppError::ConfigError { .. })));
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        let result = AppConfig::from_file("/definitely/not/here/partida.toml");
        assert!(matches!(result, Err(AppError::IoError(_))));
    }
}
