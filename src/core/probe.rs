//! Classification of the debt-probe answer.
//!
//! The debt service reports the same two outcomes in several shapes: a PDF
//! statement, a JSON error envelope carrying its own status code, an HTML
//! page embedding an error text, or a bare HTTP status. Each shape is one
//! [`ProbeRule`]; [`ProbePolicy`] evaluates them in order and the first rule
//! with an opinion wins.

use crate::config::ProbeConfig;
use crate::domain::model::RawResponse;
use crate::utils::error::{AppError, Result};
use regex::Regex;
use std::fmt;

/// Normalized view of a probe response that rules evaluate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub status: u16,
    pub content_type: Option<String>,
    pub body_text: String,
}

impl ProbeOutcome {
    pub fn new(status: u16, content_type: Option<&str>, body_text: impl Into<String>) -> Self {
        Self {
            status,
            content_type: content_type.map(str::to_string),
            body_text: body_text.into(),
        }
    }

    /// Media type without parameters, lowercased.
    pub fn media_type(&self) -> Option<String> {
        self.content_type
            .as_deref()
            .and_then(|value| value.split(';').next())
            .map(|media| media.trim().to_ascii_lowercase())
            .filter(|media| !media.is_empty())
    }
}

impl From<&RawResponse> for ProbeOutcome {
    fn from(response: &RawResponse) -> Self {
        Self {
            status: response.status,
            content_type: response.content_type.clone(),
            body_text: response.text(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeVerdict {
    Exists,
    DoesNotExist,
    /// The probe failed in a way no rule explains.
    Failed { status: u16 },
    /// No rule had an opinion and the policy does not assume existence.
    Unrecognized { reason: String },
}

/// Verdict plus the rule that produced it, for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub verdict: ProbeVerdict,
    pub rule: &'static str,
}

pub trait ProbeRule: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn classify(&self, outcome: &ProbeOutcome) -> Option<ProbeVerdict>;
}

/// A PDF statement is only issued for an active partida.
#[derive(Debug, Default)]
pub struct PdfDocumentRule;

impl ProbeRule for PdfDocumentRule {
    fn name(&self) -> &'static str {
        "pdf_document"
    }

    fn classify(&self, outcome: &ProbeOutcome) -> Option<ProbeVerdict> {
        let declared_pdf = outcome.media_type().as_deref() == Some("application/pdf");
        let pdf_magic = outcome.body_text.starts_with("%PDF-");
        (declared_pdf || pdf_magic).then_some(ProbeVerdict::Exists)
    }
}

/// JSON error envelopes embed the upstream status, e.g. `"statusCode":402`,
/// sometimes inside an HTML or rendered page.
#[derive(Debug)]
pub struct EmbeddedStatusRule {
    pattern: Regex,
}

impl EmbeddedStatusRule {
    pub fn new(field: &str, status: u16) -> Result<Self> {
        let pattern = format!(r#""{}"\s*:\s*"?{}\b"#, regex::escape(field), status);
        let pattern = Regex::new(&pattern).map_err(|e| AppError::ConfigError {
            message: format!("invalid embedded status pattern: {}", e),
        })?;
        Ok(Self { pattern })
    }
}

impl ProbeRule for EmbeddedStatusRule {
    fn name(&self) -> &'static str {
        "embedded_status"
    }

    fn classify(&self, outcome: &ProbeOutcome) -> Option<ProbeVerdict> {
        self.pattern
            .is_match(&outcome.body_text)
            .then_some(ProbeVerdict::DoesNotExist)
    }
}

#[derive(Debug)]
pub struct ErrorTextRule {
    markers: Vec<String>,
}

impl ErrorTextRule {
    pub fn new(markers: &[String]) -> Self {
        Self {
            markers: markers
                .iter()
                .map(|marker| marker.trim().to_lowercase())
                .filter(|marker| !marker.is_empty())
                .collect(),
        }
    }
}

impl ProbeRule for ErrorTextRule {
    fn name(&self) -> &'static str {
        "error_text"
    }

    fn classify(&self, outcome: &ProbeOutcome) -> Option<ProbeVerdict> {
        if self.markers.is_empty() {
            return None;
        }
        let body = outcome.body_text.to_lowercase();
        self.markers
            .iter()
            .any(|marker| body.contains(marker.as_str()))
            .then_some(ProbeVerdict::DoesNotExist)
    }
}

#[derive(Debug)]
pub struct HttpStatusRule {
    status: u16,
}

impl HttpStatusRule {
    pub fn new(status: u16) -> Self {
        Self { status }
    }
}

impl ProbeRule for HttpStatusRule {
    fn name(&self) -> &'static str {
        "http_status"
    }

    fn classify(&self, outcome: &ProbeOutcome) -> Option<ProbeVerdict> {
        (outcome.status == self.status).then_some(ProbeVerdict::DoesNotExist)
    }
}

/// Any other error status is a failed probe, never a verdict.
#[derive(Debug, Default)]
pub struct HttpFailureRule;

impl ProbeRule for HttpFailureRule {
    fn name(&self) -> &'static str {
        "http_failure"
    }

    fn classify(&self, outcome: &ProbeOutcome) -> Option<ProbeVerdict> {
        (!(200..300).contains(&outcome.status)).then_some(ProbeVerdict::Failed {
            status: outcome.status,
        })
    }
}

#[derive(Debug)]
pub struct ProbePolicy {
    rules: Vec<Box<dyn ProbeRule>>,
    assume_exists: bool,
}

impl ProbePolicy {
    pub fn new(rules: Vec<Box<dyn ProbeRule>>, assume_exists: bool) -> Self {
        Self {
            rules,
            assume_exists,
        }
    }

    pub fn from_config(config: &ProbeConfig) -> Result<Self> {
        let rules: Vec<Box<dyn ProbeRule>> = vec![
            Box::new(PdfDocumentRule),
            Box::new(EmbeddedStatusRule::new(
                &config.embedded_status_field,
                config.not_found_status,
            )?),
            Box::new(ErrorTextRule::new(&config.not_found_markers)),
            Box::new(HttpStatusRule::new(config.not_found_status)),
            Box::new(HttpFailureRule),
        ];
        Ok(Self::new(rules, config.assume_exists_on_unrecognized))
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|rule| rule.name()).collect()
    }

    pub fn classify(&self, outcome: &ProbeOutcome) -> Classification {
        for rule in &self.rules {
            if let Some(verdict) = rule.classify(outcome) {
                return Classification {
                    verdict,
                    rule: rule.name(),
                };
            }
        }

        if self.assume_exists {
            tracing::warn!(
                "Debt probe answered {} ({}) without a recognized signal; assuming the partida exists",
                outcome.status,
                outcome.content_type.as_deref().unwrap_or("no content type")
            );
            Classification {
                verdict: ProbeVerdict::Exists,
                rule: "assume_exists",
            }
        } else {
            Classification {
                verdict: ProbeVerdict::Unrecognized {
                    reason: format!(
                        "debt probe answered {} ({}) without a recognized existence signal",
                        outcome.status,
                        outcome.content_type.as_deref().unwrap_or("no content type")
                    ),
                },
                rule: "unrecognized",
            }
        }
    }
}
