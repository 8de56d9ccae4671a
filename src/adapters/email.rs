use crate::config::EmailConfig;
use crate::domain::model::{NotificationReceipt, ResolutionResult};
use crate::domain::ports::Notifier;
use crate::utils::error::{AppError, NotificationError, Result};
use crate::utils::validation::validate_email;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const FOOTER_SINGLE: &str =
    "Recibiste este correo porque consultaste tu número de partida en el servicio de consultas de ProProp.";
const FOOTER_MULTIPLE: &str =
    "Recibiste este correo porque consultaste los números de partida en el servicio de consultas de ProProp.";

/// Rendered message bodies for one resolution result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailContent {
    pub subject: String,
    pub text: String,
    pub html: String,
}

impl EmailContent {
    pub fn for_result(result: &ResolutionResult, config: &EmailConfig) -> Self {
        let (text, items_html, footer) = match result {
            ResolutionResult::Single(id) => (
                format!("Tu número de partida es:\n{}", id),
                format!(
                    "<p>Tu número de partida es:<br><b>{}</b></p>",
                    escape_html(id)
                ),
                FOOTER_SINGLE,
            ),
            ResolutionResult::Multiple(units) => {
                let lines: Vec<String> = units
                    .iter()
                    .map(|unit| {
                        format!(
                            "Partida: {}, Piso: {}, Dpto: {}",
                            unit.sub_parcel_id, unit.floor, unit.unit
                        )
                    })
                    .collect();
                let items: String = units
                    .iter()
                    .map(|unit| {
                        format!(
                            "<li>Partida: <b>{}</b>, Piso: <b>{}</b>, Dpto: <b>{}</b></li>",
                            escape_html(&unit.sub_parcel_id),
                            escape_html(&unit.floor),
                            escape_html(&unit.unit)
                        )
                    })
                    .collect();
                (
                    format!("Los números de partida son:\n{}", lines.join("\n")),
                    format!(
                        "<p>Los números de partida son:</p>\
                         <ul style=\"text-align: left; padding-left: 2rem;\">{}</ul>",
                        items
                    ),
                    FOOTER_MULTIPLE,
                )
            }
        };

        let text = format!(
            "{}\n\nPodés consultar la deuda de ABL en {}\n\n{}",
            text, config.follow_up_url, footer
        );
        let html = format!(
            "<div style=\"padding: 1rem; text-align: center;\">\
             <img src=\"{logo}\" alt=\"ProProp\" style=\"max-width: 200px;\">\
             {items}<hr>\
             <p>Podés consultar la deuda de ABL en <a href=\"{follow_up}\">{follow_up}</a></p>\
             <p style=\"margin-top: 1rem; font-size: 0.8rem; font-style: italic;\">{footer}</p>\
             </div>",
            logo = escape_html(&config.logo_url),
            items = items_html,
            follow_up = escape_html(&config.follow_up_url),
            footer = footer,
        );

        Self {
            subject: config.subject.clone(),
            text,
            html,
        }
    }
}

pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contact {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Contact {
    /// Splits `Name <address>`; bare addresses carry no name.
    pub fn parse(mailbox: &str) -> Self {
        match (mailbox.find('<'), mailbox.rfind('>')) {
            (Some(start), Some(end)) if start < end => {
                let name = mailbox[..start].trim().trim_matches('"').trim();
                Self {
                    email: mailbox[start + 1..end].trim().to_string(),
                    name: (!name.is_empty()).then(|| name.to_string()),
                }
            }
            _ => Self {
                email: mailbox.trim().to_string(),
                name: None,
            },
        }
    }
}

/// Body of a Brevo transactional send.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingEmail {
    pub sender: Contact,
    pub to: Vec<Contact>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bcc: Vec<Contact>,
    pub subject: String,
    pub html_content: String,
    pub text_content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendResponse {
    message_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BrevoNotifier {
    client: Client,
    config: EmailConfig,
}

impl BrevoNotifier {
    pub fn new(config: EmailConfig) -> Result<Self> {
        validate_email("email.sender_email", &config.sender_email)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::ConfigError {
                message: format!("failed to build email client: {}", e),
            })?;
        Ok(Self { client, config })
    }

    pub fn has_credentials(&self) -> bool {
        self.api_key().is_some()
    }

    fn api_key(&self) -> Option<&str> {
        self.config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    pub fn build_message(&self, recipient: &str, result: &ResolutionResult) -> OutgoingEmail {
        let content = EmailContent::for_result(result, &self.config);
        OutgoingEmail {
            sender: Contact {
                email: self.config.sender_email.clone(),
                name: Some(self.config.sender_name.clone()).filter(|name| !name.is_empty()),
            },
            to: vec![Contact::parse(recipient)],
            bcc: self.config.bcc.iter().map(|bcc| Contact::parse(bcc)).collect(),
            subject: content.subject,
            html_content: content.html,
            text_content: content.text,
        }
    }
}

#[async_trait]
impl Notifier for BrevoNotifier {
    async fn notify(
        &self,
        recipient: &str,
        result: &ResolutionResult,
    ) -> std::result::Result<NotificationReceipt, NotificationError> {
        let api_key = self.api_key().ok_or(NotificationError::MissingCredentials)?;
        let message = self.build_message(recipient, result);

        tracing::debug!("Sending '{}' to {}", message.subject, recipient);
        let response = self
            .client
            .post(&self.config.api_url)
            .header("api-key", api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&message)
            .send()
            .await
            .map_err(|e| NotificationError::Delivery(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Email provider rejected message: {} {}", status, body);
            return Err(NotificationError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        // A 2xx without a parsable body still means the message was queued.
        let message_id = response
            .json::<SendResponse>()
            .await
            .ok()
            .and_then(|sent| sent.message_id);
        tracing::info!("Email sent to {} ({:?})", recipient, message_id);

        Ok(NotificationReceipt {
            message_id,
            sent_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::SubUnit;
    use httpmock::prelude::*;
    use serde_json::json;

    fn config(api_url: String) -> EmailConfig {
        EmailConfig {
            api_url,
            api_key: Some("xkeysib-test".to_string()),
            ..EmailConfig::default()
        }
    }

    #[test]
    fn test_single_content() {
        let content = EmailContent::for_result(
            &ResolutionResult::Single("1234567".to_string()),
            &EmailConfig::default(),
        );
        assert_eq!(content.subject, "Consulta de ABL");
        assert!(content.text.starts_with("Tu número de partida es:\n1234567"));
        assert!(content.html.contains("<b>1234567</b>"));
        assert!(content.html.contains("https://lb.agip.gob.ar/ConsultaABL/"));
    }

    #[test]
    fn test_multiple_content_lists_units_in_order() {
        let content = EmailContent::for_result(
            &ResolutionResult::Multiple(vec![
                SubUnit::new("3001", "PB", "A"),
                SubUnit::new("3002", "1", "B"),
            ]),
            &EmailConfig::default(),
        );

        let first = content.text.find("Partida: 3001, Piso: PB, Dpto: A").unwrap();
        let second = content.text.find("Partida: 3002, Piso: 1, Dpto: B").unwrap();
        assert!(first < second);
        assert_eq!(content.html.matches("<li>").count(), 2);
    }

    #[test]
    fn test_upstream_values_are_escaped() {
        let content = EmailContent::for_result(
            &ResolutionResult::Multiple(vec![SubUnit::new("1", "<script>", "\"A\"&B")]),
            &EmailConfig::default(),
        );
        assert!(!content.html.contains("<script>"));
        assert!(content.html.contains("&lt;script&gt;"));
        assert!(content.html.contains("&quot;A&quot;&amp;B"));
    }

    #[test]
    fn test_contact_parse() {
        assert_eq!(
            Contact::parse("Ana Pérez <ana@example.com>"),
            Contact {
                email: "ana@example.com".to_string(),
                name: Some("Ana Pérez".to_string())
            }
        );
        assert_eq!(Contact::parse(" ana@example.com ").name, None);
    }

    #[tokio::test]
    async fn test_notify_posts_to_provider() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v3/smtp/email")
                .header("api-key", "xkeysib-test")
                .json_body_partial(
                    json!({
                        "to": [{"email": "cliente@example.com"}],
                        "bcc": [{"email": "info@proprop.com.ar"}],
                        "subject": "Consulta de ABL"
                    })
                    .to_string(),
                );
            then.status(201)
                .json_body(json!({"messageId": "<202410181200.1@smtp-relay.mailin.fr>"}));
        });

        let notifier = BrevoNotifier::new(config(server.url("/v3/smtp/email"))).unwrap();
        let receipt = notifier
            .notify(
                "cliente@example.com",
                &ResolutionResult::Single("1234567".to_string()),
            )
            .await
            .unwrap();

        mock.assert();
        assert_eq!(
            receipt.message_id.as_deref(),
            Some("<202410181200.1@smtp-relay.mailin.fr>")
        );
    }

    #[tokio::test]
    async fn test_rejection_is_reported() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/v3/smtp/email");
            then.status(401).body(r#"{"code":"unauthorized"}"#);
        });

        let notifier = BrevoNotifier::new(config(server.url("/v3/smtp/email"))).unwrap();
        let err = notifier
            .notify("cliente@example.com", &ResolutionResult::Single("1".to_string()))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            NotificationError::Rejected {
                status: 401,
                body: r#"{"code":"unauthorized"}"#.to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_missing_api_key_sends_nothing() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST);
            then.status(201);
        });

        let notifier = BrevoNotifier::new(EmailConfig {
            api_url: server.url("/v3/smtp/email"),
            api_key: Some("  ".to_string()),
            ..EmailConfig::default()
        })
        .unwrap();

        assert!(!notifier.has_credentials());
        let err = notifier
            .notify("cliente@example.com", &ResolutionResult::Single("1".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err, NotificationError::MissingCredentials);
        mock.assert_hits(0);
    }
}
