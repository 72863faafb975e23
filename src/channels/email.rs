//! Report delivery over SMTP via lettre.

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};

use crate::error::{ConfigError, ReportError};
use crate::report::ReportSink;

// ── Configuration ───────────────────────────────────────────────────

/// SMTP settings for sending the run report.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
    pub to_address: String,
}

impl SmtpConfig {
    /// Build config from a variable lookup.
    ///
    /// Returns `Ok(None)` if `REPORT_SMTP_HOST` is not set (report goes to the log).
    pub fn from_lookup<F>(lookup: &F) -> Result<Option<Self>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some(host) = lookup("REPORT_SMTP_HOST").filter(|h| !h.trim().is_empty()) else {
            return Ok(None);
        };

        let port = match lookup("REPORT_SMTP_PORT") {
            None => 587,
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid("REPORT_SMTP_PORT", format!("{e}")))?,
        };

        let username = lookup("REPORT_SMTP_USERNAME").unwrap_or_default();
        let password = SecretString::from(lookup("REPORT_SMTP_PASSWORD").unwrap_or_default());
        let from_address = lookup("REPORT_FROM_ADDRESS")
            .or_else(|| (!username.is_empty()).then(|| username.clone()))
            .ok_or_else(|| ConfigError::MissingRequired {
                key: "REPORT_FROM_ADDRESS".into(),
                hint: "Set it (or REPORT_SMTP_USERNAME) when REPORT_SMTP_HOST is set.".into(),
            })?;
        let to_address = lookup("REPORT_TO_ADDRESS").ok_or_else(|| ConfigError::MissingRequired {
            key: "REPORT_TO_ADDRESS".into(),
            hint: "Set the report recipient when REPORT_SMTP_HOST is set.".into(),
        })?;

        Ok(Some(Self {
            host: host.trim().to_string(),
            port,
            username,
            password,
            from_address,
            to_address,
        }))
    }
}

// ── Sink ────────────────────────────────────────────────────────────

/// Sends the run report as a plain-text email.
pub struct SmtpReportSink {
    config: SmtpConfig,
}

impl SmtpReportSink {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn build_message(&self, subject: &str, body: &str) -> Result<Message, ReportError> {
        Message::builder()
            .from(self.config.from_address.parse().map_err(|e| {
                ReportError::InvalidAddress {
                    address: self.config.from_address.clone(),
                    reason: format!("{e}"),
                }
            })?)
            .to(self.config.to_address.parse().map_err(|e| {
                ReportError::InvalidAddress {
                    address: self.config.to_address.clone(),
                    reason: format!("{e}"),
                }
            })?)
            .subject(subject)
            .body(body.to_string())
            .map_err(|e| ReportError::Build(e.to_string()))
    }
}

#[async_trait]
impl ReportSink for SmtpReportSink {
    fn name(&self) -> &str {
        "smtp"
    }

    async fn deliver(&self, subject: &str, body: &str) -> Result<(), ReportError> {
        let email = self.build_message(subject, body)?;
        let config = self.config.clone();

        tokio::task::spawn_blocking(move || {
            let creds = Credentials::new(
                config.username.clone(),
                config.password.expose_secret().to_string(),
            );
            let transport = SmtpTransport::relay(&config.host)
                .map_err(|e| ReportError::Send(format!("SMTP relay error: {e}")))?
                .port(config.port)
                .credentials(creds)
                .build();
            transport
                .send(&email)
                .map_err(|e| ReportError::Send(e.to_string()))?;
            Ok::<_, ReportError>(())
        })
        .await
        .map_err(|e| ReportError::Send(format!("send task failed: {e}")))??;

        tracing::info!(to = %self.config.to_address, "Report email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn absent_host_disables_smtp() {
        assert!(SmtpConfig::from_lookup(&lookup(&[])).unwrap().is_none());
    }

    #[test]
    fn from_address_defaults_to_username() {
        let config = SmtpConfig::from_lookup(&lookup(&[
            ("REPORT_SMTP_HOST", "smtp.example.com"),
            ("REPORT_SMTP_USERNAME", "bot@example.com"),
            ("REPORT_TO_ADDRESS", "me@example.com"),
        ]))
        .unwrap()
        .unwrap();
        assert_eq!(config.port, 587);
        assert_eq!(config.from_address, "bot@example.com");
    }

    #[test]
    fn missing_recipient_is_an_error() {
        let err = SmtpConfig::from_lookup(&lookup(&[
            ("REPORT_SMTP_HOST", "smtp.example.com"),
            ("REPORT_FROM_ADDRESS", "bot@example.com"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("REPORT_TO_ADDRESS"));
    }

    #[test]
    fn bad_port_is_an_error() {
        let err = SmtpConfig::from_lookup(&lookup(&[
            ("REPORT_SMTP_HOST", "smtp.example.com"),
            ("REPORT_SMTP_PORT", "lots"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("REPORT_SMTP_PORT"));
    }

    #[test]
    fn builds_report_message() {
        let sink = SmtpReportSink::new(SmtpConfig {
            host: "smtp.example.com".into(),
            port: 465,
            username: "bot".into(),
            password: SecretString::from("pw".to_string()),
            from_address: "bot@example.com".into(),
            to_address: "me@example.com".into(),
        });
        assert!(sink.build_message("Report", "body").is_ok());
    }

    #[test]
    fn rejects_invalid_recipient() {
        let sink = SmtpReportSink::new(SmtpConfig {
            host: "smtp.example.com".into(),
            port: 465,
            username: "bot".into(),
            password: SecretString::from("pw".to_string()),
            from_address: "bot@example.com".into(),
            to_address: "not an address".into(),
        });
        assert!(matches!(
            sink.build_message("Report", "body"),
            Err(ReportError::InvalidAddress { .. })
        ));
    }
}
