//! Blocking SendGrid client with retries.

use crate::config::MailSettings;
use crate::notifications::ParentEmail;
use anyhow::{Context, Result, anyhow};
use log::{info, warn};
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use serde_json::{Value, json};
use std::{thread, time::Duration};

pub const MAIL_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const MAIL_MAX_RETRIES: u32 = 3;

/// Timeouts, connection failures and DNS problems are worth another try.
fn is_retryable_error(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_request()
}

fn error_type_str(e: &reqwest::Error) -> &'static str {
    if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connection"
    } else if e.is_request() {
        "request/DNS"
    } else if e.is_body() {
        "body"
    } else {
        "unknown"
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// Send with exponential backoff on network errors, 5xx and 429 responses.
fn retry_request<F>(request_fn: F, max_retries: u32) -> Result<Response>
where
    F: Fn() -> Result<Response, reqwest::Error>,
{
    let mut attempts = 0;

    loop {
        attempts += 1;

        match request_fn() {
            Ok(response) => {
                let status = response.status();
                if is_retryable_status(status) {
                    if attempts < max_retries {
                        let sleep_secs = 2_u64.pow(attempts.saturating_sub(1));
                        let error_msg = response.text().unwrap_or_default();
                        warn!(
                            "Mail provider error ({status} {error_msg}), retrying in {sleep_secs} seconds... (attempt {attempts}/{max_retries})"
                        );
                        thread::sleep(Duration::from_secs(sleep_secs));
                        continue;
                    }
                    return Err(anyhow!("Mail provider error after {attempts} attempts: {status}"));
                }
                if !status.is_success() {
                    let error_msg = response.text().unwrap_or_default();
                    return Err(anyhow!("Mail provider rejected the message: {status} {error_msg}"));
                }
                return Ok(response);
            }
            Err(e) => {
                if is_retryable_error(&e) && attempts < max_retries {
                    let sleep_secs = 2_u64.pow(attempts.saturating_sub(1));
                    warn!(
                        "Network error ({}), retrying in {} seconds... (attempt {}/{}): {}",
                        error_type_str(&e),
                        sleep_secs,
                        attempts,
                        max_retries,
                        e
                    );
                    thread::sleep(Duration::from_secs(sleep_secs));
                    continue;
                }
                return Err(anyhow!(
                    "Network error ({}) after {attempts} attempts: {e}",
                    error_type_str(&e)
                ));
            }
        }
    }
}

/// Request body of the v3 `mail/send` endpoint.
pub fn build_payload(from_email: &str, message: &ParentEmail) -> Value {
    json!({
        "personalizations": [{ "to": [{ "email": message.to }] }],
        "from": { "email": from_email },
        "subject": message.subject,
        "content": [{ "type": "text/html", "value": message.html }],
    })
}

pub struct Mailer {
    settings: MailSettings,
    client: Client,
}

impl Mailer {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(settings: MailSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(MAIL_REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Mailer { settings, client })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(MailSettings::from_env())
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.is_enabled()
    }

    /// Deliver one message. Returns `Ok(false)` when sending is disabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider rejects the message or stays
    /// unreachable after all retry attempts.
    pub fn send(&self, message: &ParentEmail) -> Result<bool> {
        if !self.is_enabled() {
            info!(
                "Mail disabled, dropping \"{}\" to {}",
                message.subject, message.to
            );
            return Ok(false);
        }

        let url = self.settings.send_url();
        let payload = build_payload(&self.settings.from_email, message);
        retry_request(
            || {
                self.client
                    .post(&url)
                    .bearer_auth(&self.settings.api_key)
                    .json(&payload)
                    .send()
            },
            MAIL_MAX_RETRIES,
        )
        .with_context(|| format!("Failed to send \"{}\" to {}", message.subject, message.to))?;

        info!("Sent \"{}\" to {}", message.subject, message.to);
        Ok(true)
    }
}
