//! Settings read from the environment (and `.env` when present).

use std::env;

pub const DEFAULT_FROM_EMAIL: &str = "no-reply@example.com";
const GLOBAL_API_BASE: &str = "https://api.sendgrid.com";
const EU_API_BASE: &str = "https://api.eu.sendgrid.com";

/// Load `.env` into the process environment. Missing files are fine.
pub fn load_dotenv() {
    #[cfg(any(feature = "database", feature = "network"))]
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            log::warn!("Could not read .env file: {e}");
        }
    }
}

fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailSettings {
    /// Empty disables sending.
    pub api_key: String,
    pub from_email: String,
    pub eu_residency: bool,
}

impl Default for MailSettings {
    fn default() -> Self {
        MailSettings {
            api_key: String::new(),
            from_email: DEFAULT_FROM_EMAIL.to_string(),
            eu_residency: false,
        }
    }
}

impl MailSettings {
    pub fn from_env() -> Self {
        let from_email = env::var("SENDGRID_FROM_EMAIL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_FROM_EMAIL.to_string());
        MailSettings {
            api_key: env::var("SENDGRID_API_KEY").unwrap_or_default(),
            from_email,
            eu_residency: env_flag("SENDGRID_EU_RESIDENCY"),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    pub fn api_base(&self) -> &'static str {
        if self.eu_residency {
            EU_API_BASE
        } else {
            GLOBAL_API_BASE
        }
    }

    pub fn send_url(&self) -> String {
        format!("{}/v3/mail/send", self.api_base())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn test_default_settings_are_disabled() {
        let settings = MailSettings::default();
        assert!(!settings.is_enabled());
        assert_eq!(settings.from_email, "no-reply@example.com");
        assert_eq!(settings.send_url(), "https://api.sendgrid.com/v3/mail/send");
    }

    #[test_log::test]
    fn test_eu_residency_host() {
        let settings = MailSettings {
            api_key: "SG.key".to_string(),
            eu_residency: true,
            ..Default::default()
        };
        assert!(settings.is_enabled());
        assert_eq!(settings.send_url(), "https://api.eu.sendgrid.com/v3/mail/send");
    }
}
