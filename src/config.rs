//! Process configuration read from environment variables.
//!
//! Everything is read through a lookup closure so that tests can supply a
//! plain map instead of mutating the process environment.

use std::time::Duration;

use log::debug;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required configuration: {}", .0.join(", "))]
    Missing(Vec<String>),
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: String, value: String },
    #[error("failed to initialise mail provider: {0}")]
    Provider(String),
}

/// Exact multipart keys of the report form. Matching is byte-exact,
/// surrounding whitespace included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldKeys {
    pub reporter_name: String,
    pub location: String,
    pub description: String,
    pub photo: String,
}

impl Default for FieldKeys {
    fn default() -> Self {
        FieldKeys {
            reporter_name: "Nome do Relator".to_string(),
            location: "Endereço do Problema".to_string(),
            description: "Descrição do Problema".to_string(),
            photo: "foto".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    Any,
    List(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub listen_port: u16,
    pub allowed_origins: AllowedOrigins,
    pub max_upload_bytes: usize,
    pub send_timeout: Duration,
    pub attachment_required: bool,
    pub attachment_mime_prefixes: Vec<String>,
    pub subject_prefix: String,
    pub strict_startup: bool,
    pub field_keys: FieldKeys,
}

pub const DEFAULT_SUBJECT_PREFIX: &str = "New problem report: ";

/// Room for the text parts and multipart framing on top of the photo.
pub const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

impl Default for Settings {
    fn default() -> Self {
        Settings {
            listen_port: 3000,
            allowed_origins: AllowedOrigins::Any,
            max_upload_bytes: 10 * 1024 * 1024,
            send_timeout: Duration::from_secs(30),
            attachment_required: true,
            attachment_mime_prefixes: vec!["image/".to_string()],
            subject_prefix: DEFAULT_SUBJECT_PREFIX.to_string(),
            strict_startup: true,
            field_keys: FieldKeys::default(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Request body cap: the photo limit plus the rest of the form.
    pub fn body_limit(&self) -> usize {
        self.max_upload_bytes.saturating_add(FORM_OVERHEAD_BYTES)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Settings::default();

        let listen_port = parse_or(&lookup, "LISTEN_PORT", defaults.listen_port)?;
        let max_upload_mb: usize = parse_or(&lookup, "MAX_UPLOAD_MB", 10)?;
        let max_upload_bytes = max_upload_mb
            .checked_mul(1024 * 1024)
            .filter(|bytes| bytes.checked_add(FORM_OVERHEAD_BYTES).is_some())
            .ok_or_else(|| ConfigError::Invalid {
                key: "MAX_UPLOAD_MB".to_string(),
                value: max_upload_mb.to_string(),
            })?;
        let timeout_secs: u64 = parse_or(&lookup, "SEND_TIMEOUT_SECS", 30)?;
        let attachment_required = bool_or(&lookup, "ATTACHMENT_REQUIRED", true)?;
        let strict_startup = bool_or(&lookup, "STRICT_STARTUP", true)?;

        let allowed_origins = match lookup("ALLOWED_ORIGINS") {
            None => AllowedOrigins::Any,
            Some(raw) if raw.trim() == "*" || raw.trim().is_empty() => AllowedOrigins::Any,
            Some(raw) => AllowedOrigins::List(split_list(&raw)),
        };

        let attachment_mime_prefixes = match lookup("ATTACHMENT_MIME_PREFIXES") {
            Some(raw) => split_list(&raw.to_ascii_lowercase()),
            None => defaults.attachment_mime_prefixes,
        };

        // Form keys are not trimmed: the deployed form uses them verbatim.
        let key = |name: &str, fallback: String| lookup(name).unwrap_or(fallback);
        let dk = defaults.field_keys;
        let field_keys = FieldKeys {
            reporter_name: key("FIELD_REPORTER_NAME", dk.reporter_name),
            location: key("FIELD_LOCATION", dk.location),
            description: key("FIELD_DESCRIPTION", dk.description),
            photo: key("FIELD_PHOTO", dk.photo),
        };

        let settings = Settings {
            listen_port,
            allowed_origins,
            max_upload_bytes,
            send_timeout: Duration::from_secs(timeout_secs),
            attachment_required,
            attachment_mime_prefixes,
            subject_prefix: lookup("SUBJECT_PREFIX").unwrap_or(defaults.subject_prefix),
            strict_startup,
            field_keys,
        };
        debug!("[config] loaded settings: {:?}", settings);
        Ok(settings)
    }
}

// ── Delivery ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Smtp,
    Resend,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderConfig {
    Smtp {
        host: String,
        port: u16,
        username: String,
        password: String,
    },
    Resend {
        api_key: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryConfig {
    pub provider: ProviderConfig,
    pub from_address: String,
    pub sender_name: String,
    pub recipient: String,
}

impl DeliveryConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let provider = match get("MAIL_PROVIDER").as_deref().map(str::to_ascii_lowercase) {
            None => Provider::Smtp,
            Some(p) if p == "smtp" => Provider::Smtp,
            Some(p) if p == "resend" => Provider::Resend,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "MAIL_PROVIDER".to_string(),
                    value: other,
                })
            }
        };

        let mut missing = Vec::new();
        let mut require = |key: &str| {
            let value = get(key);
            if value.is_none() {
                missing.push(key.to_string());
            }
            value.unwrap_or_default()
        };

        let provider_config = match provider {
            Provider::Smtp => {
                let username = require("EMAIL_USER");
                let password = require("EMAIL_PASS");
                ProviderConfig::Smtp {
                    host: String::new(),
                    port: 0,
                    username,
                    password,
                }
            }
            Provider::Resend => ProviderConfig::Resend {
                api_key: require("RESEND_API_KEY"),
            },
        };

        // The SMTP login doubles as the sender address unless EMAIL_FROM says otherwise.
        let from_address = match get("EMAIL_FROM") {
            Some(addr) => addr,
            None => match &provider_config {
                ProviderConfig::Smtp { username, .. } if !username.is_empty() => username.clone(),
                ProviderConfig::Smtp { .. } => String::new(),
                ProviderConfig::Resend { .. } => require("EMAIL_FROM"),
            },
        };
        let recipient = require("EMAIL_RECEIVER");

        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let provider_config = match provider_config {
            ProviderConfig::Smtp {
                username, password, ..
            } => ProviderConfig::Smtp {
                host: get("SMTP_HOST").unwrap_or_else(|| "smtp.gmail.com".to_string()),
                port: parse_or(&lookup, "SMTP_PORT", 465)?,
                username,
                password,
            },
            resend => resend,
        };

        let sender_name = get("SENDER_NAME")
            .unwrap_or_else(|| "Problem Reports".to_string())
            .replace(['\r', '\n'], " ");

        Ok(DeliveryConfig {
            provider: provider_config,
            from_address,
            sender_name,
            recipient,
        })
    }

    pub fn provider(&self) -> Provider {
        match self.provider {
            ProviderConfig::Smtp { .. } => Provider::Smtp,
            ProviderConfig::Resend { .. } => Provider::Resend,
        }
    }
}

// ── Helpers ──

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            value: raw,
        }),
    }
}

fn bool_or<F>(lookup: &F, key: &str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if v.is_empty() => Ok(default),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(v) => Err(ConfigError::Invalid {
            key: key.to_string(),
            value: v,
        }),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
