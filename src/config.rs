//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MAILMERGE_CONFIG` (environment variable)
//! 2. `~/.config/mailmerge/config.toml` (Linux)
//!    `~/Library/Application Support/mailmerge/config.toml` (macOS)
//!    `%APPDATA%\mailmerge\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::dispatch::RunSettings;
use crate::error::{MergeError, Result};
use crate::policy::{AttachmentPolicy, RecipientSettings};
use crate::transport::{Sender, SmtpConfig};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    /// `From` identity.
    pub sender: Sender,
    /// CC / BCC modes and global lists.
    pub recipients: RecipientSettings,
    /// Attachment mode and the empty-cell default.
    pub attachments: AttachmentPolicy,
    pub drafts: DraftsConfig,
    pub transport: TransportConfig,
    pub csv: CsvConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Override cache directory for checkpoints and logs.
    pub cache_dir: Option<PathBuf>,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// Where `.eml` drafts live.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DraftsConfig {
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Write each message to an `.eml` file.
    #[default]
    Outbox,
    /// Deliver through an SMTP relay.
    Smtp,
}

/// Delivery settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub kind: TransportKind,
    pub outbox_dir: Option<PathBuf>,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    /// Environment variable holding the SMTP password.
    pub smtp_password_env: String,
}

/// CSV dialect of recipient lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvConfig {
    /// Field separator character.
    pub delimiter: char,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::Outbox,
            outbox_dir: None,
            smtp_host: String::new(),
            smtp_port: 587,
            smtp_username: None,
            smtp_password_env: "MAILMERGE_SMTP_PASSWORD".to_string(),
        }
    }
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self { delimiter: ',' }
    }
}

impl Config {
    /// Freeze the dispatcher-facing part of the configuration.
    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            sender: self.sender.clone(),
            recipients: self.recipients.clone(),
            attachments: self.attachments,
        }
    }

    /// Take over the settings a stopped run was started with. Command-line
    /// overrides applied afterwards still win.
    pub fn restore_run_settings(&mut self, settings: &RunSettings) {
        self.sender = settings.sender.clone();
        self.recipients = settings.recipients.clone();
        self.attachments = settings.attachments;
    }

    /// The CSV delimiter as a byte. Only ASCII separators are supported.
    pub fn csv_delimiter(&self) -> Result<u8> {
        let c = self.csv.delimiter;
        if c.is_ascii() {
            Ok(c as u8)
        } else {
            Err(MergeError::Config(format!(
                "CSV delimiter '{c}' is not an ASCII character"
            )))
        }
    }

    /// SMTP connection settings, with the password read from the environment.
    pub fn smtp_config(&self) -> Result<SmtpConfig> {
        let t = &self.transport;
        if t.smtp_host.trim().is_empty() {
            return Err(MergeError::Config(
                "transport.smtp_host is required for SMTP delivery".into(),
            ));
        }
        let password = std::env::var(&t.smtp_password_env).ok();
        if t.smtp_username.is_some() && password.is_none() {
            tracing::warn!(
                var = %t.smtp_password_env,
                "SMTP username set but password variable is empty"
            );
        }
        Ok(SmtpConfig {
            host: t.smtp_host.trim().to_string(),
            port: t.smtp_port,
            username: t.smtp_username.clone(),
            password,
        })
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Save configuration to the standard location.
pub fn save_config(config: &Config) -> anyhow::Result<()> {
    let path = config_file_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(&path, contents)?;
    tracing::info!(path = %path.display(), "Saved config");
    Ok(())
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MAILMERGE_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("mailmerge").join("config.toml"))
}

/// Return the cache directory for checkpoints and logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailmerge")
}

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    cache_dir(config).join("mailmerge.log")
}

/// Directory holding `.eml` drafts.
pub fn drafts_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.drafts.dir {
        return dir.clone();
    }
    data_dir().join("drafts")
}

/// Directory the outbox transport writes to.
pub fn outbox_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.transport.outbox_dir {
        return dir.clone();
    }
    data_dir().join("outbox")
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailmerge")
}
