use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::utils::{expand_home, normalize_phone, warbler_home};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WhatsAppConfig {
    #[serde(default, rename = "phoneNumberId")]
    pub phone_number_id: String,
    #[serde(default, rename = "accessToken")]
    pub access_token: String,
    #[serde(default, rename = "verifyToken")]
    pub verify_token: String,
    /// App secret for webhook signature validation. Empty disables the check.
    #[serde(default, rename = "appSecret")]
    pub app_secret: String,
    #[serde(default = "default_graph_base", rename = "apiBase")]
    pub api_base: String,
}

fn default_graph_base() -> String {
    "https://graph.facebook.com/v23.0".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GeminiConfig {
    #[serde(default, rename = "apiKey")]
    pub api_key: String,
    #[serde(default = "default_chat_model", rename = "chatModel")]
    pub chat_model: String,
    #[serde(default = "default_analysis_model", rename = "analysisModel")]
    pub analysis_model: String,
    #[serde(default = "default_gemini_base", rename = "apiBase")]
    pub api_base: String,
}

fn default_chat_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_analysis_model() -> String {
    "gemini-2.5-pro".to_string()
}

fn default_gemini_base() -> String {
    "https://generativelanguage.googleapis.com/v1".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default = "default_bot_name")]
    pub name: String,
    #[serde(default = "default_prefix", rename = "commandPrefix")]
    pub command_prefix: String,
    /// Phone number granted the admin flag at first contact.
    #[serde(default, rename = "adminPhone")]
    pub admin_phone: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: default_bot_name(),
            command_prefix: default_prefix(),
            admin_phone: String::new(),
        }
    }
}

fn default_bot_name() -> String {
    "Warbler".to_string()
}

fn default_prefix() -> String {
    "/".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_rate_per_window", rename = "ratePerWindow")]
    pub rate_per_window: u32,
    #[serde(default = "default_window_secs", rename = "windowSecs")]
    pub window_secs: u64,
    /// Admins bypass the rate limiter entirely.
    #[serde(default = "default_true", rename = "adminExempt")]
    pub admin_exempt: bool,
    /// When a limiter backend errors, allow (true) or deny (false) the event.
    #[serde(default = "default_true", rename = "failOpen")]
    pub fail_open: bool,
    #[serde(default = "default_dedup_ttl_secs", rename = "dedupTtlSecs")]
    pub dedup_ttl_secs: u64,
    #[serde(default = "default_dedup_max_entries", rename = "dedupMaxEntries")]
    pub dedup_max_entries: usize,
    #[serde(default = "default_max_file_bytes", rename = "maxFileBytes")]
    pub max_file_bytes: u64,
    #[serde(default = "default_ai_timeout_secs", rename = "aiTimeoutSecs")]
    pub ai_timeout_secs: u64,
    #[serde(
        default = "default_document_types",
        rename = "supportedDocumentTypes"
    )]
    pub supported_document_types: Vec<String>,
    #[serde(default = "default_image_types", rename = "supportedImageTypes")]
    pub supported_image_types: Vec<String>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            rate_per_window: default_rate_per_window(),
            window_secs: default_window_secs(),
            admin_exempt: true,
            fail_open: true,
            dedup_ttl_secs: default_dedup_ttl_secs(),
            dedup_max_entries: default_dedup_max_entries(),
            max_file_bytes: default_max_file_bytes(),
            ai_timeout_secs: default_ai_timeout_secs(),
            supported_document_types: default_document_types(),
            supported_image_types: default_image_types(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_rate_per_window() -> u32 {
    30
}

fn default_window_secs() -> u64 {
    60
}

fn default_dedup_ttl_secs() -> u64 {
    600
}

fn default_dedup_max_entries() -> usize {
    4096
}

fn default_max_file_bytes() -> u64 {
    16 * 1024 * 1024
}

fn default_ai_timeout_secs() -> u64 {
    30
}

fn default_document_types() -> Vec<String> {
    [
        "txt", "md", "html", "css", "xml", "json", "csv", "yaml", "yml", "log", "js", "py",
        "java", "cpp", "c", "php", "rb", "go", "rs", "swift",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

fn default_image_types() -> Vec<String> {
    ["jpeg", "jpg", "png", "gif", "webp"]
        .iter()
        .map(|s| (*s).to_string())
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// Data directory; empty means `$WARBLER_HOME` (default `~/.warbler`).
    #[serde(default, rename = "dataDir")]
    pub data_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    pub fn data_dir(&self) -> Result<PathBuf> {
        if self.storage.data_dir.is_empty() {
            warbler_home()
        } else {
            Ok(expand_home(&self.storage.data_dir))
        }
    }

    pub fn db_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join("warbler.db"))
    }

    /// Admin phone reduced to digits, matching sender identities on the wire.
    pub fn admin_digits(&self) -> String {
        normalize_phone(&self.bot.admin_phone)
    }

    /// Checks required for any AI-backed operation.
    pub fn validate(&self) -> Result<()> {
        if self.gemini.api_key.is_empty() {
            anyhow::bail!("gemini.apiKey is not set");
        }
        Ok(())
    }

    /// Checks required to run the gateway service.
    pub fn validate_serve(&self) -> Result<()> {
        self.validate()?;
        if self.whatsapp.phone_number_id.is_empty() {
            anyhow::bail!("whatsapp.phoneNumberId is not set");
        }
        if self.whatsapp.access_token.is_empty() {
            anyhow::bail!("whatsapp.accessToken is not set");
        }
        if self.whatsapp.verify_token.is_empty() {
            anyhow::bail!("whatsapp.verifyToken is not set");
        }
        if self.bot.command_prefix.is_empty() {
            anyhow::bail!("bot.commandPrefix must not be empty");
        }
        self.data_dir().context("unable to resolve data directory")?;
        Ok(())
    }
}
