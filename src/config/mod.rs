//! Configuration module.
//!
//! Process settings come from environment variables (with `.env` support).
//! Community data (chats, shows, timezones, announce groups, templates)
//! lives in a TOML file, see [`community`].

pub mod community;

use std::env;
use std::path::PathBuf;

use anyhow::{Context, bail};
use serde::Deserialize;

pub use community::{ChatEntry, Community, Settings, Show};

/// Bot running mode
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BotMode {
    #[default]
    Polling,
    Webhook,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    // Telegram
    pub bot_token: String,
    pub bot_mode: BotMode,
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,

    /// Port for the HTTP server (webhook updates and the announcement API).
    pub http_port: u16,

    /// Shared secret for the announcement API. The API is disabled without it.
    pub api_key: Option<String>,

    /// A previously issued primary invite link for the default invite chat.
    /// Tracked at startup so `/newlink` can revoke it after a restart.
    pub join_link: Option<String>,

    /// Path of the community TOML file.
    pub config_path: PathBuf,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let bot_token = env::var("BOT_TOKEN").context("BOT_TOKEN must be set")?;
        if bot_token.trim().is_empty() {
            bail!("BOT_TOKEN must not be empty");
        }

        let bot_mode = match env::var("BOT_MODE")
            .unwrap_or_else(|_| "polling".to_string())
            .to_lowercase()
            .as_str()
        {
            "webhook" => BotMode::Webhook,
            _ => BotMode::Polling,
        };

        let webhook_url = non_empty_var("WEBHOOK_URL");
        if bot_mode == BotMode::Webhook && webhook_url.is_none() {
            bail!("WEBHOOK_URL must be set when BOT_MODE is webhook");
        }

        let http_port = match non_empty_var("HTTP_PORT") {
            Some(port) => port
                .trim()
                .parse()
                .with_context(|| format!("Invalid HTTP_PORT: {port}"))?,
            None => 8080,
        };

        let config_path = non_empty_var("CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("config.toml"));

        Ok(Self {
            bot_token,
            bot_mode,
            webhook_url,
            webhook_secret: non_empty_var("WEBHOOK_SECRET"),
            http_port,
            api_key: non_empty_var("API_KEY"),
            join_link: non_empty_var("JOIN_LINK"),
            config_path,
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
