//! Bot runtime - Polling and Webhook runners.

use std::net::SocketAddr;

use axum::Router;
use teloxide::prelude::*;
use tracing::{error, info};

use super::dispatcher::ThrottledBot;
use super::webhook;
use crate::config::{BotMode, Config};

/// Run the bot with the configured mode.
///
/// `api` is the announcement router. In webhook mode it shares the server
/// with the Telegram endpoint; in polling mode it gets its own listener,
/// and only when an API key is configured.
pub async fn run(
    config: &Config,
    bot: ThrottledBot,
    mut dispatcher: Dispatcher<ThrottledBot, anyhow::Error, teloxide::dispatching::DefaultKey>,
    api: Router,
) -> anyhow::Result<()> {
    match config.bot_mode {
        BotMode::Polling => {
            if config.api_key.is_some() {
                serve_api(config.http_port, api).await?;
            } else {
                info!("API_KEY not set, announcement API disabled");
            }
            info!("Starting bot in polling mode...");
            dispatcher.dispatch().await;
        }
        BotMode::Webhook => {
            info!("Starting bot in webhook mode...");
            webhook::start_webhook(config, dispatcher, bot, api).await?;
        }
    }
    Ok(())
}

/// Serve the announcement API in the background.
async fn serve_api(port: u16, api: Router) -> anyhow::Result<()> {
    let address = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(address).await?;
    info!("📡 Announcement API listening on: {}", address);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, api).await {
            error!("Announcement API server stopped: {}", e);
        }
    });
    Ok(())
}
