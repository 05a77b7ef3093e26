//! Podcast community bot.
//!
//! A Telegram bot for a podcast community's chats: single-use invite links
//! with join approval, next-show countdown pins, now-playing announcements,
//! topic changes with approval, and admin reports.
//!
//! ## Architecture
//!
//! - `config` - Environment configuration and the community TOML file
//! - `permissions` - Membership checks with caching
//! - `services` - Invite bookkeeping, countdown jobs, show times, announcements
//! - `bot` - Dispatcher, polling and webhook runners (with Throttle for API rate limiting)
//! - `plugins` - Command handlers
//! - `events` - Join requests and `@admin` mentions
//! - `api` - HTTP announcement endpoint
//! - `utils` - Utility functions

pub mod api;
pub mod bot;
pub mod config;
pub mod events;
pub mod permissions;
pub mod plugins;
pub mod services;
pub mod utils;
