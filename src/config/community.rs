//! Community directory loaded from TOML.
//!
//! The file is read once at startup and indexed several ways:
//! chat slug → chat, chat ID → chat, show slug or alias → show,
//! timezone alias → canonical zone, admin chat → managed chat slugs.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::Deserialize;
use teloxide::types::ChatId;
use thiserror::Error;
use tracing::info;

/// Errors raised while loading the community file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("{field} refers to unknown {kind} '{slug}'")]
    UnknownReference {
        field: String,
        kind: &'static str,
        slug: String,
    },
    #[error("chat ID {0} is used by more than one chat")]
    DuplicateChatId(i64),
}

/// One configured chat.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatEntry {
    /// Filled in from the table key during load.
    #[serde(skip)]
    pub slug: String,
    pub id: i64,
    /// Slug of the chat that receives reports and manages invite links.
    pub admin_chat: Option<String>,
    /// Slug of the chat where topic proposals are approved.
    pub topic_approval_chat: Option<String>,
    #[serde(default = "default_true")]
    pub topic_approval_required: bool,
    #[serde(default)]
    pub rate_limit_delay_minutes: u32,
    /// Whether `/join <slug>` may target this chat.
    #[serde(default)]
    pub invite: bool,
    pub next_show_default: Option<String>,
    pub invite_greeting: Option<String>,
    pub invite_confirmation: Option<String>,
}

impl ChatEntry {
    pub fn chat_id(&self) -> ChatId {
        ChatId(self.id)
    }

    /// Minimum spacing between two permitted joins.
    pub fn join_delay(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.rate_limit_delay_minutes))
    }
}

/// One podcast show.
#[derive(Debug, Clone, Deserialize)]
pub struct Show {
    #[serde(skip)]
    pub slug: String,
    pub name: String,
    pub domain: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Whether now-playing posts carry a "Watch" link.
    #[serde(default = "default_true")]
    pub video: bool,
}

/// Top-level settings and message templates.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub default_invite_chat: Option<String>,
    #[serde(default = "default_join_link_minutes")]
    pub join_link_valid_minutes: u32,
    #[serde(default = "default_rate_limit_template")]
    pub rate_limit_template: String,
    #[serde(default = "default_join_button_text")]
    pub join_button_text: String,
    #[serde(default = "default_timezone")]
    pub default_timezone: String,
    #[serde(default = "default_nextshow_url")]
    pub nextshow_url_template: String,
    pub version_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCommunity {
    #[serde(default)]
    chats: BTreeMap<String, ChatEntry>,
    #[serde(default)]
    shows: BTreeMap<String, Show>,
    #[serde(default)]
    timezones: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    announce: BTreeMap<String, AnnounceTargets>,
    #[serde(flatten)]
    settings: Settings,
}

/// Announce entries hold chat IDs, except `<show>-np` entries which hold chat slugs.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AnnounceTargets {
    Ids(Vec<i64>),
    Slugs(Vec<String>),
}

/// Indexed, immutable view of the community file.
#[derive(Debug, Clone)]
pub struct Community {
    chats: HashMap<String, ChatEntry>,
    chat_slugs_by_id: HashMap<i64, String>,
    shows: HashMap<String, Show>,
    show_aliases: HashMap<String, String>,
    timezones: HashMap<String, String>,
    managed_chats: HashMap<i64, Vec<String>>,
    announce: HashMap<String, Vec<ChatId>>,
    now_playing: HashMap<String, Vec<String>>,
    pub settings: Settings,
}

impl Community {
    /// Load and index a community file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!("Loading community config from {}", path.display());
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse and index community TOML.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let raw: RawCommunity = toml::from_str(text)?;
        Self::index(raw)
    }

    fn index(raw: RawCommunity) -> Result<Self, ConfigError> {
        let RawCommunity {
            chats: raw_chats,
            shows: raw_shows,
            timezones: raw_timezones,
            announce: raw_announce,
            settings,
        } = raw;

        let mut chats = HashMap::with_capacity(raw_chats.len());
        let mut chat_slugs_by_id = HashMap::with_capacity(raw_chats.len());
        for (slug, mut chat) in raw_chats {
            let slug = slug.to_lowercase();
            chat.slug = slug.clone();
            if chat_slugs_by_id.insert(chat.id, slug.clone()).is_some() {
                return Err(ConfigError::DuplicateChatId(chat.id));
            }
            chats.insert(slug, chat);
        }

        let mut shows = HashMap::with_capacity(raw_shows.len());
        let mut show_aliases = HashMap::new();
        for (slug, mut show) in raw_shows {
            let slug = slug.to_lowercase();
            show.slug = slug.clone();
            for alias in &show.aliases {
                show_aliases.insert(alias.to_lowercase(), slug.clone());
            }
            shows.insert(slug, show);
        }

        let mut timezones = HashMap::new();
        for (canonical, aliases) in raw_timezones {
            for alias in aliases {
                timezones.insert(alias.to_lowercase(), canonical.clone());
            }
        }

        let mut announce = HashMap::new();
        let mut now_playing = HashMap::new();
        for (group, targets) in raw_announce {
            match targets {
                AnnounceTargets::Ids(ids) => {
                    announce.insert(group, ids.into_iter().map(ChatId).collect());
                }
                AnnounceTargets::Slugs(slugs) => {
                    let Some(show) = group.strip_suffix("-np") else {
                        return Err(ConfigError::UnknownReference {
                            field: format!("announce.{group}"),
                            kind: "now-playing group (expected '<show>-np')",
                            slug: group.clone(),
                        });
                    };
                    let show = show.to_string();
                    now_playing.insert(show, slugs.iter().map(|s| s.to_lowercase()).collect());
                }
            }
        }

        let mut managed_chats: HashMap<i64, Vec<String>> = HashMap::new();
        for chat in chats.values() {
            if let Some(admin_slug) = &chat.admin_chat {
                let admin = lookup(&chats, admin_slug, || format!("chats.{}.admin_chat", chat.slug))?;
                managed_chats.entry(admin.id).or_default().push(chat.slug.clone());
            }
        }
        for managed in managed_chats.values_mut() {
            managed.sort();
        }

        let community = Self {
            chats,
            chat_slugs_by_id,
            shows,
            show_aliases,
            timezones,
            managed_chats,
            announce,
            now_playing,
            settings,
        };
        community.validate()?;
        Ok(community)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for chat in self.chats.values() {
            if let Some(slug) = &chat.topic_approval_chat {
                lookup(&self.chats, slug, || format!("chats.{}.topic_approval_chat", chat.slug))?;
            }
            if let Some(show) = &chat.next_show_default
                && self.show(show).is_none()
            {
                return Err(ConfigError::UnknownReference {
                    field: format!("chats.{}.next_show_default", chat.slug),
                    kind: "show",
                    slug: show.clone(),
                });
            }
        }
        if let Some(slug) = &self.settings.default_invite_chat {
            lookup(&self.chats, slug, || "default_invite_chat".to_string())?;
        }
        for (show, slugs) in &self.now_playing {
            for slug in slugs {
                lookup(&self.chats, slug, || format!("announce.{show}-np"))?;
            }
        }
        Ok(())
    }

    /// Look up a chat by slug (case-insensitive).
    pub fn chat(&self, slug: &str) -> Option<&ChatEntry> {
        self.chats.get(&slug.to_lowercase())
    }

    /// Look up a chat by its Telegram ID.
    pub fn chat_by_id(&self, id: ChatId) -> Option<&ChatEntry> {
        self.chat_slugs_by_id
            .get(&id.0)
            .and_then(|slug| self.chats.get(slug))
    }

    /// Look up a show by slug or alias (case-insensitive).
    pub fn show(&self, key: &str) -> Option<&Show> {
        let key = key.to_lowercase();
        self.shows.get(&key).or_else(|| {
            self.show_aliases
                .get(&key)
                .and_then(|slug| self.shows.get(slug))
        })
    }

    /// Canonical zone name for a configured alias.
    pub fn timezone_alias(&self, alias: &str) -> Option<&str> {
        self.timezones.get(&alias.to_lowercase()).map(String::as_str)
    }

    /// Slugs of the chats administered from `admin_chat`, sorted.
    pub fn managed_chats(&self, admin_chat: ChatId) -> &[String] {
        self.managed_chats
            .get(&admin_chat.0)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The admin chat configured for `chat`, if any.
    pub fn admin_chat_for(&self, chat: ChatId) -> Option<&ChatEntry> {
        self.chat_by_id(chat)
            .and_then(|entry| entry.admin_chat.as_deref())
            .and_then(|slug| self.chat(slug))
    }

    /// The topic approval chat configured for `chat`, if any.
    pub fn topic_approval_chat_for(&self, chat: ChatId) -> Option<&ChatEntry> {
        self.chat_by_id(chat)
            .and_then(|entry| entry.topic_approval_chat.as_deref())
            .and_then(|slug| self.chat(slug))
    }

    /// Chat to use when `/join` is given no argument.
    pub fn default_invite_chat(&self) -> Option<&ChatEntry> {
        self.settings
            .default_invite_chat
            .as_deref()
            .and_then(|slug| self.chat(slug))
    }

    /// Ordered chat IDs of an announce group.
    pub fn announce_group(&self, group: &str) -> Option<&[ChatId]> {
        self.announce.get(group).map(Vec::as_slice)
    }

    /// Chat slugs carrying the now-playing pin for a show.
    pub fn now_playing_chats(&self, show: &str) -> Option<&[String]> {
        self.now_playing.get(show).map(Vec::as_slice)
    }
}

fn lookup<'a>(
    chats: &'a HashMap<String, ChatEntry>,
    slug: &str,
    field: impl FnOnce() -> String,
) -> Result<&'a ChatEntry, ConfigError> {
    chats
        .get(&slug.to_lowercase())
        .ok_or_else(|| ConfigError::UnknownReference {
            field: field(),
            kind: "chat",
            slug: slug.to_string(),
        })
}

fn default_true() -> bool {
    true
}

fn default_join_link_minutes() -> u32 {
    10
}

fn default_rate_limit_template() -> String {
    "Sorry {escaped_fname}, too many people are joining right now.<br>Please try again in a few minutes."
        .to_string()
}

fn default_join_button_text() -> String {
    "Join".to_string()
}

fn default_timezone() -> String {
    "America/New_York".to_string()
}

fn default_nextshow_url() -> String {
    "https://{domain}/nextshow/".to_string()
}
