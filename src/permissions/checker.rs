//! Permission checker with caching.

use std::time::Duration;

use moka::sync::Cache;
use teloxide::prelude::*;
use teloxide::types::{ChatId, ChatMember, ChatMemberKind, UserId};
use tracing::debug;

/// Coarse membership status of a user in a chat.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberStatus {
    Owner,
    Administrator,
    Member,
    Restricted,
    /// Not a member, but free to join.
    Left,
    Banned,
}

/// Membership and the privileges this bot cares about.
#[derive(Clone, Debug)]
pub struct MemberInfo {
    pub status: MemberStatus,
    pub can_pin_messages: bool,
    pub can_delete_messages: bool,
}

impl MemberInfo {
    /// Create MemberInfo from a ChatMember.
    pub fn from_chat_member(member: &ChatMember) -> Self {
        match &member.kind {
            ChatMemberKind::Owner(_) => Self {
                status: MemberStatus::Owner,
                can_pin_messages: true,
                can_delete_messages: true,
            },
            ChatMemberKind::Administrator(admin) => Self {
                status: MemberStatus::Administrator,
                can_pin_messages: admin.can_pin_messages,
                can_delete_messages: admin.can_delete_messages,
            },
            ChatMemberKind::Left => Self::plain(MemberStatus::Left),
            ChatMemberKind::Banned(_) => Self::plain(MemberStatus::Banned),
            ChatMemberKind::Restricted(_) => Self::plain(MemberStatus::Restricted),
            _ => Self::plain(MemberStatus::Member),
        }
    }

    fn plain(status: MemberStatus) -> Self {
        Self {
            status,
            can_pin_messages: false,
            can_delete_messages: false,
        }
    }

    /// Only a user who has left may be invited.
    /// Banned users are excluded here too.
    pub fn may_be_invited(&self) -> bool {
        self.status == MemberStatus::Left
    }

    /// Owner, or an admin allowed to delete messages.
    ///
    /// Chat operators get `can_delete_messages` rather than `can_change_info`,
    /// so that is the bar for topic changes and approvals.
    pub fn can_moderate(&self) -> bool {
        self.status == MemberStatus::Owner
            || (self.status == MemberStatus::Administrator && self.can_delete_messages)
    }

    pub fn can_pin(&self) -> bool {
        self.status == MemberStatus::Owner || self.can_pin_messages
    }
}

/// Cache key for member lookups.
type MemberCacheKey = (i64, u64); // (chat_id, user_id)

/// Permission checker with caching support.
#[derive(Clone)]
pub struct Permissions {
    bot: Bot,
    cache: Cache<MemberCacheKey, MemberInfo>,
}

impl Permissions {
    pub fn new(bot: Bot) -> Self {
        let cache = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(Duration::from_secs(120))
            .build();

        Self { bot, cache }
    }

    /// Get member info for a user in a chat, from cache when possible.
    pub async fn member(&self, chat_id: ChatId, user_id: UserId) -> anyhow::Result<MemberInfo> {
        let cache_key = (chat_id.0, user_id.0);

        if let Some(cached) = self.cache.get(&cache_key) {
            debug!("Member cache hit for user {} in chat {}", user_id, chat_id);
            return Ok(cached);
        }

        debug!("Member cache miss for user {} in chat {}", user_id, chat_id);
        let info = self.fresh_member(chat_id, user_id).await?;
        self.cache.insert(cache_key, info.clone());
        Ok(info)
    }

    /// Fetch member info straight from Telegram, refreshing the cache.
    pub async fn fresh_member(&self, chat_id: ChatId, user_id: UserId) -> anyhow::Result<MemberInfo> {
        let member = self.bot.get_chat_member(chat_id, user_id).await?;
        let info = MemberInfo::from_chat_member(&member);
        self.cache.insert((chat_id.0, user_id.0), info.clone());
        Ok(info)
    }

    /// Check if a user can pin messages.
    pub async fn can_pin_messages(&self, chat_id: ChatId, user_id: UserId) -> anyhow::Result<bool> {
        Ok(self.member(chat_id, user_id).await?.can_pin())
    }

    /// Check if a user can moderate (change topics, approve proposals).
    pub async fn can_moderate(&self, chat_id: ChatId, user_id: UserId) -> anyhow::Result<bool> {
        Ok(self.member(chat_id, user_id).await?.can_moderate())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(status: MemberStatus, pin: bool, delete: bool) -> MemberInfo {
        MemberInfo {
            status,
            can_pin_messages: pin,
            can_delete_messages: delete,
        }
    }

    #[test]
    fn test_only_left_users_may_be_invited() {
        assert!(info(MemberStatus::Left, false, false).may_be_invited());
        assert!(!info(MemberStatus::Banned, false, false).may_be_invited());
        assert!(!info(MemberStatus::Member, false, false).may_be_invited());
        assert!(!info(MemberStatus::Restricted, false, false).may_be_invited());
    }

    #[test]
    fn test_moderation_needs_owner_or_deleting_admin() {
        assert!(info(MemberStatus::Owner, false, false).can_moderate());
        assert!(info(MemberStatus::Administrator, false, true).can_moderate());
        assert!(!info(MemberStatus::Administrator, true, false).can_moderate());
        assert!(!info(MemberStatus::Member, false, true).can_moderate());
    }

    #[test]
    fn test_owner_can_always_pin() {
        assert!(info(MemberStatus::Owner, false, false).can_pin());
        assert!(info(MemberStatus::Administrator, true, false).can_pin());
        assert!(!info(MemberStatus::Administrator, false, true).can_pin());
    }
}
