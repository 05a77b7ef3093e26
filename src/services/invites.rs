//! Invite link bookkeeping.
//!
//! The Bot API cannot list the links a bot has created, so every per-user
//! link is tracked here until it is used, revoked or expires. Links are tied
//! to one user through their name, `"<user id> <@username or full name>"`.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use serde::Deserialize;
use teloxide::RequestError;
use teloxide::prelude::*;
use teloxide::types::{ChatId, ChatInviteLink, User, UserId};
use tracing::debug;

use crate::bot::dispatcher::ThrottledBot;
use crate::utils::format_username;

/// Telegram caps invite link names at 32 characters.
const LINK_NAME_MAX_CHARS: usize = 32;

/// A link this bot issued (or was told about).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedLink {
    pub url: String,
    pub chat_id: ChatId,
    /// `None` for links that never expire, like a seeded primary link.
    pub expires_at: Option<DateTime<Utc>>,
}

impl TrackedLink {
    pub fn new(url: impl Into<String>, chat_id: ChatId) -> Self {
        Self {
            url: url.into(),
            chat_id,
            expires_at: None,
        }
    }

    pub fn expiring(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    fn same_link(&self, other: &TrackedLink) -> bool {
        self.url == other.url && self.chat_id == other.chat_id
    }
}

/// In-memory list of issued invite links.
///
/// Expired links are dropped whenever the list is touched.
#[derive(Clone, Default)]
pub struct InviteTracker {
    links: Arc<Mutex<Vec<TrackedLink>>>,
}

impl InviteTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn live(&self, now: DateTime<Utc>) -> MutexGuard<'_, Vec<TrackedLink>> {
        let mut links = self.links.lock();
        let before = links.len();
        links.retain(|l| !l.is_expired(now));
        if links.len() < before {
            debug!("Dropped {} expired invite links", before - links.len());
        }
        links
    }

    pub fn track(&self, link: TrackedLink) {
        let now = Utc::now();
        let mut links = self.live(now);
        if !link.is_expired(now) {
            links.push(link);
        }
        debug!("Tracking {} invite links", links.len());
    }

    /// Forget one (link, chat) pair. Returns whether it was tracked.
    pub fn forget(&self, link: &TrackedLink) -> bool {
        let mut links = self.live(Utc::now());
        match links.iter().position(|l| l.same_link(link)) {
            Some(index) => {
                links.remove(index);
                true
            }
            None => false,
        }
    }

    /// Remove and return every live tracked link for a chat.
    pub fn take_for_chat(&self, chat_id: ChatId) -> Vec<TrackedLink> {
        let mut links = self.live(Utc::now());
        let (taken, kept): (Vec<_>, Vec<_>) = links.drain(..).partition(|l| l.chat_id == chat_id);
        *links = kept;
        taken
    }

    /// Drop links that expired by `now`. Returns how many are left.
    #[cfg(test)]
    pub fn prune_expired(&self, now: DateTime<Utc>) -> usize {
        self.live(now).len()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.live(Utc::now()).len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Deserialize)]
struct RevokeReply {
    result: ChatInviteLink,
}

/// Revoke an invite link. Returns whether Telegram reports it revoked.
pub async fn revoke_link(bot: &ThrottledBot, link: &TrackedLink) -> Result<bool, RequestError> {
    revocation_outcome(
        bot.revoke_chat_invite_link(link.chat_id, link.url.clone())
            .await,
    )
}

/// teloxide types `revokeChatInviteLink` as returning a string, but Telegram
/// sends the revoked `ChatInviteLink`. That reply fails to decode, so the
/// link is read back out of the raw body.
fn revocation_outcome(result: Result<String, RequestError>) -> Result<bool, RequestError> {
    match result {
        Ok(_) => Ok(true),
        Err(RequestError::InvalidJson { source, raw }) => {
            match serde_json::from_str::<RevokeReply>(&raw) {
                Ok(reply) => Ok(reply.result.is_revoked),
                Err(_) => Err(RequestError::InvalidJson { source, raw }),
            }
        }
        Err(e) => Err(e),
    }
}

/// Join was refused because the chat's cooldown has not elapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CooldownActive {
    pub remaining: Duration,
}

/// Per-chat join rate limiting.
///
/// Remembers the time of the last permitted join for each chat.
/// A chat with no recorded join behaves as if the last join was at the epoch.
#[derive(Clone, Default)]
pub struct JoinCooldown {
    last_join: Arc<DashMap<ChatId, DateTime<Utc>>>,
}

impl JoinCooldown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Permit a join at `now` unless the previous permitted join was less
    /// than `delay` ago. A permitted join becomes the new reference point.
    ///
    /// A zero delay never refuses.
    pub fn try_admit(
        &self,
        chat_id: ChatId,
        delay: Duration,
        now: DateTime<Utc>,
    ) -> Result<(), CooldownActive> {
        let mut last = self.last_join.entry(chat_id).or_insert(DateTime::<Utc>::UNIX_EPOCH);
        let elapsed = now - *last;
        if delay > Duration::zero() && elapsed < delay {
            return Err(CooldownActive {
                remaining: delay - elapsed,
            });
        }
        *last = now;
        Ok(())
    }

    #[cfg(test)]
    pub fn last_join(&self, chat_id: ChatId) -> Option<DateTime<Utc>> {
        self.last_join.get(&chat_id).map(|t| *t)
    }
}

/// Name for a single-user invite link.
pub fn link_name(user: &User) -> String {
    format!("{} {}", user.id, format_username(user))
        .chars()
        .take(LINK_NAME_MAX_CHARS)
        .collect()
}

/// The user a link was issued to, parsed from its name.
pub fn link_owner(name: &str) -> Option<UserId> {
    name.split_whitespace()
        .next()
        .and_then(|id| id.parse::<u64>().ok())
        .map(UserId)
}

/// Expiry for a new link. Telegram wants at least a few seconds of lifetime,
/// hence the extra 5 seconds.
pub fn link_expiry(now: DateTime<Utc>, valid_minutes: u32) -> DateTime<Utc> {
    now + Duration::minutes(i64::from(valid_minutes)) + Duration::seconds(5)
}

/// What to do with a join request made through one of our links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinVerdict {
    Approve,
    Decline,
}

/// Approve only when the link was issued to the requesting user.
pub fn judge_join_request(link_name: Option<&str>, requester: UserId) -> JoinVerdict {
    match link_name.and_then(link_owner) {
        Some(owner) if owner == requester => JoinVerdict::Approve,
        _ => JoinVerdict::Decline,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap()
    }

    #[test]
    fn test_cooldown_refuses_inside_window() {
        let cooldown = JoinCooldown::new();
        let chat = ChatId(-100);
        let delay = Duration::minutes(5);

        assert!(cooldown.try_admit(chat, delay, at(0)).is_ok());
        let refused = cooldown.try_admit(chat, delay, at(3)).unwrap_err();
        assert_eq!(refused.remaining, Duration::minutes(2));
        // A refusal does not move the reference point.
        assert_eq!(cooldown.last_join(chat), Some(at(0)));
        assert!(cooldown.try_admit(chat, delay, at(5)).is_ok());
        assert_eq!(cooldown.last_join(chat), Some(at(5)));
    }

    #[test]
    fn test_cooldown_is_per_chat() {
        let cooldown = JoinCooldown::new();
        let delay = Duration::minutes(5);

        assert!(cooldown.try_admit(ChatId(1), delay, at(0)).is_ok());
        assert!(cooldown.try_admit(ChatId(2), delay, at(1)).is_ok());
        assert!(cooldown.try_admit(ChatId(1), delay, at(1)).is_err());
    }

    #[test]
    fn test_zero_delay_never_refuses() {
        let cooldown = JoinCooldown::new();
        let chat = ChatId(7);

        assert!(cooldown.try_admit(chat, Duration::zero(), at(0)).is_ok());
        assert!(cooldown.try_admit(chat, Duration::zero(), at(0)).is_ok());
    }

    #[test]
    fn test_take_for_chat_removes_only_that_chat() {
        let tracker = InviteTracker::new();
        tracker.track(TrackedLink::new("https://t.me/+a", ChatId(1)));
        tracker.track(TrackedLink::new("https://t.me/+b", ChatId(2)));
        tracker.track(TrackedLink::new("https://t.me/+c", ChatId(1)));

        let taken = tracker.take_for_chat(ChatId(1));

        assert_eq!(taken.len(), 2);
        assert_eq!(tracker.len(), 1);
        assert_eq!(
            tracker.take_for_chat(ChatId(2)),
            vec![TrackedLink::new("https://t.me/+b", ChatId(2))]
        );
    }

    #[test]
    fn test_expired_link_leaves_the_list() {
        let tracker = InviteTracker::new();
        let issued = Utc::now() - Duration::hours(3);
        tracker.track(
            TrackedLink::new("https://t.me/+old", ChatId(1)).expiring(link_expiry(issued, 10)),
        );
        tracker.track(
            TrackedLink::new("https://t.me/+new", ChatId(1))
                .expiring(link_expiry(Utc::now(), 10)),
        );
        tracker.track(TrackedLink::new("https://t.me/+primary", ChatId(1)));

        assert_eq!(tracker.len(), 2);
        let urls: Vec<_> = tracker.take_for_chat(ChatId(1)).into_iter().map(|l| l.url).collect();
        assert_eq!(urls, ["https://t.me/+new", "https://t.me/+primary"]);
    }

    #[test]
    fn test_prune_drops_links_at_their_expiry() {
        let tracker = InviteTracker::new();
        let far = Utc::now() + Duration::days(1);
        tracker.track(TrackedLink::new("https://t.me/+a", ChatId(1)).expiring(far));
        tracker.track(TrackedLink::new("https://t.me/+b", ChatId(1)));

        assert_eq!(tracker.prune_expired(far - Duration::seconds(1)), 2);
        assert_eq!(tracker.prune_expired(far), 1);
    }

    #[test]
    fn test_forget_ignores_expiry() {
        let tracker = InviteTracker::new();
        let link = TrackedLink::new("https://t.me/+a", ChatId(1))
            .expiring(Utc::now() + Duration::minutes(10));
        tracker.track(link);

        assert!(tracker.forget(&TrackedLink::new("https://t.me/+a", ChatId(1))));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_forget_requires_matching_chat() {
        let tracker = InviteTracker::new();
        tracker.track(TrackedLink::new("https://t.me/+a", ChatId(1)));

        assert!(!tracker.forget(&TrackedLink::new("https://t.me/+a", ChatId(2))));
        assert_eq!(tracker.len(), 1);
        assert!(tracker.forget(&TrackedLink::new("https://t.me/+a", ChatId(1))));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_link_expiry_adds_grace_seconds() {
        let expiry = link_expiry(at(0), 10);
        assert_eq!(expiry - at(0), Duration::seconds(605));
    }

    #[test]
    fn test_judge_join_request() {
        let me = UserId(4242);

        assert_eq!(judge_join_request(Some("4242 @fox"), me), JoinVerdict::Approve);
        assert_eq!(judge_join_request(Some("4243 @fox"), me), JoinVerdict::Decline);
        assert_eq!(judge_join_request(Some("garbage"), me), JoinVerdict::Decline);
        assert_eq!(judge_join_request(None, me), JoinVerdict::Decline);
    }

    #[test]
    fn test_revocation_outcome_reads_raw_link() {
        let raw = serde_json::json!({
            "ok": true,
            "result": crate::bot::mock_api::invite_link("https://t.me/+a", "1 @fox", true)
        })
        .to_string();
        let source = serde_json::from_str::<String>(&raw).unwrap_err();

        let outcome = revocation_outcome(Err(RequestError::InvalidJson {
            source: std::sync::Arc::new(source),
            raw: raw.into(),
        }));
        assert!(outcome.unwrap());
    }

    #[test]
    fn test_revocation_outcome_keeps_undecodable_errors() {
        let source = serde_json::from_str::<String>("nope").unwrap_err();
        let outcome = revocation_outcome(Err(RequestError::InvalidJson {
            source: std::sync::Arc::new(source),
            raw: "nope".into(),
        }));
        assert!(matches!(outcome, Err(RequestError::InvalidJson { .. })));
    }

    #[tokio::test]
    async fn test_revoke_link_against_bot_api() {
        use crate::bot::mock_api::{MockApi, invite_link};

        let api = MockApi::start().await;
        api.reply(
            "RevokeChatInviteLink",
            invite_link("https://t.me/+a", "1 @fox", true),
        );
        let link = TrackedLink::new("https://t.me/+a", ChatId(-100));

        assert!(revoke_link(&api.bot(), &link).await.unwrap());
        let body = &api.bodies("RevokeChatInviteLink")[0];
        assert_eq!(body["invite_link"], "https://t.me/+a");
        assert_eq!(body["chat_id"], -100);

        api.fail("RevokeChatInviteLink", "Bad Request: INVITE_HASH_EXPIRED");
        // Queued replies are served in order; the failure comes second.
        assert!(revoke_link(&api.bot(), &link).await.unwrap());
        assert!(revoke_link(&api.bot(), &link).await.is_err());
    }
}
