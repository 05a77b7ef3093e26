//! Chat topic changes with an approval workflow.
//!
//! The topic is the part of the chat title after `" – "`. Moderators change
//! it directly; everyone else gets an Accept/Reject proposal posted to the
//! chat's approval chat.

use teloxide::prelude::*;
use teloxide::types::{
    InlineKeyboardButton, InlineKeyboardMarkup, MaybeInaccessibleMessage, MessageId, ParseMode,
    ReplyParameters,
};
use teloxide::utils::render::RenderMessageTextHelper;
use tracing::{debug, error, info, warn};

use crate::bot::dispatcher::{AppState, ThrottledBot};
use crate::utils::{format_username, html_escape, mention_html};

/// Separator between the base chat title and the topic.
pub const TOPIC_SEPARATOR: &str = " – ";

/// Telegram's limit on callback data.
pub const CALLBACK_DATA_MAX: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicAction {
    Accept,
    Reject,
}

impl TopicAction {
    fn tag(self) -> &'static str {
        match self {
            Self::Accept => "ta",
            Self::Reject => "tr",
        }
    }
}

/// A topic proposal, as carried in button callback data:
/// `ta|tr,<chat id>,<user id>,<message id>,<topic>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRequest {
    pub action: TopicAction,
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub message_id: MessageId,
    pub topic: String,
}

impl TopicRequest {
    pub fn encode(&self) -> String {
        format!(
            "{},{},{},{},{}",
            self.action.tag(),
            self.chat_id.0,
            self.user_id.0,
            self.message_id.0,
            self.topic
        )
    }

    /// The topic is last, so it may itself contain commas.
    pub fn parse(data: &str) -> Option<Self> {
        let mut parts = data.splitn(5, ',');
        let action = match parts.next()? {
            "ta" => TopicAction::Accept,
            "tr" => TopicAction::Reject,
            _ => return None,
        };
        Some(Self {
            action,
            chat_id: ChatId(parts.next()?.parse().ok()?),
            user_id: UserId(parts.next()?.parse().ok()?),
            message_id: MessageId(parts.next()?.parse().ok()?),
            topic: parts.next()?.to_string(),
        })
    }

    pub fn with_action(&self, action: TopicAction) -> Self {
        Self {
            action,
            ..self.clone()
        }
    }
}

/// The topic asked for; `-`, `-delete` and `""` clear it.
pub fn requested_topic(arg: &str) -> String {
    let arg = arg.trim();
    match arg.to_lowercase().as_str() {
        "-" | "-delete" | "\"\"" => String::new(),
        _ => arg.to_string(),
    }
}

/// New chat title: the current base title plus the topic, if any.
pub fn compose_title(current: &str, topic: &str) -> String {
    let base = current.split(TOPIC_SEPARATOR).next().unwrap_or_default();
    let topic = topic.trim();
    if topic.is_empty() {
        base.to_string()
    } else {
        format!("{base}{TOPIC_SEPARATOR}{topic}")
    }
}

/// Who may press a topic button.
///
/// The requester may withdraw (reject) their own proposal. Moderators of the
/// target chat may do anything, and so may anyone pressing the button inside
/// a separate approval chat.
pub fn may_decide(
    request: &TopicRequest,
    presser: UserId,
    presser_moderates: bool,
    pressed_in: ChatId,
    approval_chat: Option<ChatId>,
) -> bool {
    (presser == request.user_id && request.action == TopicAction::Reject)
        || presser_moderates
        || (pressed_in != request.chat_id && Some(pressed_in) == approval_chat)
}

/// Handle /topic command.
pub async fn topic_command(
    bot: ThrottledBot,
    msg: Message,
    state: AppState,
    args: String,
) -> anyhow::Result<()> {
    handle_topic(bot, msg, state, args, false).await
}

/// Handle /stopic command - like /topic, but deletes the command message.
pub async fn stopic_command(
    bot: ThrottledBot,
    msg: Message,
    state: AppState,
    args: String,
) -> anyhow::Result<()> {
    handle_topic(bot, msg, state, args, true).await
}

async fn handle_topic(
    bot: ThrottledBot,
    msg: Message,
    state: AppState,
    args: String,
    silent: bool,
) -> anyhow::Result<()> {
    let chat_id = msg.chat.id;
    let command = if silent { "/stopic" } else { "/topic" };

    if msg.chat.is_private() {
        bot.send_message(chat_id, "Sorry, that only works in groups.")
            .reply_parameters(ReplyParameters::new(msg.id))
            .await?;
        return Ok(());
    }
    if args.trim().is_empty() {
        bot.send_message(
            chat_id,
            format!(
                "Try e.g. <code>{command} Not My Cup Of Legs</code> to suggest \
                 a chat topic, or <code>{command} -</code> to clear"
            ),
        )
        .parse_mode(ParseMode::Html)
        .reply_parameters(ReplyParameters::new(msg.id))
        .await?;
        return Ok(());
    }
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };

    let requested = requested_topic(&args);
    let chat = state.community.chat_by_id(chat_id);
    let slug = chat.map(|c| c.slug.as_str()).unwrap_or("?");
    let approval_chat = state.community.topic_approval_chat_for(chat_id);
    let approval_required = chat.map(|c| c.topic_approval_required).unwrap_or(true);

    let moderates = state
        .permissions
        .can_moderate(chat_id, user.id)
        .await
        .unwrap_or(false);

    let link = msg.url().map(|u| u.to_string()).unwrap_or_default();

    if !approval_required || moderates {
        info!(
            "{}: {} set topic {:?}",
            msg.chat.title().unwrap_or_default(),
            format_username(user),
            requested
        );
        if silent && let Err(e) = bot.delete_message(chat_id, msg.id).await {
            warn!("stopic message delete failed in {}: {}", chat_id, e);
        }
        set_topic(&bot, chat_id, msg.chat.title().unwrap_or_default(), &requested).await;

        if let Some(approval) = approval_chat {
            bot.send_message(
                approval.chat_id(),
                format!(
                    "<b>{}</b>: {} <a href=\"{}\">set</a> topic \"{}\"\n",
                    slug,
                    mention_html(user),
                    link,
                    html_escape(&requested)
                ),
            )
            .parse_mode(ParseMode::Html)
            .disable_notification(true)
            .await?;
        }
        return Ok(());
    }

    let Some(approval) = approval_chat else {
        debug!("Topic change in {} needs approval but no approval chat is set", chat_id);
        return Ok(());
    };

    let accept = TopicRequest {
        action: TopicAction::Accept,
        chat_id,
        user_id: user.id,
        message_id: msg.id,
        topic: requested.clone(),
    };
    let reject = accept.with_action(TopicAction::Reject);
    let (accept_data, reject_data) = (accept.encode(), reject.encode());
    if accept_data.len() > CALLBACK_DATA_MAX {
        bot.send_message(chat_id, "Sorry, that's too long.")
            .reply_parameters(ReplyParameters::new(msg.id))
            .await?;
        return Ok(());
    }

    let keyboard = InlineKeyboardMarkup::new([[
        InlineKeyboardButton::callback("Accept", accept_data),
        InlineKeyboardButton::callback("Reject", reject_data),
    ]]);
    bot.send_message(
        approval.chat_id(),
        format!(
            "<b>{}</b>: {} <a href=\"{}\">proposed</a> topic \"{}\"\n\
             Admins can accept, admins or op can reject:",
            slug,
            mention_html(user),
            link,
            html_escape(&requested)
        ),
    )
    .parse_mode(ParseMode::Html)
    .reply_markup(keyboard)
    .disable_notification(true)
    .await?;

    if approval.chat_id() != chat_id {
        bot.send_message(chat_id, format!("Requested topic \"{}\"", requested))
            .reply_parameters(ReplyParameters::new(msg.id))
            .await?;
    }
    Ok(())
}

/// Apply a topic. A refused title change is only logged.
async fn set_topic(bot: &ThrottledBot, chat_id: ChatId, current_title: &str, topic: &str) {
    let title = compose_title(current_title, topic);
    info!("{}: Setting topic {:?}", chat_id, topic);
    if let Err(e) = bot.set_chat_title(chat_id, title).await {
        warn!("Title change failed in {}: {}", chat_id, e);
    }
}

/// Handle Accept/Reject button presses.
pub async fn topic_callback(
    bot: ThrottledBot,
    q: CallbackQuery,
    state: AppState,
) -> anyhow::Result<()> {
    let Some(request) = q.data.as_deref().and_then(TopicRequest::parse) else {
        error!("Button didn't understand callback: {:?}", q.data);
        bot.answer_callback_query(q.id.clone()).await?;
        return Ok(());
    };
    let Some(message) = q.message.as_ref() else {
        bot.answer_callback_query(q.id.clone()).await?;
        return Ok(());
    };
    let pressed_in = message.chat().id;

    // Rights are re-checked on every press; a demoted admin can't approve.
    let moderates = state
        .permissions
        .fresh_member(request.chat_id, q.from.id)
        .await
        .map(|member| member.can_moderate())
        .unwrap_or(false);
    let approval_chat = state
        .community
        .topic_approval_chat_for(request.chat_id)
        .map(|c| c.chat_id());

    if !may_decide(&request, q.from.id, moderates, pressed_in, approval_chat) {
        bot.answer_callback_query(q.id.clone()).text("Nice try").await?;
        return Ok(());
    }
    debug!(
        "{} pressed {:?} ({} bytes) in {}",
        format_username(&q.from),
        request.action,
        request.encode().len(),
        pressed_in
    );

    let verdict = match request.action {
        TopicAction::Accept => {
            let target = bot.get_chat(request.chat_id).await?;
            set_topic(&bot, request.chat_id, target.title().unwrap_or_default(), &request.topic).await;
            if Some(request.chat_id) != approval_chat {
                bot.send_message(request.chat_id, "Accepted!")
                    .reply_parameters(ReplyParameters::new(request.message_id))
                    .await?;
            }
            bot.answer_callback_query(q.id.clone()).text("Accepted").await?;
            "Approved by"
        }
        TopicAction::Reject => {
            bot.answer_callback_query(q.id.clone()).text("Rejected").await?;
            "Rejected by"
        }
    };

    if let MaybeInaccessibleMessage::Regular(proposal) = message {
        let body = proposal
            .html_text()
            .unwrap_or_else(|| html_escape(proposal.text().unwrap_or_default()));
        bot.edit_message_text(
            proposal.chat.id,
            proposal.id,
            format!("{}\n{} {}", body, verdict, mention_html(&q.from)),
        )
        .parse_mode(ParseMode::Html)
        .await?;
    }
    Ok(())
}
