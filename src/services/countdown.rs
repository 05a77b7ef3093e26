//! Next-show countdown pins.
//!
//! `/next <show> pin` starts a job that posts a countdown, quiet-pins it and
//! edits it once a minute. When the show starts the text becomes a
//! "starting" notice, the pin is removed and the job ends.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use teloxide::prelude::*;
use teloxide::types::{MessageId, ParseMode};
use teloxide::{ApiError, RequestError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bot::dispatcher::ThrottledBot;
use crate::config::Show;
use crate::services::showtime::day_prefix;
use crate::utils::{html_escape, no_link_preview};

/// Delay before the first post.
const FIRST_TICK: StdDuration = StdDuration::from_secs(1);
/// Spacing of later edits.
const TICK: StdDuration = StdDuration::from_secs(60);

/// What the pinned message should say at a given moment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountdownStep {
    Remaining(Duration),
    Starting,
}

impl CountdownStep {
    /// The countdown flips to [`CountdownStep::Starting`] exactly at `showtime`.
    pub fn at(showtime: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let remaining = showtime - now;
        if remaining <= Duration::zero() {
            Self::Starting
        } else {
            Self::Remaining(remaining)
        }
    }
}

/// `[N day(s), ][H hour(s), ]M minute(s)`.
///
/// Hours are shown whenever days are, so "1 day, 0 hours, 5 minutes".
pub fn countdown_phrase(remaining: Duration) -> String {
    let days = remaining.num_days();
    let rest = remaining.num_seconds() - days * 86_400;
    let hours = rest / 3600;
    let minutes = (rest / 60) % 60;

    let mut text = day_prefix(days);
    if hours > 0 || days > 0 {
        text.push_str(&format!("{} {}, ", hours, plural(hours, "hour")));
    }
    text.push_str(&format!("{} {}", minutes, plural(minutes, "minute")));
    text
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 { unit.to_string() } else { format!("{unit}s") }
}

fn show_link(show: &Show) -> String {
    format!(
        "<a href='https://{}/'>{}</a>",
        show.domain,
        html_escape(&show.name)
    )
}

/// Full pinned-message text for a step.
pub fn countdown_text(show: &Show, step: &CountdownStep) -> String {
    match step {
        CountdownStep::Starting => format!("{} is starting!", show_link(show)),
        CountdownStep::Remaining(remaining) => {
            format!("{} starts in {}", show_link(show), countdown_phrase(*remaining))
        }
    }
}

/// A running countdown's inputs.
#[derive(Debug, Clone)]
pub struct CountdownJob {
    pub chat_id: ChatId,
    pub show: Show,
    pub showtime: DateTime<Utc>,
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

struct RunningJob {
    id: u64,
    handle: JoinHandle<()>,
}

/// Registry of running countdown jobs, at most one per chat.
///
/// A job removes itself when it finishes.
#[derive(Clone, Default)]
pub struct CountdownJobs {
    jobs: Arc<DashMap<ChatId, RunningJob>>,
    next_id: Arc<AtomicU64>,
}

impl CountdownJobs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a job, replacing any job already running in the same chat.
    /// Returns whether one was replaced.
    pub fn start(&self, bot: ThrottledBot, job: CountdownJob) -> bool {
        let chat_id = job.chat_id;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let jobs = Arc::clone(&self.jobs);

        // The entry stays locked until the job is registered, so a job that
        // finishes at once still finds itself to remove.
        let entry = self.jobs.entry(chat_id);
        let handle = tokio::spawn(async move {
            run_countdown(bot, job).await;
            jobs.remove_if(&chat_id, |_, running| running.id == id);
        });
        let running = RunningJob { id, handle };

        match entry {
            Entry::Occupied(mut occupied) => {
                debug!("Replacing countdown job in chat {}", chat_id);
                let previous = occupied.insert(running);
                let replaced = !previous.handle.is_finished();
                previous.handle.abort();
                replaced
            }
            Entry::Vacant(vacant) => {
                vacant.insert(running);
                false
            }
        }
    }

    #[cfg(test)]
    pub fn is_running(&self, chat_id: ChatId) -> bool {
        self.jobs
            .get(&chat_id)
            .map(|running| !running.handle.is_finished())
            .unwrap_or(false)
    }
}

async fn run_countdown(bot: ThrottledBot, job: CountdownJob) {
    info!(
        "Countdown for {} started in chat {} (show at {})",
        job.show.slug, job.chat_id, job.showtime
    );
    tokio::time::sleep(FIRST_TICK).await;

    let mut ticker = tokio::time::interval(TICK);
    let mut message_id = None;
    loop {
        ticker.tick().await;
        debug!("Running countdown tick for chat {}", job.chat_id);
        match tick(&bot, &job, &mut message_id, Utc::now()).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Stop) => break,
            Err(e) => {
                error!("Countdown job failed in chat {}: {}", job.chat_id, e);
                break;
            }
        }
    }
    info!("Countdown for {} in chat {} finished", job.show.slug, job.chat_id);
}

async fn tick(
    bot: &ThrottledBot,
    job: &CountdownJob,
    message_id: &mut Option<MessageId>,
    now: DateTime<Utc>,
) -> Result<Flow, RequestError> {
    let step = CountdownStep::at(job.showtime, now);
    let text = countdown_text(&job.show, &step);

    if step == CountdownStep::Starting {
        if let Some(mid) = *message_id {
            edit_countdown(bot, job.chat_id, mid, text).await?;
            // Only unpin if our message is still the pinned one.
            let chat = bot.get_chat(job.chat_id).await?;
            if chat.pinned_message.as_ref().map(|m| m.id) == Some(mid) {
                bot.unpin_chat_message(job.chat_id).message_id(mid).await?;
            }
        }
        return Ok(Flow::Stop);
    }

    let Some(mid) = *message_id else {
        let sent = bot
            .send_message(job.chat_id, text)
            .parse_mode(ParseMode::Html)
            .link_preview_options(no_link_preview())
            .await?;
        *message_id = Some(sent.id);
        if let Err(e) = bot
            .pin_chat_message(job.chat_id, sent.id)
            .disable_notification(true)
            .await
        {
            // Usually missing pin rights.
            warn!("Next-show pin failed in {}: {}", job.chat_id, e);
        }
        return Ok(Flow::Continue);
    };

    match edit_countdown(bot, job.chat_id, mid, text).await {
        Ok(()) => Ok(Flow::Continue),
        Err(RequestError::Api(ApiError::MessageToEditNotFound)) => {
            debug!("Countdown message in {} was deleted, stopping", job.chat_id);
            Ok(Flow::Stop)
        }
        Err(e) => Err(e),
    }
}

/// Edit the countdown, treating "not modified" as success.
async fn edit_countdown(
    bot: &ThrottledBot,
    chat_id: ChatId,
    message_id: MessageId,
    text: String,
) -> Result<(), RequestError> {
    match bot
        .edit_message_text(chat_id, message_id, text)
        .parse_mode(ParseMode::Html)
        .link_preview_options(no_link_preview())
        .await
    {
        Ok(_) | Err(RequestError::Api(ApiError::MessageNotModified)) => Ok(()),
        Err(e) => Err(e),
    }
}
