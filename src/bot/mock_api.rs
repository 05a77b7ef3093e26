//! Local stand-in for the Telegram Bot API, for driving handlers in tests.
//!
//! Every call is recorded. Replies are queued per method; the last queued
//! reply for a method repeats, and methods with nothing queued get `true`.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::Uri;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{Value, json};
use teloxide::adaptors::throttle::Limits;
use teloxide::prelude::*;

use crate::bot::dispatcher::ThrottledBot;

pub const BOT_ID: u64 = 100;

/// One recorded request.
#[derive(Debug, Clone)]
pub struct Call {
    pub method: String,
    pub body: Value,
}

#[derive(Clone, Default)]
struct Shared {
    calls: Arc<Mutex<Vec<Call>>>,
    replies: Arc<Mutex<HashMap<String, VecDeque<Value>>>>,
}

pub struct MockApi {
    shared: Shared,
    url: url::Url,
}

impl MockApi {
    pub async fn start() -> Self {
        let shared = Shared::default();
        let app = Router::new().fallback(handle).with_state(shared.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock Bot API");
        let addr = listener.local_addr().expect("Mock Bot API has no address");
        tokio::spawn(async move { axum::serve(listener, app).await });

        let url = url::Url::parse(&format!("http://{addr}/")).expect("Invalid mock Bot API URL");
        Self { shared, url }
    }

    pub fn bot(&self) -> ThrottledBot {
        Bot::new("123456:TEST")
            .set_api_url(self.url.clone())
            .throttle(Limits::default())
    }

    /// Queue a successful result for `method` (e.g. `"SendMessage"`).
    pub fn reply(&self, method: &str, result: Value) {
        self.queue(method, json!({"ok": true, "result": result}));
    }

    /// Queue an API error with Telegram's description text.
    pub fn fail(&self, method: &str, description: &str) {
        self.queue(
            method,
            json!({"ok": false, "error_code": 400, "description": description}),
        );
    }

    fn queue(&self, method: &str, reply: Value) {
        self.shared
            .replies
            .lock()
            .entry(method.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Names of the methods called, in order.
    pub fn methods(&self) -> Vec<String> {
        self.shared
            .calls
            .lock()
            .iter()
            .map(|c| c.method.clone())
            .collect()
    }

    /// Request bodies sent to `method`, in order.
    pub fn bodies(&self, method: &str) -> Vec<Value> {
        self.shared
            .calls
            .lock()
            .iter()
            .filter(|c| c.method == method)
            .map(|c| c.body.clone())
            .collect()
    }
}

async fn handle(State(shared): State<Shared>, uri: Uri, body: Bytes) -> Json<Value> {
    let method = uri.path().rsplit('/').next().unwrap_or_default().to_string();
    let body = serde_json::from_slice(&body).unwrap_or(Value::Null);
    shared.calls.lock().push(Call {
        method: method.clone(),
        body,
    });

    let mut replies = shared.replies.lock();
    let reply = match replies.get_mut(&method) {
        Some(queue) if queue.len() > 1 => queue.pop_front(),
        Some(queue) => queue.front().cloned(),
        None => None,
    };
    Json(reply.unwrap_or_else(|| json!({"ok": true, "result": true})))
}

pub fn user(id: u64, first_name: &str) -> Value {
    json!({"id": id, "is_bot": id == BOT_ID, "first_name": first_name})
}

pub fn chat(chat_id: i64, pinned: Option<Value>) -> Value {
    let mut chat = json!({"id": chat_id, "type": "supergroup", "title": "Test chat", "max_reaction_count": 0});
    if let Some(pinned) = pinned {
        chat["pinned_message"] = pinned;
    }
    chat
}

pub fn message(chat_id: i64, message_id: i32) -> Value {
    json!({
        "message_id": message_id,
        "date": 1_700_000_000,
        "chat": chat(chat_id, None),
        "from": user(BOT_ID, "Bot"),
        "text": "text"
    })
}

pub fn invite_link(url: &str, name: &str, revoked: bool) -> Value {
    json!({
        "invite_link": url,
        "creator": user(BOT_ID, "Bot"),
        "creates_join_request": true,
        "is_primary": false,
        "is_revoked": revoked,
        "name": name
    })
}
