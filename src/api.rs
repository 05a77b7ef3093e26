//! HTTP announcement API.
//!
//! `POST /announce` with an `apikey` (query or form field) and either
//! `group` (+ `message`, `pin`, `notify`, `forward`) to post to an announce
//! group, or `title` + `show` to update a show's now-playing pin.

use std::sync::Arc;

use axum::extract::rejection::{FormRejection, QueryRejection};
use axum::extract::{Form, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::bot::dispatcher::ThrottledBot;
use crate::config::Community;
use crate::services::announce::{self, AnnounceError, PinRequest};

/// State shared by the API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub bot: ThrottledBot,
    pub community: Arc<Community>,
    /// Requests are refused when unset.
    pub api_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct KeyQuery {
    pub apikey: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AnnounceForm {
    pub apikey: Option<String>,
    pub group: Option<String>,
    pub message: Option<String>,
    pub pin: Option<String>,
    pub notify: Option<String>,
    pub forward: Option<String>,
    pub title: Option<String>,
    pub show: Option<String>,
}

/// `"true"`/`"1"` and `"false"`/`"0"`; anything else is unset.
pub fn parse_flag(value: Option<&str>) -> Option<bool> {
    match value? {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

impl AnnounceForm {
    pub fn pin_request(&self, group: &str) -> PinRequest {
        PinRequest {
            group: group.to_string(),
            message: self.message.clone(),
            pin: parse_flag(self.pin.as_deref()),
            notify: parse_flag(self.notify.as_deref()) == Some(true),
            forward: parse_flag(self.forward.as_deref()) == Some(true),
        }
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/announce", post(announce_handler))
        .with_state(state)
}

async fn announce_handler(
    State(state): State<ApiState>,
    query: Result<Query<KeyQuery>, QueryRejection>,
    form: Result<Form<AnnounceForm>, FormRejection>,
) -> Response {
    let query = query.ok().map(|Query(q)| q).unwrap_or_default();
    let form = form.ok().map(|Form(f)| f).unwrap_or_default();

    let authorized = state.api_key.as_deref().is_some_and(|key| {
        query.apikey.as_deref() == Some(key) || form.apikey.as_deref() == Some(key)
    });
    if !authorized {
        error!("Incorrect apikey");
        return StatusCode::NOT_FOUND.into_response();
    }

    let result = if let Some(title) = &form.title {
        let show = form.show.as_deref().unwrap_or_default();
        announce::post_now_playing(&state.bot, &state.community, title, show).await
    } else {
        let group = form.group.as_deref().unwrap_or_default();
        info!("Announce request for group {:?}", group);
        announce::post_pin(&state.bot, &state.community, &form.pin_request(group)).await
    };

    match result {
        Ok(()) => (StatusCode::OK, Json(json!({"status": "OK"}))).into_response(),
        Err(e) => error_response(e),
    }
}

fn error_response(e: AnnounceError) -> Response {
    let (status, body) = match &e {
        AnnounceError::UnknownGroup(_) => (
            StatusCode::BAD_REQUEST,
            json!({"status": "Error", "message": e.to_string()}),
        ),
        AnnounceError::UnknownShow(_) => (
            StatusCode::NOT_FOUND,
            json!({"status": "Error", "error": e.to_string()}),
        ),
        AnnounceError::NoNowPlayingChats(_) | AnnounceError::NotMyPin(_) => (
            StatusCode::OK,
            json!({"status": "Error", "error": e.to_string()}),
        ),
        AnnounceError::Telegram(_) => {
            error!("Announcement failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"status": "Error", "error": e.to_string()}),
            )
        }
    };
    (status, Json(body)).into_response()
}
