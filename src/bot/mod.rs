//! Bot module - Core bot functionality.

pub mod dispatcher;
#[cfg(test)]
pub(crate) mod mock_api;
mod runtime;
pub mod webhook;

pub use dispatcher::{AppState, ThrottledBot, build_dispatcher};
pub use runtime::run;
