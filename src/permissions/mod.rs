//! Permission system for checking user roles.
//!
//! Handlers ask two kinds of questions:
//!
//! - "is this user still outside the chat?" for `/join`, and "may this user
//!   still decide?" for the topic approval buttons. Both always hit the API.
//! - "may this user pin / moderate here?" for `/next … pin` and `/topic`,
//!   which are answered from a short-lived cache.
//!
//! ## Usage
//!
//! ```rust,ignore
//! if state.permissions.can_pin_messages(chat_id, user_id).await? {
//!     // ...
//! }
//! ```

mod checker;

pub use checker::{MemberInfo, MemberStatus, Permissions};
