//! Stateful services and the domain logic shared by handlers and the HTTP API.

pub mod announce;
pub mod countdown;
pub mod invites;
pub mod showtime;

pub use countdown::CountdownJobs;
pub use invites::{InviteTracker, JoinCooldown, TrackedLink};
