//! Podcast and episode entities
//!
//! These are the authoritative in-memory view of a subscription during a process
//! lifetime. Every mutating operation is flushed to the [`Database`](crate::db::Database)
//! by the caller that holds the podcast's lock.

mod episode;
mod podcast;

pub use episode::Episode;
pub use podcast::{Credentials, Podcast};
