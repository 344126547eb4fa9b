//! Client-side id generation.
//!
//! User identity is claimed, not arbitrated (see the engine docs): the id
//! is derived from the display name plus a timestamp/random suffix and
//! trusted to be unique. Group and expense ids are plain UUIDs.

use chrono::{DateTime, Utc};
use rand::Rng;
use uuid::Uuid;

/// Generate a user id from a display name: up to eight alphanumeric
/// characters of the lowercased name, the last four digits of the
/// epoch-millis timestamp, and two random decimal digits.
pub fn generate_user_id(name: &str, now: DateTime<Utc>) -> String {
    let clean: String = name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(8)
        .collect();
    let slug = if clean.is_empty() { "user" } else { &clean };

    let millis = now.timestamp_millis().to_string();
    let tail = &millis[millis.len().saturating_sub(4)..];
    let random: u32 = rand::thread_rng().gen_range(0..100);

    format!("{slug}{tail}{random:02}")
}

/// Generate an id for a new group or expense.
pub fn new_entity_id() -> String {
    Uuid::new_v4().to_string()
}
