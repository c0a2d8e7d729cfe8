//! Topic aggregation across subscribers.

use crate::models::User;
use std::collections::HashSet;

/// The distinct, non-empty topics followed by any of `users`.
///
/// Topics are compared as exact strings, so `"AI"` and `"ai"` stay separate
/// searches. Blank topics are dropped.
pub fn aggregate_topics(users: &[User]) -> HashSet<String> {
    users
        .iter()
        .flat_map(|user| user.topics.iter())
        .filter(|topic| !topic.trim().is_empty())
        .cloned()
        .collect()
}
