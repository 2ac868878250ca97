use std::fmt;

use serde::{Deserialize, Serialize};

/// Deduplication key of an inbound event.
///
/// Slack message timestamps are unique within a channel, so the channel id is
/// folded in to keep keys unique across channels.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

impl EventId {
    pub fn for_message(channel_id: &str, ts: &str) -> Self {
        Self(format!("{channel_id}:{ts}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
