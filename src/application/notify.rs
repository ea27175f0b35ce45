//! User-facing notifications raised by the live channel.

use tracing::{info, warn};

use crate::domain::EventType;
use crate::infra::live::ChannelError;

/// Receives the notifications a session should show its user.
///
/// Called from the channel task; implementations must not block.
pub trait NotificationSink: Send + Sync {
    /// Another actor mutated the collection.
    fn mutation(&self, event_type: EventType, actor_label: &str);

    /// The push channel has been failing for a while. Called once per outage.
    fn channel_unavailable(&self, error: &ChannelError);
}

/// Sink that writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn mutation(&self, event_type: EventType, actor_label: &str) {
        info!(
            target: "leadcast::notify",
            event = event_type.as_str(),
            actor = actor_label,
            "{}",
            event_type.headline(actor_label)
        );
    }

    fn channel_unavailable(&self, error: &ChannelError) {
        warn!(
            target: "leadcast::notify",
            error = %error,
            "Live updates are unavailable; retrying in the background"
        );
    }
}
