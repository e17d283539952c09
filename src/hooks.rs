//! Live-processing extension point for messages on armed channels.

use crate::InboundMessage;

/// Observes every message that reaches an activated ticket channel, whether
/// it armed the channel or was absorbed into an existing arming.
///
/// Runs inline on the intake path, so implementations must not block.
pub trait MessageObserver: Send + Sync + 'static {
    fn observe(&self, _message: &InboundMessage) {}
}

/// The default observer. Does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl MessageObserver for NoopObserver {}

/// Logs observed messages at trace level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl MessageObserver for TracingObserver {
    fn observe(&self, message: &InboundMessage) {
        let (preview, _) = crate::logging::truncate_for_log(&message.content, 80);
        tracing::trace!(
            channel_id = message.channel_id,
            author = %message.author,
            preview,
            "ticket message observed"
        );
    }
}
