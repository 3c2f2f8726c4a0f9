use std::sync::Arc;

use tracing::warn;

use crate::api::{ApiError, ChatFeedback, PlatformErrorKind};

/// Delivers user-facing notices. The preferred channel is an ephemeral
/// (user-only) message; when the platform cannot address an ephemeral to
/// that conversation it answers `channel_not_found`, and the notice falls
/// back once to a normal visible message. Failures beyond that are logged
/// and not retried.
pub struct FeedbackSender {
    chat: Arc<dyn ChatFeedback>,
}

impl FeedbackSender {
    pub fn new(chat: Arc<dyn ChatFeedback>) -> Self {
        Self { chat }
    }

    pub async fn send(&self, channel_id: &str, user_id: &str, text: &str) {
        match self.chat.post_ephemeral(channel_id, user_id, text).await {
            Ok(()) => {}
            Err(ApiError::Platform { kind: PlatformErrorKind::ChannelNotFound, .. }) => {
                if let Err(error) = self.chat.post_message(channel_id, text).await {
                    warn!(
                        channel_id = %channel_id,
                        error = %error,
                        "visible fallback notice failed"
                    );
                }
            }
            Err(error) => {
                warn!(
                    channel_id = %channel_id,
                    user_id = %user_id,
                    error = %error,
                    "ephemeral notice failed"
                );
            }
        }
    }
}
