use async_trait::async_trait;
use thiserror::Error;

/// One message reference as returned by `conversations.history`. The `ts`
/// doubles as the message's identity and sort key; `author` is absent for
/// system messages such as join/leave notices.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryMessage {
    pub ts: String,
    pub author: Option<String>,
}

/// A page of conversation history. `next_cursor` is the single termination
/// predicate for pagination: `None` means the listing is exhausted. The
/// client normalizes `has_more == false`, a missing cursor, and an
/// empty-string cursor all to `None`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HistoryPage {
    pub messages: Vec<HistoryMessage>,
    pub next_cursor: Option<String>,
}

/// Slack signals most failures as string error codes inside an `{ok: false}`
/// envelope. The codes this bot reacts to are modeled as variants; anything
/// else lands in `Unknown` and is treated as non-retryable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlatformErrorKind {
    RateLimited { retry_after_secs: Option<u64> },
    ChannelNotFound,
    MessageNotFound,
    CantDeleteMessage,
    NotInChannel,
    Unknown(String),
}

impl PlatformErrorKind {
    pub fn from_code(code: &str, retry_after_secs: Option<u64>) -> Self {
        match code {
            "ratelimited" | "rate_limited" => Self::RateLimited { retry_after_secs },
            "channel_not_found" => Self::ChannelNotFound,
            "message_not_found" => Self::MessageNotFound,
            "cant_delete_message" => Self::CantDeleteMessage,
            "not_in_channel" => Self::NotInChannel,
            other => Self::Unknown(other.to_owned()),
        }
    }

    /// The wire code, for logs and user-facing error text.
    pub fn code(&self) -> &str {
        match self {
            Self::RateLimited { .. } => "ratelimited",
            Self::ChannelNotFound => "channel_not_found",
            Self::MessageNotFound => "message_not_found",
            Self::CantDeleteMessage => "cant_delete_message",
            Self::NotInChannel => "not_in_channel",
            Self::Unknown(code) => code,
        }
    }
}

impl std::fmt::Display for PlatformErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("transport failure calling {method}: {message}")]
    Transport { method: &'static str, message: String },
    #[error("malformed response from {method}: {message}")]
    Decode { method: &'static str, message: String },
    #[error("{method} rejected: {kind}")]
    Platform { method: &'static str, kind: PlatformErrorKind },
}

impl ApiError {
    /// Transient transport failures are the only errors worth retrying a
    /// listing call for; everything else reflects a stable API verdict.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    pub fn rate_limit_retry_after(&self) -> Option<Option<u64>> {
        match self {
            Self::Platform { kind: PlatformErrorKind::RateLimited { retry_after_secs }, .. } => {
                Some(*retry_after_secs)
            }
            _ => None,
        }
    }

    /// Short error text for user-facing notices; transport details stay in
    /// the logs.
    pub fn user_code(&self) -> String {
        match self {
            Self::Platform { kind, .. } => kind.code().to_owned(),
            Self::Transport { .. } => "transport_error".to_owned(),
            Self::Decode { .. } => "malformed_response".to_owned(),
        }
    }
}

/// Paginated `conversations.history`, called with the user token so DMs and
/// private channels the user belongs to are visible.
#[async_trait]
pub trait ConversationHistory: Send + Sync {
    async fn history_page(
        &self,
        channel_id: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<HistoryPage, ApiError>;
}

/// `chat.delete` with the user token; a user token can only delete the
/// user's own messages, which backs the author-filter invariant.
#[async_trait]
pub trait MessageDeletion: Send + Sync {
    async fn delete_message(&self, channel_id: &str, ts: &str) -> Result<(), ApiError>;
}

/// Feedback notices with the bot token: `chat.postEphemeral` for the
/// user-only notice, `chat.postMessage` as the visible fallback.
#[async_trait]
pub trait ChatFeedback: Send + Sync {
    async fn post_ephemeral(
        &self,
        channel_id: &str,
        user_id: &str,
        text: &str,
    ) -> Result<(), ApiError>;

    async fn post_message(&self, channel_id: &str, text: &str) -> Result<(), ApiError>;
}

#[cfg(test)]
mod tests {
    use super::{ApiError, PlatformErrorKind};

    #[test]
    fn known_codes_map_to_closed_variants() {
        assert_eq!(
            PlatformErrorKind::from_code("ratelimited", Some(30)),
            PlatformErrorKind::RateLimited { retry_after_secs: Some(30) }
        );
        assert_eq!(
            PlatformErrorKind::from_code("channel_not_found", None),
            PlatformErrorKind::ChannelNotFound
        );
        assert_eq!(
            PlatformErrorKind::from_code("cant_delete_message", None),
            PlatformErrorKind::CantDeleteMessage
        );
        assert_eq!(
            PlatformErrorKind::from_code("some_new_code", None),
            PlatformErrorKind::Unknown("some_new_code".to_owned())
        );
    }

    #[test]
    fn unknown_codes_round_trip_through_display() {
        let kind = PlatformErrorKind::from_code("restricted_action", None);
        assert_eq!(kind.to_string(), "restricted_action");
    }

    #[test]
    fn only_transport_errors_are_transient() {
        let transport =
            ApiError::Transport { method: "conversations.history", message: "reset".to_owned() };
        let platform = ApiError::Platform {
            method: "conversations.history",
            kind: PlatformErrorKind::ChannelNotFound,
        };

        assert!(transport.is_transient());
        assert!(!platform.is_transient());
    }

    #[test]
    fn rate_limit_accessor_surfaces_retry_after() {
        let limited = ApiError::Platform {
            method: "chat.delete",
            kind: PlatformErrorKind::RateLimited { retry_after_secs: Some(7) },
        };
        assert_eq!(limited.rate_limit_retry_after(), Some(Some(7)));

        let other =
            ApiError::Platform { method: "chat.delete", kind: PlatformErrorKind::MessageNotFound };
        assert_eq!(other.rate_limit_retry_after(), None);
    }
}
