//! Transient, per-invocation types. Nothing here is persisted.

/// Context of a single slash-command invocation. Immutable for the
/// duration of the request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PurgeRequest {
    pub user_id: String,
    pub channel_id: String,
}

/// Tally of a completed purge run. `deleted` counts successful delete
/// calls only; `skipped` counts messages abandoned after a non-retryable
/// delete error or an exhausted retry budget.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PurgeOutcome {
    pub deleted: u64,
    pub skipped: u64,
}

/// Slack prefixes direct-message conversation IDs with `D` (channels use
/// `C`, group DMs `G`). Completion notices are suppressed for DMs so the
/// bot does not echo into a private 1:1 thread.
pub fn is_direct_message(conversation_id: &str) -> bool {
    conversation_id.starts_with('D')
}
