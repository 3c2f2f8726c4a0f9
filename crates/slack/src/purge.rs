use std::{sync::Arc, time::Duration};

use thiserror::Error;
use tracing::{debug, info, warn};

use sweepbot_core::config::PurgeConfig;
use sweepbot_core::{PurgeOutcome, PurgeRequest};

use crate::api::{ApiError, ConversationHistory, HistoryMessage, MessageDeletion};

/// Retry and pacing knobs for one purge run. Both retry loops carry an
/// explicit budget so a stuck collaborator cannot wedge an invocation
/// forever.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_rate_limit_attempts: u32,
    pub max_listing_attempts: u32,
    pub listing_retry_delay: Duration,
    pub inter_message_pause: Duration,
    pub default_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_rate_limit_attempts: 20,
            max_listing_attempts: 10,
            listing_retry_delay: Duration::from_millis(1_000),
            inter_message_pause: Duration::from_millis(100),
            default_retry_after: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &PurgeConfig) -> Self {
        Self {
            max_rate_limit_attempts: config.max_rate_limit_attempts,
            max_listing_attempts: config.max_listing_attempts,
            listing_retry_delay: Duration::from_millis(config.listing_retry_delay_ms),
            inter_message_pause: Duration::from_millis(config.inter_message_pause_ms),
            default_retry_after: Duration::from_secs(config.default_retry_after_secs),
        }
    }

    /// Delay before retrying a rate-limited delete: the server-advertised
    /// `Retry-After` when present, otherwise the configured default (1s).
    pub fn rate_limit_delay(&self, retry_after_secs: Option<u64>) -> Duration {
        match retry_after_secs {
            Some(secs) => Duration::from_secs(secs),
            None => self.default_retry_after,
        }
    }
}

#[derive(Debug, Error)]
pub enum PurgeError {
    #[error("listing conversation history failed: {0}")]
    Listing(#[source] ApiError),
}

impl PurgeError {
    pub fn user_code(&self) -> String {
        match self {
            Self::Listing(error) => error.user_code(),
        }
    }
}

/// The deletion orchestrator. Pages through a conversation's history,
/// filters to the requesting user's messages, and deletes them one by one.
/// Listing failures abort the run; per-message delete failures do not.
pub struct PurgeRunner {
    history: Arc<dyn ConversationHistory>,
    deletions: Arc<dyn MessageDeletion>,
    policy: RetryPolicy,
    page_limit: u32,
}

impl PurgeRunner {
    pub fn new(
        history: Arc<dyn ConversationHistory>,
        deletions: Arc<dyn MessageDeletion>,
        policy: RetryPolicy,
        page_limit: u32,
    ) -> Self {
        Self { history, deletions, policy, page_limit }
    }

    pub async fn run(&self, request: &PurgeRequest) -> Result<PurgeOutcome, PurgeError> {
        let mut outcome = PurgeOutcome::default();
        let mut cursor: Option<String> = None;
        let mut page_index = 0u32;

        loop {
            let page = self.fetch_page(&request.channel_id, cursor.as_deref()).await?;
            page_index += 1;
            debug!(
                channel_id = %request.channel_id,
                page = page_index,
                messages = page.messages.len(),
                has_next = page.next_cursor.is_some(),
                "fetched history page"
            );

            for message in &page.messages {
                if message.author.as_deref() != Some(request.user_id.as_str()) {
                    continue;
                }

                self.delete_with_retry(request, message, &mut outcome).await;

                // Ambient pacing between delete attempts, whatever the
                // outcome of the attempt itself.
                if !self.policy.inter_message_pause.is_zero() {
                    tokio::time::sleep(self.policy.inter_message_pause).await;
                }
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        info!(
            channel_id = %request.channel_id,
            user_id = %request.user_id,
            deleted = outcome.deleted,
            skipped = outcome.skipped,
            "purge run complete"
        );
        Ok(outcome)
    }

    /// Fetch one page, absorbing transient transport failures up to the
    /// listing budget. Any platform-level listing error is fatal to the
    /// whole run; there is no partial-cursor resumption.
    async fn fetch_page(
        &self,
        channel_id: &str,
        cursor: Option<&str>,
    ) -> Result<crate::api::HistoryPage, PurgeError> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.history.history_page(channel_id, cursor, self.page_limit).await {
                Ok(page) => return Ok(page),
                Err(error) if error.is_transient() && attempt < self.policy.max_listing_attempts => {
                    warn!(
                        channel_id = %channel_id,
                        attempt,
                        max_attempts = self.policy.max_listing_attempts,
                        error = %error,
                        "transient listing failure; retrying"
                    );
                    if !self.policy.listing_retry_delay.is_zero() {
                        tokio::time::sleep(self.policy.listing_retry_delay).await;
                    }
                }
                Err(error) => return Err(PurgeError::Listing(error)),
            }
        }
    }

    /// Delete one message, retrying rate-limit verdicts with the
    /// server-advertised delay. Exhausting the budget or hitting any other
    /// error abandons this message only; the run continues.
    async fn delete_with_retry(
        &self,
        request: &PurgeRequest,
        message: &HistoryMessage,
        outcome: &mut PurgeOutcome,
    ) {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.deletions.delete_message(&request.channel_id, &message.ts).await {
                Ok(()) => {
                    outcome.deleted += 1;
                    info!(
                        channel_id = %request.channel_id,
                        ts = %human_ts(&message.ts),
                        "deleted message"
                    );
                    return;
                }
                Err(error) => match error.rate_limit_retry_after() {
                    Some(retry_after) if attempt < self.policy.max_rate_limit_attempts => {
                        let delay = self.policy.rate_limit_delay(retry_after);
                        debug!(
                            ts = %message.ts,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "rate limited; retrying delete"
                        );
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                    }
                    Some(_) => {
                        outcome.skipped += 1;
                        warn!(
                            ts = %message.ts,
                            attempts = attempt,
                            "rate limit budget exhausted; skipping message"
                        );
                        return;
                    }
                    None => {
                        outcome.skipped += 1;
                        warn!(ts = %message.ts, error = %error, "delete failed; skipping message");
                        return;
                    }
                },
            }
        }
    }
}

/// Render a Slack `ts` (epoch seconds, dot, sequence) as a human-readable
/// UTC timestamp for logs. Unparseable input is passed through untouched.
fn human_ts(ts: &str) -> String {
    let seconds = ts.split('.').next().and_then(|raw| raw.parse::<i64>().ok());
    match seconds.and_then(|secs| chrono::DateTime::from_timestamp(secs, 0)) {
        Some(datetime) => datetime.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => ts.to_owned(),
    }
}
