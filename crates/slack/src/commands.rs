use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, info};

use sweepbot_core::{is_direct_message, PurgeRequest};

use crate::{feedback::FeedbackSender, purge::PurgeRunner};

/// The one slash command this bot registers.
pub const PURGE_COMMAND: &str = "/delete_msg";

/// Raw slash-command payload as delivered by Socket Mode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlashCommandPayload {
    pub command: String,
    pub text: String,
    pub channel_id: String,
    pub user_id: String,
    pub trigger_id: String,
    pub request_id: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("unsupported slash command: {0}")]
    UnsupportedCommand(String),
}

/// Validate the command name and lift the payload into an invocation
/// context. The command takes no arguments; any trailing text is ignored.
pub fn normalize_purge_command(
    payload: SlashCommandPayload,
) -> Result<PurgeRequest, CommandParseError> {
    if payload.command != PURGE_COMMAND {
        return Err(CommandParseError::UnsupportedCommand(payload.command));
    }

    Ok(PurgeRequest { user_id: payload.user_id, channel_id: payload.channel_id })
}

/// Seam between envelope dispatch and the purge pipeline, so the dispatcher
/// can be exercised with a recording fake.
#[async_trait]
pub trait PurgeCommandService: Send + Sync {
    async fn handle_purge(&self, request: PurgeRequest);
}

/// Production service: runs the purge and delivers the outcome notice.
/// Completion notices are suppressed in direct messages; error notices are
/// always sent, DMs included.
pub struct PurgeService {
    runner: PurgeRunner,
    feedback: FeedbackSender,
}

impl PurgeService {
    pub fn new(runner: PurgeRunner, feedback: FeedbackSender) -> Self {
        Self { runner, feedback }
    }
}

#[async_trait]
impl PurgeCommandService for PurgeService {
    async fn handle_purge(&self, request: PurgeRequest) {
        info!(
            user_id = %request.user_id,
            channel_id = %request.channel_id,
            "purge requested"
        );

        match self.runner.run(&request).await {
            Ok(outcome) => {
                if !is_direct_message(&request.channel_id) {
                    let text = format!("Deleted {} messages.", outcome.deleted);
                    self.feedback.send(&request.channel_id, &request.user_id, &text).await;
                }
            }
            Err(purge_error) => {
                error!(
                    channel_id = %request.channel_id,
                    error = %purge_error,
                    "purge run aborted"
                );
                let text = format!("Error: {}", purge_error.user_code());
                self.feedback.send(&request.channel_id, &request.user_id, &text).await;
            }
        }
    }
}

/// Inert service for dispatcher defaults and wiring tests.
#[derive(Default)]
pub struct NoopPurgeCommandService;

#[async_trait]
impl PurgeCommandService for NoopPurgeCommandService {
    async fn handle_purge(&self, request: PurgeRequest) {
        info!(
            user_id = %request.user_id,
            channel_id = %request.channel_id,
            "noop purge service invoked"
        );
    }
}
