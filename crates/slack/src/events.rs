use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::commands::{
    normalize_purge_command, CommandParseError, NoopPurgeCommandService, PurgeCommandService,
    SlashCommandPayload,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    SlashCommand(SlashCommandPayload),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::SlashCommand(_) => SlackEventType::SlashCommand,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    SlashCommand,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Parse(#[from] CommandParseError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }
}

pub fn default_dispatcher() -> EventDispatcher {
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(SlashCommandHandler::new(Arc::new(NoopPurgeCommandService)));
    dispatcher
}

/// Handles `/delete_msg` invocations. The purge itself runs on its own
/// task so the socket loop keeps acknowledging envelopes while a run is in
/// flight; concurrent invocations share no deletable state and may
/// interleave freely.
pub struct SlashCommandHandler<S> {
    service: Arc<S>,
}

impl<S> SlashCommandHandler<S>
where
    S: PurgeCommandService,
{
    pub fn new(service: Arc<S>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for SlashCommandHandler<S>
where
    S: PurgeCommandService + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::SlashCommand
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::SlashCommand(payload) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let request = normalize_purge_command(payload.clone())?;
        info!(
            correlation_id = %ctx.correlation_id,
            user_id = %request.user_id,
            channel_id = %request.channel_id,
            "slash command accepted; starting purge task"
        );

        let service = Arc::clone(&self.service);
        tokio::spawn(async move {
            service.handle_purge(request).await;
        });

        Ok(HandlerResult::Processed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::{Mutex, Notify};

    use super::{
        default_dispatcher, DispatchError, EventContext, EventDispatcher, EventHandlerError,
        HandlerResult, SlackEnvelope, SlackEvent, SlashCommandHandler,
    };
    use crate::commands::{CommandParseError, PurgeCommandService, SlashCommandPayload};
    use sweepbot_core::PurgeRequest;

    fn slash_envelope(command: &str) -> SlackEnvelope {
        SlackEnvelope {
            envelope_id: "env-1".to_owned(),
            event: SlackEvent::SlashCommand(SlashCommandPayload {
                command: command.to_owned(),
                text: String::new(),
                channel_id: "C1".to_owned(),
                user_id: "U1".to_owned(),
                trigger_id: "trig-1".to_owned(),
                request_id: "req-1".to_owned(),
            }),
        }
    }

    #[derive(Default)]
    struct RecordingService {
        requests: Mutex<Vec<PurgeRequest>>,
        notify: Notify,
    }

    #[async_trait]
    impl PurgeCommandService for RecordingService {
        async fn handle_purge(&self, request: PurgeRequest) {
            self.requests.lock().await.push(request);
            self.notify.notify_one();
        }
    }

    #[tokio::test]
    async fn slash_command_is_routed_to_the_purge_service() {
        let service = Arc::new(RecordingService::default());
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(SlashCommandHandler::new(service.clone()));

        let result = dispatcher
            .dispatch(&slash_envelope("/delete_msg"), &EventContext::default())
            .await
            .expect("dispatch");
        assert_eq!(result, HandlerResult::Processed);

        service.notify.notified().await;
        let requests = service.requests.lock().await;
        assert_eq!(
            *requests,
            vec![PurgeRequest { user_id: "U1".to_owned(), channel_id: "C1".to_owned() }]
        );
    }

    #[tokio::test]
    async fn unsupported_command_surfaces_a_parse_error() {
        let dispatcher = default_dispatcher();

        let error = dispatcher
            .dispatch(&slash_envelope("/quote"), &EventContext::default())
            .await
            .expect_err("unknown command must fail");

        assert_eq!(
            error,
            DispatchError::Handler(EventHandlerError::Parse(
                CommandParseError::UnsupportedCommand("/quote".to_owned())
            ))
        );
    }

    #[tokio::test]
    async fn unknown_event_types_are_ignored() {
        let dispatcher = default_dispatcher();
        let envelope = SlackEnvelope {
            envelope_id: "env-2".to_owned(),
            event: SlackEvent::Unsupported { event_type: "events_api".to_owned() },
        };

        let result =
            dispatcher.dispatch(&envelope, &EventContext::default()).await.expect("dispatch");

        assert_eq!(result, HandlerResult::Ignored);
    }

    #[tokio::test]
    async fn default_dispatcher_routes_slash_commands() {
        let result = default_dispatcher()
            .dispatch(&slash_envelope("/delete_msg"), &EventContext::default())
            .await
            .expect("dispatch");

        assert_eq!(result, HandlerResult::Processed);
    }
}
