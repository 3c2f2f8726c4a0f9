//! Slack Integration - Socket Mode bot interface
//!
//! This crate provides the Slack side of sweepbot:
//! - **Web API** (`api`, `client`) - conversation history, message deletion,
//!   ephemeral/visible feedback over `https://slack.com/api`
//! - **Purge orchestration** (`purge`) - the pagination/delete loop behind
//!   `/delete_msg`
//! - **Slash Commands** (`commands`) - payload normalization and the
//!   command service that ties purge and feedback together
//! - **Socket Mode** (`socket`, `ws`, `events`) - WebSocket connection to
//!   Slack (no public URL needed) and envelope dispatch
//!
//! # Getting Started
//!
//! 1. Create a Slack app at https://api.slack.com/apps
//! 2. Enable Socket Mode and add the `/delete_msg` slash command
//! 3. Grant `channels:history`, `im:history`, `chat:write` (user scope) and
//!    `chat:write`, `commands` (bot scope)
//! 4. Set env vars: `SWEEPBOT_SLACK_SIGNING_SECRET`, `SWEEPBOT_SLACK_BOT_TOKEN`,
//!    `SWEEPBOT_SLACK_USER_TOKEN`, `SWEEPBOT_SLACK_APP_TOKEN`
//!
//! # Key Types
//!
//! - `SocketModeRunner` - WebSocket event loop with reconnection logic
//! - `EventDispatcher` - routes envelopes to handlers
//! - `PurgeRunner` - pages through history and deletes the caller's messages
//! - `PurgeCommandService` - trait for the slash-command handler

pub mod api;
pub mod client;
pub mod commands;
pub mod events;
pub mod feedback;
pub mod purge;
pub mod socket;
pub mod ws;
