use std::sync::Arc;

use secrecy::SecretString;
use thiserror::Error;
use tracing::info;

use sweepbot_core::{AppConfig, ConfigError, LoadOptions};
use sweepbot_slack::client::WebApiClient;
use sweepbot_slack::commands::PurgeService;
use sweepbot_slack::events::{EventDispatcher, SlashCommandHandler};
use sweepbot_slack::feedback::FeedbackSender;
use sweepbot_slack::purge::{PurgeRunner, RetryPolicy};
use sweepbot_slack::socket::{ReconnectPolicy, SocketModeRunner};
use sweepbot_slack::ws::WebSocketTransport;

pub struct Application {
    pub config: AppConfig,
    pub slack_runner: SocketModeRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

/// Wire the purge pipeline from an already-loaded config. Every client is
/// constructed here and handed down; nothing below this layer reaches for
/// globals or re-reads the environment.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!("starting application bootstrap");

    // Listing and deletion act on the invoking user's own messages, so they
    // authenticate with the user token. Feedback notices come from the bot.
    let user_client = Arc::new(WebApiClient::new(clone_secret(&config.slack.user_token)));
    let bot_client = Arc::new(WebApiClient::new(clone_secret(&config.slack.bot_token)));

    let runner = PurgeRunner::new(
        user_client.clone(),
        user_client,
        RetryPolicy::from_config(&config.purge),
        config.purge.page_limit,
    );
    let feedback = FeedbackSender::new(bot_client);
    let service = Arc::new(PurgeService::new(runner, feedback));

    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(SlashCommandHandler::new(service));

    let transport = Arc::new(WebSocketTransport::new(
        reqwest::Client::new(),
        clone_secret(&config.slack.app_token),
    ));
    let slack_runner = SocketModeRunner::new(transport, dispatcher, ReconnectPolicy::default());

    info!("application bootstrap complete");
    Ok(Application { config, slack_runner })
}

fn clone_secret(secret: &SecretString) -> SecretString {
    use secrecy::ExposeSecret;
    secret.expose_secret().to_owned().into()
}

#[cfg(test)]
mod tests {
    use sweepbot_core::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    fn overrides(app_token: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                signing_secret: Some("test-signing-secret".to_string()),
                bot_token: Some("xoxb-test".to_string()),
                user_token: Some("xoxp-test".to_string()),
                app_token: Some(app_token.to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_on_an_invalid_app_token() {
        let result = bootstrap(overrides("invalid-token")).await;

        assert!(result.is_err());
        let message = result.err().expect("error").to_string();
        assert!(message.contains("slack.app_token"));
    }

    #[tokio::test]
    async fn bootstrap_wires_the_purge_pipeline_with_valid_tokens() {
        let app = bootstrap(overrides("xapp-test")).await.expect("bootstrap should succeed");
        assert_eq!(app.config.purge.page_limit, 200);
    }
}
