use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::api::{
    ApiError, ChatFeedback, ConversationHistory, HistoryMessage, HistoryPage, MessageDeletion,
    PlatformErrorKind,
};

const DEFAULT_BASE_URL: &str = "https://slack.com/api";

/// Thin `reqwest` wrapper around the Slack Web API. Two instances exist per
/// process: one holding the user token (listing, deleting) and one holding
/// the bot token (feedback). Constructed once at bootstrap and shared.
pub struct WebApiClient {
    http: reqwest::Client,
    token: SecretString,
    base_url: String,
}

impl WebApiClient {
    pub fn new(token: SecretString) -> Self {
        Self::with_base_url(token, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(token: SecretString, base_url: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), token, base_url: base_url.into() }
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{method}", self.base_url.trim_end_matches('/'))
    }

    async fn get_json(
        &self,
        method: &'static str,
        query: &[(&str, String)],
    ) -> Result<Value, ApiError> {
        let response = self
            .http
            .get(self.endpoint(method))
            .bearer_auth(self.token.expose_secret())
            .query(query)
            .send()
            .await
            .map_err(|err| ApiError::Transport { method, message: err.to_string() })?;

        Self::decode_envelope(method, response).await
    }

    async fn post_json(&self, method: &'static str, body: &Value) -> Result<Value, ApiError> {
        let response = self
            .http
            .post(self.endpoint(method))
            .bearer_auth(self.token.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|err| ApiError::Transport { method, message: err.to_string() })?;

        Self::decode_envelope(method, response).await
    }

    async fn decode_envelope(
        method: &'static str,
        response: reqwest::Response,
    ) -> Result<Value, ApiError> {
        let retry_after = retry_after_secs(response.headers());
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ApiError::Platform {
                method,
                kind: PlatformErrorKind::RateLimited { retry_after_secs: retry_after },
            });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|err| ApiError::Decode { method, message: err.to_string() })?;

        if let Some(error) = envelope_error(method, &payload, retry_after) {
            return Err(error);
        }

        Ok(payload)
    }
}

fn retry_after_secs(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
}

/// Slack wraps every Web API response in `{ok, error?}`. An `ok: false`
/// envelope carries the failure as a string code.
fn envelope_error(method: &'static str, payload: &Value, retry_after: Option<u64>) -> Option<ApiError> {
    if payload.get("ok").and_then(Value::as_bool).unwrap_or(false) {
        return None;
    }

    let code = payload.get("error").and_then(Value::as_str).unwrap_or("unknown");
    Some(ApiError::Platform { method, kind: PlatformErrorKind::from_code(code, retry_after) })
}

/// Flatten a `conversations.history` payload into a [`HistoryPage`].
///
/// Termination predicate: the page carries a next cursor only when
/// `has_more` is true and `response_metadata.next_cursor` is a non-empty
/// string after trimming. Everything else means the listing is exhausted.
fn parse_history_page(payload: &Value) -> HistoryPage {
    let messages = payload
        .get("messages")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|message| {
            let ts = message.get("ts").and_then(Value::as_str)?;
            let author = message.get("user").and_then(Value::as_str).map(str::to_owned);
            Some(HistoryMessage { ts: ts.to_owned(), author })
        })
        .collect();

    let has_more = payload.get("has_more").and_then(Value::as_bool).unwrap_or(false);
    let next_cursor = has_more
        .then(|| {
            payload
                .get("response_metadata")
                .and_then(|meta| meta.get("next_cursor"))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|cursor| !cursor.is_empty())
                .map(str::to_owned)
        })
        .flatten();

    HistoryPage { messages, next_cursor }
}

#[async_trait]
impl ConversationHistory for WebApiClient {
    async fn history_page(
        &self,
        channel_id: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<HistoryPage, ApiError> {
        let mut query = vec![
            ("channel", channel_id.to_owned()),
            ("limit", limit.to_string()),
        ];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_owned()));
        }

        let payload = self.get_json("conversations.history", &query).await?;
        Ok(parse_history_page(&payload))
    }
}

#[async_trait]
impl MessageDeletion for WebApiClient {
    async fn delete_message(&self, channel_id: &str, ts: &str) -> Result<(), ApiError> {
        let body = serde_json::json!({ "channel": channel_id, "ts": ts });
        self.post_json("chat.delete", &body).await?;
        Ok(())
    }
}

#[async_trait]
impl ChatFeedback for WebApiClient {
    async fn post_ephemeral(
        &self,
        channel_id: &str,
        user_id: &str,
        text: &str,
    ) -> Result<(), ApiError> {
        let body = serde_json::json!({ "channel": channel_id, "user": user_id, "text": text });
        self.post_json("chat.postEphemeral", &body).await?;
        Ok(())
    }

    async fn post_message(&self, channel_id: &str, text: &str) -> Result<(), ApiError> {
        let body = serde_json::json!({ "channel": channel_id, "text": text });
        self.post_json("chat.postMessage", &body).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{envelope_error, parse_history_page};
    use crate::api::{ApiError, PlatformErrorKind};

    #[test]
    fn ok_envelope_yields_no_error() {
        let payload = json!({ "ok": true, "messages": [] });
        assert_eq!(envelope_error("conversations.history", &payload, None), None);
    }

    #[test]
    fn error_envelope_maps_string_code() {
        let payload = json!({ "ok": false, "error": "channel_not_found" });
        assert_eq!(
            envelope_error("conversations.history", &payload, None),
            Some(ApiError::Platform {
                method: "conversations.history",
                kind: PlatformErrorKind::ChannelNotFound,
            })
        );
    }

    #[test]
    fn rate_limited_envelope_carries_header_delay() {
        let payload = json!({ "ok": false, "error": "ratelimited" });
        assert_eq!(
            envelope_error("chat.delete", &payload, Some(12)),
            Some(ApiError::Platform {
                method: "chat.delete",
                kind: PlatformErrorKind::RateLimited { retry_after_secs: Some(12) },
            })
        );
    }

    #[test]
    fn history_page_extracts_ts_and_author() {
        let payload = json!({
            "ok": true,
            "messages": [
                { "type": "message", "user": "U1", "ts": "1700000000.000100", "text": "hi" },
                { "type": "message", "subtype": "channel_join", "ts": "1700000000.000200" },
                { "type": "message", "user": "U2", "ts": "1700000000.000300", "text": "yo" },
            ],
            "has_more": false,
        });

        let page = parse_history_page(&payload);
        assert_eq!(page.messages.len(), 3);
        assert_eq!(page.messages[0].author.as_deref(), Some("U1"));
        assert_eq!(page.messages[1].author, None);
        assert_eq!(page.next_cursor, None);
    }

    #[test]
    fn empty_next_cursor_terminates_pagination() {
        let payload = json!({
            "ok": true,
            "messages": [],
            "has_more": true,
            "response_metadata": { "next_cursor": "  " },
        });
        assert_eq!(parse_history_page(&payload).next_cursor, None);

        let payload = json!({ "ok": true, "messages": [], "has_more": true });
        assert_eq!(parse_history_page(&payload).next_cursor, None);
    }

    #[test]
    fn has_more_with_cursor_continues_pagination() {
        let payload = json!({
            "ok": true,
            "messages": [],
            "has_more": true,
            "response_metadata": { "next_cursor": "dXNlcjpVMDYxTkZUVDI=" },
        });
        assert_eq!(parse_history_page(&payload).next_cursor.as_deref(), Some("dXNlcjpVMDYxTkZUVDI="));
    }

    #[test]
    fn has_more_false_ignores_stray_cursor() {
        let payload = json!({
            "ok": true,
            "messages": [],
            "has_more": false,
            "response_metadata": { "next_cursor": "dXNlcjpVMDYxTkZUVDI=" },
        });
        assert_eq!(parse_history_page(&payload).next_cursor, None);
    }
}
