//! Operator notifications.
//!
//! Fatal run failures raise an alert; [`SlackNotifier`] posts it to a Slack
//! channel, [`LogAlertSink`] just logs it when no token is configured.

use crate::config::AlertOptions;
use crate::error::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const SLACK_API: &str = "https://slack.com/api";

/// Destination for operator-facing messages.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Send an alert about a failure that needs attention.
    async fn alert(&self, message: &str) -> Result<()>;

    /// Send an informational message.
    async fn notify(&self, message: &str) -> Result<()>;
}

/// Sink that writes messages to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn alert(&self, message: &str) -> Result<()> {
        tracing::error!(alert = %message, "Operator alert");
        Ok(())
    }

    async fn notify(&self, message: &str) -> Result<()> {
        tracing::info!(notification = %message, "Operator notification");
        Ok(())
    }
}

/// Posts messages with `chat.postMessage`.
#[derive(Clone)]
pub struct SlackNotifier {
    client: Client,
    api_base: String,
    token: String,
    alert_channel: String,
    notify_channel: String,
}

impl std::fmt::Debug for SlackNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackNotifier")
            .field("api_base", &self.api_base)
            .field("alert_channel", &self.alert_channel)
            .field("notify_channel", &self.notify_channel)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct SlackResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

impl SlackNotifier {
    /// Create a notifier for a bot token and channels.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(token: impl Into<String>, alert_channel: impl Into<String>, notify_channel: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| crate::err!(Alert { message: format!("Failed to create HTTP client: {e}") }))?;

        Ok(Self {
            client,
            api_base: SLACK_API.to_string(),
            token: token.into(),
            alert_channel: alert_channel.into(),
            notify_channel: notify_channel.into(),
        })
    }

    /// Point the notifier at another API root.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    async fn post(&self, channel: &str, text: &str) -> Result<()> {
        if channel.is_empty() {
            tracing::warn!(message = %text, "No Slack channel configured, message not sent");
            return Ok(());
        }

        let response = self
            .client
            .post(format!("{}/chat.postMessage", self.api_base))
            .bearer_auth(&self.token)
            .json(&json!({ "channel": channel, "text": text }))
            .send()
            .await
            .map_err(|e| crate::err!(Alert { message: e.to_string() }))?;

        let body: SlackResponse = response
            .json()
            .await
            .map_err(|e| crate::err!(Alert { message: format!("invalid Slack response: {e}") }))?;

        if !body.ok {
            return Err(crate::err!(Alert {
                message: body.error.unwrap_or_else(|| "unknown Slack error".to_string()),
            }));
        }
        tracing::debug!(channel = %channel, "Slack message sent");
        Ok(())
    }
}

#[async_trait]
impl AlertSink for SlackNotifier {
    async fn alert(&self, message: &str) -> Result<()> {
        self.post(&self.alert_channel, message).await
    }

    async fn notify(&self, message: &str) -> Result<()> {
        self.post(&self.notify_channel, message).await
    }
}

/// Build the sink for the alert configuration.
///
/// # Errors
///
/// Returns an error if a Slack token is configured but the notifier cannot
/// be built.
pub fn from_options(options: &AlertOptions) -> Result<Box<dyn AlertSink>> {
    match options.slack_token.as_deref().filter(|t| !t.is_empty()) {
        Some(token) => Ok(Box::new(SlackNotifier::new(
            token,
            options.alert_channel.clone(),
            options.notify_channel.clone(),
        )?)),
        None => {
            tracing::debug!("No Slack token configured, alerts go to the log");
            Ok(Box::new(LogAlertSink))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{matchers::*, Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_alert_posts_to_alert_channel() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .and(header("Authorization", "Bearer xoxb-test"))
            .and(body_json(json!({"channel": "#alerts", "text": "*Terraform Discovery failed*: boom"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = SlackNotifier::new("xoxb-test", "#alerts", "#notify")
            .unwrap()
            .with_api_base(server.uri());
        notifier.alert("*Terraform Discovery failed*: boom").await.unwrap();
    }

    #[tokio::test]
    async fn test_slack_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": false, "error": "channel_not_found"})))
            .mount(&server)
            .await;

        let notifier = SlackNotifier::new("xoxb-test", "#missing", "")
            .unwrap()
            .with_api_base(server.uri());
        let err = notifier.alert("hello").await.unwrap_err();
        assert!(err.to_string().contains("channel_not_found"));
        assert!(err.is_recoverable());

        // empty channel is a no-op
        assert!(notifier.notify("hello").await.is_ok());
    }

    #[tokio::test]
    async fn test_from_options_without_token_logs() {
        let sink = from_options(&AlertOptions::default()).unwrap();
        assert!(sink.alert("nothing configured").await.is_ok());
    }

    #[tokio::test]
    async fn test_from_options_with_token_builds_slack_sink() {
        let options = AlertOptions {
            slack_token: Some("xoxb-test".to_string()),
            ..AlertOptions::default()
        };
        let sink = from_options(&options).unwrap();
        // no channel configured, nothing is posted
        assert!(sink.alert("boom").await.is_ok());
    }
}
