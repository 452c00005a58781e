//! Completion notifications over chat webhooks.

use std::time::Duration;

use async_trait::async_trait;
use hoard_config::{Plan, Slack, Team};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};

use crate::NotifierError;

/// Teams card color when the plan does not set one.
const DEFAULT_THEME_COLOR: &str = "0076D7";

/// Delivers the outcome of an execution to the plan's channels.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        plan: &Plan,
        subject: &str,
        body: &str,
        is_failure: bool,
    ) -> Result<(), NotifierError>;
}

/// Posts to the Slack and Teams webhooks configured on a plan.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    http: Client,
}

#[derive(Debug, Serialize)]
struct SlackMessage<'a> {
    channel: &'a str,
    username: &'a str,
    text: String,
}

#[derive(Debug, Serialize)]
struct TeamsCard<'a> {
    #[serde(rename = "@type")]
    kind: &'static str,
    #[serde(rename = "@context")]
    context: &'static str,
    #[serde(rename = "themeColor")]
    theme_color: &'a str,
    summary: &'a str,
    title: &'a str,
    text: &'a str,
}

impl WebhookNotifier {
    pub fn new() -> Self {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");
        Self { http }
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        sink: &'static str,
        url: &str,
        payload: &T,
    ) -> Result<(), NotifierError> {
        let response = self.http.post(url).json(payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifierError::Rejected {
                sink,
                status: status.as_u16(),
            });
        }
        debug!(sink, "notification delivered");
        Ok(())
    }

    async fn slack(&self, slack: &Slack, subject: &str, body: &str) -> Result<(), NotifierError> {
        let message = SlackMessage {
            channel: &slack.channel,
            username: &slack.username,
            text: format!("{subject}\n{body}"),
        };
        self.post("slack", &slack.url, &message).await
    }

    async fn team(&self, team: &Team, subject: &str, body: &str) -> Result<(), NotifierError> {
        let theme_color = if team.theme_color.is_empty() {
            DEFAULT_THEME_COLOR
        } else {
            team.theme_color.trim_start_matches('#')
        };
        let card = TeamsCard {
            kind: "MessageCard",
            context: "http://schema.org/extensions",
            theme_color,
            summary: subject,
            title: subject,
            text: body,
        };
        self.post("teams", &team.webhook_url, &card).await
    }
}

impl Default for WebhookNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    #[tracing::instrument(skip(self, plan, body), fields(plan = %plan.name))]
    async fn send(
        &self,
        plan: &Plan,
        subject: &str,
        body: &str,
        is_failure: bool,
    ) -> Result<(), NotifierError> {
        // Every sink is attempted; the first error is reported.
        let mut first_error = None;

        if let Some(slack) = plan.slack.as_ref().filter(|s| is_failure || !s.warn_only) {
            if let Err(e) = self.slack(slack, subject, body).await {
                warn!(plan = %plan.name, error = %e, "slack notification failed");
                first_error.get_or_insert(e);
            }
        }

        if let Some(team) = plan.team.as_ref().filter(|t| is_failure || !t.warn_only) {
            if let Err(e) = self.team(team, subject, body).await {
                warn!(plan = %plan.name, error = %e, "teams notification failed");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
