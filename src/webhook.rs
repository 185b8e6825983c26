//! Outbound webhook delivery for reports and notifications.

use serde::Serialize;
use std::time::Duration;
use tracing::debug;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Serialize)]
struct Embed<'a> {
    title: &'a str,
    description: &'a str,
    color: u32,
    fields: &'a [EmbedField],
}

#[derive(Serialize)]
struct Payload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    embeds: Option<Vec<Embed<'a>>>,
    username: &'a str,
    avatar_url: &'a str,
}

/// Posts messages and embeds to the configured webhook URLs. An unconfigured
/// sink is a logged no-op so the bot runs fine without webhooks.
#[derive(Clone)]
pub struct WebhookClient {
    http: reqwest::Client,
    webhook_url: Option<String>,
    admin_webhook_url: Option<String>,
}

impl WebhookClient {
    pub fn new(
        http: reqwest::Client,
        webhook_url: Option<String>,
        admin_webhook_url: Option<String>,
    ) -> Self {
        Self {
            http,
            webhook_url,
            admin_webhook_url,
        }
    }

    pub async fn send_message(&self, content: &str, admin: bool) -> anyhow::Result<()> {
        self.post(
            Payload {
                content: Some(content),
                embeds: None,
                username: "Tallycord",
                avatar_url: "https://cdn.discordapp.com/embed/avatars/0.png",
            },
            admin,
        )
        .await
    }

    pub async fn send_embed(
        &self,
        title: &str,
        description: &str,
        fields: Vec<EmbedField>,
        color: u32,
        admin: bool,
    ) -> anyhow::Result<()> {
        self.post(
            Payload {
                content: None,
                embeds: Some(vec![Embed {
                    title,
                    description,
                    color,
                    fields: &fields,
                }]),
                username: "Tallycord",
                avatar_url: "https://cdn.discordapp.com/embed/avatars/0.png",
            },
            admin,
        )
        .await
    }

    async fn post(&self, payload: Payload<'_>, admin: bool) -> anyhow::Result<()> {
        let url = if admin {
            &self.admin_webhook_url
        } else {
            &self.webhook_url
        };
        let Some(url) = url else {
            debug!(
                "{} webhook not configured, skipping message",
                if admin { "Admin" } else { "Public" }
            );
            return Ok(());
        };

        let response = self
            .http
            .post(url)
            .timeout(WEBHOOK_TIMEOUT)
            .json(&payload)
            .send()
            .await?;
        if !response.status().is_success() {
            anyhow::bail!("webhook request failed with status {}", response.status());
        }
        Ok(())
    }
}
