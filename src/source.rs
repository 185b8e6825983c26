//! Gateway-REST implementation of the scanner's message source.

use crate::error::FetchError;
use crate::model::{MessageRecord, WEBHOOK_DISCRIMINATOR};
use crate::scanner::{ChannelRef, MessageSource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serenity::builder::GetMessages;
use serenity::http::Http;
use serenity::model::prelude::*;
use std::sync::Arc;

/// History access over the Discord REST API, bound to the monitored guild.
pub struct DiscordSource {
    http: Arc<Http>,
    guild_id: GuildId,
}

impl DiscordSource {
    pub fn new(http: Arc<Http>, guild_id: GuildId) -> Self {
        Self { http, guild_id }
    }

    fn record_from_message(&self, message: &Message, channel: &ChannelRef) -> MessageRecord {
        record_from_gateway(message, self.guild_id, channel.name.clone())
    }
}

/// Builds a store record from a gateway or REST message. The channel name is
/// supplied by the caller; neither payload carries it.
pub fn record_from_gateway(
    message: &Message,
    guild_id: GuildId,
    channel_name: String,
) -> MessageRecord {
    MessageRecord {
        id: message.id.to_string(),
        author_id: message.author.id.to_string(),
        author_name: message.author.name.clone(),
        author_discriminator: discriminator_of(message),
        channel_id: message.channel_id.to_string(),
        channel_name,
        guild_id: guild_id.to_string(),
        content: message.content.clone(),
        timestamp: DateTime::from_timestamp(message.timestamp.unix_timestamp(), 0)
            .unwrap_or_else(Utc::now),
        is_bot: message.author.bot,
        deleted: false,
        channel_deleted: false,
    }
}

/// "0000" for webhook relays; accounts without a discriminator (the post-
/// migration username system) get an empty string, which stays "real".
pub fn discriminator_of(message: &Message) -> String {
    if message.webhook_id.is_some() {
        return WEBHOOK_DISCRIMINATOR.to_string();
    }
    message
        .author
        .discriminator
        .map(|d| format!("{:04}", d.get()))
        .unwrap_or_default()
}

fn classify(error: serenity::Error) -> FetchError {
    if let serenity::Error::Http(serenity::http::HttpError::UnsuccessfulRequest(response)) = &error
    {
        // 50001 is Discord's "Missing Access" error code.
        if response.status_code.as_u16() == 403 || response.error.code == 50001 {
            return FetchError::AccessDenied;
        }
    }
    FetchError::Transport(error.to_string())
}

fn parse_id(value: &str, what: &str) -> Result<u64, FetchError> {
    value
        .parse()
        .map_err(|_| FetchError::Transport(format!("invalid {} id: {}", what, value)))
}

#[async_trait]
impl MessageSource for DiscordSource {
    async fn list_channels(&self, guild_id: &str) -> Result<Vec<ChannelRef>, FetchError> {
        let guild = GuildId::new(parse_id(guild_id, "guild")?);
        let channels = guild.channels(&self.http).await.map_err(classify)?;
        Ok(channels
            .into_values()
            .filter(|channel| channel.kind == ChannelType::Text)
            .map(|channel| ChannelRef {
                id: channel.id.to_string(),
                name: channel.name,
            })
            .collect())
    }

    async fn fetch_page(
        &self,
        channel: &ChannelRef,
        before: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MessageRecord>, FetchError> {
        let channel_id = ChannelId::new(parse_id(&channel.id, "channel")?);
        let mut request = GetMessages::new().limit(limit.min(100) as u8);
        if let Some(before) = before {
            request = request.before(MessageId::new(parse_id(before, "message")?));
        }
        let messages = channel_id
            .messages(&self.http, request)
            .await
            .map_err(classify)?;
        Ok(messages
            .iter()
            .map(|message| self.record_from_message(message, channel))
            .collect())
    }
}
