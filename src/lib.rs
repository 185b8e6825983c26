pub mod commands;
pub mod config;
pub mod error;
pub mod model;
pub mod persist;
pub mod queries;
pub mod report;
pub mod scanner;
pub mod source;
pub mod store;
pub mod webhook;

/// Custom data passed to all commands
pub struct Data {
    pub config: config::Config,
    pub store: store::MessageStore,
    pub webhook: webhook::WebhookClient,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
