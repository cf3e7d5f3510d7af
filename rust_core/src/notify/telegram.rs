use super::{alert_text, NotificationSink};
use crate::models::{PriceAlert, Subscriber};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

const API_BASE: &str = "https://api.telegram.org";
const ITEM_LINK_BASE: &str = "https://www.wowhead.com/item=";

/// Characters Telegram's MarkdownV2 requires to be escaped
const MARKDOWN_V2_SPECIAL: &[char] = &[
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!', '\\',
];

#[derive(Debug, Clone)]
pub struct TelegramSink {
    http: Client,
    base_url: String,
    bot_token: String,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    parse_mode: &'a str,
    disable_web_page_preview: bool,
}

impl TelegramSink {
    pub fn new(bot_token: String) -> Result<Self> {
        Self::with_base_url(bot_token, API_BASE.to_string())
    }

    pub fn with_base_url(bot_token: String, base_url: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to create HTTP client for Telegram")?;
        Ok(Self {
            http,
            base_url,
            bot_token,
        })
    }

    pub async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.base_url.trim_end_matches('/'),
            self.bot_token
        );
        let body = SendMessageRequest {
            chat_id,
            text,
            parse_mode: "MarkdownV2",
            disable_web_page_preview: true,
        };

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("Telegram API request failed")?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("Telegram API non-2xx: {status} body={text}");
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for TelegramSink {
    async fn send(&self, subscriber: &Subscriber, alert: &PriceAlert) {
        let text = render_markdown(alert);
        match self.send_text(subscriber.telegram_id, &text).await {
            Ok(()) => debug!(
                "Delivered notification {} to subscriber {}",
                alert.notification_id, subscriber.id
            ),
            Err(e) => warn!(
                "Failed to deliver notification {} to subscriber {}: {}",
                alert.notification_id, subscriber.id, e
            ),
        }
    }
}

pub fn escape_markdown_v2(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if MARKDOWN_V2_SPECIAL.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Inside a MarkdownV2 link target only `)` and `\` are special
fn escape_link_target(url: &str) -> String {
    let mut escaped = String::with_capacity(url.len());
    for c in url.chars() {
        if c == ')' || c == '\\' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Bold header with the item linked to its Wowhead page, then the escaped body
fn render_markdown(alert: &PriceAlert) -> String {
    let text = alert_text(alert);
    let body = text.split_once('\n').map(|(_, body)| body).unwrap_or_default();
    let link = format!("{}{}", ITEM_LINK_BASE, alert.item_id);
    format!(
        "*[{}]({}) @ {}*\n{}",
        escape_markdown_v2(&alert.item_name),
        escape_link_target(&link),
        escape_markdown_v2(&alert.realm_name),
        escape_markdown_v2(body)
    )
}
