//! Operator commands over Redis
//!
//! Listens on [`COMMAND_CHANNEL`] for JSON commands and publishes a reply for
//! each one on [`REPLY_CHANNEL`]. The only command today is a manual check:
//!
//! ```text
//! {"type": "check_now", "telegram_id": 123456}
//! ```

use crate::scheduler::{CheckNowError, CycleSummary, Scheduler};
use auction_watch_core::redis::RedisBus;
use futures_util::StreamExt;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub const COMMAND_CHANNEL: &str = "auction_watch:command";
pub const REPLY_CHANNEL: &str = "auction_watch:command:reply";

const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdminCommand {
    CheckNow { telegram_id: i64 },
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandReply {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telegram_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<CycleSummary>,
}

impl CommandReply {
    fn failure(telegram_id: Option<i64>, error: String) -> Self {
        Self {
            ok: false,
            telegram_id,
            error: Some(error),
            summary: None,
        }
    }
}

/// Parse and execute one raw command payload
pub async fn handle_command(scheduler: &Scheduler, payload: &str) -> CommandReply {
    let command = match serde_json::from_str::<AdminCommand>(payload) {
        Ok(command) => command,
        Err(e) => {
            warn!("Failed to parse command JSON: {}", e);
            return CommandReply::failure(None, format!("invalid command: {}", e));
        }
    };

    match command {
        AdminCommand::CheckNow { telegram_id } => match scheduler.check_now(telegram_id).await {
            Ok(summary) => CommandReply {
                ok: true,
                telegram_id: Some(telegram_id),
                error: None,
                summary: Some(summary),
            },
            Err(e @ (CheckNowError::UnknownSubscriber(_) | CheckNowError::NotPermitted(_))) => {
                info!("Rejected check_now: {}", e);
                CommandReply::failure(Some(telegram_id), e.to_string())
            }
            Err(e) => {
                error!("check_now failed: {}", e);
                CommandReply::failure(Some(telegram_id), e.to_string())
            }
        },
    }
}

/// Serve commands until the process exits, resubscribing after disconnects
pub async fn command_listener(bus: RedisBus, scheduler: Arc<Scheduler>) {
    loop {
        let mut pubsub = match bus.subscribe(COMMAND_CHANNEL).await {
            Ok(pubsub) => pubsub,
            Err(e) => {
                warn!("Command listener could not subscribe: {:#}", e);
                tokio::time::sleep(RESUBSCRIBE_DELAY).await;
                continue;
            }
        };
        info!("Command listener listening on {}", COMMAND_CHANNEL);

        let mut messages = pubsub.on_message();
        while let Some(msg) = messages.next().await {
            let payload: String = match msg.get_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("Ignoring non-text command payload: {}", e);
                    continue;
                }
            };

            let bus = bus.clone();
            let scheduler = scheduler.clone();
            tokio::spawn(async move {
                let reply = handle_command(&scheduler, &payload).await;
                if let Err(e) = bus.publish(REPLY_CHANNEL, &reply).await {
                    warn!("Failed to publish command reply: {:#}", e);
                }
            });
        }

        warn!("Command stream closed, resubscribing");
        tokio::time::sleep(RESUBSCRIBE_DELAY).await;
    }
}
