//! Telegram update handlers.
//!
//! Commands come only from configured operators; everything else that lands
//! in a group goes through the media pipeline. A failure while handling one
//! message is logged and dropped so the dispatcher keeps running.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};
use tracing::error;

use crate::router::AppState;

mod commands;
mod media;

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let from_operator = msg
        .from()
        .map(|u| state.cfg.operator_ids.contains(&(u.id.0 as i64)))
        .unwrap_or(false);

    if from_operator {
        if let Some(text) = msg.text() {
            if text.starts_with('/') {
                if let Err(e) = commands::handle_command(&bot, &msg, &state).await {
                    error!("command handling failed: {e}");
                    let _ = bot
                        .send_message(msg.chat.id, format!("Error: {e}"))
                        .await;
                }
                return Ok(());
            }
        }
    }

    if msg.chat.is_group() || msg.chat.is_supergroup() {
        if let Err(e) = media::handle_group_message(&msg, &state).await {
            // One message's failure must never take the service down.
            error!("media pipeline failed for message {}: {e}", msg.id.0);
        }
    }

    Ok(())
}
