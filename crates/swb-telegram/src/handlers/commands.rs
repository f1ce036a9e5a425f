use chrono::Utc;
use teloxide::{prelude::*, types::Message};
use tracing::info;

use swb_core::{
    config::ConfigKey,
    domain::{ChatId, MessageId, MessageRef, UserId},
    durations::{format_time_left, parse_duration},
    ports::{DeleteError, ResolvedUser},
    rights::verify_delete_rights,
    Error, Result,
};

use crate::router::AppState;

fn parse_command(text: &str) -> (String, Vec<String>) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().split_whitespace();
    let first = parts.next().unwrap_or("");

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, parts.map(|s| s.to_string()).collect())
}

async fn reply(bot: &Bot, msg: &Message, text: impl Into<String>) -> Result<()> {
    bot.send_message(msg.chat.id, text.into())
        .await
        .map_err(|e| Error::External(format!("telegram error: {e}")))?;
    Ok(())
}

/// Target of a user-directed command: the replied-to author, or the first
/// argument (numeric id or @username).
async fn resolve_target(
    state: &AppState,
    msg: &Message,
    args: &[String],
) -> Result<ResolvedUser> {
    if let Some(from) = msg.reply_to_message().and_then(|m| m.from()) {
        return Ok(ResolvedUser {
            id: UserId(from.id.0 as i64),
            username: from.username.clone(),
            display_name: from.first_name.clone(),
        });
    }

    let Some(query) = args.first() else {
        return Err(Error::InvalidInput(
            "reply to a user or pass a user id/@username".to_string(),
        ));
    };
    state.port.resolve_user(query).await
}

pub async fn handle_command(bot: &Bot, msg: &Message, state: &AppState) -> Result<()> {
    let (cmd, args) = parse_command(msg.text().unwrap_or(""));

    match cmd.as_str() {
        "config" => show_config(bot, msg, state).await,
        "setconfig" => set_config(bot, msg, state, &args).await,
        "resetconfig" => reset_config(bot, msg, state, &args).await,
        "status" => status(bot, msg, state).await,
        "clearcache" => clear_cache(bot, msg, state).await,
        "addsudo" => add_sudo(bot, msg, state, &args).await,
        "rmsudo" => remove_sudo(bot, msg, state, &args).await,
        "listsudo" => list_sudo(bot, msg, state).await,
        "exempt" => exempt(bot, msg, state, &args).await,
        "rmexempt" => remove_exemption(bot, msg, state, &args).await,
        "listexempt" => list_exemptions(bot, msg, state).await,
        "stickers" => toggle_stickers(bot, msg, state).await,
        "botonly" => toggle_bot_only(bot, msg, state).await,
        "pause" => pause(bot, msg, state, &args).await,
        "resume" => resume(bot, msg, state).await,
        "resetrate" => reset_rate(bot, msg, state).await,
        "testdelete" => test_delete(bot, msg, state).await,
        "help" | "start" => help(bot, msg).await,
        _ => reply(bot, msg, format!("Unknown command /{cmd}. Try /help.")).await,
    }
}

async fn show_config(bot: &Bot, msg: &Message, state: &AppState) -> Result<()> {
    let rc = state.config.lock().await.current().clone();

    let owner = if rc.owner_id == 0 {
        "not set".to_string()
    } else {
        match state.port.resolve_user(&rc.owner_id.to_string()).await {
            Ok(user) => format!("{} ({})", user.display(), rc.owner_id),
            Err(_) => rc.owner_id.to_string(),
        }
    };

    reply(
        bot,
        msg,
        format!(
            "Current configuration:\n\
             - media delay: {}s\n\
             - sticker/GIF delay: {}s\n\
             - max deletions/min: {}\n\
             - owner: {}\n\
             - sticker/GIF deletion: {}\n\
             - bot-only mode: {}\n\n\
             Change values with /setconfig <key> <value>.",
            rc.deletion_delay_seconds,
            rc.sticker_delay_seconds,
            rc.max_deletions_per_minute,
            owner,
            on_off(rc.sticker_deletion_enabled),
            on_off(rc.bot_only_mode),
        ),
    )
    .await
}

async fn set_config(bot: &Bot, msg: &Message, state: &AppState, args: &[String]) -> Result<()> {
    let (Some(key_name), Some(raw_value)) = (args.first(), args.get(1)) else {
        return reply(
            bot,
            msg,
            "Usage: /setconfig <key> <value>\n\
             Keys: delay, stickerdelay, maxdeletions, owner\n\
             Example: /setconfig delay 60",
        )
        .await;
    };

    let Some(key) = ConfigKey::parse(key_name) else {
        return reply(bot, msg, format!("Unknown config key '{key_name}'.")).await;
    };

    // Owner accepts @username too; everything else is a plain integer.
    let value = if key == ConfigKey::Owner && raw_value.starts_with('@') {
        state.port.resolve_user(raw_value).await?.id.0
    } else {
        raw_value
            .parse::<i64>()
            .map_err(|_| Error::InvalidInput(format!("'{raw_value}' is not a number")))?
    };

    match state.config.lock().await.set(key, value) {
        Ok(old) => {
            info!("config updated: {} = {value}", key.name());
            reply(bot, msg, format!("Updated {}: {old} -> {value}", key.name())).await
        }
        Err(Error::InvalidInput(reason)) => reply(bot, msg, format!("Rejected: {reason}")).await,
        Err(e) => reply(bot, msg, format!("Failed to save configuration: {e}")).await,
    }
}

async fn reset_config(bot: &Bot, msg: &Message, state: &AppState, args: &[String]) -> Result<()> {
    if args.first().map(|s| s.to_lowercase()) != Some("confirm".to_string()) {
        return reply(
            bot,
            msg,
            "This resets all configuration to the environment defaults.\n\
             To confirm, use: /resetconfig confirm",
        )
        .await;
    }

    match state.config.lock().await.reset_to_defaults() {
        Ok(()) => {
            info!("configuration reset to defaults");
            reply(bot, msg, "Configuration reset to defaults.").await
        }
        Err(e) => reply(bot, msg, format!("Failed to save configuration: {e}")).await,
    }
}

async fn status(bot: &Bot, msg: &Message, state: &AppState) -> Result<()> {
    let rc = state.config.lock().await.current().clone();

    let rights_line = if msg.chat.is_group() || msg.chat.is_supergroup() {
        // Forced fresh check; also refreshes the cache entry.
        let chat_id = ChatId(msg.chat.id.0);
        let has_rights = verify_delete_rights(state.port.as_ref(), chat_id).await;
        state.admin_cache.lock().await.set(chat_id, has_rights);
        if has_rights {
            "delete rights here: yes\n"
        } else {
            "delete rights here: NO\n"
        }
    } else {
        ""
    };

    let (paused, pause_reason) = {
        let p = state.pause.lock().await;
        (p.is_paused(), p.reason().to_string())
    };
    let pause_line = if paused {
        format!("PAUSED ({pause_reason})")
    } else {
        "running".to_string()
    };

    let rate_now = state.rate.lock().await.current_rate();
    let sudo_count = state.sudo.lock().await.len();
    let exempt_count = state.exemptions.lock().await.len();

    reply(
        bot,
        msg,
        format!(
            "{rights_line}state: {pause_line}\n\
             deletions last minute: {rate_now}/{}\n\
             media delay: {}s, sticker/GIF delay: {}s\n\
             sticker/GIF deletion: {}, bot-only mode: {}\n\
             sudo users: {sudo_count}, active exemptions: {exempt_count}",
            rc.max_deletions_per_minute,
            rc.deletion_delay_seconds,
            rc.sticker_delay_seconds,
            on_off(rc.sticker_deletion_enabled),
            on_off(rc.bot_only_mode),
        ),
    )
    .await
}

async fn clear_cache(bot: &Bot, msg: &Message, state: &AppState) -> Result<()> {
    state.admin_cache.lock().await.clear();
    info!("admin rights cache cleared");
    reply(bot, msg, "Admin rights cache cleared.").await
}

async fn add_sudo(bot: &Bot, msg: &Message, state: &AppState, args: &[String]) -> Result<()> {
    let user = resolve_target(state, msg, args).await?;

    if user.id.0 == state.config.lock().await.current().owner_id {
        return reply(bot, msg, "The owner is already permanently exempt.").await;
    }

    match state.sudo.lock().await.add(user.id) {
        Ok(true) => {
            info!("added sudo user {}", user.id.0);
            reply(
                bot,
                msg,
                format!("Added {} (id {}) to sudo users.", user.display(), user.id.0),
            )
            .await
        }
        Ok(false) => reply(bot, msg, format!("{} is already a sudo user.", user.display())).await,
        Err(e) => reply(bot, msg, format!("Failed to save sudo users: {e}")).await,
    }
}

async fn remove_sudo(bot: &Bot, msg: &Message, state: &AppState, args: &[String]) -> Result<()> {
    let user = resolve_target(state, msg, args).await?;

    match state.sudo.lock().await.remove(user.id) {
        Ok(true) => {
            info!("removed sudo user {}", user.id.0);
            reply(
                bot,
                msg,
                format!("Removed {} (id {}) from sudo users.", user.display(), user.id.0),
            )
            .await
        }
        Ok(false) => reply(bot, msg, format!("{} is not a sudo user.", user.display())).await,
        Err(e) => reply(bot, msg, format!("Failed to save sudo users: {e}")).await,
    }
}

async fn list_sudo(bot: &Bot, msg: &Message, state: &AppState) -> Result<()> {
    let ids: Vec<i64> = state.sudo.lock().await.list().to_vec();
    if ids.is_empty() {
        return reply(bot, msg, "No sudo users.").await;
    }

    let mut out = String::from("Sudo users:\n");
    for (i, id) in ids.iter().enumerate() {
        let line = match state.port.resolve_user(&id.to_string()).await {
            Ok(user) => format!("{}. {} - id {id}\n", i + 1, user.display()),
            Err(_) => format!("{}. id {id}\n", i + 1),
        };
        out.push_str(&line);
    }
    out.push_str(&format!("Total: {}", ids.len()));
    reply(bot, msg, out).await
}

async fn exempt(bot: &Bot, msg: &Message, state: &AppState, args: &[String]) -> Result<()> {
    let user = resolve_target(state, msg, args).await?;

    // With a reply the duration is the first argument; otherwise the target
    // took that slot and the duration follows it. Defaults to one hour.
    let duration_idx = if msg.reply_to_message().is_some() { 0 } else { 1 };
    let duration_str = args
        .get(duration_idx)
        .map(|s| s.as_str())
        .unwrap_or("1h");
    let duration = parse_duration(duration_str)?;

    if user.id.0 == state.config.lock().await.current().owner_id {
        return reply(bot, msg, "The owner is already permanently exempt.").await;
    }
    if state.sudo.lock().await.is_sudo(user.id) {
        return reply(bot, msg, "Sudo users are already permanently exempt.").await;
    }

    let expires_at = Utc::now().checked_add_signed(duration).ok_or_else(|| {
        Error::InvalidInput(format!("duration '{duration_str}' is too large"))
    })?;
    match state.exemptions.lock().await.add(user.id, expires_at) {
        Ok(()) => {
            info!("exempted user {} until {expires_at}", user.id.0);
            reply(
                bot,
                msg,
                format!(
                    "Exempted {} (id {}) for {duration_str}, until {}.",
                    user.display(),
                    user.id.0,
                    expires_at.format("%Y-%m-%d %H:%M:%S UTC"),
                ),
            )
            .await
        }
        Err(e) => reply(bot, msg, format!("Failed to save exemption: {e}")).await,
    }
}

async fn remove_exemption(
    bot: &Bot,
    msg: &Message,
    state: &AppState,
    args: &[String],
) -> Result<()> {
    let user = resolve_target(state, msg, args).await?;

    match state.exemptions.lock().await.remove(user.id) {
        Ok(true) => {
            info!("removed exemption for user {}", user.id.0);
            reply(
                bot,
                msg,
                format!("Removed exemption for {} (id {}).", user.display(), user.id.0),
            )
            .await
        }
        Ok(false) => reply(bot, msg, format!("{} is not exempted.", user.display())).await,
        Err(e) => reply(bot, msg, format!("Failed to save exemptions: {e}")).await,
    }
}

async fn list_exemptions(bot: &Bot, msg: &Message, state: &AppState) -> Result<()> {
    let entries = {
        let mut store = state.exemptions.lock().await;
        // Sweep first so the listing never shows stale entries.
        let _ = store.sweep_expired()?;
        store.entries().collect::<Vec<_>>()
    };

    if entries.is_empty() {
        return reply(bot, msg, "No active exemptions.").await;
    }

    let now = Utc::now();
    let mut out = String::from("Temporary exemptions:\n");
    for (i, (user_id, expires_at)) in entries.iter().enumerate() {
        let left = format_time_left(*expires_at - now);
        let line = match state.port.resolve_user(&user_id.0.to_string()).await {
            Ok(user) => format!("{}. {} - id {} - {left} left\n", i + 1, user.display(), user_id.0),
            Err(_) => format!("{}. id {} - {left} left\n", i + 1, user_id.0),
        };
        out.push_str(&line);
    }
    reply(bot, msg, out).await
}

async fn toggle_stickers(bot: &Bot, msg: &Message, state: &AppState) -> Result<()> {
    match state.config.lock().await.toggle_sticker_deletion() {
        Ok(enabled) => {
            info!("sticker/GIF deletion toggled {}", on_off(enabled));
            reply(
                bot,
                msg,
                format!("Sticker/GIF deletion is now {}.", on_off(enabled)),
            )
            .await
        }
        Err(e) => reply(bot, msg, format!("Failed to save configuration: {e}")).await,
    }
}

async fn toggle_bot_only(bot: &Bot, msg: &Message, state: &AppState) -> Result<()> {
    match state.config.lock().await.toggle_bot_only_mode() {
        Ok(enabled) => {
            info!("bot-only mode toggled {}", on_off(enabled));
            let targets = if enabled {
                "only bot messages"
            } else {
                "all user messages"
            };
            reply(
                bot,
                msg,
                format!("Bot-only mode is now {}. Targeting: {targets}.", on_off(enabled)),
            )
            .await
        }
        Err(e) => reply(bot, msg, format!("Failed to save configuration: {e}")).await,
    }
}

async fn pause(bot: &Bot, msg: &Message, state: &AppState, args: &[String]) -> Result<()> {
    let reason = if args.is_empty() {
        "manual pause".to_string()
    } else {
        args.join(" ")
    };
    state.pause.lock().await.pause(reason.clone());
    info!("paused: {reason}");
    reply(
        bot,
        msg,
        format!("Paused ({reason}). Already-scheduled deletions still run."),
    )
    .await
}

async fn resume(bot: &Bot, msg: &Message, state: &AppState) -> Result<()> {
    if state.pause.lock().await.resume() {
        info!("resumed");
        reply(bot, msg, "Resumed.").await
    } else {
        reply(bot, msg, "Not paused.").await
    }
}

async fn reset_rate(bot: &Bot, msg: &Message, state: &AppState) -> Result<()> {
    state.rate.lock().await.reset();
    info!("rate limiter reset");
    reply(bot, msg, "Rate limiter reset.").await
}

/// Immediate deletion of the replied-to message, as a rights self-test.
async fn test_delete(bot: &Bot, msg: &Message, state: &AppState) -> Result<()> {
    let Some(target) = msg.reply_to_message() else {
        return reply(bot, msg, "Reply to a message to test deletion.").await;
    };

    let target = MessageRef {
        chat_id: ChatId(msg.chat.id.0),
        message_id: MessageId(target.id.0),
    };

    let result = state.port.delete_message(target).await;
    match &result {
        Ok(()) => info!("test deletion succeeded in chat {}", target.chat_id.0),
        Err(DeleteError::Forbidden) => {
            // Same bookkeeping as a scheduled deletion hitting a rights wall.
            state.admin_cache.lock().await.set(target.chat_id, false);
        }
        Err(_) => {}
    }
    reply(bot, msg, delete_verdict(&result)).await
}

fn delete_verdict(result: &std::result::Result<(), DeleteError>) -> String {
    match result {
        Ok(()) => "Successfully deleted the message.".to_string(),
        Err(DeleteError::Forbidden) => {
            "Cannot delete: no delete rights in this chat.".to_string()
        }
        Err(DeleteError::NotFound) => "Cannot delete: the message is already gone.".to_string(),
        Err(DeleteError::Other(e)) => format!("Cannot delete: {e}"),
    }
}

async fn help(bot: &Bot, msg: &Message) -> Result<()> {
    reply(
        bot,
        msg,
        "Commands:\n\
         /config, /setconfig <key> <value>, /resetconfig confirm\n\
         /status, /clearcache, /resetrate, /testdelete (reply)\n\
         /addsudo, /rmsudo, /listsudo\n\
         /exempt <user> [duration], /rmexempt <user>, /listexempt\n\
         /stickers, /botonly\n\
         /pause [reason], /resume",
    )
    .await
}

fn on_off(v: bool) -> &'static str {
    if v {
        "ON"
    } else {
        "OFF"
    }
}
