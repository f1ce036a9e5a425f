use teloxide::types::Message;
use tracing::debug;

use swb_core::{
    domain::{ChatId, MediaKind, MediaMessage, MessageId, MessageRef, Sender, UserId},
    policy::Decision,
    Result,
};

use crate::router::AppState;

/// Map a Telegram message to the media kind the policy acts on.
///
/// Animation is checked before document: Telegram historically sets both
/// fields on GIF messages.
pub fn classify(msg: &Message) -> Option<MediaKind> {
    if msg.sticker().is_some() {
        Some(MediaKind::Sticker)
    } else if msg.animation().is_some() {
        Some(MediaKind::Animation)
    } else if msg.photo().is_some() {
        Some(MediaKind::Photo)
    } else if msg.video().is_some() {
        Some(MediaKind::Video)
    } else if msg.document().is_some() {
        Some(MediaKind::Document)
    } else if msg.audio().is_some() {
        Some(MediaKind::Audio)
    } else if msg.voice().is_some() {
        Some(MediaKind::Voice)
    } else if msg.video_note().is_some() {
        Some(MediaKind::VideoNote)
    } else {
        None
    }
}

/// Per-group-message pipeline: classify, admit, schedule.
pub async fn handle_group_message(msg: &Message, state: &AppState) -> Result<()> {
    let Some(kind) = classify(msg) else {
        return Ok(());
    };
    let Some(from) = msg.from() else {
        // Channel posts and service messages have no sender to judge.
        return Ok(());
    };

    let media = MediaMessage {
        message: MessageRef {
            chat_id: ChatId(msg.chat.id.0),
            message_id: MessageId(msg.id.0),
        },
        sender: Sender {
            id: UserId(from.id.0 as i64),
            username: from.username.clone(),
            is_bot: from.is_bot,
        },
        kind,
        chat_title: msg.chat.title().map(|s| s.to_string()),
    };

    match state.policy.admit(&media).await {
        Decision::Admit => {
            // Fire-and-forget; the scheduler owns the delay and the outcome.
            let _ = state.scheduler.schedule(media);
        }
        Decision::Skip(reason) => {
            debug!(
                "skipped {} from {} in chat {}: {reason:?}",
                kind.as_str(),
                from.id.0,
                msg.chat.id.0
            );
        }
    }

    Ok(())
}
