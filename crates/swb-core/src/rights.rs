use tracing::debug;

use crate::{
    domain::{ChatId, MessageId, MessageRef},
    ports::{ChatPort, DeleteError, MemberStatus},
};

/// Sentinel message id for the delete probe. Deliberately implausible so the
/// expected outcome is a not-found error.
pub const PROBE_MESSAGE_ID: MessageId = MessageId(999_999_999);

/// Determine whether the operating account can delete messages in `chat_id`.
///
/// Chat owners always can. For administrators the `can_delete_messages` flag
/// is used when exposed; when the platform omits the privilege set we assume
/// true (the platform usually omits it only when it equals the role default;
/// a wrong guess costs one failed delete, which corrects the cache). Plain
/// members and any lookup failure fall back to a probe: try deleting a
/// message that does not exist, and read "not found" as permission granted.
pub async fn verify_delete_rights(port: &dyn ChatPort, chat_id: ChatId) -> bool {
    let membership = async {
        let me = port.get_me().await?;
        port.get_chat_member(chat_id, me.id).await
    }
    .await;

    match membership {
        Ok(MemberStatus::Owner) => true,
        Ok(MemberStatus::Administrator {
            can_delete_messages: Some(flag),
        }) => flag,
        Ok(MemberStatus::Administrator {
            can_delete_messages: None,
        }) => true,
        Ok(_) => probe(port, chat_id).await,
        Err(e) => {
            debug!("membership lookup failed in chat {}: {e}", chat_id.0);
            probe(port, chat_id).await
        }
    }
}

async fn probe(port: &dyn ChatPort, chat_id: ChatId) -> bool {
    let target = MessageRef {
        chat_id,
        message_id: PROBE_MESSAGE_ID,
    };
    match port.delete_message(target).await {
        // Either the sentinel somehow existed, or deleting it failed only
        // because there was nothing to delete: both mean we may delete.
        Ok(()) | Err(DeleteError::NotFound) => true,
        Err(e) => {
            debug!("delete probe failed in chat {}: {e}", chat_id.0);
            false
        }
    }
}
