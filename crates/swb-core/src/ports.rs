use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef, UserId},
    Result,
};

/// The operating account, as seen by the platform.
#[derive(Clone, Copy, Debug)]
pub struct SelfIdentity {
    pub id: UserId,
}

/// Membership of a user in a chat, reduced to what the rights check needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberStatus {
    /// Creator/owner of the chat.
    Owner,
    /// Administrator; `can_delete_messages` is `None` when the platform did
    /// not expose the privilege set.
    Administrator { can_delete_messages: Option<bool> },
    Member,
    Restricted,
    Left,
    Banned,
}

/// A user looked up from an id or `@username` for command handling.
#[derive(Clone, Debug)]
pub struct ResolvedUser {
    pub id: UserId,
    pub username: Option<String>,
    pub display_name: String,
}

impl ResolvedUser {
    pub fn display(&self) -> String {
        match &self.username {
            Some(u) => format!("{} (@{u})", self.display_name),
            None => self.display_name.clone(),
        }
    }
}

/// Typed outcome classes for the delete RPC. The caller's reaction differs
/// per class: forbidden invalidates the rights cache, not-found is a benign
/// miss, anything else is logged and dropped.
#[derive(Clone, Debug, thiserror::Error)]
pub enum DeleteError {
    #[error("no permission to delete")]
    Forbidden,
    #[error("message to delete not found")]
    NotFound,
    #[error("delete failed: {0}")]
    Other(String),
}

/// Hexagonal port for the chat platform.
///
/// Telegram is the first implementation; the shape is platform-neutral so a
/// future adapter can sit behind the same trait.
#[async_trait]
pub trait ChatPort: Send + Sync {
    async fn get_me(&self) -> Result<SelfIdentity>;

    async fn get_chat_member(&self, chat_id: ChatId, user_id: UserId) -> Result<MemberStatus>;

    async fn delete_message(&self, msg: MessageRef) -> std::result::Result<(), DeleteError>;

    /// Resolve a numeric id or `@username`. Used by command handlers only,
    /// never on the per-message hot path.
    async fn resolve_user(&self, query: &str) -> Result<ResolvedUser>;
}
