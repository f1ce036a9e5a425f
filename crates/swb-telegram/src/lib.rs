//! Telegram adapter (teloxide).
//!
//! Implements the `swb-core` `ChatPort` over the Telegram Bot API and hosts
//! the long-polling router plus the update handlers.

use async_trait::async_trait;

use teloxide::{prelude::*, types::ChatMemberKind, ApiError, RequestError};

use tokio::time::sleep;

pub mod handlers;
pub mod router;

use swb_core::{
    domain::{ChatId, MessageRef, UserId},
    errors::Error,
    ports::{ChatPort, DeleteError, MemberStatus, ResolvedUser, SelfIdentity},
    Result,
};

#[derive(Clone)]
pub struct TelegramChatPort {
    bot: Bot,
}

impl TelegramChatPort {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn map_err(e: RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    /// Classify a failed `deleteMessage` call. Telegram reports the
    /// permission case as "message can't be deleted"; odd deployments
    /// surface raw `MESSAGE_DELETE_FORBIDDEN` strings instead, so those are
    /// matched too.
    fn classify_delete_error(e: RequestError) -> DeleteError {
        match &e {
            RequestError::Api(ApiError::MessageCantBeDeleted) => DeleteError::Forbidden,
            RequestError::Api(ApiError::MessageToDeleteNotFound)
            | RequestError::Api(ApiError::MessageIdInvalid) => DeleteError::NotFound,
            RequestError::Api(ApiError::Unknown(text)) => {
                let lowered = text.to_lowercase();
                if lowered.contains("message_delete_forbidden")
                    || lowered.contains("not enough rights")
                {
                    DeleteError::Forbidden
                } else if lowered.contains("message to delete not found") {
                    DeleteError::NotFound
                } else {
                    DeleteError::Other(text.clone())
                }
            }
            other => DeleteError::Other(other.to_string()),
        }
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> std::result::Result<T, RequestError>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(other),
                },
            }
        }
    }
}

#[async_trait]
impl ChatPort for TelegramChatPort {
    async fn get_me(&self) -> Result<SelfIdentity> {
        let me = self
            .with_retry(|| self.bot.get_me())
            .await
            .map_err(Self::map_err)?;
        Ok(SelfIdentity {
            id: UserId(me.user.id.0 as i64),
        })
    }

    async fn get_chat_member(&self, chat_id: ChatId, user_id: UserId) -> Result<MemberStatus> {
        let member = self
            .with_retry(|| {
                self.bot.get_chat_member(
                    Self::tg_chat(chat_id),
                    teloxide::types::UserId(user_id.0 as u64),
                )
            })
            .await
            .map_err(Self::map_err)?;

        Ok(match member.kind {
            ChatMemberKind::Owner(_) => MemberStatus::Owner,
            ChatMemberKind::Administrator(admin) => MemberStatus::Administrator {
                can_delete_messages: Some(admin.can_delete_messages),
            },
            ChatMemberKind::Member => MemberStatus::Member,
            ChatMemberKind::Restricted(_) => MemberStatus::Restricted,
            ChatMemberKind::Left => MemberStatus::Left,
            ChatMemberKind::Banned(_) => MemberStatus::Banned,
        })
    }

    async fn delete_message(&self, msg: MessageRef) -> std::result::Result<(), DeleteError> {
        self.with_retry(|| {
            self.bot.delete_message(
                Self::tg_chat(msg.chat_id),
                teloxide::types::MessageId(msg.message_id.0),
            )
        })
        .await
        .map(|_| ())
        .map_err(Self::classify_delete_error)
    }

    async fn resolve_user(&self, query: &str) -> Result<ResolvedUser> {
        let query = query.trim();

        // Numeric id: fetch the private chat for display data, best-effort.
        if let Ok(id) = query.parse::<i64>() {
            let user = match self
                .with_retry(|| self.bot.get_chat(teloxide::types::ChatId(id)))
                .await
            {
                Ok(chat) => ResolvedUser {
                    id: UserId(id),
                    username: chat.username().map(|s| s.to_string()),
                    display_name: chat
                        .first_name()
                        .or_else(|| chat.title())
                        .unwrap_or("unknown")
                        .to_string(),
                },
                Err(_) => ResolvedUser {
                    id: UserId(id),
                    username: None,
                    display_name: "unknown".to_string(),
                },
            };
            return Ok(user);
        }

        // The Bot API cannot look up arbitrary users by @username; it only
        // resolves public chats. Try that and report failure honestly.
        if let Some(name) = query.strip_prefix('@') {
            let chat = self
                .with_retry(|| {
                    self.bot
                        .get_chat(teloxide::types::Recipient::ChannelUsername(format!(
                            "@{name}"
                        )))
                })
                .await
                .map_err(|_| {
                    Error::InvalidInput(format!(
                        "cannot resolve @{name}; reply to one of their messages or use the numeric id"
                    ))
                })?;
            return Ok(ResolvedUser {
                id: UserId(chat.id.0),
                username: chat.username().map(|s| s.to_string()),
                display_name: chat
                    .first_name()
                    .or_else(|| chat.title())
                    .unwrap_or("unknown")
                    .to_string(),
            });
        }

        Err(Error::InvalidInput(format!(
            "'{query}' is not a user id or @username"
        )))
    }
}
