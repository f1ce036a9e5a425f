/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// A stable reference to a Telegram message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Media attachment kinds the bot acts on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Sticker,
    Animation,
    Photo,
    Video,
    Document,
    Audio,
    Voice,
    VideoNote,
}

impl MediaKind {
    /// Stickers and GIFs share a longer delay and a dedicated kill switch.
    pub fn is_sticker_like(self) -> bool {
        matches!(self, MediaKind::Sticker | MediaKind::Animation)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Sticker => "sticker",
            MediaKind::Animation => "animation",
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
            MediaKind::Document => "document",
            MediaKind::Audio => "audio",
            MediaKind::Voice => "voice",
            MediaKind::VideoNote => "video_note",
        }
    }
}

/// Author of an incoming message, as far as admission cares.
#[derive(Clone, Debug)]
pub struct Sender {
    pub id: UserId,
    pub username: Option<String>,
    pub is_bot: bool,
}

/// A detected media message flowing through the admission pipeline.
#[derive(Clone, Debug)]
pub struct MediaMessage {
    pub message: MessageRef,
    pub sender: Sender,
    pub kind: MediaKind,
    pub chat_title: Option<String>,
}
