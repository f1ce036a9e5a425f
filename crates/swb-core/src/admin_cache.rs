use std::{
    collections::{HashMap, HashSet},
    time::{Duration, Instant},
};

use crate::domain::ChatId;

pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Time-boxed cache of "can this account delete messages in chat X".
///
/// Entries are advisory: a stale `true` costs at most one failed deletion,
/// because a forbidden delete overwrites the entry with `false`. The warned
/// set is a separate namespace used only to keep the "no rights here"
/// operator warning to one per chat; it never expires on its own.
#[derive(Debug)]
pub struct AdminRightsCache {
    ttl: Duration,
    rights: HashMap<ChatId, (Instant, bool)>,
    warned: HashSet<ChatId>,
}

impl AdminRightsCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            rights: HashMap::new(),
            warned: HashSet::new(),
        }
    }

    /// Cached verdict, or `None` when absent/expired (caller must recheck).
    pub fn get(&self, chat_id: ChatId) -> Option<bool> {
        self.get_at(chat_id, Instant::now())
    }

    pub fn get_at(&self, chat_id: ChatId, now: Instant) -> Option<bool> {
        let (cached_at, has_rights) = self.rights.get(&chat_id)?;
        if now.duration_since(*cached_at) < self.ttl {
            Some(*has_rights)
        } else {
            None
        }
    }

    /// (Re)write the verdict, resetting its TTL clock.
    pub fn set(&mut self, chat_id: ChatId, has_rights: bool) {
        self.set_at(chat_id, has_rights, Instant::now());
    }

    pub fn set_at(&mut self, chat_id: ChatId, has_rights: bool, now: Instant) {
        self.rights.insert(chat_id, (now, has_rights));
    }

    /// Drop everything, warned markers included: a manual force-recheck for
    /// every chat.
    pub fn clear(&mut self) {
        self.rights.clear();
        self.warned.clear();
    }

    pub fn was_warned(&self, chat_id: ChatId) -> bool {
        self.warned.contains(&chat_id)
    }

    pub fn mark_warned(&mut self, chat_id: ChatId) {
        self.warned.insert(chat_id);
    }
}

impl Default for AdminRightsCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
