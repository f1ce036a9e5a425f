use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{
    admin_cache::AdminRightsCache,
    config::ConfigStore,
    domain::{ChatId, MediaMessage},
    ports::ChatPort,
    rate::RateLimiter,
    rights::verify_delete_rights,
    store::{ExemptionStore, SudoStore},
};

/// Operator pause switch. Pausing only stops new admissions; deletions that
/// were already scheduled run to completion.
#[derive(Debug, Default)]
pub struct PauseState {
    paused: bool,
    reason: String,
}

impl PauseState {
    pub fn pause(&mut self, reason: impl Into<String>) {
        self.paused = true;
        self.reason = reason.into();
    }

    /// Returns false if the bot was not paused.
    pub fn resume(&mut self) -> bool {
        if !self.paused {
            return false;
        }
        self.paused = false;
        self.reason.clear();
        true
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Terminal outcome of admission for one detected media message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Admit,
    Skip(SkipReason),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    Paused,
    /// Bot-only mode is on and the sender is human.
    NotFromBot,
    Owner,
    Sudo,
    Exempt,
    StickerDeletionDisabled,
    NoDeleteRights,
    RateLimited,
}

/// Per-message accept/reject decision over the shared caches and stores.
///
/// Check order is load-bearing: cheap local checks (pause, privilege,
/// exemption, media-type switch) come before the admin-rights check (a
/// network round trip on cache miss) and the rate check, so skipped messages
/// burn neither API calls nor rate budget.
pub struct AdmissionPolicy {
    port: Arc<dyn ChatPort>,
    config: Arc<Mutex<ConfigStore>>,
    sudo: Arc<Mutex<SudoStore>>,
    exemptions: Arc<Mutex<ExemptionStore>>,
    admin_cache: Arc<Mutex<AdminRightsCache>>,
    rate: Arc<Mutex<RateLimiter>>,
    pause: Arc<Mutex<PauseState>>,
}

impl AdmissionPolicy {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        port: Arc<dyn ChatPort>,
        config: Arc<Mutex<ConfigStore>>,
        sudo: Arc<Mutex<SudoStore>>,
        exemptions: Arc<Mutex<ExemptionStore>>,
        admin_cache: Arc<Mutex<AdminRightsCache>>,
        rate: Arc<Mutex<RateLimiter>>,
        pause: Arc<Mutex<PauseState>>,
    ) -> Self {
        Self {
            port,
            config,
            sudo,
            exemptions,
            admin_cache,
            rate,
            pause,
        }
    }

    /// Decide whether `msg` proceeds to deletion scheduling. Media
    /// classification already happened in the adapter; `msg.kind` is the
    /// detected type.
    pub async fn admit(&self, msg: &MediaMessage) -> Decision {
        if self.pause.lock().await.is_paused() {
            return Decision::Skip(SkipReason::Paused);
        }

        let (bot_only, sticker_enabled, owner_id, max_per_minute) = {
            let cfg = self.config.lock().await;
            let rc = cfg.current();
            (
                rc.bot_only_mode,
                rc.sticker_deletion_enabled,
                rc.owner_id,
                rc.max_deletions_per_minute,
            )
        };

        // Bot-only mode inverts targeting: only automated senders' media is
        // eligible, everything human is ignored.
        if bot_only && !msg.sender.is_bot {
            return Decision::Skip(SkipReason::NotFromBot);
        }

        if owner_id != 0 && msg.sender.id.0 == owner_id {
            debug!("skipping media from owner (id {})", owner_id);
            return Decision::Skip(SkipReason::Owner);
        }

        if self.sudo.lock().await.is_sudo(msg.sender.id) {
            debug!("skipping media from sudo user {}", msg.sender.id.0);
            return Decision::Skip(SkipReason::Sudo);
        }

        if self.exemptions.lock().await.is_exempt(msg.sender.id) {
            debug!("skipping media from exempted user {}", msg.sender.id.0);
            return Decision::Skip(SkipReason::Exempt);
        }

        if msg.kind.is_sticker_like() && !sticker_enabled {
            return Decision::Skip(SkipReason::StickerDeletionDisabled);
        }

        if !self.resolve_rights(msg.message.chat_id, msg.chat_title.as_deref()).await {
            return Decision::Skip(SkipReason::NoDeleteRights);
        }

        if !self.rate.lock().await.can_delete(max_per_minute) {
            debug!("rate limit reached, skipping deletion");
            return Decision::Skip(SkipReason::RateLimited);
        }

        Decision::Admit
    }

    /// Cached rights verdict, refreshed on miss. Emits the "no delete rights
    /// here" warning at most once per chat until the cache is cleared.
    async fn resolve_rights(&self, chat_id: ChatId, chat_title: Option<&str>) -> bool {
        if let Some(cached) = self.admin_cache.lock().await.get(chat_id) {
            return cached;
        }

        let has_rights = verify_delete_rights(self.port.as_ref(), chat_id).await;

        let mut cache = self.admin_cache.lock().await;
        cache.set(chat_id, has_rights);
        if !has_rights && !cache.was_warned(chat_id) {
            cache.mark_warned(chat_id);
            warn!(
                "no delete rights in '{}' (chat {}), skipping all media there",
                chat_title.unwrap_or("unknown"),
                chat_id.0
            );
        }
        has_rights
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{Config, ConfigKey},
        domain::{MediaKind, MessageId, MessageRef, Sender, UserId},
        ports::{DeleteError, MemberStatus},
        rights::tests::FakePort,
    };
    use chrono::{Duration as ChronoDuration, Utc};
    use std::path::PathBuf;
    use std::sync::atomic::Ordering;

    fn tmp_dir(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let pid = std::process::id();
        let dir = PathBuf::from(format!("/tmp/{prefix}-{pid}-{ts}"));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    struct Fixture {
        port: Arc<FakePort>,
        policy: AdmissionPolicy,
        config: Arc<Mutex<ConfigStore>>,
        sudo: Arc<Mutex<SudoStore>>,
        exemptions: Arc<Mutex<ExemptionStore>>,
        admin_cache: Arc<Mutex<AdminRightsCache>>,
        rate: Arc<Mutex<RateLimiter>>,
        pause: Arc<Mutex<PauseState>>,
    }

    fn fixture(prefix: &str, port: FakePort) -> Fixture {
        let dir = tmp_dir(prefix);
        let cfg = Config {
            telegram_bot_token: "token".to_string(),
            operator_ids: vec![1],
            data_dir: dir.clone(),
            default_deletion_delay_secs: 40,
            default_sticker_delay_secs: 360,
            default_max_deletions_per_minute: 20,
            default_owner_id: 777,
        };
        let port = Arc::new(port);
        let config = Arc::new(Mutex::new(ConfigStore::load(&cfg)));
        let sudo = Arc::new(Mutex::new(SudoStore::load(cfg.sudo_path())));
        let exemptions = Arc::new(Mutex::new(ExemptionStore::load(cfg.exemptions_path())));
        let admin_cache = Arc::new(Mutex::new(AdminRightsCache::default()));
        let rate = Arc::new(Mutex::new(RateLimiter::new()));
        let pause = Arc::new(Mutex::new(PauseState::default()));

        let policy = AdmissionPolicy::new(
            port.clone(),
            config.clone(),
            sudo.clone(),
            exemptions.clone(),
            admin_cache.clone(),
            rate.clone(),
            pause.clone(),
        );

        Fixture {
            port,
            policy,
            config,
            sudo,
            exemptions,
            admin_cache,
            rate,
            pause,
        }
    }

    fn media(sender_id: i64, is_bot: bool, kind: MediaKind) -> MediaMessage {
        MediaMessage {
            message: MessageRef {
                chat_id: ChatId(-1001),
                message_id: MessageId(42),
            },
            sender: Sender {
                id: UserId(sender_id),
                username: Some("someone".to_string()),
                is_bot,
            },
            kind,
            chat_title: Some("test group".to_string()),
        }
    }

    fn member_port_with_rights() -> FakePort {
        FakePort::new(Ok(MemberStatus::Owner), Ok(()))
    }

    #[tokio::test]
    async fn qualifying_message_is_admitted() {
        let fx = fixture("swb-policy-admit", member_port_with_rights());
        let d = fx.policy.admit(&media(5, false, MediaKind::Photo)).await;
        assert_eq!(d, Decision::Admit);
    }

    #[tokio::test]
    async fn pause_skips_before_everything() {
        let fx = fixture("swb-policy-pause", member_port_with_rights());
        fx.pause.lock().await.pause("maintenance");
        let d = fx.policy.admit(&media(5, false, MediaKind::Photo)).await;
        assert_eq!(d, Decision::Skip(SkipReason::Paused));
        assert_eq!(fx.port.member_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn owner_short_circuits_before_rights_and_rate() {
        let fx = fixture("swb-policy-owner", member_port_with_rights());
        let d = fx.policy.admit(&media(777, false, MediaKind::Photo)).await;
        assert_eq!(d, Decision::Skip(SkipReason::Owner));
        // No membership lookup, no probe, no rate budget spent.
        assert_eq!(fx.port.member_calls.load(Ordering::SeqCst), 0);
        assert_eq!(fx.port.delete_calls.load(Ordering::SeqCst), 0);
        assert_eq!(fx.rate.lock().await.current_rate(), 0);
    }

    #[tokio::test]
    async fn sudo_user_is_skipped() {
        let fx = fixture("swb-policy-sudo", member_port_with_rights());
        fx.sudo.lock().await.add(UserId(5)).unwrap();
        let d = fx.policy.admit(&media(5, false, MediaKind::Photo)).await;
        assert_eq!(d, Decision::Skip(SkipReason::Sudo));
    }

    #[tokio::test]
    async fn live_exemption_is_skipped() {
        let fx = fixture("swb-policy-exempt", member_port_with_rights());
        fx.exemptions
            .lock()
            .await
            .add(UserId(5), Utc::now() + ChronoDuration::minutes(30))
            .unwrap();
        let d = fx.policy.admit(&media(5, false, MediaKind::Photo)).await;
        assert_eq!(d, Decision::Skip(SkipReason::Exempt));
    }

    #[tokio::test]
    async fn bot_only_mode_inverts_targeting() {
        let fx = fixture("swb-policy-botonly", member_port_with_rights());
        fx.config.lock().await.toggle_bot_only_mode().unwrap();

        let human = fx.policy.admit(&media(5, false, MediaKind::Photo)).await;
        assert_eq!(human, Decision::Skip(SkipReason::NotFromBot));

        let bot = fx.policy.admit(&media(6, true, MediaKind::Photo)).await;
        assert_eq!(bot, Decision::Admit);
    }

    #[tokio::test]
    async fn disabled_sticker_deletion_skips_before_rights_and_rate() {
        let fx = fixture("swb-policy-sticker", member_port_with_rights());
        fx.config.lock().await.toggle_sticker_deletion().unwrap();

        for kind in [MediaKind::Sticker, MediaKind::Animation] {
            let d = fx.policy.admit(&media(5, false, kind)).await;
            assert_eq!(d, Decision::Skip(SkipReason::StickerDeletionDisabled));
        }
        // Never reached the rights check or rate check.
        assert_eq!(fx.port.member_calls.load(Ordering::SeqCst), 0);

        // Non-sticker media is unaffected by the switch.
        let d = fx.policy.admit(&media(5, false, MediaKind::Video)).await;
        assert_eq!(d, Decision::Admit);
    }

    #[tokio::test]
    async fn no_rights_cached_and_warned_once_until_clear() {
        // Plain member whose delete probe is forbidden: no rights.
        let fx = fixture(
            "swb-policy-norights",
            FakePort::new(Ok(MemberStatus::Member), Err(DeleteError::Forbidden)),
        );

        let chat = ChatId(-1001);
        for _ in 0..3 {
            let d = fx.policy.admit(&media(5, false, MediaKind::Photo)).await;
            assert_eq!(d, Decision::Skip(SkipReason::NoDeleteRights));
        }
        // Verified once, served from cache afterwards.
        assert_eq!(fx.port.member_calls.load(Ordering::SeqCst), 1);
        {
            let cache = fx.admin_cache.lock().await;
            assert_eq!(cache.get(chat), Some(false));
            assert!(cache.was_warned(chat));
        }

        fx.admin_cache.lock().await.clear();
        let d = fx.policy.admit(&media(5, false, MediaKind::Photo)).await;
        assert_eq!(d, Decision::Skip(SkipReason::NoDeleteRights));
        assert_eq!(fx.port.member_calls.load(Ordering::SeqCst), 2);
        assert!(fx.admin_cache.lock().await.was_warned(chat));
    }

    #[tokio::test]
    async fn rate_limit_admits_up_to_ceiling() {
        let fx = fixture("swb-policy-rate", member_port_with_rights());
        fx.config
            .lock()
            .await
            .set(ConfigKey::MaxDeletions, 2)
            .unwrap();

        // Deletion recording is the scheduler's job on success; emulate it
        // here after each admission.
        for _ in 0..2 {
            let d = fx.policy.admit(&media(5, false, MediaKind::Photo)).await;
            assert_eq!(d, Decision::Admit);
            fx.rate.lock().await.record_deletion();
        }

        let d = fx.policy.admit(&media(5, false, MediaKind::Photo)).await;
        assert_eq!(d, Decision::Skip(SkipReason::RateLimited));
    }

    #[tokio::test]
    async fn resume_reports_whether_it_was_paused() {
        let fx = fixture("swb-policy-resume", member_port_with_rights());
        assert!(!fx.pause.lock().await.resume());
        fx.pause.lock().await.pause("why not");
        assert_eq!(fx.pause.lock().await.reason(), "why not");
        assert!(fx.pause.lock().await.resume());
        assert!(!fx.pause.lock().await.is_paused());
    }
}
