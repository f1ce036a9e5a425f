use std::{sync::Arc, time::Duration};

use rand::Rng;
use tokio::{sync::Mutex, task::JoinHandle, time::sleep};
use tracing::{debug, info, warn};

use crate::{
    admin_cache::AdminRightsCache,
    config::{ConfigStore, RuntimeConfig},
    domain::{MediaKind, MediaMessage},
    ports::{ChatPort, DeleteError},
    rate::RateLimiter,
};

/// Largest random offset added on top of the configured base delay.
const MAX_JITTER_SECS: u64 = 5;

/// Runs the delayed deletion of an admitted message.
///
/// One fire-and-forget task per message: the sleep of one deletion never
/// blocks admission or scheduling of another. Tasks are not tracked; on
/// process exit in-flight deletions are abandoned.
#[derive(Clone)]
pub struct DeletionScheduler {
    port: Arc<dyn ChatPort>,
    config: Arc<Mutex<ConfigStore>>,
    rate: Arc<Mutex<RateLimiter>>,
    admin_cache: Arc<Mutex<AdminRightsCache>>,
}

impl DeletionScheduler {
    pub fn new(
        port: Arc<dyn ChatPort>,
        config: Arc<Mutex<ConfigStore>>,
        rate: Arc<Mutex<RateLimiter>>,
        admin_cache: Arc<Mutex<AdminRightsCache>>,
    ) -> Self {
        Self {
            port,
            config,
            rate,
            admin_cache,
        }
    }

    /// Spawn the delay-then-delete task for an admitted message. The handle
    /// is returned for tests; production callers drop it.
    pub fn schedule(&self, msg: MediaMessage) -> JoinHandle<()> {
        let port = self.port.clone();
        let config = self.config.clone();
        let rate = self.rate.clone();
        let admin_cache = self.admin_cache.clone();

        tokio::spawn(async move {
            let base = {
                let cfg = config.lock().await;
                base_delay_secs(msg.kind, cfg.current())
            };
            let jitter: u64 = rand::thread_rng().gen_range(0..=MAX_JITTER_SECS);
            let delay = base + jitter;

            info!(
                "scheduling deletion of {} from {} in chat {} in {delay}s",
                msg.kind.as_str(),
                msg.sender.id.0,
                msg.message.chat_id.0
            );
            sleep(Duration::from_secs(delay)).await;

            match port.delete_message(msg.message).await {
                Ok(()) => {
                    rate.lock().await.record_deletion();
                    info!(
                        "deleted {} from {} in chat {}",
                        msg.kind.as_str(),
                        msg.sender.id.0,
                        msg.message.chat_id.0
                    );
                }
                Err(DeleteError::Forbidden) => {
                    // Rights were revoked since the admission check; make
                    // later messages in this chat short-circuit until the
                    // next recheck.
                    admin_cache.lock().await.set(msg.message.chat_id, false);
                    warn!(
                        "delete forbidden in chat {}, rights cache invalidated",
                        msg.message.chat_id.0
                    );
                }
                Err(e) => {
                    // Message already gone, network hiccup: transient miss.
                    debug!(
                        "delete failed in chat {}: {e}",
                        msg.message.chat_id.0
                    );
                }
            }
        })
    }
}

fn base_delay_secs(kind: MediaKind, rc: &RuntimeConfig) -> u64 {
    if kind.is_sticker_like() {
        rc.sticker_delay_seconds
    } else {
        rc.deletion_delay_seconds
    }
}
