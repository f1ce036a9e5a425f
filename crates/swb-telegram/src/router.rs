use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tokio::sync::Mutex;
use tracing::info;

use swb_core::{
    admin_cache::AdminRightsCache,
    config::{Config, ConfigStore},
    policy::{AdmissionPolicy, PauseState},
    ports::ChatPort,
    rate::RateLimiter,
    scheduler::DeletionScheduler,
    store::{ExemptionStore, SudoStore},
};

use crate::handlers;
use crate::TelegramChatPort;

/// Shared state handed to every update handler.
#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub port: Arc<dyn ChatPort>,
    pub config: Arc<Mutex<ConfigStore>>,
    pub sudo: Arc<Mutex<SudoStore>>,
    pub exemptions: Arc<Mutex<ExemptionStore>>,
    pub admin_cache: Arc<Mutex<AdminRightsCache>>,
    pub rate: Arc<Mutex<RateLimiter>>,
    pub pause: Arc<Mutex<PauseState>>,
    pub policy: Arc<AdmissionPolicy>,
    pub scheduler: DeletionScheduler,
}

pub async fn run_polling(cfg: Arc<Config>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    if let Ok(me) = bot.get_me().await {
        info!("sweepbot started as @{}", me.username());
    }

    let port: Arc<dyn ChatPort> = Arc::new(TelegramChatPort::new(bot.clone()));

    let config = Arc::new(Mutex::new(ConfigStore::load(&cfg)));
    let sudo = Arc::new(Mutex::new(SudoStore::load(cfg.sudo_path())));
    let exemptions = Arc::new(Mutex::new(ExemptionStore::load(cfg.exemptions_path())));
    let admin_cache = Arc::new(Mutex::new(AdminRightsCache::default()));
    let rate = Arc::new(Mutex::new(RateLimiter::new()));
    let pause = Arc::new(Mutex::new(PauseState::default()));

    {
        let rc = config.lock().await.current().clone();
        let sudo_count = sudo.lock().await.len();
        let exempt_count = exemptions.lock().await.len();
        let owner = if rc.owner_id != 0 {
            rc.owner_id.to_string()
        } else {
            "unset".to_string()
        };
        info!(
            "media delay {}s, sticker delay {}s, max {}/min, owner {owner}, sudo users {sudo_count}, exemptions {exempt_count}, bot-only {}",
            rc.deletion_delay_seconds,
            rc.sticker_delay_seconds,
            rc.max_deletions_per_minute,
            rc.bot_only_mode,
        );
    }

    let policy = Arc::new(AdmissionPolicy::new(
        port.clone(),
        config.clone(),
        sudo.clone(),
        exemptions.clone(),
        admin_cache.clone(),
        rate.clone(),
        pause.clone(),
    ));
    let scheduler = DeletionScheduler::new(
        port.clone(),
        config.clone(),
        rate.clone(),
        admin_cache.clone(),
    );

    let state = Arc::new(AppState {
        cfg,
        port,
        config,
        sudo,
        exemptions,
        admin_cache,
        rate,
        pause,
        policy,
        scheduler,
    });

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}
