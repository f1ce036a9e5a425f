use std::sync::Arc;

use swb_core::config::Config;

#[tokio::main]
async fn main() -> Result<(), swb_core::Error> {
    swb_core::logging::init("swb")?;

    let cfg = Arc::new(Config::load()?);

    swb_telegram::router::run_polling(cfg)
        .await
        .map_err(|e| swb_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
