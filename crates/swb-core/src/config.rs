use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{errors::Error, Result};

/// Immutable process configuration from environment variables / `.env`.
#[derive(Clone, Debug)]
pub struct Config {
    pub telegram_bot_token: String,
    /// User ids allowed to drive the operator command surface.
    pub operator_ids: Vec<i64>,
    /// Directory holding the persisted JSON state files.
    pub data_dir: PathBuf,

    // Seeds for RuntimeConfig (used on first start and by `/resetconfig`).
    pub default_deletion_delay_secs: u64,
    pub default_sticker_delay_secs: u64,
    pub default_max_deletions_per_minute: u32,
    pub default_owner_id: i64,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let operator_ids = parse_csv_i64(env_str("OPERATOR_IDS"));
        if operator_ids.is_empty() {
            return Err(Error::Config(
                "OPERATOR_IDS environment variable is required".to_string(),
            ));
        }

        let data_dir = env_path("DATA_DIR").unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&data_dir)?;

        Ok(Self {
            telegram_bot_token,
            operator_ids,
            data_dir,
            default_deletion_delay_secs: env_u64("DELETION_DELAY_SECONDS").unwrap_or(40),
            default_sticker_delay_secs: env_u64("STICKER_DELETION_DELAY_SECONDS").unwrap_or(360),
            default_max_deletions_per_minute: env_u32("MAX_DELETIONS_PER_MINUTE")
                .unwrap_or(20)
                .max(1),
            default_owner_id: env_i64("OWNER_ID").unwrap_or(0),
        })
    }

    pub fn runtime_config_path(&self) -> PathBuf {
        self.data_dir.join("runtime_config.json")
    }

    pub fn sudo_path(&self) -> PathBuf {
        self.data_dir.join("sudo_users.json")
    }

    pub fn exemptions_path(&self) -> PathBuf {
        self.data_dir.join("temp_exemptions.json")
    }
}

/// Mutable runtime configuration, persisted as a flat JSON record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub deletion_delay_seconds: u64,
    pub sticker_delay_seconds: u64,
    pub max_deletions_per_minute: u32,
    /// 0 means "no owner configured".
    pub owner_id: i64,
    pub sticker_deletion_enabled: bool,
    pub bot_only_mode: bool,
}

impl RuntimeConfig {
    pub fn from_defaults(cfg: &Config) -> Self {
        Self {
            deletion_delay_seconds: cfg.default_deletion_delay_secs,
            sticker_delay_seconds: cfg.default_sticker_delay_secs,
            max_deletions_per_minute: cfg.default_max_deletions_per_minute,
            owner_id: cfg.default_owner_id,
            sticker_deletion_enabled: true,
            bot_only_mode: false,
        }
    }
}

/// Updatable runtime-config fields, keyed by the external names the operator
/// types in `/setconfig`. Unknown keys are a typed error, never ignored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigKey {
    Delay,
    StickerDelay,
    MaxDeletions,
    Owner,
}

impl ConfigKey {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "delay" => Some(ConfigKey::Delay),
            "stickerdelay" => Some(ConfigKey::StickerDelay),
            "maxdeletions" => Some(ConfigKey::MaxDeletions),
            "owner" => Some(ConfigKey::Owner),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ConfigKey::Delay => "delay",
            ConfigKey::StickerDelay => "stickerdelay",
            ConfigKey::MaxDeletions => "maxdeletions",
            ConfigKey::Owner => "owner",
        }
    }
}

/// Owns the live `RuntimeConfig` plus its on-disk copy.
///
/// Every mutation is read-modify-write-persist; if the persist fails the
/// in-memory value is rolled back so memory never diverges from what a
/// reload would produce.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    defaults: RuntimeConfig,
    runtime: RuntimeConfig,
}

impl ConfigStore {
    pub fn load(cfg: &Config) -> Self {
        let path = cfg.runtime_config_path();
        let defaults = RuntimeConfig::from_defaults(cfg);
        let runtime = match fs::read_to_string(&path) {
            Ok(txt) => match serde_json::from_str::<RuntimeConfig>(&txt) {
                Ok(rc) => rc,
                Err(e) => {
                    warn!("failed to parse {}: {e}; using defaults", path.display());
                    defaults.clone()
                }
            },
            Err(_) => defaults.clone(),
        };
        Self {
            path,
            defaults,
            runtime,
        }
    }

    pub fn current(&self) -> &RuntimeConfig {
        &self.runtime
    }

    /// Set an integer-valued field. Returns the previous value.
    pub fn set(&mut self, key: ConfigKey, value: i64) -> Result<i64> {
        let old = match key {
            ConfigKey::Delay => {
                let v = non_negative(key, value)?;
                std::mem::replace(&mut self.runtime.deletion_delay_seconds, v) as i64
            }
            ConfigKey::StickerDelay => {
                let v = non_negative(key, value)?;
                std::mem::replace(&mut self.runtime.sticker_delay_seconds, v) as i64
            }
            ConfigKey::MaxDeletions => {
                if value < 1 {
                    return Err(Error::InvalidInput(
                        "maxdeletions must be at least 1".to_string(),
                    ));
                }
                std::mem::replace(&mut self.runtime.max_deletions_per_minute, value as u32) as i64
            }
            ConfigKey::Owner => std::mem::replace(&mut self.runtime.owner_id, value),
        };

        if let Err(e) = self.save() {
            // Roll back so memory matches what a reload would produce.
            match key {
                ConfigKey::Delay => {
                    self.runtime.deletion_delay_seconds = old as u64;
                }
                ConfigKey::StickerDelay => {
                    self.runtime.sticker_delay_seconds = old as u64;
                }
                ConfigKey::MaxDeletions => {
                    self.runtime.max_deletions_per_minute = old as u32;
                }
                ConfigKey::Owner => {
                    self.runtime.owner_id = old;
                }
            };
            return Err(e);
        }
        Ok(old)
    }

    /// Flip sticker/GIF deletion. Returns the new state.
    pub fn toggle_sticker_deletion(&mut self) -> Result<bool> {
        self.runtime.sticker_deletion_enabled = !self.runtime.sticker_deletion_enabled;
        if let Err(e) = self.save() {
            self.runtime.sticker_deletion_enabled = !self.runtime.sticker_deletion_enabled;
            return Err(e);
        }
        Ok(self.runtime.sticker_deletion_enabled)
    }

    /// Flip bot-only mode. Returns the new state.
    pub fn toggle_bot_only_mode(&mut self) -> Result<bool> {
        self.runtime.bot_only_mode = !self.runtime.bot_only_mode;
        if let Err(e) = self.save() {
            self.runtime.bot_only_mode = !self.runtime.bot_only_mode;
            return Err(e);
        }
        Ok(self.runtime.bot_only_mode)
    }

    pub fn reset_to_defaults(&mut self) -> Result<()> {
        let old = std::mem::replace(&mut self.runtime, self.defaults.clone());
        if let Err(e) = self.save() {
            self.runtime = old;
            return Err(e);
        }
        Ok(())
    }

    fn save(&self) -> Result<()> {
        let txt = serde_json::to_string_pretty(&self.runtime)?;
        fs::write(&self.path, txt)?;
        Ok(())
    }
}

fn non_negative(key: ConfigKey, value: i64) -> Result<u64> {
    if value < 0 {
        return Err(Error::InvalidInput(format!(
            "{} must not be negative",
            key.name()
        )));
    }
    Ok(value as u64)
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|s| s.trim().parse::<u32>().ok())
}

fn env_i64(key: &str) -> Option<i64> {
    env_str(key).and_then(|s| s.trim().parse::<i64>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key).map(PathBuf::from)
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_dir(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let pid = std::process::id();
        let dir = PathBuf::from(format!("/tmp/{prefix}-{pid}-{ts}"));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn test_config(dir: &Path) -> Config {
        Config {
            telegram_bot_token: "token".to_string(),
            operator_ids: vec![1],
            data_dir: dir.to_path_buf(),
            default_deletion_delay_secs: 40,
            default_sticker_delay_secs: 360,
            default_max_deletions_per_minute: 20,
            default_owner_id: 0,
        }
    }

    #[test]
    fn config_key_parse_rejects_unknown() {
        assert_eq!(ConfigKey::parse("delay"), Some(ConfigKey::Delay));
        assert_eq!(ConfigKey::parse("OWNER"), Some(ConfigKey::Owner));
        assert_eq!(ConfigKey::parse("bogus"), None);
    }

    #[test]
    fn set_validates_values() {
        let dir = tmp_dir("swb-config");
        let cfg = test_config(&dir);
        let mut store = ConfigStore::load(&cfg);

        assert!(store.set(ConfigKey::MaxDeletions, 0).is_err());
        assert!(store.set(ConfigKey::Delay, -5).is_err());

        let old = store.set(ConfigKey::Delay, 60).unwrap();
        assert_eq!(old, 40);
        assert_eq!(store.current().deletion_delay_seconds, 60);
    }

    #[test]
    fn set_persists_and_reloads() {
        let dir = tmp_dir("swb-config-reload");
        let cfg = test_config(&dir);

        {
            let mut store = ConfigStore::load(&cfg);
            store.set(ConfigKey::MaxDeletions, 5).unwrap();
            store.toggle_bot_only_mode().unwrap();
        }

        let store = ConfigStore::load(&cfg);
        assert_eq!(store.current().max_deletions_per_minute, 5);
        assert!(store.current().bot_only_mode);
    }

    #[test]
    fn failed_persist_rolls_back() {
        let dir = tmp_dir("swb-config-rollback");
        let cfg = test_config(&dir);
        let mut store = ConfigStore::load(&cfg);
        // Point the store at an unwritable path to force the save to fail.
        store.path = dir.join("missing-subdir").join("runtime_config.json");

        assert!(store.set(ConfigKey::Delay, 99).is_err());
        assert_eq!(store.current().deletion_delay_seconds, 40);

        assert!(store.toggle_sticker_deletion().is_err());
        assert!(store.current().sticker_deletion_enabled);
    }

    #[test]
    fn reset_restores_defaults() {
        let dir = tmp_dir("swb-config-reset");
        let cfg = test_config(&dir);
        let mut store = ConfigStore::load(&cfg);
        store.set(ConfigKey::Owner, 42).unwrap();
        store.reset_to_defaults().unwrap();
        assert_eq!(store.current(), &RuntimeConfig::from_defaults(&cfg));
    }
}
