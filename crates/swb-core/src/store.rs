use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::{domain::UserId, Result};

/// Permanently exempt user ids, granted/revoked by the operator.
///
/// Persisted as a JSON array after every mutation; insertion order is kept
/// for listing.
#[derive(Debug)]
pub struct SudoStore {
    path: PathBuf,
    users: Vec<i64>,
}

impl SudoStore {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let users = match fs::read_to_string(&path) {
            Ok(txt) => match serde_json::from_str::<Vec<i64>>(&txt) {
                Ok(v) => v,
                Err(e) => {
                    warn!("failed to parse {}: {e}; starting empty", path.display());
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };
        Self { path, users }
    }

    pub fn is_sudo(&self, user_id: UserId) -> bool {
        self.users.contains(&user_id.0)
    }

    /// Returns false (without persisting) if the user is already present.
    pub fn add(&mut self, user_id: UserId) -> Result<bool> {
        if self.users.contains(&user_id.0) {
            return Ok(false);
        }
        self.users.push(user_id.0);
        self.save()?;
        Ok(true)
    }

    /// Returns false (without persisting) if the user was not present.
    pub fn remove(&mut self, user_id: UserId) -> Result<bool> {
        let before = self.users.len();
        self.users.retain(|id| *id != user_id.0);
        if self.users.len() == before {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    pub fn list(&self) -> &[i64] {
        &self.users
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    fn save(&self) -> Result<()> {
        save_json(&self.path, &serde_json::to_string_pretty(&self.users)?)
    }
}

/// Temporary deletion immunity: user id -> absolute expiry.
///
/// An entry at or past its expiry is logically absent; reads that encounter
/// one remove it (lazy expiry). Owner and sudo users never live here --
/// they are permanently exempt through their own checks, and the exempt
/// command refuses them outright.
#[derive(Debug)]
pub struct ExemptionStore {
    path: PathBuf,
    exemptions: BTreeMap<i64, DateTime<Utc>>,
}

impl ExemptionStore {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let exemptions = match fs::read_to_string(&path) {
            Ok(txt) => match serde_json::from_str::<BTreeMap<String, String>>(&txt) {
                Ok(raw) => raw
                    .into_iter()
                    .filter_map(|(id, ts)| {
                        let id = id.parse::<i64>().ok()?;
                        let ts = DateTime::parse_from_rfc3339(&ts)
                            .ok()?
                            .with_timezone(&Utc);
                        Some((id, ts))
                    })
                    .collect(),
                Err(e) => {
                    warn!("failed to parse {}: {e}; starting empty", path.display());
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };
        Self { path, exemptions }
    }

    /// True iff a live (unexpired) exemption exists. Expired entries found
    /// here are removed as a side effect.
    pub fn is_exempt(&mut self, user_id: UserId) -> bool {
        self.is_exempt_at(user_id, Utc::now())
    }

    pub fn is_exempt_at(&mut self, user_id: UserId, now: DateTime<Utc>) -> bool {
        let Some(expires_at) = self.exemptions.get(&user_id.0) else {
            return false;
        };
        if now < *expires_at {
            return true;
        }
        self.exemptions.remove(&user_id.0);
        if let Err(e) = self.save() {
            warn!("failed to persist exemption expiry for {}: {e}", user_id.0);
        }
        false
    }

    /// Upsert an exemption; persists before reporting success.
    pub fn add(&mut self, user_id: UserId, expires_at: DateTime<Utc>) -> Result<()> {
        self.exemptions.insert(user_id.0, expires_at);
        self.save()
    }

    /// Returns false (without persisting) if the user had no exemption.
    pub fn remove(&mut self, user_id: UserId) -> Result<bool> {
        if self.exemptions.remove(&user_id.0).is_none() {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    /// Bulk lazy cleanup used by listing, so displayed lists never show
    /// stale entries. Persists once if anything was removed.
    pub fn sweep_expired(&mut self) -> Result<Vec<i64>> {
        self.sweep_expired_at(Utc::now())
    }

    pub fn sweep_expired_at(&mut self, now: DateTime<Utc>) -> Result<Vec<i64>> {
        let expired: Vec<i64> = self
            .exemptions
            .iter()
            .filter(|(_, exp)| **exp <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            self.exemptions.remove(id);
        }
        if !expired.is_empty() {
            self.save()?;
        }
        Ok(expired)
    }

    pub fn entries(&self) -> impl Iterator<Item = (UserId, DateTime<Utc>)> + '_ {
        self.exemptions.iter().map(|(id, exp)| (UserId(*id), *exp))
    }

    pub fn len(&self) -> usize {
        self.exemptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exemptions.is_empty()
    }

    fn save(&self) -> Result<()> {
        let raw: BTreeMap<String, String> = self
            .exemptions
            .iter()
            .map(|(id, exp)| (id.to_string(), exp.to_rfc3339()))
            .collect();
        save_json(&self.path, &serde_json::to_string_pretty(&raw)?)
    }
}

fn save_json(path: &Path, txt: &str) -> Result<()> {
    fs::write(path, txt)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn tmp_file(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let pid = std::process::id();
        PathBuf::from(format!("/tmp/{prefix}-{pid}-{ts}.json"))
    }

    #[test]
    fn sudo_round_trip_no_duplicates() {
        let path = tmp_file("swb-sudo");
        let mut store = SudoStore::load(&path);

        assert!(store.add(UserId(7)).unwrap());
        assert!(!store.add(UserId(7)).unwrap());
        assert!(store.is_sudo(UserId(7)));

        let reloaded = SudoStore::load(&path);
        assert_eq!(reloaded.list(), &[7]);

        let mut store = reloaded;
        assert!(store.remove(UserId(7)).unwrap());
        assert!(!store.remove(UserId(7)).unwrap());
        assert!(!store.is_sudo(UserId(7)));
    }

    #[test]
    fn exemption_round_trip_before_and_after_expiry() {
        let path = tmp_file("swb-exempt");
        let mut store = ExemptionStore::load(&path);
        let now = Utc::now();
        let user = UserId(11);

        store.add(user, now + Duration::minutes(30)).unwrap();
        assert!(store.is_exempt_at(user, now));
        assert!(store.is_exempt_at(user, now + Duration::minutes(29)));
        assert!(!store.is_exempt_at(user, now + Duration::minutes(31)));
    }

    #[test]
    fn expired_entry_is_removed_on_read() {
        let path = tmp_file("swb-exempt-lazy");
        let mut store = ExemptionStore::load(&path);
        let now = Utc::now();
        let user = UserId(3);

        store.add(user, now - Duration::seconds(1)).unwrap();
        assert!(!store.is_exempt_at(user, now));
        assert!(store.is_empty());

        // Removal was persisted too.
        let reloaded = ExemptionStore::load(&path);
        assert!(reloaded.is_empty());
    }

    #[test]
    fn sweep_removes_only_expired() {
        let path = tmp_file("swb-exempt-sweep");
        let mut store = ExemptionStore::load(&path);
        let now = Utc::now();

        store.add(UserId(1), now - Duration::minutes(1)).unwrap();
        store.add(UserId(2), now + Duration::hours(1)).unwrap();
        store.add(UserId(3), now).unwrap(); // exactly at expiry counts as gone

        let removed = store.sweep_expired_at(now).unwrap();
        assert_eq!(removed, vec![1, 3]);
        assert_eq!(store.len(), 1);
        assert!(store.is_exempt_at(UserId(2), now));
    }

    #[test]
    fn exemptions_persist_as_rfc3339_string_keys() {
        let path = tmp_file("swb-exempt-format");
        let mut store = ExemptionStore::load(&path);
        let exp = Utc::now() + Duration::hours(2);
        store.add(UserId(99), exp).unwrap();

        let txt = fs::read_to_string(&path).unwrap();
        let raw: BTreeMap<String, String> = serde_json::from_str(&txt).unwrap();
        assert!(raw.contains_key("99"));

        let reloaded = ExemptionStore::load(&path);
        let (user, loaded_exp) = reloaded.entries().next().unwrap();
        assert_eq!(user, UserId(99));
        assert_eq!(loaded_exp.timestamp(), exp.timestamp());
    }
}
