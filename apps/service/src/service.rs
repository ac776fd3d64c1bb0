//! The operations collaborators (CLI, HTTP surface) use to drive the core.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::address;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::database::{DayBucket, LibsqlStore, StatsStore, Target};
use crate::error::{Error, Result};
use crate::monitoring::{ForceScope, HttpProbe, MonitoringScheduler, Probe, Settlement};
use crate::pool::open_pool;

/// Knobs of [`UptimeService`] that come from configuration
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub prefer_secure: bool,
    pub probe_on_add: bool,
    pub probe_timeout: Duration,
    pub uptime_window_days: u32,
    pub default_interval_minutes: u32,
    pub tick_period: Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for ServiceSettings {
    fn from(config: &Config) -> Self {
        Self {
            prefer_secure: config.targets.prefer_secure,
            probe_on_add: config.targets.probe_on_add,
            probe_timeout: config.probe.timeout(),
            uptime_window_days: config.uptime.window_days,
            default_interval_minutes: config.targets.default_interval_minutes,
            tick_period: config.scheduler.tick_period(),
        }
    }
}

/// Partial update of a target; `None` fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TargetUpdate {
    pub name: Option<String>,
    pub url: Option<String>,
    pub interval_minutes: Option<u32>,
}

/// Registration, listing, removal, uptime and forced checks over one store
pub struct UptimeService {
    store: Arc<dyn StatsStore>,
    probe: Arc<dyn Probe>,
    clock: Arc<dyn Clock>,
    scheduler: Arc<MonitoringScheduler>,
    settings: ServiceSettings,
}

impl UptimeService {
    pub fn new(
        store: Arc<dyn StatsStore>,
        probe: Arc<dyn Probe>,
        clock: Arc<dyn Clock>,
        settings: ServiceSettings,
    ) -> Self {
        let scheduler = MonitoringScheduler::new(store.clone(), probe.clone(), clock.clone(), settings.probe_timeout)
            .with_tick_period(settings.tick_period);

        Self { store, probe, clock, scheduler: Arc::new(scheduler), settings }
    }

    /// Open the configured database (running migrations) with the real HTTP
    /// probe and wall clock.
    pub async fn open(config: &Config) -> Result<Self> {
        info!("Opening database at {}", config.database.path.display());
        let pool = open_pool(&config.database.path).await?;
        let store = Arc::new(LibsqlStore::open(pool).await?);
        let probe = Arc::new(HttpProbe::new(&config.probe.user_agent)?);

        Ok(Self::new(store, probe, Arc::new(SystemClock), ServiceSettings::from(config)))
    }

    pub fn scheduler(&self) -> &Arc<MonitoringScheduler> {
        &self.scheduler
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// Validate and register a new target.
    ///
    /// Plain http addresses are upgraded to https when the secure endpoint
    /// answers. With `probe_on_add`, the target is checked once before this
    /// returns, and the returned value carries that first outcome.
    pub async fn add_target(&self, name: &str, address: &str, interval_minutes: u32) -> Result<Target> {
        let name = validate_name(name)?;
        validate_interval(interval_minutes)?;
        let url = self.canonical_url(address).await?;

        let target = Target::new(name, &url, interval_minutes);
        self.store.upsert_target(&target).await?;
        info!(target_id = %target.id, url = %target.url, interval_minutes, "Registered target");

        if !self.settings.probe_on_add {
            return Ok(target);
        }

        self.scheduler.force_check_now(ForceScope::Target(target.id)).await?;
        Ok(self.store.get_target(target.id).await?.unwrap_or(target))
    }

    pub async fn list_targets(&self) -> Result<Vec<Target>> {
        self.store.get_all_targets().await
    }

    pub async fn get_target(&self, id: Uuid) -> Result<Option<Target>> {
        self.store.get_target(id).await
    }

    /// Apply a partial update. A new URL goes through the same validation
    /// (and https upgrade) as registration. Returns `None` for unknown ids.
    pub async fn update_target(&self, id: Uuid, update: TargetUpdate) -> Result<Option<Target>> {
        let Some(mut target) = self.store.get_target(id).await? else {
            return Ok(None);
        };

        if let Some(name) = update.name.as_deref() {
            target.name = validate_name(name)?.to_owned();
        }
        if let Some(interval_minutes) = update.interval_minutes {
            validate_interval(interval_minutes)?;
            target.interval_minutes = interval_minutes;
        }
        if let Some(address) = update.url.as_deref() {
            target.url = self.canonical_url(address).await?.to_string();
        }

        self.store.upsert_target(&target).await?;
        info!(target_id = %id, "Updated target");
        self.store.get_target(id).await
    }

    /// Remove a target and its whole history. Returns whether it existed.
    pub async fn remove_target(&self, id: Uuid) -> Result<bool> {
        let removed = self.store.delete_target(id).await?;
        if removed {
            info!(target_id = %id, "Removed target");
        }
        Ok(removed)
    }

    /// Uptime percentage over the configured trailing window
    pub async fn get_uptime(&self, id: Uuid) -> Result<Option<f64>> {
        self.get_uptime_over(id, self.settings.uptime_window_days).await
    }

    pub async fn get_uptime_over(&self, id: Uuid, window_days: u32) -> Result<Option<f64>> {
        self.scheduler.aggregator().query_uptime(id, window_days, self.clock.now()).await
    }

    pub async fn daily_history(&self, id: Uuid, days: u32) -> Result<Vec<DayBucket>> {
        self.scheduler.aggregator().daily_history(id, days, self.clock.now()).await
    }

    /// Probe now, bypassing intervals once, and wait for the outcomes
    pub async fn force_check_now(&self, scope: ForceScope) -> Result<Vec<Settlement>> {
        self.scheduler.force_check_now(scope).await
    }

    async fn canonical_url(&self, address: &str) -> Result<url::Url> {
        let url = address::parse_address(address)?;
        if !self.settings.prefer_secure {
            return Ok(url);
        }
        Ok(address::upgrade_to_secure(url, self.probe.as_ref(), self.settings.probe_timeout).await)
    }
}

fn validate_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidName);
    }
    Ok(name)
}

fn validate_interval(interval_minutes: u32) -> Result<()> {
    if interval_minutes < 1 {
        return Err(Error::InvalidInterval(interval_minutes));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::testing::{ScriptedProbe, create_test_store, date};
    use chrono::TimeDelta;

    struct Fixture {
        service: UptimeService,
        probe: Arc<ScriptedProbe>,
        clock: Arc<ManualClock>,
        _dir: tempfile::TempDir,
    }

    async fn fixture(probe: ScriptedProbe, settings: ServiceSettings) -> Fixture {
        let (store, dir) = create_test_store().await.unwrap();
        let probe = Arc::new(probe);
        let clock = Arc::new(ManualClock::new(date("2025-09-01").and_hms_opt(9, 0, 0).unwrap().and_utc()));
        let service = UptimeService::new(store, probe.clone(), clock.clone(), settings);
        Fixture { service, probe, clock, _dir: dir }
    }

    fn quiet_settings() -> ServiceSettings {
        ServiceSettings { prefer_secure: false, probe_on_add: false, ..ServiceSettings::default() }
    }

    #[tokio::test]
    async fn test_add_target_rejects_invalid_input() {
        let f = fixture(ScriptedProbe::up(), ServiceSettings::default()).await;

        assert!(matches!(f.service.add_target("x", "notasite", 5).await, Err(Error::InvalidAddress(_))));
        assert!(matches!(f.service.add_target("  ", "example.com", 5).await, Err(Error::InvalidName)));
        assert!(matches!(f.service.add_target("x", "example.com", 0).await, Err(Error::InvalidInterval(0))));

        assert!(f.service.list_targets().await.unwrap().is_empty());
        assert!(f.probe.calls().is_empty(), "invalid input never reaches the network");
    }

    #[tokio::test]
    async fn test_add_target_upgrades_and_probes_once() {
        let f = fixture(ScriptedProbe::up(), ServiceSettings::default()).await;

        let target = f.service.add_target("Example", "example.com", 5).await.unwrap();

        assert_eq!(target.url, "https://example.com/");
        let last = target.last_check.expect("probed on add");
        assert!(last.is_up);
        assert_eq!(last.at, f.clock.now());
        // One call for the upgrade attempt, one for the initial check.
        assert_eq!(f.probe.calls().len(), 2);
        assert_eq!(f.service.get_uptime(target.id).await.unwrap(), Some(100.0));
    }

    #[tokio::test]
    async fn test_add_target_keeps_plaintext_when_secure_is_down() {
        let f = fixture(ScriptedProbe::down(), ServiceSettings { probe_on_add: false, ..ServiceSettings::default() })
            .await;

        let target = f.service.add_target("Plain", "http://plain.example.com", 5).await.unwrap();

        assert_eq!(target.url, "http://plain.example.com/");
        assert_eq!(target.last_check, None);
        assert_eq!(f.service.get_uptime(target.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_remove_then_re_add_starts_clean() {
        let f = fixture(ScriptedProbe::up(), quiet_settings()).await;
        let first = f.service.add_target("Site", "https://site.example.com", 5).await.unwrap();
        f.service.force_check_now(ForceScope::All).await.unwrap();
        assert_eq!(f.service.daily_history(first.id, 7).await.unwrap().len(), 1);

        assert!(f.service.remove_target(first.id).await.unwrap());
        assert!(!f.service.remove_target(first.id).await.unwrap());
        assert!(f.service.daily_history(first.id, 7).await.unwrap().is_empty());

        let second = f.service.add_target("Site", "https://site.example.com", 5).await.unwrap();
        assert_ne!(second.id, first.id);
        assert!(f.service.daily_history(second.id, 7).await.unwrap().is_empty());
        assert_eq!(f.service.get_uptime(second.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_uptime_tracks_mixed_outcomes() {
        let probe = ScriptedProbe::up().with_host("flaky.example.com", false);
        let f = fixture(probe, quiet_settings()).await;
        let steady = f.service.add_target("Steady", "https://steady.example.com", 5).await.unwrap();
        let flaky = f.service.add_target("Flaky", "https://flaky.example.com", 5).await.unwrap();

        for _ in 0..4 {
            f.service.force_check_now(ForceScope::All).await.unwrap();
            f.clock.advance(TimeDelta::minutes(5));
        }

        assert_eq!(f.service.get_uptime(steady.id).await.unwrap(), Some(100.0));
        assert_eq!(f.service.get_uptime(flaky.id).await.unwrap(), Some(0.0));
        assert_eq!(f.service.get_uptime_over(flaky.id, 0).await.unwrap(), Some(0.0));
    }

    #[tokio::test]
    async fn test_update_target() {
        let f = fixture(ScriptedProbe::up(), quiet_settings()).await;
        let target = f.service.add_target("Old", "https://old.example.com", 5).await.unwrap();

        let updated = f
            .service
            .update_target(
                target.id,
                TargetUpdate { name: Some("New".into()), url: Some("new.example.com/x".into()), interval_minutes: Some(30) },
            )
            .await
            .unwrap()
            .expect("target exists");

        assert_eq!(updated.name, "New");
        assert_eq!(updated.url, "http://new.example.com/x");
        assert_eq!(updated.interval_minutes, 30);

        let rejected = f
            .service
            .update_target(target.id, TargetUpdate { url: Some("nodots".into()), ..TargetUpdate::default() })
            .await;
        assert!(matches!(rejected, Err(Error::InvalidAddress(_))));

        assert!(f.service.update_target(Uuid::new_v4(), TargetUpdate::default()).await.unwrap().is_none());
    }
}
