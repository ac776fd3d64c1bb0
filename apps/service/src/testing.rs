//! Shared fixtures for unit tests

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;
use tempfile::{TempDir, tempdir};
use tokio::sync::Semaphore;
use url::Url;

use crate::database::{LibsqlStore, Target, models::DATE_FORMAT};
use crate::monitoring::probe::Probe;
use crate::pool::open_pool;

/// Helper to create a migrated store in a temporary directory. Keep the
/// `TempDir` alive for as long as the store is used.
pub async fn create_test_store() -> anyhow::Result<(Arc<LibsqlStore>, TempDir)> {
    let temp_dir = tempdir()?;
    let pool = open_pool(temp_dir.path().join("test.db")).await?;
    let store = LibsqlStore::open(pool).await?;
    Ok((Arc::new(store), temp_dir))
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
}

pub fn test_target(name: &str, url: &str, interval_minutes: u32) -> Target {
    Target::new(name, &Url::parse(url).unwrap(), interval_minutes)
}

/// Probe double answering from a script, recording every URL it was asked about
pub struct ScriptedProbe {
    default: bool,
    by_host: HashMap<String, bool>,
    gate: Option<Arc<Semaphore>>,
    calls: Mutex<Vec<Url>>,
}

impl ScriptedProbe {
    pub fn up() -> Self {
        Self::answering(true)
    }

    pub fn down() -> Self {
        Self::answering(false)
    }

    fn answering(default: bool) -> Self {
        Self { default, by_host: HashMap::new(), gate: None, calls: Mutex::new(Vec::new()) }
    }

    pub fn with_host(mut self, host: &str, is_up: bool) -> Self {
        self.by_host.insert(host.to_owned(), is_up);
        self
    }

    /// Every probe blocks until a permit is added to the returned semaphore
    pub fn gated(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.gate = Some(gate.clone());
        (self, gate)
    }

    pub fn calls(&self) -> Vec<Url> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Probe for ScriptedProbe {
    async fn probe(&self, url: &Url, _deadline: Duration) -> bool {
        self.calls.lock().unwrap().push(url.clone());

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        url.host_str().and_then(|host| self.by_host.get(host).copied()).unwrap_or(self.default)
    }
}
