use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::aggregator::Aggregator;
use super::probe::Probe;
use super::timer::{MIN_TICK_PERIOD, Timer};
use super::types::{ForceScope, Settlement};
use crate::address;
use crate::clock::Clock;
use crate::database::{RecordStatus, StatsStore, Target};
use crate::error::Result;

/// Ids of targets whose probe has been dispatched and not yet settled
#[derive(Clone, Default)]
struct InFlight(Arc<Mutex<HashSet<Uuid>>>);

impl InFlight {
    /// Claim a target for probing; `None` if it is already in flight.
    fn claim(&self, id: Uuid) -> Option<InFlightGuard> {
        let mut set = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        set.insert(id).then(|| InFlightGuard { set: self.0.clone(), id })
    }

    fn contains(&self, id: Uuid) -> bool {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).contains(&id)
    }
}

/// Releases the in-flight claim when the probe task ends, however it ends
struct InFlightGuard {
    set: Arc<Mutex<HashSet<Uuid>>>,
    id: Uuid,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).remove(&self.id);
    }
}

/// Result of one evaluation pass
#[derive(Default)]
pub struct Dispatch {
    /// Targets whose probe was started by this pass
    pub dispatched: Vec<Uuid>,
    /// Due targets left alone because a probe for them was still running
    pub skipped: Vec<Uuid>,
    /// Targets whose interval has not elapsed yet
    pub not_due: Vec<Uuid>,
    handles: Vec<JoinHandle<Settlement>>,
}

impl Dispatch {
    /// Wait for every probe started by this pass to be recorded
    pub async fn settle(self) -> Vec<Settlement> {
        join_all(self.handles)
            .await
            .into_iter()
            .filter_map(|joined| match joined {
                Ok(settlement) => Some(settlement),
                Err(e) => {
                    error!("Probe task aborted: {}", e);
                    None
                }
            })
            .collect()
    }
}

impl std::fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatch")
            .field("dispatched", &self.dispatched)
            .field("skipped", &self.skipped)
            .field("not_due", &self.not_due)
            .finish()
    }
}

/// Monitoring scheduler - decides which targets are due and dispatches probes
///
/// Due-ness is computed from the persisted last-check time only, so a restart
/// picks up exactly where the previous process left off.
pub struct MonitoringScheduler {
    store: Arc<dyn StatsStore>,
    probe: Arc<dyn Probe>,
    aggregator: Aggregator,
    clock: Arc<dyn Clock>,
    probe_timeout: Duration,
    tick_period: Duration,
    in_flight: InFlight,
}

impl MonitoringScheduler {
    /// Create a new monitoring scheduler
    pub fn new(
        store: Arc<dyn StatsStore>,
        probe: Arc<dyn Probe>,
        clock: Arc<dyn Clock>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            aggregator: Aggregator::new(store.clone()),
            store,
            probe,
            clock,
            probe_timeout,
            tick_period: MIN_TICK_PERIOD,
            in_flight: InFlight::default(),
        }
    }

    pub fn with_tick_period(mut self, period: Duration) -> Self {
        self.tick_period = period.max(MIN_TICK_PERIOD);
        self
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub fn is_in_flight(&self, target_id: Uuid) -> bool {
        self.in_flight.contains(target_id)
    }

    /// Periodic evaluation: probe every target whose interval has elapsed.
    ///
    /// Returns as soon as the probes are dispatched; use [`Dispatch::settle`]
    /// to wait for them.
    pub async fn tick(&self) -> Result<Dispatch> {
        let targets = self.store.get_all_targets().await?;
        self.dispatch(targets, None).await
    }

    /// Probe the targets in `scope` now, regardless of their interval, and
    /// wait until their outcomes are recorded.
    ///
    /// Targets already being probed are skipped; their running probe will
    /// produce a fresh outcome anyway.
    pub async fn force_check_now(&self, scope: ForceScope) -> Result<Vec<Settlement>> {
        let targets = match scope {
            ForceScope::All => self.store.get_all_targets().await?,
            ForceScope::Target(id) => self.store.get_target(id).await?.into_iter().collect(),
        };

        let dispatch = self.dispatch(targets, Some(scope)).await?;
        debug!(?scope, dispatched = dispatch.dispatched.len(), skipped = dispatch.skipped.len(), "Forced check");
        Ok(dispatch.settle().await)
    }

    /// Run until `shutdown` resolves, evaluating targets on every timer tick.
    pub async fn run(&self, timer: &dyn Timer, shutdown: impl Future<Output = ()>) {
        let mut ticks = timer.register(self.tick_period);
        tokio::pin!(shutdown);
        info!("Monitoring scheduler started (tick every {:?})", self.tick_period);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Monitoring scheduler stopping");
                    break;
                }
                tick = ticks.recv() => {
                    if tick.is_none() {
                        warn!("Timer channel closed, stopping scheduler");
                        break;
                    }

                    match self.tick().await {
                        Ok(dispatch) => debug!(
                            dispatched = dispatch.dispatched.len(),
                            skipped = dispatch.skipped.len(),
                            not_due = dispatch.not_due.len(),
                            "Tick evaluated"
                        ),
                        // Probes already running are unaffected; the next tick retries.
                        Err(e) => error!("Tick failed to load targets: {}", e),
                    }
                }
            }
        }
    }

    /// Claim and spawn probes. A periodic pass re-reads each due target
    /// after claiming it: the snapshot it was handed may predate a probe
    /// that settled in the meantime.
    async fn dispatch(&self, targets: Vec<Target>, force: Option<ForceScope>) -> Result<Dispatch> {
        let mut dispatch = Dispatch::default();

        for target in targets {
            let forced = force.is_some_and(|scope| scope.covers(target.id));
            if !forced && !target.is_due(self.clock.now()) {
                dispatch.not_due.push(target.id);
                continue;
            }

            let Some(guard) = self.in_flight.claim(target.id) else {
                debug!(target_id = %target.id, "Probe still in flight, skipping");
                dispatch.skipped.push(target.id);
                continue;
            };

            let target = if forced {
                target
            } else {
                match self.store.get_target(target.id).await? {
                    Some(fresh) if fresh.is_due(self.clock.now()) => fresh,
                    Some(fresh) => {
                        debug!(target_id = %fresh.id, "Checked since the listing, not due anymore");
                        dispatch.not_due.push(fresh.id);
                        continue;
                    }
                    None => continue,
                }
            };

            dispatch.dispatched.push(target.id);
            dispatch.handles.push(tokio::spawn(probe_target(
                target,
                self.probe.clone(),
                self.aggregator.clone(),
                self.clock.clone(),
                self.probe_timeout,
                guard,
            )));
        }

        Ok(dispatch)
    }
}

/// Resolve, probe and record one target. The guard keeps the target claimed
/// until the outcome is written, so outcomes of one target never interleave.
async fn probe_target(
    target: Target,
    probe: Arc<dyn Probe>,
    aggregator: Aggregator,
    clock: Arc<dyn Clock>,
    deadline: Duration,
    _guard: InFlightGuard,
) -> Settlement {
    let target_id = target.id;

    let url = match address::resolve_stored(&target.url) {
        Ok(url) => url,
        Err(e) => {
            warn!(%target_id, "Stored address is no longer valid: {}", e);
            return Settlement::Unresolvable { target_id };
        }
    };

    let is_up = probe.probe(&url, deadline).await;

    match aggregator.record_outcome(target_id, is_up, clock.now()).await {
        Ok(RecordStatus::Recorded(_)) => Settlement::Recorded { target_id, is_up },
        Ok(RecordStatus::TargetMissing) => Settlement::TargetGone { target_id, is_up },
        Err(e) => {
            error!(%target_id, "Failed to record probe outcome: {}", e);
            Settlement::StorageFailed { target_id, is_up }
        }
    }
}
