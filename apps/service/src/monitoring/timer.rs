use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};

/// Smallest period the platform timer accepts
pub const MIN_TICK_PERIOD: Duration = Duration::from_secs(60);

/// Repeating-timer registration. Each message on the returned channel is one
/// tick; the channel closes when the timer stops.
///
/// Registrations do not survive a restart: whoever starts the scheduler
/// registers again.
pub trait Timer: Send + Sync {
    fn register(&self, period: Duration) -> mpsc::Receiver<()>;
}

/// Tokio interval timer. The first tick fires immediately so a fresh process
/// evaluates its targets without waiting a full period.
#[derive(Debug, Default, Clone, Copy)]
pub struct IntervalTimer;

impl Timer for IntervalTimer {
    fn register(&self, period: Duration) -> mpsc::Receiver<()> {
        let period = period.max(MIN_TICK_PERIOD);
        let (tx, rx) = mpsc::channel(1);

        tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                timer.tick().await;
                if tx.send(()).await.is_err() {
                    break;
                }
            }
        });

        rx
    }
}

/// Timer fired by hand, for tests and embedding
#[derive(Debug)]
pub struct ManualTimer {
    tx: mpsc::Sender<()>,
    rx: Mutex<Option<mpsc::Receiver<()>>>,
}

impl ManualTimer {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(16);
        Self { tx, rx: Mutex::new(Some(rx)) }
    }

    /// Queue one tick. Returns false once the registered side has gone away.
    pub async fn fire(&self) -> bool {
        self.tx.send(()).await.is_ok()
    }
}

impl Default for ManualTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer for ManualTimer {
    fn register(&self, _period: Duration) -> mpsc::Receiver<()> {
        // Only one registration can own the queued ticks; later ones get a
        // channel that is already closed.
        self.rx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .unwrap_or_else(|| mpsc::channel(1).1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_interval_timer_first_tick_is_immediate() {
        let mut ticks = IntervalTimer.register(Duration::from_secs(1));

        // Fires at once, then no sooner than the clamped period.
        ticks.recv().await.expect("first tick");
        let started = tokio::time::Instant::now();
        ticks.recv().await.expect("second tick");
        assert!(started.elapsed() >= MIN_TICK_PERIOD);
    }

    #[tokio::test]
    async fn test_manual_timer_single_registration() {
        let timer = ManualTimer::new();
        assert!(timer.fire().await);

        let mut ticks = timer.register(MIN_TICK_PERIOD);
        assert_eq!(ticks.recv().await, Some(()));

        let mut again = timer.register(MIN_TICK_PERIOD);
        assert_eq!(again.recv().await, None);
    }
}
