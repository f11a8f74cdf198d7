use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};

pub const LOW_BATTERY_THRESHOLD: f64 = 20.0;

pub const LOW_BATTERY_MIN_INTERVAL: Duration = Duration::from_secs(60);

pub fn effective_interval(configured: Duration, battery_level: Option<f64>, adapt: bool) -> Duration {
    match battery_level {
        Some(level) if adapt && level < LOW_BATTERY_THRESHOLD => {
            configured.max(LOW_BATTERY_MIN_INTERVAL)
        }
        _ => configured,
    }
}

/// Periodic task that fires `tick` once when armed and then every interval.
/// Changing the interval re-arms the timer; dropping the timer aborts it.
pub struct PublishTimer {
    interval_tx: watch::Sender<Duration>,
    handle: JoinHandle<()>,
}

impl PublishTimer {
    pub fn spawn<F>(runtime: &Handle, interval: Duration, tick: F) -> Self
    where
        F: Fn() + Send + 'static,
    {
        let (interval_tx, mut interval_rx) = watch::channel(interval);

        let handle = runtime.spawn(async move {
            let mut current = *interval_rx.borrow_and_update();
            loop {
                tick();
                let mut ticker = interval_at(Instant::now() + current, current);

                loop {
                    tokio::select! {
                        _ = ticker.tick() => tick(),
                        changed = interval_rx.changed() => {
                            if changed.is_err() {
                                return;
                            }
                            current = *interval_rx.borrow_and_update();
                            break;
                        }
                    }
                }
            }
        });

        Self {
            interval_tx,
            handle,
        }
    }

    pub fn interval(&self) -> Duration {
        *self.interval_tx.borrow()
    }

    pub fn reset(&self, interval: Duration) -> bool {
        self.interval_tx.send_if_modified(|current| {
            if *current == interval {
                return false;
            }
            *current = interval;
            true
        })
    }
}

impl Drop for PublishTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
