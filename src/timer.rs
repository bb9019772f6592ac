//! Scoped periodic timer
//!
//! A timer subscription owns the task that calls its tick handler. Dropping the
//! subscription aborts that task, so there is no way to forget to unsubscribe:
//! whichever path drops the owner, no tick fires afterwards.

use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;


/// Periodic tick handler registration, released on drop
#[derive(Debug)]
pub struct TimerSubscription {
    /// Task running the tick loop
    task: JoinHandle<()>,

    /// Tick period
    period: Duration,
}
//
impl TimerSubscription {
    /// Call `on_tick` every `period`, starting one period from now
    ///
    /// Ticks which could not fire on time are delayed rather than bunched up.
    pub fn every<F>(runtime: &Handle, period: Duration, mut on_tick: F) -> Self
        where F: FnMut() + Send + 'static
    {
        let task = runtime.spawn(async move {
            let mut ticks = time::interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                on_tick();
            }
        });
        TimerSubscription { task, period }
    }

    /// Tick period
    pub fn period(&self) -> Duration {
        self.period
    }
}
//
impl Drop for TimerSubscription {
    fn drop(&mut self) {
        debug!(period = ?self.period, "releasing timer subscription");
        self.task.abort();
    }
}
