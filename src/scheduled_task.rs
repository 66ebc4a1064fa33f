use std::future::Future;

use rocket::tokio::{
    self,
    task::JoinHandle,
    time::{interval, Duration, MissedTickBehavior},
};

/// A task repeated at a fixed period in the background.
/// It runs until cancelled or dropped.
pub struct PeriodicTask {
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Run `task` every `period`, the first run happening one period from now.
    /// Must be called from within a tokio runtime.
    pub fn new<F, Fut>(period: Duration, mut task: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        // `interval` panics on a zero period.
        let period = period.max(Duration::from_millis(1));
        let handle = tokio::spawn(async move {
            let mut ticks = interval(period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticks.tick().await;
            loop {
                ticks.tick().await;
                task().await;
            }
        });
        Self { handle }
    }

    /// Stop the task. Returns true iff it had already stopped by itself.
    pub fn cancel(self) -> bool {
        let finished = self.handle.is_finished();
        self.handle.abort();
        finished
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
