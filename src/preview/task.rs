//! Cancellable repeating task.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Shortest period accepted by [`RepeatingTask::spawn`].
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// What the task should do after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickControl {
    Continue,
    Stop,
}

/// Runs an async callback on a fixed period until stopped.
///
/// The first tick fires immediately. Each callback is awaited before the
/// next tick is taken, so callbacks never overlap; ticks that fall behind
/// are delayed rather than bunched. Stopping prevents further ticks but
/// lets a callback that is already running finish.
pub struct RepeatingTask {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl RepeatingTask {
    /// Spawn the task on the current tokio runtime.
    ///
    /// The task also ends when `shutdown` resolves.
    pub fn spawn<T, Fut, S>(period: Duration, shutdown: S, mut tick: T) -> Self
    where
        T: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = TickControl> + Send + 'static,
        S: Future<Output = ()> + Send + 'static,
    {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let period = period.max(MIN_PERIOD);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tokio::pin!(shutdown);

            loop {
                tokio::select! {
                    biased;
                    _ = stop_rx.changed() => break,
                    _ = &mut shutdown => break,
                    _ = ticker.tick() => {
                        if *stop_rx.borrow() {
                            break;
                        }
                        if tick().await == TickControl::Stop {
                            break;
                        }
                    }
                }
            }
            log::trace!("Repeating task finished");
        });

        Self { stop_tx, handle }
    }

    /// Prevent any further ticks.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for RepeatingTask {
    fn drop(&mut self) {
        self.stop();
    }
}
