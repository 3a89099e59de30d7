//! Background timers and signal listeners owned by a service.
//!
//! Each service keeps one [`BackgroundTasks`] set. Tasks run until
//! [`BackgroundTasks::shutdown`] flips the shared stop signal, after which the
//! handles are awaited so no timer outlives its service.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::events::PlatformSignal;

#[derive(Debug)]
pub(crate) struct BackgroundTasks {
    stop: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Default for BackgroundTasks {
    fn default() -> Self {
        Self::new()
    }
}

impl BackgroundTasks {
    pub(crate) fn new() -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            stop,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Number of tasks currently tracked.
    pub(crate) fn len(&self) -> usize {
        self.handles.lock().map(|h| h.len()).unwrap_or(0)
    }

    /// Runs `tick` every `period` until shutdown. The first run happens one
    /// full period after spawning.
    pub(crate) fn spawn_periodic<F, Fut>(&self, name: &'static str, period: Duration, tick: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.rearm();
        let mut stop = self.stop.subscribe();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = stop.changed() => break,
                    _ = ticker.tick() => tick().await,
                }
            }
            tracing::debug!(task = name, "background task stopped");
        });

        self.track(handle);
    }

    /// Calls `on_signal` for every platform signal until shutdown or until
    /// the hub is dropped.
    pub(crate) fn spawn_listener<F, Fut>(
        &self,
        name: &'static str,
        mut signals: broadcast::Receiver<PlatformSignal>,
        on_signal: F,
    ) where
        F: Fn(PlatformSignal) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.rearm();
        let mut stop = self.stop.subscribe();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.changed() => break,
                    received = signals.recv() => match received {
                        Ok(signal) => on_signal(signal).await,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(task = name, skipped, "signal listener lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            tracing::debug!(task = name, "signal listener stopped");
        });

        self.track(handle);
    }

    /// Clears a previous shutdown so tasks can be spawned again.
    fn rearm(&self) {
        self.stop.send_if_modified(|stopped| std::mem::replace(stopped, false));
    }

    fn track(&self, handle: JoinHandle<()>) {
        match self.handles.lock() {
            Ok(mut handles) => handles.push(handle),
            Err(_) => handle.abort(),
        }
    }

    /// Stops every task and waits for them to finish.
    pub(crate) async fn shutdown(&self) {
        self.stop.send_replace(true);

        let handles: Vec<JoinHandle<()>> = match self.handles.lock() {
            Ok(mut handles) => handles.drain(..).collect(),
            Err(_) => Vec::new(),
        };

        for handle in handles {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SignalHub;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_periodic_task_ticks_after_each_period() {
        let tasks = BackgroundTasks::new();
        let count = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&count);
        tasks.spawn_periodic("test", Duration::from_secs(30), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(62)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        tasks.shutdown().await;
        assert_eq!(tasks.len(), 0);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_listener_receives_signals_until_shutdown() {
        let tasks = BackgroundTasks::new();
        let hub = SignalHub::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&seen);
        tasks.spawn_listener("test", hub.subscribe(), move |signal| {
            let counter = Arc::clone(&counter);
            async move {
                if signal == PlatformSignal::Unload {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            }
        });

        hub.emit(PlatformSignal::Online);
        hub.emit(PlatformSignal::Unload);

        for _ in 0..50 {
            if seen.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        tasks.shutdown().await;
    }
}
