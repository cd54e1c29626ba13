//! Named timeout registry (§4.C). `register(key, handler)` returns a
//! cancellable `Timer`; a single background worker fires expired handlers in
//! registration order. A cancelled timer never fires.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    collections::BTreeMap,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::debug;

type HandlerFut = Pin<Box<dyn Future<Output = ()> + Send>>;
type HandlerFn = Arc<dyn Fn(String) -> HandlerFut + Send + Sync>;

struct Entry {
    key: String,
    deadline: tokio::time::Instant,
    cancelled: Arc<AtomicBool>,
    handler: HandlerFn,
}

struct Shared {
    // Keyed by monotonically increasing registration id, so iterating the
    // map in key order is iterating in enqueue order.
    entries: Mutex<BTreeMap<u64, Entry>>,
    next_id: AtomicU64,
    notify: Notify,
}

/// One named timeout registry. Typically one per request kind (§3: "two
/// TimerManagers — one for updates, one for state-changes").
pub struct TimerManager {
    shared: Arc<Shared>,
    cancel: CancellationToken,
}

/// A cancellable handle to a registered timer. Dropping it does **not**
/// cancel the timer — call `cancel()` explicitly, matching the teacher
/// crate's explicit `cancel_now`/`stop()` style rather than drop-based
/// cleanup.
#[derive(Debug, Clone)]
pub struct Timer {
    cancelled: Arc<AtomicBool>,
}

impl Timer {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl TimerManager {
    pub fn new() -> Arc<Self> {
        let shared = Arc::new(Shared {
            entries: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(0),
            notify: Notify::new(),
        });
        let cancel = CancellationToken::new();

        tokio::spawn(Self::run(shared.clone(), cancel.clone()));

        Arc::new(TimerManager { shared, cancel })
    }

    /// Schedules `handler(key)` to run after `max_wait`, unless cancelled
    /// first. Multiple timers may share the same `key`; each registration
    /// gets its own independent `Timer` handle.
    pub async fn register<F, Fut>(&self, key: impl Into<String>, max_wait: Duration, handler: F) -> Timer
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        let cancelled = Arc::new(AtomicBool::new(false));
        let deadline = tokio::time::Instant::now() + max_wait;
        let handler: HandlerFn = Arc::new(move |k| Box::pin(handler(k)));

        self.shared.entries.lock().await.insert(
            id,
            Entry {
                key: key.into(),
                deadline,
                cancelled: cancelled.clone(),
                handler,
            },
        );
        self.shared.notify.notify_one();

        Timer { cancelled }
    }

    /// Stops the background worker. Timers already fired are unaffected;
    /// pending ones simply never fire.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    async fn run(shared: Arc<Shared>, cancel: CancellationToken) {
        const IDLE_PARK: Duration = Duration::from_secs(3600);
        loop {
            let next_deadline = {
                let entries = shared.entries.lock().await;
                entries
                    .values()
                    .filter(|e| !e.cancelled.load(Ordering::SeqCst))
                    .map(|e| e.deadline)
                    .min()
            };

            let sleep = match next_deadline {
                Some(deadline) => tokio::time::sleep_until(deadline),
                None => tokio::time::sleep(IDLE_PARK),
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = shared.notify.notified() => continue,
                _ = sleep => {
                    let fired = Self::drain_expired(&shared).await;
                    for entry in fired {
                        (entry.handler)(entry.key).await;
                    }
                },
            }
        }
        debug!("timer manager worker stopped");
    }

    /// Removes and returns every non-cancelled entry whose deadline has
    /// passed, in registration order. Removal happens under the lock;
    /// dispatch happens after it is released so a handler registering a new
    /// timer cannot deadlock against this worker.
    async fn drain_expired(shared: &Arc<Shared>) -> Vec<Entry> {
        let mut entries = shared.entries.lock().await;
        let now = tokio::time::Instant::now();
        let expired_ids: Vec<u64> = entries
            .iter()
            .filter(|(_, e)| e.deadline <= now)
            .map(|(id, _)| *id)
            .collect();

        let mut fired = Vec::with_capacity(expired_ids.len());
        for id in expired_ids {
            if let Some(entry) = entries.remove(&id)
                && !entry.cancelled.load(Ordering::SeqCst)
            {
                fired.push(entry);
            }
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    use super::*;

    #[tokio::test]
    async fn fires_after_max_wait() {
        let mgr = TimerManager::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = fired.clone();

        mgr.register("pdp_1", Duration::from_millis(20), move |_key| {
            let fired = fired2.clone();
            async move {
                fired.fetch_add(1, AtomicOrdering::SeqCst);
            }
        })
        .await;

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(fired.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_timer_never_fires() {
        let mgr = TimerManager::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = fired.clone();

        let timer = mgr
            .register("pdp_1", Duration::from_millis(20), move |_key| {
                let fired = fired2.clone();
                async move {
                    fired.fetch_add(1, AtomicOrdering::SeqCst);
                }
            })
            .await;
        timer.cancel();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(fired.load(AtomicOrdering::SeqCst), 0);
    }

    #[tokio::test]
    async fn expirations_fire_in_registration_order() {
        let mgr = TimerManager::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let order = order.clone();
            mgr.register(format!("k{i}"), Duration::from_millis(10), move |key| {
                let order = order.clone();
                async move {
                    order.lock().await.push(key);
                }
            })
            .await;
        }

        tokio::time::sleep(Duration::from_millis(80)).await;
        let got = order.lock().await.clone();
        assert_eq!(got, vec!["k0", "k1", "k2"]);
    }
}
