//! Serialization of apply passes and the trigger loop driving them.
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct LobbyState {
    running: bool,
    queued: bool,
}

/// Admission control for apply passes: one running slot, one waiting
/// slot, everything else coalesced.
///
/// A burst of triggers (webhook storms, an admin resync during the
/// periodic tick) therefore collapses into at most one additional
/// pass after the current one.
#[derive(Debug, Default)]
pub struct ApplyLobby {
    state: Mutex<LobbyState>,
    notify: Notify,
}

impl ApplyLobby {
    /// A fresh lobby with both slots free.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask to run a pass.
    ///
    /// Returns `None` when a pass is already waiting (the trigger is
    /// coalesced into it). Otherwise it resolves — immediately or
    /// once the current pass hands over — to a guard holding the
    /// running slot until dropped.
    pub async fn enter(&self) -> Option<LobbyGuard<'_>> {
        {
            let mut state = self.state.lock();
            if state.queued {
                return None;
            }
            if !state.running {
                state.running = true;
                return Some(LobbyGuard { lobby: self });
            }
            state.queued = true;
        }
        loop {
            let notified = self.notify.notified();
            {
                let state = self.state.lock();
                // the finishing pass cleared our queued flag: the
                // running slot is ours now
                if !state.queued {
                    return Some(LobbyGuard { lobby: self });
                }
            }
            notified.await;
        }
    }
}

/// Holds the lobby's running slot; dropping it hands over to the
/// queued pass, if any.
pub struct LobbyGuard<'a> {
    lobby: &'a ApplyLobby,
}

impl Drop for LobbyGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.lobby.state.lock();
        if state.queued {
            state.queued = false;
            self.lobby.notify.notify_one();
        } else {
            state.running = false;
        }
    }
}

/// Handle used by webhook and admin paths to request a pass.
#[derive(Debug, Clone)]
pub struct Trigger {
    tx: mpsc::Sender<()>,
}

impl Trigger {
    /// Request an apply pass. Never blocks; requests landing while
    /// one is already pending are dropped (the pending pass covers
    /// them).
    pub fn fire(&self) {
        let _ = self.tx.try_send(());
    }
}

/// Drives apply passes from a periodic ticker and external triggers,
/// serialized through an [`ApplyLobby`].
pub struct Scheduler {
    lobby: Arc<ApplyLobby>,
    interval: Duration,
    tx: mpsc::Sender<()>,
    rx: mpsc::Receiver<()>,
}

impl Scheduler {
    /// A scheduler ticking every `interval`.
    pub fn new(interval: Duration) -> Self {
        let (tx, rx) = mpsc::channel(1);
        Scheduler {
            lobby: Arc::new(ApplyLobby::new()),
            interval,
            tx,
            rx,
        }
    }

    /// A handle for firing external triggers.
    pub fn trigger(&self) -> Trigger {
        Trigger { tx: self.tx.clone() }
    }

    /// The lobby serializing the passes.
    pub fn lobby(&self) -> Arc<ApplyLobby> {
        self.lobby.clone()
    }

    /// Run until `shutdown` fires. The first tick happens
    /// immediately, so startup always applies once.
    pub async fn run<F, Fut>(mut self, shutdown: CancellationToken, apply: F)
    where
        F: Fn() -> Fut + Clone + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => self.spawn_pass(apply.clone()),
                Some(()) = self.rx.recv() => self.spawn_pass(apply.clone()),
            }
        }
    }

    fn spawn_pass<F, Fut>(&self, apply: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let lobby = self.lobby.clone();
        tokio::spawn(async move {
            if let Some(_guard) = lobby.enter().await {
                apply().await;
            } else {
                tracing::debug!("apply trigger coalesced into the queued pass");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn a_burst_of_triggers_runs_exactly_two_passes() {
        let lobby = Arc::new(ApplyLobby::new());
        let passes = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());

        // first pass: holds the running slot until the gate opens
        let first = {
            let lobby = lobby.clone();
            let passes = passes.clone();
            let gate = gate.clone();
            tokio::spawn(async move {
                let _guard = lobby.enter().await.expect("first entry runs");
                passes.fetch_add(1, Ordering::SeqCst);
                gate.notified().await;
            })
        };
        tokio::task::yield_now().await;

        // a burst of five more triggers while the first is running
        let mut burst = Vec::new();
        for _ in 0..5 {
            let lobby = lobby.clone();
            let passes = passes.clone();
            burst.push(tokio::spawn(async move {
                if let Some(_guard) = lobby.enter().await {
                    passes.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }
        // let every burst task reach the lobby
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        gate.notify_one();
        first.await.unwrap();
        for handle in burst {
            handle.await.unwrap();
        }

        // one running + one queued; the other four were coalesced
        assert_eq!(passes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn sequential_passes_all_run() {
        let lobby = ApplyLobby::new();
        for _ in 0..3 {
            let guard = lobby.enter().await;
            assert!(guard.is_some());
        }
    }

    #[tokio::test]
    async fn trigger_requests_coalesce_in_the_channel() {
        let scheduler = Scheduler::new(Duration::from_secs(3600));
        let trigger = scheduler.trigger();
        trigger.fire();
        trigger.fire();
        trigger.fire();

        let mut rx = scheduler.rx;
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}
