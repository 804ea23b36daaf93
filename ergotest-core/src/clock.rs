// Copyright (c) The ergotest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Monotonic time, delays, repeating timers, and the keep-alive watchdog.
//!
//! [`RealClock`] wraps `tokio::time`. [`NullClock`] holds virtual time that
//! tests advance explicitly with [`NullClock::tick_async`] or
//! [`NullClock::tick_until_timers_expire_async`] — the same "advance, then
//! let pending timers fire" shape as a simulated clock built around an
//! event heap of wakers, just specialized to a single pending-timer list
//! since ergotest never needs more than a handful of live timers at once.

use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// A source of monotonic time and delays, abstracted so the engine can run
/// against either real time or virtual time.
pub trait Clock: fmt::Debug + Send + Sync {
    fn now(&self) -> Instant;

    /// Resolves after `duration` has elapsed on this clock.
    fn wait(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// A wall-clock [`Clock`] backed by `tokio::time`.
#[derive(Debug, Default)]
pub struct RealClock;

impl RealClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for RealClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wait(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

#[derive(Debug)]
struct PendingTimer {
    due: Duration,
    tx: oneshot::Sender<()>,
}

#[derive(Debug, Default)]
struct NullClockState {
    elapsed: Duration,
    timers: Vec<PendingTimer>,
}

/// A [`Clock`] whose time only moves when a test explicitly advances it.
///
/// `tick_async`/`tick_until_timers_expire_async` exist only on `NullClock`,
/// not on the `Clock` trait: a caller holding a `RealClock` has no way to
/// advance it, so "attempting to advance a real clock fails fast" is a
/// compile-time property here rather than a runtime check.
#[derive(Debug, Clone)]
pub struct NullClock {
    base: Instant,
    state: Arc<Mutex<NullClockState>>,
}

impl Default for NullClock {
    fn default() -> Self {
        Self::new()
    }
}

impl NullClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            state: Arc::new(Mutex::new(NullClockState::default())),
        }
    }

    /// Advances virtual time by `duration`, resolving any timer now due.
    ///
    /// A timer registers as soon as [`NullClock::wait`] is called, not on
    /// first poll, so callers only need to have called `wait` (not
    /// necessarily awaited it) before advancing.
    pub async fn tick_async(&self, duration: Duration) {
        let due = {
            let mut state = self.state.lock().expect("NullClock state poisoned");
            state.elapsed += duration;
            state.elapsed
        };
        self.fire_due(due);
    }

    /// Advances virtual time directly to the next pending timer's due time,
    /// firing it. No-op if no timers are pending.
    pub async fn tick_until_timers_expire_async(&self) {
        let next_due = {
            let state = self.state.lock().expect("NullClock state poisoned");
            state.timers.iter().map(|t| t.due).min()
        };
        if let Some(due) = next_due {
            {
                let mut state = self.state.lock().expect("NullClock state poisoned");
                state.elapsed = state.elapsed.max(due);
            }
            self.fire_due(due);
        }
    }

    fn fire_due(&self, elapsed: Duration) {
        let fired: Vec<_> = {
            let mut state = self.state.lock().expect("NullClock state poisoned");
            let (due, pending): (Vec<_>, Vec<_>) =
                state.timers.drain(..).partition(|t| t.due <= elapsed);
            state.timers = pending;
            due
        };
        for timer in fired {
            let _ = timer.tx.send(());
        }
    }
}

impl Clock for NullClock {
    fn now(&self) -> Instant {
        self.base + self.state.lock().expect("NullClock state poisoned").elapsed
    }

    fn wait(&self, duration: Duration) -> BoxFuture<'static, ()> {
        let (tx, rx) = oneshot::channel();
        let due = {
            let mut state = self.state.lock().expect("NullClock state poisoned");
            let due = state.elapsed + duration;
            state.timers.push(PendingTimer { due, tx });
            due
        };
        // A zero-duration wait on already-elapsed time resolves immediately
        // on the next tick; fire it eagerly if it's already due.
        let state = Arc::clone(&self.state);
        Box::pin(async move {
            {
                let current = state.lock().expect("NullClock state poisoned").elapsed;
                if due <= current {
                    return;
                }
            }
            let _ = rx.await;
        })
    }
}

/// Races `fut` against a `duration` timer on `clock`. If the timer expires
/// first, resolves with `on_timeout` instead; `fut` is not cancelled, and
/// its eventual resolution (if any) is discarded.
pub async fn timeout_async<T, Fut, OnTimeout>(
    clock: &dyn Clock,
    duration: Duration,
    fut: Fut,
    on_timeout: OnTimeout,
) -> T
where
    Fut: Future<Output = T>,
    OnTimeout: Future<Output = T>,
{
    tokio::select! {
        result = fut => result,
        _ = clock.wait(duration) => on_timeout.await,
    }
}

/// A handle to a [`repeat`] timer.
pub struct RepeatHandle {
    abort: tokio::task::AbortHandle,
}

impl RepeatHandle {
    pub fn cancel(&self) {
        self.abort.abort();
    }
}

/// Calls `on_tick` every `interval` until the returned handle is cancelled
/// or dropped.
pub fn repeat(clock: Arc<dyn Clock>, interval: Duration, on_tick: impl Fn() + Send + Sync + 'static) -> RepeatHandle {
    let join = tokio::spawn(async move {
        loop {
            clock.wait(interval).await;
            on_tick();
        }
    });
    RepeatHandle {
        abort: join.abort_handle(),
    }
}

/// A keep-alive watchdog: [`KeepAlive::alive`] restarts the timer,
/// [`KeepAlive::cancel`] stops it and makes later `alive()` calls no-ops.
pub struct KeepAlive {
    reset_tx: tokio::sync::mpsc::UnboundedSender<()>,
    cancelled: Arc<AtomicBool>,
    abort: tokio::task::AbortHandle,
}

impl KeepAlive {
    pub fn alive(&self) {
        if !self.cancelled.load(Ordering::SeqCst) {
            let _ = self.reset_tx.send(());
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.abort.abort();
    }
}

/// Starts a watchdog that calls `on_timeout` if `timeout` elapses without an
/// intervening [`KeepAlive::alive`] call.
pub fn keep_alive(clock: Arc<dyn Clock>, timeout: Duration, on_timeout: impl Fn() + Send + Sync + 'static) -> KeepAlive {
    let (reset_tx, mut reset_rx) = tokio::sync::mpsc::unbounded_channel::<()>();
    let cancelled = Arc::new(AtomicBool::new(false));
    let join = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = clock.wait(timeout) => {
                    on_timeout();
                    return;
                }
                reset = reset_rx.recv() => {
                    if reset.is_none() {
                        return;
                    }
                }
            }
        }
    });
    KeepAlive {
        reset_tx,
        cancelled,
        abort: join.abort_handle(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn real_clock_wait_resolves_after_duration() {
        let clock = RealClock::new();
        let start = clock.now();
        clock.wait(Duration::from_millis(5)).await;
        assert!(clock.now().duration_since(start) >= Duration::from_millis(5));
    }

    #[tokio::test]
    async fn null_clock_wait_resolves_on_exact_tick() {
        let clock = NullClock::new();
        let waiter = clock.wait(Duration::from_millis(100));
        let ((), ()) = tokio::join!(waiter, clock.tick_async(Duration::from_millis(100)));
    }

    #[tokio::test]
    async fn null_clock_tick_until_timers_expire_fires_nearest_timer() {
        let clock = NullClock::new();
        let waiter = clock.wait(Duration::from_millis(50));
        tokio::join!(waiter, clock.tick_until_timers_expire_async());
    }

    #[tokio::test]
    async fn timeout_async_returns_fn_result_when_faster() {
        let clock = RealClock::new();
        let result = timeout_async(
            &clock,
            Duration::from_secs(10),
            async { 1 },
            async { 2 },
        )
        .await;
        assert_eq!(result, 1);
    }

    #[tokio::test]
    async fn timeout_async_returns_on_timeout_result_when_slower() {
        let clock = NullClock::new();
        let fut = timeout_async(
            &clock,
            Duration::from_millis(10),
            std::future::pending::<i32>(),
            async { 42 },
        );
        let (result, ()) = tokio::join!(fut, clock.tick_async(Duration::from_millis(10)));
        assert_eq!(result, 42);
    }
}
