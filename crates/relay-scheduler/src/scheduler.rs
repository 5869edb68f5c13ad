//! Deadline scheduler.
//!
//! An active component: a durable priority queue that *fires* a handler
//! when a deadline is reached, instead of waiting to be asked. The queue
//! itself is an in-memory `BinaryHeap`; every entry is also a row in
//! `timeout_events` so a restart can rehydrate it.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use relay_core::backoff::BackoffSchedule;
use relay_core::order::TimeoutKind;
use relay_core::types::{OrderId, Timestamp};
use relay_core::RelayerError;
use relay_store::OrderStore;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// One armed deadline: `order_id` + `kind` uniquely identifies it (the
/// store enforces this with a `UNIQUE (order_id, kind)` constraint).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledFire {
    pub fire_at: Timestamp,
    pub order_id: OrderId,
    pub kind: TimeoutKind,
    pub timeout_event_id: i64,
}

impl Ord for ScheduledFire {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.fire_at
            .cmp(&other.fire_at)
            .then_with(|| self.order_id.cmp(&other.order_id))
    }
}

impl PartialOrd for ScheduledFire {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Callback invoked when a deadline fires. Implemented by the order
/// coordinator: a source timeout drives a cancel/refund attempt, a
/// destination timeout drives a destination-side refund attempt.
#[async_trait]
pub trait TimeoutHandler: Send + Sync {
    async fn on_timeout(&self, order_id: OrderId, kind: TimeoutKind) -> Result<(), RelayerError>;
}

struct Inner {
    heap: Mutex<BinaryHeap<Reverse<ScheduledFire>>>,
    cancelled: Mutex<HashSet<(OrderId, TimeoutKind)>>,
    wake: Notify,
}

/// Durable deadline scheduler. One instance per relayer process; `run`
/// drives the fire loop until its `CancellationToken` trips.
pub struct DeadlineScheduler<H: TimeoutHandler> {
    store: Arc<OrderStore>,
    handler: Arc<H>,
    backoff: BackoffSchedule,
    inner: Inner,
}

impl<H: TimeoutHandler + 'static> DeadlineScheduler<H> {
    pub fn new(store: Arc<OrderStore>, handler: Arc<H>, backoff: BackoffSchedule) -> Self {
        Self {
            store,
            handler,
            backoff,
            inner: Inner {
                heap: Mutex::new(BinaryHeap::new()),
                cancelled: Mutex::new(HashSet::new()),
                wake: Notify::new(),
            },
        }
    }

    /// Durably arm a deadline and enqueue it. Idempotent: re-arming the
    /// same `(order_id, kind)` replaces the scheduled time.
    pub async fn arm(&self, order_id: OrderId, kind: TimeoutKind, fire_at: Timestamp) -> Result<(), RelayerError> {
        let timeout_event_id = self
            .store
            .arm_timeout(order_id, kind, fire_at)
            .await
            .map_err(RelayerError::from)?;

        self.inner.cancelled.lock().await.remove(&(order_id, kind));
        self.inner.heap.lock().await.push(Reverse(ScheduledFire {
            fire_at,
            order_id,
            kind,
            timeout_event_id,
        }));
        self.inner.wake.notify_one();
        Ok(())
    }

    /// Prevent an armed deadline from firing (e.g. the order reached a
    /// terminal state through its happy path before the timelock expired).
    /// Lazy deletion: the entry stays in the heap but is skipped when popped.
    pub async fn cancel(&self, order_id: OrderId, kind: TimeoutKind) {
        self.inner.cancelled.lock().await.insert((order_id, kind));
    }

    /// Rehydrate the in-memory queue from durable state after a restart.
    /// Past-due deadlines are pushed in scheduled-time order and fire
    /// immediately once `run` starts (spec's crash-recovery requirement).
    pub async fn recover(&self) -> Result<usize, RelayerError> {
        let pending = self.store.list_unexecuted_timeouts().await.map_err(RelayerError::from)?;
        let count = pending.len();
        let mut heap = self.inner.heap.lock().await;
        for event in pending {
            heap.push(Reverse(ScheduledFire {
                fire_at: event.scheduled_at,
                order_id: event.order_id,
                kind: event.kind,
                timeout_event_id: event.id,
            }));
        }
        info!(recovered = count, "scheduler recovered pending timeouts from durable storage");
        Ok(count)
    }

    /// Drive the fire loop until `cancel` trips. Each fire is handled with
    /// retry-with-backoff on transient handler errors; a permanent failure
    /// is recorded against the timeout event and the loop continues.
    pub async fn run(&self, cancel: CancellationToken, now_fn: impl Fn() -> Timestamp) {
        loop {
            let next = { self.inner.heap.lock().await.peek().map(|Reverse(f)| *f) };

            let sleep_until = match next {
                Some(fire) => {
                    let now = now_fn();
                    let delay = (fire.fire_at - now).max(0) as u64;
                    Instant::now() + Duration::from_secs(delay)
                }
                None => Instant::now() + Duration::from_secs(3600),
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("scheduler shutting down");
                    return;
                }
                _ = self.inner.wake.notified() => continue,
                _ = tokio::time::sleep_until(sleep_until) => {}
            }

            let fire = {
                let mut heap = self.inner.heap.lock().await;
                match heap.peek() {
                    Some(Reverse(f)) if f.fire_at <= now_fn() => heap.pop().map(|Reverse(f)| f),
                    _ => None,
                }
            };

            let Some(fire) = fire else { continue };

            if self.inner.cancelled.lock().await.remove(&(fire.order_id, fire.kind)) {
                continue;
            }

            self.dispatch(fire).await;
        }
    }

    async fn dispatch(&self, fire: ScheduledFire) {
        let mut attempt = 0;
        loop {
            match self.handler.on_timeout(fire.order_id, fire.kind).await {
                Ok(()) => {
                    if let Err(e) = self.store.mark_timeout_executed(fire.timeout_event_id, fire.fire_at, None).await {
                        error!(error = %e, order_id = fire.order_id, "failed to record timeout execution");
                    }
                    return;
                }
                Err(e) if e.is_transient() => match self.backoff.delay_for(attempt) {
                    Some(delay) => {
                        warn!(order_id = fire.order_id, ?fire.kind, attempt, ?delay, "timeout handler failed transiently, retrying");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => {
                        error!(order_id = fire.order_id, "timeout handler exhausted retries");
                        let _ = self
                            .store
                            .mark_timeout_executed(fire.timeout_event_id, fire.fire_at, Some(&e.to_string()))
                            .await;
                        return;
                    }
                },
                Err(e) => {
                    error!(order_id = fire.order_id, error = %e, "timeout handler failed permanently");
                    let _ = self
                        .store
                        .mark_timeout_executed(fire.timeout_event_id, fire.fire_at, Some(&e.to_string()))
                        .await;
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduled_fire_orders_by_fire_time_then_order_id() {
        let a = ScheduledFire { fire_at: 100, order_id: 2, kind: TimeoutKind::SrcTimeout, timeout_event_id: 1 };
        let b = ScheduledFire { fire_at: 50, order_id: 1, kind: TimeoutKind::SrcTimeout, timeout_event_id: 2 };
        assert!(b < a);
        let c = ScheduledFire { fire_at: 100, order_id: 1, kind: TimeoutKind::SrcTimeout, timeout_event_id: 3 };
        assert!(c < a);
    }
}
