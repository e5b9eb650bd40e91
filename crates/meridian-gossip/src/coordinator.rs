// crates/meridian-gossip/src/coordinator.rs
//
// Engine coordinator: the single lock around DAG and consensus state, the
// busy flags the emitter paces on, and the in-flight work counter the
// shutdown sequence joins on.
//
// Engine state is only reachable through the guards handed out here. The
// write guards raise `event_busy` or `block_busy` for exactly as long as
// they are held; the flags are advisory and never used for exclusion.

use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{Notify, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::task::JoinHandle;

use meridian_core::{ConsensusEngine, MeridianError};

use crate::dag::DagIndex;
use crate::state::{ServiceState, ServiceStateMachine};

/// State mutated only under the engine write lock.
pub struct EngineState {
    pub dag: DagIndex,
    pub engine: Box<dyn ConsensusEngine>,
    /// Set once by the shutdown sequence; admission refuses afterwards.
    pub stopped: bool,
}

/// Counter of outstanding asynchronous work.
#[derive(Debug, Default)]
pub struct Inflight {
    count: AtomicUsize,
    zero: Notify,
}

impl Inflight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one unit of work until the returned guard drops.
    pub fn track(self: &Arc<Self>) -> InflightGuard {
        self.count.fetch_add(1, Ordering::AcqRel);
        InflightGuard {
            inflight: self.clone(),
        }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Wait until no work is outstanding.
    pub async fn wait_zero(&self) {
        loop {
            let notified = self.zero.notified();
            tokio::pin!(notified);
            // Register before reading the counter so a concurrent last drop
            // cannot slip between the check and the wait.
            notified.as_mut().enable();
            if self.count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Decrements its counter on drop, unwinding included.
#[derive(Debug)]
pub struct InflightGuard {
    inflight: Arc<Inflight>,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        if self.inflight.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inflight.zero.notify_waiters();
        }
    }
}

/// Write access to engine state with a busy flag raised.
pub struct EngineWriteGuard<'a> {
    guard: RwLockWriteGuard<'a, EngineState>,
    busy: &'a AtomicBool,
}

impl Deref for EngineWriteGuard<'_> {
    type Target = EngineState;

    fn deref(&self) -> &EngineState {
        &self.guard
    }
}

impl DerefMut for EngineWriteGuard<'_> {
    fn deref_mut(&mut self) -> &mut EngineState {
        &mut self.guard
    }
}

impl Drop for EngineWriteGuard<'_> {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

pub struct EngineCoordinator {
    state: RwLock<EngineState>,
    event_busy: AtomicBool,
    block_busy: AtomicBool,
    inflight: Arc<Inflight>,
    closed: AtomicBool,
    halted: AtomicBool,
    lifecycle: parking_lot::Mutex<ServiceStateMachine>,
}

impl EngineCoordinator {
    pub fn new(engine: Box<dyn ConsensusEngine>, dag: DagIndex) -> Self {
        Self {
            state: RwLock::new(EngineState {
                dag,
                engine,
                stopped: false,
            }),
            event_busy: AtomicBool::new(false),
            block_busy: AtomicBool::new(false),
            inflight: Arc::new(Inflight::new()),
            closed: AtomicBool::new(false),
            halted: AtomicBool::new(false),
            lifecycle: parking_lot::Mutex::new(ServiceStateMachine::new()),
        }
    }

    /// Shared access for parent resolution and event building.
    pub async fn read(&self) -> RwLockReadGuard<'_, EngineState> {
        self.state.read().await
    }

    /// Exclusive access for event admission.
    pub async fn write_events(&self) -> EngineWriteGuard<'_> {
        let guard = self.state.write().await;
        self.event_busy.store(true, Ordering::Release);
        EngineWriteGuard {
            guard,
            busy: &self.event_busy,
        }
    }

    /// Exclusive access for block sealing and epoch rollover.
    pub async fn write_block(&self) -> EngineWriteGuard<'_> {
        let guard = self.state.write().await;
        self.block_busy.store(true, Ordering::Release);
        EngineWriteGuard {
            guard,
            busy: &self.block_busy,
        }
    }

    pub fn event_busy(&self) -> bool {
        self.event_busy.load(Ordering::Acquire)
    }

    pub fn block_busy(&self) -> bool {
        self.block_busy.load(Ordering::Acquire)
    }

    pub fn is_busy(&self) -> bool {
        self.event_busy() || self.block_busy()
    }

    pub fn track(&self) -> InflightGuard {
        self.inflight.track()
    }

    /// Spawn `fut` counted as in-flight work until it completes.
    pub fn spawn_tracked<F>(&self, fut: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let guard = self.track();
        tokio::spawn(async move {
            let _guard = guard;
            fut.await
        })
    }

    pub fn inflight(&self) -> usize {
        self.inflight.count()
    }

    pub async fn wait_quiescent(&self) {
        self.inflight.wait_zero().await;
    }

    /// Stop intake. Work already in flight continues.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = self.lifecycle.lock().transition(ServiceState::Stopping) {
            tracing::debug!("Closing coordinator: {}", e);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Move the node to the fatal state. Idempotent; the first reason wins.
    pub fn halt(&self, reason: &str) {
        if self.halted.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::error!("Node halted: {}", reason);
        if let Err(e) = self.lifecycle.lock().transition(ServiceState::Halted) {
            tracing::debug!("Halting coordinator: {}", e);
        }
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// Fails with `Fatal` once halted and with `Stopped` once closed.
    pub fn ensure_open(&self) -> Result<(), MeridianError> {
        if self.is_halted() {
            return Err(MeridianError::Fatal("node halted".to_string()));
        }
        if self.is_closed() {
            return Err(MeridianError::Stopped);
        }
        Ok(())
    }

    pub fn lifecycle(&self) -> ServiceState {
        self.lifecycle.lock().current
    }

    /// Mark engine state stopped. Takes the guard to prove the lock is held.
    pub fn mark_stopped(&self, state: &mut EngineWriteGuard<'_>) {
        state.stopped = true;
        if let Err(e) = self.lifecycle.lock().transition(ServiceState::Stopped) {
            tracing::debug!("Stopping coordinator: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::engine::OrderingEngine;

    fn coordinator() -> Arc<EngineCoordinator> {
        Arc::new(EngineCoordinator::new(Box::new(OrderingEngine::new(1)), DagIndex::new()))
    }

    #[tokio::test]
    async fn test_busy_flags_follow_guards() {
        let coordinator = coordinator();
        assert!(!coordinator.is_busy());

        {
            let _guard = coordinator.write_events().await;
            assert!(coordinator.event_busy());
            assert!(!coordinator.block_busy());
        }
        assert!(!coordinator.is_busy());

        {
            let _guard = coordinator.write_block().await;
            assert!(coordinator.block_busy());
        }
        assert!(!coordinator.is_busy());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_writers_are_exclusive() {
        let coordinator = coordinator();
        let holders = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..16 {
            let coordinator = coordinator.clone();
            let holders = holders.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..20 {
                    let _guard = if i % 2 == 0 {
                        coordinator.write_events().await
                    } else {
                        coordinator.write_block().await
                    };
                    let now = holders.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    holders.fetch_sub(1, Ordering::SeqCst);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert!(!coordinator.is_busy());
    }

    #[tokio::test]
    async fn test_wait_quiescent_joins_tracked_work() {
        let coordinator = coordinator();
        let finished = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let finished = finished.clone();
            coordinator.spawn_tracked(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                finished.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(coordinator.inflight(), 5);

        coordinator.wait_quiescent().await;
        assert_eq!(finished.load(Ordering::SeqCst), 5);
        assert_eq!(coordinator.inflight(), 0);
    }

    #[tokio::test]
    async fn test_guard_released_on_panic() {
        let coordinator = coordinator();
        let handle = coordinator.spawn_tracked(async {
            panic!("boom");
        });
        assert!(handle.await.is_err());
        assert_eq!(coordinator.inflight(), 0);
    }

    #[tokio::test]
    async fn test_close_and_halt() {
        let coordinator = coordinator();
        assert!(coordinator.ensure_open().is_ok());

        coordinator.halt("engine fault");
        assert!(matches!(coordinator.ensure_open(), Err(MeridianError::Fatal(_))));
        assert_eq!(coordinator.lifecycle(), ServiceState::Halted);

        // Closing after a halt keeps the node halted.
        coordinator.close();
        assert_eq!(coordinator.lifecycle(), ServiceState::Halted);
    }

    #[tokio::test]
    async fn test_stop_lifecycle() {
        let coordinator = coordinator();
        coordinator.close();
        assert!(matches!(coordinator.ensure_open(), Err(MeridianError::Stopped)));
        assert_eq!(coordinator.lifecycle(), ServiceState::Stopping);

        let mut guard = coordinator.write_events().await;
        coordinator.mark_stopped(&mut guard);
        assert!(guard.stopped);
        drop(guard);
        assert_eq!(coordinator.lifecycle(), ServiceState::Stopped);
    }
}
