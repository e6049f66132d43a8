//! Mining coordination for the devnet
//!
//! Two independent triggers share the node's non-reentrant block-production
//! control surface: a recurring timer that produces one block per tick, and
//! an on-demand pack-mine call that flushes pending transactions in both
//! address spaces. The coordinator guarantees the two never overlap.
//!
//! The exclusion works in two layers. A `pack_guard` atomic flag is set for
//! the whole duration of a pack-mine call; the tick handler observes it and
//! skips the tick outright (no queueing, no retry). Underneath, every
//! control call holds the `control` mutex, so even the window between the
//! flag check and the produce call cannot admit a second in-flight call
//! when real OS threads are involved.

use crate::chain::{NodeRuntime, PACK_BATCH_BLOCKS};
use crate::error::{DevnetError, Result};
use crate::node::ServerStatus;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Minimum recurring interval; anything below this overloads the node
pub const MIN_MINING_INTERVAL: Duration = Duration::from_millis(100);

/// Timeout for the lightweight single-block path
pub const MINE_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for pack-mine; it waits out the node's deferred-execution
/// window and can legitimately take tens of seconds
pub const PACK_MINE_TIMEOUT: Duration = Duration::from_secs(60);

/// Snapshot of the mining loop state
#[derive(Debug, Clone, Serialize)]
pub struct MiningStatus {
    pub is_running: bool,
    pub interval_ms: u64,
    /// Cumulative blocks produced this session; retained across
    /// stop_mining so it reflects the whole process lifetime
    pub blocks_mined: u64,
    pub start_time: Option<SystemTime>,
}

struct MinerShared {
    is_running: AtomicBool,
    interval_ms: AtomicU64,
    blocks_mined: AtomicU64,
    start_time: Mutex<Option<SystemTime>>,
    /// True while a pack-mine call is in flight
    pack_guard: AtomicBool,
    /// Serializes every control call against the node
    control: tokio::sync::Mutex<()>,
}

/// Clears the pack guard on every exit path
struct PackGuardClear {
    shared: Arc<MinerShared>,
}

impl Drop for PackGuardClear {
    fn drop(&mut self) {
        self.shared.pack_guard.store(false, Ordering::Release);
    }
}

/// Arbitrates between the recurring block producer and on-demand calls
pub struct MiningCoordinator<R: NodeRuntime + 'static> {
    node: Arc<R>,
    server_status: Arc<RwLock<ServerStatus>>,
    shared: Arc<MinerShared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<R: NodeRuntime + 'static> MiningCoordinator<R> {
    /// Create a coordinator in the stopped state
    pub fn new(
        node: Arc<R>,
        server_status: Arc<RwLock<ServerStatus>>,
        interval: Duration,
    ) -> Self {
        Self {
            node,
            server_status,
            shared: Arc::new(MinerShared {
                is_running: AtomicBool::new(false),
                interval_ms: AtomicU64::new(interval.as_millis() as u64),
                blocks_mined: AtomicU64::new(0),
                start_time: Mutex::new(None),
                pack_guard: AtomicBool::new(false),
                control: tokio::sync::Mutex::new(()),
            }),
            task: Mutex::new(None),
        }
    }

    /// Whether the recurring loop is running
    pub fn is_running(&self) -> bool {
        self.shared.is_running.load(Ordering::Acquire)
    }

    /// Whether a pack-mine call is currently in flight
    pub fn pack_in_flight(&self) -> bool {
        self.shared.pack_guard.load(Ordering::Acquire)
    }

    /// Cumulative blocks produced
    pub fn blocks_mined(&self) -> u64 {
        self.shared.blocks_mined.load(Ordering::Acquire)
    }

    /// Current recurring interval
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.shared.interval_ms.load(Ordering::Acquire))
    }

    /// Snapshot of the mining state
    pub fn status(&self) -> MiningStatus {
        MiningStatus {
            is_running: self.is_running(),
            interval_ms: self.shared.interval_ms.load(Ordering::Acquire),
            blocks_mined: self.blocks_mined(),
            start_time: *self
                .shared
                .start_time
                .lock()
                .expect("start_time mutex poisoned"),
        }
    }

    fn require_server_running(&self) -> Result<()> {
        let status = *self
            .server_status
            .read()
            .expect("server status lock poisoned");
        if status == ServerStatus::Running {
            Ok(())
        } else {
            Err(DevnetError::ServerNotRunning)
        }
    }

    fn validate_interval(interval: Duration) -> Result<()> {
        if interval < MIN_MINING_INTERVAL {
            return Err(DevnetError::InvalidMiningInterval {
                requested_ms: interval.as_millis() as u64,
                floor_ms: MIN_MINING_INTERVAL.as_millis() as u64,
            });
        }
        Ok(())
    }

    /// Start the recurring mining loop
    ///
    /// `interval` overrides the stored interval when given. Tick failures
    /// are logged and swallowed: transient RPC errors must not kill the
    /// auto-miner.
    pub fn start_mining(&self, interval: Option<Duration>) -> Result<()> {
        self.require_server_running()?;
        if self.shared.is_running.load(Ordering::Acquire) {
            return Err(DevnetError::MiningAlreadyRunning);
        }
        if let Some(interval) = interval {
            Self::validate_interval(interval)?;
            self.shared
                .interval_ms
                .store(interval.as_millis() as u64, Ordering::Release);
        }

        let tick_interval = self.interval();
        *self
            .shared
            .start_time
            .lock()
            .expect("start_time mutex poisoned") = Some(SystemTime::now());
        self.shared.is_running.store(true, Ordering::Release);

        let node = Arc::clone(&self.node);
        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + tick_interval;
            let mut ticker = tokio::time::interval_at(start, tick_interval);
            loop {
                ticker.tick().await;
                if !shared.is_running.load(Ordering::Acquire) {
                    break;
                }
                if shared.pack_guard.load(Ordering::Acquire) {
                    debug!("pack-mine in flight, skipping mining tick");
                    continue;
                }
                // A previous tick still holding the control lock means the
                // node is busy; skip rather than queue.
                let Ok(_control) = shared.control.try_lock() else {
                    debug!("control surface busy, skipping mining tick");
                    continue;
                };
                match tokio::time::timeout(MINE_TIMEOUT, node.produce_blocks(1)).await {
                    Ok(Ok(())) => {
                        shared.blocks_mined.fetch_add(1, Ordering::AcqRel);
                    }
                    Ok(Err(e)) => warn!("mining tick failed: {:#}", e),
                    Err(_) => warn!("mining tick timed out after {:?}", MINE_TIMEOUT),
                }
            }
        });
        *self.task.lock().expect("task mutex poisoned") = Some(handle);

        info!(interval_ms = tick_interval.as_millis() as u64, "mining started");
        Ok(())
    }

    /// Stop the recurring mining loop
    ///
    /// The cumulative block counter is retained.
    pub fn stop_mining(&self) -> Result<()> {
        if !self.shared.is_running.swap(false, Ordering::AcqRel) {
            return Err(DevnetError::MiningNotRunning);
        }
        if let Some(handle) = self.task.lock().expect("task mutex poisoned").take() {
            handle.abort();
        }
        *self
            .shared
            .start_time
            .lock()
            .expect("start_time mutex poisoned") = None;
        info!(blocks_mined = self.blocks_mined(), "mining stopped");
        Ok(())
    }

    /// Change the recurring interval
    ///
    /// Rejects intervals below the floor without touching the current
    /// value. Restarts the loop when it is running.
    pub fn set_interval(&self, interval: Duration) -> Result<()> {
        Self::validate_interval(interval)?;
        if self.shared.is_running.load(Ordering::Acquire) {
            self.stop_mining()?;
            self.start_mining(Some(interval))
        } else {
            self.shared
                .interval_ms
                .store(interval.as_millis() as u64, Ordering::Release);
            Ok(())
        }
    }

    /// Produce `blocks` empty-or-light blocks on demand
    ///
    /// Uses the lightweight single-block path once per block, not the
    /// pack-mine path.
    pub async fn mine(&self, blocks: u64) -> Result<()> {
        self.require_server_running()?;
        for _ in 0..blocks {
            let _control = self.shared.control.lock().await;
            match tokio::time::timeout(MINE_TIMEOUT, self.node.produce_blocks(1)).await {
                Ok(Ok(())) => {
                    self.shared.blocks_mined.fetch_add(1, Ordering::AcqRel);
                }
                Ok(Err(e)) => {
                    return Err(DevnetError::MiningFailure {
                        operation: "mine",
                        source: e.into(),
                    })
                }
                Err(e) => {
                    return Err(DevnetError::MiningFailure {
                        operation: "mine",
                        source: e.into(),
                    })
                }
            }
        }
        Ok(())
    }

    /// Flush pending transactions in both address spaces
    ///
    /// Sets the pack guard before issuing the request; the guard is
    /// cleared on every exit path, success or failure. While it is set,
    /// recurring ticks no-op.
    pub async fn pack_mine(&self) -> Result<()> {
        self.require_server_running()?;
        if self
            .shared
            .pack_guard
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(DevnetError::MiningFailure {
                operation: "pack_mine",
                source: "another pack-mine call is already in flight".into(),
            });
        }
        let _clear = PackGuardClear {
            shared: Arc::clone(&self.shared),
        };

        // Wait for an already-running tick to drain before issuing.
        let _control = self.shared.control.lock().await;
        match tokio::time::timeout(PACK_MINE_TIMEOUT, self.node.pack_pending_transactions()).await
        {
            Ok(Ok(())) => {
                self.shared
                    .blocks_mined
                    .fetch_add(PACK_BATCH_BLOCKS, Ordering::AcqRel);
                info!(blocks = PACK_BATCH_BLOCKS, "pack-mine completed");
                Ok(())
            }
            Ok(Err(e)) => Err(DevnetError::MiningFailure {
                operation: "pack_mine",
                source: e.into(),
            }),
            Err(e) => Err(DevnetError::MiningFailure {
                operation: "pack_mine",
                source: e.into(),
            }),
        }
    }
}

impl<R: NodeRuntime + 'static> Drop for MiningCoordinator<R> {
    fn drop(&mut self) {
        if let Ok(mut task) = self.task.lock() {
            if let Some(handle) = task.take() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::GenesisConfig;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    /// Node double with failure injection and concurrency accounting
    struct RecordingNode {
        produce_calls: AtomicU64,
        pack_calls: AtomicU64,
        in_flight: AtomicU32,
        max_in_flight: AtomicU32,
        fail_next: AtomicU32,
        pack_release: tokio::sync::Semaphore,
        pack_blocks: AtomicBool,
    }

    impl RecordingNode {
        fn new() -> Self {
            Self {
                produce_calls: AtomicU64::new(0),
                pack_calls: AtomicU64::new(0),
                in_flight: AtomicU32::new(0),
                max_in_flight: AtomicU32::new(0),
                fail_next: AtomicU32::new(0),
                pack_release: tokio::sync::Semaphore::new(0),
                pack_blocks: AtomicBool::new(false),
            }
        }

        fn enter(&self) -> u32 {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            now
        }

        fn exit(&self) {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl NodeRuntime for RecordingNode {
        async fn launch(&self, _genesis: &GenesisConfig) -> anyhow::Result<()> {
            Ok(())
        }

        async fn shutdown(&self) -> anyhow::Result<()> {
            Ok(())
        }

        async fn produce_blocks(&self, _count: u64) -> anyhow::Result<()> {
            self.enter();
            let result = if self.fail_next.load(Ordering::SeqCst) > 0 {
                self.fail_next.fetch_sub(1, Ordering::SeqCst);
                Err(anyhow::anyhow!("injected tick failure"))
            } else {
                self.produce_calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            };
            self.exit();
            result
        }

        async fn pack_pending_transactions(&self) -> anyhow::Result<()> {
            self.enter();
            self.pack_calls.fetch_add(1, Ordering::SeqCst);
            if self.pack_blocks.load(Ordering::SeqCst) {
                // Hold the call open until the test releases it
                let permit = self.pack_release.acquire().await;
                drop(permit);
            }
            self.exit();
            Ok(())
        }
    }

    fn running_status() -> Arc<RwLock<ServerStatus>> {
        Arc::new(RwLock::new(ServerStatus::Running))
    }

    fn coordinator(
        node: &Arc<RecordingNode>,
        status: Arc<RwLock<ServerStatus>>,
    ) -> MiningCoordinator<RecordingNode> {
        MiningCoordinator::new(Arc::clone(node), status, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_mining_requires_running_server() {
        let node = Arc::new(RecordingNode::new());
        let status = Arc::new(RwLock::new(ServerStatus::Stopped));
        let miner = coordinator(&node, status);

        assert!(matches!(
            miner.start_mining(None),
            Err(DevnetError::ServerNotRunning)
        ));
        assert!(matches!(
            miner.mine(1).await,
            Err(DevnetError::ServerNotRunning)
        ));
        assert!(matches!(
            miner.pack_mine().await,
            Err(DevnetError::ServerNotRunning)
        ));
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let node = Arc::new(RecordingNode::new());
        let miner = coordinator(&node, running_status());

        miner.start_mining(None).unwrap();
        assert!(matches!(
            miner.start_mining(None),
            Err(DevnetError::MiningAlreadyRunning)
        ));
        miner.stop_mining().unwrap();
    }

    #[tokio::test]
    async fn test_stop_without_start_fails() {
        let node = Arc::new(RecordingNode::new());
        let miner = coordinator(&node, running_status());
        assert!(matches!(
            miner.stop_mining(),
            Err(DevnetError::MiningNotRunning)
        ));
    }

    #[tokio::test]
    async fn test_interval_floor() {
        let node = Arc::new(RecordingNode::new());
        let miner = coordinator(&node, running_status());

        let before = miner.interval();
        let result = miner.set_interval(Duration::from_millis(50));
        assert!(matches!(
            result,
            Err(DevnetError::InvalidMiningInterval {
                requested_ms: 50,
                floor_ms: 100
            })
        ));
        assert_eq!(miner.interval(), before);
    }

    #[tokio::test]
    async fn test_set_interval_while_stopped_records_value() {
        let node = Arc::new(RecordingNode::new());
        let miner = coordinator(&node, running_status());

        miner.set_interval(Duration::from_millis(250)).unwrap();
        assert_eq!(miner.interval(), Duration::from_millis(250));
        assert!(!miner.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_increment_blocks_mined() {
        let node = Arc::new(RecordingNode::new());
        let miner = coordinator(&node, running_status());

        miner.start_mining(Some(Duration::from_secs(2))).unwrap();
        tokio::time::sleep(Duration::from_millis(6500)).await;
        assert_eq!(miner.blocks_mined(), 3);
        assert_eq!(node.produce_calls.load(Ordering::SeqCst), 3);

        miner.stop_mining().unwrap();
        let status = miner.status();
        assert!(!status.is_running);
        assert!(status.start_time.is_none());
        // Counter survives the stop
        assert_eq!(status.blocks_mined, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_failures_do_not_stop_the_loop() {
        let node = Arc::new(RecordingNode::new());
        node.fail_next.store(1, Ordering::SeqCst);
        let miner = coordinator(&node, running_status());

        miner.start_mining(Some(Duration::from_secs(1))).unwrap();
        tokio::time::sleep(Duration::from_millis(3500)).await;

        // First tick failed, the next two succeeded
        assert!(miner.is_running());
        assert_eq!(miner.blocks_mined(), 2);
        miner.stop_mining().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_pack_mine_excludes_ticks() {
        let node = Arc::new(RecordingNode::new());
        node.pack_blocks.store(true, Ordering::SeqCst);
        let miner = Arc::new(coordinator(&node, running_status()));

        miner.start_mining(Some(Duration::from_secs(1))).unwrap();

        let packer = Arc::clone(&miner);
        let pack_task = tokio::spawn(async move { packer.pack_mine().await });

        // Several tick periods elapse while the pack call is held open
        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert!(miner.pack_in_flight());
        assert_eq!(node.produce_calls.load(Ordering::SeqCst), 0);
        assert_eq!(node.pack_calls.load(Ordering::SeqCst), 1);

        // A concurrent pack-mine is rejected while the first is in flight
        assert!(matches!(
            miner.pack_mine().await,
            Err(DevnetError::MiningFailure { .. })
        ));

        node.pack_release.add_permits(1);
        pack_task.await.unwrap().unwrap();

        assert!(!miner.pack_in_flight());
        assert_eq!(miner.blocks_mined(), PACK_BATCH_BLOCKS);
        // Never more than one control call against the node
        assert_eq!(node.max_in_flight.load(Ordering::SeqCst), 1);

        // Ticks resume after the guard clears
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(node.produce_calls.load(Ordering::SeqCst) >= 1);
        miner.stop_mining().unwrap();
    }

    #[tokio::test]
    async fn test_mine_counts_blocks() {
        let node = Arc::new(RecordingNode::new());
        let miner = coordinator(&node, running_status());

        miner.mine(4).await.unwrap();
        assert_eq!(miner.blocks_mined(), 4);
        assert_eq!(node.produce_calls.load(Ordering::SeqCst), 4);
        assert_eq!(node.pack_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_mine_failure_is_surfaced() {
        let node = Arc::new(RecordingNode::new());
        node.fail_next.store(1, Ordering::SeqCst);
        let miner = coordinator(&node, running_status());

        let err = miner.mine(1).await.unwrap_err();
        assert_eq!(err.kind(), "mining_failure");
    }

    #[tokio::test]
    async fn test_pack_mine_clears_guard_on_failure() {
        let node = Arc::new(RecordingNode::new());
        let status = running_status();
        let miner = coordinator(&node, Arc::clone(&status));

        // Flip the server off between the precondition check and a later
        // call to show the guard never sticks
        miner.pack_mine().await.unwrap();
        assert!(!miner.pack_in_flight());

        *status.write().unwrap() = ServerStatus::Stopped;
        assert!(miner.pack_mine().await.is_err());
        assert!(!miner.pack_in_flight());
    }
}
