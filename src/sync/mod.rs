//! Bootstrap synchronization controller.
//!
//! Drives one client session from start-up to a usable snapshot:
//!
//! ```text
//! Init ─► AwaitingIdentity ─┬─ identity ───────────────► Fetching ─┬─► Ready
//!                           └─ timeout ─┬─ ProceedAnonymous ─┘     └─► Failed
//!                                       └─ Decline ─► TimedOutNoIdentity
//! refresh() ─► Fetching (from any state)
//! ```
//!
//! The identity trigger and the timeout trigger race for a single latch;
//! only the winner acts. Every fetch cycle carries a token, and a result is
//! written to the snapshot and state only if its token is still current, so
//! a superseded cycle can never overwrite a newer one. The three reads run
//! concurrently and the snapshot is replaced as a whole or not at all.

use chrono::Utc;
use futures::try_join;
use serde::Deserialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::gateway::RemoteDataGateway;
use crate::identity::{Credential, IdentitySource};
use crate::types::{DataStore, DeskError, Endpoint, SyncState};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What to do when the identity wait elapses without a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityFallback {
    /// Do not fetch; end the cycle in `TimedOutNoIdentity`.
    #[default]
    Decline,
    /// Fetch without a credential and let the service decide.
    ProceedAnonymous,
}

/// Timing and policy for the bootstrap cycle.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Bounded wait for the host identity.
    pub identity_timeout: Duration,
    /// Minimum time from fetch start to `Ready`.
    pub min_dwell: Duration,
    pub fallback: IdentityFallback,
    /// `limit` passed to the transactions read.
    pub transactions_limit: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            identity_timeout: Duration::from_secs(5),
            min_dwell: Duration::from_secs(5),
            fallback: IdentityFallback::Decline,
            transactions_limit: 50,
        }
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Current cycle token and the tasks that may still write under it.
#[derive(Default)]
struct CycleSlot {
    token: u64,
    bootstrap: Option<JoinHandle<()>>,
    fetch: Option<JoinHandle<()>>,
}

struct Inner {
    session_id: Uuid,
    config: SyncConfig,
    identity: Arc<dyn IdentitySource>,
    gateway: Arc<dyn RemoteDataGateway>,
    state: watch::Sender<SyncState>,
    /// Flips to `true` once on shutdown.
    closed: watch::Sender<bool>,
    snapshot: RwLock<Arc<DataStore>>,
    /// Set by whichever bootstrap trigger fires first.
    latch: AtomicBool,
    /// State transitions and snapshot writes happen while this is held.
    cycle: Mutex<CycleSlot>,
}

impl Inner {
    fn slot(&self) -> MutexGuard<'_, CycleSlot> {
        self.cycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Callers hold the cycle lock, so a claim and the cycle it starts are
    /// one step with respect to `refresh` and `shutdown`.
    fn claim_bootstrap(&self) -> bool {
        self.latch
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn on_identity(self: &Arc<Self>, credential: Credential) -> bool {
        let mut slot = self.slot();
        if !self.claim_bootstrap() {
            debug!(session = %self.session_id, "Identity arrived after bootstrap trigger; ignored");
            return false;
        }
        let user = credential
            .user()
            .map(|u| u.handle())
            .unwrap_or_else(|| "unknown".to_string());
        info!(session = %self.session_id, user = %user, "Host identity observed");
        self.begin_cycle(&mut slot, Some(credential));
        true
    }

    fn on_identity_timeout(self: &Arc<Self>) -> bool {
        let mut slot = self.slot();
        if !self.claim_bootstrap() {
            debug!(session = %self.session_id, "Identity timeout after bootstrap trigger; ignored");
            return false;
        }
        let waited_ms = self.config.identity_timeout.as_millis() as u64;
        match self.config.fallback {
            IdentityFallback::ProceedAnonymous => {
                warn!(session = %self.session_id, waited_ms, "No host identity, fetching anonymously");
                self.begin_cycle(&mut slot, None);
            }
            IdentityFallback::Decline => {
                warn!(session = %self.session_id, waited_ms, "No host identity, not fetching");
                self.state.send_if_modified(|state| {
                    if *state == SyncState::AwaitingIdentity {
                        *state = SyncState::TimedOutNoIdentity;
                        true
                    } else {
                        false
                    }
                });
            }
        }
        true
    }

    /// Start a new cycle, superseding any cycle still in flight.
    fn begin_cycle(self: &Arc<Self>, slot: &mut CycleSlot, credential: Option<Credential>) -> u64 {
        slot.token += 1;
        let token = slot.token;

        if let Some(prev) = slot.fetch.take() {
            prev.abort();
            debug!(session = %self.session_id, cycle = token - 1, "Superseded cycle aborted");
        }

        self.state.send_replace(SyncState::Fetching);
        info!(
            session = %self.session_id,
            cycle = token,
            authenticated = credential.is_some(),
            "Fetch cycle started"
        );

        let inner = Arc::clone(self);
        slot.fetch = Some(tokio::spawn(async move {
            inner.run_cycle(token, credential).await;
        }));
        token
    }

    async fn run_cycle(&self, token: u64, credential: Option<Credential>) {
        let started = Instant::now();
        let outcome = self.fetch_all(credential).await;

        // The loading floor only delays success; failures surface at once.
        if outcome.is_ok() {
            sleep_until(started + self.config.min_dwell).await;
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        if self.commit(token, outcome) {
            debug!(session = %self.session_id, cycle = token, elapsed_ms, "Fetch cycle settled");
        }
    }

    async fn fetch_all(&self, credential: Option<Credential>) -> Result<DataStore, DeskError> {
        let gw = &self.gateway;
        let (balance, stats, transactions) = try_join!(
            tagged(Endpoint::Balance, gw.get_balance(credential.clone())),
            tagged(Endpoint::Statistics, gw.get_statistics(credential.clone())),
            tagged(
                Endpoint::Transactions,
                gw.get_transactions(credential, self.config.transactions_limit)
            ),
        )?;

        Ok(DataStore {
            balance,
            stats,
            transactions,
            fetched_at: None,
        })
    }

    /// Publish a cycle's outcome. Returns `false` if the cycle is stale.
    fn commit(&self, token: u64, outcome: Result<DataStore, DeskError>) -> bool {
        let mut slot = self.slot();
        if slot.token != token {
            debug!(
                session = %self.session_id,
                cycle = token,
                current = slot.token,
                "Stale cycle result discarded"
            );
            return false;
        }
        slot.fetch = None;

        match outcome {
            Ok(mut store) => {
                store.fetched_at = Some(Utc::now());
                info!(
                    session = %self.session_id,
                    cycle = token,
                    balance = %store.balance.total,
                    transactions = store.transactions.len(),
                    "Snapshot replaced"
                );
                *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(store);
                self.state.send_replace(SyncState::Ready);
            }
            Err(e) => {
                warn!(session = %self.session_id, cycle = token, error = %e, "Fetch cycle failed");
                self.state.send_replace(SyncState::Failed(e));
            }
        }
        true
    }
}

/// Attach the endpoint to a gateway error.
async fn tagged<T>(
    endpoint: Endpoint,
    call: impl Future<Output = anyhow::Result<T>>,
) -> Result<T, DeskError> {
    call.await.map_err(|e| DeskError::RemoteCallFailure {
        endpoint,
        message: format!("{e:#}"),
    })
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// One session's bootstrap controller. Owns the snapshot; the view layer
/// only reads it. Dropping the controller tears the session down.
pub struct SyncController {
    inner: Arc<Inner>,
}

impl SyncController {
    /// Create the controller and begin waiting for identity. Must be called
    /// inside a Tokio runtime.
    pub fn start(
        config: SyncConfig,
        identity: Arc<dyn IdentitySource>,
        gateway: Arc<dyn RemoteDataGateway>,
    ) -> Self {
        let (state, _) = watch::channel(SyncState::Init);
        let (closed, _) = watch::channel(false);
        let inner = Arc::new(Inner {
            session_id: Uuid::new_v4(),
            config,
            identity,
            gateway,
            state,
            closed,
            snapshot: RwLock::new(Arc::new(DataStore::default())),
            latch: AtomicBool::new(false),
            cycle: Mutex::new(CycleSlot::default()),
        });

        inner.state.send_replace(SyncState::AwaitingIdentity);
        info!(
            session = %inner.session_id,
            timeout_ms = inner.config.identity_timeout.as_millis() as u64,
            fallback = ?inner.config.fallback,
            "Awaiting host identity"
        );

        let task = Arc::clone(&inner);
        let bootstrap = tokio::spawn(async move {
            tokio::select! {
                credential = task.identity.arrived() => {
                    task.on_identity(credential);
                }
                _ = sleep(task.config.identity_timeout) => {
                    task.on_identity_timeout();
                }
            }
        });
        inner.slot().bootstrap = Some(bootstrap);

        Self { inner }
    }

    /// Current bootstrap state.
    pub fn state(&self) -> SyncState {
        self.inner.state.borrow().clone()
    }

    /// Whether the loading screen should be shown.
    pub fn is_loading(&self) -> bool {
        self.inner.state.borrow().is_loading()
    }

    /// The latest complete snapshot (empty until the first success).
    pub fn snapshot(&self) -> Arc<DataStore> {
        Arc::clone(&self.inner.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.inner.state.subscribe()
    }

    /// Wait until the current cycle reaches a terminal state.
    ///
    /// If the controller is shut down first this returns at once with the
    /// state as it stood, which may still be a loading state.
    pub async fn wait_settled(&self) -> SyncState {
        let mut state = self.inner.state.subscribe();
        let mut closed = self.inner.closed.subscribe();
        tokio::select! {
            settled = async { state.wait_for(|s| s.is_terminal()).await.map(|s| (*s).clone()) } => {
                if let Ok(s) = settled {
                    return s;
                }
            }
            _ = closed.wait_for(|c| *c) => {}
        }
        self.state()
    }

    /// Start a new fetch cycle immediately, bypassing the identity wait and
    /// superseding any cycle in flight. Returns the new cycle token.
    ///
    /// Under the `Decline` policy a refresh without a credential is refused
    /// with `IdentityUnavailable` and leaves the state untouched.
    pub fn refresh(&self) -> Result<u64, DeskError> {
        let credential = self.inner.identity.current();
        if credential.is_none() && self.inner.config.fallback == IdentityFallback::Decline {
            warn!(session = %self.inner.session_id, "Refresh refused: no host identity");
            return Err(DeskError::IdentityUnavailable);
        }

        // A manual refresh wins over any bootstrap trigger still pending.
        let mut slot = self.inner.slot();
        self.inner.latch.store(true, Ordering::Release);
        if let Some(bootstrap) = slot.bootstrap.take() {
            bootstrap.abort();
        }
        Ok(self.inner.begin_cycle(&mut slot, credential))
    }

    /// Cancel timers and in-flight reads. Results still in flight are
    /// discarded. Idempotent.
    pub fn shutdown(&self) {
        let mut slot = self.inner.slot();
        self.inner.latch.store(true, Ordering::Release);
        slot.token += 1;
        self.inner.closed.send_replace(true);
        let bootstrap = slot.bootstrap.take();
        let fetch = slot.fetch.take();
        if bootstrap.is_none() && fetch.is_none() {
            return;
        }
        if let Some(h) = bootstrap {
            h.abort();
        }
        if let Some(h) = fetch {
            h.abort();
        }
        info!(session = %self.inner.session_id, "Sync controller shut down");
    }
}

impl Drop for SyncController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MockRemoteDataGateway;
    use crate::identity::HostIdentity;
    use crate::types::{Balance, Statistics};
    use rust_decimal_macros::dec;

    fn quick_config() -> SyncConfig {
        SyncConfig {
            identity_timeout: Duration::from_secs(60),
            min_dwell: Duration::ZERO,
            ..SyncConfig::default()
        }
    }

    fn gateway_expecting(cycles: usize) -> MockRemoteDataGateway {
        let mut gw = MockRemoteDataGateway::new();
        gw.expect_get_balance().times(cycles).returning(|_| {
            Ok(Balance {
                total: dec!(42),
                ..Balance::default()
            })
        });
        gw.expect_get_statistics()
            .times(cycles)
            .returning(|_| Ok(Statistics::default()));
        gw.expect_get_transactions()
            .times(cycles)
            .returning(|_, _| Ok(Vec::new()));
        gw
    }

    fn credential() -> Credential {
        Credential::new("hash=test").unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_latch_identity_then_timeout() {
        let ctl = SyncController::start(
            quick_config(),
            Arc::new(HostIdentity::pending()),
            Arc::new(gateway_expecting(1)),
        );
        assert!(ctl.inner.on_identity(credential()));
        assert!(!ctl.inner.on_identity_timeout());
        assert_eq!(ctl.wait_settled().await, SyncState::Ready);
        assert_eq!(ctl.snapshot().balance.total, dec!(42));
    }

    #[tokio::test(start_paused = true)]
    async fn test_latch_timeout_then_identity() {
        let ctl = SyncController::start(
            SyncConfig {
                fallback: IdentityFallback::ProceedAnonymous,
                ..quick_config()
            },
            Arc::new(HostIdentity::pending()),
            Arc::new(gateway_expecting(1)),
        );
        assert!(ctl.inner.on_identity_timeout());
        assert!(!ctl.inner.on_identity(credential()));
        assert_eq!(ctl.wait_settled().await, SyncState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_decline_policy_never_fetches() {
        // No expectations: any gateway call panics the fetch task.
        let ctl = SyncController::start(
            quick_config(),
            Arc::new(HostIdentity::pending()),
            Arc::new(MockRemoteDataGateway::new()),
        );
        assert_eq!(ctl.state(), SyncState::AwaitingIdentity);
        assert_eq!(ctl.wait_settled().await, SyncState::TimedOutNoIdentity);
        assert!(!ctl.is_loading());
        assert!(ctl.snapshot().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_commit_is_noop() {
        let ctl = SyncController::start(
            quick_config(),
            Arc::new(HostIdentity::pending()),
            Arc::new(MockRemoteDataGateway::new()),
        );
        ctl.inner.slot().token = 3;

        let store = DataStore {
            balance: Balance {
                total: dec!(999),
                ..Balance::default()
            },
            ..DataStore::default()
        };
        assert!(!ctl.inner.commit(2, Ok(store)));
        assert!(ctl.snapshot().is_empty());
        assert_eq!(ctl.state(), SyncState::AwaitingIdentity);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_refused_without_identity() {
        let ctl = SyncController::start(
            quick_config(),
            Arc::new(HostIdentity::pending()),
            Arc::new(MockRemoteDataGateway::new()),
        );
        assert_eq!(ctl.refresh(), Err(DeskError::IdentityUnavailable));
        assert_eq!(ctl.state(), SyncState::AwaitingIdentity);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_carries_endpoint() {
        let mut gw = MockRemoteDataGateway::new();
        gw.expect_get_balance().returning(|_| Ok(Balance::default()));
        gw.expect_get_statistics()
            .returning(|_| Err(anyhow::anyhow!("Statistics failed 403 Forbidden")));
        gw.expect_get_transactions().returning(|_, _| Ok(Vec::new()));

        let ctl = SyncController::start(
            quick_config(),
            Arc::new(HostIdentity::ready(credential())),
            Arc::new(gw),
        );
        match ctl.wait_settled().await {
            SyncState::Failed(DeskError::RemoteCallFailure { endpoint, message }) => {
                assert_eq!(endpoint, Endpoint::Statistics);
                assert!(message.contains("403"));
            }
            other => panic!("unexpected state: {other}"),
        }
        assert!(ctl.snapshot().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_identity_wait() {
        let identity = Arc::new(HostIdentity::pending());
        let ctl = SyncController::start(
            quick_config(),
            identity.clone(),
            Arc::new(MockRemoteDataGateway::new()),
        );
        ctl.shutdown();
        identity.publish(credential());
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(ctl.state(), SyncState::AwaitingIdentity);
        assert!(ctl.snapshot().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_identity_after_refresh_ignored() {
        let ctl = SyncController::start(
            quick_config(),
            Arc::new(HostIdentity::ready(credential())),
            Arc::new(gateway_expecting(1)),
        );
        // The bootstrap task has not been polled yet; refresh claims first.
        let token = ctl.refresh().unwrap();
        assert!(!ctl.inner.on_identity(credential()));
        assert!(!ctl.inner.on_identity_timeout());
        assert_eq!(ctl.inner.slot().token, token);
        assert_eq!(ctl.wait_settled().await, SyncState::Ready);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_refresh_token_current_when_racing_bootstrap() {
        for _ in 0..50 {
            let mut gw = MockRemoteDataGateway::new();
            gw.expect_get_balance().returning(|_| Ok(Balance::default()));
            gw.expect_get_statistics().returning(|_| Ok(Statistics::default()));
            gw.expect_get_transactions().returning(|_, _| Ok(Vec::new()));

            let ctl = SyncController::start(
                quick_config(),
                Arc::new(HostIdentity::ready(credential())),
                Arc::new(gw),
            );
            let token = ctl.refresh().unwrap();
            assert_eq!(ctl.wait_settled().await, SyncState::Ready);
            assert_eq!(ctl.inner.slot().token, token);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_settled_returns_after_shutdown() {
        let ctl = SyncController::start(
            quick_config(),
            Arc::new(HostIdentity::pending()),
            Arc::new(MockRemoteDataGateway::new()),
        );
        ctl.shutdown();
        let state = tokio::time::timeout(Duration::from_secs(1), ctl.wait_settled()).await;
        assert_eq!(state, Ok(SyncState::AwaitingIdentity));
    }
}
