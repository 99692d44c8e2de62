//! Monitor: owns the hunter pool and the task tree.
//!
//! Task layout while running:
//! - one loop per hunter: check, hand fresh listings to the dispatcher,
//!   sleep for the adaptive interval plus jitter
//! - one dispatcher: receives listing batches over a bounded channel and
//!   runs each batch through the coordinator on its own task
//! - two maintenance loops: processed-set cleanup with a throughput log,
//!   and a degradation watchdog that restarts the hunter loops
//!
//! `stop()` aborts everything and waits for it. A purchase cut off by
//! `stop()` has an unknown outcome; balances are the source of truth.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::engine::coordinator::PurchaseCoordinator;
use crate::engine::hunter::{CheckOutcome, Hunter};
use crate::engine::interval::{AdaptiveInterval, IntervalConfig};
use crate::engine::stats::{DegradationConfig, StatsTracker};
use crate::notify::{messages, NotificationChannel};
use crate::types::{Listing, MonitorStats, SniperError};

/// Capacity of the hunter → dispatcher channel, in batches.
pub const DISPATCH_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub interval: IntervalConfig,
    /// Upper bound (exclusive) of the random delay added to each sleep.
    pub random_delay_max: Duration,
    /// Hunters start within `[0, start_jitter × hunters)`.
    pub start_jitter: Duration,
    /// Combined buyer balance required by `initialize`.
    pub min_balance: u64,
    pub cleanup_interval: Duration,
    pub max_processed: usize,
    pub degradation_check_interval: Duration,
    pub degradation: DegradationConfig,
    /// Pause between stopping and restarting hunters after degradation.
    pub restart_cooldown: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: IntervalConfig::default(),
            random_delay_max: Duration::from_millis(200),
            start_jitter: Duration::from_secs(2),
            min_balance: 0,
            cleanup_interval: Duration::from_secs(60),
            max_processed: 1000,
            degradation_check_interval: Duration::from_secs(300),
            degradation: DegradationConfig::default(),
            restart_cooldown: Duration::from_secs(10),
        }
    }
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Tasks {
    hunters: JoinSet<()>,
    dispatch_tx: Option<mpsc::Sender<Vec<Listing>>>,
    dispatcher: Option<JoinHandle<()>>,
    maintenance: Vec<JoinHandle<()>>,
}

struct Inner {
    hunters: Vec<Arc<Hunter>>,
    coordinator: Arc<PurchaseCoordinator>,
    notifier: Arc<dyn NotificationChannel>,
    stats: StatsTracker,
    config: MonitorConfig,
    running: AtomicBool,
    tasks: Mutex<Tasks>,
}

/// Cheap to clone; all clones drive the same task tree.
#[derive(Clone)]
pub struct Monitor {
    inner: Arc<Inner>,
}

impl Monitor {
    pub fn new(
        hunters: Vec<Arc<Hunter>>,
        coordinator: Arc<PurchaseCoordinator>,
        notifier: Arc<dyn NotificationChannel>,
        config: MonitorConfig,
    ) -> Self {
        let stats = StatsTracker::new(config.degradation.clone());
        Self {
            inner: Arc::new(Inner {
                hunters,
                coordinator,
                notifier,
                stats,
                config,
                running: AtomicBool::new(false),
                tasks: Mutex::new(Tasks::default()),
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Distinct session names across hunters and buyers.
    pub fn unique_accounts(&self) -> usize {
        let mut names: HashSet<&str> = HashSet::new();
        for hunter in &self.inner.hunters {
            names.insert(hunter.session().name());
        }
        for buyer in self.inner.coordinator.buyers() {
            names.insert(buyer.session().name());
        }
        names.len()
    }

    /// Fetch every buyer's starting balance and check the combined total
    /// against `min_balance`.
    pub async fn initialize(&self) -> Result<u64, SniperError> {
        let inner = &self.inner;
        for buyer in inner.coordinator.buyers() {
            if let Err(e) = buyer.initialize().await {
                warn!(buyer_id = buyer.id(), error = %e, "Could not load buyer balance");
            }
        }

        let total = inner.coordinator.total_balance();
        info!(
            accounts = self.unique_accounts(),
            hunters = inner.hunters.len(),
            buyers = inner.coordinator.buyers().len(),
            total_balance = total,
            "Monitor initialised"
        );

        if total < inner.config.min_balance {
            error!(
                total_balance = total,
                min_balance = inner.config.min_balance,
                "Combined balance below minimum"
            );
            inner
                .notifier
                .enqueue(messages::low_balance(total, inner.config.min_balance), true);
            return Err(SniperError::InsufficientBalance {
                needed: inner.config.min_balance,
                available: total,
            });
        }
        Ok(total)
    }

    /// Spawn the task tree. Calling it while running does nothing.
    pub async fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            debug!("Monitor already running");
            return;
        }
        let inner = self.inner.clone();

        let (tx, rx) = mpsc::channel(DISPATCH_CAPACITY);
        {
            let mut tasks = inner.tasks.lock().await;
            tasks.dispatcher = Some(tokio::spawn(dispatch_loop(inner.coordinator.clone(), rx)));
            tasks.dispatch_tx = Some(tx.clone());
            spawn_hunters(&inner, &mut tasks.hunters, &tx);
            tasks.maintenance = vec![
                tokio::spawn(cleanup_loop(inner.clone())),
                tokio::spawn(degradation_loop(inner.clone())),
            ];
        }

        info!(hunters = inner.hunters.len(), "Monitor started");
        inner.notifier.enqueue(
            messages::startup(
                self.unique_accounts(),
                inner.hunters.len(),
                inner.coordinator.buyers().len(),
                inner.coordinator.total_balance(),
            ),
            true,
        );
    }

    /// Abort and await every task. Calling it while stopped does nothing.
    pub async fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }

        let mut tasks = {
            let mut guard = self.inner.tasks.lock().await;
            std::mem::take(&mut *guard)
        };

        for handle in tasks.maintenance.drain(..) {
            handle.abort();
            let _ = handle.await;
        }
        tasks.hunters.shutdown().await;
        tasks.dispatch_tx.take();
        if let Some(dispatcher) = tasks.dispatcher.take() {
            dispatcher.abort();
            let _ = dispatcher.await;
        }

        info!(
            total_checks = self.inner.stats.total_checks(),
            "Monitor stopped"
        );
    }

    pub async fn stats(&self) -> MonitorStats {
        let inner = &self.inner;
        let mut hunters = Vec::with_capacity(inner.hunters.len());
        for hunter in &inner.hunters {
            hunters.push(hunter.stats().await);
        }
        MonitorStats {
            running: self.is_running(),
            processed_listings: inner.coordinator.processed_count().await,
            total_balance: inner.coordinator.total_balance(),
            total_checks: inner.stats.total_checks(),
            hunters,
        }
    }
}

// ---------------------------------------------------------------------------
// Task bodies
// ---------------------------------------------------------------------------

fn spawn_hunters(inner: &Arc<Inner>, set: &mut JoinSet<()>, tx: &mpsc::Sender<Vec<Listing>>) {
    let spread = inner
        .config
        .start_jitter
        .saturating_mul(u32::try_from(inner.hunters.len()).unwrap_or(u32::MAX));
    for hunter in &inner.hunters {
        let delay = random_below(spread);
        set.spawn(hunter_loop(inner.clone(), hunter.clone(), tx.clone(), delay));
    }
}

async fn hunter_loop(
    inner: Arc<Inner>,
    hunter: Arc<Hunter>,
    tx: mpsc::Sender<Vec<Listing>>,
    start_delay: Duration,
) {
    debug!(hunter_id = hunter.id(), delay_ms = start_delay.as_millis() as u64, "Hunter starting");
    tokio::time::sleep(start_delay).await;

    let mut interval = AdaptiveInterval::new(inner.config.interval.clone());
    loop {
        let started = Instant::now();
        let outcome = hunter.check().await;
        inner.stats.increment_checks();

        match outcome {
            CheckOutcome::Fresh(listings) => {
                interval.on_success(started.elapsed());
                if !listings.is_empty() && tx.send(listings).await.is_err() {
                    warn!(hunter_id = hunter.id(), "Dispatcher gone, hunter exiting");
                    return;
                }
            }
            CheckOutcome::RateLimited(_) => interval.on_rate_limited(),
            CheckOutcome::Failed(_) => interval.on_error(),
        }

        let jitter = random_below(inner.config.random_delay_max);
        tokio::time::sleep(interval.sleep_after(started.elapsed(), jitter)).await;
    }
}

/// Runs each batch on its own task so a slow purchase never stalls
/// discovery. Aborting this task aborts every in-flight batch.
async fn dispatch_loop(
    coordinator: Arc<PurchaseCoordinator>,
    mut rx: mpsc::Receiver<Vec<Listing>>,
) {
    let mut inflight = JoinSet::new();
    loop {
        tokio::select! {
            batch = rx.recv() => match batch {
                Some(listings) => {
                    let coordinator = coordinator.clone();
                    inflight.spawn(async move {
                        coordinator.process_batch(listings).await;
                    });
                }
                None => break,
            },
            Some(joined) = inflight.join_next(), if !inflight.is_empty() => {
                if let Err(e) = joined {
                    error!(error = %e, "Purchase task failed");
                }
            }
        }
    }
    while let Some(joined) = inflight.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "Purchase task failed");
        }
    }
}

async fn cleanup_loop(inner: Arc<Inner>) {
    let period = inner.config.cleanup_interval;
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    loop {
        ticker.tick().await;
        let processed = inner.coordinator.processed_count().await;
        inner.stats.log_performance(processed).await;
        inner.coordinator.cleanup(inner.config.max_processed).await;
    }
}

async fn degradation_loop(inner: Arc<Inner>) {
    let period = inner.config.degradation_check_interval;
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    loop {
        ticker.tick().await;
        if inner.stats.check_degradation().await {
            warn!(
                cooldown_secs = inner.config.restart_cooldown.as_secs(),
                "Throughput degraded, restarting hunters"
            );
            restart_hunters(&inner).await;
            // Next verdict a full period after the hunters are back.
            ticker.reset();
        }
    }
}

async fn restart_hunters(inner: &Arc<Inner>) {
    let mut old = {
        let mut tasks = inner.tasks.lock().await;
        std::mem::take(&mut tasks.hunters)
    };
    old.shutdown().await;

    tokio::time::sleep(inner.config.restart_cooldown).await;
    if !inner.running.load(Ordering::SeqCst) {
        return;
    }

    let mut tasks = inner.tasks.lock().await;
    let Some(tx) = tasks.dispatch_tx.clone() else {
        return;
    };
    spawn_hunters(inner, &mut tasks.hunters, &tx);
    info!(hunters = inner.hunters.len(), "Hunters restarted");
}

/// Uniform duration in `[0, max)`; zero when `max` is zero.
fn random_below(max: Duration) -> Duration {
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..max_ms))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::buyer::Buyer;
    use crate::engine::coordinator::CoordinatorConfig;
    use crate::platforms::AccountSession;
    use crate::types::{Criterion, ListingId, ListingSnapshot, SessionError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, AtomicU64};

    struct FakeSession {
        name: String,
        listings: Vec<ListingSnapshot>,
        balance: AtomicU64,
        purchases: AtomicU32,
    }

    impl FakeSession {
        fn new(name: &str, balance: u64, listings: Vec<ListingSnapshot>) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                listings,
                balance: AtomicU64::new(balance),
                purchases: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl AccountSession for FakeSession {
        async fn fetch_available_listings(&self) -> Result<Vec<ListingSnapshot>, SessionError> {
            Ok(self.listings.clone())
        }

        async fn fetch_balance(&self) -> Result<u64, SessionError> {
            Ok(self.balance.load(Ordering::SeqCst))
        }

        async fn execute_purchase(
            &self,
            _destination: &str,
            _listing_id: ListingId,
            _hide_identity: bool,
        ) -> Result<(), SessionError> {
            self.purchases.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    #[derive(Default)]
    struct Recorder {
        sent: std::sync::Mutex<Vec<(String, bool)>>,
    }

    impl NotificationChannel for Recorder {
        fn enqueue(&self, text: String, priority: bool) {
            self.sent.lock().unwrap().push((text, priority));
        }
    }

    fn limited(id: u64, price: u64, supply: u64) -> ListingSnapshot {
        ListingSnapshot {
            id: Some(id),
            price: Some(price),
            total_amount: Some(supply),
            available_amount: Some(supply),
            is_limited: Some(true),
            is_sold_out: Some(false),
            can_upgrade: Some(false),
        }
    }

    fn monitor(
        session: Arc<FakeSession>,
        recorder: Arc<Recorder>,
        config: MonitorConfig,
    ) -> Monitor {
        let buyer = Buyer::new(0, session.clone(), &["alice".into()], Duration::ZERO).unwrap();
        let coordinator = Arc::new(PurchaseCoordinator::new(
            vec![Arc::new(buyer)],
            CoordinatorConfig {
                criteria: vec![Criterion::new(1, 1000, 10, 50, 3).unwrap()],
                ..Default::default()
            },
            recorder.clone(),
        ));
        let hunter = Arc::new(Hunter::new(0, session));
        Monitor::new(vec![hunter], coordinator, recorder, config)
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_below_min_balance() {
        let recorder = Arc::new(Recorder::default());
        let session = FakeSession::new("acct", 10, Vec::new());
        let m = monitor(
            session,
            recorder.clone(),
            MonitorConfig {
                min_balance: 100,
                ..Default::default()
            },
        );

        let err = m.initialize().await.unwrap_err();
        assert!(matches!(
            err,
            SniperError::InsufficientBalance { needed: 100, available: 10 }
        ));
        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_counts_unique_accounts() {
        let session = FakeSession::new("acct", 500, Vec::new());
        let m = monitor(session, Arc::new(Recorder::default()), MonitorConfig::default());
        assert_eq!(m.initialize().await.unwrap(), 500);
        // Hunter and buyer share one session.
        assert_eq!(m.unique_accounts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_and_stop_are_idempotent() {
        let recorder = Arc::new(Recorder::default());
        let session = FakeSession::new("acct", 500, Vec::new());
        let m = monitor(session, recorder.clone(), MonitorConfig::default());

        m.start().await;
        m.start().await;
        assert!(m.is_running());
        let startups = recorder
            .sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t.contains("Sniper started"))
            .count();
        assert_eq!(startups, 1);

        m.stop().await;
        m.stop().await;
        assert!(!m.is_running());

        // Restart after stop.
        m.start().await;
        assert!(m.is_running());
        m.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_discovered_listing_bought_once() {
        let recorder = Arc::new(Recorder::default());
        let session = FakeSession::new("acct", 100, vec![limited(1, 20, 500)]);
        let m = monitor(session.clone(), recorder, MonitorConfig::default());

        m.initialize().await.unwrap();
        m.start().await;
        tokio::time::sleep(Duration::from_secs(30)).await;
        m.stop().await;

        assert_eq!(session.purchases.load(Ordering::SeqCst), 3);
        let stats = m.stats().await;
        assert!(!stats.running);
        assert_eq!(stats.processed_listings, 1);
        assert!(stats.total_checks > 1);
        assert_eq!(stats.hunters.len(), 1);
        assert_eq!(stats.hunters[0].known_listings, 1);
    }

    #[test]
    fn test_random_below_bounds() {
        assert_eq!(random_below(Duration::ZERO), Duration::ZERO);
        for _ in 0..100 {
            assert!(random_below(Duration::from_millis(50)) < Duration::from_millis(50));
        }
    }
}
