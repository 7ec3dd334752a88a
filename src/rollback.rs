//! The rollback controller: idempotently drives a service back to its
//! last-known-good version.
//!
//! Invoked both over the webhook (external alert delivery) and directly
//! (CLI, flow orchestrator). Idempotency keys on `alert_id`: the external
//! alert source delivers at least once, and a redelivered alert must not
//! trigger a second restart. Failures are reported, never retried here —
//! retry policy belongs to the caller, bounded by the same cache.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, TryLockError};
use std::time::{Duration, Instant};

use jiff::Timestamp;
use uuid::Uuid;

use crate::deploy::Executor;
use crate::model::{
    InitiatedBy, Outcome, RollbackRequest, RollbackResult, RollbackStatus, ServiceSpec,
};

/// One idempotency-cache slot.
///
/// The slot is created before execution starts, so a concurrent duplicate
/// blocks on the slot mutex and then reads the first execution's result
/// instead of starting its own deploy.
struct CacheSlot {
    inserted_at: Instant,
    result: Arc<Mutex<Option<RollbackResult>>>,
}

/// Idempotent rollback driver.
pub struct Controller {
    executor: Arc<Executor>,
    cache_ttl: Duration,
    slots: Mutex<HashMap<String, CacheSlot>>,
    last: Mutex<Option<RollbackResult>>,
    total: AtomicU64,
}

impl Controller {
    pub fn new(executor: Arc<Executor>, cache_ttl: Duration) -> Self {
        Self {
            executor,
            cache_ttl,
            slots: Mutex::new(HashMap::new()),
            last: Mutex::new(None),
            total: AtomicU64::new(0),
        }
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// The most recent rollback result, if any.
    pub fn last(&self) -> Option<RollbackResult> {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Rollbacks executed (idempotent replays not counted).
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }

    /// Rolls the requested service back, or returns the cached result for
    /// an `alert_id` that already ran.
    pub fn rollback(&self, request: &RollbackRequest) -> RollbackResult {
        let slot = self.slot_for(&request.alert_id);
        let mut cell = slot.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(cached) = cell.as_ref() {
            tracing::info!(
                alert_id = request.alert_id,
                service = request.service,
                "duplicate alert, returning cached result"
            );
            return cached.clone();
        }

        let result = self.execute(request);
        *cell = Some(result.clone());

        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(result.clone());
        self.total.fetch_add(1, Ordering::SeqCst);
        result
    }

    /// Resolves the rollback target for a request: the explicit version, or
    /// the service's configured last-known-good.
    pub fn resolve_target(&self, request: &RollbackRequest) -> Option<String> {
        match &request.target_version {
            Some(v) => Some(v.clone()),
            None => self
                .executor
                .service(&request.service)
                .map(|s| s.healthy_version.clone()),
        }
    }

    /// Looks up a configured service by name.
    pub fn service(&self, name: &str) -> Option<&ServiceSpec> {
        self.executor.service(name)
    }

    fn execute(&self, request: &RollbackRequest) -> RollbackResult {
        let started_at = Timestamp::now();
        // The uuid fragment keeps ids unique when two executions for the
        // same service land within one second.
        let rollback_id = format!(
            "rb-{}-{}-{}",
            started_at.strftime("%Y%m%d-%H%M%S"),
            request.service,
            &Uuid::new_v4().to_string()[..8]
        );

        tracing::info!(
            rollback_id,
            service = request.service,
            alert_id = request.alert_id,
            reason = request.reason,
            "starting rollback"
        );

        let Some(target) = self.resolve_target(request) else {
            return RollbackResult {
                status: RollbackStatus::Failed,
                service: request.service.clone(),
                previous_version: None,
                new_version: request.target_version.clone().unwrap_or_default(),
                rollback_id,
                started_at,
                completed_at: Some(Timestamp::now()),
                error: Some(format!("unknown service: {}", request.service)),
            };
        };

        match self
            .executor
            .deploy(&request.service, &target, InitiatedBy::AutoRollback)
        {
            Ok(event) => {
                let (status, error) = match event.outcome {
                    Outcome::Success => (RollbackStatus::Completed, None),
                    Outcome::Failed { reason } => (RollbackStatus::Failed, Some(reason)),
                };
                RollbackResult {
                    status,
                    service: request.service.clone(),
                    previous_version: event.from_version,
                    new_version: target,
                    rollback_id,
                    started_at,
                    completed_at: Some(Timestamp::now()),
                    error,
                }
            }
            Err(e) => RollbackResult {
                status: RollbackStatus::Failed,
                service: request.service.clone(),
                previous_version: None,
                new_version: target,
                rollback_id,
                started_at,
                completed_at: Some(Timestamp::now()),
                error: Some(e.to_string()),
            },
        }
    }

    /// Gets or creates the cache slot for an alert id, pruning completed
    /// entries past their TTL. In-flight slots are never pruned.
    fn slot_for(&self, alert_id: &str) -> Arc<Mutex<Option<RollbackResult>>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);

        let ttl = self.cache_ttl;
        slots.retain(|_, slot| {
            // try_lock: a contended slot is an in-flight execution, which
            // must not stall pruning (or the caller) and is kept.
            let completed = match slot.result.try_lock() {
                Ok(result) => result.is_some(),
                Err(TryLockError::Poisoned(e)) => e.into_inner().is_some(),
                Err(TryLockError::WouldBlock) => false,
            };
            !(completed && slot.inserted_at.elapsed() > ttl)
        });

        slots
            .entry(alert_id.to_string())
            .or_insert_with(|| CacheSlot {
                inserted_at: Instant::now(),
                result: Arc::new(Mutex::new(None)),
            })
            .result
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::mpsc;
    use std::thread;

    use tempfile::TempDir;

    use crate::deploy::DeploySettings;
    use crate::store::VersionStore;
    use crate::testutil::{FakeProbe, FakeRuntime, fast_settings, order_service};

    fn controller_with(
        runtime: FakeRuntime,
        probe: FakeProbe,
        settings: DeploySettings,
        ttl: Duration,
    ) -> (TempDir, Arc<Controller>) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(VersionStore::new(dir.path().join("state")).unwrap());
        let executor = Arc::new(Executor::new(
            vec![order_service()],
            store,
            Box::new(runtime),
            Box::new(probe),
            settings,
        ));
        (dir, Arc::new(Controller::new(executor, ttl)))
    }

    fn controller() -> (TempDir, Arc<Controller>) {
        controller_with(
            FakeRuntime::default(),
            FakeProbe::healthy(),
            fast_settings(),
            Duration::from_secs(3600),
        )
    }

    fn request(alert_id: &str) -> RollbackRequest {
        RollbackRequest {
            service: "order-service".into(),
            target_version: None,
            alert_id: alert_id.to_string(),
            reason: "mean latency above threshold".into(),
            triggered_at: Some(Timestamp::now()),
        }
    }

    #[test]
    fn rollback_targets_configured_healthy_version() {
        let (_dir, controller) = controller();

        let result = controller.rollback(&request("alert-1"));

        assert_eq!(result.status, RollbackStatus::Completed);
        assert_eq!(result.new_version, "v1.0");
        let record = controller
            .executor()
            .store()
            .get("order-service")
            .unwrap()
            .unwrap();
        assert_eq!(record.version, "v1.0");
    }

    #[test]
    fn explicit_target_version_wins() {
        let (_dir, controller) = controller();

        let mut req = request("alert-2");
        req.target_version = Some("v1.1-bad".into());
        let result = controller.rollback(&req);

        assert_eq!(result.new_version, "v1.1-bad");
    }

    #[test]
    fn repeated_alert_id_returns_cached_result_without_redeploying() {
        let (_dir, controller) = controller();

        let first = controller.rollback(&request("alert-3"));
        let second = controller.rollback(&request("alert-3"));

        assert_eq!(first.rollback_id, second.rollback_id);
        assert_eq!(controller.total(), 1);
        // Exactly one event in the audit trail.
        let events = controller
            .executor()
            .store()
            .load_events("order-service")
            .unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn concurrent_duplicates_share_one_execution() {
        let (_dir, controller) = controller();

        let results: Vec<RollbackResult> = thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let controller = Arc::clone(&controller);
                    s.spawn(move || controller.rollback(&request("alert-4")))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(results.iter().all(|r| r.rollback_id == results[0].rollback_id));
        assert_eq!(controller.total(), 1);
        let events = controller
            .executor()
            .store()
            .load_events("order-service")
            .unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn rollback_ids_are_unique_within_a_second() {
        let (_dir, controller) = controller();

        let first = controller.rollback(&request("alert-id-a"));
        let second = controller.rollback(&request("alert-id-b"));

        // Both executions land in the same wall-clock second, so the
        // timestamp-and-service prefix alone would collide.
        assert!(first.rollback_id.starts_with("rb-"));
        assert_ne!(first.rollback_id, second.rollback_id);
    }

    #[test]
    fn in_flight_execution_does_not_block_unrelated_alerts() {
        let (parked_tx, parked_rx) = mpsc::channel::<()>();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let parked_tx = Mutex::new(parked_tx);
        let release_rx = Mutex::new(release_rx);
        // Restarts onto v1.0 announce themselves and park until released;
        // other versions pass straight through.
        let runtime = FakeRuntime {
            on_restart: Some(Box::new(move |_, version| {
                if version == "v1.0" {
                    parked_tx.lock().unwrap().send(()).unwrap();
                    release_rx.lock().unwrap().recv().unwrap();
                }
            })),
            ..FakeRuntime::default()
        };
        let (_dir, controller) = controller_with(
            runtime,
            FakeProbe::healthy(),
            fast_settings(),
            Duration::from_secs(3600),
        );

        thread::scope(|s| {
            let slow = {
                let controller = Arc::clone(&controller);
                s.spawn(move || controller.rollback(&request("alert-slow")))
            };

            // Wait until the slow execution is parked inside the runtime.
            parked_rx.recv().unwrap();

            // A fresh alert must start and finish while the first execution
            // is still holding its cache slot.
            let mut req = request("alert-fast");
            req.target_version = Some("v1.1-bad".into());
            let fast = controller.rollback(&req);
            assert_eq!(fast.status, RollbackStatus::Completed);

            release_tx.send(()).unwrap();
            let slow = slow.join().unwrap();
            assert_eq!(slow.status, RollbackStatus::Completed);
        });

        assert_eq!(controller.total(), 2);
    }

    #[test]
    fn expired_cache_entry_allows_reexecution() {
        let (_dir, controller) = controller_with(
            FakeRuntime::default(),
            FakeProbe::healthy(),
            fast_settings(),
            Duration::ZERO,
        );

        controller.rollback(&request("alert-5"));
        controller.rollback(&request("alert-5"));

        assert_eq!(controller.total(), 2);
    }

    #[test]
    fn unknown_service_reports_failed() {
        let (_dir, controller) = controller();

        let mut req = request("alert-6");
        req.service = "ghost-service".into();
        let result = controller.rollback(&req);

        assert_eq!(result.status, RollbackStatus::Failed);
        assert!(result.error.as_deref().unwrap().contains("unknown service"));
    }

    #[test]
    fn failed_deploy_maps_to_failed_status_without_retry() {
        let (_dir, controller) = controller_with(
            FakeRuntime::default(),
            FakeProbe::unhealthy(),
            fast_settings(),
            Duration::from_secs(3600),
        );

        let result = controller.rollback(&request("alert-7"));

        assert_eq!(result.status, RollbackStatus::Failed);
        assert!(result.error.is_some());
        // One attempt only: no internal retry of the rollback itself.
        let events = controller
            .executor()
            .store()
            .load_events("order-service")
            .unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn last_and_total_track_executions() {
        let (_dir, controller) = controller();
        assert!(controller.last().is_none());

        controller.rollback(&request("alert-8"));
        controller.rollback(&request("alert-9"));

        assert_eq!(controller.total(), 2);
        assert!(controller.last().is_some());
    }
}
