//! Per-condition polling loops and the worker registry
//!
//! Every live PodCondition owns exactly one [`Worker`]: a spawned task that
//! ticks on the declared interval, evaluates the probe, and syncs the
//! verdict into matching pods. The [`WorkerRegistry`] maps declaration
//! identities to workers and is the single place where loops are started,
//! restarted and torn down.
//!
//! Lifecycle is `Created -> Running -> Stopped`, with `Stopped` terminal.
//! Reconfiguration never mutates a running loop: when any spec field
//! changes (selector, source, interval alike) the old worker is stopped and
//! a fresh one starts in its place.
//!
//! Cancellation is designed so no stop request can ever block or deadlock:
//! the loop itself exits by breaking, external stops go through a oneshot
//! sender that is taken out of a mutex exactly once, and repeated or
//! concurrent `stop()` calls find the sender gone and return immediately.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::conditions::{sync_condition, PodClient};
use crate::crd::{LabelSelector, PodConditionSpec};
use crate::probe::{resolve_probe, Probe};
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::Error;

/// Monotonic worker id source, used to guard registry eviction
static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

/// A single polling loop maintaining one condition type
pub struct Worker {
    id: u64,
    condition_type: String,
    stopped: Arc<AtomicBool>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

impl Worker {
    /// Construct a worker and start its polling loop
    ///
    /// Returns the worker together with the loop's join handle; the loop is
    /// already running when this returns. Construction fails (and no loop
    /// starts) when the interval is not positive.
    pub fn spawn(
        condition_type: &str,
        selector: LabelSelector,
        probe: Arc<dyn Probe>,
        interval: Duration,
        pods: Arc<dyn PodClient>,
        retry: RetryConfig,
    ) -> Result<(Arc<Worker>, JoinHandle<()>), Error> {
        if interval.is_zero() {
            return Err(Error::validation(
                "interval must be a positive number of milliseconds",
            ));
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let stopped = Arc::new(AtomicBool::new(false));

        let worker = Arc::new(Worker {
            id: NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed),
            condition_type: condition_type.to_string(),
            stopped: stopped.clone(),
            shutdown: Mutex::new(Some(shutdown_tx)),
        });

        let condition = condition_type.to_string();
        let handle = tokio::spawn(run_loop(
            condition, selector, probe, interval, pods, retry, stopped, shutdown_rx,
        ));

        Ok((worker, handle))
    }

    /// Unique id of this worker instance
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Condition type this worker maintains
    pub fn condition_type(&self) -> &str {
        &self.condition_type
    }

    /// Whether the polling loop has terminated
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Request loop termination
    ///
    /// Idempotent and non-blocking: the first call hands the oneshot sender
    /// to the loop, later calls (or calls racing the loop's own exit) find
    /// nothing to do.
    pub fn stop(&self) {
        let sender = self.shutdown.lock().ok().and_then(|mut guard| guard.take());
        if let Some(tx) = sender {
            // The loop may already have exited on its own; that's fine
            let _ = tx.send(());
        }
    }
}

/// The polling loop body
///
/// Each tick evaluates the probe (with bounded retries) and syncs the
/// verdict. Sync failures are logged and the loop continues; evaluation
/// failures that survive the retries terminate the loop.
#[allow(clippy::too_many_arguments)]
async fn run_loop(
    condition_type: String,
    selector: LabelSelector,
    probe: Arc<dyn Probe>,
    interval: Duration,
    pods: Arc<dyn PodClient>,
    retry: RetryConfig,
    stopped: Arc<AtomicBool>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    // A slow pass delays the next tick instead of bursting to catch up;
    // ticks never overlap a pass that is still in flight.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        condition = %condition_type,
        interval_ms = interval.as_millis(),
        "worker started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let verdict = match retry_with_backoff(&retry, "evaluate probe", || {
                    let probe = probe.clone();
                    async move { probe.evaluate().await }
                })
                .await
                {
                    Ok(verdict) => verdict,
                    Err(e) => {
                        error!(
                            condition = %condition_type,
                            error = %e,
                            "signal evaluation failed, stopping worker"
                        );
                        break;
                    }
                };

                if let Err(e) = sync_condition(pods.as_ref(), &condition_type, &selector, verdict).await {
                    warn!(
                        condition = %condition_type,
                        error = %e,
                        "condition sync failed, skipping this pass"
                    );
                }
            }
            _ = &mut shutdown_rx => {
                info!(condition = %condition_type, "stop requested");
                break;
            }
        }
    }

    stopped.store(true, Ordering::SeqCst);
    info!(condition = %condition_type, "worker stopped");
}

/// Outcome of routing one declaration event into the registry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    /// No worker existed for this identity; one was started
    Started,
    /// Spec unchanged and the worker is still running; nothing to do
    Unchanged,
    /// Spec changed (or the old worker had died); the worker was replaced
    Restarted,
}

struct WorkerEntry {
    spec: PodConditionSpec,
    worker: Arc<Worker>,
}

/// Keyed collection of active workers, one per declaration identity
///
/// The registry is the only owner of workers. Declaration events are
/// delivered to it serially by the controller; the workers themselves all
/// run concurrently.
pub struct WorkerRegistry {
    workers: Arc<DashMap<String, WorkerEntry>>,
    retry: RetryConfig,
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerRegistry {
    /// Create an empty registry with the default evaluation retry policy
    pub fn new() -> Self {
        Self::with_retry(RetryConfig::evaluation())
    }

    /// Create an empty registry with a custom evaluation retry policy
    pub fn with_retry(retry: RetryConfig) -> Self {
        Self {
            workers: Arc::new(DashMap::new()),
            retry,
        }
    }

    /// Route one observed declaration into the registry
    ///
    /// Starts a worker on first observation, leaves a running worker alone
    /// when the spec is unchanged, and otherwise replaces it (stop old,
    /// start new) so that every spec field - interval included - can be
    /// reconfigured the same way. A probe resolution failure stops and
    /// evicts any existing worker and surfaces the error; the declaration
    /// stays inert until it is observed again.
    pub fn apply(
        &self,
        namespace: &str,
        name: &str,
        spec: &PodConditionSpec,
        pods: Arc<dyn PodClient>,
    ) -> Result<Applied, Error> {
        let key = registry_key(namespace, name);

        if let Some(entry) = self.workers.get(&key) {
            if entry.spec == *spec && !entry.worker.is_stopped() {
                return Ok(Applied::Unchanged);
            }
        }

        // Resolved once per worker construction; the loop never re-inspects
        // the spec to pick a source.
        let probe = match resolve_probe(spec) {
            Ok(probe) => probe,
            Err(e) => {
                if let Some((_, old)) = self.workers.remove(&key) {
                    warn!(
                        condition = %name,
                        "stopping worker whose declaration lost its signal source"
                    );
                    old.worker.stop();
                }
                return Err(e);
            }
        };

        self.start(key, name, spec, probe, pods)
    }

    /// Stop any existing worker under `key` and start a fresh one
    fn start(
        &self,
        key: String,
        name: &str,
        spec: &PodConditionSpec,
        probe: Arc<dyn Probe>,
        pods: Arc<dyn PodClient>,
    ) -> Result<Applied, Error> {
        let replaced = match self.workers.remove(&key) {
            Some((_, old)) => {
                old.worker.stop();
                true
            }
            None => false,
        };

        let (worker, handle) = Worker::spawn(
            name,
            spec.label_selector.clone(),
            probe,
            spec.interval(),
            pods,
            self.retry.clone(),
        )?;
        let id = worker.id();

        self.workers.insert(
            key.clone(),
            WorkerEntry {
                spec: spec.clone(),
                worker,
            },
        );

        // Evict the entry when the loop ends on its own (probe gave up).
        // The id guard keeps a later replacement under the same key alive.
        let workers = Arc::clone(&self.workers);
        tokio::spawn(async move {
            let _ = handle.await;
            workers.remove_if(&key, |_, entry| entry.worker.id() == id);
        });

        Ok(if replaced {
            Applied::Restarted
        } else {
            Applied::Started
        })
    }

    /// Tear down the worker for a deleted declaration
    ///
    /// Returns whether a worker existed for the identity.
    pub fn remove(&self, namespace: &str, name: &str) -> bool {
        match self.workers.remove(&registry_key(namespace, name)) {
            Some((_, entry)) => {
                entry.worker.stop();
                true
            }
            None => false,
        }
    }

    /// Whether a live (not yet stopped) worker exists for the identity
    pub fn is_running(&self, namespace: &str, name: &str) -> bool {
        self.workers
            .get(&registry_key(namespace, name))
            .map(|entry| !entry.worker.is_stopped())
            .unwrap_or(false)
    }

    /// Number of registered workers, stopped-but-not-yet-evicted included
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Whether the registry holds no workers at all
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

fn registry_key(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace, name)
}
