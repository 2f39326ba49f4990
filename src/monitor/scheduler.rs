//! Owns one recurring timer per monitored website and drives the check
//! pipeline from it.

use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;
use tokio::sync::{oneshot, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::pipeline::{CheckOutcome, CheckPipeline, CommitLock};
use super::MonitorError;
use crate::db::entities::website;

/// Checks allowed in flight per website before further ones are dropped.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 10;

struct TimerHandle {
    handle: JoinHandle<()>,
    shutdown_tx: oneshot::Sender<()>,
    interval_seconds: u64,
}

/// Concurrency state for one website, shared by its timer, manual checks and
/// every run still in flight. It outlives unregister and reschedule so the
/// cap and the commit order hold across timer replacements.
struct TargetSlot {
    permits: Arc<Semaphore>,
    commit_lock: CommitLock,
}

struct SchedulerInner {
    pipeline: Arc<CheckPipeline>,
    timers: DashMap<i32, TimerHandle>,
    slots: DashMap<i32, Arc<TargetSlot>>,
    max_in_flight: usize,
}

impl SchedulerInner {
    fn slot(&self, website_id: i32) -> Arc<TargetSlot> {
        self.slots
            .entry(website_id)
            .or_insert_with(|| {
                Arc::new(TargetSlot {
                    permits: Arc::new(Semaphore::new(self.max_in_flight)),
                    commit_lock: CommitLock::default(),
                })
            })
            .value()
            .clone()
    }

    fn stop_timer(&self, website_id: i32) -> bool {
        match self.timers.remove(&website_id) {
            Some((_, timer)) => {
                let _ = timer.shutdown_tx.send(());
                true
            }
            None => false,
        }
    }

    /// Drops everything kept for a website that no longer exists. The slot
    /// stays while other checks still hold permits; the last one to finish
    /// removes it.
    fn forget_deleted(&self, website_id: i32) {
        if self.stop_timer(website_id) {
            info!(website_id, "Website no longer exists, timer cancelled.");
        }
        self.slots.remove_if(&website_id, |_, slot| {
            slot.permits.available_permits() == self.max_in_flight
        });
    }
}

#[derive(Clone)]
pub struct TargetScheduler {
    inner: Arc<SchedulerInner>,
}

impl TargetScheduler {
    pub fn new(pipeline: Arc<CheckPipeline>, max_in_flight: usize) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                pipeline,
                timers: DashMap::new(),
                slots: DashMap::new(),
                max_in_flight: max_in_flight.max(1),
            }),
        }
    }

    /// Registers every stored website. Returns how many were registered.
    pub async fn start(&self) -> Result<usize, MonitorError> {
        let websites = self.inner.pipeline.store().list_targets().await?;
        for website in &websites {
            self.register(website);
        }
        info!(count = websites.len(), "Scheduler started.");
        Ok(websites.len())
    }

    /// Starts the website's timer. The first check runs one interval from
    /// now. Registering an already registered website replaces its timer.
    pub fn register(&self, website: &website::Model) {
        let interval_seconds = if website.checking_interval < 1 {
            warn!(
                website_id = website.id,
                checking_interval = website.checking_interval,
                "Checking interval below one second, using one second."
            );
            1
        } else {
            website.checking_interval as u64
        };
        self.start_timer(website.id, interval_seconds);
    }

    /// Cancels the website's timer. Checks already running are not
    /// interrupted. Returns false if the website was not registered.
    pub fn unregister(&self, website_id: i32) -> bool {
        let removed = self.inner.stop_timer(website_id);
        if removed {
            info!(website_id, "Website unregistered.");
        }
        removed
    }

    /// Replaces the website's timer with one firing every `interval_seconds`.
    pub fn reschedule(&self, website_id: i32, interval_seconds: i32) {
        let interval_seconds = interval_seconds.max(1) as u64;
        self.start_timer(website_id, interval_seconds);
        info!(website_id, interval_seconds, "Website rescheduled.");
    }

    /// Runs a check outside the timer cadence, subject to the same in-flight
    /// cap as timer checks.
    pub async fn run_check_now(&self, website_id: i32) -> Result<CheckOutcome, MonitorError> {
        let existing = self.inner.slots.get(&website_id).map(|slot| slot.value().clone());
        let slot = match existing {
            Some(slot) => slot,
            None => {
                if self.inner.pipeline.store().find_target(website_id).await?.is_none() {
                    return Err(MonitorError::WebsiteNotFound(website_id));
                }
                self.inner.slot(website_id)
            }
        };
        let permit = slot
            .permits
            .clone()
            .try_acquire_owned()
            .map_err(|_| MonitorError::Busy(website_id))?;
        let scheduler = Arc::downgrade(&self.inner);
        run_with_permit(&self.inner.pipeline, &scheduler, website_id, &slot, permit).await
    }

    /// Checks every stored website once, concurrently.
    pub async fn run_check_all(
        &self,
    ) -> Result<Vec<(i32, Result<CheckOutcome, MonitorError>)>, MonitorError> {
        let websites = self.inner.pipeline.store().list_targets().await?;
        let checks = websites.iter().map(|website| async move {
            (website.id, self.run_check_now(website.id).await)
        });
        Ok(join_all(checks).await)
    }

    pub fn registered_ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.inner.timers.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn interval_of(&self, website_id: i32) -> Option<u64> {
        self.inner
            .timers
            .get(&website_id)
            .map(|timer| timer.interval_seconds)
    }

    /// Cancels every timer and waits for the timer tasks to exit. Checks
    /// already running finish on their own.
    pub async fn shutdown(&self) {
        let ids: Vec<i32> = self.inner.timers.iter().map(|entry| *entry.key()).collect();
        for website_id in ids {
            if let Some((_, timer)) = self.inner.timers.remove(&website_id) {
                let _ = timer.shutdown_tx.send(());
                if let Err(e) = timer.handle.await {
                    error!(website_id, error = %e, "Timer task ended abnormally.");
                }
            }
        }
        info!("Scheduler stopped.");
    }

    fn start_timer(&self, website_id: i32, interval_seconds: u64) {
        self.inner.stop_timer(website_id);

        let slot = self.inner.slot(website_id);
        let pipeline = self.inner.pipeline.clone();
        let scheduler = Arc::downgrade(&self.inner);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let period = Duration::from_secs(interval_seconds);

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        dispatch(&pipeline, &scheduler, website_id, &slot);
                    }
                }
            }
            debug!(website_id, "Timer stopped.");
        });

        self.inner.timers.insert(
            website_id,
            TimerHandle {
                handle,
                shutdown_tx,
                interval_seconds,
            },
        );
        debug!(website_id, interval_seconds, "Timer started.");
    }
}

/// Runs the pipeline while holding `permit`. The permit is released before a
/// deleted website is forgotten so its slot can be seen idle.
async fn run_with_permit(
    pipeline: &CheckPipeline,
    scheduler: &Weak<SchedulerInner>,
    website_id: i32,
    slot: &TargetSlot,
    permit: OwnedSemaphorePermit,
) -> Result<CheckOutcome, MonitorError> {
    let result = pipeline.run(website_id, &slot.commit_lock).await;
    drop(permit);
    if let Err(MonitorError::WebsiteNotFound(_)) = result {
        if let Some(scheduler) = scheduler.upgrade() {
            scheduler.forget_deleted(website_id);
        }
    }
    result
}

/// Spawns one pipeline run unless the website is at its in-flight cap.
fn dispatch(
    pipeline: &Arc<CheckPipeline>,
    scheduler: &Weak<SchedulerInner>,
    website_id: i32,
    slot: &Arc<TargetSlot>,
) {
    let permit = match slot.permits.clone().try_acquire_owned() {
        Ok(permit) => permit,
        Err(_) => {
            warn!(website_id, "Too many checks in flight, dropping this tick.");
            return;
        }
    };

    let pipeline = pipeline.clone();
    let scheduler = scheduler.clone();
    let slot = slot.clone();
    tokio::spawn(async move {
        match run_with_permit(&pipeline, &scheduler, website_id, &slot, permit).await {
            Ok(outcome) => debug!(website_id, status = outcome.status, "Scheduled check finished."),
            Err(MonitorError::WebsiteNotFound(_)) => {
                warn!(website_id, "Scheduled check for a website that no longer exists.")
            }
            Err(e) => error!(website_id, error = %e, "Scheduled check failed."),
        }
    });
}
