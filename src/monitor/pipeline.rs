//! One check of one website: probe, decide, commit, notify.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use super::gate::Latches;
use super::probes::{DomainExpiryProbe, HttpProbe, TlsExpiryProbe};
use super::transition::{NotificationDecision, SUCCESS_STATUS};
use super::MonitorError;
use crate::db::store::{CheckCommit, ExpiryUpdate, TargetStore};
use crate::notifications::NotificationService;

/// What a single check observed and decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub website_id: i32,
    pub status: i32,
    pub prev_status: Option<i32>,
    pub decision: NotificationDecision,
    pub history_recorded: bool,
    /// A notification was handed to the sender and accepted.
    pub notified: bool,
}

/// Serializes the commits of one website's checks.
///
/// Every run takes a ticket before its probes start, so tickets order
/// observations even when the commits land in a different order.
#[derive(Debug, Default)]
pub struct CommitLock {
    tickets: AtomicU64,
    /// Ticket of the newest observation whose expiries are stored.
    newest_expiry: Mutex<Option<u64>>,
}

impl CommitLock {
    fn ticket(&self) -> u64 {
        self.tickets.fetch_add(1, Ordering::SeqCst)
    }
}

pub struct CheckPipeline {
    store: Arc<dyn TargetStore>,
    http: Arc<dyn HttpProbe>,
    tls: Arc<dyn TlsExpiryProbe>,
    domain: Arc<dyn DomainExpiryProbe>,
    notifications: NotificationService,
}

impl CheckPipeline {
    pub fn new(
        store: Arc<dyn TargetStore>,
        http: Arc<dyn HttpProbe>,
        tls: Arc<dyn TlsExpiryProbe>,
        domain: Arc<dyn DomainExpiryProbe>,
        notifications: NotificationService,
    ) -> Self {
        Self {
            store,
            http,
            tls,
            domain,
            notifications,
        }
    }

    pub fn store(&self) -> &Arc<dyn TargetStore> {
        &self.store
    }

    /// Checks `website_id` once.
    ///
    /// The probes run concurrently and outside `commit_lock`. The lock covers
    /// re-reading the stored state, applying the latches and committing, so
    /// concurrent runs for one website chain `prev_status` and `status` in
    /// commit order. Expiries follow observation order instead: a run whose
    /// probes started before those of an already committed run keeps the
    /// stored expiries. The notification goes out only after the commit
    /// succeeded; a failed commit leaves the stored state untouched for the
    /// next tick to re-evaluate.
    pub async fn run(
        &self,
        website_id: i32,
        commit_lock: &CommitLock,
    ) -> Result<CheckOutcome, MonitorError> {
        let ticket = commit_lock.ticket();
        let website = self
            .store
            .find_target(website_id)
            .await?
            .ok_or(MonitorError::WebsiteNotFound(website_id))?;

        let (status, ssl_result, domain_result) = tokio::join!(
            self.http.probe(&website.url),
            self.tls.probe(&website.url),
            self.domain.probe(&website.url),
        );

        let ssl_expiry = ssl_result.unwrap_or_else(|e| {
            warn!(website_id, url = %website.url, error = %e, "TLS expiry probe failed, clearing stored expiry.");
            None
        });
        let domain_expiry = match domain_result {
            Ok(expiry) => ExpiryUpdate::Set(expiry),
            Err(e) => {
                warn!(website_id, url = %website.url, error = %e, "Domain expiry probe failed, keeping stored expiry.");
                ExpiryUpdate::Keep
            }
        };

        let (current, commit, decision) = {
            let mut newest_expiry = commit_lock.newest_expiry.lock().await;
            let current = self
                .store
                .find_target(website_id)
                .await?
                .ok_or(MonitorError::WebsiteNotFound(website_id))?;

            let superseded = newest_expiry.is_some_and(|newest| newest > ticket);
            let (ssl_expiry, domain_expiry) = if superseded {
                debug!(website_id, ticket, "Newer expiries already stored, keeping them.");
                (current.ssl_expiry, ExpiryUpdate::Keep)
            } else {
                (ssl_expiry, domain_expiry)
            };

            let gate = Latches::of(&current).observe(current.status, status);
            let commit = CheckCommit {
                website_id,
                status,
                prev_status: current.status,
                up_notified: gate.latches.up_notified,
                down_notified: gate.latches.down_notified,
                ssl_expiry,
                domain_expiry,
                checked_at: Utc::now(),
                record_history: status != SUCCESS_STATUS,
            };

            if let Err(e) = self.store.commit_check(&commit).await {
                error!(website_id, error = %e, "Failed to commit check result; will retry on the next tick.");
                return Err(e.into());
            }
            if !superseded {
                *newest_expiry = Some(ticket);
            }
            (current, commit, gate.decision)
        };

        debug!(
            website_id,
            status = commit.status,
            prev_status = ?commit.prev_status,
            history = commit.record_history,
            "Website checked."
        );

        let mut notified = false;
        if let Some(change) = decision.change() {
            match current.notification_recipient() {
                Some(to) => {
                    notified = self
                        .notifications
                        .notify_status_change(to, &current, change)
                        .await;
                }
                None => debug!(website_id, ?change, "Notifications disabled, latch updated only."),
            }
        }

        Ok(CheckOutcome {
            website_id,
            status: commit.status,
            prev_status: commit.prev_status,
            decision,
            history_recorded: commit.record_history,
            notified,
        })
    }
}
