//! The persistence seam used by the monitoring engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{DatabaseConnection, DbErr};

use crate::db::entities::website;
use crate::db::services as db_services;

/// How a check affects a stored expiry timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryUpdate {
    /// Leave the stored value as it is.
    Keep,
    Set(DateTime<Utc>),
}

/// Everything one check invocation writes for its website.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckCommit {
    pub website_id: i32,
    pub status: i32,
    pub prev_status: Option<i32>,
    pub up_notified: bool,
    pub down_notified: bool,
    /// Always written; `None` clears a previously stored expiry.
    pub ssl_expiry: Option<DateTime<Utc>>,
    pub domain_expiry: ExpiryUpdate,
    pub checked_at: DateTime<Utc>,
    pub record_history: bool,
}

#[async_trait]
pub trait TargetStore: Send + Sync {
    async fn find_target(&self, website_id: i32) -> Result<Option<website::Model>, DbErr>;

    async fn list_targets(&self) -> Result<Vec<website::Model>, DbErr>;

    /// Applies a check result atomically: the website row plus an optional history row.
    async fn commit_check(&self, commit: &CheckCommit) -> Result<(), DbErr>;
}

/// `TargetStore` backed by a SeaORM connection.
#[derive(Clone)]
pub struct SeaOrmStore {
    db: DatabaseConnection,
}

impl SeaOrmStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TargetStore for SeaOrmStore {
    async fn find_target(&self, website_id: i32) -> Result<Option<website::Model>, DbErr> {
        db_services::find_website(&self.db, website_id).await
    }

    async fn list_targets(&self) -> Result<Vec<website::Model>, DbErr> {
        db_services::list_websites(&self.db).await
    }

    async fn commit_check(&self, commit: &CheckCommit) -> Result<(), DbErr> {
        db_services::commit_check(&self.db, commit).await
    }
}

#[cfg(test)]
pub mod memory {
    //! In-memory `TargetStore` with commit recording and failure injection.

    use super::*;
    use crate::db::entities::status_history;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryState {
        websites: BTreeMap<i32, website::Model>,
        history: Vec<status_history::Model>,
        commits: Vec<CheckCommit>,
        failing_commits: usize,
    }

    #[derive(Default)]
    pub struct MemoryStore {
        state: Mutex<MemoryState>,
        yield_on_access: AtomicBool,
    }

    pub fn sample_website(id: i32, url: &str) -> website::Model {
        let now = Utc::now();
        website::Model {
            id,
            name: format!("site-{id}"),
            url: url.to_string(),
            checking_interval: 60,
            email_notifications: true,
            notification_email: Some("ops@example.com".to_string()),
            status: None,
            prev_status: None,
            ssl_expiry: None,
            domain_expiry: None,
            up_notified: false,
            down_notified: false,
            last_checked_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert(&self, model: website::Model) {
            self.state.lock().unwrap().websites.insert(model.id, model);
        }

        pub fn remove(&self, website_id: i32) {
            let mut state = self.state.lock().unwrap();
            state.websites.remove(&website_id);
            state.history.retain(|h| h.website_id != website_id);
        }

        pub fn website(&self, website_id: i32) -> Option<website::Model> {
            self.state.lock().unwrap().websites.get(&website_id).cloned()
        }

        pub fn history(&self, website_id: i32) -> Vec<status_history::Model> {
            self.state
                .lock()
                .unwrap()
                .history
                .iter()
                .filter(|h| h.website_id == website_id)
                .cloned()
                .collect()
        }

        pub fn commits(&self) -> Vec<CheckCommit> {
            self.state.lock().unwrap().commits.clone()
        }

        /// Makes every read and commit suspend once before touching the
        /// data, the way a real database round trip would.
        pub fn yield_on_access(&self) {
            self.yield_on_access.store(true, Ordering::SeqCst);
        }

        async fn maybe_yield(&self) {
            if self.yield_on_access.load(Ordering::SeqCst) {
                tokio::task::yield_now().await;
            }
        }

        /// Makes the next `count` commits fail with a database error.
        pub fn fail_next_commits(&self, count: usize) {
            self.state.lock().unwrap().failing_commits = count;
        }
    }

    #[async_trait]
    impl TargetStore for MemoryStore {
        async fn find_target(&self, website_id: i32) -> Result<Option<website::Model>, DbErr> {
            self.maybe_yield().await;
            Ok(self.website(website_id))
        }

        async fn list_targets(&self) -> Result<Vec<website::Model>, DbErr> {
            Ok(self.state.lock().unwrap().websites.values().cloned().collect())
        }

        async fn commit_check(&self, commit: &CheckCommit) -> Result<(), DbErr> {
            self.maybe_yield().await;
            let mut state = self.state.lock().unwrap();
            if state.failing_commits > 0 {
                state.failing_commits -= 1;
                return Err(DbErr::Custom("injected commit failure".to_string()));
            }

            let website = state
                .websites
                .get_mut(&commit.website_id)
                .ok_or(DbErr::RecordNotUpdated)?;
            website.status = Some(commit.status);
            website.prev_status = commit.prev_status;
            website.up_notified = commit.up_notified;
            website.down_notified = commit.down_notified;
            website.ssl_expiry = commit.ssl_expiry;
            if let ExpiryUpdate::Set(expiry) = commit.domain_expiry {
                website.domain_expiry = Some(expiry);
            }
            website.last_checked_at = Some(commit.checked_at);
            website.updated_at = commit.checked_at;

            if commit.record_history {
                let id = state.history.len() as i32 + 1;
                state.history.push(status_history::Model {
                    id,
                    website_id: commit.website_id,
                    timestamp: commit.checked_at,
                    status_code: commit.status,
                });
            }
            state.commits.push(commit.clone());
            Ok(())
        }
    }
}
