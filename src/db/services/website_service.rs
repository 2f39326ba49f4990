//! Service functions for monitored websites and their incident history.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait, Unchanged,
};
use tracing::debug;

use crate::db::entities::{prelude::*, status_history, website};
use crate::db::store::{CheckCommit, ExpiryUpdate};

/// Input for registering a new website.
#[derive(Debug, Clone)]
pub struct NewWebsite {
    pub name: String,
    pub url: String,
    pub checking_interval: i32,
    pub email_notifications: bool,
    pub notification_email: Option<String>,
}

pub async fn create_website(
    db: &DatabaseConnection,
    new_website: NewWebsite,
) -> Result<website::Model, DbErr> {
    let now = Utc::now();
    let model = website::ActiveModel {
        name: Set(new_website.name),
        url: Set(new_website.url),
        checking_interval: Set(new_website.checking_interval),
        email_notifications: Set(new_website.email_notifications),
        notification_email: Set(new_website.notification_email),
        status: Set(None),
        prev_status: Set(None),
        ssl_expiry: Set(None),
        domain_expiry: Set(None),
        up_notified: Set(false),
        down_notified: Set(false),
        last_checked_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    model.insert(db).await
}

pub async fn find_website(
    db: &DatabaseConnection,
    website_id: i32,
) -> Result<Option<website::Model>, DbErr> {
    Website::find_by_id(website_id).one(db).await
}

pub async fn list_websites(db: &DatabaseConnection) -> Result<Vec<website::Model>, DbErr> {
    Website::find()
        .order_by_asc(WebsiteColumn::Id)
        .all(db)
        .await
}

/// Deletes a website. History rows go with it through the cascading foreign key.
pub async fn delete_website(db: &DatabaseConnection, website_id: i32) -> Result<u64, DbErr> {
    let result = Website::delete_by_id(website_id).exec(db).await?;
    Ok(result.rows_affected)
}

pub async fn list_history(
    db: &DatabaseConnection,
    website_id: i32,
) -> Result<Vec<status_history::Model>, DbErr> {
    StatusHistory::find()
        .filter(StatusHistoryColumn::WebsiteId.eq(website_id))
        .order_by_asc(StatusHistoryColumn::Id)
        .all(db)
        .await
}

/// Writes the result of one check: the website row and, for non-success
/// observations, one history row. Both land in a single transaction.
pub async fn commit_check(db: &DatabaseConnection, commit: &CheckCommit) -> Result<(), DbErr> {
    let txn = db.begin().await?;

    let mut active = website::ActiveModel {
        id: Unchanged(commit.website_id),
        ..Default::default()
    };
    active.status = Set(Some(commit.status));
    active.prev_status = Set(commit.prev_status);
    active.up_notified = Set(commit.up_notified);
    active.down_notified = Set(commit.down_notified);
    active.ssl_expiry = Set(commit.ssl_expiry);
    if let ExpiryUpdate::Set(expiry) = commit.domain_expiry {
        active.domain_expiry = Set(Some(expiry));
    }
    active.last_checked_at = Set(Some(commit.checked_at));
    active.updated_at = Set(commit.checked_at);
    active.update(&txn).await?;

    if commit.record_history {
        status_history::ActiveModel {
            website_id: Set(commit.website_id),
            timestamp: Set(commit.checked_at),
            status_code: Set(commit.status),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
    }

    txn.commit().await?;
    debug!(
        website_id = commit.website_id,
        status = commit.status,
        history = commit.record_history,
        "Committed check result."
    );
    Ok(())
}
