use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A monitored website together with the observation fields the check
/// pipeline maintains.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[sea_orm(table_name = "websites")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    #[sea_orm(unique)]
    pub url: String,
    pub checking_interval: i32,
    pub email_notifications: bool,
    #[sea_orm(nullable)]
    pub notification_email: Option<String>,
    // NULL until the first check lands.
    #[sea_orm(nullable)]
    pub status: Option<i32>,
    #[sea_orm(nullable)]
    pub prev_status: Option<i32>,
    #[sea_orm(nullable)]
    pub ssl_expiry: Option<ChronoDateTimeUtc>,
    #[sea_orm(nullable)]
    pub domain_expiry: Option<ChronoDateTimeUtc>,
    pub up_notified: bool,
    pub down_notified: bool,
    #[sea_orm(nullable)]
    pub last_checked_at: Option<ChronoDateTimeUtc>,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

impl Model {
    /// The address notifications go to, if delivery is enabled and configured.
    pub fn notification_recipient(&self) -> Option<&str> {
        if !self.email_notifications {
            return None;
        }
        self.notification_email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::status_history::Entity")]
    StatusHistory,
}

impl Related<super::status_history::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StatusHistory.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
