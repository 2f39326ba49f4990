//! SeaORM entities for the monitoring tables.

pub mod status_history;
pub mod website;

pub mod prelude {
    pub use super::website::ActiveModel as WebsiteActiveModel;
    pub use super::website::Column as WebsiteColumn;
    pub use super::website::Entity as Website;
    pub use super::website::Model as WebsiteModel;

    pub use super::status_history::ActiveModel as StatusHistoryActiveModel;
    pub use super::status_history::Column as StatusHistoryColumn;
    pub use super::status_history::Entity as StatusHistory;
    pub use super::status_history::Model as StatusHistoryModel;
}
