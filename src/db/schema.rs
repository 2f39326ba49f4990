use sea_orm::sea_query::Index;
use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, Schema};
use tracing::info;

use crate::db::entities::prelude::*;

/// Creates the monitoring tables from the entity definitions when they are missing.
pub async fn ensure_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let mut websites = schema.create_table_from_entity(Website);
    websites.if_not_exists();
    db.execute(backend.build(&websites)).await?;

    let mut history = schema.create_table_from_entity(StatusHistory);
    history.if_not_exists();
    db.execute(backend.build(&history)).await?;

    let history_index = Index::create()
        .if_not_exists()
        .name("idx_status_history_website_id")
        .table(StatusHistory)
        .col(StatusHistoryColumn::WebsiteId)
        .to_owned();
    db.execute(backend.build(&history_index)).await?;

    info!(backend = ?backend, "Database schema is ready.");
    Ok(())
}
