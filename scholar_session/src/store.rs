use async_trait::async_trait;
use scholar_core::ConversationStore;
use scholar_entities::conversations;
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, Database, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, Schema, Set,
};
use std::path::Path;
use tracing::{debug, info};

fn is_table_already_exists_error(err: &DbErr) -> bool {
    err.to_string().contains("table") && err.to_string().contains("already exists")
}

/// Conversation store kept in a single SQLite table.
pub struct SqliteConversationStore {
    db: DatabaseConnection,
}

impl SqliteConversationStore {
    /// Open (creating if missing) the database file at `db_path`.
    pub async fn open(db_path: &Path) -> anyhow::Result<Self> {
        Self::connect(&format!("sqlite://{}?mode=rwc", db_path.display())).await
    }

    pub async fn connect(db_url: &str) -> anyhow::Result<Self> {
        info!("Connecting to conversation store: {}", db_url);

        let db = Database::connect(db_url).await?;

        let backend = db.get_database_backend();
        let schema = Schema::new(backend);
        let stmt = schema.create_table_from_entity(conversations::Entity);
        match db
            .execute_unprepared(&backend.build(&stmt).to_string())
            .await
        {
            Ok(_) => {}
            Err(e) if is_table_already_exists_error(&e) => {
                debug!("Conversation table already exists, skipping creation");
            }
            Err(e) => return Err(e.into()),
        }

        Ok(Self { db })
    }

}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let model = conversations::Entity::find_by_id(key.to_owned())
            .one(&self.db)
            .await?;

        Ok(model.map(|m| m.value))
    }

    async fn put(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let existing = conversations::Entity::find_by_id(key.to_owned())
            .one(&self.db)
            .await?;

        if let Some(model) = existing {
            let mut active: conversations::ActiveModel = model.into();
            active.value = Set(value.to_owned());
            active.update(&self.db).await?;
        } else {
            conversations::ActiveModel {
                key: Set(key.to_owned()),
                value: Set(value.to_owned()),
                created_at: Set(chrono::Utc::now().naive_utc()),
            }
            .insert(&self.db)
            .await?;
        }

        debug!("Stored conversation mapping: {} -> {}", key, value);
        Ok(())
    }

    async fn count(&self) -> anyhow::Result<u64> {
        Ok(conversations::Entity::find().count(&self.db).await?)
    }
}
