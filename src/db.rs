use futures_util::StreamExt;
use log::info;
use mongodb::bson::doc;
use mongodb::error::{ErrorKind, WriteError, WriteFailure};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, Cursor, Database, IndexModel};
use serde::de::DeserializeOwned;

use crate::error::AppError;
use crate::models::audit::AuditEntry;
use crate::models::chat::{Chat, Message};
use crate::models::idea::Idea;
use crate::models::meeting::Meeting;
use crate::models::music::Music;
use crate::models::project::Project;
use crate::models::resource::Resource;
use crate::models::task::Task;
use crate::models::user::User;

pub struct MongoDB {
    pub db: Database,
}

impl MongoDB {
    pub async fn init(uri: &str, db_name: &str) -> Result<Self, mongodb::error::Error> {
        let client = Client::with_uri_str(uri).await?;
        let mongodb = MongoDB { db: client.database(db_name) };
        mongodb.ensure_indexes().await?;
        Ok(mongodb)
    }

    async fn ensure_indexes(&self) -> Result<(), mongodb::error::Error> {
        let unique = |keys| {
            IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().unique(true).build())
                .build()
        };
        self.users().create_index(unique(doc! { "email": 1 })).await?;
        // Direct chats carry a sorted participant-pair key; group chats omit it.
        self.chats()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "directKey": 1 })
                    .options(
                        IndexOptions::builder()
                            .unique(true)
                            .partial_filter_expression(doc! { "directKey": { "$exists": true } })
                            .build(),
                    )
                    .build(),
            )
            .await?;
        self.messages()
            .create_index(IndexModel::builder().keys(doc! { "chatId": 1, "createdAt": 1 }).build())
            .await?;
        info!("MongoDB indexes ensured");
        Ok(())
    }

    pub fn users(&self) -> Collection<User> {
        self.db.collection("users")
    }

    pub fn tasks(&self) -> Collection<Task> {
        self.db.collection("tasks")
    }

    pub fn audit_log(&self) -> Collection<AuditEntry> {
        self.db.collection("audit_log")
    }

    pub fn ideas(&self) -> Collection<Idea> {
        self.db.collection("ideas")
    }

    pub fn resources(&self) -> Collection<Resource> {
        self.db.collection("resources")
    }

    pub fn projects(&self) -> Collection<Project> {
        self.db.collection("projects")
    }

    pub fn chats(&self) -> Collection<Chat> {
        self.db.collection("chats")
    }

    pub fn messages(&self) -> Collection<Message> {
        self.db.collection("messages")
    }

    pub fn meetings(&self) -> Collection<Meeting> {
        self.db.collection("meetings")
    }

    pub fn music(&self) -> Collection<Music> {
        self.db.collection("music")
    }
}

/// Drains a cursor, failing on the first document that cannot be read.
pub async fn collect<T>(mut cursor: Cursor<T>) -> Result<Vec<T>, AppError>
where
    T: DeserializeOwned + Unpin + Send + Sync,
{
    let mut items = Vec::new();
    while let Some(item) = cursor.next().await {
        items.push(item?);
    }
    Ok(items)
}

/// True when a write was rejected by a unique index.
pub fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(WriteError { code: 11000, .. }))
    )
}
