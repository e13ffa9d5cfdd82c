use std::sync::Arc;

use async_trait::async_trait;
use mongodb::bson::{doc, Document};

use crate::db::{collect, MongoDB};
use crate::error::AppError;
use crate::models::audit::AuditEntry;
use crate::models::task::Task;

/// Persistence for tasks and the audit log.
///
/// `save` is a compare-and-swap on `Task::version`: it succeeds only if the
/// stored revision still equals the one the caller read, and bumps it.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn insert(&self, task: &Task) -> Result<(), AppError>;
    async fn find(&self, id: &str) -> Result<Option<Task>, AppError>;
    async fn list_involving(&self, user_id: &str) -> Result<Vec<Task>, AppError>;
    async fn list_all(&self) -> Result<Vec<Task>, AppError>;
    async fn save(&self, task: &mut Task) -> Result<(), AppError>;
    async fn delete(&self, id: &str) -> Result<bool, AppError>;
    async fn append_audit(&self, entry: &AuditEntry) -> Result<(), AppError>;
    async fn audit_entries(&self) -> Result<Vec<AuditEntry>, AppError>;
}

pub struct MongoTaskStore {
    mongodb: Arc<MongoDB>,
}

impl MongoTaskStore {
    pub fn new(mongodb: Arc<MongoDB>) -> Self {
        Self { mongodb }
    }
}

fn version_filter(id: &str, expected: i64) -> Document {
    if expected == 0 {
        // Documents written before versioning have no field at all.
        doc! {
            "_id": id,
            "$or": [ { "version": 0_i64 }, { "version": { "$exists": false } } ],
        }
    } else {
        doc! { "_id": id, "version": expected }
    }
}

#[async_trait]
impl TaskStore for MongoTaskStore {
    async fn insert(&self, task: &Task) -> Result<(), AppError> {
        self.mongodb.tasks().insert_one(task).await?;
        Ok(())
    }

    async fn find(&self, id: &str) -> Result<Option<Task>, AppError> {
        Ok(self.mongodb.tasks().find_one(doc! { "_id": id }).await?)
    }

    async fn list_involving(&self, user_id: &str) -> Result<Vec<Task>, AppError> {
        let filter = doc! {
            "$or": [
                { "createdBy": user_id },
                { "assignees": user_id },
                { "teamLeader": user_id },
            ]
        };
        let cursor = self.mongodb.tasks().find(filter).sort(doc! { "createdAt": -1 }).await?;
        collect(cursor).await
    }

    async fn list_all(&self) -> Result<Vec<Task>, AppError> {
        collect(self.mongodb.tasks().find(doc! {}).await?).await
    }

    async fn save(&self, task: &mut Task) -> Result<(), AppError> {
        let expected = task.version;
        task.version = expected + 1;
        let result = self
            .mongodb
            .tasks()
            .replace_one(version_filter(&task.id, expected), &*task)
            .await;
        match result {
            Ok(res) if res.matched_count == 1 => Ok(()),
            Ok(_) => {
                task.version = expected;
                if self.find(&task.id).await?.is_some() {
                    Err(AppError::conflict("Task was modified by someone else; reload and retry"))
                } else {
                    Err(AppError::not_found("Task"))
                }
            }
            Err(e) => {
                task.version = expected;
                Err(e.into())
            }
        }
    }

    async fn delete(&self, id: &str) -> Result<bool, AppError> {
        let res = self.mongodb.tasks().delete_one(doc! { "_id": id }).await?;
        Ok(res.deleted_count > 0)
    }

    async fn append_audit(&self, entry: &AuditEntry) -> Result<(), AppError> {
        self.mongodb.audit_log().insert_one(entry).await?;
        Ok(())
    }

    async fn audit_entries(&self) -> Result<Vec<AuditEntry>, AppError> {
        let cursor = self.mongodb.audit_log().find(doc! {}).sort(doc! { "timestamp": -1 }).await?;
        collect(cursor).await
    }
}

#[cfg(test)]
pub mod memory {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// In-process store with the same compare-and-swap contract as Mongo.
    #[derive(Default)]
    pub struct MemoryTaskStore {
        tasks: Mutex<HashMap<String, Task>>,
        audit: Mutex<Vec<AuditEntry>>,
    }

    impl MemoryTaskStore {
        /// Overwrites the stored copy without a version check, simulating a
        /// concurrent writer.
        pub fn force_version(&self, id: &str, version: i64) {
            if let Some(task) = self.tasks.lock().unwrap().get_mut(id) {
                task.version = version;
            }
        }
    }

    #[async_trait]
    impl TaskStore for MemoryTaskStore {
        async fn insert(&self, task: &Task) -> Result<(), AppError> {
            self.tasks.lock().unwrap().insert(task.id.clone(), task.clone());
            Ok(())
        }

        async fn find(&self, id: &str) -> Result<Option<Task>, AppError> {
            Ok(self.tasks.lock().unwrap().get(id).cloned())
        }

        async fn list_involving(&self, user_id: &str) -> Result<Vec<Task>, AppError> {
            Ok(self
                .tasks
                .lock()
                .unwrap()
                .values()
                .filter(|t| t.involves(user_id))
                .cloned()
                .collect())
        }

        async fn list_all(&self) -> Result<Vec<Task>, AppError> {
            Ok(self.tasks.lock().unwrap().values().cloned().collect())
        }

        async fn save(&self, task: &mut Task) -> Result<(), AppError> {
            let mut tasks = self.tasks.lock().unwrap();
            let stored = tasks.get_mut(&task.id).ok_or_else(|| AppError::not_found("Task"))?;
            if stored.version != task.version {
                return Err(AppError::conflict("Task was modified by someone else; reload and retry"));
            }
            task.version += 1;
            *stored = task.clone();
            Ok(())
        }

        async fn delete(&self, id: &str) -> Result<bool, AppError> {
            Ok(self.tasks.lock().unwrap().remove(id).is_some())
        }

        async fn append_audit(&self, entry: &AuditEntry) -> Result<(), AppError> {
            self.audit.lock().unwrap().push(entry.clone());
            Ok(())
        }

        async fn audit_entries(&self) -> Result<Vec<AuditEntry>, AppError> {
            let mut entries = self.audit.lock().unwrap().clone();
            entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            Ok(entries)
        }
    }
}
