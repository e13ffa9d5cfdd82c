//! Task operations over a [`TaskStore`], with authorization checks applied
//! per operation. Every mutation is a single compare-and-swap save of the
//! task document.

use chrono::{DateTime, Utc};
use log::info;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::models::audit::{AuditAction, AuditEntry};
use crate::models::task::{
    CreateTaskRequest, SaveStageContentRequest, Stage, StageContent, StageSummary, Task,
    UpdateTaskRequest,
};
use crate::policy::{authorize, authorize_owned, Action};
use crate::stage_tracker::{StageMove, StagePlan};
use crate::task_store::TaskStore;

/// One row of the flattened activity feed, before user names are resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    pub task_title: String,
    pub user_id: String,
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
}

pub struct TaskService<'a> {
    store: &'a dyn TaskStore,
}

impl<'a> TaskService<'a> {
    pub fn new(store: &'a dyn TaskStore) -> Self {
        Self { store }
    }

    pub async fn create(&self, actor: &AuthUser, req: CreateTaskRequest) -> Result<Task, AppError> {
        authorize(actor.role, Action::CreateTask)?;
        let task = Task::new(req, &actor.id, Utc::now())?;
        self.store.insert(&task).await?;
        info!("Task {} created by {}", task.id, actor.id);
        Ok(task)
    }

    pub async fn list_for(&self, actor: &AuthUser) -> Result<Vec<Task>, AppError> {
        self.store.list_involving(&actor.id).await
    }

    pub async fn get(&self, id: &str) -> Result<Task, AppError> {
        self.store.find(id).await?.ok_or_else(|| AppError::not_found("Task"))
    }

    pub async fn update(
        &self,
        actor: &AuthUser,
        id: &str,
        req: UpdateTaskRequest,
    ) -> Result<Task, AppError> {
        let mut task = self.get(id).await?;
        authorize_owned(actor.role, Action::WorkOnTask, task.involves(&actor.id))?;
        task.apply_update(req, &actor.id, Utc::now())?;
        self.store.save(&mut task).await?;
        Ok(task)
    }

    /// Removes the task and records the deletion in the audit log.
    pub async fn delete(&self, actor: &AuthUser, id: &str) -> Result<Task, AppError> {
        let task = self.get(id).await?;
        authorize_owned(actor.role, Action::DeleteTask, task.created_by == actor.id)?;
        if !self.store.delete(id).await? {
            return Err(AppError::not_found("Task"));
        }
        let entry = AuditEntry::task_deleted(&task.id, &task.title, &actor.id, Utc::now());
        self.store.append_audit(&entry).await?;
        info!("Task {} deleted by {}", task.id, actor.id);
        Ok(task)
    }

    pub async fn move_stage(
        &self,
        actor: &AuthUser,
        id: &str,
        mv: &StageMove,
    ) -> Result<(Task, StagePlan), AppError> {
        let mut task = self.get(id).await?;
        authorize_owned(actor.role, Action::WorkOnTask, task.involves(&actor.id))?;
        let plan = task.move_to_stage(mv)?;
        if plan.is_noop() && plan.from == plan.target {
            return Ok((task, plan));
        }
        task.updated_at = Utc::now();
        self.store.save(&mut task).await?;
        info!(
            "Task {} moved from stage {} to {} by {}",
            task.id, plan.from, plan.target, actor.id
        );
        Ok((task, plan))
    }

    pub async fn stages(&self, id: &str) -> Result<Vec<StageSummary>, AppError> {
        Ok(self.get(id).await?.stage_summaries())
    }

    pub async fn save_stage_content(
        &self,
        actor: &AuthUser,
        req: SaveStageContentRequest,
    ) -> Result<Stage, AppError> {
        let mut task = self.get(&req.task_id).await?;
        authorize_owned(actor.role, Action::WorkOnTask, task.is_assignee(&actor.id))?;
        task.set_stage_content(&req.stage_name, req.content)?;
        task.updated_at = Utc::now();
        self.store.save(&mut task).await?;
        task.stage(&req.stage_name).cloned()
    }

    pub async fn stage_content(
        &self,
        actor: &AuthUser,
        id: &str,
        stage_name: &str,
    ) -> Result<StageContent, AppError> {
        let task = self.get(id).await?;
        authorize_owned(actor.role, Action::WorkOnTask, task.is_assignee(&actor.id))?;
        let stage = task.stage(stage_name)?;
        Ok(StageContent { content: stage.content.clone(), is_completed: stage.is_completed })
    }

    /// Every status change of every task plus deletions, newest first.
    pub async fn history(&self) -> Result<Vec<HistoryRecord>, AppError> {
        let mut records: Vec<HistoryRecord> = self
            .store
            .list_all()
            .await?
            .into_iter()
            .flat_map(|task| {
                let title = task.title;
                task.status_history.into_iter().map(move |change| HistoryRecord {
                    task_title: title.clone(),
                    user_id: change.updated_by,
                    status: change.status.as_str(),
                    timestamp: change.updated_at,
                })
            })
            .collect();

        records.extend(
            self.store
                .audit_entries()
                .await?
                .into_iter()
                .filter(|e| e.action == AuditAction::TaskDeleted)
                .map(|e| HistoryRecord {
                    task_title: e.subject_title,
                    user_id: e.actor_id,
                    status: "deleted",
                    timestamp: e.timestamp,
                }),
        );
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }
}
