use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::app_state::AppState;
use crate::auth::AuthUser;
use crate::error::AppError;
use crate::models::task::{CreateTaskRequest, SaveStageContentRequest, UpdateTaskRequest};
use crate::stage_tracker::StageMove;
use crate::task_service::{HistoryRecord, TaskService};
use crate::user_management::{names_by_id, populate, refs_by_id};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub task_title: String,
    pub user_name: String,
    pub status: &'static str,
    #[serde(with = "crate::models::timestamp")]
    pub timestamp: DateTime<Utc>,
}

fn service(data: &AppState) -> TaskService<'_> {
    TaskService::new(data.tasks.as_ref())
}

/// GET /api/tasks
pub async fn list_tasks(user: AuthUser, data: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let tasks = service(&data).list_for(&user).await?;
    let ids = tasks.iter().flat_map(|t| {
        t.assignees.iter().chain(t.team_leader.as_ref()).chain(Some(&t.created_by)).cloned()
    });
    let refs = refs_by_id(&data.mongodb, ids.collect::<Vec<_>>()).await?;
    let tasks = tasks
        .iter()
        .map(|t| populate(t, &["assignees", "teamLeader", "createdBy"], &refs))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(HttpResponse::Ok().json(tasks))
}

/// POST /api/tasks
pub async fn create_task(
    user: AuthUser,
    data: web::Data<AppState>,
    body: web::Json<CreateTaskRequest>,
) -> Result<HttpResponse, AppError> {
    let task = service(&data).create(&user, body.into_inner()).await?;
    Ok(HttpResponse::Created().json(task))
}

/// GET /api/tasks/{id}
pub async fn get_task(
    _user: AuthUser,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let task = service(&data).get(&path).await?;
    Ok(HttpResponse::Ok().json(task))
}

/// PUT /api/tasks/{id}
pub async fn update_task(
    user: AuthUser,
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<UpdateTaskRequest>,
) -> Result<HttpResponse, AppError> {
    let task = service(&data).update(&user, &path, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(task))
}

/// DELETE /api/tasks/{id}
pub async fn delete_task(
    user: AuthUser,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let task = service(&data).delete(&user, &path).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Task deleted successfully",
        "id": task.id,
    })))
}

/// PUT /api/tasks/{id}/stage
pub async fn move_stage(
    user: AuthUser,
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<StageMove>,
) -> Result<HttpResponse, AppError> {
    let (task, _) = service(&data).move_stage(&user, &path, &body).await?;
    Ok(HttpResponse::Ok().json(task))
}

/// GET /api/tasks/{id}/stages
pub async fn list_stages(
    _user: AuthUser,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let stages = service(&data).stages(&path).await?;
    Ok(HttpResponse::Ok().json(stages))
}

/// POST /api/tasks/stage-content
pub async fn save_stage_content(
    user: AuthUser,
    data: web::Data<AppState>,
    body: web::Json<SaveStageContentRequest>,
) -> Result<HttpResponse, AppError> {
    let stage = service(&data).save_stage_content(&user, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(stage))
}

/// GET /api/tasks/{id}/stage-content/{stageName}
pub async fn get_stage_content(
    user: AuthUser,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, AppError> {
    let (task_id, stage_name) = path.into_inner();
    let content = service(&data).stage_content(&user, &task_id, &stage_name).await?;
    Ok(HttpResponse::Ok().json(content))
}

/// GET /api/tasks/status-history
pub async fn status_history(
    _user: AuthUser,
    data: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let records = service(&data).history().await?;
    let names = names_by_id(&data.mongodb, records.iter().map(|r| r.user_id.clone())).await?;
    let items: Vec<HistoryItem> = records
        .into_iter()
        .map(|r| {
            let user_name = names.get(&r.user_id).cloned().unwrap_or_else(|| "Unknown User".into());
            HistoryItem::from_record(r, user_name)
        })
        .collect();
    Ok(HttpResponse::Ok().json(items))
}

impl HistoryItem {
    fn from_record(record: HistoryRecord, user_name: String) -> Self {
        Self {
            task_title: record.task_title,
            user_name,
            status: record.status,
            timestamp: record.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_items_use_feed_field_names() {
        let record = HistoryRecord {
            task_title: "Launch".into(),
            user_id: "u1".into(),
            status: "deleted",
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(HistoryItem::from_record(record, "Ada".into())).unwrap();
        assert_eq!(json["taskTitle"], "Launch");
        assert_eq!(json["userName"], "Ada");
        assert_eq!(json["status"], "deleted");
        assert!(json.get("timestamp").is_some());
    }
}
