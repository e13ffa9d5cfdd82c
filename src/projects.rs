use actix_web::{web, HttpResponse};
use chrono::Utc;
use log::info;
use mongodb::bson::{doc, Document};
use mongodb::options::ReturnDocument;
use serde_json::json;

use crate::app_state::AppState;
use crate::auth::AuthUser;
use crate::db::collect;
use crate::error::AppError;
use crate::models::project::{
    updates, CreateProjectRequest, Project, TimelineEntryRequest, UpdateProjectRequest,
    UpdateTimelineEntryRequest,
};
use crate::notifications::Room;
use crate::policy::{authorize, Action};

async fn load(data: &AppState, id: &str) -> Result<Project, AppError> {
    data.mongodb
        .projects()
        .find_one(doc! { "_id": id })
        .await?
        .ok_or_else(|| AppError::not_found("Project"))
}

/// Applies `update` to the document matching `filter`, tells the wall and
/// returns what is now stored.
async fn update_and_publish(
    data: &AppState,
    filter: Document,
    update: Document,
    missing: &str,
) -> Result<Project, AppError> {
    let project = data
        .mongodb
        .projects()
        .find_one_and_update(filter, update)
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::not_found(missing))?;
    data.notify(Room::Projects, "projectUpdated", &project);
    Ok(project)
}

/// GET /api/projects
pub async fn list_projects(_user: AuthUser, data: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let cursor = data.mongodb.projects().find(doc! {}).sort(doc! { "createdAt": -1 }).await?;
    Ok(HttpResponse::Ok().json(collect(cursor).await?))
}

/// GET /api/projects/{id}
pub async fn get_project(
    _user: AuthUser,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(load(&data, &path).await?))
}

/// POST /api/projects
pub async fn create_project(
    user: AuthUser,
    data: web::Data<AppState>,
    body: web::Json<CreateProjectRequest>,
) -> Result<HttpResponse, AppError> {
    authorize(user.role, Action::ManageProjects)?;
    let project = Project::new(body.into_inner(), &user.id, Utc::now())?;
    data.mongodb.projects().insert_one(&project).await?;
    info!("Project {} created by {}", project.id, user.id);
    data.notify(Room::Projects, "newProject", &project);
    Ok(HttpResponse::Created().json(project))
}

/// PUT /api/projects/{id}
pub async fn update_project(
    user: AuthUser,
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<UpdateProjectRequest>,
) -> Result<HttpResponse, AppError> {
    authorize(user.role, Action::ManageProjects)?;
    let mut project = load(&data, &path).await?;
    project.apply_update(body.into_inner(), Utc::now());
    let project =
        update_and_publish(&data, doc! { "_id": &project.id }, updates::fields(&project), "Project").await?;
    Ok(HttpResponse::Ok().json(project))
}

/// DELETE /api/projects/{id}
pub async fn delete_project(
    user: AuthUser,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    authorize(user.role, Action::ManageProjects)?;
    let res = data.mongodb.projects().delete_one(doc! { "_id": path.as_str() }).await?;
    if res.deleted_count == 0 {
        return Err(AppError::not_found("Project"));
    }
    info!("Project {} deleted by {}", path, user.id);
    data.notify(Room::Projects, "projectDeleted", &path.into_inner());
    Ok(HttpResponse::Ok().json(json!({ "message": "Project deleted" })))
}

/// POST /api/projects/{id}/timeline
pub async fn add_timeline_entry(
    user: AuthUser,
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<TimelineEntryRequest>,
) -> Result<HttpResponse, AppError> {
    authorize(user.role, Action::ManageProjects)?;
    let mut project = load(&data, &path).await?;
    let update = updates::push_entry(project.add_entry(body.into_inner(), Utc::now())?)?;
    let project = update_and_publish(&data, doc! { "_id": &project.id }, update, "Project").await?;
    Ok(HttpResponse::Created().json(project))
}

/// PUT /api/projects/{id}/timeline/{entry_id}
pub async fn update_timeline_entry(
    user: AuthUser,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
    body: web::Json<UpdateTimelineEntryRequest>,
) -> Result<HttpResponse, AppError> {
    authorize(user.role, Action::ManageProjects)?;
    let (project_id, entry_id) = path.into_inner();
    let mut project = load(&data, &project_id).await?;
    let update = updates::set_entry(project.update_entry(&entry_id, body.into_inner(), Utc::now())?);
    let filter = doc! { "_id": &project.id, "timelineEntries._id": &entry_id };
    let project = update_and_publish(&data, filter, update, "Timeline entry").await?;
    Ok(HttpResponse::Ok().json(project))
}

/// DELETE /api/projects/{id}/timeline/{entry_id}
pub async fn delete_timeline_entry(
    user: AuthUser,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, AppError> {
    authorize(user.role, Action::ManageProjects)?;
    let (project_id, entry_id) = path.into_inner();
    let mut project = load(&data, &project_id).await?;
    let now = Utc::now();
    project.remove_entry(&entry_id, now)?;
    let filter = doc! { "_id": &project.id };
    let project = update_and_publish(&data, filter, updates::pull_entry(&entry_id, &now), "Project").await?;
    Ok(HttpResponse::Ok().json(project))
}
