use actix_web::{web, HttpResponse};
use chrono::Utc;
use log::{debug, info};
use mongodb::bson::{doc, Document};
use mongodb::options::ReturnDocument;
use serde_json::json;

use crate::app_state::AppState;
use crate::auth::AuthUser;
use crate::db::collect;
use crate::error::AppError;
use crate::models::resource::{CreateResourceRequest, Resource, ResourceQuery, UpdateResourceRequest};
use crate::notifications::Room;
use crate::policy::{authorize, authorize_owned, Action};

async fn load(data: &AppState, id: &str) -> Result<Resource, AppError> {
    data.mongodb
        .resources()
        .find_one(doc! { "_id": id })
        .await?
        .ok_or_else(|| AppError::not_found("Resource"))
}

/// Applies an update document and returns the stored result.
async fn update_and_fetch(data: &AppState, id: &str, update: Document) -> Result<Resource, AppError> {
    data.mongodb
        .resources()
        .find_one_and_update(doc! { "_id": id }, update)
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::not_found("Resource"))
}

/// GET /api/resources?type=&tags=&search=&sort=
pub async fn list_resources(
    _user: AuthUser,
    data: web::Data<AppState>,
    query: web::Query<ResourceQuery>,
) -> Result<HttpResponse, AppError> {
    let filter = query.filter();
    debug!("Resource filter: {:?}", filter);
    let cursor = data.mongodb.resources().find(filter).sort(query.sort()).await?;
    Ok(HttpResponse::Ok().json(collect(cursor).await?))
}

/// GET /api/resources/{id}
pub async fn get_resource(
    _user: AuthUser,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(load(&data, &path).await?))
}

/// POST /api/resources
pub async fn create_resource(
    user: AuthUser,
    data: web::Data<AppState>,
    body: web::Json<CreateResourceRequest>,
) -> Result<HttpResponse, AppError> {
    authorize(user.role, Action::CreateResource)?;
    let resource = Resource::new(body.into_inner(), &user.id, Utc::now())?;
    data.mongodb.resources().insert_one(&resource).await?;
    info!("Resource {} created by {}", resource.id, user.id);
    data.notify(Room::Resources, "newResource", &resource);
    Ok(HttpResponse::Created().json(resource))
}

/// PUT /api/resources/{id}
pub async fn update_resource(
    user: AuthUser,
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<UpdateResourceRequest>,
) -> Result<HttpResponse, AppError> {
    let mut resource = load(&data, &path).await?;
    authorize_owned(user.role, Action::ModifyResource, resource.uploaded_by == user.id)?;
    resource.apply_update(body.into_inner(), Utc::now())?;
    let resource = update_and_fetch(&data, &resource.id, resource.edit_update()?).await?;
    data.notify(Room::Resources, "resourceUpdated", &resource);
    Ok(HttpResponse::Ok().json(resource))
}

/// DELETE /api/resources/{id}
pub async fn delete_resource(
    user: AuthUser,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let resource = load(&data, &path).await?;
    authorize_owned(user.role, Action::ModifyResource, resource.uploaded_by == user.id)?;
    data.mongodb.resources().delete_one(doc! { "_id": &resource.id }).await?;
    data.notify(Room::Resources, "resourceDeleted", &resource.id);
    Ok(HttpResponse::Ok().json(json!({ "message": "Resource deleted successfully" })))
}

/// POST /api/resources/{id}/like
pub async fn like_resource(
    user: AuthUser,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let mut resource = load(&data, &path).await?;
    let liked = resource.toggle_like(&user.id);
    // Set operators, not a replace: other users may be liking concurrently.
    let update = if liked {
        doc! { "$addToSet": { "likes": &user.id } }
    } else {
        doc! { "$pull": { "likes": &user.id } }
    };
    let resource = update_and_fetch(&data, &resource.id, update).await?;
    data.notify(Room::Resources, "resourceLiked", &resource);
    Ok(HttpResponse::Ok().json(resource))
}

/// POST /api/resources/{id}/view
pub async fn view_resource(
    _user: AuthUser,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let resource = update_and_fetch(&data, &path, doc! { "$inc": { "views": 1_i64 } }).await?;
    Ok(HttpResponse::Ok().json(json!({ "views": resource.views })))
}
