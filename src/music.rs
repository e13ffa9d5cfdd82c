use actix_web::{web, HttpResponse};
use chrono::Utc;
use log::info;
use mongodb::bson::doc;
use mongodb::options::ReturnDocument;
use serde_json::json;

use crate::app_state::AppState;
use crate::auth::AuthUser;
use crate::db::collect;
use crate::error::AppError;
use crate::models::music::{Music, MusicRequest, UpdateMusicRequest};
use crate::policy::{authorize, Action};

/// GET /api/music
pub async fn list_music(_user: AuthUser, data: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let cursor = data
        .mongodb
        .music()
        .find(doc! { "isActive": true })
        .sort(doc! { "createdAt": -1 })
        .await?;
    Ok(HttpResponse::Ok().json(collect(cursor).await?))
}

/// POST /api/music
pub async fn add_music(
    user: AuthUser,
    data: web::Data<AppState>,
    body: web::Json<MusicRequest>,
) -> Result<HttpResponse, AppError> {
    authorize(user.role, Action::ManageMusic)?;
    let music = Music::new(body.into_inner(), &user.id, Utc::now())?;
    data.mongodb.music().insert_one(&music).await?;
    info!("Music {} added by {}", music.id, user.id);
    data.broadcast("newMusic", &music);
    Ok(HttpResponse::Created().json(music))
}

/// PUT /api/music/{id}
pub async fn update_music(
    user: AuthUser,
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<UpdateMusicRequest>,
) -> Result<HttpResponse, AppError> {
    authorize(user.role, Action::ManageMusic)?;
    let mut music = data
        .mongodb
        .music()
        .find_one(doc! { "_id": path.as_str() })
        .await?
        .ok_or_else(|| AppError::not_found("Music"))?;
    music.apply_update(body.into_inner(), Utc::now())?;
    let music = data
        .mongodb
        .music()
        .find_one_and_update(doc! { "_id": &music.id }, music.edit_update())
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::not_found("Music"))?;
    data.broadcast("musicUpdated", &music);
    Ok(HttpResponse::Ok().json(music))
}

/// DELETE /api/music/{id}
pub async fn delete_music(
    user: AuthUser,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    authorize(user.role, Action::ManageMusic)?;
    let id = path.into_inner();
    let res = data.mongodb.music().delete_one(doc! { "_id": &id }).await?;
    if res.deleted_count == 0 {
        return Err(AppError::not_found("Music"));
    }
    data.broadcast("musicDeleted", &id);
    Ok(HttpResponse::Ok().json(json!({ "message": "Music deleted successfully" })))
}
