use actix_web::{web, HttpResponse};
use chrono::Utc;
use log::info;
use mongodb::bson::{doc, to_bson};
use serde_json::json;

use crate::app_state::AppState;
use crate::auth::AuthUser;
use crate::db::collect;
use crate::error::AppError;
use crate::models::idea::{CommentRequest, CreateIdeaRequest, Idea};
use crate::notifications::Room;
use crate::policy::{authorize_owned, Action};
use crate::user_management::{populate, refs_by_id};

async fn load(data: &AppState, id: &str) -> Result<Idea, AppError> {
    data.mongodb
        .ideas()
        .find_one(doc! { "_id": id })
        .await?
        .ok_or_else(|| AppError::not_found("Idea"))
}

/// GET /api/ideas
pub async fn list_ideas(_user: AuthUser, data: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let cursor = data.mongodb.ideas().find(doc! {}).sort(doc! { "createdAt": -1 }).await?;
    let ideas = collect(cursor).await?;
    let refs = refs_by_id(&data.mongodb, ideas.iter().map(|i| i.created_by.clone()).collect::<Vec<_>>()).await?;
    let ideas = ideas
        .iter()
        .map(|i| populate(i, &["createdBy"], &refs))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(HttpResponse::Ok().json(ideas))
}

/// POST /api/ideas
pub async fn create_idea(
    user: AuthUser,
    data: web::Data<AppState>,
    body: web::Json<CreateIdeaRequest>,
) -> Result<HttpResponse, AppError> {
    let idea = Idea::new(body.into_inner(), &user.id, Utc::now())?;
    data.mongodb.ideas().insert_one(&idea).await?;
    info!("Idea {} created by {}", idea.id, user.id);
    data.notify(Room::Ideas, "newIdea", &idea);
    Ok(HttpResponse::Created().json(idea))
}

/// DELETE /api/ideas/{id}
pub async fn delete_idea(
    user: AuthUser,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let idea = load(&data, &path).await?;
    authorize_owned(user.role, Action::DeleteIdea, idea.created_by == user.id)?;
    data.mongodb.ideas().delete_one(doc! { "_id": &idea.id }).await?;
    data.notify(Room::Ideas, "ideaDeleted", &idea.id);
    Ok(HttpResponse::Ok().json(json!({ "message": "Idea deleted successfully" })))
}

/// POST /api/ideas/{id}/vote
pub async fn vote_idea(
    user: AuthUser,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let mut idea = load(&data, &path).await?;
    let update = if idea.toggle_vote(&user.id) {
        doc! { "$addToSet": { "votes": &user.id } }
    } else {
        doc! { "$pull": { "votes": &user.id } }
    };
    data.mongodb.ideas().update_one(doc! { "_id": &idea.id }, update).await?;
    data.notify(Room::Ideas, "ideaVoted", &idea);
    Ok(HttpResponse::Ok().json(idea))
}

/// POST /api/ideas/{id}/comments
pub async fn add_comment(
    user: AuthUser,
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<CommentRequest>,
) -> Result<HttpResponse, AppError> {
    let mut idea = load(&data, &path).await?;
    let comment = to_bson(idea.add_comment(&user.id, &body.comment, Utc::now())?)?;
    data.mongodb
        .ideas()
        .update_one(doc! { "_id": &idea.id }, doc! { "$push": { "comments": comment } })
        .await?;
    data.notify(Room::Ideas, "newComment", &idea);
    Ok(HttpResponse::Ok().json(idea))
}
