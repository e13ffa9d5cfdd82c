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
use crate::models::meeting::{updates, CreateMeetingRequest, Meeting, RespondRequest, UpdateMeetingRequest};
use crate::notifications::Room;

/// Meetings are only visible to their organiser through these lookups; the
/// same 404 is returned whether the meeting is missing or not theirs.
async fn load_organised(data: &AppState, id: &str, user: &AuthUser) -> Result<Meeting, AppError> {
    data.mongodb
        .meetings()
        .find_one(doc! { "_id": id, "createdBy": &user.id })
        .await?
        .ok_or_else(|| AppError::not_found("Meeting"))
}

async fn update(data: &AppState, filter: Document, update: Document) -> Result<Meeting, AppError> {
    data.mongodb
        .meetings()
        .find_one_and_update(filter, update)
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::not_found("Meeting"))
}

fn notify_participants<T: serde::Serialize>(data: &AppState, meeting: &Meeting, event: &'static str, payload: &T) {
    for id in meeting.participant_ids() {
        data.notify(Room::User(id.to_string()), event, payload);
    }
}

/// GET /api/meetings
pub async fn list_meetings(user: AuthUser, data: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let filter = doc! {
        "$or": [
            { "createdBy": &user.id },
            { "participants.userId": &user.id },
        ]
    };
    let cursor = data.mongodb.meetings().find(filter).sort(doc! { "date": 1 }).await?;
    Ok(HttpResponse::Ok().json(collect(cursor).await?))
}

/// POST /api/meetings
pub async fn create_meeting(
    user: AuthUser,
    data: web::Data<AppState>,
    body: web::Json<CreateMeetingRequest>,
) -> Result<HttpResponse, AppError> {
    let meeting = Meeting::new(body.into_inner(), &user.id, Utc::now())?;
    data.mongodb.meetings().insert_one(&meeting).await?;
    info!("Meeting {} scheduled by {}", meeting.id, user.id);
    notify_participants(&data, &meeting, "newMeeting", &meeting);
    Ok(HttpResponse::Created().json(meeting))
}

/// PUT /api/meetings/{id}
pub async fn update_meeting(
    user: AuthUser,
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<UpdateMeetingRequest>,
) -> Result<HttpResponse, AppError> {
    let mut meeting = load_organised(&data, &path, &user).await?;
    meeting.apply_update(body.into_inner(), Utc::now())?;
    let meeting = update(&data, doc! { "_id": &meeting.id }, updates::details(&meeting)?).await?;
    notify_participants(&data, &meeting, "meetingUpdated", &meeting);
    Ok(HttpResponse::Ok().json(meeting))
}

/// POST /api/meetings/{id}/respond
pub async fn respond_to_meeting(
    user: AuthUser,
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<RespondRequest>,
) -> Result<HttpResponse, AppError> {
    let mut meeting = data
        .mongodb
        .meetings()
        .find_one(doc! { "_id": path.as_str(), "participants.userId": &user.id })
        .await?
        .ok_or_else(|| AppError::not_found("Meeting"))?;
    let now = Utc::now();
    meeting.respond(&user.id, body.status, now)?;
    let filter = doc! { "_id": &meeting.id, "participants.userId": &user.id };
    let meeting = update(&data, filter, updates::response(body.status, &now)?).await?;
    data.notify(
        Room::User(meeting.created_by.clone()),
        "meetingResponseUpdated",
        &json!({ "meetingId": meeting.id, "userId": user.id, "status": body.status }),
    );
    Ok(HttpResponse::Ok().json(meeting))
}

/// DELETE /api/meetings/{id}
pub async fn delete_meeting(
    user: AuthUser,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let meeting = load_organised(&data, &path, &user).await?;
    data.mongodb.meetings().delete_one(doc! { "_id": &meeting.id }).await?;
    info!("Meeting {} cancelled by {}", meeting.id, user.id);
    notify_participants(&data, &meeting, "meetingCancelled", &meeting.id);
    Ok(HttpResponse::Ok().json(json!({ "message": "Meeting cancelled successfully" })))
}
