use actix_web::{web, HttpResponse};
use chrono::Utc;
use log::{debug, info};
use mongodb::bson::{doc, Document};
use mongodb::options::ReturnDocument;
use serde_json::json;

use crate::app_state::AppState;
use crate::auth::AuthUser;
use crate::db::{collect, is_duplicate_key};
use crate::error::AppError;
use crate::models::chat::{
    updates, AddMembersRequest, Chat, ChatType, CreateChatRequest, Message, SendMessageRequest,
};
use crate::notifications::Room;
use crate::policy::{authorize_owned, Action, Role};

/// The chat, if the caller takes part in it. Non-members get the same 404
/// as a missing chat.
async fn load_for(data: &AppState, chat_id: &str, user: &AuthUser) -> Result<Chat, AppError> {
    data.mongodb
        .chats()
        .find_one(doc! { "_id": chat_id, "participants": &user.id })
        .await?
        .ok_or_else(|| AppError::not_found("Chat"))
}

/// Like [`load_for`], but Admins may reach groups they are not part of.
async fn load_managed(data: &AppState, chat_id: &str, user: &AuthUser) -> Result<Chat, AppError> {
    if user.role != Role::Admin {
        return load_for(data, chat_id, user).await;
    }
    data.mongodb
        .chats()
        .find_one(doc! { "_id": chat_id })
        .await?
        .ok_or_else(|| AppError::not_found("Chat"))
}

/// Applies a field-level update and returns the stored chat.
async fn update(data: &AppState, chat_id: &str, update: Document) -> Result<Chat, AppError> {
    data.mongodb
        .chats()
        .find_one_and_update(doc! { "_id": chat_id }, update)
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::not_found("Chat"))
}

/// GET /api/chats
pub async fn list_chats(user: AuthUser, data: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let cursor = data
        .mongodb
        .chats()
        .find(doc! { "participants": &user.id })
        .sort(doc! { "updatedAt": -1 })
        .await?;
    Ok(HttpResponse::Ok().json(collect(cursor).await?))
}

/// POST /api/chats
pub async fn create_chat(
    user: AuthUser,
    data: web::Data<AppState>,
    body: web::Json<CreateChatRequest>,
) -> Result<HttpResponse, AppError> {
    let chat = Chat::new(body.into_inner(), &user.id, Utc::now())?;
    let chats = data.mongodb.chats();
    let existing = match &chat.direct_key {
        Some(key) => chats.find_one(doc! { "directKey": key }).await?,
        None => None,
    };
    chat.ensure_unique(existing.as_ref())?;
    chats.insert_one(&chat).await.map_err(|e| {
        if is_duplicate_key(&e) {
            AppError::conflict("Chat already exists")
        } else {
            e.into()
        }
    })?;
    info!("{:?} chat {} created by {}", chat.kind, chat.id, user.id);
    for other in chat.others(&user.id) {
        data.notify(Room::User(other.to_string()), "newChat", &chat);
    }
    Ok(HttpResponse::Created().json(chat))
}

/// GET /api/chats/{id}/messages
pub async fn list_messages(
    user: AuthUser,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let chat = load_for(&data, &path, &user).await?;
    let cursor = data
        .mongodb
        .messages()
        .find(doc! { "chatId": &chat.id })
        .sort(doc! { "createdAt": 1 })
        .await?;
    Ok(HttpResponse::Ok().json(collect(cursor).await?))
}

/// POST /api/chats/{id}/messages
pub async fn send_message(
    user: AuthUser,
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<SendMessageRequest>,
) -> Result<HttpResponse, AppError> {
    let mut chat = load_for(&data, &path, &user).await?;
    let message = Message::new(&chat.id, &user.id, &body.content, Utc::now())?;
    data.mongodb.messages().insert_one(&message).await?;
    chat.record_message(&message);
    let chat = update(&data, &chat.id, updates::last_message(&chat)?).await?;
    debug!("Message {} sent to chat {}", message.id, chat.id);

    data.notify(Room::Chat(chat.id.clone()), "newMessage", &message);
    for other in chat.others(&user.id) {
        data.notify(Room::User(other.to_string()), "newMessage", &message);
    }
    Ok(HttpResponse::Created().json(message))
}

/// PUT /api/chats/{id}/read
pub async fn mark_read(
    user: AuthUser,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let chat = load_for(&data, &path, &user).await?;
    let res = data
        .mongodb
        .messages()
        .update_many(
            doc! { "chatId": &chat.id, "readBy": { "$ne": &user.id } },
            doc! { "$addToSet": { "readBy": &user.id } },
        )
        .await?;
    data.notify(
        Room::Chat(chat.id.clone()),
        "messagesRead",
        &json!({ "chatId": chat.id, "userId": user.id }),
    );
    Ok(HttpResponse::Ok().json(json!({ "updated": res.modified_count })))
}

/// DELETE /api/chats/{id}
/// Any participant may delete the chat; its messages go with it.
pub async fn delete_chat(
    user: AuthUser,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let chat = load_for(&data, &path, &user).await?;
    data.mongodb.chats().delete_one(doc! { "_id": &chat.id }).await?;
    let removed = data.mongodb.messages().delete_many(doc! { "chatId": &chat.id }).await?;
    info!(
        "Chat {} deleted by {} ({} messages removed)",
        chat.id, user.id, removed.deleted_count
    );
    for other in chat.others(&user.id) {
        data.notify(Room::User(other.to_string()), "chatDeleted", &chat.id);
    }
    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}

/// POST /api/chats/{id}/members
pub async fn add_members(
    user: AuthUser,
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<AddMembersRequest>,
) -> Result<HttpResponse, AppError> {
    let mut chat = load_managed(&data, &path, &user).await?;
    if chat.kind != ChatType::Group {
        return Err(AppError::not_found("Group chat"));
    }
    authorize_owned(user.role, Action::ManageGroupMembers, chat.is_admin(&user.id))?;
    let now = Utc::now();
    let added = chat.add_members(body.into_inner().user_ids, now)?;
    let chat = update(&data, &chat.id, updates::add_members(&added, &now)).await?;
    for member in added {
        data.notify(Room::User(member), "newChat", &chat);
    }
    Ok(HttpResponse::Ok().json(chat))
}

/// DELETE /api/chats/{id}/members/{user_id}
/// Group admins and Admins remove anyone; members may remove themselves.
pub async fn remove_member(
    user: AuthUser,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, AppError> {
    let (chat_id, member_id) = path.into_inner();
    let mut chat = load_managed(&data, &chat_id, &user).await?;
    if member_id != user.id {
        authorize_owned(user.role, Action::ManageGroupMembers, chat.is_admin(&user.id))?;
    }
    let handed_over = chat.remove_member(&member_id, Utc::now())?;
    let chat = update(&data, &chat.id, updates::remove_member(&chat, &member_id, handed_over)?).await?;
    data.notify(Room::User(member_id), "removedFromChat", &chat.id);
    Ok(HttpResponse::Ok().json(chat))
}
