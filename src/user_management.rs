use std::collections::HashMap;

use actix_web::{web, HttpResponse};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::Utc;
use log::info;
use mongodb::bson::doc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::app_state::AppState;
use crate::auth::AuthUser;
use crate::db::{collect, is_duplicate_key, MongoDB};
use crate::error::AppError;
use crate::models::new_id;
use crate::models::user::{normalize_email, User, UserProfile};
use crate::policy::Role;

/// Public directory entry.
#[derive(Debug, Serialize)]
pub struct UserSummary {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        Self { id: user.id, name: user.name, email: user.email, role: user.role }
    }
}

pub fn validate_profile(name: &str, email: &str) -> Result<(), AppError> {
    if name.trim().is_empty() {
        return Err(AppError::validation("Name is required"));
    }
    let email = normalize_email(email);
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::validation("A valid email is required"));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), AppError> {
    if password.len() < 6 {
        return Err(AppError::validation("Password must be at least 6 characters"));
    }
    Ok(())
}

pub fn validate_account(name: &str, email: &str, password: &str) -> Result<(), AppError> {
    validate_profile(name, email)?;
    validate_password(password)
}

/// bcrypt on the blocking pool; it is too slow for a worker thread.
pub async fn hash_password(password: &str) -> Result<String, AppError> {
    let password = password.to_string();
    Ok(web::block(move || hash(password, DEFAULT_COST)).await??)
}

/// False for a wrong password and for a malformed stored hash.
pub async fn verify_password(password: &str, hashed: &str) -> Result<bool, AppError> {
    let (password, hashed) = (password.to_string(), hashed.to_string());
    Ok(web::block(move || verify(password, &hashed).unwrap_or(false)).await?)
}

/// Creates a user with a hashed password. Duplicate emails are a conflict.
pub async fn create_account(
    mongodb: &MongoDB,
    name: &str,
    email: &str,
    password: &str,
    role: Role,
) -> Result<User, AppError> {
    validate_account(name, email, password)?;
    let email = normalize_email(email);
    let users = mongodb.users();
    if users.find_one(doc! { "email": &email }).await?.is_some() {
        return Err(AppError::conflict("Email already exists"));
    }

    let now = Utc::now();
    let user = User {
        id: new_id(),
        name: name.trim().to_string(),
        email,
        password: hash_password(password).await?,
        role,
        is_verified: true,
        created_at: now,
        updated_at: now,
    };
    users.insert_one(&user).await.map_err(|e| {
        if is_duplicate_key(&e) {
            AppError::conflict("Email already exists")
        } else {
            e.into()
        }
    })?;
    info!("User created: {} ({:?})", user.email, user.role);
    Ok(user)
}

/// The `{_id, name, email}` shape that replaces a bare user id in list responses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRef {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
}

/// Looks up a set of user ids; unknown ids are absent from the map.
pub async fn refs_by_id(
    mongodb: &MongoDB,
    ids: impl IntoIterator<Item = String>,
) -> Result<HashMap<String, UserRef>, AppError> {
    let mut ids: Vec<String> = ids.into_iter().collect();
    ids.sort();
    ids.dedup();
    let cursor = mongodb.users().find(doc! { "_id": { "$in": ids } }).await?;
    Ok(collect(cursor)
        .await?
        .into_iter()
        .map(|u| (u.id.clone(), UserRef { id: u.id, name: u.name, email: u.email }))
        .collect())
}

pub async fn names_by_id(
    mongodb: &MongoDB,
    ids: impl IntoIterator<Item = String>,
) -> Result<HashMap<String, String>, AppError> {
    Ok(refs_by_id(mongodb, ids).await?.into_iter().map(|(id, r)| (id, r.name)).collect())
}

/// Serialises `item` and swaps the user ids held in `fields` (a single id or
/// an array of ids) for their [`UserRef`]. Ids with no match are left as is.
pub fn populate<T: Serialize>(
    item: &T,
    fields: &[&str],
    refs: &HashMap<String, UserRef>,
) -> Result<Value, AppError> {
    let mut value = serde_json::to_value(item).map_err(|e| AppError::Internal(e.to_string()))?;
    let swap = |v: &mut Value| {
        if let Some(user) = v.as_str().and_then(|id| refs.get(id)) {
            *v = json!(user);
        }
    };
    for field in fields {
        match value.get_mut(*field) {
            Some(Value::Array(ids)) => ids.iter_mut().for_each(swap),
            Some(v) => swap(v),
            None => {}
        }
    }
    Ok(value)
}

/// GET /api/users
pub async fn list_users(
    _user: AuthUser,
    data: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let cursor = data.mongodb.users().find(doc! {}).sort(doc! { "name": 1 }).await?;
    let users: Vec<UserSummary> = collect(cursor).await?.into_iter().map(Into::into).collect();
    Ok(HttpResponse::Ok().json(users))
}

/// GET /api/users/{id}
pub async fn get_user_by_id(
    _user: AuthUser,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let user = data
        .mongodb
        .users()
        .find_one(doc! { "_id": path.into_inner() })
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;
    Ok(HttpResponse::Ok().json(UserProfile::from(&user)))
}

#[derive(Debug, Deserialize)]
pub struct FindUserQuery {
    pub query: String,
}

/// GET /api/users/search?query=
/// Case-insensitive match on name or email.
pub async fn search_users(
    _user: AuthUser,
    data: web::Data<AppState>,
    query: web::Query<FindUserQuery>,
) -> Result<HttpResponse, AppError> {
    let pattern = regex::escape(query.query.trim());
    let filter = doc! {
        "$or": [
            { "email": { "$regex": &pattern, "$options": "i" } },
            { "name": { "$regex": &pattern, "$options": "i" } },
        ]
    };
    let cursor = data.mongodb.users().find(filter).sort(doc! { "name": 1 }).await?;
    let users: Vec<UserSummary> = collect(cursor).await?.into_iter().map(Into::into).collect();
    Ok(HttpResponse::Ok().json(users))
}

/// GET /api/chats/users
/// Everyone the caller could start a chat with.
pub async fn available_users(
    user: AuthUser,
    data: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let cursor = data
        .mongodb
        .users()
        .find(doc! { "_id": { "$ne": &user.id } })
        .sort(doc! { "name": 1 })
        .await?;
    let users: Vec<UserSummary> = collect(cursor).await?.into_iter().map(Into::into).collect();
    Ok(HttpResponse::Ok().json(users))
}
