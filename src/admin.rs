//! `/api/admin`: user administration and the activity log. Every handler
//! requires the Admin role.

use actix_web::{web, HttpResponse};
use chrono::Utc;
use log::info;
use mongodb::bson::{doc, to_bson, Document};
use mongodb::options::ReturnDocument;
use serde::Serialize;
use serde_json::json;

use crate::app_state::AppState;
use crate::auth::AuthUser;
use crate::db::{collect, is_duplicate_key};
use crate::error::AppError;
use crate::models::user::{normalize_email, CreateUserRequest, UpdateRoleRequest, UpdateUserRequest, User, UserProfile};
use crate::policy::{authorize, Action, Role};
use crate::models::timestamp;
use crate::user_management::{create_account, hash_password, validate_password, validate_profile};

#[derive(Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_users: usize,
    pub team_leaders: usize,
    pub regular_users: usize,
    pub admins: usize,
}

impl UserStats {
    pub fn from_roles(roles: impl IntoIterator<Item = Role>) -> Self {
        roles.into_iter().fold(Self::default(), |mut stats, role| {
            stats.total_users += 1;
            match role {
                Role::User => stats.regular_users += 1,
                Role::TeamLeader => stats.team_leaders += 1,
                Role::Admin => stats.admins += 1,
            }
            stats
        })
    }
}

async fn load_user(data: &AppState, id: &str) -> Result<User, AppError> {
    data.mongodb
        .users()
        .find_one(doc! { "_id": id })
        .await?
        .ok_or_else(|| AppError::not_found("User"))
}

/// Applies `$set` fields plus a fresh `updatedAt`, returning the stored user.
async fn set_user_fields(data: &AppState, id: &str, mut fields: Document) -> Result<User, AppError> {
    fields.insert("updatedAt", timestamp::to_bson(&Utc::now()));
    data.mongodb
        .users()
        .find_one_and_update(doc! { "_id": id }, doc! { "$set": fields })
        .return_document(ReturnDocument::After)
        .await
        .map_err(|e| {
            if is_duplicate_key(&e) {
                AppError::conflict("Email already exists")
            } else {
                e.into()
            }
        })?
        .ok_or_else(|| AppError::not_found("User"))
}

/// Admins may not demote or delete themselves.
fn ensure_not_self(admin: &AuthUser, target_id: &str, action: &str) -> Result<(), AppError> {
    if admin.id == target_id {
        return Err(AppError::validation(format!("Cannot {}", action)));
    }
    Ok(())
}

/// GET /api/admin/users
pub async fn list_users(admin: AuthUser, data: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    authorize(admin.role, Action::ManageUsers)?;
    let cursor = data.mongodb.users().find(doc! {}).sort(doc! { "createdAt": -1 }).await?;
    let users: Vec<UserProfile> = collect(cursor).await?.iter().map(UserProfile::from).collect();
    Ok(HttpResponse::Ok().json(users))
}

/// POST /api/admin/users
pub async fn create_user(
    admin: AuthUser,
    data: web::Data<AppState>,
    body: web::Json<CreateUserRequest>,
) -> Result<HttpResponse, AppError> {
    authorize(admin.role, Action::ManageUsers)?;
    let req = body.into_inner();
    let user = create_account(
        &data.mongodb,
        &req.name,
        &req.email,
        &req.password,
        req.role.unwrap_or_default(),
    )
    .await?;
    Ok(HttpResponse::Created().json(UserProfile::from(&user)))
}

/// PUT /api/admin/users/{id}
pub async fn update_user(
    admin: AuthUser,
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<UpdateUserRequest>,
) -> Result<HttpResponse, AppError> {
    authorize(admin.role, Action::ManageUsers)?;
    let user = load_user(&data, &path).await?;
    let req = body.into_inner();

    let name = req.name.unwrap_or_else(|| user.name.clone());
    let email = req.email.map(|e| normalize_email(&e)).unwrap_or_else(|| user.email.clone());
    validate_profile(&name, &email)?;
    if let Some(password) = &req.password {
        validate_password(password)?;
    }

    if email != user.email {
        let taken = data
            .mongodb
            .users()
            .find_one(doc! { "email": &email, "_id": { "$ne": &user.id } })
            .await?;
        if taken.is_some() {
            return Err(AppError::conflict("Email already exists"));
        }
    }

    let mut fields = doc! { "name": name.trim(), "email": email };
    if let Some(password) = req.password {
        fields.insert("password", hash_password(&password).await?);
    }
    let user = set_user_fields(&data, &user.id, fields).await?;
    info!("User {} updated by admin {}", user.id, admin.id);
    Ok(HttpResponse::Ok().json(UserProfile::from(&user)))
}

/// PUT /api/admin/users/{id}/role
pub async fn update_user_role(
    admin: AuthUser,
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<UpdateRoleRequest>,
) -> Result<HttpResponse, AppError> {
    authorize(admin.role, Action::ManageUsers)?;
    ensure_not_self(&admin, &path, "change your own role")?;
    let user = set_user_fields(&data, &path, doc! { "role": to_bson(&body.role)? }).await?;
    info!("User {} is now {:?} (changed by {})", user.id, user.role, admin.id);
    Ok(HttpResponse::Ok().json(UserProfile::from(&user)))
}

/// DELETE /api/admin/users/{id}
pub async fn delete_user(
    admin: AuthUser,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    authorize(admin.role, Action::ManageUsers)?;
    ensure_not_self(&admin, &path, "delete your own account")?;
    let res = data.mongodb.users().delete_one(doc! { "_id": path.as_str() }).await?;
    if res.deleted_count == 0 {
        return Err(AppError::not_found("User"));
    }
    info!("User {} deleted by admin {}", path, admin.id);
    Ok(HttpResponse::Ok().json(json!({ "message": "User deleted successfully" })))
}

/// GET /api/admin/stats
pub async fn user_stats(admin: AuthUser, data: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    authorize(admin.role, Action::ManageUsers)?;
    let users = collect(data.mongodb.users().find(doc! {}).await?).await?;
    Ok(HttpResponse::Ok().json(UserStats::from_roles(users.into_iter().map(|u| u.role))))
}

/// GET /api/admin/activity-logs
pub async fn activity_log(admin: AuthUser, data: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    authorize(admin.role, Action::ManageUsers)?;
    Ok(HttpResponse::Ok().json(data.tasks.audit_entries().await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_count_each_role() {
        let stats = UserStats::from_roles([Role::User, Role::Admin, Role::User, Role::TeamLeader]);
        assert_eq!(
            stats,
            UserStats { total_users: 4, team_leaders: 1, regular_users: 2, admins: 1 }
        );
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["teamLeaders"], 1);
        assert_eq!(json["regularUsers"], 2);
    }

    #[test]
    fn admins_cannot_target_themselves() {
        let admin = AuthUser { id: "admin-1".into(), name: "Root".into(), role: Role::Admin };
        match ensure_not_self(&admin, "admin-1", "change your own role") {
            Err(AppError::Validation(msg)) => assert_eq!(msg, "Cannot change your own role"),
            other => panic!("expected a validation error, got {:?}", other),
        }
        assert!(matches!(
            ensure_not_self(&admin, "admin-1", "delete your own account"),
            Err(AppError::Validation(_))
        ));
        assert!(ensure_not_self(&admin, "user-2", "delete your own account").is_ok());
    }

    #[test]
    fn empty_directory_has_zero_stats() {
        assert_eq!(UserStats::from_roles([]), UserStats::default());
    }
}
