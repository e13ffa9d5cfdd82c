use log::{info, warn};
use mongodb::bson::doc;

use crate::config::AdminSeed;
use crate::db::MongoDB;
use crate::error::AppError;
use crate::models::user::normalize_email;
use crate::policy::Role;
use crate::user_management::create_account;

/// Creates the bootstrap administrator unless an account with that email
/// already exists. An existing account keeps its role and password.
pub async fn ensure_admin(mongodb: &MongoDB, seed: &AdminSeed) -> Result<(), AppError> {
    let email = normalize_email(&seed.email);
    if let Some(existing) = mongodb.users().find_one(doc! { "email": &email }).await? {
        if existing.role != Role::Admin {
            warn!("Seed admin {} exists with role {:?}; leaving it unchanged", email, existing.role);
        }
        return Ok(());
    }
    match create_account(mongodb, &seed.name, &email, &seed.password, Role::Admin).await {
        Ok(user) => {
            info!("Seeded admin account {}", user.email);
            Ok(())
        }
        // Another instance seeded it first.
        Err(AppError::Conflict(_)) => Ok(()),
        Err(e) => Err(e),
    }
}
