pub mod audit;
pub mod chat;
pub mod idea;
pub mod meeting;
pub mod music;
pub mod project;
pub mod resource;
pub mod task;
pub mod timestamp;
pub mod user;

use uuid::Uuid;

/// Fresh document id; every collection keys `_id` by a v4 UUID string.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
