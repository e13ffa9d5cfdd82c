mod admin;
mod app_state;
mod auth;
mod chats;
mod config;
mod db;
mod error;
mod ideas;
mod meetings;
mod models;
mod music;
mod notifications;
mod policy;
mod projects;
mod resources;
mod seed;
mod stage_tracker;
mod task_service;
mod task_store;
mod tasks;
mod user_management;
mod ws;

use std::io;
use std::sync::Arc;

use actix::Actor;
use actix_cors::Cors;
use actix_web::{http, middleware::Logger, web, App, HttpResponse, HttpServer};
use env_logger::Env;
use log::{error, info};

use crate::app_state::AppState;
use crate::auth::Authentication;
use crate::config::Config;
use crate::db::MongoDB;
use crate::notifications::NotificationHub;
use crate::task_store::{MongoTaskStore, TaskStore};

async fn welcome() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "message": "Welcome to the Team Collaboration API" }))
}

fn api_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .route("/register", web::post().to(auth::register))
            .route("/login", web::post().to(auth::login))
            .route("/me", web::get().to(auth::me)),
    )
    // TASKS: fixed paths before `/{id}`
    .service(
        web::scope("/tasks")
            .route("", web::get().to(tasks::list_tasks))
            .route("", web::post().to(tasks::create_task))
            .route("/status-history", web::get().to(tasks::status_history))
            .route("/stage-content", web::post().to(tasks::save_stage_content))
            .route("/{id}", web::get().to(tasks::get_task))
            .route("/{id}", web::put().to(tasks::update_task))
            .route("/{id}", web::delete().to(tasks::delete_task))
            .route("/{id}/stage", web::put().to(tasks::move_stage))
            .route("/{id}/stages", web::get().to(tasks::list_stages))
            .route("/{id}/stage-content/{stage_name}", web::get().to(tasks::get_stage_content)),
    )
    .service(
        web::scope("/ideas")
            .route("", web::get().to(ideas::list_ideas))
            .route("", web::post().to(ideas::create_idea))
            .route("/{id}", web::delete().to(ideas::delete_idea))
            .route("/{id}/vote", web::post().to(ideas::vote_idea))
            .route("/{id}/comment", web::post().to(ideas::add_comment)),
    )
    .service(
        web::scope("/resources")
            .route("", web::get().to(resources::list_resources))
            .route("", web::post().to(resources::create_resource))
            .route("/{id}", web::get().to(resources::get_resource))
            .route("/{id}", web::put().to(resources::update_resource))
            .route("/{id}", web::delete().to(resources::delete_resource))
            .route("/{id}/like", web::post().to(resources::like_resource))
            .route("/{id}/view", web::post().to(resources::view_resource)),
    )
    .service(
        web::scope("/projects")
            .route("", web::get().to(projects::list_projects))
            .route("", web::post().to(projects::create_project))
            .route("/{id}", web::get().to(projects::get_project))
            .route("/{id}", web::put().to(projects::update_project))
            .route("/{id}", web::delete().to(projects::delete_project))
            .route("/{id}/timeline", web::post().to(projects::add_timeline_entry))
            .route("/{id}/timeline/{entry_id}", web::put().to(projects::update_timeline_entry))
            .route("/{id}/timeline/{entry_id}", web::delete().to(projects::delete_timeline_entry)),
    )
    .service(
        web::scope("/chats")
            .route("", web::get().to(chats::list_chats))
            .route("", web::post().to(chats::create_chat))
            .route("/users", web::get().to(user_management::available_users))
            .route("/{id}", web::delete().to(chats::delete_chat))
            .route("/{id}/messages", web::get().to(chats::list_messages))
            .route("/{id}/messages", web::post().to(chats::send_message))
            .route("/{id}/read", web::put().to(chats::mark_read))
            .route("/{id}/members", web::post().to(chats::add_members))
            .route("/{id}/members/{user_id}", web::delete().to(chats::remove_member)),
    )
    .service(
        web::scope("/meetings")
            .route("", web::get().to(meetings::list_meetings))
            .route("", web::post().to(meetings::create_meeting))
            .route("/{id}", web::put().to(meetings::update_meeting))
            .route("/{id}", web::delete().to(meetings::delete_meeting))
            .route("/{id}/respond", web::post().to(meetings::respond_to_meeting)),
    )
    .service(
        web::scope("/music")
            .route("", web::get().to(music::list_music))
            .route("", web::post().to(music::add_music))
            .route("/{id}", web::put().to(music::update_music))
            .route("/{id}", web::delete().to(music::delete_music)),
    )
    .service(
        web::scope("/users")
            .route("", web::get().to(user_management::list_users))
            .route("/search", web::get().to(user_management::search_users))
            .route("/{id}", web::get().to(user_management::get_user_by_id)),
    )
    .service(
        web::scope("/admin")
            .route("/users", web::get().to(admin::list_users))
            .route("/users", web::post().to(admin::create_user))
            .route("/users/{id}", web::put().to(admin::update_user))
            .route("/users/{id}", web::delete().to(admin::delete_user))
            .route("/users/{id}/role", web::put().to(admin::update_user_role))
            .route("/stats", web::get().to(admin::user_stats))
            .route("/activity-logs", web::get().to(admin::activity_log)),
    );
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = Config::from_env().map_err(|e| {
        error!("Invalid configuration: {}", e);
        io::Error::new(io::ErrorKind::InvalidInput, e)
    })?;

    let mongodb = MongoDB::init(&config.mongo_uri, &config.database_name)
        .await
        .map(Arc::new)
        .map_err(|e| {
            error!("Could not connect to MongoDB: {}", e);
            io::Error::new(io::ErrorKind::Other, e)
        })?;
    info!("Connected to MongoDB database {}", config.database_name);

    if let Some(seed) = &config.admin_seed {
        if let Err(e) = seed::ensure_admin(&mongodb, seed).await {
            error!("Admin seed failed: {}", e);
        }
    }

    let hub = NotificationHub::default().start();
    let tasks: Arc<dyn TaskStore> = Arc::new(MongoTaskStore::new(mongodb.clone()));
    let state = web::Data::new(AppState { hub, mongodb, tasks, config: config.clone() });

    info!("Server running at http://{}", config.bind_addr);
    info!("Allowed CORS origins: {:?}", config.frontend_origins);

    let origins = config.frontend_origins.clone();
    HttpServer::new(move || {
        let cors = origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                http::header::CONTENT_TYPE,
                http::header::ACCEPT,
                http::header::AUTHORIZATION,
            ])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(Authentication)
            .wrap(cors)
            .wrap(Logger::default())
            .app_data(state.clone())
            .app_data(error::json_config())
            .app_data(error::query_config())
            .app_data(error::path_config())
            .route("/", web::get().to(welcome))
            .service(web::scope("/api").configure(api_routes))
            .service(web::resource("/ws").route(web::get().to(ws::ws_index)))
    })
    .bind(&config.bind_addr)?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test};

    #[actix_web::test]
    async fn idea_comments_post_to_singular_path() {
        let app = test::init_service(
            App::new().app_data(error::json_config()).service(web::scope("/api").configure(api_routes)),
        )
        .await;

        // Anonymous callers reach the handler and are turned away by it.
        let req = test::TestRequest::post()
            .uri("/api/ideas/idea-1/comment")
            .set_json(serde_json::json!({ "comment": "Nice" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::post()
            .uri("/api/ideas/idea-1/comments")
            .set_json(serde_json::json!({ "comment": "Nice" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
