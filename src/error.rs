use actix_web::{http::StatusCode, web, HttpResponse, ResponseError};
use log::error;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error(transparent)]
    Database(#[from] mongodb::error::Error),
    #[error(transparent)]
    Serialize(#[from] mongodb::bson::ser::Error),
    #[error(transparent)]
    Hash(#[from] bcrypt::BcryptError),
    #[error(transparent)]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error(transparent)]
    Blocking(#[from] actix_web::error::BlockingError),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(what: &str) -> Self {
        AppError::NotFound(format!("{} not found", what))
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        AppError::Forbidden(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        AppError::Conflict(msg.into())
    }

    fn is_internal(&self) -> bool {
        matches!(
            self,
            AppError::Database(_)
                | AppError::Serialize(_)
                | AppError::Hash(_)
                | AppError::Blocking(_)
                | AppError::Internal(_)
        )
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized | AppError::Token(_) => StatusCode::UNAUTHORIZED,
            AppError::Database(_)
            | AppError::Serialize(_)
            | AppError::Hash(_)
            | AppError::Blocking(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = if self.is_internal() {
            error!("Unhandled error: {}", self);
            "Something went wrong".to_string()
        } else {
            self.to_string()
        };
        HttpResponse::build(self.status_code()).json(json!({ "error": message }))
    }
}

// Extractor failures answer with the same `{"error": ...}` body as handlers.

pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _| AppError::validation(err.to_string()).into())
}

pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default().error_handler(|err, _| AppError::validation(err.to_string()).into())
}

pub fn path_config() -> web::PathConfig {
    web::PathConfig::default().error_handler(|err, _| AppError::NotFound(err.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct NameBody {
        name: String,
    }

    #[derive(Deserialize)]
    struct PageQuery {
        page: u32,
    }

    async fn echo_name(body: web::Json<NameBody>) -> HttpResponse {
        HttpResponse::Ok().body(body.into_inner().name)
    }

    async fn echo_page(query: web::Query<PageQuery>) -> HttpResponse {
        HttpResponse::Ok().body(query.page.to_string())
    }

    #[::core::prelude::v1::test]
    fn maps_taxonomy_to_status_codes() {
        assert_eq!(AppError::not_found("Task").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::validation("bad").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::forbidden("no").status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::conflict("dup").status_code(), StatusCode::CONFLICT);
        assert_eq!(AppError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::Internal("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[::core::prelude::v1::test]
    fn not_found_message_names_the_entity() {
        assert_eq!(AppError::not_found("Idea").to_string(), "Idea not found");
    }

    #[actix_web::test]
    async fn malformed_body_gets_a_json_error() {
        let app = test::init_service(
            App::new().app_data(json_config()).route("/", web::post().to(echo_name)),
        )
        .await;
        let req = test::TestRequest::post()
            .uri("/")
            .insert_header(("content-type", "application/json"))
            .set_payload(r#"{"name": 1"#)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["error"].is_string());
    }

    #[actix_web::test]
    async fn bad_query_gets_a_json_error() {
        let app = test::init_service(
            App::new().app_data(query_config()).route("/", web::get().to(echo_page)),
        )
        .await;
        let resp = test::call_service(&app, test::TestRequest::get().uri("/?page=x").to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["error"].is_string());

        let resp = test::call_service(&app, test::TestRequest::get().uri("/?page=2").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[::core::prelude::v1::test]
    fn internal_errors_hide_details() {
        let resp = AppError::Internal("secret detail".into()).error_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
