use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{Payload, Service, ServiceRequest, ServiceResponse, Transform},
    http, web, Error, FromRequest, HttpMessage, HttpRequest, HttpResponse, ResponseError,
};
use chrono::{Duration, Utc};
use futures::future::{ok, Ready};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::{debug, warn};
use mongodb::bson::doc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::app_state::AppState;
use crate::error::AppError;
use crate::models::user::{normalize_email, UserProfile};
use crate::policy::Role;
use crate::user_management::{create_account, verify_password};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

pub fn create_jwt(user_id: &str, secret: &str, ttl_hours: i64) -> Result<String, AppError> {
    let expiration = Utc::now() + Duration::hours(ttl_hours);
    let claims = Claims {
        sub: user_id.to_string(),
        exp: expiration.timestamp() as usize,
    };
    Ok(encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_ref()))?)
}

pub fn validate_jwt(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// Subject of a verified token, placed in request extensions by [`Authentication`].
#[derive(Debug, Clone)]
pub struct TokenSubject(pub String);

/// The authenticated caller. Handlers take this as an argument and pass it
/// on explicitly; the role is read fresh from the users collection on every
/// request so role changes apply immediately.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub name: String,
    pub role: Role,
}

impl AuthUser {
    pub fn is_elevated(&self) -> bool {
        self.role >= Role::TeamLeader
    }
}

impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let subject = req.extensions().get::<TokenSubject>().cloned();
        let data = req.app_data::<web::Data<AppState>>().cloned();
        Box::pin(async move {
            let TokenSubject(user_id) = subject.ok_or(AppError::Unauthorized)?;
            let data = data.ok_or_else(|| AppError::Internal("application state missing".into()))?;
            let user = data
                .mongodb
                .users()
                .find_one(doc! { "_id": &user_id })
                .await?
                .ok_or(AppError::Unauthorized)?;
            Ok(AuthUser { id: user.id, name: user.name, role: user.role })
        })
    }
}

/// Bearer token from the Authorization header, or the `token` query
/// parameter (browsers cannot set headers on a WebSocket upgrade).
fn bearer_token(req: &ServiceRequest) -> Option<String> {
    if let Some(header) = req.headers().get(http::header::AUTHORIZATION) {
        let value = header.to_str().ok()?;
        return value.strip_prefix("Bearer ").map(|t| t.trim().to_string());
    }
    #[derive(Deserialize)]
    struct TokenQuery {
        token: String,
    }
    web::Query::<TokenQuery>::from_query(req.query_string())
        .ok()
        .map(|q| q.into_inner().token)
}

#[derive(Debug)]
pub struct Authentication;

impl<S, B> Transform<S, ServiceRequest> for Authentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = AuthMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddleware { service })
    }
}

pub struct AuthMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for AuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        // Requests without a token pass through; handlers that need an
        // identity reject them when extracting `AuthUser`.
        if let Some(token) = bearer_token(&req) {
            let secret = req
                .app_data::<web::Data<AppState>>()
                .map(|data| data.config.jwt_secret.clone())
                .unwrap_or_default();
            match validate_jwt(&token, &secret) {
                Ok(claims) => {
                    debug!("Authenticated request for user {}", claims.sub);
                    req.extensions_mut().insert(TokenSubject(claims.sub));
                }
                Err(e) => {
                    warn!("Rejected token on {}: {}", req.path(), e);
                    let resp = AppError::Unauthorized.error_response();
                    return Box::pin(async move { Ok(req.into_response(resp)) });
                }
            }
        }

        let fut = self.service.call(req);
        Box::pin(async move {
            let res = fut.await?;
            Ok(res.map_into_boxed_body())
        })
    }
}

#[derive(Deserialize)]
pub struct RegisterInfo {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginInfo {
    pub email: String,
    pub password: String,
}

fn session_response(data: &AppState, profile: UserProfile) -> Result<HttpResponse, AppError> {
    let token = create_jwt(&profile.id, &data.config.jwt_secret, data.config.jwt_ttl_hours)?;
    Ok(HttpResponse::Ok().json(json!({ "token": token, "user": profile })))
}

/// POST /api/auth/register
pub async fn register(
    data: web::Data<AppState>,
    info: web::Json<RegisterInfo>,
) -> Result<HttpResponse, AppError> {
    let user = create_account(&data.mongodb, &info.name, &info.email, &info.password, Role::User).await?;
    session_response(&data, UserProfile::from(&user))
}

/// POST /api/auth/login
pub async fn login(
    data: web::Data<AppState>,
    info: web::Json<LoginInfo>,
) -> Result<HttpResponse, AppError> {
    let email = normalize_email(&info.email);
    let user = data
        .mongodb
        .users()
        .find_one(doc! { "email": &email })
        .await?
        .ok_or(AppError::Unauthorized)?;
    if !verify_password(&info.password, &user.password).await? {
        warn!("Failed login for {}", email);
        return Err(AppError::Unauthorized);
    }
    session_response(&data, UserProfile::from(&user))
}

/// GET /api/auth/me
pub async fn me(user: AuthUser, data: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let user = data
        .mongodb
        .users()
        .find_one(doc! { "_id": &user.id })
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;
    Ok(HttpResponse::Ok().json(UserProfile::from(&user)))
}
