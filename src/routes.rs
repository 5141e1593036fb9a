use std::{convert::Infallible, fmt};

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;
use warp::{
    body::BodyDeserializeError,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    path,
    reject::{LengthRequired, MethodNotAllowed, PayloadTooLarge, UnsupportedMediaType},
    Filter, Rejection, Reply,
};

use crate::{
    api::build_clinic_route_filter,
    auth::Auth,
    authorization_header_ext::AuthorizationHeaderExt,
    clinic::Clinic,
    error::{ApiError, AuthError},
    types::{Identity, Username},
};

const MAX_JSON_BODY: u64 = 64 * 1024;

pub fn build_api_route_filter(
    auth: &Auth,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let register = path!("api" / "register")
        .and(warp::post())
        .and(json_body())
        .and(with_auth_state(auth.clone()))
        .and_then(user_register);

    let login = path!("api" / "login")
        .and(warp::post())
        .and(json_body())
        .and(with_auth_state(auth.clone()))
        .and_then(user_login);

    register.or(login)
}

/// The whole HTTP surface: auth routes, gated clinic routes, JSON error
/// rendering, CORS for the dashboard and per-request tracing.
pub fn build_app_filter(
    auth: &Auth,
    clinic: &Clinic,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let cors = warp::cors()
        .allow_any_origin()
        .allow_headers(vec!["content-type", "authorization"])
        .allow_methods(vec!["GET", "POST", "PUT", "OPTIONS"]);

    build_api_route_filter(auth)
        .or(build_clinic_route_filter(auth, clinic))
        .recover(handle_rejection)
        .with(cors)
        .with(warp::trace::request())
}

/// Gate in front of protected routes: admits the request and extracts the
/// caller's [`Identity`], or rejects with [`AuthError::NoTokenProvided`] /
/// [`AuthError::TokenError`].
pub fn with_auth(auth: &Auth) -> impl Filter<Extract = (Identity,), Error = Rejection> + Clone {
    warp::header::headers_cloned()
        .and(with_auth_state(auth.clone()))
        .and_then(user_auth_check)
}

pub(crate) fn json_body<T>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone
where
    T: for<'de> Deserialize<'de> + Send,
{
    warp::body::content_length_limit(MAX_JSON_BODY).and(warp::body::json())
}

/// Turn every rejection into a JSON `{ "error": ... }` body. Internal details
/// are logged, never returned.
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if let Some(auth_error) = err.find::<AuthError>() {
        if auth_error.status() == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = ?auth_error, "auth request failed");
        }
        (auth_error.status(), auth_error.public_message().to_string())
    } else if let Some(api_error) = err.find::<ApiError>() {
        if api_error.status().is_server_error() {
            error!(error = ?api_error, "request failed");
        }
        (api_error.status(), api_error.public_message())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not Found".to_string())
    } else if let Some(e) = err.find::<BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("Invalid request body: {}", e))
    } else if err.find::<PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large".to_string())
    } else if err.find::<UnsupportedMediaType>().is_some() {
        (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Expected an application/json body".to_string(),
        )
    } else if err.find::<LengthRequired>().is_some() {
        (StatusCode::LENGTH_REQUIRED, "Content-Length required".to_string())
    } else if err.find::<MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed".to_string())
    } else {
        error!(rejection = ?err, "unhandled rejection");
        (StatusCode::INTERNAL_SERVER_ERROR, "Server Error".to_string())
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&json!({ "error": message })),
        status,
    ))
}

#[derive(Deserialize)]
pub struct RegisterQuery {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for RegisterQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterQuery")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Serialize)]
pub struct RegisteredUser {
    pub id: i64,
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: &'static str,
    pub user: RegisteredUser,
}

async fn user_register(input: RegisterQuery, auth: Auth) -> Result<impl Reply, Rejection> {
    let record = auth
        .register(&Username(input.username), &input.password)
        .await?;

    Ok(warp::reply::json(&RegisterResponse {
        message: "Staff member registered successfully!",
        user: RegisteredUser {
            id: record.id.0,
            username: record.username.0,
        },
    }))
}

#[derive(Deserialize)]
pub struct LoginQuery {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for LoginQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginQuery")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: &'static str,
    pub token: String,
}

async fn user_login(input: LoginQuery, auth: Auth) -> Result<impl Reply, Rejection> {
    let token = auth
        .login(&Username(input.username), &input.password)
        .await?;

    Ok(warp::reply::json(&LoginResponse {
        message: "Login successful!",
        token,
    }))
}

// Unwrap the bearer token and validate it
async fn user_auth_check(headers: HeaderMap, auth: Auth) -> Result<Identity, Rejection> {
    let header = match headers.get(AUTHORIZATION) {
        Some(value) => value
            .to_str()
            .map_err(|_| AuthError::TokenError { source: None })?,
        None => return Err(AuthError::NoTokenProvided.into()),
    };
    let token = header.bearer_token().ok_or(AuthError::NoTokenProvided)?;

    Ok(auth.verify_token(token)?)
}

// functor that adds the auth state into the filter chain
fn with_auth_state(auth: Auth) -> impl Filter<Extract = (Auth,), Error = Infallible> + Clone {
    warp::any().map(move || auth.clone())
}
