//! API handlers for the relay service

use actix_web::http::header::HeaderMap;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use futures::StreamExt;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use blinkdrop_core::{Envelope, Token};

use crate::error::ServiceError;
use crate::AppState;

/// Configure API routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/session", web::post().to(create_session))
            .route("/send", web::post().to(send))
            .route("/receive", web::post().to(receive))
            .route("/health", web::get().to(health_check)),
    );
}

/// Create session response
#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub token: String,
    pub short_code: String,
    pub expires_in_seconds: u64,
    pub share_url: String,
}

/// Send response
#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub ok: bool,
    pub expires_in_seconds: u64,
}

/// Receive response
#[derive(Debug, Serialize)]
pub struct ReceiveResponse {
    pub ok: bool,
    pub message: Option<Envelope>,
}

/// Health check response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    service: String,
    version: String,
    backend: String,
}

/// Link a sender can open to target this session.
///
/// Uses the configured base URL when set, otherwise the forwarded or
/// direct host of the request. Falls back to a relative link.
pub fn share_url(base_url: Option<&str>, headers: &HeaderMap, token: &Token) -> String {
    let base = match base_url.filter(|b| !b.is_empty()) {
        Some(base) => base.strip_suffix('/').unwrap_or(base).to_string(),
        None => {
            let proto = header(headers, "x-forwarded-proto").unwrap_or("https");
            match header(headers, "x-forwarded-host").or_else(|| header(headers, "host")) {
                Some(host) => format!("{}://{}", proto, host),
                None => String::new(),
            }
        }
    };

    format!("{}/send?t={}", base, token.as_str())
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Read the whole body, refusing anything over `limit` bytes
async fn read_body(mut payload: web::Payload, limit: usize) -> Result<Value, ServiceError> {
    let mut body = web::BytesMut::new();

    while let Some(chunk) = payload.next().await {
        let chunk = chunk.map_err(|e| ServiceError::InvalidInput(e.to_string()))?;
        if body.len() + chunk.len() > limit {
            return Err(ServiceError::InvalidInput(format!(
                "request body exceeds {} bytes",
                limit
            )));
        }
        body.extend_from_slice(&chunk);
    }

    parse_body(&body)
}

fn parse_body(body: &[u8]) -> Result<Value, ServiceError> {
    let value: Value = serde_json::from_slice(body)?;
    if !value.is_object() {
        return Err(ServiceError::InvalidInput("body must be a JSON object".to_string()));
    }
    Ok(value)
}

fn identifier_field(body: &Value) -> Result<&str, ServiceError> {
    body.get("identifier")
        .and_then(Value::as_str)
        .ok_or_else(|| ServiceError::InvalidInput("identifier must be a string".to_string()))
}

/// Create a new session
async fn create_session(
    state: web::Data<AppState>,
    req: HttpRequest,
) -> ActixResult<HttpResponse, ServiceError> {
    let grant = state.service.create_session().await?;
    let share_url = share_url(state.base_url.as_deref(), req.headers(), &grant.token);

    Ok(HttpResponse::Ok().json(CreateSessionResponse {
        token: grant.token.as_str().to_string(),
        short_code: grant.short_code.as_str().to_string(),
        expires_in_seconds: grant.expires_in_seconds,
        share_url,
    }))
}

/// Deposit a message
async fn send(
    state: web::Data<AppState>,
    payload: web::Payload,
) -> ActixResult<HttpResponse, ServiceError> {
    let body = read_body(payload, state.max_request_bytes).await?;
    let identifier = identifier_field(&body)?;
    let message = body.get("message").unwrap_or(&Value::Null);

    let receipt = state.service.send(identifier, message).await?;

    Ok(HttpResponse::Ok().json(SendResponse {
        ok: true,
        expires_in_seconds: receipt.expires_in_seconds,
    }))
}

/// Collect the pending message, if any
async fn receive(
    state: web::Data<AppState>,
    payload: web::Payload,
) -> ActixResult<HttpResponse, ServiceError> {
    let body = read_body(payload, state.max_request_bytes).await?;
    let identifier = identifier_field(&body)?;

    let message = state.service.receive(identifier).await?;
    debug!("Receive poll answered (delivered: {})", message.is_some());

    Ok(HttpResponse::Ok().json(ReceiveResponse { ok: true, message }))
}

async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        service: "relay-service".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend: state.service.backend().to_string(),
    })
}
