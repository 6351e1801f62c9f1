/// REST API routes for the vault.
///
/// Handlers stay thin: authenticate, fetch rows, run the envelope
/// operation, answer. Responses use the service's two historical JSON
/// shapes: `{"response": ...}` for outcomes and `{"error": ...}` for
/// failures; key material goes out as `{"name": ..., "key": ...}` exactly
/// once, at creation time.
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::auth::{self, AuthKey, ErrorResponse};
use super::AppState;
use crate::crypto::sensitive::SensitiveVec;
use crate::error::VaultError;
use crate::master;
use crate::secrets::{Key, Secret};
use crate::state::LIST_PAGE_SIZE;

// ─── Error mapping ───────────────────────────────────────

/// A handler failure carrying the status code it maps to.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<VaultError> for ApiError {
    fn from(err: VaultError) -> Self {
        let status = match &err {
            VaultError::Sealed => StatusCode::FORBIDDEN,
            VaultError::AlreadyInitialised | VaultError::Duplicate => StatusCode::CONFLICT,
            VaultError::ReservedName
            | VaultError::InvalidInput(_)
            | VaultError::DecryptFailed => StatusCode::BAD_REQUEST,
            VaultError::NotFound => StatusCode::NOT_FOUND,
            VaultError::EntropyFailed | VaultError::Storage(_) | VaultError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        // Internal detail stays in the log; the client gets a generic line.
        let message = match &err {
            VaultError::Storage(detail) => {
                tracing::error!("storage error: {detail}");
                "Database error".to_string()
            }
            VaultError::EntropyFailed | VaultError::Io(_) => {
                tracing::error!("server error: {err}");
                "Server error".to_string()
            }
            other => other.to_string(),
        };

        Self { status, message }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

fn require_admin(auth: &AuthKey) -> Result<(), ApiError> {
    if auth.key.read_only {
        return Err(ApiError::new(StatusCode::FORBIDDEN, "Key is read-only"));
    }
    Ok(())
}

// ─── Response shapes ─────────────────────────────────────

#[derive(Debug, Serialize)]
struct MessageResponse {
    response: String,
}

fn ok_message(status: StatusCode, text: &str) -> (StatusCode, Json<MessageResponse>) {
    (
        status,
        Json(MessageResponse {
            response: text.to_string(),
        }),
    )
}

/// Credential handed to the user exactly once.
#[derive(Debug, Serialize)]
struct KeyResponse {
    name: String,
    key: String,
}

// ─── Vault lifecycle ─────────────────────────────────────

/// GET /health
async fn health(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    state.store.ping().await?;
    Ok(ok_message(StatusCode::OK, "OK"))
}

/// GET /auth — credential check, nothing else.
async fn check_auth(_auth: AuthKey) -> (StatusCode, Json<MessageResponse>) {
    ok_message(StatusCode::OK, "OK")
}

/// GET /metrics
async fn metrics(
    _auth: AuthKey,
    State(state): State<Arc<AppState>>,
) -> Result<Json<crate::state::Metrics>, ApiError> {
    Ok(Json(state.store.metrics().await?))
}

/// GET /initialise — one-time master creation.
///
/// Replies with the master wrapping key in base64. This is the only time
/// it ever leaves the process; losing it means the vault can never be
/// unsealed again.
async fn initialise(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<KeyResponse>), ApiError> {
    match state.store.get_root_secret("master").await {
        Ok(_) => {
            return Err(ApiError::new(
                StatusCode::CONFLICT,
                "Vault already initialised",
            ))
        }
        Err(VaultError::NotFound) => {}
        Err(err) => return Err(err.into()),
    }

    let mut secret = master::initialise()?;
    state.store.add_secret(&mut secret).await?;

    let key = secret.key.display().ok_or_else(|| {
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Server error")
    })?;

    Ok((
        StatusCode::CREATED,
        Json(KeyResponse {
            name: secret.name.clone(),
            key,
        }),
    ))
}

/// GET /unseal — authenticate with the master credential and install the
/// master key.
async fn unseal(
    auth: AuthKey,
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let master_secret = state
        .store
        .get_root_secret("master")
        .await
        .map_err(|err| match err {
            VaultError::NotFound => {
                ApiError::new(StatusCode::NOT_FOUND, "Vault not initialised")
            }
            other => other.into(),
        })?;

    master::unseal(&master_secret, auth.secret).map_err(|err| match err {
        VaultError::DecryptFailed => {
            ApiError::new(StatusCode::FORBIDDEN, "Incorrect key for vault")
        }
        other => other.into(),
    })?;

    Ok(ok_message(StatusCode::OK, "OK"))
}

/// GET /seal — drop the master key from memory.
async fn seal() -> (StatusCode, Json<MessageResponse>) {
    master::seal();
    ok_message(StatusCode::OK, "OK")
}

pub fn vault_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/auth", get(check_auth))
        .route("/metrics", get(metrics))
        .route("/initialise", get(initialise))
        .route("/seal", get(seal))
        .route("/unseal", get(unseal))
}

// ─── Secrets ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct MessageRequest {
    name: String,
    message: String,
}

/// POST /secrets/message — store a new secret.
async fn new_message(
    auth: AuthKey,
    State(state): State<Arc<AppState>>,
    Json(req): Json<MessageRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    require_admin(&auth)?;

    if req.name.is_empty() || req.message.is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "Missing elements in request",
        ));
    }

    let mut secret = Secret::new(&req.name, SensitiveVec::from(req.message))?;
    state.store.add_secret(&mut secret).await?;

    Ok(ok_message(StatusCode::CREATED, "OK"))
}

#[derive(Debug, Default, Deserialize)]
struct NewKeyRequest {
    #[serde(default)]
    read_only: bool,
}

/// POST /secrets/key — issue a new user credential.
///
/// The private scalar goes into the response, then the stored copy is
/// wrapped under the master key; nothing unwrapped survives the request.
async fn new_key(
    auth: AuthKey,
    State(state): State<Arc<AppState>>,
    body: Option<Json<NewKeyRequest>>,
) -> Result<(StatusCode, Json<KeyResponse>), ApiError> {
    require_admin(&auth)?;

    let req = body.map(|Json(req)| req).unwrap_or_default();

    let mut key = Key::generate(&Uuid::new_v4().to_string())?;
    key.read_only = req.read_only;

    let display = key.display().ok_or_else(|| {
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Server error")
    })?;
    key.wrap()?;
    state.store.add_key(&mut key).await?;

    Ok((
        StatusCode::CREATED,
        Json(KeyResponse {
            name: key.name.clone(),
            key: display,
        }),
    ))
}

#[derive(Debug, Deserialize)]
struct ShareRequest {
    name: String,
    keyid: String,
}

/// POST /secrets/share — grant a key access to a secret.
async fn share(
    auth: AuthKey,
    State(state): State<Arc<AppState>>,
    Json(req): Json<ShareRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    require_admin(&auth)?;

    if req.name.is_empty() || req.keyid.is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "Missing elements in request",
        ));
    }

    let grantee = state.store.get_key(&req.keyid).await?;
    let mut root = state.store.get_root_secret(&req.name).await?;

    let mut shared = root.share(&grantee)?;
    state.store.add_secret(&mut shared).await?;

    Ok(ok_message(StatusCode::CREATED, "OK"))
}

#[derive(Debug, Deserialize)]
struct ViewRequest {
    name: String,
}

/// POST /secrets/view — decrypt a secret shared with the caller's key.
async fn view(
    auth: AuthKey,
    State(state): State<Arc<AppState>>,
    Json(req): Json<ViewRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    view_message(&state, auth, &req.name).await
}

#[derive(Debug, Deserialize)]
struct ViewQuery {
    secretid: String,
    secretkey: String,
}

/// GET /secrets/view/{name}?secretid=..&secretkey=.. — the same view
/// flow with credentials in the query string, used by bootstrap clients
/// that cannot set headers.
async fn view_by_query(
    Path(name): Path<String>,
    Query(query): Query<ViewQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let auth = auth::verify(state.store.as_ref(), &query.secretid, &query.secretkey)
        .await
        .map_err(|_| ApiError::new(StatusCode::UNAUTHORIZED, "Unauthorized"))?;

    view_message(&state, auth, &name).await
}

/// Decrypt runs against the share and root rows only; it works with the
/// vault sealed.
async fn view_message(
    state: &AppState,
    auth: AuthKey,
    name: &str,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let shared = state
        .store
        .get_shared_secret(name, &auth.key.name)
        .await
        .map_err(|err| match err {
            VaultError::NotFound => {
                ApiError::new(StatusCode::NOT_FOUND, "Secret does not exist")
            }
            other => other.into(),
        })?;

    let root = state
        .store
        .get_root_secret(name)
        .await
        .map_err(|err| match err {
            VaultError::NotFound => {
                ApiError::new(StatusCode::NOT_FOUND, "Secret does not exist")
            }
            other => other.into(),
        })?;

    let message = root
        .decrypt(&shared, auth.secret)
        .map_err(|_| ApiError::new(StatusCode::BAD_REQUEST, "Cannot decrypt secret"))?;

    let response = String::from_utf8_lossy(message.as_bytes()).into_owned();
    Ok((StatusCode::OK, Json(MessageResponse { response })))
}

/// POST /secrets/update — re-encrypt an existing secret with a new
/// message. A new row is stored; history is retained.
async fn update(
    auth: AuthKey,
    State(state): State<Arc<AppState>>,
    Json(req): Json<MessageRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    require_admin(&auth)?;

    if req.name.is_empty() || req.message.is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "Missing elements in request",
        ));
    }

    let mut secret = state.store.get_root_secret(&req.name).await?;
    secret.update(SensitiveVec::from(req.message))?;
    state.store.update_secret(&mut secret).await?;

    Ok(ok_message(StatusCode::CREATED, "OK"))
}

/// GET /secrets/list/{type}
async fn list(
    _auth: AuthKey,
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
) -> Result<Response, ApiError> {
    list_rows(&state, &kind, None).await
}

/// GET /secrets/list/{type}/{target} — filtered listing: secrets visible
/// to a key, or keys with access to a secret.
async fn list_filtered(
    _auth: AuthKey,
    State(state): State<Arc<AppState>>,
    Path((kind, target)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    list_rows(&state, &kind, Some(&target)).await
}

async fn list_rows(state: &AppState, kind: &str, target: Option<&str>) -> Result<Response, ApiError> {
    match kind {
        "secrets" => {
            let mut rows = Vec::new();
            let mut offset = 0;
            loop {
                let page = state
                    .store
                    .list_secrets(target, LIST_PAGE_SIZE, offset)
                    .await?;
                let n = page.len() as i64;
                rows.extend(page);
                if n < LIST_PAGE_SIZE {
                    break;
                }
                offset += n;
            }
            Ok(Json(rows).into_response())
        }
        "keys" => {
            let mut rows = Vec::new();
            let mut offset = 0;
            loop {
                let page = state
                    .store
                    .list_keys(target, LIST_PAGE_SIZE, offset)
                    .await?;
                let n = page.len() as i64;
                rows.extend(page);
                if n < LIST_PAGE_SIZE {
                    break;
                }
                offset += n;
            }
            Ok(Json(rows).into_response())
        }
        _ => Err(ApiError::new(StatusCode::BAD_REQUEST, "Unknown list type")),
    }
}

/// DELETE /secrets/message/{name}
async fn delete_message(
    auth: AuthKey,
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    require_admin(&auth)?;

    let secret = state.store.get_root_secret(&name).await?;
    state.store.delete_secret(&secret).await?;

    Ok(ok_message(StatusCode::OK, "OK"))
}

/// DELETE /secrets/key/{name}
async fn delete_key(
    auth: AuthKey,
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    require_admin(&auth)?;

    let key = state.store.get_key(&name).await?;
    state.store.delete_key(&key).await?;

    Ok(ok_message(StatusCode::OK, "OK"))
}

pub fn secret_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/secrets/message", post(new_message))
        .route("/secrets/message/{name}", delete(delete_message))
        .route("/secrets/key", post(new_key))
        .route("/secrets/key/{name}", delete(delete_key))
        .route("/secrets/share", post(share))
        .route("/secrets/view", post(view))
        .route("/secrets/view/{name}", get(view_by_query))
        .route("/secrets/list/{kind}", get(list))
        .route("/secrets/list/{kind}/{target}", get(list_filtered))
        .route("/secrets/update", post(update))
}
