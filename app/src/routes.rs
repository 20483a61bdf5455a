use crate::commands;
use axum::extract::{Path, RawQuery};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;

fn reply<T: Serialize>(result: Result<T, String>) -> Response {
    match result {
        Ok(body) => Json(body).into_response(),
        Err(error) => (StatusCode::BAD_REQUEST, Json(json!({ "error": error }))).into_response(),
    }
}

async fn get_tokens() -> Response {
    Json(commands::tokens()).into_response()
}

async fn get_network() -> Response {
    reply(commands::network())
}

async fn post_link(Json(req): Json<commands::GenerateLinkRequest>) -> Response {
    reply(commands::generate_link(req).await)
}

async fn get_links() -> Response {
    reply(commands::list_links().await)
}

async fn get_link_qr(Path(id): Path<String>) -> Response {
    match commands::link_qr(&id).await {
        Ok(svg) => ([(header::CONTENT_TYPE, "image/svg+xml")], svg).into_response(),
        Err(error) => (StatusCode::NOT_FOUND, Json(json!({ "error": error }))).into_response(),
    }
}

async fn get_payment(Path(id): Path<String>, RawQuery(query): RawQuery) -> Response {
    reply(commands::open_payment(&id, query.as_deref()).await)
}

async fn post_connect(Path(id): Path<String>) -> Response {
    reply(commands::connect_wallet(&id).await)
}

async fn post_disconnect(Path(id): Path<String>) -> Response {
    reply(commands::disconnect_wallet(&id).await)
}

async fn post_switch_network(Path(id): Path<String>) -> Response {
    reply(commands::switch_network(&id).await)
}

async fn post_submit(Path(id): Path<String>) -> Response {
    reply(commands::submit(&id).await)
}

async fn get_status(Path(id): Path<String>) -> Response {
    reply(commands::payment_status(&id).await)
}

async fn get_settings() -> Response {
    reply(commands::get_settings().await)
}

async fn put_settings(Json(settings): Json<commands::Settings>) -> Response {
    reply(commands::update_settings(settings).await)
}

pub fn router() -> Router {
    Router::new()
        .route("/api/tokens", get(get_tokens))
        .route("/api/network", get(get_network))
        .route("/api/links", get(get_links).post(post_link))
        .route("/api/links/:id/qr", get(get_link_qr))
        .route("/api/settings", get(get_settings).put(put_settings))
        .route("/pay/:id", get(get_payment))
        .route("/pay/:id/connect", post(post_connect))
        .route("/pay/:id/disconnect", post(post_disconnect))
        .route("/pay/:id/switch-network", post(post_switch_network))
        .route("/pay/:id/submit", post(post_submit))
        .route("/pay/:id/status", get(get_status))
}
