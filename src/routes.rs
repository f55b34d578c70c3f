use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};

use crate::{
    error::LaasError,
    event::parse_body,
    models::{FetchedSite, GenerationResponse, InjectedPage, PublishedPage, PublishedUrl},
    pipeline::Laas,
};

#[derive(Clone)]
pub struct AppState {
    pub laas: Arc<Laas>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/landing", post(generate_landing))
        .route("/api/page", post(generate_page))
        .route("/api/template", post(rewrite_template))
        .route("/api/inject", post(inject_landing))
        .route("/api/theme", post(fetch_theme))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn generate_landing(State(state): State<AppState>, body: Bytes) -> Result<Json<GenerationResponse>, LaasError> {
    let req = parse_body(&body)?;
    Ok(Json(state.laas.generate_landing(&req).await?))
}

pub async fn generate_page(State(state): State<AppState>, body: Bytes) -> Result<Json<PublishedPage>, LaasError> {
    let req = parse_body(&body)?;
    Ok(Json(state.laas.generate_page(&req).await?))
}

pub async fn rewrite_template(State(state): State<AppState>, body: Bytes) -> Result<Json<PublishedUrl>, LaasError> {
    let req = parse_body(&body)?;
    Ok(Json(state.laas.rewrite_template(&req).await?))
}

pub async fn inject_landing(State(state): State<AppState>, body: Bytes) -> Result<Json<InjectedPage>, LaasError> {
    let req = parse_body(&body)?;
    Ok(Json(state.laas.inject_landing(&req).await?))
}

pub async fn fetch_theme(State(state): State<AppState>, body: Bytes) -> Result<Json<FetchedSite>, LaasError> {
    let req = parse_body(&body)?;
    Ok(Json(state.laas.fetch_theme(&req).await?))
}
