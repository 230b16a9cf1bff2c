use std::{collections::BTreeMap, sync::Arc};

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;

use crate::{
    application::{error::HttpError, featured::FeaturedArticleService},
    infra::db::PostgresRepositories,
};

use super::{
    db_health_response, identity,
    middleware::{log_responses, set_request_context},
};

#[derive(Clone)]
pub struct AdminState {
    pub featured: Arc<FeaturedArticleService>,
    pub db: Arc<PostgresRepositories>,
}

pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/health", get(admin_health))
        .route(
            "/admin/featured",
            get(list_featured)
                .post(create_featured)
                .delete(delete_featured),
        )
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

#[derive(Debug, Deserialize)]
struct JournalQuery {
    journal: String,
}

#[derive(Debug, Deserialize)]
struct CreateFeaturedForm {
    journal: String,
    category: String,
    doi: String,
}

#[derive(Debug, Deserialize)]
struct DeleteFeaturedQuery {
    journal: String,
    category: String,
}

async fn admin_health(State(state): State<AdminState>) -> Response {
    db_health_response(state.db.health_check().await)
}

async fn list_featured(
    State(state): State<AdminState>,
    Query(query): Query<JournalQuery>,
) -> Result<Json<BTreeMap<String, String>>, HttpError> {
    Ok(Json(state.featured.featured_articles(&query.journal).await?))
}

async fn create_featured(
    State(state): State<AdminState>,
    headers: HeaderMap,
    Json(form): Json<CreateFeaturedForm>,
) -> Result<Response, HttpError> {
    state
        .featured
        .create_featured_article(
            &form.journal,
            &form.category,
            &form.doi,
            identity(&headers).as_ref(),
        )
        .await?;
    Ok(StatusCode::CREATED.into_response())
}

async fn delete_featured(
    State(state): State<AdminState>,
    headers: HeaderMap,
    Query(query): Query<DeleteFeaturedQuery>,
) -> Result<Response, HttpError> {
    state
        .featured
        .delete_featured_article(&query.journal, &query.category, identity(&headers).as_ref())
        .await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
