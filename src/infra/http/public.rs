use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{Query, State},
    http::{
        HeaderMap, StatusCode, Uri,
        header::{CACHE_CONTROL, CONTENT_TYPE},
    },
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;

use crate::{
    application::{
        error::HttpError,
        featured::FeaturedArticleService,
        flags::FlagService,
        syndication::{ArticleFeedService, FeedRequest},
        taxonomy::TaxonomyService,
    },
    domain::{flags::FlagTarget, subjects::CategoryView},
    infra::db::PostgresRepositories,
};

use super::{
    db_health_response, identity,
    middleware::{log_responses, set_request_context},
};

#[derive(Clone)]
pub struct HttpState {
    pub taxonomy: Arc<TaxonomyService>,
    pub featured: Arc<FeaturedArticleService>,
    pub flags: Arc<FlagService>,
    pub feeds: Arc<ArticleFeedService>,
    pub db: Arc<PostgresRepositories>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/health", get(public_health))
        .route("/taxonomy/categories", get(top_and_second_level))
        .route("/taxonomy/browse", get(browse))
        .route("/taxonomy/counts", get(counts))
        .route("/taxonomy/featured", get(featured_article))
        .route("/taxonomy/flags", post(flag).delete(deflag))
        .route("/feed/atom", get(atom_feed))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct JournalQuery {
    journal: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NodeQuery {
    journal: Option<String>,
    /// Slash-delimited path below `ROOT`; empty selects the root.
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FeaturedQuery {
    journal: String,
    category: String,
}

async fn public_health(State(state): State<HttpState>) -> Response {
    db_health_response(state.db.health_check().await)
}

async fn top_and_second_level(
    State(state): State<HttpState>,
    Query(query): Query<JournalQuery>,
) -> Result<Response, HttpError> {
    let tree = state
        .taxonomy
        .top_and_second_level_categories(query.journal.as_deref())
        .await?;
    Ok(Json(tree.as_ref()).into_response())
}

async fn browse(
    State(state): State<HttpState>,
    Query(query): Query<NodeQuery>,
) -> Result<Response, HttpError> {
    let view = state.taxonomy.categories(query.journal.as_deref()).await?;
    let node = locate(&view, query.path.as_deref())?;
    Ok(Json(node).into_response())
}

async fn counts(
    State(state): State<HttpState>,
    Query(query): Query<NodeQuery>,
) -> Result<Response, HttpError> {
    let journal = query.journal.as_deref();
    let view = state.taxonomy.categories(journal).await?;
    let node = locate(&view, query.path.as_deref())?;
    let counts = state.taxonomy.counts(node, journal).await?;
    Ok(Json(counts).into_response())
}

async fn featured_article(
    State(state): State<HttpState>,
    Query(query): Query<FeaturedQuery>,
) -> Result<Response, HttpError> {
    let article = state
        .featured
        .featured_article(&query.journal, &query.category)
        .await?;
    Ok(Json(article).into_response())
}

async fn flag(
    State(state): State<HttpState>,
    headers: HeaderMap,
    Json(target): Json<FlagTarget>,
) -> Result<Response, HttpError> {
    state.flags.flag(target, identity(&headers).as_ref()).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn deflag(
    State(state): State<HttpState>,
    headers: HeaderMap,
    Json(target): Json<FlagTarget>,
) -> Result<Response, HttpError> {
    state
        .flags
        .deflag(target, identity(&headers).as_ref())
        .await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn atom_feed(
    State(state): State<HttpState>,
    uri: Uri,
    Query(mut request): Query<FeedRequest>,
) -> Result<Response, HttpError> {
    request.path = uri.path().to_string();
    let document = state.feeds.feed(&request).await?;
    Ok(xml_response(document.to_string(), "application/atom+xml"))
}

fn locate<'a>(view: &'a CategoryView, path: Option<&str>) -> Result<&'a CategoryView, HttpError> {
    let path = path.unwrap_or("");
    view.descend(path.split('/').filter(|segment| !segment.is_empty()))
        .ok_or_else(|| {
            HttpError::new(
                "infra::http::public::locate",
                StatusCode::NOT_FOUND,
                "Unknown category",
                format!("no category at `{path}`"),
            )
        })
}

fn xml_response(body: String, content_type: &'static str) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, format!("{content_type}; charset=utf-8"))
        .header(CACHE_CONTROL, "public, max-age=300")
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
