use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header::CONTENT_TYPE},
};
use http_body_util::BodyExt;
use scholia::application::featured::FeaturedArticleService;
use scholia::application::flags::FlagService;
use scholia::application::repos::{
    ArticlesRepo, CreateFeaturedParams, FeaturedArticlesRepo, FeedQuery, FlagsRepo,
    PermissionChecker, PermissionError, RepoError, SearchError, SearchIndex,
};
use scholia::application::syndication::ArticleFeedService;
use scholia::application::taxonomy::{TaxonomyCaches, TaxonomyService};
use scholia::cache::FeedStore;
use scholia::config::FeedSettings;
use scholia::domain::featured::{FeaturedOverride, SearchHit};
use scholia::domain::feed::FeedArticle;
use scholia::domain::flags::FlagTarget;
use scholia::domain::subjects::SubjectCounts;
use scholia::domain::types::{AuthId, Permission};
use scholia::infra::db::PostgresRepositories;
use scholia::infra::http::{AUTH_ID_HEADER, AdminState, HttpState, build_admin_router, build_router};
use serde_json::{Value, json};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;

struct FixedIndex;

#[async_trait]
impl SearchIndex for FixedIndex {
    async fn all_subjects(&self, _journal: Option<&str>) -> Result<Vec<String>, SearchError> {
        Ok(vec![
            "/Biology/Genetics/Genomics".to_string(),
            "/Biology/Ecology".to_string(),
            "/Medicine/Oncology".to_string(),
            "malformed".to_string(),
        ])
    }

    async fn all_subject_counts(
        &self,
        _journal: Option<&str>,
    ) -> Result<SubjectCounts, SearchError> {
        Ok(SubjectCounts {
            subject_counts: BTreeMap::from([
                ("Biology".to_string(), 7),
                ("Genetics".to_string(), 4),
            ]),
            total_articles: 12,
        })
    }

    async fn most_shared(
        &self,
        _journal: &str,
        category: &str,
    ) -> Result<Option<SearchHit>, SearchError> {
        Ok((category == "Genetics").then(|| SearchHit {
            uri: "info:doi/10.1371/journal.pone.0000042".to_string(),
            title: "Shared widely".to_string(),
            striking_image: None,
        }))
    }

    async fn most_viewed_recent(
        &self,
        _journal: &str,
        _category: &str,
    ) -> Result<Option<SearchHit>, SearchError> {
        Ok(None)
    }

    async fn most_viewed_all_time(
        &self,
        _journal: &str,
        _category: &str,
    ) -> Result<Option<SearchHit>, SearchError> {
        Ok(None)
    }
}

#[derive(Default)]
struct MemoryOverrides {
    rows: Mutex<Vec<(String, FeaturedOverride)>>,
}

#[async_trait]
impl FeaturedArticlesRepo for MemoryOverrides {
    async fn find_override(
        &self,
        journal_key: &str,
        category: &str,
    ) -> Result<Option<FeaturedOverride>, RepoError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|(journal, row)| {
                journal == journal_key && row.category.eq_ignore_ascii_case(category)
            })
            .map(|(_, row)| row.clone()))
    }

    async fn list_overrides(&self, journal_key: &str) -> Result<Vec<FeaturedOverride>, RepoError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|(journal, _)| journal == journal_key)
            .map(|(_, row)| row.clone())
            .collect())
    }

    async fn create_override(&self, params: CreateFeaturedParams) -> Result<u64, RepoError> {
        if !params.doi.starts_with("info:doi/") {
            return Ok(0);
        }
        self.rows.lock().unwrap().push((
            params.journal_key,
            FeaturedOverride {
                category: params.category,
                doi: params.doi,
                title: "Editor pick".to_string(),
                striking_image_uri: None,
            },
        ));
        Ok(1)
    }

    async fn delete_overrides(&self, journal_key: &str, category: &str) -> Result<u64, RepoError> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|(journal, row)| {
            !(journal == journal_key && row.category.eq_ignore_ascii_case(category))
        });
        Ok((before - rows.len()) as u64)
    }
}

#[derive(Default)]
struct RecordingFlags {
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl FlagsRepo for RecordingFlags {
    async fn upsert_user_flag(&self, target: FlagTarget, auth_id: &AuthId) -> Result<u64, RepoError> {
        self.calls.lock().unwrap().push(format!("upsert {target} {auth_id}"));
        Ok(1)
    }

    async fn insert_anonymous_flag(&self, target: FlagTarget) -> Result<u64, RepoError> {
        self.calls.lock().unwrap().push(format!("insert {target}"));
        Ok(1)
    }

    async fn delete_user_flag(&self, target: FlagTarget, auth_id: &AuthId) -> Result<u64, RepoError> {
        self.calls.lock().unwrap().push(format!("delete {target} {auth_id}"));
        Ok(1)
    }

    async fn delete_one_anonymous_flag(&self, target: FlagTarget) -> Result<u64, RepoError> {
        self.calls.lock().unwrap().push(format!("delete-one {target}"));
        Ok(1)
    }
}

struct EditorsOnly;

#[async_trait]
impl PermissionChecker for EditorsOnly {
    async fn check_permission(
        &self,
        permission: Permission,
        auth_id: Option<&AuthId>,
    ) -> Result<(), PermissionError> {
        match auth_id.map(AuthId::as_str) {
            Some("editor") => Ok(()),
            _ => Err(PermissionError::Denied {
                permission,
                reason: "not an editor".to_string(),
            }),
        }
    }
}

#[derive(Default)]
struct NoArticles {
    queries: AtomicUsize,
}

#[async_trait]
impl ArticlesRepo for NoArticles {
    async fn list_feed_articles(&self, _query: &FeedQuery) -> Result<Vec<FeedArticle>, RepoError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }
}

struct Harness {
    public: Router,
    admin: Router,
    flags: Arc<RecordingFlags>,
    articles: Arc<NoArticles>,
}

fn harness() -> Harness {
    let pool = PgPoolOptions::new()
        .connect_lazy("postgres://scholia@localhost/scholia_unused")
        .expect("lazy pool");
    let db = Arc::new(PostgresRepositories::new(pool));
    let search: Arc<dyn SearchIndex> = Arc::new(FixedIndex);
    let flags = Arc::new(RecordingFlags::default());
    let articles = Arc::new(NoArticles::default());

    let featured = Arc::new(FeaturedArticleService::new(
        Arc::new(MemoryOverrides::default()),
        Arc::clone(&search),
        Arc::new(EditorsOnly),
    ));
    let http_state = HttpState {
        taxonomy: Arc::new(TaxonomyService::new(
            Arc::clone(&search),
            Some(Arc::new(TaxonomyCaches::new())),
            Duration::from_secs(60),
        )),
        featured: Arc::clone(&featured),
        flags: Arc::new(FlagService::new(Arc::clone(&flags) as Arc<dyn FlagsRepo>)),
        feeds: Arc::new(ArticleFeedService::new(
            Arc::clone(&articles) as Arc<dyn ArticlesRepo>,
            Some(Arc::new(FeedStore::new(
                NonZeroUsize::MIN.saturating_add(7),
                Duration::from_secs(60),
            ))),
            FeedSettings::default(),
        )),
        db: Arc::clone(&db),
    };

    Harness {
        public: build_router(http_state),
        admin: build_admin_router(AdminState { featured, db }),
        flags,
        articles,
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");
    let status = response.status();
    let body = response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes()
        .to_vec();
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .expect("request should build")
}

fn json_request(method: Method, uri: &str, auth: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json");
    if let Some(auth) = auth {
        builder = builder.header(AUTH_ID_HEADER, auth);
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("request should build")
}

#[tokio::test]
async fn categories_route_returns_two_level_tree() {
    let harness = harness();
    let (status, body) = send(&harness.public, get("/taxonomy/categories?journal=PLoSONE")).await;

    assert_eq!(status, StatusCode::OK);
    let tree: Value = serde_json::from_slice(&body).expect("json");
    assert_eq!(
        tree,
        json!({ "Biology": ["Ecology", "Genetics"], "Medicine": ["Oncology"] })
    );
}

#[tokio::test]
async fn browse_route_walks_the_path() {
    let harness = harness();

    let (status, body) = send(&harness.public, get("/taxonomy/browse?path=/Biology/Genetics")).await;
    assert_eq!(status, StatusCode::OK);
    let node: Value = serde_json::from_slice(&body).expect("json");
    assert_eq!(node["name"], "Genetics");
    assert!(node["children"]["Genomics"].is_object());

    let (status, _) = send(&harness.public, get("/taxonomy/browse?path=/Chemistry")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn counts_route_reports_missing_terms_as_null() {
    let harness = harness();
    let (status, body) = send(&harness.public, get("/taxonomy/counts?journal=PLoSONE")).await;

    assert_eq!(status, StatusCode::OK);
    let counts: Value = serde_json::from_slice(&body).expect("json");
    assert_eq!(
        counts,
        json!({ "ROOT": 12, "Biology": 7, "Medicine": null })
    );
}

#[tokio::test]
async fn featured_route_falls_back_to_search() {
    let harness = harness();

    let (status, body) = send(
        &harness.public,
        get("/taxonomy/featured?journal=PLoSONE&category=Genetics"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let article: Value = serde_json::from_slice(&body).expect("json");
    assert_eq!(article["type"], "Most Shared Article");
    assert_eq!(article["doi"], "info:doi/10.1371/journal.pone.0000042");

    let (status, body) = send(
        &harness.public,
        get("/taxonomy/featured?journal=PLoSONE&category=Oncology"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"null");
}

#[tokio::test]
async fn flag_routes_forward_identity() {
    let harness = harness();
    let target = json!({ "articleId": 3, "categoryId": 9 });

    let (status, _) = send(
        &harness.public,
        json_request(Method::POST, "/taxonomy/flags", Some("reader-1"), target.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(
        &harness.public,
        json_request(Method::DELETE, "/taxonomy/flags", None, target),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    assert_eq!(
        *harness.flags.calls.lock().unwrap(),
        vec![
            "upsert article=3 category=9 reader-1".to_string(),
            "delete-one article=3 category=9".to_string(),
        ]
    );
}

#[tokio::test]
async fn feed_route_serves_atom() {
    let harness = harness();
    let response = harness
        .public
        .clone()
        .oneshot(get("/feed/atom?journal=PLoSONE&category=Genetics"))
        .await
        .expect("router should respond");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[CONTENT_TYPE],
        "application/atom+xml; charset=utf-8"
    );
    let body = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let document = String::from_utf8(body.to_vec()).expect("utf-8");
    assert!(document.contains("<title>PLoS ONE - Category Genetics</title>"));
    assert!(document.contains("<id>info:doi/10.1371/feed.pone?category=Genetics</id>"));
}

#[tokio::test]
async fn feed_parameter_order_does_not_change_the_document() {
    let harness = harness();

    let (status, first) = send(
        &harness.public,
        get("/feed/atom?journal=PLoSONE&category=Genetics"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, second) = send(
        &harness.public,
        get("/feed/atom?category=Genetics&journal=PLoSONE"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(first, second);
    assert_eq!(harness.articles.queries.load(Ordering::SeqCst), 1);
    let document = String::from_utf8(first).expect("utf-8");
    assert!(document.contains("<link rel=\"self\" href=\"http://localhost:3000/feed/atom\""));
}

#[tokio::test]
async fn feed_route_rejects_unparseable_dates() {
    let harness = harness();
    let (status, _) = send(&harness.public, get("/feed/atom?startDate=last-tuesday")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn admin_mutations_require_permission() {
    let harness = harness();
    let body = json!({
        "journal": "PLoSONE",
        "category": "Genetics",
        "doi": "info:doi/10.1371/journal.pone.0000007"
    });

    let (status, _) = send(
        &harness.admin,
        json_request(Method::POST, "/admin/featured", None, body.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &harness.admin,
        json_request(Method::POST, "/admin/featured", Some("editor"), body),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&harness.admin, get("/admin/featured?journal=PLoSONE")).await;
    assert_eq!(status, StatusCode::OK);
    let listing: Value = serde_json::from_slice(&body).expect("json");
    assert_eq!(
        listing,
        json!({ "Genetics": "info:doi/10.1371/journal.pone.0000007" })
    );

    let delete = Request::builder()
        .method(Method::DELETE)
        .uri("/admin/featured?journal=PLoSONE&category=genetics")
        .header(AUTH_ID_HEADER, "editor")
        .body(Body::empty())
        .expect("request should build");
    let (status, _) = send(&harness.admin, delete).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = send(&harness.admin, get("/admin/featured?journal=PLoSONE")).await;
    assert_eq!(body, b"{}");
}

#[tokio::test]
async fn admin_create_reports_unresolved_target() {
    let harness = harness();
    let body = json!({ "journal": "PLoSONE", "category": "Genetics", "doi": "bogus" });

    let (status, body) = send(
        &harness.admin,
        json_request(Method::POST, "/admin/featured", Some("editor"), body),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        String::from_utf8(body).expect("utf-8"),
        "No records created, invalid journalKey or DOI specified."
    );
}
