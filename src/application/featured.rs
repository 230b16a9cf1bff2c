//! Featured-article selection and the editor overrides that take precedence over it.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::application::repos::{
    CreateFeaturedParams, FeaturedArticlesRepo, PermissionChecker, PermissionError, RepoError,
    SearchError, SearchIndex,
};
use crate::domain::error::DomainError;
use crate::domain::featured::{FeaturedArticle, FeaturedArticleKind};
use crate::domain::types::{AuthId, Permission};

#[derive(Debug, Error)]
pub enum FeaturedError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("No records created, invalid journalKey or DOI specified.")]
    UnresolvedTarget,
    #[error(transparent)]
    Validation(#[from] DomainError),
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl From<PermissionError> for FeaturedError {
    fn from(err: PermissionError) -> Self {
        match err {
            PermissionError::Denied { .. } => FeaturedError::PermissionDenied(err.to_string()),
            PermissionError::Repo(err) => FeaturedError::Repo(err),
        }
    }
}

#[derive(Clone)]
pub struct FeaturedArticleService {
    overrides: Arc<dyn FeaturedArticlesRepo>,
    search: Arc<dyn SearchIndex>,
    permissions: Arc<dyn PermissionChecker>,
}

impl FeaturedArticleService {
    pub fn new(
        overrides: Arc<dyn FeaturedArticlesRepo>,
        search: Arc<dyn SearchIndex>,
        permissions: Arc<dyn PermissionChecker>,
    ) -> Self {
        Self {
            overrides,
            search,
            permissions,
        }
    }

    /// Picks the article shown for a subject area.
    ///
    /// Tiers are tried in order and the first hit wins: the editor override, the most
    /// shared article of the week, the most viewed of the week, then the most viewed of
    /// all time. An error at any tier ends the selection.
    #[instrument(skip(self))]
    pub async fn featured_article(
        &self,
        journal: &str,
        category: &str,
    ) -> Result<Option<FeaturedArticle>, FeaturedError> {
        if let Some(row) = self.overrides.find_override(journal, category).await? {
            return Ok(Some(row.into()));
        }

        if let Some(hit) = self.search.most_shared(journal, category).await? {
            return Ok(Some(FeaturedArticle::from_hit(hit, FeaturedArticleKind::MostShared)));
        }

        if let Some(hit) = self.search.most_viewed_recent(journal, category).await? {
            return Ok(Some(FeaturedArticle::from_hit(hit, FeaturedArticleKind::MostViewed)));
        }

        if let Some(hit) = self.search.most_viewed_all_time(journal, category).await? {
            return Ok(Some(FeaturedArticle::from_hit(hit, FeaturedArticleKind::MostViewed)));
        }

        Ok(None)
    }

    /// Every editor override of the journal, category to DOI.
    pub async fn featured_articles(
        &self,
        journal: &str,
    ) -> Result<BTreeMap<String, String>, FeaturedError> {
        let rows = self.overrides.list_overrides(journal).await?;
        Ok(rows.into_iter().map(|row| (row.category, row.doi)).collect())
    }

    pub async fn create_featured_article(
        &self,
        journal: &str,
        category: &str,
        doi: &str,
        auth_id: Option<&AuthId>,
    ) -> Result<(), FeaturedError> {
        self.permissions
            .check_permission(Permission::ManageFeaturedArticles, auth_id)
            .await?;

        let params = CreateFeaturedParams {
            journal_key: required("journal", journal)?,
            category: required("category", category)?,
            doi: required("doi", doi)?,
        };
        let rows = self.overrides.create_override(params).await?;
        if rows == 0 {
            warn!(
                target = "scholia::featured",
                journal, doi, "featured article target did not resolve"
            );
            return Err(FeaturedError::UnresolvedTarget);
        }

        info!(
            target = "scholia::featured",
            journal,
            category,
            doi,
            actor = auth_id.map(AuthId::as_str).unwrap_or(""),
            "featured article created"
        );
        Ok(())
    }

    pub async fn delete_featured_article(
        &self,
        journal: &str,
        category: &str,
        auth_id: Option<&AuthId>,
    ) -> Result<(), FeaturedError> {
        self.permissions
            .check_permission(Permission::ManageFeaturedArticles, auth_id)
            .await?;

        let rows = self.overrides.delete_overrides(journal, category).await?;
        info!(
            target = "scholia::featured",
            journal,
            category,
            rows,
            actor = auth_id.map(AuthId::as_str).unwrap_or(""),
            "featured article deleted"
        );
        Ok(())
    }
}

fn required(field: &'static str, value: &str) -> Result<String, DomainError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(field, "must not be empty"));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::domain::featured::{FeaturedOverride, SearchHit};
    use crate::domain::subjects::SubjectCounts;

    #[derive(Default)]
    struct StubOverrides {
        row: Option<FeaturedOverride>,
        create_rows: u64,
        calls: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl FeaturedArticlesRepo for StubOverrides {
        async fn find_override(
            &self,
            _journal_key: &str,
            _category: &str,
        ) -> Result<Option<FeaturedOverride>, RepoError> {
            self.calls.lock().unwrap().push("find");
            Ok(self.row.clone())
        }

        async fn list_overrides(&self, _: &str) -> Result<Vec<FeaturedOverride>, RepoError> {
            Ok(self.row.clone().into_iter().collect())
        }

        async fn create_override(&self, _: CreateFeaturedParams) -> Result<u64, RepoError> {
            self.calls.lock().unwrap().push("create");
            Ok(self.create_rows)
        }

        async fn delete_overrides(&self, _: &str, _: &str) -> Result<u64, RepoError> {
            self.calls.lock().unwrap().push("delete");
            Ok(0)
        }
    }

    #[derive(Default)]
    struct StubSearch {
        shared: Option<SearchHit>,
        recent: Option<SearchHit>,
        all_time: Option<SearchHit>,
        fail_shared: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SearchIndex for StubSearch {
        async fn all_subjects(&self, _: Option<&str>) -> Result<Vec<String>, SearchError> {
            Ok(Vec::new())
        }

        async fn all_subject_counts(&self, _: Option<&str>) -> Result<SubjectCounts, SearchError> {
            Ok(SubjectCounts::default())
        }

        async fn most_shared(&self, _: &str, _: &str) -> Result<Option<SearchHit>, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_shared {
                return Err(SearchError::Status {
                    status: 500,
                    message: "boom".into(),
                });
            }
            Ok(self.shared.clone())
        }

        async fn most_viewed_recent(
            &self,
            _: &str,
            _: &str,
        ) -> Result<Option<SearchHit>, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.recent.clone())
        }

        async fn most_viewed_all_time(
            &self,
            _: &str,
            _: &str,
        ) -> Result<Option<SearchHit>, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.all_time.clone())
        }
    }

    struct StubPermissions {
        allow: bool,
    }

    #[async_trait]
    impl PermissionChecker for StubPermissions {
        async fn check_permission(
            &self,
            permission: Permission,
            _auth_id: Option<&AuthId>,
        ) -> Result<(), PermissionError> {
            if self.allow {
                Ok(())
            } else {
                Err(PermissionError::Denied {
                    permission,
                    reason: "not an editor".into(),
                })
            }
        }
    }

    fn hit(uri: &str) -> SearchHit {
        SearchHit {
            uri: uri.into(),
            title: format!("Title of {uri}"),
            striking_image: None,
        }
    }

    fn service(
        overrides: Arc<StubOverrides>,
        search: Arc<StubSearch>,
        allow: bool,
    ) -> FeaturedArticleService {
        FeaturedArticleService::new(overrides, search, Arc::new(StubPermissions { allow }))
    }

    #[tokio::test]
    async fn manual_override_short_circuits_search() {
        let overrides = Arc::new(StubOverrides {
            row: Some(FeaturedOverride {
                category: "Genetics".into(),
                doi: "10.1/x".into(),
                title: "Picked".into(),
                striking_image_uri: None,
            }),
            ..StubOverrides::default()
        });
        let search = Arc::new(StubSearch {
            shared: Some(hit("10.1/shared")),
            ..StubSearch::default()
        });
        let service = service(overrides, Arc::clone(&search), true);

        let article = service
            .featured_article("PLoSONE", "genetics")
            .await
            .expect("select")
            .expect("some");
        assert_eq!(article.doi, "10.1/x");
        assert_eq!(article.kind.label(), "Featured Article");
        assert_eq!(search.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn most_shared_is_second_tier() {
        let search = Arc::new(StubSearch {
            shared: Some(hit("10.1/shared")),
            recent: Some(hit("10.1/recent")),
            ..StubSearch::default()
        });
        let service = service(Arc::default(), Arc::clone(&search), true);

        let article = service.featured_article("J", "c").await.expect("ok").expect("some");
        assert_eq!(article.kind, FeaturedArticleKind::MostShared);
        assert_eq!(article.doi, "10.1/shared");
        assert_eq!(search.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn falls_through_to_all_time_views() {
        let search = Arc::new(StubSearch {
            all_time: Some(hit("10.1/old")),
            ..StubSearch::default()
        });
        let service = service(Arc::default(), Arc::clone(&search), true);

        let article = service.featured_article("J", "c").await.expect("ok").expect("some");
        assert_eq!(article.kind.label(), "Most Viewed Article");
        assert_eq!(article.doi, "10.1/old");
        assert_eq!(search.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn empty_subject_area_yields_none() {
        let service = service(Arc::default(), Arc::default(), true);
        let article = service.featured_article("J", "c").await.expect("ok");
        assert!(article.is_none());
    }

    #[tokio::test]
    async fn search_failure_stops_the_chain() {
        let search = Arc::new(StubSearch {
            fail_shared: true,
            all_time: Some(hit("10.1/old")),
            ..StubSearch::default()
        });
        let service = service(Arc::default(), Arc::clone(&search), true);

        let err = service.featured_article("J", "c").await.expect_err("fails");
        assert!(matches!(err, FeaturedError::Search(_)));
        assert_eq!(search.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn denied_permission_runs_no_query() {
        let overrides = Arc::new(StubOverrides {
            create_rows: 1,
            ..StubOverrides::default()
        });
        let service = service(Arc::clone(&overrides), Arc::default(), false);
        let actor = AuthId::parse(Some("reader"));

        let err = service
            .create_featured_article("J", "c", "10.1/x", actor.as_ref())
            .await
            .expect_err("denied");
        assert!(matches!(err, FeaturedError::PermissionDenied(_)));

        let err = service
            .delete_featured_article("J", "c", actor.as_ref())
            .await
            .expect_err("denied");
        assert!(matches!(err, FeaturedError::PermissionDenied(_)));

        assert!(overrides.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_reports_unresolved_target() {
        let service = service(Arc::default(), Arc::default(), true);
        let actor = AuthId::parse(Some("editor"));

        let err = service
            .create_featured_article("J", "c", "10.1/missing", actor.as_ref())
            .await
            .expect_err("zero rows");
        assert_eq!(
            err.to_string(),
            "No records created, invalid journalKey or DOI specified."
        );
    }

    #[tokio::test]
    async fn delete_of_missing_override_succeeds() {
        let overrides = Arc::new(StubOverrides::default());
        let service = service(Arc::clone(&overrides), Arc::default(), true);
        let actor = AuthId::parse(Some("editor"));

        service
            .delete_featured_article("J", "c", actor.as_ref())
            .await
            .expect("no-op delete");
        assert_eq!(*overrides.calls.lock().unwrap(), vec!["delete"]);
    }

    #[tokio::test]
    async fn create_rejects_blank_doi() {
        let service = service(Arc::default(), Arc::default(), true);
        let err = service
            .create_featured_article("J", "c", "  ", None)
            .await
            .expect_err("blank doi");
        assert!(matches!(
            err,
            FeaturedError::Validation(DomainError::Validation { field: "doi", .. })
        ));
    }
}
