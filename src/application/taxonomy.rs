//! Category trees, browse views and subject counts built from the search index.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, instrument};

use crate::application::repos::{SearchError, SearchIndex};
use crate::cache::{
    CacheConfig, LookupCache, categories_key, category_count_key, top_and_second_level_key,
};
use crate::domain::subjects::{CategoryTree, CategoryView, build_category_tree};

#[derive(Debug, Error)]
pub enum TaxonomyError {
    #[error("failed to fetch subjects from the search index: {0}")]
    Search(#[from] SearchError),
}

/// Per-journal lookup caches for the taxonomy.
pub struct TaxonomyCaches {
    trees: LookupCache<Arc<CategoryTree>, SearchError>,
    views: LookupCache<Arc<CategoryView>, SearchError>,
    counts: LookupCache<Arc<BTreeMap<String, u64>>, SearchError>,
}

impl TaxonomyCaches {
    pub fn new() -> Self {
        Self {
            trees: LookupCache::new("category_tree"),
            views: LookupCache::new("category_view"),
            counts: LookupCache::new("category_counts"),
        }
    }
}

impl Default for TaxonomyCaches {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct TaxonomyService {
    search: Arc<dyn SearchIndex>,
    caches: Option<Arc<TaxonomyCaches>>,
    ttl: Duration,
}

impl TaxonomyService {
    /// Without caches every call goes straight to the search index.
    pub fn new(
        search: Arc<dyn SearchIndex>,
        caches: Option<Arc<TaxonomyCaches>>,
        ttl: Duration,
    ) -> Self {
        Self {
            search,
            caches,
            ttl,
        }
    }

    pub fn from_config(search: Arc<dyn SearchIndex>, config: &CacheConfig) -> Self {
        let caches = config.enabled.then(|| Arc::new(TaxonomyCaches::new()));
        Self::new(search, caches, config.taxonomy_ttl())
    }

    /// Top-level categories of the journal mapped to their sorted second-level names.
    #[instrument(skip_all, fields(journal = journal.unwrap_or("")))]
    pub async fn top_and_second_level_categories(
        &self,
        journal: Option<&str>,
    ) -> Result<Arc<CategoryTree>, TaxonomyError> {
        let journal = normalize_journal(journal);
        let search = Arc::clone(&self.search);
        let owned = journal.map(str::to_owned);
        let compute = move || async move {
            let subjects = search.all_subjects(owned.as_deref()).await?;
            debug!(
                target = "scholia::taxonomy",
                subjects = subjects.len(),
                "building category tree"
            );
            Ok::<_, SearchError>(Arc::new(build_category_tree(&subjects)))
        };

        let tree = match &self.caches {
            Some(caches) => {
                caches
                    .trees
                    .get_or_compute(&top_and_second_level_key(journal), self.ttl, compute)
                    .await
            }
            None => compute().await,
        }?;
        Ok(tree)
    }

    /// Nested browse tree rooted at `ROOT`.
    #[instrument(skip_all, fields(journal = journal.unwrap_or("")))]
    pub async fn categories(
        &self,
        journal: Option<&str>,
    ) -> Result<Arc<CategoryView>, TaxonomyError> {
        let journal = normalize_journal(journal);
        let search = Arc::clone(&self.search);
        let owned = journal.map(str::to_owned);
        let compute = move || async move {
            let subjects = search.all_subjects(owned.as_deref()).await?;
            Ok::<_, SearchError>(Arc::new(CategoryView::from_paths(&subjects)))
        };

        let view = match &self.caches {
            Some(caches) => {
                caches
                    .views
                    .get_or_compute(&categories_key(journal), self.ttl, compute)
                    .await
            }
            None => compute().await,
        }?;
        Ok(view)
    }

    /// Every subject term of the journal with its article count, plus `ROOT` for the total.
    pub async fn all_counts(
        &self,
        journal: Option<&str>,
    ) -> Result<Arc<BTreeMap<String, u64>>, TaxonomyError> {
        let journal = normalize_journal(journal);
        let search = Arc::clone(&self.search);
        let owned = journal.map(str::to_owned);
        let compute = move || async move {
            let counts = search.all_subject_counts(owned.as_deref()).await?;
            Ok::<_, SearchError>(Arc::new(counts.into_category_counts()))
        };

        let counts = match &self.caches {
            Some(caches) => {
                caches
                    .counts
                    .get_or_compute(&category_count_key(journal), self.ttl, compute)
                    .await
            }
            None => compute().await,
        }?;
        Ok(counts)
    }

    /// Counts for `view` and each of its immediate children.
    ///
    /// Terms missing from the index map to `None`.
    #[instrument(skip_all, fields(node = %view.name, journal = journal.unwrap_or("")))]
    pub async fn counts(
        &self,
        view: &CategoryView,
        journal: Option<&str>,
    ) -> Result<BTreeMap<String, Option<u64>>, TaxonomyError> {
        let all = self.all_counts(journal).await?;

        let counts = std::iter::once(view.name.as_str())
            .chain(view.children.keys().map(String::as_str))
            .map(|name| (name.to_string(), all.get(name).copied()))
            .collect();
        Ok(counts)
    }
}

fn normalize_journal(journal: Option<&str>) -> Option<&str> {
    journal.filter(|journal| !journal.is_empty())
}
