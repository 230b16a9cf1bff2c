//! Atom feed generation for journal articles.
//!
//! Requests are normalised first (default window, default size, self link), then keyed. A
//! rendered document is reused for every request that normalises to the same key.

use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, instrument};

use crate::application::repos::{ArticlesRepo, FeedQuery, RepoError};
use crate::cache::{FeedCacheKey, FeedKeyParams, FeedStore};
use crate::config::FeedSettings;
use crate::domain::error::DomainError;
use crate::domain::feed::{FeedArticle, months_before, parse_feed_date};

const ATOM_NS: &str = "http://www.w3.org/2005/Atom";
const FETCH_ARTICLE_ACTION: &str = "article/fetchArticle.action";
const FETCH_ATTACHMENT_ACTION: &str = "article/fetchObjectAttachment.action";

/// Query parameters of a feed request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedRequest {
    pub journal: Option<String>,
    /// Absent means the default window; an empty value means no lower bound.
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub category: Option<String>,
    pub author: Option<String>,
    pub max_results: Option<i64>,
    #[serde(default)]
    pub relative_links: bool,
    #[serde(default)]
    pub extended: bool,
    pub title: Option<String>,
    pub self_link: Option<String>,
    /// Request path, used to build the default self link.
    #[serde(skip)]
    pub path: String,
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error(transparent)]
    Validation(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

// Request after defaults have been applied.
#[derive(Debug, Clone)]
struct ResolvedFeed {
    journal: Option<String>,
    start: Option<OffsetDateTime>,
    start_text: Option<String>,
    end: Option<OffsetDateTime>,
    end_text: Option<String>,
    category: Option<String>,
    author: Option<String>,
    max_results: u32,
    relative_links: bool,
    extended: bool,
    title: Option<String>,
    self_link: String,
}

impl ResolvedFeed {
    fn cache_key(&self) -> FeedCacheKey {
        FeedCacheKey::new(&FeedKeyParams {
            journal: self.journal.as_deref(),
            start_date: self.start_text.as_deref(),
            end_date: self.end_text.as_deref(),
            category: self.category.as_deref(),
            author: self.author.as_deref(),
            max_results: self.max_results,
            relative_links: self.relative_links,
            extended: self.extended,
            title: self.title.as_deref(),
            self_link: Some(self.self_link.as_str()),
        })
    }

    fn query(&self) -> FeedQuery {
        FeedQuery {
            journal: self.journal.clone(),
            start: self.start,
            end: self.end,
            category: self.category.clone(),
            author: self.author.clone(),
            limit: self.max_results,
        }
    }
}

/// Service producing Atom documents for article queries.
#[derive(Clone)]
pub struct ArticleFeedService {
    articles: Arc<dyn ArticlesRepo>,
    store: Option<Arc<FeedStore>>,
    settings: Arc<FeedSettings>,
}

impl ArticleFeedService {
    pub fn new(
        articles: Arc<dyn ArticlesRepo>,
        store: Option<Arc<FeedStore>>,
        settings: FeedSettings,
    ) -> Self {
        Self {
            articles,
            store,
            settings: Arc::new(settings),
        }
    }

    pub async fn feed(&self, request: &FeedRequest) -> Result<Arc<str>, FeedError> {
        self.feed_at(request, OffsetDateTime::now_utc()).await
    }

    /// Renders the feed as of `now`, which anchors the default window and `updated`.
    #[instrument(skip_all, fields(path = %request.path))]
    pub async fn feed_at(
        &self,
        request: &FeedRequest,
        now: OffsetDateTime,
    ) -> Result<Arc<str>, FeedError> {
        let resolved = self.resolve(request, now)?;
        let key = resolved.cache_key();

        if let Some(store) = &self.store
            && let Some(document) = store.get(&key)
        {
            debug!(target = "scholia::feed", %key, "feed served from store");
            return Ok(document);
        }

        let articles = self.articles.list_feed_articles(&resolved.query()).await?;
        debug!(
            target = "scholia::feed",
            %key,
            articles = articles.len(),
            "feed built"
        );
        let document: Arc<str> = Arc::from(self.render(&resolved, &articles, now));

        if let Some(store) = &self.store {
            store.put(key, Arc::clone(&document));
            debug!(target = "scholia::feed", stored = store.len(), "feed stored");
        }
        Ok(document)
    }

    /// Canonical key of the request as of `now`.
    pub fn cache_key(
        &self,
        request: &FeedRequest,
        now: OffsetDateTime,
    ) -> Result<FeedCacheKey, FeedError> {
        Ok(self.resolve(request, now)?.cache_key())
    }

    fn resolve(&self, request: &FeedRequest, now: OffsetDateTime) -> Result<ResolvedFeed, FeedError> {
        let start = match request.start_date.as_deref() {
            None => Some(months_before(
                now.date(),
                self.settings.default_duration_months,
            )?),
            Some(raw) if raw.trim().is_empty() => None,
            Some(raw) => Some(parse_feed_date("startDate", raw)?),
        };
        let end = match non_empty(request.end_date.as_deref()) {
            None => None,
            Some(raw) => Some(parse_feed_date("endDate", raw)?),
        };

        let max_results = request
            .max_results
            .filter(|value| *value > 0)
            .map(|value| u32::try_from(value).unwrap_or(u32::MAX))
            .unwrap_or(self.settings.default_max_results);

        let self_link = match non_empty(request.self_link.as_deref()) {
            Some(link) => link.to_string(),
            None => format!(
                "{}{}",
                self.settings.site_url,
                request.path.trim_start_matches('/')
            ),
        };

        Ok(ResolvedFeed {
            journal: non_empty(request.journal.as_deref()).map(str::to_owned),
            start_text: start.map(format_date),
            start,
            end_text: end.map(format_date),
            end,
            category: non_empty(request.category.as_deref()).map(str::to_owned),
            author: non_empty(request.author.as_deref()).map(str::to_owned),
            max_results,
            relative_links: request.relative_links,
            extended: request.extended,
            title: request.title.clone(),
            self_link,
        })
    }

    fn render(&self, feed: &ResolvedFeed, articles: &[FeedArticle], now: OffsetDateTime) -> String {
        let settings = &*self.settings;
        let site = settings.site_url.as_str();

        let mut id = settings.feed_id.clone();
        if let Some(category) = &feed.category {
            id.push_str(&format!("?category={category}"));
        }
        if let Some(author) = &feed.author {
            let separator = if id.contains('?') { '&' } else { '?' };
            id.push_str(&format!("{separator}author={author}"));
        }

        let title = match &feed.title {
            Some(title) => title.clone(),
            None => {
                let mut title = settings.title.clone();
                if let Some(category) = &feed.category {
                    title.push_str(&format!(" - Category {category}"));
                }
                if let Some(author) = &feed.author {
                    title.push_str(&format!(" - Author {author}"));
                }
                title
            }
        };

        let namespaces = if feed.extended {
            format!(
                " xmlns:{}=\"{}\"",
                settings.extended_prefix,
                xml_escape(&settings.extended_namespace)
            )
        } else {
            String::new()
        };

        let mut out = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<feed xmlns=\"{ATOM_NS}\"{namespaces} xml:base=\"{}\">\n",
            xml_escape(site)
        );
        out.push_str(&format!("  <title>{}</title>\n", xml_escape(&title)));
        out.push_str(&format!(
            "  <link rel=\"self\" href=\"{}\" title=\"{}\"/>\n",
            xml_escape(&feed.self_link),
            xml_escape(&settings.title)
        ));
        out.push_str(&format!("  <id>{}</id>\n", xml_escape(&id)));
        out.push_str(&format!(
            "  <subtitle>{}</subtitle>\n",
            xml_escape(&settings.tagline)
        ));
        out.push_str(&format!("  <updated>{}</updated>\n", format_date(now)));
        out.push_str(&format!("  <icon>{}</icon>\n", xml_escape(&settings.icon)));
        out.push_str(&format!("  <logo>{}</logo>\n", xml_escape(&settings.icon)));
        out.push_str(&format!(
            "  <rights>{}</rights>\n",
            xml_escape(&settings.copyright)
        ));
        out.push_str(&format!(
            "  <author>\n    <name>{}</name>\n    <email>{}</email>\n    <uri>{}</uri>\n  </author>\n",
            xml_escape(&settings.publisher_name),
            xml_escape(&settings.publisher_email),
            xml_escape(site)
        ));

        let link_base = if feed.relative_links { "" } else { site };
        for article in articles {
            out.push_str(&self.render_entry(article, link_base, feed.extended));
        }

        out.push_str("</feed>\n");
        out
    }

    fn render_entry(&self, article: &FeedArticle, link_base: &str, extended: bool) -> String {
        let settings = &*self.settings;
        let doi = xml_escape(&article.doi);
        let title = xml_escape(&article.title);
        let available = format_date(article.published_at);

        let mut out = String::from("  <entry>\n");
        out.push_str(&format!("    <id>{doi}</id>\n"));
        out.push_str(&format!("    <title>{title}</title>\n"));
        out.push_str(&format!(
            "    <rights>{}</rights>\n",
            xml_escape(article.rights.as_deref().unwrap_or(&settings.copyright))
        ));
        out.push_str(&format!("    <published>{available}</published>\n"));
        out.push_str(&format!("    <updated>{available}</updated>\n"));

        out.push_str(&format!(
            "    <link rel=\"alternate\" href=\"{}\" title=\"{title}\"/>\n",
            xml_escape(&format!(
                "{link_base}{FETCH_ARTICLE_ACTION}?articleURI={}",
                article.doi
            ))
        ));
        for representation in &article.representations {
            let href = format!(
                "{link_base}{FETCH_ATTACHMENT_ACTION}?uri={}&representation={representation}",
                article.doi
            );
            out.push_str(&format!(
                "    <link rel=\"related\" href=\"{}\" title=\"{}\" type=\"{}\"/>\n",
                xml_escape(&href),
                xml_escape(&format!("({representation}) {}", article.title)),
                representation_mime(representation)
            ));
        }

        match article.authors.as_slice() {
            [] => {}
            [first, rest @ ..] if !extended => {
                let name = if rest.is_empty() {
                    first.clone()
                } else {
                    format!("{first} et al.")
                };
                out.push_str(&person("author", &name));
            }
            all => {
                for name in all {
                    out.push_str(&person("author", name));
                }
            }
        }
        for name in &article.contributors {
            out.push_str(&person("contributor", name));
        }

        if extended {
            let prefix = &settings.extended_prefix;
            if let Some(volume) = &article.volume {
                out.push_str(&format!(
                    "    <{prefix}:volume>{}</{prefix}:volume>\n",
                    xml_escape(volume)
                ));
            }
            if let Some(issue) = &article.issue {
                out.push_str(&format!(
                    "    <{prefix}:issue>{}</{prefix}:issue>\n",
                    xml_escape(issue)
                ));
            }
            for category in &article.categories {
                let main = xml_escape(&category.main);
                match &category.sub {
                    Some(sub) => {
                        let sub = xml_escape(sub);
                        out.push_str(&format!(
                            "    <category term=\"{main}\" label=\"{main}\">\n      <category term=\"{sub}\" label=\"{sub}\"/>\n    </category>\n"
                        ));
                    }
                    None => out.push_str(&format!(
                        "    <category term=\"{main}\" label=\"{main}\"/>\n"
                    )),
                }
            }
        }

        let mut content = String::new();
        if !extended && article.authors.len() > 1 {
            content.push_str(&format!("<p>by {}</p>\n", article.authors.join(", ")));
        }
        content.push_str(&article.clean_description());
        out.push_str(&format!(
            "    <content type=\"html\">{}</content>\n",
            xml_escape(&content)
        ));

        out.push_str("  </entry>\n");
        out
    }
}

fn person(tag: &str, name: &str) -> String {
    format!("    <{tag}>\n      <name>{}</name>\n    </{tag}>\n", xml_escape(name))
}

fn representation_mime(representation: &str) -> String {
    mime_guess::from_ext(&representation.to_ascii_lowercase())
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn format_date(value: OffsetDateTime) -> String {
    value.format(&Rfc3339).unwrap_or_else(|_| value.to_string())
}

fn xml_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
