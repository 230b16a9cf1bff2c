//! Solr-backed implementation of the search index.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::{
    application::repos::{SearchError, SearchIndex},
    config::SearchSettings,
    domain::{featured::SearchHit, subjects::SubjectCounts},
};

use super::error::InfraError;

const DOI_FIELD: &str = "id";
const TITLE_FIELD: &str = "title_display";
const STRIKING_IMAGE_FIELD: &str = "striking_image";
const PUBLICATION_DATE_FIELD: &str = "publication_date";
const RECENT_WINDOW: &str = "[NOW-7DAYS/DAY TO NOW]";

#[derive(Debug, Deserialize)]
struct SelectResponse {
    response: ResponseBody,
    #[serde(default)]
    facet_counts: Option<FacetCounts>,
}

#[derive(Debug, Deserialize)]
struct ResponseBody {
    #[serde(rename = "numFound")]
    num_found: u64,
    #[serde(default)]
    docs: Vec<HashMap<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct FacetCounts {
    #[serde(default)]
    facet_fields: HashMap<String, Vec<Value>>,
}

#[derive(Debug, Clone, Copy)]
enum Ranking {
    Shares,
    RecentViews,
    AllTimeViews,
}

#[derive(Clone)]
pub struct SolrSearchIndex {
    client: Client,
    settings: SearchSettings,
}

impl SolrSearchIndex {
    pub fn new(settings: SearchSettings) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(concat!("scholia/", env!("CARGO_PKG_VERSION")))
            .timeout(settings.timeout)
            .build()
            .map_err(|err| InfraError::search(format!("failed to build client: {err}")))?;
        Ok(Self { client, settings })
    }

    fn facet_params(&self, journal: Option<&str>, field: &str) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("q", "*:*".to_string()),
            ("wt", "json".to_string()),
            ("rows", "0".to_string()),
            ("facet", "true".to_string()),
            ("facet.field", field.to_string()),
            ("facet.limit", "-1".to_string()),
            ("facet.mincount", "1".to_string()),
        ];
        if let Some(journal) = journal {
            params.push(("fq", self.term_filter(&self.settings.journal_field, journal)));
        }
        params
    }

    fn ranked_params(
        &self,
        journal: &str,
        category: &str,
        ranking: Ranking,
    ) -> Vec<(&'static str, String)> {
        let sort_field = match ranking {
            Ranking::Shares => &self.settings.shares_field,
            Ranking::RecentViews => &self.settings.recent_views_field,
            Ranking::AllTimeViews => &self.settings.all_time_views_field,
        };

        let mut params = vec![
            ("q", "*:*".to_string()),
            ("wt", "json".to_string()),
            ("rows", "1".to_string()),
            ("fl", format!("{DOI_FIELD},{TITLE_FIELD},{STRIKING_IMAGE_FIELD}")),
            ("sort", format!("{sort_field} desc")),
            ("fq", self.term_filter(&self.settings.journal_field, journal)),
            (
                "fq",
                self.term_filter(&self.settings.subject_facet_field, category),
            ),
        ];
        if !matches!(ranking, Ranking::AllTimeViews) {
            params.push(("fq", format!("{PUBLICATION_DATE_FIELD}:{RECENT_WINDOW}")));
        }
        params
    }

    fn term_filter(&self, field: &str, value: &str) -> String {
        format!("{field}:{}", quote_term(value))
    }

    async fn select(&self, params: &[(&'static str, String)]) -> Result<SelectResponse, SearchError> {
        let mut url = self.settings.url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| SearchError::Transport(err.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| SearchError::Transport(err.to_string()))?;
        if !status.is_success() {
            return Err(SearchError::Status {
                status: status.as_u16(),
                message: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        serde_json::from_slice(&bytes).map_err(|err| SearchError::Decode(err.to_string()))
    }

    async fn facet(
        &self,
        journal: Option<&str>,
        field: &str,
    ) -> Result<(u64, Vec<(String, u64)>), SearchError> {
        let response = self.select(&self.facet_params(journal, field)).await?;
        let values = response
            .facet_counts
            .and_then(|mut counts| counts.facet_fields.remove(field))
            .unwrap_or_default();
        Ok((response.response.num_found, facet_pairs(&values)?))
    }

    async fn top_ranked(
        &self,
        journal: &str,
        category: &str,
        ranking: Ranking,
    ) -> Result<Option<SearchHit>, SearchError> {
        let response = self
            .select(&self.ranked_params(journal, category, ranking))
            .await?;
        let hit = response.response.docs.into_iter().next().map(hit_from_doc).transpose()?;
        debug!(
            target = "scholia::search",
            journal,
            category,
            ranking = ?ranking,
            found = hit.is_some(),
            "ranked lookup finished"
        );
        Ok(hit)
    }
}

#[async_trait]
impl SearchIndex for SolrSearchIndex {
    #[instrument(skip_all, fields(journal = ?journal))]
    async fn all_subjects(&self, journal: Option<&str>) -> Result<Vec<String>, SearchError> {
        let (_, pairs) = self.facet(journal, &self.settings.subject_field).await?;
        Ok(pairs.into_iter().map(|(term, _)| term).collect())
    }

    #[instrument(skip_all, fields(journal = ?journal))]
    async fn all_subject_counts(
        &self,
        journal: Option<&str>,
    ) -> Result<SubjectCounts, SearchError> {
        let (total, pairs) = self
            .facet(journal, &self.settings.subject_facet_field)
            .await?;
        Ok(SubjectCounts {
            subject_counts: pairs.into_iter().collect::<BTreeMap<_, _>>(),
            total_articles: total,
        })
    }

    async fn most_shared(
        &self,
        journal: &str,
        category: &str,
    ) -> Result<Option<SearchHit>, SearchError> {
        self.top_ranked(journal, category, Ranking::Shares).await
    }

    async fn most_viewed_recent(
        &self,
        journal: &str,
        category: &str,
    ) -> Result<Option<SearchHit>, SearchError> {
        self.top_ranked(journal, category, Ranking::RecentViews).await
    }

    async fn most_viewed_all_time(
        &self,
        journal: &str,
        category: &str,
    ) -> Result<Option<SearchHit>, SearchError> {
        self.top_ranked(journal, category, Ranking::AllTimeViews)
            .await
    }
}

/// Solr facets arrive as a flat `[term, count, term, count, ...]` list.
fn facet_pairs(values: &[Value]) -> Result<Vec<(String, u64)>, SearchError> {
    values
        .chunks(2)
        .map(|pair| match pair {
            [Value::String(term), count] => count
                .as_u64()
                .map(|count| (term.clone(), count))
                .ok_or_else(|| SearchError::Decode(format!("facet count for `{term}` is not a number"))),
            _ => Err(SearchError::Decode("malformed facet list".to_string())),
        })
        .collect()
}

fn hit_from_doc(mut doc: HashMap<String, Value>) -> Result<SearchHit, SearchError> {
    let uri = take_string(&mut doc, DOI_FIELD)
        .ok_or_else(|| SearchError::Decode(format!("document without `{DOI_FIELD}`")))?;
    Ok(SearchHit {
        title: take_string(&mut doc, TITLE_FIELD).unwrap_or_default(),
        striking_image: take_string(&mut doc, STRIKING_IMAGE_FIELD),
        uri,
    })
}

/// Stored fields may come back as a single value or a one-element array.
fn take_string(doc: &mut HashMap<String, Value>, field: &str) -> Option<String> {
    match doc.remove(field)? {
        Value::String(value) => Some(value),
        Value::Array(values) => values.into_iter().find_map(|value| match value {
            Value::String(value) => Some(value),
            _ => None,
        }),
        _ => None,
    }
    .filter(|value| !value.is_empty())
}

fn quote_term(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for ch in value.chars() {
        if matches!(ch, '"' | '\\') {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}
