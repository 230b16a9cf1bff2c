//! Cache key derivation.
//!
//! Every key is a pure function of its inputs. Taxonomy keys concatenate a fixed prefix with
//! the journal key; feed keys render every effective request parameter in sorted order.

use std::collections::BTreeMap;
use std::fmt;

const TOP_AND_SECOND_LEVEL_PREFIX: &str = "topAndSecondLevelCategoriesCacheKey";
const CATEGORIES_PREFIX: &str = "categoriesCacheKey";
const CATEGORY_COUNT_PREFIX: &str = "categoryCountCacheKey";

// A missing journal and an empty journal both mean "all journals" and share a key.
fn journal_suffix(journal: Option<&str>) -> &str {
    journal.unwrap_or("")
}

/// Key for the two-level category tree of a journal.
pub fn top_and_second_level_key(journal: Option<&str>) -> String {
    format!("{TOP_AND_SECOND_LEVEL_PREFIX}{}", journal_suffix(journal))
}

/// Key for the nested browse view of a journal.
pub fn categories_key(journal: Option<&str>) -> String {
    format!("{CATEGORIES_PREFIX}{}", journal_suffix(journal))
}

/// Key for the full subject counts map of a journal.
pub fn category_count_key(journal: Option<&str>) -> String {
    format!("{CATEGORY_COUNT_PREFIX}{}", journal_suffix(journal))
}

/// Effective parameters of one feed request.
///
/// Callers fill this in after defaults have been applied, so two requests that render the
/// same document produce the same key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedKeyParams<'a> {
    pub journal: Option<&'a str>,
    pub start_date: Option<&'a str>,
    pub end_date: Option<&'a str>,
    pub category: Option<&'a str>,
    pub author: Option<&'a str>,
    pub max_results: u32,
    pub relative_links: bool,
    pub extended: bool,
    pub title: Option<&'a str>,
    pub self_link: Option<&'a str>,
}

/// Canonical rendering of a feed request, such as `{cnt=30, jnl=PLoSONE, sd=2024-01-01}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeedCacheKey(String);

impl FeedCacheKey {
    pub fn new(params: &FeedKeyParams<'_>) -> Self {
        let mut parts: BTreeMap<&'static str, String> = BTreeMap::new();

        let mut put = |name: &'static str, value: Option<&str>| {
            if let Some(value) = value {
                parts.insert(name, value.to_string());
            }
        };
        put("jnl", params.journal);
        put("sd", params.start_date);
        put("ed", params.end_date);
        put("cat", params.category.filter(|category| !category.is_empty()));
        put("aut", params.author);
        put("tit", params.title);
        put("self", params.self_link);

        parts.insert("cnt", params.max_results.to_string());
        if params.relative_links {
            parts.insert("rel", "true".to_string());
        }
        if params.extended {
            parts.insert("ext", "true".to_string());
        }

        let body = parts
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join(", ");
        Self(format!("{{{body}}}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeedCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_keys_are_deterministic() {
        assert_eq!(
            top_and_second_level_key(Some("PLoSONE")),
            "topAndSecondLevelCategoriesCacheKeyPLoSONE"
        );
        assert_eq!(
            top_and_second_level_key(Some("PLoSONE")),
            top_and_second_level_key(Some("PLoSONE"))
        );
        assert_eq!(categories_key(Some("J")), "categoriesCacheKeyJ");
        assert_eq!(category_count_key(Some("J")), "categoryCountCacheKeyJ");
    }

    #[test]
    fn distinct_journals_yield_distinct_keys() {
        assert_ne!(
            top_and_second_level_key(Some("A")),
            top_and_second_level_key(Some("B"))
        );
        assert_ne!(category_count_key(Some("A")), category_count_key(None));
    }

    #[test]
    fn key_families_do_not_overlap() {
        let journal = Some("J");
        let keys = [
            top_and_second_level_key(journal),
            categories_key(journal),
            category_count_key(journal),
        ];
        assert_ne!(keys[0], keys[1]);
        assert_ne!(keys[1], keys[2]);
        assert_ne!(keys[0], keys[2]);
    }

    #[test]
    fn missing_and_empty_journal_collide() {
        assert_eq!(top_and_second_level_key(None), top_and_second_level_key(Some("")));
        assert_eq!(categories_key(None), categories_key(Some("")));
        assert_eq!(category_count_key(None), category_count_key(Some("")));
        assert_eq!(category_count_key(None), "categoryCountCacheKey");
    }

    #[test]
    fn feed_key_is_sorted_and_skips_absent_values() {
        let key = FeedCacheKey::new(&FeedKeyParams {
            journal: Some("PLoSONE"),
            start_date: Some("2024-01-01"),
            category: Some(""),
            max_results: 30,
            extended: true,
            ..FeedKeyParams::default()
        });
        assert_eq!(
            key.as_str(),
            "{cnt=30, ext=true, jnl=PLoSONE, sd=2024-01-01}"
        );
    }

    #[test]
    fn feed_key_distinguishes_category() {
        let base = FeedKeyParams {
            max_results: 30,
            ..FeedKeyParams::default()
        };
        let with_category = FeedKeyParams {
            category: Some("Genetics"),
            ..base.clone()
        };
        assert_ne!(FeedCacheKey::new(&base), FeedCacheKey::new(&with_category));
    }
}
