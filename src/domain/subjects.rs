//! Subject path parsing and the category structures derived from it.
//!
//! Subject paths arrive from the search index as slash-delimited strings such as
//! `/Biology and life sciences/Genetics/Gene expression`. Only the first two levels feed the
//! [`CategoryTree`]; every level feeds the nested [`CategoryView`].

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

/// Name of the synthetic node standing for "every article of the journal".
pub const ROOT_NODE_NAME: &str = "ROOT";

const SEPARATOR: char = '/';

/// Top-level category name mapped to its sorted, de-duplicated second-level names.
pub type CategoryTree = BTreeMap<String, Vec<String>>;

/// Returns `true` when the path starts with `/` and carries both a top-level and a
/// second-level segment.
///
/// Splitting `/Top/Sub` on `/` yields `["", "Top", "Sub"]`, so a well-formed path has at
/// least three fields. Trailing empty fields do not count.
pub fn is_well_formed_subject_path(path: &str) -> bool {
    path.starts_with(SEPARATOR)
        && path
            .trim_end_matches(SEPARATOR)
            .split(SEPARATOR)
            .nth(2)
            .is_some()
}

/// Folds raw subject paths into a two-level tree. Malformed paths are skipped.
pub fn build_category_tree<I, S>(paths: I) -> CategoryTree
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut grouped: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for path in paths {
        let path = path.as_ref();
        if !is_well_formed_subject_path(path) {
            continue;
        }

        let mut fields = path.split(SEPARATOR).skip(1);
        if let (Some(top), Some(second)) = (fields.next(), fields.next()) {
            grouped
                .entry(top.to_string())
                .or_default()
                .insert(second.to_string());
        }
    }

    grouped
        .into_iter()
        .map(|(top, seconds)| (top, seconds.into_iter().collect()))
        .collect()
}

/// A node of the nested browse tree. Children are keyed and ordered by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryView {
    pub name: String,
    pub children: BTreeMap<String, CategoryView>,
}

impl CategoryView {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: BTreeMap::new(),
        }
    }

    /// Builds a tree rooted at [`ROOT_NODE_NAME`] from raw subject paths.
    ///
    /// Every non-empty segment of a well-formed path becomes a nested child, so
    /// `/A/B/C` yields `ROOT -> A -> B -> C`.
    pub fn from_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut root = Self::new(ROOT_NODE_NAME);

        for path in paths {
            let path = path.as_ref();
            if !is_well_formed_subject_path(path) {
                continue;
            }

            let mut node = &mut root;
            for segment in path.split(SEPARATOR).filter(|segment| !segment.is_empty()) {
                node = node
                    .children
                    .entry(segment.to_string())
                    .or_insert_with(|| CategoryView::new(segment));
            }
        }

        root
    }

    pub fn child(&self, name: &str) -> Option<&CategoryView> {
        self.children.get(name)
    }

    /// Walks down the tree following `segments`, returning `None` on the first miss.
    pub fn descend<'a, I>(&self, segments: I) -> Option<&CategoryView>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut node = self;
        for segment in segments {
            node = node.children.get(segment)?;
        }
        Some(node)
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Subject term counts as reported by the search index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubjectCounts {
    pub subject_counts: BTreeMap<String, u64>,
    pub total_articles: u64,
}

impl SubjectCounts {
    /// Full counts map with the synthetic root entry set to the article total.
    pub fn into_category_counts(self) -> BTreeMap<String, u64> {
        let mut counts = self.subject_counts;
        counts.insert(ROOT_NODE_NAME.to_string(), self.total_articles);
        counts
    }
}
