//! Subject-area flags raised by readers against an article's categorisation.

use std::fmt;

use serde::Deserialize;

use crate::domain::types::{ArticleId, CategoryId};

/// The (article, category) pair a flag applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagTarget {
    pub article_id: ArticleId,
    pub category_id: CategoryId,
}

impl FlagTarget {
    pub fn new(article_id: ArticleId, category_id: CategoryId) -> Self {
        Self {
            article_id,
            category_id,
        }
    }
}

impl fmt::Display for FlagTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "article={} category={}", self.article_id, self.category_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagAction {
    Flag,
    Deflag,
}

impl FlagAction {
    pub fn as_str(self) -> &'static str {
        match self {
            FlagAction::Flag => "flag",
            FlagAction::Deflag => "deflag",
        }
    }
}
