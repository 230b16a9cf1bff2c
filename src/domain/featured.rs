//! Featured-article records and the selection tier that produced them.

use std::fmt;

use serde::{Serialize, Serializer};

/// How a featured article was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeaturedArticleKind {
    /// Picked by an editor through a manual override.
    Featured,
    MostShared,
    MostViewed,
}

impl FeaturedArticleKind {
    pub fn label(self) -> &'static str {
        match self {
            FeaturedArticleKind::Featured => "Featured Article",
            FeaturedArticleKind::MostShared => "Most Shared Article",
            FeaturedArticleKind::MostViewed => "Most Viewed Article",
        }
    }
}

impl fmt::Display for FeaturedArticleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for FeaturedArticleKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// A single article surfaced for a journal and subject area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeaturedArticle {
    pub doi: String,
    pub title: String,
    pub striking_image_uri: Option<String>,
    #[serde(rename = "type")]
    pub kind: FeaturedArticleKind,
}

impl FeaturedArticle {
    pub fn from_hit(hit: SearchHit, kind: FeaturedArticleKind) -> Self {
        Self {
            doi: hit.uri,
            title: hit.title,
            striking_image_uri: hit.striking_image,
            kind,
        }
    }
}

/// One document returned by a ranked search-index query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub uri: String,
    pub title: String,
    pub striking_image: Option<String>,
}

/// Manual override row joined with the article it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeaturedOverride {
    pub category: String,
    pub doi: String,
    pub title: String,
    pub striking_image_uri: Option<String>,
}

impl From<FeaturedOverride> for FeaturedArticle {
    fn from(row: FeaturedOverride) -> Self {
        Self {
            doi: row.doi,
            title: row.title,
            striking_image_uri: row.striking_image_uri,
            kind: FeaturedArticleKind::Featured,
        }
    }
}
