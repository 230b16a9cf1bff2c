use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::{
    application::repos::{ArticlesRepo, FeedQuery, RepoError},
    domain::feed::{FeedArticle, FeedCategory},
};

use super::{PostgresRepositories, map_sqlx_error};

const ACTIVE_STATE: i16 = 0;

#[derive(sqlx::FromRow)]
struct FeedArticleRow {
    id: i64,
    doi: String,
    title: String,
    description: Option<String>,
    rights: Option<String>,
    published_at: OffsetDateTime,
    volume: Option<String>,
    issue: Option<String>,
}

#[derive(sqlx::FromRow)]
struct NamedRow {
    article_id: i64,
    name: String,
}

#[derive(sqlx::FromRow)]
struct CategoryRow {
    article_id: i64,
    main_category: String,
    sub_category: Option<String>,
}

#[derive(Default)]
struct ArticleDetails {
    authors: Vec<String>,
    contributors: Vec<String>,
    representations: Vec<String>,
    categories: Vec<FeedCategory>,
}

impl PostgresRepositories {
    fn push_feed_filter<'q>(qb: &mut QueryBuilder<'q, Postgres>, query: &'q FeedQuery) {
        if let Some(journal) = query.journal.as_ref() {
            qb.push(
                " AND EXISTS (SELECT 1 FROM article_journals aj INNER JOIN journals j ON j.id = aj.journal_id WHERE aj.article_id = a.id AND j.journal_key = ",
            );
            qb.push_bind(journal);
            qb.push(")");
        }

        if let Some(start) = query.start {
            qb.push(" AND a.published_at >= ");
            qb.push_bind(start);
        }

        if let Some(end) = query.end {
            qb.push(" AND a.published_at <= ");
            qb.push_bind(end);
        }

        if let Some(category) = query.category.as_ref() {
            qb.push(
                " AND EXISTS (SELECT 1 FROM article_categories ac INNER JOIN categories c ON c.id = ac.category_id WHERE ac.article_id = a.id AND (c.main_category = ",
            );
            qb.push_bind(category);
            qb.push(" OR c.sub_category = ");
            qb.push_bind(category);
            qb.push("))");
        }

        if let Some(author) = query.author.as_ref() {
            qb.push(
                " AND EXISTS (SELECT 1 FROM article_authors au WHERE au.article_id = a.id AND au.full_name = ",
            );
            qb.push_bind(author);
            qb.push(")");
        }
    }

    async fn load_details(&self, ids: &[i64]) -> Result<HashMap<i64, ArticleDetails>, RepoError> {
        let mut details: HashMap<i64, ArticleDetails> = HashMap::new();

        let authors = sqlx::query_as::<_, NamedRow>(
            r#"
            SELECT article_id, full_name AS name
            FROM article_authors
            WHERE article_id = ANY($1)
            ORDER BY article_id, position
            "#,
        )
        .bind(ids)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        for row in authors {
            details.entry(row.article_id).or_default().authors.push(row.name);
        }

        let contributors = sqlx::query_as::<_, NamedRow>(
            r#"
            SELECT article_id, full_name AS name
            FROM article_contributors
            WHERE article_id = ANY($1)
            ORDER BY article_id, position
            "#,
        )
        .bind(ids)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        for row in contributors {
            details
                .entry(row.article_id)
                .or_default()
                .contributors
                .push(row.name);
        }

        let representations = sqlx::query_as::<_, NamedRow>(
            r#"
            SELECT article_id, name
            FROM article_representations
            WHERE article_id = ANY($1)
            ORDER BY article_id, name
            "#,
        )
        .bind(ids)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        for row in representations {
            details
                .entry(row.article_id)
                .or_default()
                .representations
                .push(row.name);
        }

        let categories = sqlx::query_as::<_, CategoryRow>(
            r#"
            SELECT ac.article_id, c.main_category, c.sub_category
            FROM article_categories ac
            INNER JOIN categories c ON c.id = ac.category_id
            WHERE ac.article_id = ANY($1)
            ORDER BY ac.article_id, c.main_category, c.sub_category NULLS FIRST
            "#,
        )
        .bind(ids)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        for row in categories {
            details
                .entry(row.article_id)
                .or_default()
                .categories
                .push(FeedCategory {
                    main: row.main_category,
                    sub: row.sub_category,
                });
        }

        Ok(details)
    }
}

#[async_trait]
impl ArticlesRepo for PostgresRepositories {
    async fn list_feed_articles(&self, query: &FeedQuery) -> Result<Vec<FeedArticle>, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT a.id, a.doi, a.title, a.description, a.rights, a.published_at, a.volume, a.issue \
             FROM articles a WHERE a.state = ",
        );
        qb.push_bind(ACTIVE_STATE);
        Self::push_feed_filter(&mut qb, query);
        qb.push(" ORDER BY a.published_at ASC, a.id ASC LIMIT ");
        qb.push_bind(i64::from(query.limit));

        let rows: Vec<FeedArticleRow> = qb
            .build_query_as()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
        let mut details = self.load_details(&ids).await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let extra = details.remove(&row.id).unwrap_or_default();
                FeedArticle {
                    doi: row.doi,
                    title: row.title,
                    description: row.description,
                    rights: row.rights,
                    published_at: row.published_at,
                    volume: row.volume,
                    issue: row.issue,
                    authors: extra.authors,
                    contributors: extra.contributors,
                    representations: extra.representations,
                    categories: extra.categories,
                }
            })
            .collect())
    }
}
