use async_trait::async_trait;

use crate::{
    application::repos::{CreateFeaturedParams, FeaturedArticlesRepo, RepoError},
    domain::featured::FeaturedOverride,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct FeaturedOverrideRow {
    category: String,
    doi: String,
    title: String,
    striking_image_uri: Option<String>,
}

impl From<FeaturedOverrideRow> for FeaturedOverride {
    fn from(row: FeaturedOverrideRow) -> Self {
        Self {
            category: row.category,
            doi: row.doi,
            title: row.title,
            striking_image_uri: row.striking_image_uri,
        }
    }
}

#[async_trait]
impl FeaturedArticlesRepo for PostgresRepositories {
    async fn find_override(
        &self,
        journal_key: &str,
        category: &str,
    ) -> Result<Option<FeaturedOverride>, RepoError> {
        let row = sqlx::query_as::<_, FeaturedOverrideRow>(
            r#"
            SELECT cfa.category, a.doi, a.title, a.striking_image_uri
            FROM category_featured_articles cfa
            INNER JOIN journals j ON j.id = cfa.journal_id
            INNER JOIN articles a ON a.id = cfa.article_id
            WHERE j.journal_key = $1
              AND lower(cfa.category) = lower($2)
            LIMIT 1
            "#,
        )
        .bind(journal_key)
        .bind(category)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(FeaturedOverride::from))
    }

    async fn list_overrides(&self, journal_key: &str) -> Result<Vec<FeaturedOverride>, RepoError> {
        let rows = sqlx::query_as::<_, FeaturedOverrideRow>(
            r#"
            SELECT cfa.category, a.doi, a.title, a.striking_image_uri
            FROM category_featured_articles cfa
            INNER JOIN journals j ON j.id = cfa.journal_id
            INNER JOIN articles a ON a.id = cfa.article_id
            WHERE j.journal_key = $1
            ORDER BY cfa.category
            "#,
        )
        .bind(journal_key)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(FeaturedOverride::from).collect())
    }

    async fn create_override(&self, params: CreateFeaturedParams) -> Result<u64, RepoError> {
        // An existing override for the category is replaced rather than duplicated.
        let result = sqlx::query(
            r#"
            INSERT INTO category_featured_articles
                (journal_id, article_id, category, created_at, last_modified)
            SELECT j.id, a.id, $3, now(), now()
            FROM journals j, articles a
            WHERE j.journal_key = $1
              AND a.doi = $2
            ON CONFLICT (journal_id, (lower(category))) DO UPDATE
                SET article_id = EXCLUDED.article_id,
                    category = EXCLUDED.category,
                    last_modified = now()
            "#,
        )
        .bind(&params.journal_key)
        .bind(&params.doi)
        .bind(&params.category)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn delete_overrides(&self, journal_key: &str, category: &str) -> Result<u64, RepoError> {
        let result = sqlx::query(
            r#"
            DELETE FROM category_featured_articles cfa
            USING journals j
            WHERE j.id = cfa.journal_id
              AND j.journal_key = $1
              AND lower(cfa.category) = lower($2)
            "#,
        )
        .bind(journal_key)
        .bind(category)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}
