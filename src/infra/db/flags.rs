use async_trait::async_trait;

use crate::{
    application::repos::{FlagsRepo, RepoError},
    domain::{flags::FlagTarget, types::AuthId},
};

use super::{PostgresRepositories, map_sqlx_error};

#[async_trait]
impl FlagsRepo for PostgresRepositories {
    async fn upsert_user_flag(
        &self,
        target: FlagTarget,
        auth_id: &AuthId,
    ) -> Result<u64, RepoError> {
        // No profile behind the auth id selects no rows, so nothing is written.
        let result = sqlx::query(
            r#"
            INSERT INTO article_category_flags
                (article_id, category_id, user_profile_id, created_at, last_modified)
            SELECT $1, $2, up.id, now(), now()
            FROM user_profiles up
            WHERE up.auth_id = $3
            ON CONFLICT (article_id, category_id, user_profile_id) DO UPDATE
                SET last_modified = now()
            "#,
        )
        .bind(target.article_id.0)
        .bind(target.category_id.0)
        .bind(auth_id.as_str())
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn insert_anonymous_flag(&self, target: FlagTarget) -> Result<u64, RepoError> {
        let result = sqlx::query(
            r#"
            INSERT INTO article_category_flags
                (article_id, category_id, user_profile_id, created_at, last_modified)
            VALUES ($1, $2, NULL, now(), now())
            "#,
        )
        .bind(target.article_id.0)
        .bind(target.category_id.0)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn delete_user_flag(
        &self,
        target: FlagTarget,
        auth_id: &AuthId,
    ) -> Result<u64, RepoError> {
        let result = sqlx::query(
            r#"
            DELETE FROM article_category_flags f
            USING user_profiles up
            WHERE up.id = f.user_profile_id
              AND up.auth_id = $3
              AND f.article_id = $1
              AND f.category_id = $2
            "#,
        )
        .bind(target.article_id.0)
        .bind(target.category_id.0)
        .bind(auth_id.as_str())
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn delete_one_anonymous_flag(&self, target: FlagTarget) -> Result<u64, RepoError> {
        let result = sqlx::query(
            r#"
            DELETE FROM article_category_flags
            WHERE id IN (
                SELECT id
                FROM article_category_flags
                WHERE article_id = $1
                  AND category_id = $2
                  AND user_profile_id IS NULL
                LIMIT 1
            )
            "#,
        )
        .bind(target.article_id.0)
        .bind(target.category_id.0)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}
