use async_trait::async_trait;

use crate::{
    application::repos::{PermissionChecker, PermissionError},
    domain::types::{AuthId, Permission},
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct GrantRow {
    has_profile: bool,
    granted: bool,
}

#[async_trait]
impl PermissionChecker for PostgresRepositories {
    async fn check_permission(
        &self,
        permission: Permission,
        auth_id: Option<&AuthId>,
    ) -> Result<(), PermissionError> {
        let Some(auth_id) = auth_id else {
            return Err(PermissionError::Denied {
                permission,
                reason: "no authenticated user".to_string(),
            });
        };

        let row = sqlx::query_as::<_, GrantRow>(
            r#"
            SELECT
                EXISTS (SELECT 1 FROM user_profiles WHERE auth_id = $1) AS has_profile,
                EXISTS (
                    SELECT 1
                    FROM user_profiles up
                    INNER JOIN user_roles ur ON ur.user_profile_id = up.id
                    INNER JOIN role_permissions rp ON rp.role_id = ur.role_id
                    WHERE up.auth_id = $1
                      AND rp.permission = $2
                ) AS granted
            "#,
        )
        .bind(auth_id.as_str())
        .bind(permission.as_str())
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        match (row.has_profile, row.granted) {
            (_, true) => Ok(()),
            (false, false) => Err(PermissionError::Denied {
                permission,
                reason: format!("no user profile for `{auth_id}`"),
            }),
            (true, false) => Err(PermissionError::Denied {
                permission,
                reason: format!("user `{auth_id}` lacks the permission"),
            }),
        }
    }
}
